//! Shared types for marketflow pipelines.
//!
//! Everything the engine, the CLI, and agent executor implementations need to
//! agree on lives here: the agent taxonomy, workflow/step entities and their
//! status enums, the executor seam, structured pipeline events, and the
//! console logging macros.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// Re-export async trait for convenience
pub use async_trait::async_trait;

// Re-export the cancellation token threaded through executor calls
pub use tokio_util::sync::CancellationToken;

// ============================================================================
// Agent Taxonomy
// ============================================================================

/// The eight agent kinds a pipeline step can invoke.
///
/// This is a closed enumeration: dispatch always goes through an
/// `AgentRegistry`, never an open string match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Scores a target market/genre description
    MarketAnalyzer,
    /// Collects trend content for the market keywords
    TrendScraper,
    /// Classifies scraped content into actionable signals
    SignalClassifier,
    /// Optimizes message templates against the classified signals
    TemplateOptimizer,
    /// Derives a business strategy from analysis and signals
    StrategyPlanner,
    /// Generates long-form marketing content
    ContentGenerator,
    /// Produces short copy variants for A/B testing
    CopyVariants,
    /// Archives the final templates for reuse
    TemplateArchiver,
}

impl AgentType {
    /// All agent kinds in default pipeline order.
    pub const ALL: [AgentType; 8] = [
        AgentType::MarketAnalyzer,
        AgentType::TrendScraper,
        AgentType::SignalClassifier,
        AgentType::TemplateOptimizer,
        AgentType::StrategyPlanner,
        AgentType::ContentGenerator,
        AgentType::CopyVariants,
        AgentType::TemplateArchiver,
    ];

    /// Stable identifier used in the database and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::MarketAnalyzer => "market_analyzer",
            AgentType::TrendScraper => "trend_scraper",
            AgentType::SignalClassifier => "signal_classifier",
            AgentType::TemplateOptimizer => "template_optimizer",
            AgentType::StrategyPlanner => "strategy_planner",
            AgentType::ContentGenerator => "content_generator",
            AgentType::CopyVariants => "copy_variants",
            AgentType::TemplateArchiver => "template_archiver",
        }
    }

    /// Human-readable label for console output.
    pub fn label(&self) -> &'static str {
        match self {
            AgentType::MarketAnalyzer => "Market Analyzer",
            AgentType::TrendScraper => "Trend Scraper",
            AgentType::SignalClassifier => "Signal Classifier",
            AgentType::TemplateOptimizer => "Template Optimizer",
            AgentType::StrategyPlanner => "Strategy Planner",
            AgentType::ContentGenerator => "Content Generator",
            AgentType::CopyVariants => "Copy Variants",
            AgentType::TemplateArchiver => "Template Archiver",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "market_analyzer" => Ok(AgentType::MarketAnalyzer),
            "trend_scraper" => Ok(AgentType::TrendScraper),
            "signal_classifier" => Ok(AgentType::SignalClassifier),
            "template_optimizer" => Ok(AgentType::TemplateOptimizer),
            "strategy_planner" => Ok(AgentType::StrategyPlanner),
            "content_generator" => Ok(AgentType::ContentGenerator),
            "copy_variants" => Ok(AgentType::CopyVariants),
            "template_archiver" => Ok(AgentType::TemplateArchiver),
            other => Err(format!("unknown agent type '{}'", other)),
        }
    }
}

// ============================================================================
// Status Enums
// ============================================================================

/// Execution status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            other => Err(format!("unknown step status '{}'", other)),
        }
    }
}

/// Review state of a completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Modified,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::Modified => "modified",
        }
    }

    /// Approved and modified both count as an accepting decision.
    pub fn is_accepted(&self) -> bool {
        matches!(self, ReviewStatus::Approved | ReviewStatus::Modified)
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            "modified" => Ok(ReviewStatus::Modified),
            other => Err(format!("unknown review status '{}'", other)),
        }
    }
}

/// Workflow-level status, always derived from the step set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    ReviewPending,
    NeedsReview,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::ReviewPending => "review_pending",
            WorkflowStatus::NeedsReview => "needs_review",
        }
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkflowStatus::Pending),
            "running" => Ok(WorkflowStatus::Running),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            "review_pending" => Ok(WorkflowStatus::ReviewPending),
            "needs_review" => Ok(WorkflowStatus::NeedsReview),
            other => Err(format!("unknown workflow status '{}'", other)),
        }
    }
}

/// Reviewer decision on a completed step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    #[default]
    Approve,
    Reject,
    Modify,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewAction::Approve => "approve",
            ReviewAction::Reject => "reject",
            ReviewAction::Modify => "modify",
        }
    }
}

impl FromStr for ReviewAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ReviewAction::Approve),
            "reject" => Ok(ReviewAction::Reject),
            "modify" => Ok(ReviewAction::Modify),
            other => Err(format!("unknown review action '{}'", other)),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Specification for one step at workflow creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Agent kind to invoke
    pub agent_type: AgentType,

    /// Input payload handed to the agent
    pub input: Value,

    /// Re-execution budget after rejection or failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

/// One agent invocation within a workflow. Smallest unit of orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub workflow_id: Uuid,

    /// Creation-order index; order is significant and fixed
    pub position: usize,

    pub agent_type: AgentType,
    pub status: StepStatus,

    /// Payload handed to the agent; immutable while running except through a
    /// `modify` review decision
    pub input: Value,

    /// Present only when `status` is completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    /// Present only when `status` is failed; mutually exclusive with `output`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub review_status: ReviewStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,

    /// Reviewer annotations; `modify` and `reject` archive the pre-decision
    /// payloads under `originalInput`/`originalOutput` keys here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrections: Option<Value>,

    /// Set when the step may be triggered by a caller
    pub ready: bool,

    pub retry_count: u32,
    pub max_retries: u32,

    pub created_at: DateTime<Local>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Local>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Local>>,
}

impl Step {
    /// A completed step still waiting for a reviewer decision.
    pub fn awaiting_review(&self) -> bool {
        self.status == StepStatus::Completed && self.review_status == ReviewStatus::Pending
    }
}

/// Derived per-workflow review counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

/// An ordered collection of steps representing one end-to-end pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub status: WorkflowStatus,

    /// Steps ordered by position
    pub steps: Vec<Step>,

    pub review_summary: ReviewSummary,
    pub created_at: DateTime<Local>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Local>>,
}

impl Workflow {
    pub fn step(&self, step_id: &Uuid) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == *step_id)
    }

    /// First ready step that is not yet completed and approved.
    pub fn next_runnable(&self) -> Option<&Step> {
        self.steps
            .iter()
            .find(|s| s.ready && matches!(s.status, StepStatus::Pending | StepStatus::Failed))
    }
}

// ============================================================================
// Progress View
// ============================================================================

/// The step a polling client should surface as active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveStep {
    pub id: Uuid,
    pub agent_type: AgentType,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read-side progress snapshot for one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineProgress {
    pub workflow_id: Uuid,
    pub total_steps: usize,
    pub completed_steps: usize,

    /// Completed count plus one if a step is currently running
    pub current_step: usize,

    /// `round(100 * completed / total)`
    pub progress_percent: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_step: Option<ActiveStep>,

    pub is_running: bool,
}

// ============================================================================
// Executor Seam
// ============================================================================

/// Failure kinds an agent executor can report.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent execution failed: {0}")]
    Failed(String),

    #[error("agent execution timed out")]
    Timeout,

    #[error("agent execution cancelled")]
    Cancelled,
}

/// The external computation that turns a step's input into output.
///
/// Opaque to the orchestration core: implementations may take seconds, fail
/// non-deterministically, and must honor the cancellation token.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(
        &self,
        agent_type: AgentType,
        input: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, AgentError>;
}

// ============================================================================
// Structured Pipeline Events
// ============================================================================

/// Structured events emitted by the engine for machine consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Step handed to its executor
    StepStarted {
        workflow_id: Uuid,
        step_id: Uuid,
        agent_type: AgentType,
        position: usize,
    },
    /// Step completed, awaiting review
    StepCompleted {
        workflow_id: Uuid,
        step_id: Uuid,
        agent_type: AgentType,
        duration_ms: u64,
    },
    /// Step failed
    StepFailed {
        workflow_id: Uuid,
        step_id: Uuid,
        agent_type: AgentType,
        error: String,
    },
    /// Reviewer decision recorded
    ReviewRecorded {
        workflow_id: Uuid,
        step_id: Uuid,
        action: ReviewAction,
    },
    /// Successor step marked eligible to run
    StepReadied {
        workflow_id: Uuid,
        step_id: Uuid,
        position: usize,
    },
    /// Workflow-level status recomputed to a new value
    WorkflowStatusChanged {
        workflow_id: Uuid,
        status: WorkflowStatus,
    },
    /// All steps approved; workflow terminal
    WorkflowCompleted { workflow_id: Uuid },
}

impl PipelineEvent {
    /// Emit this event to stderr for machine parsing
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            use std::io::Write;
            eprintln!("__MF_EVENT__:{}", json);
            // Force flush stderr in async/concurrent contexts
            let _ = std::io::stderr().flush();
        }
    }
}

// ============================================================================
// Console Logging Macros
// ============================================================================

/// Logs the start of a pipeline step with a banner and description.
///
/// # Example
/// ```
/// use marketflow_sdk::log_step_banner;
/// log_step_banner!(1, "Market Analyzer", "Score the target market");
/// ```
///
/// Outputs:
/// ```text
/// ═══ STEP 1: Market Analyzer ═══
/// Score the target market
/// ```
#[macro_export]
macro_rules! log_step_banner {
    ($step:expr, $title:expr, $description:expr) => {
        println!("\x1b[1;36m═══ STEP {}: {} ═══\x1b[0m", $step, $title);
        println!("\x1b[36m{}\x1b[0m", $description);
    };
}

/// Logs the completion of a pipeline step.
#[macro_export]
macro_rules! log_step_done {
    ($step:expr) => {
        println!("\x1b[32m✓ Step {} complete\x1b[0m", $step);
    };
}

/// Logs a review summary with approval counts.
///
/// # Example
/// ```
/// use marketflow_sdk::log_review_totals;
/// log_review_totals!(6, 2, 8);
/// ```
///
/// Outputs:
/// ```text
/// Review: ✓ 6 approved, ✗ 2 rejected (8 total)
/// ```
#[macro_export]
macro_rules! log_review_totals {
    ($approved:expr, $rejected:expr, $total:expr) => {
        println!(
            "\x1b[1mReview: \x1b[32m✓ {} approved\x1b[0m, \x1b[31m✗ {} rejected\x1b[0m ({} total)",
            $approved, $rejected, $total
        );
    };
}

/// Logs an informational message.
#[macro_export]
macro_rules! log_info {
    ($message:expr) => {
        println!("\x1b[36mℹ {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[36mℹ {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs a warning message.
#[macro_export]
macro_rules! log_warning {
    ($message:expr) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs progress of an operation.
///
/// Outputs: `Progress: 3/8 steps`
#[macro_export]
macro_rules! log_progress {
    ($current:expr, $total:expr, $item_type:expr) => {
        println!(
            "\x1b[36mProgress: {}/{} {}\x1b[0m",
            $current, $total, $item_type
        );
    };
}
