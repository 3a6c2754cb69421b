//! CLI argument definitions for the marketflow binary.

use crate::engine::{EngineError, ReviewDecision};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use marketflow_sdk::ReviewAction;
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "marketflow",
    about = "Review-gated marketing pipeline orchestrator"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a workflow with all steps pre-materialized
    Create(CreateArgs),

    /// Execute one step through its agent
    Run(RunArgs),

    /// Record a reviewer decision on a completed step
    Review(ReviewArgs),

    /// Print the progress snapshot polling clients see
    Progress {
        #[arg(long)]
        workflow: Uuid,
    },

    /// Print a workflow with full step detail
    Show {
        #[arg(long)]
        workflow: Uuid,
    },

    /// List all workflows
    List,

    /// Delete a workflow and, by cascade, its steps
    Delete {
        #[arg(long)]
        workflow: Uuid,
    },
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Display name for the workflow
    #[arg(long)]
    pub name: String,

    /// Target market/genre description for the default pipeline
    #[arg(long)]
    pub market: Option<String>,

    /// Keyword for the default pipeline (repeatable)
    #[arg(long = "keyword")]
    pub keywords: Vec<String>,

    /// YAML pipeline spec; overrides --market/--keyword
    #[arg(long)]
    pub spec: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long)]
    pub workflow: Uuid,

    /// Step to execute
    #[arg(long, conflicts_with = "next")]
    pub step: Option<Uuid>,

    /// Execute the first ready, not-yet-completed step
    #[arg(long)]
    pub next: bool,

    /// JSON input overriding the stored step input for this run
    #[arg(long)]
    pub input: Option<String>,
}

impl RunArgs {
    pub fn parsed_input(&self) -> Result<Option<Value>> {
        self.input
            .as_deref()
            .map(|raw| serde_json::from_str(raw).context("--input is not valid JSON"))
            .transpose()
    }
}

#[derive(Debug, Args)]
pub struct ReviewArgs {
    #[arg(long)]
    pub workflow: Uuid,

    #[arg(long)]
    pub step: Uuid,

    /// approve, reject, or modify
    #[arg(long)]
    pub action: String,

    #[arg(long)]
    pub feedback: Option<String>,

    /// JSON object of reviewer corrections
    #[arg(long)]
    pub corrections: Option<String>,

    /// Replacement input JSON (modify only)
    #[arg(long)]
    pub modified_input: Option<String>,

    /// Replacement output JSON (modify only)
    #[arg(long)]
    pub modified_output: Option<String>,
}

impl ReviewArgs {
    /// Build the engine decision, rejecting unknown actions up front.
    pub fn decision(&self) -> Result<ReviewDecision> {
        let action =
            ReviewAction::from_str(&self.action).map_err(|_| {
                EngineError::InvalidAction(self.action.clone())
            })?;

        Ok(ReviewDecision {
            action,
            feedback: self.feedback.clone(),
            corrections: parse_json_arg(self.corrections.as_deref(), "--corrections")?,
            modified_input: parse_json_arg(self.modified_input.as_deref(), "--modified-input")?,
            modified_output: parse_json_arg(self.modified_output.as_deref(), "--modified-output")?,
        })
    }
}

fn parse_json_arg(raw: Option<&str>, flag: &str) -> Result<Option<Value>> {
    raw.map(|r| serde_json::from_str(r).with_context(|| format!("{} is not valid JSON", flag)))
        .transpose()
}
