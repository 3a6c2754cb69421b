//! SQLite-backed repository for workflows and steps
//!
//! All entity state lives in two tables, `workflows` and `steps`, with steps
//! exclusively owned by their workflow (`ON DELETE CASCADE`). Every patch is
//! applied as a single transaction so a step transition (`status` together
//! with `output`/`error`/`completed_at`) is never observable half-written.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use marketflow::database::{Database, Repository};
//! use marketflow_sdk::{AgentType, StepSpec};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let db_path = dirs::home_dir()
//!     .unwrap()
//!     .join(".marketflow")
//!     .join("marketflow.db");
//! let db = Database::new(db_path)?;
//! db.initialize_schema()?;
//!
//! let workflow = db.create_workflow(
//!     "indie-fantasy-launch",
//!     &[StepSpec {
//!         agent_type: AgentType::MarketAnalyzer,
//!         input: json!({"target_market": "indie fantasy readers"}),
//!         max_retries: None,
//!     }],
//!     3,
//! )?;
//! println!("created workflow {}", workflow.id);
//! # Ok(())
//! # }
//! ```

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use marketflow_sdk::{
    AgentType, ReviewStatus, ReviewSummary, Step, StepSpec, StepStatus, Workflow, WorkflowStatus,
};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use uuid::Uuid;

/// Field-set update for one step. `None` leaves a field untouched; the
/// double-`Option` fields distinguish "leave alone" from "set to NULL".
#[derive(Debug, Clone, Default)]
pub struct StepPatch {
    pub status: Option<StepStatus>,
    pub input: Option<Value>,
    pub output: Option<Option<Value>>,
    pub error: Option<Option<String>>,
    pub review_status: Option<ReviewStatus>,
    pub feedback: Option<Option<String>>,
    pub corrections: Option<Option<Value>>,
    pub ready: Option<bool>,
    pub retry_count: Option<u32>,
    pub completed_at: Option<Option<DateTime<Local>>>,
    pub reviewed_at: Option<Option<DateTime<Local>>>,
}

/// Field-set update for one workflow.
#[derive(Debug, Clone, Default)]
pub struct WorkflowPatch {
    pub status: Option<WorkflowStatus>,
    pub review_summary: Option<ReviewSummary>,
    pub completed_at: Option<Option<DateTime<Local>>>,
}

/// Persisted-state collaborator the engine talks to.
pub trait Repository: Send + Sync {
    /// Create a workflow with all steps pre-materialized in pending status.
    /// The step at position 0 is ready; step count is fixed at creation.
    fn create_workflow(
        &self,
        name: &str,
        specs: &[StepSpec],
        default_max_retries: u32,
    ) -> Result<Workflow>;

    fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>>;

    fn list_workflows(&self) -> Result<Vec<Workflow>>;

    /// Fetch one step, verifying it belongs to the given workflow.
    fn get_step(&self, workflow_id: &Uuid, step_id: &Uuid) -> Result<Option<Step>>;

    /// Apply a patch atomically and return the updated step.
    fn update_step(&self, step_id: &Uuid, patch: &StepPatch) -> Result<Step>;

    /// Apply a patch atomically and return the updated workflow.
    fn update_workflow(&self, id: &Uuid, patch: &WorkflowPatch) -> Result<Workflow>;

    /// Delete a workflow and, by cascade, its steps. Returns false when the
    /// workflow did not exist.
    fn delete_workflow(&self, id: &Uuid) -> Result<bool>;
}

/// SQLite implementation of [`Repository`].
pub struct Database {
    conn: Mutex<Connection>,
}

const STEP_COLUMNS: &str = "id, workflow_id, position, agent_type, status, input, output, error, \
     review_status, feedback, corrections, ready, retry_count, max_retries, \
     created_at, completed_at, reviewed_at";

const WORKFLOW_COLUMNS: &str = "id, name, status, review_summary, created_at, completed_at";

impl Database {
    /// Create a new database connection at the specified path
    pub fn new(path: PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.pragma_update(None, "journal_mode", "WAL")?;

        // Enable foreign key constraints
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (tests, ephemeral runs)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initialize database schema with all tables and indexes
    pub fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,

                name TEXT NOT NULL,
                status TEXT NOT NULL,
                review_summary TEXT NOT NULL,

                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS steps (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,

                agent_type TEXT NOT NULL,
                status TEXT NOT NULL,

                input TEXT NOT NULL,
                output TEXT,
                error TEXT,

                review_status TEXT NOT NULL,
                feedback TEXT,
                corrections TEXT,

                ready INTEGER NOT NULL DEFAULT 0,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL,

                created_at TEXT NOT NULL,
                completed_at TEXT,
                reviewed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_steps_workflow_id ON steps(workflow_id);
            CREATE INDEX IF NOT EXISTS idx_steps_status ON steps(status);
            CREATE INDEX IF NOT EXISTS idx_workflows_status ON workflows(status);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means a panic mid-statement; propagating the panic
        // is the only sound option for a storage handle.
        self.conn.lock().expect("database connection lock poisoned")
    }

    fn load_steps(&self, conn: &Connection, workflow_id: &Uuid) -> Result<Vec<Step>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM steps WHERE workflow_id = ?1 ORDER BY position ASC",
            STEP_COLUMNS
        ))?;
        let mut rows = stmt.query(params![workflow_id.to_string()])?;
        let mut steps = Vec::new();
        while let Some(row) = rows.next()? {
            steps.push(step_from_row(row)?);
        }
        Ok(steps)
    }
}

fn parse_ts(s: &str) -> Option<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Local))
}

fn step_from_row(row: &Row) -> Result<Step> {
    let id: String = row.get("id")?;
    let workflow_id: String = row.get("workflow_id")?;
    let position: i64 = row.get("position")?;
    let agent_type: String = row.get("agent_type")?;
    let status: String = row.get("status")?;
    let input: String = row.get("input")?;
    let output: Option<String> = row.get("output")?;
    let error: Option<String> = row.get("error")?;
    let review_status: String = row.get("review_status")?;
    let feedback: Option<String> = row.get("feedback")?;
    let corrections: Option<String> = row.get("corrections")?;
    let ready: bool = row.get("ready")?;
    let retry_count: i64 = row.get("retry_count")?;
    let max_retries: i64 = row.get("max_retries")?;
    let created_at: String = row.get("created_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let reviewed_at: Option<String> = row.get("reviewed_at")?;

    Ok(Step {
        id: Uuid::parse_str(&id).context("invalid step id in database")?,
        workflow_id: Uuid::parse_str(&workflow_id).context("invalid workflow id in database")?,
        position: position as usize,
        agent_type: AgentType::from_str(&agent_type).map_err(|e| anyhow!(e))?,
        status: StepStatus::from_str(&status).map_err(|e| anyhow!(e))?,
        input: serde_json::from_str(&input).context("invalid step input JSON")?,
        output: output
            .map(|o| serde_json::from_str(&o).context("invalid step output JSON"))
            .transpose()?,
        error,
        review_status: ReviewStatus::from_str(&review_status).map_err(|e| anyhow!(e))?,
        feedback,
        corrections: corrections
            .map(|c| serde_json::from_str(&c).context("invalid step corrections JSON"))
            .transpose()?,
        ready,
        retry_count: retry_count as u32,
        max_retries: max_retries as u32,
        created_at: parse_ts(&created_at)
            .ok_or_else(|| anyhow!("invalid step created_at timestamp"))?,
        completed_at: completed_at.as_deref().and_then(parse_ts),
        reviewed_at: reviewed_at.as_deref().and_then(parse_ts),
    })
}

/// Build a workflow from a row; steps are loaded separately.
fn workflow_from_row(row: &Row) -> Result<Workflow> {
    let id: String = row.get("id")?;
    let status: String = row.get("status")?;
    let summary: String = row.get("review_summary")?;
    let created_at: String = row.get("created_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;

    Ok(Workflow {
        id: Uuid::parse_str(&id).context("invalid workflow id in database")?,
        name: row.get("name")?,
        status: WorkflowStatus::from_str(&status).map_err(|e| anyhow!(e))?,
        steps: Vec::new(),
        review_summary: serde_json::from_str(&summary)
            .context("invalid review summary JSON in database")?,
        created_at: parse_ts(&created_at)
            .ok_or_else(|| anyhow!("invalid workflow created_at timestamp"))?,
        completed_at: completed_at.as_deref().and_then(parse_ts),
    })
}

impl Repository for Database {
    fn create_workflow(
        &self,
        name: &str,
        specs: &[StepSpec],
        default_max_retries: u32,
    ) -> Result<Workflow> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let workflow_id = Uuid::new_v4();
        let now = Local::now();
        let summary = ReviewSummary {
            total: specs.len(),
            ..Default::default()
        };

        tx.execute(
            "INSERT INTO workflows (id, name, status, review_summary, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            params![
                workflow_id.to_string(),
                name,
                WorkflowStatus::Pending.as_str(),
                serde_json::to_string(&summary)?,
                now.to_rfc3339(),
            ],
        )?;

        for (position, spec) in specs.iter().enumerate() {
            tx.execute(
                "INSERT INTO steps (id, workflow_id, position, agent_type, status, input,
                                    review_status, ready, retry_count, max_retries, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10)",
                params![
                    Uuid::new_v4().to_string(),
                    workflow_id.to_string(),
                    position as i64,
                    spec.agent_type.as_str(),
                    StepStatus::Pending.as_str(),
                    serde_json::to_string(&spec.input)?,
                    ReviewStatus::Pending.as_str(),
                    position == 0,
                    spec.max_retries.unwrap_or(default_max_retries) as i64,
                    now.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        drop(conn);

        self.get_workflow(&workflow_id)?
            .ok_or_else(|| anyhow!("workflow {} vanished after creation", workflow_id))
    }

    fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM workflows WHERE id = ?1",
            WORKFLOW_COLUMNS
        ))?;
        let mut rows = stmt.query(params![id.to_string()])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let mut workflow = workflow_from_row(row)?;
        drop(rows);
        drop(stmt);

        workflow.steps = self.load_steps(&conn, id)?;
        Ok(Some(workflow))
    }

    fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let ids: Vec<Uuid> = {
            let conn = self.lock();
            let mut stmt =
                conn.prepare("SELECT id FROM workflows ORDER BY created_at DESC, id ASC")?;
            let mut rows = stmt.query([])?;
            let mut ids = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                ids.push(Uuid::parse_str(&id).context("invalid workflow id in database")?);
            }
            ids
        };

        let mut workflows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(workflow) = self.get_workflow(&id)? {
                workflows.push(workflow);
            }
        }
        Ok(workflows)
    }

    fn get_step(&self, workflow_id: &Uuid, step_id: &Uuid) -> Result<Option<Step>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM steps WHERE id = ?1 AND workflow_id = ?2",
            STEP_COLUMNS
        ))?;
        let mut rows = stmt.query(params![step_id.to_string(), workflow_id.to_string()])?;

        match rows.next()? {
            Some(row) => Ok(Some(step_from_row(row)?)),
            None => Ok(None),
        }
    }

    fn update_step(&self, step_id: &Uuid, patch: &StepPatch) -> Result<Step> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = patch.status {
            sets.push("status = ?");
            values.push(Box::new(status.as_str()));
        }
        if let Some(ref input) = patch.input {
            sets.push("input = ?");
            values.push(Box::new(serde_json::to_string(input)?));
        }
        if let Some(ref output) = patch.output {
            sets.push("output = ?");
            values.push(Box::new(
                output.as_ref().map(serde_json::to_string).transpose()?,
            ));
        }
        if let Some(ref error) = patch.error {
            sets.push("error = ?");
            values.push(Box::new(error.clone()));
        }
        if let Some(review_status) = patch.review_status {
            sets.push("review_status = ?");
            values.push(Box::new(review_status.as_str()));
        }
        if let Some(ref feedback) = patch.feedback {
            sets.push("feedback = ?");
            values.push(Box::new(feedback.clone()));
        }
        if let Some(ref corrections) = patch.corrections {
            sets.push("corrections = ?");
            values.push(Box::new(
                corrections.as_ref().map(serde_json::to_string).transpose()?,
            ));
        }
        if let Some(ready) = patch.ready {
            sets.push("ready = ?");
            values.push(Box::new(ready));
        }
        if let Some(retry_count) = patch.retry_count {
            sets.push("retry_count = ?");
            values.push(Box::new(retry_count as i64));
        }
        if let Some(ref completed_at) = patch.completed_at {
            sets.push("completed_at = ?");
            values.push(Box::new(completed_at.map(|ts| ts.to_rfc3339())));
        }
        if let Some(ref reviewed_at) = patch.reviewed_at {
            sets.push("reviewed_at = ?");
            values.push(Box::new(reviewed_at.map(|ts| ts.to_rfc3339())));
        }

        if sets.is_empty() {
            return Err(anyhow!("empty step patch for {}", step_id));
        }

        let workflow_id = {
            let mut conn = self.lock();
            let tx = conn.transaction()?;

            let sql = format!("UPDATE steps SET {} WHERE id = ?", sets.join(", "));
            values.push(Box::new(step_id.to_string()));
            let changed = tx.execute(&sql, params_from_iter(values.into_iter()))?;
            if changed == 0 {
                return Err(anyhow!("step {} not found", step_id));
            }

            let workflow_id: String = tx.query_row(
                "SELECT workflow_id FROM steps WHERE id = ?1",
                params![step_id.to_string()],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Uuid::parse_str(&workflow_id).context("invalid workflow id in database")?
        };

        self.get_step(&workflow_id, step_id)?
            .ok_or_else(|| anyhow!("step {} vanished after update", step_id))
    }

    fn update_workflow(&self, id: &Uuid, patch: &WorkflowPatch) -> Result<Workflow> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = patch.status {
            sets.push("status = ?");
            values.push(Box::new(status.as_str()));
        }
        if let Some(ref summary) = patch.review_summary {
            sets.push("review_summary = ?");
            values.push(Box::new(serde_json::to_string(summary)?));
        }
        if let Some(ref completed_at) = patch.completed_at {
            sets.push("completed_at = ?");
            values.push(Box::new(completed_at.map(|ts| ts.to_rfc3339())));
        }

        if sets.is_empty() {
            return Err(anyhow!("empty workflow patch for {}", id));
        }

        {
            let conn = self.lock();
            let sql = format!("UPDATE workflows SET {} WHERE id = ?", sets.join(", "));
            values.push(Box::new(id.to_string()));
            let changed =
                conn.execute(&sql, params_from_iter(values.into_iter()))?;
            if changed == 0 {
                return Err(anyhow!("workflow {} not found", id));
            }
        }

        self.get_workflow(id)?
            .ok_or_else(|| anyhow!("workflow {} vanished after update", id))
    }

    fn delete_workflow(&self, id: &Uuid) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "DELETE FROM workflows WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(changed > 0)
    }
}
