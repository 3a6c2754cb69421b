use anyhow::{bail, Result};
use clap::Parser;
use dotenv::dotenv;
use marketflow::agents::{AgentRegistry, FixedMetrics};
use marketflow::cli::{Cli, Command, CreateArgs, ReviewArgs, RunArgs};
use marketflow::config::AppConfig;
use marketflow::database::Database;
use marketflow::engine::PipelineEngine;
use marketflow::pipeline::{default_pipeline, PipelineSpec};
use marketflow_sdk::{
    log_info, log_progress, log_review_totals, log_step_banner, log_step_done, log_warning,
    StepStatus, Workflow,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::from_env();
    let db = Database::new(config.db_path())?;
    db.initialize_schema()?;

    let registry = AgentRegistry::with_simulated(
        Arc::new(FixedMetrics::default()),
        config.simulated_latency,
    );
    let engine = PipelineEngine::new(Arc::new(db), Arc::new(registry), config.engine_config());

    match cli.command {
        Command::Create(args) => create(&engine, args),
        Command::Run(args) => run(&engine, args).await,
        Command::Review(args) => review(&engine, args),
        Command::Progress { workflow } => {
            let progress = engine.progress(&workflow)?;
            println!("{}", serde_json::to_string_pretty(&progress)?);
            Ok(())
        }
        Command::Show { workflow } => {
            let workflow = engine.get_workflow(&workflow)?;
            println!("{}", serde_json::to_string_pretty(&workflow)?);
            Ok(())
        }
        Command::List => list(&engine),
        Command::Delete { workflow } => {
            engine.delete_workflow(&workflow)?;
            log_info!("Deleted workflow {}", workflow);
            Ok(())
        }
    }
}

fn create(engine: &PipelineEngine, args: CreateArgs) -> Result<()> {
    let (name, specs) = match args.spec {
        Some(ref path) => {
            let spec = PipelineSpec::load(path)?;
            log_info!("Loaded pipeline spec '{}' from {}", spec.name, path.display());
            (args.name.clone(), spec.step_specs())
        }
        None => {
            let Some(ref market) = args.market else {
                bail!("either --spec or --market is required");
            };
            (
                args.name.clone(),
                default_pipeline(market, &args.keywords),
            )
        }
    };

    let workflow = engine.create_workflow(&name, &specs)?;
    log_info!(
        "Created workflow {} ('{}') with {} steps",
        workflow.id,
        workflow.name,
        workflow.steps.len()
    );
    print_steps(&workflow);
    Ok(())
}

async fn run(engine: &PipelineEngine, args: RunArgs) -> Result<()> {
    let workflow = engine.get_workflow(&args.workflow)?;
    let step_id = match args.step {
        Some(id) => id,
        None if args.next => match workflow.next_runnable() {
            Some(step) => step.id,
            None => bail!("no runnable step; approve the pending review first"),
        },
        None => bail!("either --step or --next is required"),
    };

    let step = workflow
        .step(&step_id)
        .map(|s| (s.position, s.agent_type))
        .ok_or_else(|| anyhow::anyhow!("step {} not found in workflow {}", step_id, workflow.id))?;
    log_step_banner!(
        step.0 + 1,
        step.1.label(),
        format!("workflow {}", workflow.id)
    );

    let execution = engine
        .execute_step(args.workflow, step_id, args.parsed_input()?)
        .await?;

    match execution.status {
        StepStatus::Completed => {
            log_step_done!(step.0 + 1);
            log_info!("Completed in {}ms; awaiting review", execution.duration_ms);
            if let Some(ref output) = execution.output {
                println!("{}", serde_json::to_string_pretty(output)?);
            }
        }
        _ => {
            log_warning!(
                "Step failed after {}ms: {}",
                execution.duration_ms,
                execution.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(())
}

fn review(engine: &PipelineEngine, args: ReviewArgs) -> Result<()> {
    let decision = args.decision()?;
    let step = engine.decide(args.workflow, args.step, decision)?;
    log_info!(
        "Recorded {} on step {} ({})",
        step.review_status.as_str(),
        step.position + 1,
        step.agent_type.label()
    );

    let workflow = engine.get_workflow(&args.workflow)?;
    let summary = workflow.review_summary;
    log_review_totals!(summary.approved, summary.rejected, summary.total);
    log_info!("Workflow status: {}", workflow.status.as_str());
    Ok(())
}

fn list(engine: &PipelineEngine) -> Result<()> {
    let workflows = engine.list_workflows()?;
    if workflows.is_empty() {
        log_info!("No workflows yet");
        return Ok(());
    }

    for workflow in workflows {
        println!(
            "{}  {:14}  {}  ({} steps)",
            workflow.id,
            workflow.status.as_str(),
            workflow.name,
            workflow.steps.len()
        );
        let completed = workflow
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        log_progress!(completed, workflow.steps.len(), "steps");
    }
    Ok(())
}

fn print_steps(workflow: &Workflow) {
    for step in &workflow.steps {
        println!(
            "  {}. {:20} {}  {}",
            step.position + 1,
            step.agent_type.as_str(),
            step.id,
            if step.ready { "(ready)" } else { "" }
        );
    }
}
