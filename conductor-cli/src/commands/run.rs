use crate::output;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Args;
use color_eyre::Result;

use conductor_engine::{
    progress_channel, CacheStore, Event, EventKind, ExecutionGraph, InstanceState,
    JobScheduler, LoggingCoverageSink, PipelineParser, ResultAggregator, RunContext, RunEvent,
    SchedulerConfig, StepOutcome, TriggerEvaluator, Verdict,
};

/// Run a pipeline for a repository event
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the pipeline YAML file
    pub pipeline: PathBuf,

    /// Event kind to simulate (push, pull_request, schedule)
    #[arg(long, short = 'e', default_value = "push")]
    pub event: String,

    /// Branch the event refers to
    #[arg(long, short = 'b', default_value = "main")]
    pub branch: String,

    /// Event timestamp as RFC 3339, for schedule evaluation (default: now)
    #[arg(long, value_name = "WHEN")]
    pub at: Option<String>,

    /// Maximum concurrently running job instances
    #[arg(long, short = 'j', value_name = "N")]
    pub max_parallel: Option<usize>,

    /// Directory for isolated per-instance working directories
    #[arg(long, short = 'w', value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Cache directory (default: ~/.conductor/cache)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Disable the step cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Print the report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    if !args.pipeline.exists() {
        color_eyre::eyre::bail!("Pipeline file not found: {}", args.pipeline.display());
    }

    let kind: EventKind = args
        .event
        .parse()
        .map_err(|e: String| color_eyre::eyre::eyre!(e))?;
    let timestamp = match &args.at {
        Some(at) => DateTime::parse_from_rfc3339(at)?.with_timezone(&Utc),
        None => Utc::now(),
    };
    let event = Event::new(kind, &args.branch, timestamp);

    output::status("Parsing", &format!("{}", args.pipeline.display()));
    let doc = PipelineParser::from_file(&args.pipeline)?;
    let pipeline_name = doc.name.clone().unwrap_or_else(|| "pipeline".to_string());
    tracing::debug!(pipeline = %pipeline_name, jobs = doc.jobs.len(), "document loaded");

    let selected = TriggerEvaluator::select(&event, &doc);
    if selected.is_empty() {
        output::info(&format!(
            "no jobs in '{}' match {} on '{}'",
            pipeline_name, kind, args.branch
        ));
        return Ok(());
    }

    let graph = ExecutionGraph::build(&doc, &selected)?;
    output::info(&format!(
        "{} of {} jobs triggered, {} instances",
        selected.len(),
        doc.jobs.len(),
        graph.len()
    ));

    let cache = if args.no_cache {
        CacheStore::in_memory()
    } else {
        match &args.cache_dir {
            Some(dir) => CacheStore::with_cache_dir(dir),
            None => CacheStore::new(),
        }
    };

    let workspace = match &args.workspace {
        Some(dir) => dir.clone(),
        None => std::env::temp_dir().join(format!("conductor-{}", std::process::id())),
    };

    let mut config = SchedulerConfig::default();
    if let Some(n) = args.max_parallel.or(doc.max_parallel) {
        config.max_parallel = n.max(1);
    }

    let context = RunContext::new(pipeline_name, event, &workspace, Arc::new(cache));

    let (tx, mut rx) = progress_channel();
    let scheduler = JobScheduler::new(graph, context)
        .with_config(config)
        .with_progress(tx);

    let handle = tokio::spawn(scheduler.run());

    while let Some(event) = rx.recv().await {
        render_event(event);
    }

    let run = handle.await??;
    let report = ResultAggregator::aggregate(&run);

    ResultAggregator::publish_coverage(&report, &LoggingCoverageSink).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        eprintln!();
        eprint!("{}", conductor_engine::render_terminal(&report));
    }

    if report.verdict != Verdict::Success {
        std::process::exit(report.verdict.exit_code());
    }
    Ok(())
}

fn render_event(event: RunEvent) {
    match event {
        RunEvent::RunStarted {
            pipeline,
            total_instances,
        } => output::header(&format!("Running '{}' ({} instances)", pipeline, total_instances)),
        RunEvent::JobStarted { job, axis, .. } => {
            output::status("Running", &job_label(&job, &axis));
        }
        RunEvent::StepCompleted {
            label,
            outcome,
            cache_hit,
            exit_code,
            ..
        } => {
            if cache_hit {
                output::dim(&format!("        {} (cached)", label));
            } else {
                match outcome {
                    StepOutcome::Succeeded => output::dim(&format!("        {}", label)),
                    StepOutcome::Failed => {
                        let code = exit_code
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "?".to_string());
                        output::failure(&format!("{} (exit code {})", label, code));
                    }
                    StepOutcome::Timeout => {
                        output::failure(&format!("{} (timed out)", label))
                    }
                }
            }
        }
        RunEvent::JobCompleted {
            job, axis, state, ..
        } => match state {
            InstanceState::Succeeded => output::success(&job_label(&job, &axis)),
            InstanceState::Failed => output::failure(&job_label(&job, &axis)),
            _ => {}
        },
        RunEvent::JobSkipped { job, axis, reason } => {
            output::warning(&format!("{} skipped: {}", job_label(&job, &axis), reason));
        }
        RunEvent::CacheWarning { key, message } => {
            output::warning(&format!("cache key '{}': {}", key, message));
        }
        RunEvent::RunCompleted { .. } | RunEvent::StepStarted { .. } => {}
    }
}

fn job_label(job: &str, axis: &str) -> String {
    if axis.is_empty() {
        job.to_string()
    } else {
        format!("{} ({})", job, axis)
    }
}
