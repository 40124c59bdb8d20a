use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use conductor_engine::{ExecutionGraph, JobTemplate, PipelineParser};

/// Parse and validate a pipeline document without running anything
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the pipeline YAML file
    pub pipeline: PathBuf,
}

pub async fn execute(args: ValidateArgs) -> Result<()> {
    if !args.pipeline.exists() {
        color_eyre::eyre::bail!("Pipeline file not found: {}", args.pipeline.display());
    }

    let doc = PipelineParser::from_file(&args.pipeline)?;

    // Expanding the full matrix exercises axis checks the same way a real
    // run would
    let templates: Vec<&JobTemplate> = doc.jobs.iter().collect();
    let graph = ExecutionGraph::build(&doc, &templates)?;

    let name = doc.name.as_deref().unwrap_or("pipeline");
    output::success(&format!(
        "'{}' is valid: {} jobs, {} instances after matrix expansion",
        name,
        doc.jobs.len(),
        graph.len()
    ));

    for job in &doc.jobs {
        let variants = graph
            .instances
            .iter()
            .filter(|i| i.template == job.job)
            .count();
        let deps = job.depends_on.to_vec();
        let mut line = format!("  {} ({} steps", job.job, job.steps.len());
        if variants > 1 {
            line.push_str(&format!(", {} matrix instances", variants));
        }
        if !deps.is_empty() {
            line.push_str(&format!(", needs {}", deps.join(", ")));
        }
        line.push(')');
        output::dim(&line);
    }

    Ok(())
}
