// Result Aggregator
// Folds terminal instance states into a single pipeline verdict and a
// per-job report

use crate::execution::instance::{axis_label, InstanceState, JobInstance, SkipCause};
use crate::execution::scheduler::PipelineRun;
use crate::pipeline::models::JobKind;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Serialize a [`Duration`] as fractional seconds, for JSON reports.
pub fn ser_duration_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("coverage sink error: {0}")]
    Sink(String),
}

/// The single pass/fail summary of an entire pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Success,
    Failure,
}

impl Verdict {
    /// Process exit code for the run: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Success => 0,
            Verdict::Failure => 1,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Success => write!(f, "success"),
            Verdict::Failure => write!(f, "failure"),
        }
    }
}

/// Per-instance entry of the run report.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub axis: String,
    pub state: InstanceState,
    pub informational: bool,
    #[serde(serialize_with = "ser_duration_secs")]
    pub duration: Duration,
    pub cache_hits: usize,
    /// Why the instance failed, when it did
    pub failure: Option<String>,
    /// Why the instance was skipped, when it was
    pub skip_reason: Option<String>,
    /// Coverage percentage, for coverage jobs that reported one
    pub coverage: Option<f64>,
}

/// The aggregated report of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub pipeline: String,
    pub verdict: Verdict,
    pub cancelled: bool,
    #[serde(serialize_with = "ser_duration_secs")]
    pub duration: Duration,
    pub jobs: Vec<JobReport>,
}

impl RunReport {
    /// Machine-readable form of the report, e.g. for a status API.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// External collaborator that receives parsed coverage percentages (for
/// example an upload client). The engine ships a no-op implementation.
#[async_trait]
pub trait CoverageSink: Send + Sync {
    async fn publish(&self, job: &str, percent: f64) -> Result<(), ReportError>;
}

/// Sink that drops every coverage figure.
pub struct NoopCoverageSink;

#[async_trait]
impl CoverageSink for NoopCoverageSink {
    async fn publish(&self, _job: &str, _percent: f64) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Sink that logs coverage figures through `tracing`.
pub struct LoggingCoverageSink;

#[async_trait]
impl CoverageSink for LoggingCoverageSink {
    async fn publish(&self, job: &str, percent: f64) -> Result<(), ReportError> {
        info!(job, percent, "coverage reported");
        Ok(())
    }
}

/// Collects per-job outcomes into one pipeline-level status.
pub struct ResultAggregator;

impl ResultAggregator {
    /// Derive the report from a finished run.
    ///
    /// The verdict is `Success` iff every instance succeeded or was skipped
    /// solely because an informational (continue-on-error) job failed.
    /// Failed informational jobs never affect the verdict; cancellation
    /// always does.
    pub fn aggregate(run: &PipelineRun) -> RunReport {
        let verdict = Self::verdict(&run.instances);

        let jobs = run
            .instances
            .iter()
            .map(|instance| JobReport {
                job: instance.template.clone(),
                display_name: instance.display_name.clone(),
                axis: axis_label(&instance.axis),
                state: instance.state,
                informational: instance.informational,
                duration: instance.duration,
                cache_hits: instance.cache_hits(),
                failure: Self::failure_summary(instance),
                skip_reason: Self::skip_summary(instance),
                coverage: match instance.kind {
                    JobKind::Coverage => instance.coverage,
                    JobKind::Task => None,
                },
            })
            .collect();

        RunReport {
            pipeline: run.pipeline.clone(),
            verdict,
            cancelled: run.cancelled,
            duration: run.duration,
            jobs,
        }
    }

    /// Forward coverage percentages to the configured sink.
    pub async fn publish_coverage(
        report: &RunReport,
        sink: &dyn CoverageSink,
    ) -> Result<(), ReportError> {
        for job in &report.jobs {
            if let Some(percent) = job.coverage {
                sink.publish(&job.job, percent).await?;
            }
        }
        Ok(())
    }

    fn verdict(instances: &[JobInstance]) -> Verdict {
        for instance in instances {
            match instance.state {
                InstanceState::Failed if !instance.informational => return Verdict::Failure,
                InstanceState::Skipped => match &instance.skip_cause {
                    Some(SkipCause::DependencyFailed {
                        informational: true,
                        ..
                    }) => {}
                    Some(SkipCause::DependencyFailed {
                        informational: false,
                        ..
                    })
                    | Some(SkipCause::Cancelled)
                    | None => return Verdict::Failure,
                },
                _ => {}
            }
        }
        Verdict::Success
    }

    fn failure_summary(instance: &JobInstance) -> Option<String> {
        if instance.state != InstanceState::Failed {
            return None;
        }
        instance
            .step_results
            .iter()
            .find(|r| r.failed())
            .map(|r| match r.exit_code {
                Some(code) => format!("step '{}' exited {}", r.label, code),
                None => format!("step '{}' timed out", r.label),
            })
    }

    fn skip_summary(instance: &JobInstance) -> Option<String> {
        match &instance.skip_cause {
            Some(SkipCause::DependencyFailed { dependency, .. }) => {
                Some(format!("dependency '{}' failed", dependency))
            }
            Some(SkipCause::Cancelled) => Some("run cancelled".to_string()),
            None => None,
        }
    }
}

/// Render a human-readable report.
pub fn render_terminal(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "pipeline '{}': {} ({:.1}s)\n",
        report.pipeline,
        report.verdict.to_string().to_uppercase(),
        report.duration.as_secs_f64()
    ));

    for job in &report.jobs {
        let base = job.display_name.as_deref().unwrap_or(&job.job);
        let name = if job.axis.is_empty() {
            base.to_string()
        } else {
            format!("{} ({})", base, job.axis)
        };

        let line = match job.state {
            InstanceState::Succeeded => {
                let mut line = format!("  \u{2713} {:<40} {:>7.1}s", name, job.duration.as_secs_f64());
                if job.cache_hits > 0 {
                    line.push_str(&format!("  ({} cached)", job.cache_hits));
                }
                if let Some(percent) = job.coverage {
                    line.push_str(&format!("  coverage {:.1}%", percent));
                }
                line
            }
            InstanceState::Failed => {
                let detail = job.failure.as_deref().unwrap_or("failed");
                let marker = if job.informational { "!" } else { "\u{2717}" };
                format!(
                    "  {} {:<40} {:>7.1}s  {}",
                    marker,
                    name,
                    job.duration.as_secs_f64(),
                    detail
                )
            }
            InstanceState::Skipped => {
                let reason = job.skip_reason.as_deref().unwrap_or("skipped");
                format!("  - {:<40} skipped ({})", name, reason)
            }
            other => format!("  ? {:<40} {:?}", name, other),
        };

        out.push_str(&line);
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::instance::{AxisAssignment, StepOutcome, StepResult};
    use crate::trigger::{Event, EventKind};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn instance(template: &str, state: InstanceState) -> JobInstance {
        JobInstance {
            id: 0,
            template: template.to_string(),
            display_name: None,
            axis: AxisAssignment::new(),
            steps: Vec::new(),
            informational: false,
            kind: JobKind::Task,
            env: HashMap::new(),
            state,
            skip_cause: None,
            step_results: Vec::new(),
            duration: Duration::from_secs(1),
            coverage: None,
        }
    }

    fn run_with(instances: Vec<JobInstance>) -> PipelineRun {
        PipelineRun {
            pipeline: "ci".to_string(),
            event: Event::new(EventKind::Push, "main", Utc::now()),
            instances,
            duration: Duration::from_secs(5),
            cancelled: false,
        }
    }

    #[test]
    fn test_all_succeeded_is_success() {
        let run = run_with(vec![
            instance("build", InstanceState::Succeeded),
            instance("test", InstanceState::Succeeded),
        ]);
        assert_eq!(ResultAggregator::aggregate(&run).verdict, Verdict::Success);
    }

    #[test]
    fn test_required_failure_is_failure() {
        let run = run_with(vec![
            instance("build", InstanceState::Succeeded),
            instance("test", InstanceState::Failed),
        ]);
        let report = ResultAggregator::aggregate(&run);
        assert_eq!(report.verdict, Verdict::Failure);
        assert_eq!(report.verdict.exit_code(), 1);
    }

    #[test]
    fn test_informational_failure_never_affects_verdict() {
        let mut coverage = instance("coverage", InstanceState::Failed);
        coverage.informational = true;

        let run = run_with(vec![instance("test", InstanceState::Succeeded), coverage]);
        assert_eq!(ResultAggregator::aggregate(&run).verdict, Verdict::Success);
    }

    #[test]
    fn test_skip_from_informational_failure_is_benign() {
        let mut skipped = instance("report", InstanceState::Skipped);
        skipped.skip_cause = Some(SkipCause::DependencyFailed {
            dependency: "coverage".to_string(),
            informational: true,
        });

        let mut coverage = instance("coverage", InstanceState::Failed);
        coverage.informational = true;

        let run = run_with(vec![coverage, skipped]);
        assert_eq!(ResultAggregator::aggregate(&run).verdict, Verdict::Success);
    }

    #[test]
    fn test_skip_from_required_failure_is_failure() {
        let mut skipped = instance("clippy", InstanceState::Skipped);
        skipped.skip_cause = Some(SkipCause::DependencyFailed {
            dependency: "test".to_string(),
            informational: false,
        });

        let run = run_with(vec![instance("test", InstanceState::Failed), skipped]);
        assert_eq!(ResultAggregator::aggregate(&run).verdict, Verdict::Failure);
    }

    #[test]
    fn test_cancelled_skip_is_failure() {
        let mut skipped = instance("test", InstanceState::Skipped);
        skipped.skip_cause = Some(SkipCause::Cancelled);

        let run = run_with(vec![skipped]);
        assert_eq!(ResultAggregator::aggregate(&run).verdict, Verdict::Failure);
    }

    #[test]
    fn test_failure_summary_names_the_failing_step() {
        let mut failed = instance("test", InstanceState::Failed);
        failed.step_results.push(StepResult {
            label: "unit tests".to_string(),
            outcome: StepOutcome::Failed,
            exit_code: Some(101),
            duration: Duration::from_secs(2),
            cache_hit: false,
            output_excerpt: String::new(),
        });

        let report = ResultAggregator::aggregate(&run_with(vec![failed]));
        assert_eq!(
            report.jobs[0].failure.as_deref(),
            Some("step 'unit tests' exited 101")
        );
    }

    #[test]
    fn test_coverage_only_reported_for_coverage_jobs() {
        let mut task = instance("test", InstanceState::Succeeded);
        task.coverage = Some(50.0);

        let mut coverage = instance("coverage", InstanceState::Succeeded);
        coverage.kind = JobKind::Coverage;
        coverage.coverage = Some(83.4);

        let report = ResultAggregator::aggregate(&run_with(vec![task, coverage]));
        assert_eq!(report.jobs[0].coverage, None);
        assert_eq!(report.jobs[1].coverage, Some(83.4));
    }

    struct RecordingSink {
        published: Mutex<Vec<(String, f64)>>,
    }

    #[async_trait]
    impl CoverageSink for RecordingSink {
        async fn publish(&self, job: &str, percent: f64) -> Result<(), ReportError> {
            self.published
                .lock()
                .unwrap()
                .push((job.to_string(), percent));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_coverage_forwarded_to_sink() {
        let mut coverage = instance("coverage", InstanceState::Succeeded);
        coverage.kind = JobKind::Coverage;
        coverage.coverage = Some(91.0);

        let report = ResultAggregator::aggregate(&run_with(vec![coverage]));
        let sink = RecordingSink {
            published: Mutex::new(Vec::new()),
        };
        ResultAggregator::publish_coverage(&report, &sink)
            .await
            .unwrap();

        assert_eq!(
            *sink.published.lock().unwrap(),
            vec![("coverage".to_string(), 91.0)]
        );
    }

    #[test]
    fn test_terminal_rendering_mentions_every_job() {
        let mut skipped = instance("clippy", InstanceState::Skipped);
        skipped.skip_cause = Some(SkipCause::DependencyFailed {
            dependency: "test".to_string(),
            informational: false,
        });

        let report = ResultAggregator::aggregate(&run_with(vec![
            instance("build", InstanceState::Succeeded),
            instance("test", InstanceState::Failed),
            skipped,
        ]));

        let rendered = render_terminal(&report);
        assert!(rendered.contains("FAILURE"));
        assert!(rendered.contains("build"));
        assert!(rendered.contains("clippy"));
        assert!(rendered.contains("dependency 'test' failed"));
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = ResultAggregator::aggregate(&run_with(vec![instance(
            "build",
            InstanceState::Succeeded,
        )]));
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["verdict"], "success");
        assert_eq!(value["jobs"][0]["job"], "build");
        assert!(value["duration"].is_number());
    }
}
