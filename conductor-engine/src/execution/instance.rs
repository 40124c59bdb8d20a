// Job Instances
// Concrete, runnable units produced by matrix expansion, plus their
// per-run state machine

use crate::pipeline::models::JobKind;

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

/// One point of a job's matrix: axis name to the value bound at that point.
/// Kept sorted so labels and working directory names are deterministic.
pub type AxisAssignment = BTreeMap<String, String>;

/// Render an axis assignment as a compact label, e.g. `toolchain=stable`.
/// Empty for non-matrixed jobs.
pub fn axis_label(axis: &AxisAssignment) -> String {
    axis.iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(",")
}

/// State machine of a job instance.
///
/// `Pending -> Ready -> Running -> {Succeeded, Failed, Skipped}`. An
/// instance is immutable once terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Waiting on dependencies
    Pending,
    /// All dependencies succeeded; waiting for worker-pool capacity
    Ready,
    /// Dispatched to a worker
    Running,
    Succeeded,
    Failed,
    /// Never ran: a dependency failed or the run was cancelled
    Skipped,
}

impl InstanceState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceState::Succeeded | InstanceState::Failed | InstanceState::Skipped
        )
    }
}

/// Why an instance was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipCause {
    /// An upstream instance failed. `informational` records whether the
    /// failing job was marked continue-on-error; such skips never affect
    /// the verdict.
    DependencyFailed {
        dependency: String,
        informational: bool,
    },
    /// The run was cancelled before this instance reached a terminal state.
    Cancelled,
}

/// How a single step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed,
    /// The step's timeout expired and the process was killed. Treated as a
    /// failing exit everywhere a failure is.
    Timeout,
}

/// Result of one executed (or cache-satisfied) step. Appended by the
/// executor, never mutated afterward.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub label: String,
    pub outcome: StepOutcome,
    pub exit_code: Option<i32>,
    #[serde(serialize_with = "crate::report::ser_duration_secs")]
    pub duration: Duration,
    /// The step was satisfied from the cache and its command never ran
    pub cache_hit: bool,
    /// Bounded excerpt of the combined output
    pub output_excerpt: String,
}

impl StepResult {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, StepOutcome::Failed | StepOutcome::Timeout)
    }
}

/// A step with its command and cache key template resolved against one axis
/// assignment.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub label: String,
    pub command: String,
    pub continue_on_error: bool,
    /// Cache key with axis placeholders substituted; the input-file digest
    /// is folded in at run time
    pub cache_key: Option<String>,
    pub cache_inputs: Vec<PathBuf>,
    pub timeout: Option<Duration>,
    pub env: HashMap<String, String>,
}

/// A concrete job instance for one pipeline run.
///
/// Created at matrix-expansion time, owned exclusively by the scheduler
/// during execution.
#[derive(Debug, Clone)]
pub struct JobInstance {
    /// Index in creation order; doubles as the FIFO dispatch priority
    pub id: usize,
    /// Name of the template this instance was expanded from
    pub template: String,
    pub display_name: Option<String>,
    pub axis: AxisAssignment,
    pub steps: Vec<ResolvedStep>,
    /// Job-level continue-on-error: failures never affect the verdict
    pub informational: bool,
    pub kind: JobKind,
    /// Merged pipeline- and job-level environment
    pub env: HashMap<String, String>,
    pub state: InstanceState,
    pub skip_cause: Option<SkipCause>,
    pub step_results: Vec<StepResult>,
    pub duration: Duration,
    /// Coverage percentage parsed from step output, for coverage jobs
    pub coverage: Option<f64>,
}

impl JobInstance {
    /// Label combining template name and axis point, e.g.
    /// `test (toolchain=stable)`.
    pub fn label(&self) -> String {
        let axis = axis_label(&self.axis);
        if axis.is_empty() {
            self.template.clone()
        } else {
            format!("{} ({})", self.template, axis)
        }
    }

    /// Filesystem-safe directory name for this instance's isolated
    /// working directory.
    pub fn workdir_name(&self) -> String {
        let mut name = self.template.clone();
        for value in self.axis.values() {
            name.push('-');
            name.push_str(value);
        }
        name.push('-');
        name.push_str(&self.id.to_string());
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    pub fn cache_hits(&self) -> usize {
        self.step_results.iter().filter(|r| r.cache_hit).count()
    }
}
