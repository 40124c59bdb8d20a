// Pipeline Document Models
// Typed, immutable representations of the declarative pipeline document

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

/// A parsed pipeline declaration.
///
/// This is the top-level structure of a pipeline YAML file. Jobs are a
/// sequence so that declaration order is preserved; the scheduler uses it to
/// break dispatch ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDoc {
    /// Name of the pipeline (defaults to the file stem when loaded from disk)
    #[serde(default)]
    pub name: Option<String>,

    /// Pipeline-level trigger filters, the default for jobs that declare none
    #[serde(default, rename = "on")]
    pub triggers: Option<TriggerSet>,

    /// Pipeline-level environment variables, merged into every job
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Default cap on concurrently running job instances
    #[serde(default, rename = "max-parallel")]
    pub max_parallel: Option<usize>,

    /// The job templates that make up this pipeline
    pub jobs: Vec<JobTemplate>,
}

impl PipelineDoc {
    /// Look up a job template by name.
    pub fn job(&self, name: &str) -> Option<&JobTemplate> {
        self.jobs.iter().find(|j| j.job == name)
    }

    /// The trigger filters in effect for a job: its own, or the
    /// pipeline-level default.
    pub fn effective_triggers<'a>(&'a self, job: &'a JobTemplate) -> Option<&'a TriggerSet> {
        job.triggers.as_ref().or(self.triggers.as_ref())
    }
}

/// Trigger filters for a pipeline or a single job.
///
/// A trigger kind is enabled by declaring its key; `push: {}` matches pushes
/// to any branch, `push: { branches: [main, "release/*"] }` restricts them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerSet {
    #[serde(default)]
    pub push: Option<BranchFilter>,

    #[serde(default)]
    pub pull_request: Option<BranchFilter>,

    #[serde(default)]
    pub schedule: Vec<ScheduleSpec>,
}

/// Branch filter for push/pull_request triggers.
///
/// An empty pattern list matches every branch. Patterns are exact names or
/// globs (`release/*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchFilter {
    #[serde(default)]
    pub branches: Vec<String>,
}

/// A single cron schedule, standard five-field syntax evaluated in UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub cron: String,
}

/// A job template: a named unit of work, optionally matrixed and dependent
/// on other jobs. Read-only at run time; matrix expansion turns it into
/// concrete instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTemplate {
    /// Job name, unique within the pipeline
    pub job: String,

    /// Display name for reports
    #[serde(default, rename = "display-name")]
    pub display_name: Option<String>,

    /// Job-level trigger filters overriding the pipeline-level default
    #[serde(default, rename = "on")]
    pub triggers: Option<TriggerSet>,

    /// Matrix axes: axis name to the set of values it ranges over.
    /// Axes are kept sorted by name so expansion order is deterministic.
    #[serde(default)]
    pub matrix: BTreeMap<String, Vec<String>>,

    /// Names of jobs whose instances must all succeed before this job runs
    #[serde(default, rename = "depends-on")]
    pub depends_on: DependsOn,

    /// Informational job: failures are reported but never affect the verdict
    #[serde(default, rename = "continue-on-error")]
    pub continue_on_error: bool,

    /// What kind of result the job produces
    #[serde(default)]
    pub kind: JobKind,

    /// Job-level environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// The ordered steps that make up this job
    pub steps: Vec<StepSpec>,
}

/// Job dependencies - a single name or a list, like the `needs` shorthand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl DependsOn {
    /// Convert to a vector of job names.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            DependsOn::None => vec![],
            DependsOn::Single(s) => vec![s.clone()],
            DependsOn::Multiple(v) => v.clone(),
        }
    }

    /// Check if there are any dependencies.
    pub fn is_empty(&self) -> bool {
        match self {
            DependsOn::None => true,
            DependsOn::Single(_) => false,
            DependsOn::Multiple(v) => v.is_empty(),
        }
    }
}

/// Kind of job, used by the result aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Ordinary job: pass/fail only
    #[default]
    Task,
    /// Coverage job: a coverage percentage is parsed from its output and
    /// forwarded to the configured sink
    Coverage,
}

/// A single step of a job: one shell-like command with failure and caching
/// policy. Commands may reference matrix axes as `{{axis}}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Display label (falls back to the command itself)
    #[serde(default)]
    pub label: Option<String>,

    /// The command to run, through the platform shell
    pub run: String,

    /// Record a failure but keep running subsequent steps
    #[serde(default, rename = "continue-on-error")]
    pub continue_on_error: bool,

    /// Cache key template; when set, a hit skips the step entirely
    #[serde(default, rename = "cache-key")]
    pub cache_key: Option<String>,

    /// Files (relative to the working directory) whose digest is folded
    /// into the cache key
    #[serde(default, rename = "cache-inputs")]
    pub cache_inputs: Vec<PathBuf>,

    /// Per-step timeout; the scheduler default applies when absent
    #[serde(default, rename = "timeout-seconds")]
    pub timeout_seconds: Option<u64>,

    /// Step-level environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl StepSpec {
    /// Label shown in events and reports.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.run)
    }

    /// The declared timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}
