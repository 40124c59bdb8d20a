// Engine error taxonomy
// Configuration errors abort before any job runs; cache and scheduler errors
// are scoped to the run that produced them

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a pipeline document.
///
/// All of these are fatal: a run is never started from a document that
/// produced one.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read pipeline document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("pipeline declares no jobs")]
    NoJobs,

    #[error("duplicate job name '{0}'")]
    DuplicateJob(String),

    #[error("job '{job}' depends on unknown job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },

    #[error("circular dependency detected: {cycle}")]
    CyclicDependency { cycle: String },

    #[error("job '{job}' declares matrix axis '{axis}' with no values")]
    EmptyAxis { job: String, axis: String },

    #[error("step '{step}' in job '{job}' references undefined axis '{axis}'")]
    UndefinedAxis {
        job: String,
        step: String,
        axis: String,
    },

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("invalid branch pattern '{pattern}': {reason}")]
    InvalidBranchPattern { pattern: String, reason: String },
}

/// Errors raised by the cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A `put` found existing content under the same key with a different
    /// digest. Correct key derivation makes this unreachable; when it does
    /// happen the key is bypassed for the rest of the run.
    #[error("cache key '{key}' already holds different content")]
    Corruption { key: String },

    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the scheduler itself, as opposed to failures of the
/// jobs it runs. These abort the whole run.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler invariant violated: {0}")]
    Internal(String),

    #[error("failed to prepare working directory for '{instance}': {source}")]
    Workspace {
        instance: String,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error type for the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

pub type EngineResult<T> = Result<T, EngineError>;
