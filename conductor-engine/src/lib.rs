// Conductor Engine Library
// Core engine for trigger evaluation, matrix expansion, and job-graph
// scheduling of declarative pipelines

pub mod cache;
pub mod error;
pub mod execution;
pub mod pipeline;
pub mod report;
pub mod runners;
pub mod trigger;

// Re-export commonly used types
pub use error::{CacheError, ConfigError, EngineError, EngineResult, SchedulerError};

// Re-export pipeline document types
pub use pipeline::{
    BranchFilter, DependsOn, JobKind, JobTemplate, PipelineDoc, PipelineParser, ScheduleSpec,
    StepSpec, TriggerSet,
};

// Re-export trigger types
pub use trigger::{Event, EventKind, TriggerEvaluator};

// Re-export execution types
pub use execution::{
    progress_channel, CancelToken, EventSender, ExecutionGraph, InstanceState, JobInstance,
    JobScheduler, MatrixExpander, PipelineRun, ProgressReceiver, ProgressSender, RunContext,
    RunEvent, SchedulerConfig, SkipCause, StepOutcome, StepResult,
};

// Re-export runner types
pub use runners::{ExecConfig, StepExecutor, StepOutput};

// Re-export cache types
pub use cache::{CacheConfig, CacheEntry, CacheStore};

// Re-export report types
pub use report::{
    render_terminal, CoverageSink, JobReport, LoggingCoverageSink, NoopCoverageSink, ReportError,
    ResultAggregator, RunReport, Verdict,
};
