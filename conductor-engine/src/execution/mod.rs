// Pipeline execution
// Matrix expansion, dependency graph, scheduler, and run plumbing

pub mod context;
pub mod events;
pub mod graph;
pub mod instance;
pub mod matrix;
pub mod scheduler;

pub use context::RunContext;
pub use events::{progress_channel, EventSender, ProgressReceiver, ProgressSender, RunEvent};
pub use graph::ExecutionGraph;
pub use instance::{
    axis_label, AxisAssignment, InstanceState, JobInstance, ResolvedStep, SkipCause, StepOutcome,
    StepResult,
};
pub use matrix::MatrixExpander;
pub use scheduler::{CancelToken, JobScheduler, PipelineRun, SchedulerConfig};
