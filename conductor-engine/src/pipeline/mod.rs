// Pipeline document loading
// Typed models plus the validating parser

pub mod models;
pub mod parser;

pub use models::{
    BranchFilter, DependsOn, JobKind, JobTemplate, PipelineDoc, ScheduleSpec, StepSpec, TriggerSet,
};
pub use parser::PipelineParser;
