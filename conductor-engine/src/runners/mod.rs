// Step runners
// Subprocess execution for pipeline steps

pub mod shell;

pub use shell::{
    parse_output_commands, ExecConfig, OutputCommands, Shell, StepExecutor, StepOutput,
    TRUNCATION_MARKER,
};
