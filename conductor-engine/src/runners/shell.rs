// Step Executor
// Runs a single shell-like command in an isolated subprocess with a
// timeout and bounded output capture

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::warn;

/// Marker appended when captured output exceeded the configured bound.
pub const TRUNCATION_MARKER: &str = "... [output truncated]";

/// Shells a step command can run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    /// Platform default (sh on Unix, cmd on Windows)
    Default,
    /// Bash
    Bash,
}

impl Shell {
    fn get_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Shell::Default => {
                if cfg!(target_os = "windows") {
                    ("cmd", &["/C"])
                } else {
                    ("sh", &["-c"])
                }
            }
            Shell::Bash => ("bash", &["-c"]),
        }
    }
}

/// Configuration for one step execution.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Timeout; expiry kills the process (None = no timeout)
    pub timeout: Option<Duration>,
    /// Per-stream capture bound in bytes; excess is truncated
    pub max_capture: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            max_capture: 64 * 1024,
        }
    }
}

/// Output collected from one step execution.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Exit code, if the process exited on its own
    pub exit_code: Option<i32>,
    /// The timeout expired and the process was killed
    pub timed_out: bool,
    /// The run was cancelled while this step was in flight
    pub cancelled: bool,
    pub stdout: String,
    pub stderr: String,
    /// Either stream hit the capture bound
    pub truncated: bool,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == Some(0)
    }

    /// Combined stdout/stderr excerpt for step results, with the
    /// truncation marker when the capture bound was hit.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        if self.truncated {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(TRUNCATION_MARKER);
        }
        out
    }
}

/// Structured commands parsed from step output, in the spirit of CI
/// logging commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputCommands {
    /// `##[coverage]NN.N` - a coverage percentage reported by the step
    pub coverage: Option<f64>,
}

/// Parse structured output commands from captured stdout.
pub fn parse_output_commands(output: &str) -> OutputCommands {
    let mut commands = OutputCommands::default();

    for line in output.lines() {
        if let Some(rest) = line.trim().strip_prefix("##[coverage]") {
            let value = rest.trim().trim_end_matches('%');
            match value.parse::<f64>() {
                Ok(percent) => commands.coverage = Some(percent),
                Err(_) => warn!(line, "ignoring malformed coverage command"),
            }
        }
    }

    commands
}

enum WaitOutcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Executor for step commands.
pub struct StepExecutor {
    shell: Shell,
}

impl StepExecutor {
    /// Create an executor using the platform default shell.
    pub fn new() -> Self {
        Self {
            shell: Shell::Default,
        }
    }

    /// Create an executor with a specific shell.
    pub fn with_shell(shell: Shell) -> Self {
        Self { shell }
    }

    /// Run a command to completion.
    pub async fn run(
        &self,
        command: &str,
        env: &HashMap<String, String>,
        cwd: &Path,
        config: &ExecConfig,
    ) -> StepOutput {
        self.run_with_cancel(command, env, cwd, config, None).await
    }

    /// Run a command, additionally aborting if the cancel signal flips to
    /// true. A cancelled step is killed the same way a timed-out one is.
    pub async fn run_with_cancel(
        &self,
        command: &str,
        env: &HashMap<String, String>,
        cwd: &Path,
        config: &ExecConfig,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> StepOutput {
        let (shell_cmd, shell_args) = self.shell.get_command();

        let mut cmd = Command::new(shell_cmd);
        cmd.args(shell_args);
        cmd.arg(command);
        cmd.current_dir(cwd);
        cmd.envs(env);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return StepOutput {
                    stderr: format!("failed to spawn shell process '{}': {}", shell_cmd, e),
                    ..StepOutput::default()
                };
            }
        };

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let max = config.max_capture;
        let stdout_handle = tokio::spawn(read_bounded(stdout, max));
        let stderr_handle = tokio::spawn(read_bounded(stderr, max));

        let outcome = tokio::select! {
            res = async {
                match config.timeout {
                    Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
                        Ok(result) => WaitOutcome::Exited(result),
                        Err(_) => WaitOutcome::TimedOut,
                    },
                    None => WaitOutcome::Exited(child.wait().await),
                }
            } => res,
            _ = wait_cancelled(&mut cancel) => WaitOutcome::Cancelled,
        };

        let mut output = StepOutput::default();

        match outcome {
            WaitOutcome::Exited(Ok(status)) => {
                output.exit_code = status.code();
            }
            WaitOutcome::Exited(Err(e)) => {
                output.stderr = format!("failed to wait on process: {}", e);
            }
            WaitOutcome::TimedOut => {
                let _ = child.kill().await;
                output.timed_out = true;
            }
            WaitOutcome::Cancelled => {
                let _ = child.kill().await;
                output.cancelled = true;
            }
        }

        let (stdout, stdout_truncated) = stdout_handle.await.unwrap_or_default();
        let (stderr_text, stderr_truncated) = stderr_handle.await.unwrap_or_default();

        output.stdout = stdout;
        if output.stderr.is_empty() {
            output.stderr = stderr_text;
        } else if !stderr_text.is_empty() {
            output.stderr.push('\n');
            output.stderr.push_str(&stderr_text);
        }
        output.truncated = stdout_truncated || stderr_truncated;

        output
    }
}

impl Default for StepExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once the cancel signal flips to true; pend forever otherwise.
async fn wait_cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    match cancel {
        Some(rx) => loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without cancelling; nothing to wait for
                std::future::pending::<()>().await;
            }
        },
        None => std::future::pending().await,
    }
}

/// Read a stream line by line, keeping at most `max` bytes. The stream is
/// drained to EOF either way so the child never blocks on a full pipe.
async fn read_bounded<R: AsyncRead + Unpin>(reader: R, max: usize) -> (String, bool) {
    let mut lines = BufReader::new(reader).lines();
    let mut output = String::new();
    let mut truncated = false;

    while let Ok(Some(line)) = lines.next_line().await {
        if output.len() >= max {
            truncated = true;
            continue;
        }
        if !output.is_empty() {
            output.push('\n');
        }
        if output.len() + line.len() > max {
            let mut cut = max - output.len();
            while cut > 0 && !line.is_char_boundary(cut) {
                cut -= 1;
            }
            output.push_str(&line[..cut]);
            truncated = true;
        } else {
            output.push_str(&line);
        }
    }

    (output, truncated)
}
