// Run Events
// Progress reporting for pipeline runs

use crate::execution::instance::{InstanceState, StepOutcome};

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for run progress events
pub type ProgressSender = mpsc::UnboundedSender<RunEvent>;

/// Receiver for run progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<RunEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during a pipeline run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Run started
    RunStarted {
        pipeline: String,
        total_instances: usize,
    },

    /// Run completed
    RunCompleted {
        pipeline: String,
        success: bool,
        duration: Duration,
    },

    /// A job instance was dispatched to a worker
    JobStarted {
        job: String,
        axis: String,
        total_steps: usize,
    },

    /// A job instance reached a terminal state after running
    JobCompleted {
        job: String,
        axis: String,
        state: InstanceState,
        duration: Duration,
    },

    /// A job instance will never run
    JobSkipped {
        job: String,
        axis: String,
        reason: String,
    },

    /// A step began executing
    StepStarted {
        job: String,
        axis: String,
        label: String,
        index: usize,
    },

    /// A step finished (or was satisfied from the cache)
    StepCompleted {
        job: String,
        axis: String,
        label: String,
        index: usize,
        outcome: StepOutcome,
        cache_hit: bool,
        exit_code: Option<i32>,
        duration: Duration,
    },

    /// The cache refused a key (content mismatch); the key is bypassed
    CacheWarning { key: String, message: String },
}

impl RunEvent {
    pub fn run_started(pipeline: impl Into<String>, total_instances: usize) -> Self {
        Self::RunStarted {
            pipeline: pipeline.into(),
            total_instances,
        }
    }

    pub fn run_completed(pipeline: impl Into<String>, success: bool, duration: Duration) -> Self {
        Self::RunCompleted {
            pipeline: pipeline.into(),
            success,
            duration,
        }
    }

    pub fn job_started(job: impl Into<String>, axis: impl Into<String>, total_steps: usize) -> Self {
        Self::JobStarted {
            job: job.into(),
            axis: axis.into(),
            total_steps,
        }
    }

    pub fn job_completed(
        job: impl Into<String>,
        axis: impl Into<String>,
        state: InstanceState,
        duration: Duration,
    ) -> Self {
        Self::JobCompleted {
            job: job.into(),
            axis: axis.into(),
            state,
            duration,
        }
    }

    pub fn job_skipped(
        job: impl Into<String>,
        axis: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::JobSkipped {
            job: job.into(),
            axis: axis.into(),
            reason: reason.into(),
        }
    }

    pub fn cache_warning(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CacheWarning {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: RunEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: RunEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: RunEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel_delivers_in_order() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(RunEvent::run_started("ci", 4));
        tx.send_event(RunEvent::job_started("test", "toolchain=stable", 2));

        assert!(matches!(
            rx.recv().await.unwrap(),
            RunEvent::RunStarted { total_instances: 4, .. }
        ));
        assert!(matches!(rx.recv().await.unwrap(), RunEvent::JobStarted { .. }));
    }

    #[test]
    fn test_optional_sender_is_a_no_op() {
        let sender: Option<ProgressSender> = None;
        sender.send_event(RunEvent::cache_warning("key", "mismatch"));
    }
}
