// Job Graph Scheduler
// Event-driven execution of job instances over a bounded worker pool

use crate::cache::CacheStore;
use crate::error::{CacheError, SchedulerError};
use crate::execution::context::RunContext;
use crate::execution::events::{EventSender, ProgressSender, RunEvent};
use crate::execution::graph::ExecutionGraph;
use crate::execution::instance::{
    axis_label, InstanceState, JobInstance, ResolvedStep, SkipCause, StepOutcome, StepResult,
};
use crate::runners::shell::{parse_output_commands, ExecConfig, StepExecutor};
use crate::trigger::Event;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Configuration for one scheduler run.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cap on concurrently running job instances
    pub max_parallel: usize,
    /// Timeout applied to steps that declare none
    pub default_step_timeout: Duration,
    /// Per-stream output capture bound handed to the step executor
    pub max_capture: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            default_step_timeout: Duration::from_secs(60 * 60),
            max_capture: 64 * 1024,
        }
    }
}

/// Handle for cancelling a run in flight (e.g. superseded by a newer push).
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// A finished pipeline run: the event that triggered it and every instance
/// in its terminal state. The verdict is derived by the result aggregator.
#[derive(Debug)]
pub struct PipelineRun {
    pub pipeline: String,
    pub event: Event,
    pub instances: Vec<JobInstance>,
    pub duration: Duration,
    pub cancelled: bool,
}

/// What one worker reports back for an executed instance.
struct InstanceRun {
    step_results: Vec<StepResult>,
    failed: bool,
    cancelled: bool,
    coverage: Option<f64>,
    duration: Duration,
}

/// The scheduler: single-threaded control logic coordinating up to
/// `max_parallel` concurrent instance executions.
///
/// Instances move `Pending -> Ready` when every upstream instance has
/// succeeded, `Ready -> Running` when pool capacity frees (FIFO by creation
/// order), and end `Succeeded`, `Failed`, or `Skipped`. A failed instance
/// skips its dependents transitively; unrelated branches keep running.
pub struct JobScheduler {
    graph: ExecutionGraph,
    context: RunContext,
    config: SchedulerConfig,
    event_tx: Option<ProgressSender>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl JobScheduler {
    pub fn new(graph: ExecutionGraph, context: RunContext) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            graph,
            context,
            config: SchedulerConfig::default(),
            event_tx: None,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// A token that cancels this run. All non-terminal instances transition
    /// to `Skipped`; running subprocesses are killed.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Execute the run to completion. Every instance reaches a terminal
    /// state before this returns.
    pub async fn run(mut self) -> Result<PipelineRun, SchedulerError> {
        let start = Instant::now();
        let total = self.graph.len();

        self.graph.check_acyclic()?;

        // Isolated working directories, prepared before anything runs
        let mut workdirs = Vec::with_capacity(total);
        for instance in &self.graph.instances {
            let dir = self
                .context
                .prepare_workdir(instance)
                .map_err(|source| SchedulerError::Workspace {
                    instance: instance.label(),
                    source,
                })?;
            workdirs.push(dir);
        }

        self.event_tx
            .send_event(RunEvent::run_started(&self.context.pipeline_name, total));
        info!(
            pipeline = %self.context.pipeline_name,
            instances = total,
            max_parallel = self.config.max_parallel,
            "run started"
        );

        let mut ready: BTreeSet<usize> = BTreeSet::new();
        for id in 0..total {
            if self.graph.dependencies_of(id).is_empty() {
                self.graph.instances[id].state = InstanceState::Ready;
                ready.insert(id);
            }
        }

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(usize, InstanceRun)>();
        let max_parallel = self.config.max_parallel.max(1);
        let mut running = 0usize;
        let mut terminal = 0usize;
        let mut cancelled = false;
        let mut cancel_rx = self.cancel_rx.clone();

        while terminal < total {
            // Fill free pool capacity, lowest id (oldest) first
            while !cancelled && running < max_parallel {
                let Some(&id) = ready.iter().next() else { break };
                ready.remove(&id);
                self.dispatch(id, workdirs[id].clone(), done_tx.clone());
                running += 1;
            }

            if running == 0 {
                if ready.is_empty() && terminal < total && !cancelled {
                    return Err(SchedulerError::Internal(format!(
                        "stalled with {} of {} instances unresolved",
                        total - terminal,
                        total
                    )));
                }
                if cancelled || ready.is_empty() {
                    // Nothing in flight: resolve the remainder synchronously
                    terminal += self.skip_all_non_terminal();
                    continue;
                }
            }

            tokio::select! {
                Some((id, outcome)) = done_rx.recv() => {
                    running -= 1;
                    terminal += self.finish(id, outcome, cancelled, &mut ready);
                }
                changed = cancel_rx.changed(), if !cancelled => {
                    if changed.is_ok() && *cancel_rx.borrow() {
                        info!(pipeline = %self.context.pipeline_name, "run cancelled");
                        cancelled = true;
                        ready.clear();
                        terminal += self.skip_all_waiting();
                    }
                }
            }
        }

        let duration = start.elapsed();
        let success = self
            .graph
            .instances
            .iter()
            .all(|i| i.state != InstanceState::Failed || i.informational);
        self.event_tx.send_event(RunEvent::run_completed(
            &self.context.pipeline_name,
            success,
            duration,
        ));

        Ok(PipelineRun {
            pipeline: self.context.pipeline_name.clone(),
            event: self.context.event.clone(),
            instances: self.graph.instances,
            duration,
            cancelled,
        })
    }

    /// Hand one ready instance to a worker task.
    fn dispatch(&mut self, id: usize, workdir: PathBuf, done: mpsc::UnboundedSender<(usize, InstanceRun)>) {
        let instance = &mut self.graph.instances[id];
        instance.state = InstanceState::Running;
        debug!(instance = %instance.label(), "dispatching");

        let template = instance.template.clone();
        let axis = axis_label(&instance.axis);
        let steps = instance.steps.clone();
        let env = instance.env.clone();
        let cache = self.context.cache.clone();
        let events = self.event_tx.clone();
        let cancel = self.cancel_rx.clone();
        let default_timeout = self.config.default_step_timeout;
        let max_capture = self.config.max_capture;

        tokio::spawn(async move {
            let outcome = execute_instance(
                &template,
                &axis,
                &steps,
                &env,
                &workdir,
                cache,
                events,
                cancel,
                default_timeout,
                max_capture,
            )
            .await;
            let _ = done.send((id, outcome));
        });
    }

    /// Record a worker's result and promote or skip dependents. Returns how
    /// many instances reached a terminal state.
    fn finish(
        &mut self,
        id: usize,
        outcome: InstanceRun,
        run_cancelled: bool,
        ready: &mut BTreeSet<usize>,
    ) -> usize {
        let instance = &mut self.graph.instances[id];
        instance.step_results = outcome.step_results;
        instance.duration = outcome.duration;
        instance.coverage = outcome.coverage;

        if run_cancelled || outcome.cancelled {
            instance.state = InstanceState::Skipped;
            instance.skip_cause = Some(SkipCause::Cancelled);
            self.event_tx.send_event(RunEvent::job_skipped(
                &instance.template,
                axis_label(&instance.axis),
                "run cancelled",
            ));
            return 1;
        }

        if outcome.failed {
            instance.state = InstanceState::Failed;
            let label = instance.label();
            let informational = instance.informational;
            warn!(instance = %label, "instance failed");
            self.event_tx.send_event(RunEvent::job_completed(
                &instance.template,
                axis_label(&instance.axis),
                InstanceState::Failed,
                instance.duration,
            ));
            return 1 + self.cascade_skip(id, &label, informational);
        }

        instance.state = InstanceState::Succeeded;
        debug!(instance = %instance.label(), "instance succeeded");
        self.event_tx.send_event(RunEvent::job_completed(
            &instance.template,
            axis_label(&instance.axis),
            InstanceState::Succeeded,
            instance.duration,
        ));

        // Promote dependents whose upstreams have now all succeeded
        for dependent in self.graph.dependents_of(id).to_vec() {
            if self.graph.instances[dependent].state != InstanceState::Pending {
                continue;
            }
            let unblocked = self
                .graph
                .dependencies_of(dependent)
                .iter()
                .all(|&dep| self.graph.instances[dep].state == InstanceState::Succeeded);
            if unblocked {
                self.graph.instances[dependent].state = InstanceState::Ready;
                ready.insert(dependent);
            }
        }

        1
    }

    /// Transitively skip everything downstream of a failed instance.
    /// Returns the number of newly terminal instances.
    fn cascade_skip(&mut self, failed_id: usize, dependency: &str, informational: bool) -> usize {
        let mut skipped = 0;
        let mut worklist = vec![failed_id];

        while let Some(id) = worklist.pop() {
            for dependent in self.graph.dependents_of(id).to_vec() {
                let instance = &mut self.graph.instances[dependent];
                // A dependent of a failed instance can only be Pending: it
                // never became Ready because this upstream never succeeded
                if instance.state != InstanceState::Pending {
                    continue;
                }
                instance.state = InstanceState::Skipped;
                instance.skip_cause = Some(SkipCause::DependencyFailed {
                    dependency: dependency.to_string(),
                    informational,
                });
                self.event_tx.send_event(RunEvent::job_skipped(
                    &instance.template,
                    axis_label(&instance.axis),
                    format!("dependency '{}' failed", dependency),
                ));
                skipped += 1;
                worklist.push(dependent);
            }
        }

        skipped
    }

    /// Skip every Pending/Ready instance after cancellation. Running ones
    /// resolve when their (killed) workers report back.
    fn skip_all_waiting(&mut self) -> usize {
        let mut skipped = 0;
        for instance in &mut self.graph.instances {
            if matches!(
                instance.state,
                InstanceState::Pending | InstanceState::Ready
            ) {
                instance.state = InstanceState::Skipped;
                instance.skip_cause = Some(SkipCause::Cancelled);
                self.event_tx.send_event(RunEvent::job_skipped(
                    &instance.template,
                    axis_label(&instance.axis),
                    "run cancelled",
                ));
                skipped += 1;
            }
        }
        skipped
    }

    /// Resolve any instance that is still non-terminal when no work is in
    /// flight. Only reachable after cancellation.
    fn skip_all_non_terminal(&mut self) -> usize {
        let mut skipped = 0;
        for instance in &mut self.graph.instances {
            if !instance.state.is_terminal() {
                instance.state = InstanceState::Skipped;
                instance.skip_cause = Some(SkipCause::Cancelled);
                skipped += 1;
            }
        }
        skipped
    }
}

/// Run one instance's steps in order inside its working directory.
#[allow(clippy::too_many_arguments)]
async fn execute_instance(
    template: &str,
    axis: &str,
    steps: &[ResolvedStep],
    env: &std::collections::HashMap<String, String>,
    workdir: &Path,
    cache: Arc<CacheStore>,
    events: Option<ProgressSender>,
    cancel: watch::Receiver<bool>,
    default_timeout: Duration,
    max_capture: usize,
) -> InstanceRun {
    let start = Instant::now();
    events.send_event(RunEvent::job_started(template, axis, steps.len()));

    let executor = StepExecutor::new();
    let mut step_results = Vec::with_capacity(steps.len());
    let mut failed = false;
    let mut cancelled = false;
    let mut coverage = None;

    for (index, step) in steps.iter().enumerate() {
        if *cancel.borrow() {
            cancelled = true;
            break;
        }

        // Cache key: axis-resolved template plus the digest of declared
        // input files, computed against this instance's working directory
        let cache_key = step.cache_key.as_ref().map(|key| {
            if step.cache_inputs.is_empty() {
                key.clone()
            } else {
                format!(
                    "{}-{}",
                    key,
                    CacheStore::digest_inputs(workdir, &step.cache_inputs)
                )
            }
        });

        if let Some(key) = &cache_key {
            if let Some(blob) = cache.get(key).await {
                debug!(step = %step.label, key, "cache hit, skipping step");
                let result = StepResult {
                    label: step.label.clone(),
                    outcome: StepOutcome::Succeeded,
                    exit_code: Some(0),
                    duration: Duration::ZERO,
                    cache_hit: true,
                    output_excerpt: String::from_utf8_lossy(&blob).into_owned(),
                };
                events.send_event(RunEvent::StepCompleted {
                    job: template.to_string(),
                    axis: axis.to_string(),
                    label: step.label.clone(),
                    index,
                    outcome: StepOutcome::Succeeded,
                    cache_hit: true,
                    exit_code: Some(0),
                    duration: Duration::ZERO,
                });
                step_results.push(result);
                continue;
            }
        }

        events.send_event(RunEvent::StepStarted {
            job: template.to_string(),
            axis: axis.to_string(),
            label: step.label.clone(),
            index,
        });

        let mut step_env = env.clone();
        step_env.extend(step.env.clone());
        let exec_config = ExecConfig {
            timeout: Some(step.timeout.unwrap_or(default_timeout)),
            max_capture,
        };

        let step_start = Instant::now();
        let output = executor
            .run_with_cancel(
                &step.command,
                &step_env,
                workdir,
                &exec_config,
                Some(cancel.clone()),
            )
            .await;

        if output.cancelled {
            cancelled = true;
            break;
        }

        if let Some(percent) = parse_output_commands(&output.stdout).coverage {
            coverage = Some(percent);
        }

        let outcome = if output.timed_out {
            StepOutcome::Timeout
        } else if output.success() {
            StepOutcome::Succeeded
        } else {
            StepOutcome::Failed
        };

        let result = StepResult {
            label: step.label.clone(),
            outcome,
            exit_code: output.exit_code,
            duration: step_start.elapsed(),
            cache_hit: false,
            output_excerpt: output.combined(),
        };

        events.send_event(RunEvent::StepCompleted {
            job: template.to_string(),
            axis: axis.to_string(),
            label: step.label.clone(),
            index,
            outcome,
            cache_hit: false,
            exit_code: result.exit_code,
            duration: result.duration,
        });

        let step_failed = result.failed();

        if !step_failed {
            if let Some(key) = &cache_key {
                match cache.put(key, result.output_excerpt.as_bytes()).await {
                    Ok(()) => {}
                    Err(CacheError::Corruption { key }) => {
                        warn!(key, "cache content mismatch, bypassing key");
                        events.send_event(RunEvent::cache_warning(
                            key,
                            "content mismatch, key bypassed",
                        ));
                    }
                    Err(CacheError::Io(e)) => {
                        // Best-effort: a failed write only costs a future miss
                        warn!(key, error = %e, "cache write failed");
                    }
                }
            }
        }

        step_results.push(result);

        if step_failed && !step.continue_on_error {
            failed = true;
            break;
        }
    }

    InstanceRun {
        step_results,
        failed,
        cancelled,
        coverage,
        duration: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::graph::ExecutionGraph;
    use crate::pipeline::{JobTemplate, PipelineParser};
    use crate::trigger::{Event, EventKind};
    use chrono::Utc;

    fn scheduler_for(yaml: &str, workspace: &std::path::Path) -> JobScheduler {
        let doc = PipelineParser::parse(yaml).unwrap();
        let templates: Vec<&JobTemplate> = doc.jobs.iter().collect();
        let graph = ExecutionGraph::build(&doc, &templates).unwrap();
        let context = RunContext::new(
            doc.name.clone().unwrap_or_else(|| "test".to_string()),
            Event::new(EventKind::Push, "main", Utc::now()),
            workspace,
            Arc::new(CacheStore::in_memory()),
        );
        JobScheduler::new(graph, context)
    }

    fn state_of<'a>(run: &'a PipelineRun, template: &str) -> Vec<&'a JobInstance> {
        run.instances
            .iter()
            .filter(|i| i.template == template)
            .collect()
    }

    #[tokio::test]
    async fn test_linear_pipeline_succeeds() {
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = scheduler_for(
            r#"
jobs:
  - job: build
    steps:
      - run: "echo building"
  - job: test
    depends-on: build
    steps:
      - run: "echo testing"
"#,
            workspace.path(),
        );

        let run = scheduler.run().await.unwrap();
        assert!(run
            .instances
            .iter()
            .all(|i| i.state == InstanceState::Succeeded));
        assert!(!run.cancelled);
    }

    #[tokio::test]
    async fn test_failure_cascades_transitively_but_spares_siblings() {
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = scheduler_for(
            r#"
jobs:
  - job: broken
    steps:
      - run: "exit 3"
  - job: downstream
    depends-on: broken
    steps:
      - run: "echo never"
  - job: transitive
    depends-on: downstream
    steps:
      - run: "echo never"
  - job: unrelated
    steps:
      - run: "echo fine"
"#,
            workspace.path(),
        );

        let run = scheduler.run().await.unwrap();

        assert_eq!(state_of(&run, "broken")[0].state, InstanceState::Failed);
        assert_eq!(
            state_of(&run, "broken")[0].step_results[0].exit_code,
            Some(3)
        );

        for template in ["downstream", "transitive"] {
            let instance = state_of(&run, template)[0];
            assert_eq!(instance.state, InstanceState::Skipped);
            assert!(matches!(
                instance.skip_cause,
                Some(SkipCause::DependencyFailed { ref dependency, informational: false })
                    if dependency == "broken"
            ));
            assert!(instance.step_results.is_empty());
        }

        assert_eq!(state_of(&run, "unrelated")[0].state, InstanceState::Succeeded);
    }

    #[tokio::test]
    async fn test_continue_on_error_step_records_failure_and_proceeds() {
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = scheduler_for(
            r#"
jobs:
  - job: lint
    steps:
      - run: "exit 1"
        continue-on-error: true
      - run: "echo still here"
"#,
            workspace.path(),
        );

        let run = scheduler.run().await.unwrap();
        let lint = state_of(&run, "lint")[0];

        assert_eq!(lint.state, InstanceState::Succeeded);
        assert_eq!(lint.step_results.len(), 2);
        assert!(lint.step_results[0].failed());
        assert_eq!(lint.step_results[1].outcome, StepOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_failing_step_aborts_remaining_steps() {
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = scheduler_for(
            r#"
jobs:
  - job: build
    steps:
      - run: "exit 1"
      - run: "echo unreachable"
"#,
            workspace.path(),
        );

        let run = scheduler.run().await.unwrap();
        let build = state_of(&run, "build")[0];

        assert_eq!(build.state, InstanceState::Failed);
        assert_eq!(build.step_results.len(), 1);
    }

    #[tokio::test]
    async fn test_matrix_instances_run_and_isolate_workdirs() {
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = scheduler_for(
            r#"
jobs:
  - job: test
    matrix:
      variant: [one, two, three]
    steps:
      - run: "echo {{variant}} > marker.txt"
"#,
            workspace.path(),
        );

        let run = scheduler.run().await.unwrap();
        assert_eq!(run.instances.len(), 3);
        assert!(run
            .instances
            .iter()
            .all(|i| i.state == InstanceState::Succeeded));

        // Each instance wrote to its own directory
        let markers: Vec<String> = run
            .instances
            .iter()
            .map(|i| {
                std::fs::read_to_string(
                    workspace.path().join(i.workdir_name()).join("marker.txt"),
                )
                .unwrap()
                .trim()
                .to_string()
            })
            .collect();
        assert!(markers.contains(&"one".to_string()));
        assert!(markers.contains(&"two".to_string()));
        assert!(markers.contains(&"three".to_string()));
    }

    #[tokio::test]
    async fn test_one_failing_matrix_instance_skips_dependent() {
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = scheduler_for(
            r#"
jobs:
  - job: test
    matrix:
      toolchain: [stable, beta, nightly]
    steps:
      - run: "test {{toolchain}} != nightly"
  - job: clippy
    depends-on: test
    steps:
      - run: "echo lint"
"#,
            workspace.path(),
        );

        let run = scheduler.run().await.unwrap();

        let failed: Vec<_> = state_of(&run, "test")
            .into_iter()
            .filter(|i| i.state == InstanceState::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].axis["toolchain"], "nightly");

        // Dependency on a matrixed job requires every instance to succeed
        let clippy = state_of(&run, "clippy")[0];
        assert_eq!(clippy.state, InstanceState::Skipped);
    }

    #[tokio::test]
    async fn test_second_run_hits_cache() {
        let workspace = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheStore::in_memory());
        let yaml = r#"
jobs:
  - job: setup
    steps:
      - run: "echo expensive work"
        cache-key: "setup-v1"
"#;

        for expect_hit in [false, true] {
            let doc = PipelineParser::parse(yaml).unwrap();
            let templates: Vec<&JobTemplate> = doc.jobs.iter().collect();
            let graph = ExecutionGraph::build(&doc, &templates).unwrap();
            let context = RunContext::new(
                "cached",
                Event::new(EventKind::Push, "main", Utc::now()),
                workspace.path(),
                cache.clone(),
            );

            let run = JobScheduler::new(graph, context).run().await.unwrap();
            let setup = &run.instances[0];
            assert_eq!(setup.state, InstanceState::Succeeded);
            assert_eq!(setup.step_results[0].cache_hit, expect_hit);
            assert!(setup.step_results[0]
                .output_excerpt
                .contains("expensive work"));
        }
    }

    #[tokio::test]
    async fn test_cancellation_skips_everything_quickly() {
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = scheduler_for(
            r#"
jobs:
  - job: slow
    steps:
      - run: "sleep 30"
  - job: after
    depends-on: slow
    steps:
      - run: "echo never"
"#,
            workspace.path(),
        );

        let token = scheduler.cancel_token();
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let start = Instant::now();
        token.cancel();

        let run = handle.await.unwrap().unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(run.cancelled);
        assert!(run
            .instances
            .iter()
            .all(|i| i.state == InstanceState::Skipped));
        assert!(run
            .instances
            .iter()
            .all(|i| i.skip_cause == Some(SkipCause::Cancelled)));
    }

    #[tokio::test]
    async fn test_bounded_pool_still_completes() {
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = scheduler_for(
            r#"
jobs:
  - job: a
    steps:
      - run: "echo a"
  - job: b
    steps:
      - run: "echo b"
  - job: c
    steps:
      - run: "echo c"
"#,
            workspace.path(),
        )
        .with_config(SchedulerConfig {
            max_parallel: 1,
            ..SchedulerConfig::default()
        });

        let run = scheduler.run().await.unwrap();
        assert!(run
            .instances
            .iter()
            .all(|i| i.state == InstanceState::Succeeded));
    }

    #[tokio::test]
    async fn test_step_timeout_marks_instance_failed() {
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = scheduler_for(
            r#"
jobs:
  - job: hang
    steps:
      - run: "sleep 10"
        timeout-seconds: 1
"#,
            workspace.path(),
        );

        let start = Instant::now();
        let run = scheduler.run().await.unwrap();

        let hang = state_of(&run, "hang")[0];
        assert_eq!(hang.state, InstanceState::Failed);
        assert_eq!(hang.step_results[0].outcome, StepOutcome::Timeout);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_coverage_is_parsed_from_step_output() {
        let workspace = tempfile::tempdir().unwrap();
        let scheduler = scheduler_for(
            r#"
jobs:
  - job: coverage
    kind: coverage
    steps:
      - run: "echo '##[coverage]83.4'"
"#,
            workspace.path(),
        );

        let run = scheduler.run().await.unwrap();
        assert_eq!(run.instances[0].coverage, Some(83.4));
    }
}
