// Trigger Evaluator
// Decides which job templates an incoming event activates

use crate::error::ConfigError;
use crate::pipeline::models::{BranchFilter, JobTemplate, PipelineDoc, TriggerSet};

use chrono::{DateTime, Timelike, Utc};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of repository event that can trigger a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
    Schedule,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Push => write!(f, "push"),
            EventKind::PullRequest => write!(f, "pull_request"),
            EventKind::Schedule => write!(f, "schedule"),
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "push" => Ok(EventKind::Push),
            "pull_request" | "pull-request" | "pr" => Ok(EventKind::PullRequest),
            "schedule" | "cron" => Ok(EventKind::Schedule),
            _ => Err(format!(
                "Unknown event kind '{}'. Valid kinds: push, pull_request, schedule",
                s
            )),
        }
    }
}

/// A normalized repository event, produced externally (webhook or cron
/// collaborator) and consumed by the engine. Immutable; one event triggers
/// one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub branch: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, branch: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            branch: branch.into(),
            timestamp,
        }
    }
}

/// Compile a branch pattern (exact name or glob) into a matcher.
pub fn compile_branch_pattern(pattern: &str) -> Result<GlobMatcher, ConfigError> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| ConfigError::InvalidBranchPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a standard five-field cron expression.
///
/// The `cron` crate wants a seconds field, so a literal `0` is prepended;
/// matching is therefore minute-granular.
pub fn parse_cron(expr: &str) -> Result<cron::Schedule, ConfigError> {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        return Err(ConfigError::InvalidCron {
            expr: expr.to_string(),
            reason: format!("expected 5 fields (minute hour day month weekday), got {}", fields),
        });
    }

    cron::Schedule::from_str(&format!("0 {}", expr)).map_err(|e| ConfigError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Whether a UTC timestamp satisfies a five-field cron expression.
///
/// Expressions are validated at parse time, so a malformed one here is
/// treated as a non-match rather than an error.
pub fn cron_matches(expr: &str, timestamp: DateTime<Utc>) -> bool {
    let truncated = timestamp
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(timestamp);

    parse_cron(expr)
        .map(|schedule| schedule.includes(truncated))
        .unwrap_or(false)
}

fn branch_filter_matches(filter: &BranchFilter, branch: &str) -> bool {
    if filter.branches.is_empty() {
        return true;
    }
    filter.branches.iter().any(|pattern| {
        pattern == branch
            || compile_branch_pattern(pattern)
                .map(|m| m.is_match(branch))
                .unwrap_or(false)
    })
}

fn trigger_set_matches(triggers: &TriggerSet, event: &Event) -> bool {
    match event.kind {
        EventKind::Push => triggers
            .push
            .as_ref()
            .is_some_and(|filter| branch_filter_matches(filter, &event.branch)),
        EventKind::PullRequest => triggers
            .pull_request
            .as_ref()
            .is_some_and(|filter| branch_filter_matches(filter, &event.branch)),
        EventKind::Schedule => triggers
            .schedule
            .iter()
            .any(|spec| cron_matches(&spec.cron, event.timestamp)),
    }
}

/// Pure evaluation of `(Event, templates) -> active subset`.
pub struct TriggerEvaluator;

impl TriggerEvaluator {
    /// Select the job templates whose effective trigger filters match the
    /// event. Jobs without any trigger filters (neither their own nor a
    /// pipeline-level default) never run.
    pub fn select<'a>(event: &Event, doc: &'a PipelineDoc) -> Vec<&'a JobTemplate> {
        doc.jobs
            .iter()
            .filter(|job| {
                doc.effective_triggers(job)
                    .map(|triggers| trigger_set_matches(triggers, event))
                    .unwrap_or(false)
            })
            .collect()
    }
}
