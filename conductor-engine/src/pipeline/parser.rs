// Pipeline Document Parser
// Loads and validates pipeline declarations before any job runs

use crate::error::ConfigError;
use crate::execution::matrix::placeholder_names;
use crate::pipeline::models::{JobTemplate, PipelineDoc, TriggerSet};
use crate::trigger::{compile_branch_pattern, parse_cron};

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Parser for pipeline declaration files.
///
/// Parsing always validates: a [`PipelineDoc`] returned from here is safe to
/// hand to the scheduler. Malformed documents fail with [`ConfigError`]
/// before any job runs.
pub struct PipelineParser;

impl PipelineParser {
    /// Parse a pipeline from a file path.
    ///
    /// The file stem becomes the pipeline name when the document does not
    /// declare one.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<PipelineDoc, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut doc = Self::parse(&content)?;
        if doc.name.is_none() {
            doc.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string());
        }
        Ok(doc)
    }

    /// Parse and validate a pipeline from a YAML string.
    pub fn parse(content: &str) -> Result<PipelineDoc, ConfigError> {
        let doc: PipelineDoc = serde_yaml::from_str(content)?;
        Self::validate(&doc)?;
        Ok(doc)
    }

    /// Validate a parsed document for semantic correctness.
    pub fn validate(doc: &PipelineDoc) -> Result<(), ConfigError> {
        if doc.jobs.is_empty() {
            return Err(ConfigError::NoJobs);
        }

        let mut names = HashSet::new();
        for job in &doc.jobs {
            if !names.insert(job.job.as_str()) {
                return Err(ConfigError::DuplicateJob(job.job.clone()));
            }
        }

        for job in &doc.jobs {
            for dependency in job.depends_on.to_vec() {
                if !names.contains(dependency.as_str()) {
                    return Err(ConfigError::UnknownDependency {
                        job: job.job.clone(),
                        dependency,
                    });
                }
            }

            Self::validate_matrix(job)?;
            if let Some(triggers) = &job.triggers {
                Self::validate_triggers(triggers)?;
            }
        }

        if let Some(triggers) = &doc.triggers {
            Self::validate_triggers(triggers)?;
        }

        Self::detect_cycles(doc)?;

        Ok(())
    }

    /// Check axis declarations and step placeholder references.
    fn validate_matrix(job: &JobTemplate) -> Result<(), ConfigError> {
        for (axis, values) in &job.matrix {
            if values.is_empty() {
                // Zero instances is almost certainly unintended; refuse
                // rather than silently expand to nothing.
                return Err(ConfigError::EmptyAxis {
                    job: job.job.clone(),
                    axis: axis.clone(),
                });
            }
        }

        for step in &job.steps {
            let mut referenced = placeholder_names(&step.run);
            if let Some(key) = &step.cache_key {
                referenced.extend(placeholder_names(key));
            }
            for axis in referenced {
                if !job.matrix.contains_key(&axis) {
                    return Err(ConfigError::UndefinedAxis {
                        job: job.job.clone(),
                        step: step.display_label().to_string(),
                        axis,
                    });
                }
            }
        }

        Ok(())
    }

    /// Check that branch patterns compile and cron expressions parse.
    fn validate_triggers(triggers: &TriggerSet) -> Result<(), ConfigError> {
        for filter in [&triggers.push, &triggers.pull_request].into_iter().flatten() {
            for pattern in &filter.branches {
                compile_branch_pattern(pattern)?;
            }
        }
        for schedule in &triggers.schedule {
            parse_cron(&schedule.cron)?;
        }
        Ok(())
    }

    /// Detect cycles in the job dependency relation using DFS.
    fn detect_cycles(doc: &PipelineDoc) -> Result<(), ConfigError> {
        let index: HashMap<&str, &JobTemplate> =
            doc.jobs.iter().map(|j| (j.job.as_str(), j)).collect();

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for job in &doc.jobs {
            if !visited.contains(job.job.as_str()) {
                if let Some(cycle) = Self::dfs_cycle(job, &index, &mut visited, &mut rec_stack) {
                    return Err(ConfigError::CyclicDependency {
                        cycle: cycle.join(" -> "),
                    });
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle<'a>(
        job: &'a JobTemplate,
        index: &HashMap<&'a str, &'a JobTemplate>,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(&job.job);
        rec_stack.insert(&job.job);

        for dependency in job.depends_on.to_vec() {
            if !visited.contains(dependency.as_str()) {
                if let Some(next) = index.get(dependency.as_str()) {
                    if let Some(mut cycle) = Self::dfs_cycle(next, index, visited, rec_stack) {
                        cycle.insert(0, job.job.clone());
                        return Some(cycle);
                    }
                }
            } else if rec_stack.contains(dependency.as_str()) {
                return Some(vec![job.job.clone(), dependency]);
            }
        }

        rec_stack.remove(job.job.as_str());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_document() {
        let doc = PipelineParser::parse(
            r#"
jobs:
  - job: test
    matrix:
      toolchain: [stable, beta]
    steps:
      - run: "cargo +{{toolchain}} test"
  - job: clippy
    depends-on: test
    steps:
      - run: cargo clippy
"#,
        )
        .unwrap();

        assert_eq!(doc.jobs.len(), 2);
    }

    #[test]
    fn test_no_jobs_rejected() {
        let result = PipelineParser::parse("jobs: []");
        assert!(matches!(result, Err(ConfigError::NoJobs)));
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let result = PipelineParser::parse(
            r#"
jobs:
  - job: build
    steps:
      - run: "true"
  - job: build
    steps:
      - run: "true"
"#,
        );
        assert!(matches!(result, Err(ConfigError::DuplicateJob(name)) if name == "build"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let result = PipelineParser::parse(
            r#"
jobs:
  - job: test
    depends-on: missing
    steps:
      - run: "true"
"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::UnknownDependency { dependency, .. }) if dependency == "missing"
        ));
    }

    #[test]
    fn test_cycle_rejected_before_execution() {
        let result = PipelineParser::parse(
            r#"
jobs:
  - job: a
    depends-on: c
    steps:
      - run: "true"
  - job: b
    depends-on: a
    steps:
      - run: "true"
  - job: c
    depends-on: b
    steps:
      - run: "true"
"#,
        );
        assert!(matches!(result, Err(ConfigError::CyclicDependency { .. })));
    }

    #[test]
    fn test_empty_axis_rejected() {
        let result = PipelineParser::parse(
            r#"
jobs:
  - job: test
    matrix:
      toolchain: []
    steps:
      - run: "true"
"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::EmptyAxis { axis, .. }) if axis == "toolchain"
        ));
    }

    #[test]
    fn test_undefined_axis_reference_rejected() {
        let result = PipelineParser::parse(
            r#"
jobs:
  - job: test
    matrix:
      toolchain: [stable]
    steps:
      - run: "cargo +{{channel}} test"
"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::UndefinedAxis { axis, .. }) if axis == "channel"
        ));
    }

    #[test]
    fn test_undefined_axis_in_cache_key_rejected() {
        let result = PipelineParser::parse(
            r#"
jobs:
  - job: test
    steps:
      - run: "true"
        cache-key: "deps-{{toolchain}}"
"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::UndefinedAxis { axis, .. }) if axis == "toolchain"
        ));
    }

    #[test]
    fn test_invalid_cron_rejected() {
        let result = PipelineParser::parse(
            r#"
on:
  schedule:
    - cron: "not a cron"
jobs:
  - job: build
    steps:
      - run: "true"
"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidCron { .. })));
    }

    #[test]
    fn test_invalid_branch_pattern_rejected() {
        let result = PipelineParser::parse(
            r#"
on:
  push:
    branches: ["release/["]
jobs:
  - job: build
    steps:
      - run: "true"
"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidBranchPattern { .. })));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let result = PipelineParser::parse("jobs: [not, {valid");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_from_file_uses_stem_as_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nightly.yml");
        fs::write(
            &path,
            r#"
jobs:
  - job: build
    steps:
      - run: "true"
"#,
        )
        .unwrap();

        let doc = PipelineParser::from_file(&path).unwrap();
        assert_eq!(doc.name.as_deref(), Some("nightly"));
    }
}
