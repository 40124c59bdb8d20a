// Execution Graph
// Instance-level dependency wiring for one pipeline run

use crate::error::{ConfigError, SchedulerError};
use crate::execution::instance::JobInstance;
use crate::execution::matrix::MatrixExpander;
use crate::pipeline::models::{JobTemplate, PipelineDoc};

use std::collections::{HashMap, VecDeque};

/// The dependency graph over concrete job instances for one run.
///
/// A dependency on a template name resolves to every instance expanded from
/// that template: the dependent requires ALL of them to succeed. Instance
/// ids are indexes into `instances`, assigned in creation order (template
/// declaration order, then axis order).
#[derive(Debug)]
pub struct ExecutionGraph {
    pub instances: Vec<JobInstance>,
    /// For each instance, the ids it depends on
    dependencies: Vec<Vec<usize>>,
    /// For each instance, the ids depending on it
    dependents: Vec<Vec<usize>>,
}

impl ExecutionGraph {
    /// Expand the given templates and wire instance-level dependencies.
    ///
    /// `templates` is the trigger-selected subset of the document's jobs, in
    /// declaration order. A selected job may depend on a job the event did
    /// not select; that dependency edge is simply absent from the run (the
    /// dependent starts unblocked), mirroring how an unselected job has no
    /// instances to wait for.
    pub fn build(
        doc: &PipelineDoc,
        templates: &[&JobTemplate],
    ) -> Result<Self, ConfigError> {
        let mut instances = Vec::new();
        for template in templates {
            let expanded = MatrixExpander::expand(template, &doc.env, instances.len())?;
            instances.extend(expanded);
        }

        // template name -> ids of its instances
        let mut by_template: HashMap<&str, Vec<usize>> = HashMap::new();
        for instance in &instances {
            by_template
                .entry(instance.template.as_str())
                .or_default()
                .push(instance.id);
        }

        let mut dependencies = vec![Vec::new(); instances.len()];
        let mut dependents = vec![Vec::new(); instances.len()];

        for template in templates {
            let Some(ids) = by_template.get(template.job.as_str()) else {
                continue;
            };
            for dependency in template.depends_on.to_vec() {
                let Some(upstream_ids) = by_template.get(dependency.as_str()) else {
                    continue;
                };
                for &id in ids {
                    for &upstream in upstream_ids {
                        dependencies[id].push(upstream);
                        dependents[upstream].push(id);
                    }
                }
            }
        }

        Ok(Self {
            instances,
            dependencies,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn dependencies_of(&self, id: usize) -> &[usize] {
        &self.dependencies[id]
    }

    pub fn dependents_of(&self, id: usize) -> &[usize] {
        &self.dependents[id]
    }

    /// Verify the instance graph is acyclic using Kahn's algorithm.
    ///
    /// The parser already rejects cyclic documents, so a cycle here is an
    /// engine bug, not a user error.
    pub fn check_acyclic(&self) -> Result<(), SchedulerError> {
        let mut in_degree: Vec<usize> = self
            .dependencies
            .iter()
            .map(|deps| deps.len())
            .collect();

        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| id)
            .collect();

        let mut seen = 0;
        while let Some(id) = queue.pop_front() {
            seen += 1;
            for &dependent in &self.dependents[id] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if seen != self.instances.len() {
            return Err(SchedulerError::Internal(format!(
                "dependency cycle among job instances ({} of {} reachable)",
                seen,
                self.instances.len()
            )));
        }

        Ok(())
    }
}
