// Matrix Expansion
// Fans a job template out into one instance per point of its axis product

use crate::error::ConfigError;
use crate::execution::instance::{
    AxisAssignment, InstanceState, JobInstance, ResolvedStep,
};
use crate::pipeline::models::JobTemplate;

use std::collections::HashMap;
use std::time::Duration;

/// Matrix expander for job templates.
pub struct MatrixExpander;

impl MatrixExpander {
    /// Expand a template into concrete instances, one per point of the
    /// Cartesian product of its axes. A template without axes yields
    /// exactly one instance with an empty assignment.
    ///
    /// Instance ids are assigned from `next_id` upward in expansion order,
    /// which is deterministic: axes iterate sorted by name, values in
    /// declared order.
    pub fn expand(
        template: &JobTemplate,
        pipeline_env: &HashMap<String, String>,
        next_id: usize,
    ) -> Result<Vec<JobInstance>, ConfigError> {
        for (axis, values) in &template.matrix {
            if values.is_empty() {
                return Err(ConfigError::EmptyAxis {
                    job: template.job.clone(),
                    axis: axis.clone(),
                });
            }
        }

        let points = Self::cartesian(template);
        let mut instances = Vec::with_capacity(points.len());

        for (offset, axis) in points.into_iter().enumerate() {
            let steps = template
                .steps
                .iter()
                .map(|step| {
                    Ok(ResolvedStep {
                        label: step.display_label().to_string(),
                        command: substitute(&step.run, &axis, template, step.display_label())?,
                        continue_on_error: step.continue_on_error,
                        cache_key: step
                            .cache_key
                            .as_deref()
                            .map(|key| substitute(key, &axis, template, step.display_label()))
                            .transpose()?,
                        cache_inputs: step.cache_inputs.clone(),
                        timeout: step.timeout(),
                        env: step.env.clone(),
                    })
                })
                .collect::<Result<Vec<_>, ConfigError>>()?;

            let mut env = pipeline_env.clone();
            env.extend(template.env.clone());

            instances.push(JobInstance {
                id: next_id + offset,
                template: template.job.clone(),
                display_name: template.display_name.clone(),
                axis,
                steps,
                informational: template.continue_on_error,
                kind: template.kind,
                env,
                state: InstanceState::Pending,
                skip_cause: None,
                step_results: Vec::new(),
                duration: Duration::ZERO,
                coverage: None,
            });
        }

        Ok(instances)
    }

    /// The Cartesian product of the template's axes, in deterministic
    /// order. No axes yields a single empty assignment.
    fn cartesian(template: &JobTemplate) -> Vec<AxisAssignment> {
        let mut points = vec![AxisAssignment::new()];

        for (axis, values) in &template.matrix {
            let mut next = Vec::with_capacity(points.len() * values.len());
            for point in &points {
                for value in values {
                    let mut extended = point.clone();
                    extended.insert(axis.clone(), value.clone());
                    next.push(extended);
                }
            }
            points = next;
        }

        points
    }
}

/// Names referenced as `{{name}}` placeholders in a command or cache key
/// template.
pub fn placeholder_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        rest = &rest[start + 2..];
        if let Some(end) = rest.find("}}") {
            let name = rest[..end].trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
            rest = &rest[end + 2..];
        } else {
            break;
        }
    }

    names
}

/// Substitute `{{axis}}` placeholders with the values bound at one matrix
/// point. A reference to an axis the template does not declare is a
/// configuration error (also caught by the parser, so expansion can only
/// hit this for templates built programmatically).
fn substitute(
    text: &str,
    axis: &AxisAssignment,
    template: &JobTemplate,
    step_label: &str,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if name.is_empty() {
                    // `{{}}` carries no reference; leave it as written
                    out.push_str(&rest[start..start + 2 + end + 2]);
                } else {
                    match axis.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            return Err(ConfigError::UndefinedAxis {
                                job: template.job.clone(),
                                step: step_label.to_string(),
                                axis: name.to_string(),
                            });
                        }
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated braces are passed through verbatim
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}
