//! Error taxonomy for step registration, resolution and execution.

use thiserror::Error;

use crate::step::StepName;

/// Errors surfaced by the registry, the resolver and the executor.
///
/// Resolution errors (`DuplicateStepName`, `UnknownStep`, `CyclicDependency`) are
/// raised before any step runs. `StepExecutionFailed` aborts the remaining steps of an
/// invocation. `VerificationFailed` is only ever logged.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A step with the same name is already registered.
    #[error("step '{0}' is already registered")]
    DuplicateStepName(StepName),

    /// A step name was looked up (or declared as a dependency) but never registered.
    #[error("unknown step '{0}'")]
    UnknownStep(StepName),

    /// A step transitively depends on itself.
    #[error("cyclic dependency detected: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// The offending path, starting and ending on the same step.
        cycle: Vec<StepName>,
    },

    /// A step failed while preparing, submitting, wiring or recording its deployment.
    #[error("step '{step}' failed: {cause:#}")]
    StepExecutionFailed { step: StepName, cause: anyhow::Error },

    /// Post-deploy verification failed. Never propagated out of the executor.
    #[error("verification of step '{step}' failed: {cause:#}")]
    VerificationFailed { step: StepName, cause: anyhow::Error },

    /// The execution context could not be built, e.g. the node accounts are unreachable.
    #[error("execution context unavailable: {0:#}")]
    ContextUnavailable(anyhow::Error),
}

impl DeployError {
    pub(crate) fn step_failed(step: &StepName, cause: impl Into<anyhow::Error>) -> Self {
        Self::StepExecutionFailed {
            step: step.clone(),
            cause: cause.into(),
        }
    }
}

fn format_cycle(cycle: &[StepName]) -> String {
    cycle
        .iter()
        .map(|name| name.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = DeployError::CyclicDependency {
            cycle: vec![StepName::from("A"), StepName::from("B"), StepName::from("A")],
        };
        assert_eq!(err.to_string(), "cyclic dependency detected: A -> B -> A");
    }

    #[test]
    fn test_step_failed_keeps_cause_chain() {
        let cause = anyhow::anyhow!("execution reverted").context("Failed to deploy GuildRegistry");
        let err = DeployError::step_failed(&StepName::from("GuildRegistry"), cause);
        assert_eq!(
            err.to_string(),
            "step 'GuildRegistry' failed: Failed to deploy GuildRegistry: execution reverted"
        );
    }
}
