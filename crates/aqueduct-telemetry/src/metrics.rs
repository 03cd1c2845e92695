//! Pipe metrics.
//!
//! Recording goes through the `metrics` facade and is a no-op until the
//! application installs a recorder.

use metrics::{counter, describe_counter};

/// Registers descriptions for the standard metrics.
pub fn describe_metrics() {
    describe_counter!(
        "aqueduct_pipe_executions_total",
        "Total pipe executions by outcome"
    );
    describe_counter!(
        "aqueduct_fitting_errors_total",
        "Total fittings that raised an error"
    );
    describe_counter!(
        "aqueduct_security_decisions_total",
        "Total security evaluations by result"
    );
    describe_counter!(
        "aqueduct_controller_loads_total",
        "Total controller loads by outcome"
    );
    describe_counter!(
        "aqueduct_response_validation_findings_total",
        "Total response validation errors and warnings"
    );
}

/// Outcome of one pipe execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeOutcome {
    /// Every fitting ran without error.
    Completed,
    /// A fitting failed and the recovery stage cleared the error.
    Recovered,
    /// The error escaped the pipe.
    Failed,
}

impl PipeOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Recovered => "recovered",
            Self::Failed => "failed",
        }
    }
}

/// Records a pipe execution.
pub fn record_pipe_execution(pipe: &str, outcome: PipeOutcome) {
    counter!(
        "aqueduct_pipe_executions_total",
        "pipe" => pipe.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Records a fitting that raised an error.
pub fn record_fitting_error(pipe: &str, fitting: &str, category: &str) {
    counter!(
        "aqueduct_fitting_errors_total",
        "pipe" => pipe.to_string(),
        "fitting" => fitting.to_string(),
        "category" => category.to_string()
    )
    .increment(1);
}

/// Records a security evaluation.
pub fn record_security_decision(allowed: bool) {
    counter!(
        "aqueduct_security_decisions_total",
        "allowed" => allowed.to_string()
    )
    .increment(1);
}

/// Records a controller load attempt that missed the cache.
pub fn record_controller_load(controller: &str, loaded: bool) {
    counter!(
        "aqueduct_controller_loads_total",
        "controller" => controller.to_string(),
        "outcome" => if loaded { "loaded" } else { "not_found" }
    )
    .increment(1);
}

/// Records response validation findings.
pub fn record_response_validation(operation: &str, errors: usize, warnings: usize) {
    for (kind, count) in [("error", errors), ("warning", warnings)] {
        if count > 0 {
            counter!(
                "aqueduct_response_validation_findings_total",
                "operation" => operation.to_string(),
                "kind" => kind
            )
            .increment(count as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_dont_panic() {
        describe_metrics();
        record_pipe_execution("swagger_controllers", PipeOutcome::Completed);
        record_pipe_execution("swagger_controllers", PipeOutcome::Recovered);
        record_fitting_error("swagger_controllers", "swagger_security", "authorization");
        record_security_decision(false);
        record_controller_load("pets", true);
        record_response_validation("getPet", 2, 0);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(PipeOutcome::Completed.as_str(), "completed");
        assert_eq!(PipeOutcome::Recovered.as_str(), "recovered");
        assert_eq!(PipeOutcome::Failed.as_str(), "failed");
    }
}
