//! Error types for experiment orchestration.

use glucosim_env::EnvError;
use thiserror::Error;

/// Setup-time and aggregation errors. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum SimError {
    /// Configuration rejected before any job was scheduled
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A patient, sensor, pump or registry could not be resolved
    #[error("Resolution failed: {0}")]
    Resolution(#[from] EnvError),

    /// Two results would be stored under the same key
    #[error("Result key collision: {0}")]
    KeyCollision(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// One or more jobs failed and the run was configured to fail on that
    #[error("{failed} of {total} jobs failed")]
    JobsFailed {
        /// Number of failed jobs
        failed: usize,
        /// Number of jobs in the run
        total: usize,
    },
}

impl SimError {
    /// Creates an invalid-argument error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Failure of a single job. Recorded in the job's outcome; never aborts siblings.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JobError {
    /// The model failed during the run (e.g. numerical divergence)
    #[error("simulation failed: {0}")]
    Simulation(EnvError),

    /// The worker running the job panicked
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// The job finished but its output could not be written
    #[error("output not written: {0}")]
    Output(String),

    /// The batch was cancelled before the job started
    #[error("cancelled before start")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_error_converts_to_resolution() {
        let err: SimError = EnvError::UnknownPump("Foo".into()).into();
        assert!(matches!(err, SimError::Resolution(_)));
        assert_eq!(err.to_string(), "Resolution failed: Unknown pump type: Foo");
    }

    #[test]
    fn test_job_error_message() {
        let err = JobError::Simulation(EnvError::divergence(30.0, "non-finite state"));
        assert_eq!(
            err.to_string(),
            "simulation failed: Model diverged at t=30.0min: non-finite state"
        );
    }
}
