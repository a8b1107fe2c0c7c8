//! Error types for the glucosim environment abstraction.

use thiserror::Error;

/// Errors raised by collaborators (model resolution and model execution).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EnvError {
    /// No patient with this name in the registry
    #[error("Unknown patient: {0}")]
    UnknownPatient(String),

    /// Sensor type name is not recognized
    #[error("Unknown sensor type: {0}")]
    UnknownSensor(String),

    /// Pump type name is not recognized
    #[error("Unknown pump type: {0}")]
    UnknownPump(String),

    /// Reference registry could not be read or is malformed
    #[error("Registry error: {0}")]
    Registry(String),

    /// Model state left its valid domain during integration
    #[error("Model diverged at t={time_min:.1}min: {reason}")]
    Divergence {
        /// Simulation minute at which divergence was detected
        time_min: f64,
        /// Human-readable cause
        reason: String,
    },
}

impl EnvError {
    /// Creates a registry error.
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    /// Creates a divergence error.
    pub fn divergence(time_min: f64, reason: impl Into<String>) -> Self {
        Self::Divergence {
            time_min,
            reason: reason.into(),
        }
    }

    /// Returns true if this error was raised while resolving a model by name.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            EnvError::UnknownPatient(_)
                | EnvError::UnknownSensor(_)
                | EnvError::UnknownPump(_)
                | EnvError::Registry(_)
        )
    }
}
