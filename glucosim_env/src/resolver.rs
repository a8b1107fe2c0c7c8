//! Name-based resolution of model instances.

use crate::error::EnvError;
use crate::model::{PatientModel, PumpModel, SensorModel};
use crate::types::PatientId;

/// Resolves patients, sensors and pumps from names and configuration.
///
/// Every call returns a fresh, exclusively owned instance. Implementations
/// are shared read-only between threads while environments are built.
pub trait ModelResolver: Send + Sync {
    /// Looks up a patient profile in the reference registry.
    fn resolve_patient(&self, name: &PatientId) -> Result<Box<dyn PatientModel>, EnvError>;

    /// Builds a sensor of the named type with a seeded noise source.
    fn resolve_sensor(&self, type_name: &str, seed: u64) -> Result<Box<dyn SensorModel>, EnvError>;

    /// Builds a pump of the named type.
    fn resolve_pump(&self, type_name: &str) -> Result<Box<dyn PumpModel>, EnvError>;
}
