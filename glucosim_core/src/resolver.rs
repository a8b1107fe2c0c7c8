//! `ModelResolver` backed by the reference registry and device tables.

use crate::patient::MinimalModelPatient;
use crate::pump::InsulinPump;
use crate::registry::PatientRegistry;
use crate::sensor::CgmSensor;
use glucosim_env::{EnvError, ModelResolver, PatientId, PatientModel, PumpModel, SensorModel};

/// Resolves minimal-model patients from a registry, CGMs from
/// [`SENSOR_SPECS`](crate::sensor::SENSOR_SPECS) and pumps from
/// [`PUMP_SPECS`](crate::pump::PUMP_SPECS).
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    registry: PatientRegistry,
}

impl ReferenceResolver {
    /// Creates a resolver over a registry.
    pub fn new(registry: PatientRegistry) -> Self {
        Self { registry }
    }

    /// Creates a resolver over the bundled registry.
    pub fn with_default_registry() -> Result<Self, EnvError> {
        Ok(Self::new(PatientRegistry::load_default()?))
    }

    /// The underlying registry.
    pub fn registry(&self) -> &PatientRegistry {
        &self.registry
    }
}

impl ModelResolver for ReferenceResolver {
    fn resolve_patient(&self, name: &PatientId) -> Result<Box<dyn PatientModel>, EnvError> {
        let record = self
            .registry
            .get(name)
            .ok_or_else(|| EnvError::UnknownPatient(name.to_string()))?;
        let params = record
            .params
            .clone()
            .ok_or_else(|| EnvError::registry(format!("no model parameters for {}", name)))?;
        Ok(Box::new(MinimalModelPatient::new(record.id.clone(), params)))
    }

    fn resolve_sensor(&self, type_name: &str, seed: u64) -> Result<Box<dyn SensorModel>, EnvError> {
        Ok(Box::new(CgmSensor::with_name(type_name, seed)?))
    }

    fn resolve_pump(&self, type_name: &str) -> Result<Box<dyn PumpModel>, EnvError> {
        Ok(Box::new(InsulinPump::with_name(type_name)?))
    }
}
