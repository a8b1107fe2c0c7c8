//! Clone-on-distribute factories for environments and controllers.
//!
//! Both factories hand out owned values. A scenario template or controller
//! template is never referenced by the jobs built from it.

use crate::error::SimError;
use glucosim_core::SimulationEnvironment;
use glucosim_env::{Controller, ModelResolver, PatientId, Scenario};
use std::sync::Arc;
use tracing::debug;

/// Fixed device configuration of an experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Sensor type name (e.g. "Dexcom")
    pub sensor: String,
    /// Sensor noise seed
    pub sensor_seed: u64,
    /// Pump type name (e.g. "Insulet")
    pub pump: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sensor: "Dexcom".to_string(),
            sensor_seed: 1,
            pump: "Insulet".to_string(),
        }
    }
}

/// Builds one isolated environment per patient.
#[derive(Clone)]
pub struct EnvironmentFactory {
    resolver: Arc<dyn ModelResolver>,
    devices: DeviceConfig,
}

impl EnvironmentFactory {
    /// Creates a factory.
    pub fn new(resolver: Arc<dyn ModelResolver>, devices: DeviceConfig) -> Self {
        Self { resolver, devices }
    }

    /// Device configuration used for every environment.
    pub fn devices(&self) -> &DeviceConfig {
        &self.devices
    }

    /// Builds an environment for `patient` holding its own copy of `template`.
    ///
    /// # Errors
    /// * `Resolution` if the patient, sensor or pump cannot be resolved
    pub fn build(&self, patient: &PatientId, template: &Scenario) -> Result<SimulationEnvironment, SimError> {
        let patient_model = self.resolver.resolve_patient(patient)?;
        let sensor = self
            .resolver
            .resolve_sensor(&self.devices.sensor, self.devices.sensor_seed)?;
        let pump = self.resolver.resolve_pump(&self.devices.pump)?;

        debug!(patient = %patient, sensor = %self.devices.sensor, pump = %self.devices.pump, "Built environment");
        Ok(SimulationEnvironment::new(patient_model, sensor, pump, template.clone()))
    }

    /// Builds one environment per patient, all from the same template.
    pub fn build_all(&self, patients: &[PatientId], template: &Scenario) -> Result<Vec<SimulationEnvironment>, SimError> {
        patients.iter().map(|p| self.build(p, template)).collect()
    }

    /// Builds one environment per patient with a per-patient template.
    ///
    /// # Errors
    /// * `InvalidArgument` if the two lists differ in length
    pub fn build_each(&self, patients: &[PatientId], templates: &[Scenario]) -> Result<Vec<SimulationEnvironment>, SimError> {
        if patients.len() != templates.len() {
            return Err(SimError::invalid(format!(
                "{} patients but {} scenarios",
                patients.len(),
                templates.len()
            )));
        }
        patients
            .iter()
            .zip(templates)
            .map(|(p, t)| self.build(p, t))
            .collect()
    }
}

impl std::fmt::Debug for EnvironmentFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentFactory")
            .field("devices", &self.devices)
            .finish_non_exhaustive()
    }
}

/// Produces independent controller instances from a template.
pub struct ControllerReplicator;

impl ControllerReplicator {
    /// Returns `count` deep copies of `template`, each reset to a clean state.
    ///
    /// Replicas share nothing with the template or with each other, so state
    /// accumulated in the template (or in one replica) never reaches a job.
    pub fn replicate(template: &dyn Controller, count: usize) -> Vec<Box<dyn Controller>> {
        (0..count)
            .map(|_| {
                let mut replica = template.clone_box();
                replica.reset();
                replica
            })
            .collect()
    }
}
