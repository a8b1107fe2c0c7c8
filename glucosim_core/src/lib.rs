//! glucosim Core - Reference Models for Glucose Control Experiments
//!
//! Concrete collaborators behind the `glucosim_env` traits:
//! 1. **Patients**: minimal-model virtual patients loaded from a registry
//! 2. **Devices**: seeded CGM sensors and quantizing insulin pumps
//! 3. **Controllers**: basal-bolus and PID reference algorithms
//!
//! plus the environment that ties one of each together and the loop that
//! runs it (`run_single`).

pub mod controller;
pub mod env;
pub mod patient;
pub mod pump;
pub mod registry;
pub mod resolver;
pub mod risk;
pub mod sensor;
pub mod simulate;

// Re-export key types for convenience
pub use controller::{BasalBolusController, PidController};
pub use env::{SimRecord, SimulationEnvironment, TimeSeries};
pub use patient::{MinimalModelParams, MinimalModelPatient};
pub use pump::InsulinPump;
pub use registry::{PatientGroup, PatientRecord, PatientRegistry};
pub use resolver::ReferenceResolver;
pub use risk::{risk_index, RiskIndex};
pub use sensor::CgmSensor;
pub use simulate::run_single;
