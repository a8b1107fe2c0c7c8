//! glucosim Environment Abstraction Layer
//!
//! This crate defines the seams between the experiment orchestrator and the
//! models it drives. The orchestrator never depends on a concrete patient,
//! sensor, pump or controller; it only sees the traits below.
//!
//! # Core Concept: Clone-on-Distribute
//!
//! Every model is owned by exactly one simulation job. Models are handed out
//! as boxed values and duplicated through `clone_box`, never shared behind a
//! reference, so parallel jobs cannot observe each other's state:
//! - **Patients**: physiological state integrated per job
//! - **Sensors**: noise generator state advanced per job
//! - **Controllers**: integrators and history buffers kept per job
//!
//! # Example
//!
//! ```ignore
//! use glucosim_env::{ModelResolver, PatientId};
//!
//! fn describe<R: ModelResolver>(resolver: &R) -> Result<(), glucosim_env::EnvError> {
//!     let patient = resolver.resolve_patient(&PatientId::new("adult#001"))?;
//!     let sensor = resolver.resolve_sensor("Dexcom", 1)?;
//!     println!("{} observed by {}", patient.name(), sensor.name());
//!     Ok(())
//! }
//! ```

mod error;
mod model;
mod resolver;
mod types;

pub use error::EnvError;
pub use model::{Action, ControlContext, Controller, PatientModel, PatientProfile, PumpModel, SensorModel};
pub use resolver::ModelResolver;
pub use types::{round2, PatientId, Scenario, ScenarioEvent};
