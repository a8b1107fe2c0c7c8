//! glucosim Experiment Orchestrator
//!
//! Runs batch experiments that compare insulin controllers over a cohort of
//! simulated patients under randomized, reproducible meal scenarios.
//!
//! # Pipeline
//!
//! ```text
//! CohortSelector ──► EnvironmentFactory ◄── ScenarioGenerator
//!                            │
//!                            ▼
//!    ControllerReplicator ──► ExperimentMatrixBuilder
//!                            │
//!                            ▼
//!                      BatchExecutor (spawn_blocking + Semaphore)
//!                            │
//!                            ▼
//!                   aggregate ──► SummaryReport / RunLogger
//! ```
//!
//! Every job owns its environment (patient, sensor, pump, scenario copy) and
//! its controller instance, so jobs run in parallel without shared mutable
//! state and results keep their submission order.
//!
//! # Usage
//!
//! ```ignore
//! use glucosim_sim::{Experiment, ExperimentConfig};
//!
//! let config = ExperimentConfig::default()
//!     .with_cohort("Adults")
//!     .with_days(2);
//!
//! let report = Experiment::new(config).run().await?;
//! for arm in &report.arms {
//!     println!("{}: {} failures", arm.label, arm.summary.failures.len());
//! }
//! ```

pub mod aggregate;
pub mod cohort;
pub mod config;
pub mod error;
pub mod executor;
pub mod experiment;
pub mod factory;
pub mod matrix;
pub mod report;
pub mod runlog;
pub mod scenario;
pub mod seeds;

pub use aggregate::{aggregate, keys_for, JobResult, KeyMode, ResultKey, ResultSet};
pub use cohort::{Cohort, CohortGroup, CohortSelector};
pub use config::{ControllerSpec, ExperimentConfig, ScenarioPolicy};
pub use error::{JobError, SimError};
pub use executor::{BatchExecutor, CancelToken, JobOutcome};
pub use experiment::{ArmReport, Experiment, ExperimentReport};
pub use factory::{ControllerReplicator, DeviceConfig, EnvironmentFactory};
pub use matrix::{ExperimentBatch, ExperimentMatrixBuilder, SimulationJob};
pub use report::{ArmSummary, GlycemicStats, JobSummary, ReportGenerator, SummaryReport};
pub use runlog::RunLogger;
pub use scenario::{MealPattern, ScenarioGenerator, ScenarioJitter};
pub use seeds::SeedProvider;
