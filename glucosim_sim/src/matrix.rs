//! Experiment matrix: pairs environments with controllers into jobs.

use crate::error::SimError;
use glucosim_core::SimulationEnvironment;
use glucosim_env::{Controller, PatientId};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One self-contained unit of work.
///
/// Owns its environment and controller outright, so it can be moved onto any
/// worker thread and run without touching shared state.
pub struct SimulationJob {
    /// Position in the batch (submission order)
    pub index: usize,
    /// Environment (owns patient, sensor, pump and scenario)
    pub environment: SimulationEnvironment,
    /// Controller instance owned by this job only
    pub controller: Box<dyn Controller>,
    /// Label of the controller arm
    pub controller_label: String,
    /// Simulated time span
    pub duration: Duration,
    /// Where the series is written when outputs are enabled
    pub output_path: PathBuf,
}

impl SimulationJob {
    /// Patient simulated by this job.
    pub fn patient(&self) -> &PatientId {
        self.environment.patient.name()
    }
}

impl std::fmt::Debug for SimulationJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationJob")
            .field("index", &self.index)
            .field("environment", &self.environment)
            .field("controller", &self.controller.name())
            .field("controller_label", &self.controller_label)
            .field("duration", &self.duration)
            .field("output_path", &self.output_path)
            .finish()
    }
}

/// An ordered list of jobs under one label.
#[derive(Debug)]
pub struct ExperimentBatch {
    /// Batch label (controller arm)
    pub label: String,
    /// Jobs in submission order
    pub jobs: Vec<SimulationJob>,
}

impl ExperimentBatch {
    /// Number of jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if the batch has no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Builds batches from equal-length environment and controller lists.
pub struct ExperimentMatrixBuilder;

impl ExperimentMatrixBuilder {
    /// Pairs `environments[i]` with `controllers[i]` into job `i`.
    ///
    /// The output path of each job is `<output_root>/<patient>.csv`.
    ///
    /// # Errors
    /// * `InvalidArgument` on a length mismatch, a zero duration or two jobs
    ///   writing to the same path
    pub fn build(
        label: impl Into<String>,
        environments: Vec<SimulationEnvironment>,
        controllers: Vec<Box<dyn Controller>>,
        duration: Duration,
        output_root: &Path,
    ) -> Result<ExperimentBatch, SimError> {
        let label = label.into();
        if environments.len() != controllers.len() {
            return Err(SimError::invalid(format!(
                "batch {}: {} environments but {} controllers",
                label,
                environments.len(),
                controllers.len()
            )));
        }
        if duration.is_zero() {
            return Err(SimError::invalid(format!("batch {}: duration must be non-zero", label)));
        }

        let mut seen = HashSet::with_capacity(environments.len());
        let mut jobs = Vec::with_capacity(environments.len());

        for (index, (environment, controller)) in environments.into_iter().zip(controllers).enumerate() {
            let stem = environment.patient.name().file_stem();
            let output_path = output_root.join(format!("{}.csv", stem));
            if !seen.insert(output_path.clone()) {
                return Err(SimError::invalid(format!(
                    "batch {}: two jobs write to {}",
                    label,
                    output_path.display()
                )));
            }
            jobs.push(SimulationJob {
                index,
                environment,
                controller,
                controller_label: label.clone(),
                duration,
                output_path,
            });
        }

        Ok(ExperimentBatch { label, jobs })
    }
}
