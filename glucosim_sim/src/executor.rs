//! Batch execution of simulation jobs.
//!
//! Each job runs on tokio's blocking pool. In parallel mode a semaphore caps
//! how many jobs run at once; outcomes are always returned in submission
//! order, whatever order the jobs finish in.

use crate::error::JobError;
use crate::matrix::{ExperimentBatch, SimulationJob};
use glucosim_core::{run_single, TimeSeries};
use glucosim_env::PatientId;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Cooperative cancellation flag shared by a batch.
///
/// Jobs check it once before starting; a job already running completes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every job that has not started yet.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once `cancel` was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one job together with its identity.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Position of the job in its batch
    pub index: usize,
    /// Simulated patient
    pub patient: PatientId,
    /// Controller arm label
    pub controller_label: String,
    /// Output path of the job's series
    pub output_path: PathBuf,
    /// The series, or why there is none
    pub result: Result<TimeSeries, JobError>,
}

impl JobOutcome {
    /// Returns true if the job produced a series.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Identity of a job, kept outside the worker so a panic cannot lose it.
struct JobMeta {
    index: usize,
    patient: PatientId,
    controller_label: String,
    output_path: PathBuf,
}

impl JobMeta {
    fn of(job: &SimulationJob) -> Self {
        Self {
            index: job.index,
            patient: job.patient().clone(),
            controller_label: job.controller_label.clone(),
            output_path: job.output_path.clone(),
        }
    }

    fn finish(self, result: Result<TimeSeries, JobError>) -> JobOutcome {
        JobOutcome {
            index: self.index,
            patient: self.patient,
            controller_label: self.controller_label,
            output_path: self.output_path,
            result,
        }
    }
}

/// Runs batches of jobs serially or in parallel.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    max_workers: usize,
    write_outputs: bool,
    cancel: CancelToken,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchExecutor {
    /// Creates an executor sized to the available parallelism, without outputs.
    pub fn new() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            max_workers: workers,
            write_outputs: false,
            cancel: CancelToken::new(),
        }
    }

    /// Caps the number of concurrently running jobs (at least 1).
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Enables or disables writing each successful series to its output path.
    pub fn with_outputs(mut self, write_outputs: bool) -> Self {
        self.write_outputs = write_outputs;
        self
    }

    /// Uses an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Worker cap.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Token that cancels this executor's pending jobs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs every job of `batch` and returns one outcome per job, in order.
    ///
    /// Never fails as a whole: per-job failures are recorded in the outcome.
    /// With outputs enabled, a job whose output path was already claimed by an
    /// earlier job is not run and fails with `JobError::Output`.
    pub async fn execute(&self, batch: ExperimentBatch, parallel: bool) -> Vec<JobOutcome> {
        let total = batch.len();
        info!(
            batch = %batch.label,
            jobs = total,
            parallel,
            workers = if parallel { self.max_workers } else { 1 },
            "Executing batch"
        );

        let rejected = if self.write_outputs {
            path_collisions(&batch.jobs)
        } else {
            HashMap::new()
        };

        let outcomes = if parallel {
            self.execute_parallel(batch.jobs, rejected).await
        } else {
            self.execute_serial(batch.jobs, rejected).await
        };

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        if failed > 0 {
            warn!(batch = %batch.label, failed, total, "Batch finished with failures");
        } else {
            info!(batch = %batch.label, total, "Batch finished");
        }
        outcomes
    }

    async fn execute_serial(&self, jobs: Vec<SimulationJob>, mut rejected: HashMap<usize, JobError>) -> Vec<JobOutcome> {
        let mut outcomes = Vec::with_capacity(jobs.len());
        for (position, job) in jobs.into_iter().enumerate() {
            let meta = JobMeta::of(&job);
            if let Some(err) = rejected.remove(&position) {
                outcomes.push(meta.finish(Err(err)));
                continue;
            }
            let cancel = self.cancel.clone();
            let write_outputs = self.write_outputs;
            let handle = tokio::task::spawn_blocking(move || run_job(job, write_outputs, &cancel));
            outcomes.push(meta.finish(join(handle).await));
        }
        outcomes
    }

    async fn execute_parallel(&self, jobs: Vec<SimulationJob>, mut rejected: HashMap<usize, JobError>) -> Vec<JobOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut pending = Vec::with_capacity(jobs.len());

        for (position, job) in jobs.into_iter().enumerate() {
            let meta = JobMeta::of(&job);
            if let Some(err) = rejected.remove(&position) {
                pending.push((meta, Pending::Done(Err(err))));
                continue;
            }
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    pending.push((meta, Pending::Done(Err(JobError::Cancelled))));
                    continue;
                }
            };
            let cancel = self.cancel.clone();
            let write_outputs = self.write_outputs;
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                run_job(job, write_outputs, &cancel)
            });
            pending.push((meta, Pending::Running(handle)));
        }

        // Await in submission order
        let mut outcomes = Vec::with_capacity(pending.len());
        for (meta, state) in pending {
            let result = match state {
                Pending::Running(handle) => join(handle).await,
                Pending::Done(result) => result,
            };
            outcomes.push(meta.finish(result));
        }
        outcomes
    }
}

/// A submitted job, or one settled without running.
enum Pending {
    Running(JoinHandle<Result<TimeSeries, JobError>>),
    Done(Result<TimeSeries, JobError>),
}

/// Positions of jobs whose output path an earlier job already claimed.
fn path_collisions(jobs: &[SimulationJob]) -> HashMap<usize, JobError> {
    let mut owners: HashMap<&PathBuf, usize> = HashMap::new();
    let mut rejected = HashMap::new();
    for (position, job) in jobs.iter().enumerate() {
        match owners.get(&job.output_path) {
            Some(&owner) => {
                warn!(job = job.index, owner, path = %job.output_path.display(), "Output path already claimed");
                rejected.insert(
                    position,
                    JobError::Output(format!("output path collides with job {}", owner)),
                );
            }
            None => {
                owners.insert(&job.output_path, job.index);
            }
        }
    }
    rejected
}

async fn join(handle: JoinHandle<Result<TimeSeries, JobError>>) -> Result<TimeSeries, JobError> {
    match handle.await {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(JobError::Panicked(panic_message(err.into_panic()))),
        Err(_) => Err(JobError::Cancelled),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one job to completion on the current (blocking) thread.
fn run_job(mut job: SimulationJob, write_outputs: bool, cancel: &CancelToken) -> Result<TimeSeries, JobError> {
    let patient = job.patient().clone();
    if cancel.is_cancelled() {
        debug!(job = job.index, patient = %patient, "Job cancelled before start");
        return Err(JobError::Cancelled);
    }

    debug!(job = job.index, patient = %patient, controller = %job.controller_label, "Job started");
    let series = run_single(&mut job.environment, job.controller.as_mut(), job.duration).map_err(|e| {
        warn!(job = job.index, patient = %patient, controller = %job.controller_label, error = %e, "Job failed");
        JobError::Simulation(e)
    })?;

    if write_outputs {
        series.write_csv(&job.output_path).map_err(|e| {
            warn!(job = job.index, path = %job.output_path.display(), error = %e, "Could not write series");
            JobError::Output(e.to_string())
        })?;
    }

    debug!(job = job.index, patient = %patient, samples = series.len(), "Job finished");
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{ControllerReplicator, DeviceConfig, EnvironmentFactory};
    use crate::matrix::ExperimentMatrixBuilder;
    use chrono::NaiveDate;
    use glucosim_core::{BasalBolusController, ReferenceResolver};
    use glucosim_env::{
        Action, ControlContext, Controller, EnvError, PatientModel, PatientProfile, Scenario, ScenarioEvent,
    };
    use std::path::Path;
    use std::time::Duration;

    /// Patient whose model diverges on its first step.
    #[derive(Clone)]
    struct FailingPatient {
        id: PatientId,
        profile: PatientProfile,
    }

    impl PatientModel for FailingPatient {
        fn name(&self) -> &PatientId {
            &self.id
        }

        fn profile(&self) -> &PatientProfile {
            &self.profile
        }

        fn glucose(&self) -> f64 {
            120.0
        }

        fn step(&mut self, _carbs: f64, _insulin: f64, _dt_min: f64) -> Result<(), EnvError> {
            Err(EnvError::divergence(0.0, "non-finite state"))
        }

        fn reset(&mut self) {}

        fn clone_box(&self) -> Box<dyn PatientModel> {
            Box::new(self.clone())
        }
    }

    /// Controller that panics on its first sample.
    #[derive(Clone)]
    struct Panicky;

    impl Controller for Panicky {
        fn name(&self) -> &str {
            "Panicky"
        }

        fn policy(&mut self, _cgm: f64, _ctx: &ControlContext<'_>) -> Action {
            panic!("controller exploded")
        }

        fn reset(&mut self) {}

        fn clone_box(&self) -> Box<dyn Controller> {
            Box::new(self.clone())
        }
    }

    fn batch(names: &[&str], template: &dyn Controller, minutes: u64) -> ExperimentBatch {
        let resolver = ReferenceResolver::with_default_registry().unwrap();
        let factory = EnvironmentFactory::new(Arc::new(resolver), DeviceConfig::default());
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let scenario = Scenario::new(start, vec![ScenarioEvent::new(0.5, 40.0)]);
        let patients: Vec<PatientId> = names.iter().map(|n| PatientId::new(*n)).collect();
        let envs = factory.build_all(&patients, &scenario).unwrap();
        let ctrls = ControllerReplicator::replicate(template, envs.len());
        ExperimentMatrixBuilder::build(
            template.name(),
            envs,
            ctrls,
            Duration::from_secs(minutes * 60),
            Path::new("/nonexistent"),
        )
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_batch_keeps_submission_order() {
        let batch = batch(&["adolescent#001", "adolescent#002"], &BasalBolusController::default(), 60);
        let outcomes = BatchExecutor::new().with_max_workers(2).execute(batch, true).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].index, 0);
        assert_eq!(outcomes[0].patient.as_str(), "adolescent#001");
        assert_eq!(outcomes[1].index, 1);
        assert_eq!(outcomes[1].patient.as_str(), "adolescent#002");
        for outcome in &outcomes {
            let series = outcome.result.as_ref().unwrap();
            // Dexcom samples every 3 minutes
            assert_eq!(series.len(), 20);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_order_independent_of_completion() {
        let mut batch = batch(&["adult#001", "adult#002"], &BasalBolusController::default(), 30);
        // First job simulates a full day, second finishes long before it
        batch.jobs[0].duration = Duration::from_secs(24 * 3600);
        let outcomes = BatchExecutor::new().with_max_workers(2).execute(batch, true).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].patient.as_str(), "adult#001");
        assert_eq!(outcomes[0].result.as_ref().unwrap().len(), 480);
        assert_eq!(outcomes[1].patient.as_str(), "adult#002");
        assert_eq!(outcomes[1].result.as_ref().unwrap().len(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_colliding_output_paths_are_rejected() {
        let dir = std::env::temp_dir().join(format!("glucosim-exec-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut batch = batch(&["adult#001", "adult#002", "adult#003"], &BasalBolusController::default(), 30);
        for job in &mut batch.jobs {
            job.output_path = dir.join(job.output_path.file_name().unwrap());
        }
        batch.jobs[1].output_path = batch.jobs[0].output_path.clone();

        let outcomes = BatchExecutor::new().with_outputs(true).execute(batch, true).await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_ok());
        assert_eq!(outcomes[1].patient.as_str(), "adult#002");
        assert_eq!(
            outcomes[1].result,
            Err(JobError::Output("output path collides with job 0".to_string()))
        );
        assert!(outcomes[2].is_ok());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_shared_path_allowed_without_outputs() {
        let mut batch = batch(&["adult#001", "adult#002"], &BasalBolusController::default(), 30);
        batch.jobs[1].output_path = batch.jobs[0].output_path.clone();
        let outcomes = BatchExecutor::new().execute(batch, false).await;
        assert!(outcomes.iter().all(|o| o.is_ok()));
    }

    #[tokio::test]
    async fn test_serial_and_parallel_agree() {
        let names = ["adult#001", "adult#002", "adult#003"];
        let serial = BatchExecutor::new()
            .execute(batch(&names, &BasalBolusController::default(), 120), false)
            .await;
        let parallel = BatchExecutor::new()
            .with_max_workers(3)
            .execute(batch(&names, &BasalBolusController::default(), 120), true)
            .await;

        for (s, p) in serial.iter().zip(&parallel) {
            assert_eq!(s.patient, p.patient);
            assert_eq!(s.result, p.result);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_job_does_not_disturb_siblings() {
        let mut batch = batch(&["child#001", "child#002", "child#003"], &BasalBolusController::default(), 60);
        let profile = batch.jobs[1].environment.patient.profile().clone();
        batch.jobs[1].environment.patient = Box::new(FailingPatient {
            id: PatientId::new("child#002"),
            profile,
        });
        let outcomes = BatchExecutor::new().with_max_workers(3).execute(batch, true).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(outcomes[1].result, Err(JobError::Simulation(_))));
        assert_eq!(outcomes[1].patient.as_str(), "child#002");
        assert!(outcomes[2].result.is_ok());
    }

    #[tokio::test]
    async fn test_panicking_job_is_recorded() {
        let outcomes = BatchExecutor::new()
            .execute(batch(&["adult#001", "adult#002"], &Panicky, 30), true)
            .await;

        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            match &outcome.result {
                Err(JobError::Panicked(msg)) => assert!(msg.contains("controller exploded")),
                other => panic!("expected a panic outcome, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let executor = BatchExecutor::new();
        executor.cancel_token().cancel();

        let outcomes = executor
            .execute(batch(&["adult#001", "adult#002"], &BasalBolusController::default(), 30), true)
            .await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.result == Err(JobError::Cancelled)));
    }

    #[tokio::test]
    async fn test_write_failure_is_an_output_error() {
        // Output root does not exist, so the CSV cannot be created
        let outcomes = BatchExecutor::new()
            .with_outputs(true)
            .execute(batch(&["adult#001"], &BasalBolusController::default(), 30), false)
            .await;
        assert!(matches!(outcomes[0].result, Err(JobError::Output(_))));
    }

    #[tokio::test]
    async fn test_writes_series_when_enabled() {
        let dir = std::env::temp_dir().join(format!("glucosim-exec-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let resolver = ReferenceResolver::with_default_registry().unwrap();
        let factory = EnvironmentFactory::new(Arc::new(resolver), DeviceConfig::default());
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let envs = factory
            .build_all(&[PatientId::new("adult#004")], &Scenario::new(start, vec![]))
            .unwrap();
        let ctrls = ControllerReplicator::replicate(&BasalBolusController::default(), 1);
        let batch = ExperimentMatrixBuilder::build("BB", envs, ctrls, Duration::from_secs(1800), &dir).unwrap();

        let outcomes = BatchExecutor::new().with_outputs(true).execute(batch, false).await;
        assert!(outcomes[0].is_ok());
        let written = std::fs::read_to_string(dir.join("adult#004.csv")).unwrap();
        // Header plus one line per sample
        assert_eq!(written.lines().count(), 11);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
