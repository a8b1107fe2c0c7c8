//! Experiment driver: from configuration to keyed results and reports.
//!
//! Setup (validation, cohort, scenarios, environments, controllers) happens
//! completely before the first job runs, so a bad patient name or device type
//! aborts the run without partial output. Arms then run one after another;
//! jobs inside an arm fan out on the batch executor.

use crate::aggregate::{aggregate, keys_for, KeyMode, ResultKey, ResultSet};
use crate::cohort::{Cohort, CohortSelector};
use crate::config::{ExperimentConfig, ScenarioPolicy};
use crate::error::{JobError, SimError};
use crate::executor::{BatchExecutor, CancelToken};
use crate::factory::{ControllerReplicator, DeviceConfig, EnvironmentFactory};
use crate::matrix::{ExperimentBatch, ExperimentMatrixBuilder};
use crate::report::{ArmSummary, ReportGenerator, SummaryReport};
use crate::runlog::{result_folder, RunLogger};
use crate::scenario::ScenarioGenerator;
use crate::seeds::SeedProvider;
use chrono::{Local, NaiveDateTime, NaiveTime};
use glucosim_core::{PatientRegistry, ReferenceResolver};
use glucosim_env::{ModelResolver, Scenario};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Results of one controller arm.
#[derive(Debug, Clone)]
pub struct ArmReport {
    /// Arm label
    pub label: String,
    /// Arm folder, when outputs are written
    pub directory: Option<PathBuf>,
    /// Realized scenarios used by this arm ("all" or the patient name)
    pub scenarios: Vec<(String, Scenario)>,
    /// Results keyed by patient, in cohort order
    pub results: ResultSet,
    /// Summary statistics
    pub summary: ArmSummary,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Master seed
    pub seed: u64,
    /// Simulated cohort
    pub cohort: Cohort,
    /// Timestamped run folder, when outputs are written
    pub output_dir: Option<PathBuf>,
    /// One report per arm, in configuration order
    pub arms: Vec<ArmReport>,
}

impl ExperimentReport {
    /// Number of jobs over all arms.
    pub fn total_jobs(&self) -> usize {
        self.arms.iter().map(|a| a.results.len()).sum()
    }

    /// Every failed job with its composite key.
    pub fn failures(&self) -> Vec<(ResultKey, JobError)> {
        self.arms
            .iter()
            .flat_map(|arm| {
                arm.results.failures().map(move |(key, err)| {
                    (ResultKey::composite(key.patient.clone(), arm.label.clone()), err.clone())
                })
            })
            .collect()
    }

    /// All arms in one set under composite `(patient, controller)` keys.
    pub fn combined(&self) -> Result<ResultSet, SimError> {
        let mut combined = ResultSet::new();
        for arm in &self.arms {
            for (key, result) in arm.results.iter() {
                combined.insert(
                    ResultKey::composite(key.patient.clone(), arm.label.clone()),
                    result.clone(),
                )?;
            }
        }
        Ok(combined)
    }
}

/// Scenario assignment of one arm, materialized before fan-out.
enum ArmScenarios {
    /// Same scenario for every patient
    Single(String, Scenario),
    /// One scenario per cohort member, in cohort order
    PerPatient(Vec<Scenario>),
}

/// A fully prepared arm, waiting to run.
struct PreparedArm {
    label: String,
    directory: PathBuf,
    scenarios: Vec<(String, Scenario)>,
    batch: ExperimentBatch,
}

/// Runs one configured experiment.
pub struct Experiment {
    config: ExperimentConfig,
    resolver: Option<Arc<dyn ModelResolver>>,
    cancel: CancelToken,
}

impl Experiment {
    /// Creates an experiment using the reference models.
    pub fn new(config: ExperimentConfig) -> Self {
        Self {
            config,
            resolver: None,
            cancel: CancelToken::new(),
        }
    }

    /// Resolves patients and devices through a custom resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn ModelResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Token that cancels jobs not yet started.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs every arm and returns the keyed results.
    ///
    /// # Errors
    /// * `InvalidArgument` for a bad configuration or cohort
    /// * `Resolution` for an unknown patient, sensor or pump
    /// * `Io`, `Csv`, `Json` when the run log or summary cannot be written
    /// * `JobsFailed` when `fail_on_job_error` is set and any job failed
    pub async fn run(&self) -> Result<ExperimentReport, SimError> {
        let config = &self.config;
        config.validate()?;

        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, seed = config.seed, "Starting experiment");

        let registry = match &config.registry {
            Some(path) => PatientRegistry::from_path(path)?,
            None => PatientRegistry::load_default()?,
        };
        let selector = CohortSelector::new(registry.clone());
        let cohort = match &config.patients {
            Some(names) => selector.select_names(names)?,
            None => selector.select_named(&config.cohort)?,
        };
        info!(cohort = %cohort.name, patients = cohort.len(), days = config.days, "Selected cohort");

        let resolver = match &self.resolver {
            Some(resolver) => resolver.clone(),
            None => Arc::new(ReferenceResolver::new(registry)) as Arc<dyn ModelResolver>,
        };
        let factory = EnvironmentFactory::new(
            resolver,
            DeviceConfig {
                sensor: config.sensor.clone(),
                sensor_seed: config.sensor_seed,
                pump: config.pump.clone(),
            },
        );

        let output_dir = config
            .write_outputs
            .then(|| result_folder(&config.output_root, Local::now()));
        let run_dir = output_dir.clone().unwrap_or_else(|| config.output_root.clone());

        // Nothing touches the filesystem until every job is built
        let arms = self.prepare(&cohort, &factory, &run_dir)?;
        if let Some(dir) = &output_dir {
            std::fs::create_dir_all(dir)?;
            info!(path = %dir.display(), "Writing results");
        }
        let labels: Vec<String> = arms.iter().map(|a| a.label.clone()).collect();

        let mut executor = BatchExecutor::new()
            .with_outputs(config.write_outputs)
            .with_cancel_token(self.cancel.clone());
        if let Some(workers) = config.max_workers {
            executor = executor.with_max_workers(workers);
        }

        let mut reports = Vec::with_capacity(arms.len());
        for arm in arms {
            reports.push(self.run_arm(arm, run_id, &cohort, &labels, &executor).await?);
        }

        let report = ExperimentReport {
            run_id,
            seed: config.seed,
            cohort,
            output_dir,
            arms: reports,
        };

        let failed = report.failures().len();
        let total = report.total_jobs();
        if failed > 0 {
            warn!(failed, total, "Experiment finished with failed jobs");
            if config.fail_on_job_error {
                return Err(SimError::JobsFailed { failed, total });
            }
        } else {
            info!(run_id = %run_id, total, "Experiment finished");
        }
        Ok(report)
    }

    /// Materializes scenarios and builds every batch.
    fn prepare(
        &self,
        cohort: &Cohort,
        factory: &EnvironmentFactory,
        run_dir: &std::path::Path,
    ) -> Result<Vec<PreparedArm>, SimError> {
        let config = &self.config;
        let start = config.start_time.unwrap_or_else(midnight_today);
        let generator = ScenarioGenerator::new(start).with_jitter(config.jitter);
        let seeds = SeedProvider::new(config.seed);

        let generate = |rng: &mut rand_chacha::ChaCha8Rng| generator.generate(&config.base_pattern, config.days, rng);

        // Per-patient scenarios are shared by every arm
        let shared = match config.scenario_policy {
            ScenarioPolicy::Shared => Some(ArmScenarios::Single("all".to_string(), generate(&mut seeds.experiment_rng())?)),
            ScenarioPolicy::PerPatient => Some(ArmScenarios::PerPatient(
                (0..cohort.len())
                    .map(|i| generate(&mut seeds.patient_rng(i)))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            ScenarioPolicy::PerArm => None,
        };

        let mut prepared = Vec::with_capacity(config.controllers.len());
        for (arm_index, spec) in config.controllers.iter().enumerate() {
            let label = spec.label();
            let directory = run_dir.join(&label);

            let arm_scenarios = match &shared {
                Some(ArmScenarios::Single(target, s)) => ArmScenarios::Single(target.clone(), s.clone()),
                Some(ArmScenarios::PerPatient(list)) => ArmScenarios::PerPatient(list.clone()),
                None => ArmScenarios::Single(label.clone(), generate(&mut seeds.arm_rng(arm_index))?),
            };

            let (environments, scenarios) = match arm_scenarios {
                ArmScenarios::Single(target, scenario) => {
                    let envs = factory.build_all(&cohort.patients, &scenario)?;
                    (envs, vec![(target, scenario)])
                }
                ArmScenarios::PerPatient(list) => {
                    let envs = factory.build_each(&cohort.patients, &list)?;
                    let named = cohort
                        .patients
                        .iter()
                        .map(|p| p.to_string())
                        .zip(list)
                        .collect();
                    (envs, named)
                }
            };

            let template = spec.build();
            let controllers = ControllerReplicator::replicate(template.as_ref(), environments.len());
            let batch = ExperimentMatrixBuilder::build(
                label.clone(),
                environments,
                controllers,
                config.duration(),
                &directory,
            )?;

            prepared.push(PreparedArm {
                label,
                directory,
                scenarios,
                batch,
            });
        }
        Ok(prepared)
    }

    async fn run_arm(
        &self,
        arm: PreparedArm,
        run_id: Uuid,
        cohort: &Cohort,
        labels: &[String],
        executor: &BatchExecutor,
    ) -> Result<ArmReport, SimError> {
        let config = &self.config;
        let PreparedArm {
            label,
            directory,
            scenarios,
            batch,
        } = arm;

        if config.write_outputs {
            std::fs::create_dir_all(&directory)?;
            RunLogger {
                run_id,
                seed: config.seed,
                cohort: cohort.name.clone(),
                patients: cohort.patients.clone(),
                sensor: config.sensor.clone(),
                sensor_seed: config.sensor_seed,
                pump: config.pump.clone(),
                base_pattern: config.base_pattern.clone(),
                policy: config.scenario_policy,
                scenarios: scenarios.clone(),
                controllers: labels.to_vec(),
            }
            .write(&directory)?;
        }

        let outcomes = executor.execute(batch, config.parallel).await;
        for outcome in &outcomes {
            if let Err(err) = &outcome.result {
                error!(
                    job = outcome.index,
                    patient = %outcome.patient,
                    controller = %outcome.controller_label,
                    reason = %err,
                    "Job failed"
                );
            }
        }

        let keys = keys_for(&outcomes, KeyMode::Patient);
        let results = aggregate(outcomes, keys)?;

        let summary = if config.write_outputs {
            SummaryReport::new(run_id, config.seed, label.clone()).generate(&results, &directory)?
        } else {
            ArmSummary::from_results(run_id, config.seed, label.clone(), &results)
        };

        info!(
            arm = %label,
            succeeded = summary.jobs.len(),
            failed = summary.failures.len(),
            "Arm finished"
        );

        Ok(ArmReport {
            label,
            directory: config.write_outputs.then_some(directory),
            scenarios,
            results,
            summary,
        })
    }
}

fn midnight_today() -> NaiveDateTime {
    Local::now().date_naive().and_time(NaiveTime::default())
}
