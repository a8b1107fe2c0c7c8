//! Experiment configuration.
//!
//! The default configuration reproduces the classic comparison setup: the
//! adolescent cohort over three days with the standard four-meal day, a
//! Dexcom sensor and an Insulet pump, comparing a basal-bolus controller
//! against a PID controller.

use crate::cohort::CohortGroup;
use crate::error::SimError;
use crate::scenario::{MealPattern, ScenarioJitter};
use chrono::NaiveDateTime;
use glucosim_core::controller::DEFAULT_TARGET;
use glucosim_core::{BasalBolusController, PidController};
use glucosim_env::Controller;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which jobs share a realized scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPolicy {
    /// One scenario for every patient under every controller
    #[default]
    Shared,
    /// One scenario per controller arm, shared by its patients
    PerArm,
    /// One scenario per patient, shared across arms
    PerPatient,
}

impl ScenarioPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioPolicy::Shared => "shared",
            ScenarioPolicy::PerArm => "per_arm",
            ScenarioPolicy::PerPatient => "per_patient",
        }
    }
}

impl std::fmt::Display for ScenarioPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn default_target() -> f64 {
    DEFAULT_TARGET
}

/// A controller arm of the experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerSpec {
    /// Profile basal plus meal bolus
    BasalBolus {
        #[serde(default = "default_target")]
        target: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// PID feedback on the CGM error
    Pid {
        p: f64,
        i: f64,
        d: f64,
        #[serde(default = "default_target")]
        target: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

impl ControllerSpec {
    /// Basal-bolus arm with the default target.
    pub fn basal_bolus() -> Self {
        ControllerSpec::BasalBolus {
            target: DEFAULT_TARGET,
            label: None,
        }
    }

    /// PID arm with the default target.
    pub fn pid(p: f64, i: f64, d: f64) -> Self {
        ControllerSpec::Pid {
            p,
            i,
            d,
            target: DEFAULT_TARGET,
            label: None,
        }
    }

    /// Sets the arm label.
    pub fn labeled(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            ControllerSpec::BasalBolus { label, .. } | ControllerSpec::Pid { label, .. } => {
                *label = Some(name.into());
            }
        }
        self
    }

    /// Arm label; also the arm's folder name.
    pub fn label(&self) -> String {
        match self {
            ControllerSpec::BasalBolus { label: Some(l), .. } | ControllerSpec::Pid { label: Some(l), .. } => {
                l.clone()
            }
            ControllerSpec::BasalBolus { label: None, .. } => "BBController".to_string(),
            ControllerSpec::Pid { p, i, d, label: None, .. } => format!("PIDController_{}_{}_{}", p, i, d),
        }
    }

    /// Builds a fresh controller template.
    pub fn build(&self) -> Box<dyn Controller> {
        match *self {
            ControllerSpec::BasalBolus { target, .. } => Box::new(BasalBolusController::with_target(target)),
            ControllerSpec::Pid { p, i, d, target, .. } => Box::new(PidController::with_target(p, i, d, target)),
        }
    }

    fn validate(&self) -> Result<(), SimError> {
        let label = self.label();
        if label.trim().is_empty() {
            return Err(SimError::invalid("controller label is empty"));
        }
        if label.contains(['/', '\\']) || label == "." || label == ".." {
            return Err(SimError::invalid(format!("controller label '{}' is not a valid folder name", label)));
        }
        let finite = match *self {
            ControllerSpec::BasalBolus { target, .. } => target.is_finite(),
            ControllerSpec::Pid { p, i, d, target, .. } => [p, i, d, target].iter().all(|v| v.is_finite()),
        };
        if !finite {
            return Err(SimError::invalid(format!("controller {} has a non-finite parameter", label)));
        }
        Ok(())
    }
}

/// Full configuration of one experiment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Master seed for every random stream
    pub seed: u64,
    /// Cohort group name (ignored when `patients` is set)
    pub cohort: String,
    /// Explicit patient list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patients: Option<Vec<String>>,
    /// Simulated days
    pub days: u32,
    /// Daily meal pattern
    pub base_pattern: MealPattern,
    /// Meal jitter
    pub jitter: ScenarioJitter,
    /// Scenario sharing between jobs
    pub scenario_policy: ScenarioPolicy,
    /// Scenario start; midnight of the current day when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveDateTime>,
    /// Sensor type name
    pub sensor: String,
    /// Sensor noise seed
    pub sensor_seed: u64,
    /// Pump type name
    pub pump: String,
    /// Controller arms, run in order
    pub controllers: Vec<ControllerSpec>,
    /// Run jobs of an arm in parallel
    pub parallel: bool,
    /// Worker cap; available parallelism when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    /// Root of the timestamped result folders
    pub output_root: PathBuf,
    /// Write per-job CSV, run log and summary
    pub write_outputs: bool,
    /// Return an error after reporting when any job failed
    pub fail_on_job_error: bool,
    /// Patient registry CSV; the built-in registry when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<PathBuf>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            cohort: CohortGroup::Adolescents.name().to_string(),
            patients: None,
            days: 3,
            base_pattern: MealPattern::standard_day(),
            jitter: ScenarioJitter::default(),
            scenario_policy: ScenarioPolicy::Shared,
            start_time: None,
            sensor: "Dexcom".to_string(),
            sensor_seed: 1,
            pump: "Insulet".to_string(),
            controllers: vec![
                ControllerSpec::basal_bolus(),
                ControllerSpec::pid(-0.0001, -0.000000275, -0.1).labeled("PIDController_0.0001_0.00000275_0.1"),
            ],
            parallel: true,
            max_workers: None,
            output_root: PathBuf::from("./results"),
            write_outputs: true,
            fail_on_job_error: false,
            registry: None,
        }
    }
}

impl ExperimentConfig {
    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_cohort(mut self, cohort: impl Into<String>) -> Self {
        self.cohort = cohort.into();
        self.patients = None;
        self
    }

    pub fn with_patients(mut self, patients: Vec<String>) -> Self {
        self.patients = Some(patients);
        self
    }

    pub fn with_days(mut self, days: u32) -> Self {
        self.days = days;
        self
    }

    pub fn with_controllers(mut self, controllers: Vec<ControllerSpec>) -> Self {
        self.controllers = controllers;
        self
    }

    pub fn with_scenario_policy(mut self, policy: ScenarioPolicy) -> Self {
        self.scenario_policy = policy;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    pub fn with_write_outputs(mut self, write: bool) -> Self {
        self.write_outputs = write;
        self
    }

    /// Simulated time span.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.days) * 24 * 3600)
    }

    /// Checks the configuration before anything is built.
    ///
    /// # Errors
    /// * `InvalidArgument` describing the first problem found
    pub fn validate(&self) -> Result<(), SimError> {
        if self.days == 0 {
            return Err(SimError::invalid("days must be positive"));
        }
        if self.base_pattern.is_empty() {
            return Err(SimError::invalid("base meal pattern is empty"));
        }
        for &(hour, grams) in self.base_pattern.meals() {
            if !hour.is_finite() || !grams.is_finite() {
                return Err(SimError::invalid(format!("meal ({}, {}) is not finite", hour, grams)));
            }
        }
        let ScenarioJitter {
            time_std_hours,
            meal_std_grams,
            steady_meal_std_grams,
        } = self.jitter;
        if [time_std_hours, meal_std_grams, steady_meal_std_grams]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(SimError::invalid("jitter standard deviations must be finite and non-negative"));
        }
        match &self.patients {
            Some(list) if list.is_empty() => return Err(SimError::invalid("explicit patient list is empty")),
            Some(_) => {}
            None => {
                self.cohort.parse::<CohortGroup>()?;
            }
        }
        if self.sensor.is_empty() || self.pump.is_empty() {
            return Err(SimError::invalid("sensor and pump must be named"));
        }
        if self.controllers.is_empty() {
            return Err(SimError::invalid("no controllers configured"));
        }
        let mut labels = HashSet::new();
        for spec in &self.controllers {
            spec.validate()?;
            if !labels.insert(spec.label()) {
                return Err(SimError::invalid(format!("controller label '{}' used twice", spec.label())));
            }
        }
        if self.max_workers == Some(0) {
            return Err(SimError::invalid("max_workers must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ExperimentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.duration(), Duration::from_secs(3 * 86_400));
        assert_eq!(config.controllers.len(), 2);
        assert_eq!(config.controllers[0].label(), "BBController");
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let json = r#"{
            "seed": 7,
            "cohort": "Adults",
            "days": 1,
            "controllers": [
                {"type": "basal_bolus"},
                {"type": "pid", "p": -0.0001, "i": 0.0, "d": 0.0, "label": "pid-a"}
            ]
        }"#;
        let config: ExperimentConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.seed, 7);
        assert_eq!(config.sensor, "Dexcom");
        assert_eq!(config.base_pattern, MealPattern::standard_day());
        assert_eq!(config.scenario_policy, ScenarioPolicy::Shared);
        assert_eq!(config.controllers[1].label(), "pid-a");
        assert_eq!(config.controllers[1].build().name(), "PIDController");
    }

    #[test]
    fn test_policy_parses_snake_case() {
        let config: ExperimentConfig = serde_json::from_str(r#"{"scenario_policy": "per_patient"}"#).unwrap();
        assert_eq!(config.scenario_policy, ScenarioPolicy::PerPatient);
    }

    #[test]
    fn test_invalid_configs() {
        let base = ExperimentConfig::default();
        assert!(base.clone().with_days(0).validate().is_err());
        assert!(base.clone().with_cohort("Elderly").validate().is_err());
        assert!(base.clone().with_patients(vec![]).validate().is_err());
        assert!(base.clone().with_controllers(vec![]).validate().is_err());
        assert!(base.clone().with_max_workers(0).validate().is_err());

        let twice = vec![ControllerSpec::basal_bolus(), ControllerSpec::basal_bolus()];
        assert!(base.clone().with_controllers(twice).validate().is_err());

        let bad_label = vec![ControllerSpec::basal_bolus().labeled("a/b")];
        assert!(base.clone().with_controllers(bad_label).validate().is_err());

        let mut empty_pattern = base.clone();
        empty_pattern.base_pattern = MealPattern::new(vec![]);
        assert!(empty_pattern.validate().is_err());

        let mut negative_jitter = base;
        negative_jitter.jitter.meal_std_grams = -1.0;
        assert!(negative_jitter.validate().is_err());
    }

    #[test]
    fn test_default_labels() {
        assert_eq!(ControllerSpec::pid(1.0, 0.5, 0.0).label(), "PIDController_1_0.5_0");
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("glucosim-config-{}.json", uuid::Uuid::new_v4()));
        let config = ExperimentConfig::default().with_seed(99).with_days(2);
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = ExperimentConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.seed, 99);
        assert_eq!(loaded.days, 2);
        let labels: Vec<String> = loaded.controllers.iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["BBController", "PIDController_0.0001_0.00000275_0.1"]);
    }
}
