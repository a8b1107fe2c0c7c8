//! Simulation environment: one patient, one sensor, one pump, one scenario.

use crate::risk::risk_index;
use chrono::NaiveDateTime;
use glucosim_env::{ControlContext, Controller, EnvError, PatientModel, PumpModel, Scenario, SensorModel};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One sample of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimRecord {
    /// Absolute sample time
    pub time: NaiveDateTime,
    /// Minutes since start
    pub minutes: f64,
    /// True plasma glucose (mg/dL)
    pub bg: f64,
    /// Sensor reading (mg/dL)
    pub cgm: f64,
    /// Carbohydrate ingestion rate over the following period (g/min)
    pub cho: f64,
    /// Delivered insulin rate over the following period (U/min)
    pub insulin: f64,
    /// Low blood glucose index
    pub lbgi: f64,
    /// High blood glucose index
    pub hbgi: f64,
    /// Total risk index
    pub risk: f64,
}

/// Time-indexed result of one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSeries {
    records: Vec<SimRecord>,
}

impl TimeSeries {
    /// Creates an empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample.
    pub fn push(&mut self, record: SimRecord) {
        self.records.push(record);
    }

    /// All samples in time order.
    pub fn records(&self) -> &[SimRecord] {
        &self.records
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True glucose values in time order.
    pub fn glucose(&self) -> impl Iterator<Item = f64> + '_ {
        self.records.iter().map(|r| r.bg)
    }

    /// Writes the series as CSV with a header row.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl FromIterator<SimRecord> for TimeSeries {
    fn from_iter<I: IntoIterator<Item = SimRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// An isolated environment owned by exactly one job.
///
/// Every component is an owned value; nothing here is shared with another
/// environment.
pub struct SimulationEnvironment {
    /// Physiological model
    pub patient: Box<dyn PatientModel>,
    /// Glucose sensor
    pub sensor: Box<dyn SensorModel>,
    /// Insulin pump
    pub pump: Box<dyn PumpModel>,
    /// This environment's own copy of the meal scenario
    pub scenario: Scenario,
    /// Minutes since start
    time_min: f64,
}

impl SimulationEnvironment {
    /// Assembles an environment from its parts.
    pub fn new(
        patient: Box<dyn PatientModel>,
        sensor: Box<dyn SensorModel>,
        pump: Box<dyn PumpModel>,
        scenario: Scenario,
    ) -> Self {
        Self {
            patient,
            sensor,
            pump,
            scenario,
            time_min: 0.0,
        }
    }

    /// Minutes since start.
    pub fn time_min(&self) -> f64 {
        self.time_min
    }

    /// Returns patient, sensor and clock to their initial state.
    pub fn reset(&mut self) {
        self.patient.reset();
        self.sensor.reset();
        self.time_min = 0.0;
    }

    /// Takes a reading, queries the controller and advances one sample period.
    ///
    /// The returned record describes the state at the start of the period and
    /// the inputs applied during it.
    pub fn step(&mut self, controller: &mut dyn Controller) -> Result<SimRecord, EnvError> {
        let record = self.observe(controller);
        let sample = self.sensor.sample_time_min();
        self.patient.step(record.cho, record.insulin, sample)?;
        self.time_min += sample;
        Ok(record)
    }

    fn observe(&mut self, controller: &mut dyn Controller) -> SimRecord {
        let sample = self.sensor.sample_time_min();
        let bg = self.patient.glucose();
        let cgm = self.sensor.measure(bg);

        let from = self.time_min.round() as i64;
        let to = (self.time_min + sample).round() as i64;
        let meal_grams = self.scenario.meal_between(from, to);

        let ctx = ControlContext {
            patient: self.patient.name(),
            profile: self.patient.profile(),
            meal_grams,
            sample_time_min: sample,
            time_min: self.time_min,
        };
        let action = controller.policy(cgm, &ctx);
        let insulin = self.pump.basal(action.basal) + self.pump.bolus(action.bolus);

        let risk = risk_index(bg);
        SimRecord {
            time: self.scenario.time_at(self.time_min),
            minutes: self.time_min,
            bg,
            cgm,
            cho: meal_grams / sample,
            insulin,
            lbgi: risk.lbgi,
            hbgi: risk.hbgi,
            risk: risk.total(),
        }
    }
}

impl std::fmt::Debug for SimulationEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationEnvironment")
            .field("patient", self.patient.name())
            .field("sensor", &self.sensor.name())
            .field("pump", &self.pump.name())
            .field("events", &self.scenario.len())
            .field("time_min", &self.time_min)
            .finish()
    }
}
