//! Keyed aggregation of job outcomes.

use crate::error::{JobError, SimError};
use crate::executor::JobOutcome;
use glucosim_core::{SimRecord, TimeSeries};
use glucosim_env::PatientId;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// Identity of one result: the patient, optionally qualified by controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResultKey {
    /// Simulated patient
    pub patient: PatientId,
    /// Controller arm, when results of several arms are combined
    pub controller: Option<String>,
}

impl ResultKey {
    /// Patient-only key.
    pub fn patient(patient: PatientId) -> Self {
        Self { patient, controller: None }
    }

    /// Patient plus controller key.
    pub fn composite(patient: PatientId, controller: impl Into<String>) -> Self {
        Self {
            patient,
            controller: Some(controller.into()),
        }
    }
}

impl std::fmt::Display for ResultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.controller {
            Some(controller) => write!(f, "{}/{}", controller, self.patient),
            None => write!(f, "{}", self.patient),
        }
    }
}

/// How keys are derived from outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// Patient name only (one arm)
    #[default]
    Patient,
    /// Patient name and controller label (several arms)
    Composite,
}

/// Derives one key per outcome, in outcome order.
pub fn keys_for(outcomes: &[JobOutcome], mode: KeyMode) -> Vec<ResultKey> {
    outcomes
        .iter()
        .map(|o| match mode {
            KeyMode::Patient => ResultKey::patient(o.patient.clone()),
            KeyMode::Composite => ResultKey::composite(o.patient.clone(), o.controller_label.clone()),
        })
        .collect()
}

/// Result of one job as stored in a [`ResultSet`].
pub type JobResult = Result<TimeSeries, JobError>;

/// Ordered, keyed collection of job results.
///
/// A failed job is stored as `Err`; a job that ran but produced no samples
/// is stored as `Ok` with an empty series. Neither is silently dropped.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    entries: Vec<(ResultKey, JobResult)>,
    index: HashMap<ResultKey, usize>,
}

/// Pairs `results[i]` with `keys[i]`.
///
/// # Errors
/// * `InvalidArgument` if the two lists differ in length
/// * `KeyCollision` if a key appears twice
pub fn aggregate(results: Vec<JobOutcome>, keys: Vec<ResultKey>) -> Result<ResultSet, SimError> {
    if results.len() != keys.len() {
        return Err(SimError::invalid(format!(
            "{} results but {} keys",
            results.len(),
            keys.len()
        )));
    }
    let mut set = ResultSet::default();
    for (key, outcome) in keys.into_iter().zip(results) {
        set.insert(key, outcome.result)?;
    }
    Ok(set)
}

impl ResultSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a result under a fresh key.
    ///
    /// # Errors
    /// * `KeyCollision` if the key is already present (the existing entry is kept)
    pub fn insert(&mut self, key: ResultKey, result: JobResult) -> Result<(), SimError> {
        if self.index.contains_key(&key) {
            return Err(SimError::KeyCollision(key.to_string()));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, result));
        Ok(())
    }

    /// Result stored under `key`, if any.
    pub fn get(&self, key: &ResultKey) -> Option<&JobResult> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &ResultKey> + '_ {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResultKey, &JobResult)> + '_ {
        self.entries.iter().map(|(k, r)| (k, r))
    }

    /// Successful series in insertion order.
    pub fn successes(&self) -> impl Iterator<Item = (&ResultKey, &TimeSeries)> + '_ {
        self.entries
            .iter()
            .filter_map(|(k, r)| r.as_ref().ok().map(|series| (k, series)))
    }

    /// Failed jobs in insertion order.
    pub fn failures(&self) -> impl Iterator<Item = (&ResultKey, &JobError)> + '_ {
        self.entries
            .iter()
            .filter_map(|(k, r)| r.as_ref().err().map(|err| (k, err)))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the set has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends every entry of `other`, keeping order.
    ///
    /// # Errors
    /// * `KeyCollision` on the first key present in both sets; `self` is left
    ///   unchanged in that case
    pub fn merge(&mut self, other: ResultSet) -> Result<(), SimError> {
        if let Some(dup) = other.keys().find(|k| self.index.contains_key(*k)) {
            return Err(SimError::KeyCollision(dup.to_string()));
        }
        for (key, result) in other.entries {
            self.insert(key, result)?;
        }
        Ok(())
    }

    /// Writes all successful series as one CSV, prefixed by key columns.
    ///
    /// Failed jobs contribute no rows.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let mut writer = csv::Writer::from_path(path)?;
        for (key, series) in self.successes() {
            for record in series.records() {
                writer.serialize(KeyedRow::new(key, record))?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

/// One CSV row: key columns followed by the record's columns.
#[derive(Serialize)]
struct KeyedRow<'a> {
    patient: &'a str,
    controller: &'a str,
    time: chrono::NaiveDateTime,
    minutes: f64,
    bg: f64,
    cgm: f64,
    cho: f64,
    insulin: f64,
    lbgi: f64,
    hbgi: f64,
    risk: f64,
}

impl<'a> KeyedRow<'a> {
    fn new(key: &'a ResultKey, r: &SimRecord) -> Self {
        Self {
            patient: key.patient.as_str(),
            controller: key.controller.as_deref().unwrap_or(""),
            time: r.time,
            minutes: r.minutes,
            bg: r.bg,
            cgm: r.cgm,
            cho: r.cho,
            insulin: r.insulin,
            lbgi: r.lbgi,
            hbgi: r.hbgi,
            risk: r.risk,
        }
    }
}
