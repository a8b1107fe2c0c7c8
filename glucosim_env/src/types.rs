//! Common value types shared by the orchestrator and the models.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Rounds to 2 decimal places.
///
/// Idempotent: `round2(round2(x)) == round2(x)` for every finite `x`.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Identifier of a patient profile in the reference registry (e.g. `adolescent#003`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(String);

impl PatientId {
    /// Creates a patient identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the registry name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a filesystem-safe form of the name (path separators, `:` and spaces
    /// become `_`; `#` is kept).
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | ' ' => '_',
                other => other,
            })
            .collect()
    }
}

impl From<&str> for PatientId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl std::fmt::Display for PatientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One meal event relative to the scenario start instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioEvent {
    /// Hours after `Scenario::start_time`
    pub time_offset_hours: f64,

    /// Carbohydrate quantity in grams
    pub meal_grams: f64,
}

impl ScenarioEvent {
    /// Creates an event, rounding both fields to 2 decimals.
    pub fn new(time_offset_hours: f64, meal_grams: f64) -> Self {
        Self {
            time_offset_hours: round2(time_offset_hours),
            meal_grams: round2(meal_grams),
        }
    }

    /// Offset from the start instant in whole minutes.
    pub fn minute(&self) -> i64 {
        (self.time_offset_hours * 60.0).round() as i64
    }
}

impl std::fmt::Display for ScenarioEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.time_offset_hours, self.meal_grams)
    }
}

/// An ordered meal schedule anchored at an absolute start time.
///
/// There is no mutating API: a scenario is fixed at construction. Consumers
/// that need their own copy clone it, which duplicates the event buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ScenarioData")]
pub struct Scenario {
    start_time: NaiveDateTime,
    events: Vec<ScenarioEvent>,
}

/// Wire form of a scenario; decoding goes through `Scenario::new`.
#[derive(Deserialize)]
struct ScenarioData {
    start_time: NaiveDateTime,
    events: Vec<ScenarioEvent>,
}

impl From<ScenarioData> for Scenario {
    fn from(data: ScenarioData) -> Self {
        Scenario::new(data.start_time, data.events)
    }
}

impl Scenario {
    /// Creates a scenario. Event values are rounded to 2 decimals; order is kept.
    pub fn new(start_time: NaiveDateTime, events: Vec<ScenarioEvent>) -> Self {
        let events = events
            .into_iter()
            .map(|e| ScenarioEvent::new(e.time_offset_hours, e.meal_grams))
            .collect();
        Self { start_time, events }
    }

    /// Absolute instant corresponding to offset zero.
    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    /// Events in generation order.
    pub fn events(&self) -> &[ScenarioEvent] {
        &self.events
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the scenario has no meals.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total grams of carbohydrate whose event falls in `[from_min, to_min)`.
    ///
    /// Events are matched on their rounded minute offset.
    pub fn meal_between(&self, from_min: i64, to_min: i64) -> f64 {
        self.events
            .iter()
            .filter(|e| {
                let m = e.minute();
                m >= from_min && m < to_min
            })
            .map(|e| e.meal_grams)
            .sum()
    }

    /// Absolute time at `minutes` after the start instant.
    pub fn time_at(&self, minutes: f64) -> NaiveDateTime {
        self.start_time + Duration::milliseconds((minutes * 60_000.0).round() as i64)
    }
}
