//! Randomized multi-day meal scenarios.
//!
//! A compact daily base pattern is replicated over the simulated days and
//! every replicated meal is jittered in time and size. Generation is a pure
//! function of its inputs and the caller's random source.

use crate::error::SimError;
use chrono::NaiveDateTime;
use glucosim_env::{Scenario, ScenarioEvent};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Hours in a simulated day.
const HOURS_PER_DAY: f64 = 24.0;

/// A daily meal pattern: `(hour_of_day, grams)` pairs in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MealPattern(Vec<(f64, f64)>);

impl MealPattern {
    /// Creates a pattern from `(hour_of_day, grams)` pairs.
    pub fn new(meals: Vec<(f64, f64)>) -> Self {
        Self(meals)
    }

    /// Breakfast 7:00/50 g, lunch 12:00/60 g, dinner 18:30/80 g, snack 23:00/15 g.
    pub fn standard_day() -> Self {
        Self(vec![(7.0, 50.0), (12.0, 60.0), (18.5, 80.0), (23.0, 15.0)])
    }

    /// Meals in order.
    pub fn meals(&self) -> &[(f64, f64)] {
        &self.0
    }

    /// Number of meals per day.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the pattern has no meals.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for MealPattern {
    fn default() -> Self {
        Self::standard_day()
    }
}

impl std::fmt::Display for MealPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let items: Vec<String> = self.0.iter().map(|(h, g)| format!("({}, {})", h, g)).collect();
        write!(f, "[{}]", items.join(", "))
    }
}

/// Standard deviations of the meal jitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioJitter {
    /// Meal time jitter (hours)
    pub time_std_hours: f64,
    /// Meal size jitter for regular meals (grams)
    pub meal_std_grams: f64,
    /// Meal size jitter for the steady meal slot (grams)
    pub steady_meal_std_grams: f64,
}

impl Default for ScenarioJitter {
    fn default() -> Self {
        Self {
            time_std_hours: 0.25,
            meal_std_grams: 10.0,
            steady_meal_std_grams: 5.0,
        }
    }
}

impl ScenarioJitter {
    /// No jitter: realized events equal the nominal ones.
    pub fn none() -> Self {
        Self {
            time_std_hours: 0.0,
            meal_std_grams: 0.0,
            steady_meal_std_grams: 0.0,
        }
    }

    fn normal(std: f64, what: &str) -> Result<Normal<f64>, SimError> {
        Normal::new(0.0, std)
            .map_err(|_| SimError::invalid(format!("{} jitter must be a finite non-negative number, got {}", what, std)))
    }
}

/// True for the recurring low-variability meal slot: `(index - 3) mod 4 == 0`.
///
/// With the standard four-meal day this is the last meal of every day.
pub fn is_steady_meal(index_in_day: usize) -> bool {
    (index_in_day as i64 - 3).rem_euclid(4) == 0
}

/// Replicates `base` over `num_days` without jitter: event `i` of day `d`
/// sits at `24*d + base_time[i]`.
pub fn nominal(base: &MealPattern, num_days: u32) -> Vec<ScenarioEvent> {
    (0..num_days)
        .flat_map(|day| {
            base.meals().iter().map(move |&(hour, grams)| ScenarioEvent {
                time_offset_hours: HOURS_PER_DAY * day as f64 + hour,
                meal_grams: grams,
            })
        })
        .collect()
}

/// Builds randomized scenarios anchored at a fixed start instant.
#[derive(Debug, Clone)]
pub struct ScenarioGenerator {
    start_time: NaiveDateTime,
    jitter: ScenarioJitter,
}

impl ScenarioGenerator {
    /// Creates a generator with the default jitter.
    pub fn new(start_time: NaiveDateTime) -> Self {
        Self {
            start_time,
            jitter: ScenarioJitter::default(),
        }
    }

    /// Overrides the jitter.
    pub fn with_jitter(mut self, jitter: ScenarioJitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Start instant of generated scenarios.
    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    /// Generates a `num_days` scenario from `base`.
    ///
    /// Events keep nominal order even when jitter swaps their times. Both
    /// fields are rounded to 2 decimals.
    ///
    /// # Errors
    /// * `num_days == 0`
    /// * `base` is empty
    /// * a jitter standard deviation is negative or not finite
    pub fn generate<R: Rng + ?Sized>(
        &self,
        base: &MealPattern,
        num_days: u32,
        rng: &mut R,
    ) -> Result<Scenario, SimError> {
        if num_days == 0 {
            return Err(SimError::invalid("num_days must be positive"));
        }
        if base.is_empty() {
            return Err(SimError::invalid("base meal pattern is empty"));
        }

        let time_noise = ScenarioJitter::normal(self.jitter.time_std_hours, "time")?;
        let meal_noise = ScenarioJitter::normal(self.jitter.meal_std_grams, "meal")?;
        let steady_noise = ScenarioJitter::normal(self.jitter.steady_meal_std_grams, "steady meal")?;

        let per_day = base.len();
        let events = nominal(base, num_days)
            .into_iter()
            .enumerate()
            .map(|(k, event)| {
                let time = event.time_offset_hours + time_noise.sample(rng);
                let grams_noise = if is_steady_meal(k % per_day) {
                    steady_noise.sample(rng)
                } else {
                    meal_noise.sample(rng)
                };
                ScenarioEvent::new(time, event.meal_grams + grams_noise)
            })
            .collect();

        Ok(Scenario::new(self.start_time, events))
    }
}
