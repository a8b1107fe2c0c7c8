//! Reference insulin controllers.
//!
//! - [`BasalBolusController`]: open-loop therapy rule (profile basal plus a
//!   meal bolus with correction). Stateless.
//! - [`PidController`]: feedback rule on CGM error. Carries an integrator and
//!   the previous reading, which must stay private to one job.

use glucosim_env::{Action, ControlContext, Controller};
use serde::{Deserialize, Serialize};

/// Default glucose target (mg/dL).
pub const DEFAULT_TARGET: f64 = 140.0;

/// Correction bolus is only added above this reading (mg/dL).
const CORRECTION_THRESHOLD: f64 = 150.0;

// =============================================================================
// BASAL-BOLUS
// =============================================================================

/// Basal from the patient profile; meal bolus `grams / CR` plus a correction
/// `(cgm - target) / CF` when the reading is above 150 mg/dL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasalBolusController {
    /// Correction target (mg/dL)
    pub target: f64,
}

impl BasalBolusController {
    /// Creates a controller with the default 140 mg/dL target.
    pub fn new() -> Self {
        Self {
            target: DEFAULT_TARGET,
        }
    }

    /// Creates a controller with a custom target.
    pub fn with_target(target: f64) -> Self {
        Self { target }
    }
}

impl Default for BasalBolusController {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller for BasalBolusController {
    fn name(&self) -> &str {
        "BBController"
    }

    fn policy(&mut self, cgm: f64, ctx: &ControlContext<'_>) -> Action {
        let basal = ctx.profile.basal_u_per_hour / 60.0;

        let bolus = if ctx.meal_grams > 0.0 {
            let mut units = ctx.meal_grams / ctx.profile.carb_ratio;
            if cgm > CORRECTION_THRESHOLD {
                units += (cgm - self.target) / ctx.profile.correction_factor;
            }
            units / ctx.sample_time_min
        } else {
            0.0
        };

        Action { basal, bolus }
    }

    fn reset(&mut self) {}

    fn clone_box(&self) -> Box<dyn Controller> {
        Box::new(self.clone())
    }
}

// =============================================================================
// PID
// =============================================================================

/// Basal rate `P*e + I*∫e + D*Δe/Δt` with `e = cgm - target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidController {
    /// Proportional gain
    pub p: f64,
    /// Integral gain
    pub i: f64,
    /// Derivative gain
    pub d: f64,
    /// Glucose target (mg/dL)
    pub target: f64,

    /// Accumulated error (mg/dL * min)
    #[serde(skip)]
    integrated_state: f64,
    /// Previous reading, None before the first sample
    #[serde(skip)]
    prev_reading: Option<f64>,
}

impl PidController {
    /// Creates a PID controller with the default target.
    pub fn new(p: f64, i: f64, d: f64) -> Self {
        Self::with_target(p, i, d, DEFAULT_TARGET)
    }

    /// Creates a PID controller with a custom target.
    pub fn with_target(p: f64, i: f64, d: f64, target: f64) -> Self {
        Self {
            p,
            i,
            d,
            target,
            integrated_state: 0.0,
            prev_reading: None,
        }
    }

    /// Current integrator value.
    pub fn integrated_state(&self) -> f64 {
        self.integrated_state
    }
}

impl Controller for PidController {
    fn name(&self) -> &str {
        "PIDController"
    }

    fn policy(&mut self, cgm: f64, ctx: &ControlContext<'_>) -> Action {
        let error = cgm - self.target;
        let prev = self.prev_reading.unwrap_or(cgm);

        let control = self.p * error
            + self.i * self.integrated_state
            + self.d * (cgm - prev) / ctx.sample_time_min;

        self.integrated_state += error * ctx.sample_time_min;
        self.prev_reading = Some(cgm);

        Action {
            basal: control,
            bolus: 0.0,
        }
    }

    fn reset(&mut self) {
        self.integrated_state = 0.0;
        self.prev_reading = None;
    }

    fn clone_box(&self) -> Box<dyn Controller> {
        Box::new(self.clone())
    }
}
