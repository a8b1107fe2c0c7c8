//! Model traits: the physiological, device and control collaborators.

use crate::error::EnvError;
use crate::types::PatientId;
use serde::{Deserialize, Serialize};

/// Therapy parameters a controller may read about its patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    /// Body weight (kg)
    pub body_weight_kg: f64,

    /// Carbohydrate ratio (grams covered by one unit of insulin)
    pub carb_ratio: f64,

    /// Correction factor (mg/dL drop per unit of insulin)
    pub correction_factor: f64,

    /// Basal insulin requirement (U/h)
    pub basal_u_per_hour: f64,
}

/// A simulated patient.
///
/// Implementations integrate their own state; `step` advances the model by
/// `dt_min` minutes under constant carbohydrate and insulin input.
pub trait PatientModel: Send + 'static {
    /// Registry identifier of this patient.
    fn name(&self) -> &PatientId;

    /// Therapy parameters.
    fn profile(&self) -> &PatientProfile;

    /// Current plasma glucose (mg/dL).
    fn glucose(&self) -> f64;

    /// Advances the model.
    ///
    /// # Arguments
    /// * `carbs_g_per_min` - Carbohydrate ingestion rate
    /// * `insulin_u_per_min` - Total insulin delivery rate (basal + bolus)
    /// * `dt_min` - Step length in minutes
    ///
    /// # Returns
    /// * `Err(EnvError::Divergence)` - State left its valid domain
    fn step(&mut self, carbs_g_per_min: f64, insulin_u_per_min: f64, dt_min: f64) -> Result<(), EnvError>;

    /// Restores the initial (fasting steady) state.
    fn reset(&mut self);

    /// Deep copy into a new box.
    fn clone_box(&self) -> Box<dyn PatientModel>;
}

/// A glucose sensor (e.g. continuous glucose monitor).
pub trait SensorModel: Send + 'static {
    /// Sensor type name.
    fn name(&self) -> &str;

    /// Minutes between consecutive readings.
    fn sample_time_min(&self) -> f64;

    /// Produces a reading for the given true glucose (mg/dL).
    fn measure(&mut self, glucose: f64) -> f64;

    /// Rewinds the noise generator to its seeded origin.
    fn reset(&mut self);

    /// Deep copy into a new box.
    fn clone_box(&self) -> Box<dyn SensorModel>;
}

/// An insulin pump translating requested rates into deliverable ones.
pub trait PumpModel: Send + 'static {
    /// Pump type name.
    fn name(&self) -> &str;

    /// Deliverable basal rate (U/min) for a requested one.
    fn basal(&self, requested_u_per_min: f64) -> f64;

    /// Deliverable bolus rate (U/min) for a requested one.
    fn bolus(&self, requested_u_per_min: f64) -> f64;

    /// Deep copy into a new box.
    fn clone_box(&self) -> Box<dyn PumpModel>;
}

/// Insulin request produced by a controller for one sample period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Basal rate (U/min)
    pub basal: f64,

    /// Bolus rate (U/min), spread over the sample period
    pub bolus: f64,
}

/// Per-sample information given to a controller alongside the reading.
#[derive(Debug, Clone, Copy)]
pub struct ControlContext<'a> {
    /// Patient under control
    pub patient: &'a PatientId,

    /// Therapy parameters of that patient
    pub profile: &'a PatientProfile,

    /// Carbohydrate announced for this sample period (g)
    pub meal_grams: f64,

    /// Sample period (min)
    pub sample_time_min: f64,

    /// Minutes since simulation start
    pub time_min: f64,
}

/// An insulin control algorithm.
///
/// A controller may hold mutable state between samples (integrators,
/// previous readings). One instance is owned by exactly one job.
pub trait Controller: Send + 'static {
    /// Algorithm name (e.g. `BBController`).
    fn name(&self) -> &str;

    /// Computes the insulin request for a CGM reading.
    fn policy(&mut self, cgm: f64, ctx: &ControlContext<'_>) -> Action;

    /// Clears all accumulated state.
    fn reset(&mut self);

    /// Deep copy into a new box.
    fn clone_box(&self) -> Box<dyn Controller>;
}

impl Clone for Box<dyn PatientModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl Clone for Box<dyn SensorModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl Clone for Box<dyn PumpModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl Clone for Box<dyn Controller> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Counter {
        calls: u32,
    }

    impl Controller for Counter {
        fn name(&self) -> &str {
            "Counter"
        }

        fn policy(&mut self, _cgm: f64, _ctx: &ControlContext<'_>) -> Action {
            self.calls += 1;
            Action {
                basal: self.calls as f64,
                bolus: 0.0,
            }
        }

        fn reset(&mut self) {
            self.calls = 0;
        }

        fn clone_box(&self) -> Box<dyn Controller> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_boxed_controller_clone_is_independent() {
        let profile = PatientProfile {
            body_weight_kg: 70.0,
            carb_ratio: 10.0,
            correction_factor: 40.0,
            basal_u_per_hour: 1.0,
        };
        let patient = PatientId::new("adult#001");
        let ctx = ControlContext {
            patient: &patient,
            profile: &profile,
            meal_grams: 0.0,
            sample_time_min: 3.0,
            time_min: 0.0,
        };

        let mut original: Box<dyn Controller> = Box::new(Counter { calls: 0 });
        let mut copy = original.clone();

        original.policy(120.0, &ctx);
        original.policy(120.0, &ctx);

        // The copy was taken before any call and advances its own counter
        assert_eq!(copy.policy(120.0, &ctx).basal, 1.0);
        assert_eq!(original.policy(120.0, &ctx).basal, 3.0);
    }
}
