//! Minimal-model virtual patient.
//!
//! Bergman minimal model extended with a gut compartment for meal absorption
//! and a subcutaneous depot for pump delivery:
//!
//! ```text
//! dQ/dt = -kabs*Q + 1000*CHO                       (gut glucose, mg)
//! dS/dt = (u - u_b) - ka*S                         (SC insulin above basal, U)
//! dI/dt = -n*(I - Ib) + ka*S*1000 / (Vi*BW)        (plasma insulin, uU/mL)
//! dX/dt = -p2*X + p3*(I - Ib)                      (remote insulin action, 1/min)
//! dG/dt = -(p1 + X)*G + p1*Gb + f*kabs*Q / (Vg*BW) (plasma glucose, mg/dL)
//! ```
//!
//! At zero carbohydrate and basal delivery the state rests at `(0, 0, Ib, 0, Gb)`.

use glucosim_env::{EnvError, PatientId, PatientModel, PatientProfile};
use nalgebra::Vector5;
use serde::{Deserialize, Serialize};

/// Upper glucose bound beyond which the model is considered diverged (mg/dL).
const MAX_GLUCOSE: f64 = 1500.0;

/// Integration step (minutes).
const INTEGRATION_STEP_MIN: f64 = 1.0;

// State vector indices
const Q_GUT: usize = 0;
const S_DEPOT: usize = 1;
const I_PLASMA: usize = 2;
const X_ACTION: usize = 3;
const G_PLASMA: usize = 4;

/// Per-patient parameters of the minimal model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimalModelParams {
    /// Body weight (kg)
    pub body_weight_kg: f64,
    /// Basal glucose (mg/dL)
    pub gb: f64,
    /// Basal plasma insulin (uU/mL)
    pub ib: f64,
    /// Glucose effectiveness (1/min)
    pub p1: f64,
    /// Remote insulin decay (1/min)
    pub p2: f64,
    /// Insulin action gain (mL/uU/min^2)
    pub p3: f64,
    /// Plasma insulin clearance (1/min)
    pub n: f64,
    /// Glucose distribution volume (dL/kg)
    pub vg: f64,
    /// Insulin distribution volume (L/kg)
    pub vi: f64,
    /// Subcutaneous absorption rate (1/min)
    pub ka: f64,
    /// Gut absorption rate (1/min)
    pub kabs: f64,
    /// Meal bioavailability
    pub f: f64,
    /// Carbohydrate ratio (g/U)
    pub carb_ratio: f64,
    /// Correction factor (mg/dL/U)
    pub correction_factor: f64,
    /// Basal requirement (U/h)
    pub basal_u_per_hour: f64,
}

impl MinimalModelParams {
    /// Therapy profile exposed to controllers.
    pub fn profile(&self) -> PatientProfile {
        PatientProfile {
            body_weight_kg: self.body_weight_kg,
            carb_ratio: self.carb_ratio,
            correction_factor: self.correction_factor,
            basal_u_per_hour: self.basal_u_per_hour,
        }
    }

    /// Fasting steady state.
    fn steady_state(&self) -> Vector5<f64> {
        Vector5::new(0.0, 0.0, self.ib, 0.0, self.gb)
    }
}

/// A patient integrated with explicit Euler steps of one minute.
#[derive(Debug, Clone)]
pub struct MinimalModelPatient {
    id: PatientId,
    params: MinimalModelParams,
    profile: PatientProfile,
    state: Vector5<f64>,
    /// Minutes integrated since the last reset
    t_min: f64,
}

impl MinimalModelPatient {
    /// Creates a patient at its fasting steady state.
    pub fn new(id: PatientId, params: MinimalModelParams) -> Self {
        let state = params.steady_state();
        let profile = params.profile();
        Self {
            id,
            params,
            profile,
            state,
            t_min: 0.0,
        }
    }

    /// Model parameters.
    pub fn params(&self) -> &MinimalModelParams {
        &self.params
    }

    /// Full state `[Q, S, I, X, G]`.
    pub fn state(&self) -> &Vector5<f64> {
        &self.state
    }

    fn derivative(&self, x: &Vector5<f64>, carbs_g_per_min: f64, insulin_u_per_min: f64) -> Vector5<f64> {
        let p = &self.params;
        let basal_u_per_min = p.basal_u_per_hour / 60.0;

        let q = x[Q_GUT];
        let s = x[S_DEPOT];
        let i = x[I_PLASMA];
        let xa = x[X_ACTION];
        let g = x[G_PLASMA];

        let dq = -p.kabs * q + 1000.0 * carbs_g_per_min;
        let ds = (insulin_u_per_min - basal_u_per_min) - p.ka * s;
        let di = -p.n * (i - p.ib) + p.ka * s * 1000.0 / (p.vi * p.body_weight_kg);
        let dx = -p.p2 * xa + p.p3 * (i - p.ib);
        let ra = p.f * p.kabs * q / (p.vg * p.body_weight_kg);
        let dg = -(p.p1 + xa) * g + p.p1 * p.gb + ra;

        Vector5::new(dq, ds, di, dx, dg)
    }

    fn check(&self) -> Result<(), EnvError> {
        if self.state.iter().any(|v| !v.is_finite()) {
            return Err(EnvError::divergence(self.t_min, "non-finite state"));
        }
        let g = self.state[G_PLASMA];
        if g <= 0.0 {
            return Err(EnvError::divergence(self.t_min, format!("glucose fell to {:.2} mg/dL", g)));
        }
        if g > MAX_GLUCOSE {
            return Err(EnvError::divergence(self.t_min, format!("glucose rose to {:.2} mg/dL", g)));
        }
        Ok(())
    }
}

impl PatientModel for MinimalModelPatient {
    fn name(&self) -> &PatientId {
        &self.id
    }

    fn profile(&self) -> &PatientProfile {
        &self.profile
    }

    fn glucose(&self) -> f64 {
        self.state[G_PLASMA]
    }

    fn step(&mut self, carbs_g_per_min: f64, insulin_u_per_min: f64, dt_min: f64) -> Result<(), EnvError> {
        let mut remaining = dt_min;
        while remaining > 1e-9 {
            let h = remaining.min(INTEGRATION_STEP_MIN);
            let dx = self.derivative(&self.state, carbs_g_per_min, insulin_u_per_min);
            self.state += dx * h;
            // Plasma insulin and gut content cannot be negative
            self.state[I_PLASMA] = self.state[I_PLASMA].max(0.0);
            self.state[Q_GUT] = self.state[Q_GUT].max(0.0);
            self.t_min += h;
            remaining -= h;
            self.check()?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state = self.params.steady_state();
        self.t_min = 0.0;
    }

    fn clone_box(&self) -> Box<dyn PatientModel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn adult_params() -> MinimalModelParams {
        MinimalModelParams {
            body_weight_kg: 70.0,
            gb: 130.0,
            ib: 12.0,
            p1: 0.03,
            p2: 0.025,
            p3: 1.3e-5,
            n: 0.14,
            vg: 1.7,
            vi: 0.12,
            ka: 0.02,
            kabs: 0.05,
            f: 0.9,
            carb_ratio: 12.0,
            correction_factor: 40.0,
            basal_u_per_hour: 1.2,
        }
    }

    #[test]
    fn test_steady_state_holds_at_basal() {
        let params = adult_params();
        let basal = params.basal_u_per_hour / 60.0;
        let mut patient = MinimalModelPatient::new(PatientId::new("adult#001"), params);

        patient.step(0.0, basal, 240.0).unwrap();

        assert_relative_eq!(patient.glucose(), 130.0, epsilon = 1e-9);
    }

    #[test]
    fn test_meal_raises_glucose() {
        let params = adult_params();
        let basal = params.basal_u_per_hour / 60.0;
        let mut patient = MinimalModelPatient::new(PatientId::new("adult#001"), params);

        // 60 g over one minute, then an hour of digestion
        patient.step(60.0, basal, 1.0).unwrap();
        patient.step(0.0, basal, 60.0).unwrap();

        assert!(patient.glucose() > 160.0);
    }

    #[test]
    fn test_insulin_lowers_glucose() {
        let params = adult_params();
        let basal = params.basal_u_per_hour / 60.0;
        let mut patient = MinimalModelPatient::new(PatientId::new("adult#001"), params);

        patient.step(0.0, basal + 1.0, 3.0).unwrap();
        patient.step(0.0, basal, 120.0).unwrap();

        assert!(patient.glucose() < 130.0);
    }

    #[test]
    fn test_massive_overdose_diverges() {
        let params = adult_params();
        let mut patient = MinimalModelPatient::new(PatientId::new("adult#001"), params);

        let result = patient.step(0.0, 500.0, 600.0);
        assert!(matches!(result, Err(EnvError::Divergence { .. })));
    }

    #[test]
    fn test_reset_restores_steady_state() {
        let params = adult_params();
        let mut patient = MinimalModelPatient::new(PatientId::new("adult#001"), params);
        patient.step(50.0, 0.0, 1.0).unwrap();
        patient.step(0.0, 0.0, 30.0).unwrap();
        assert!(patient.glucose() > 130.0);

        patient.reset();
        assert_eq!(patient.glucose(), 130.0);
        assert_eq!(patient.state()[0], 0.0);
    }

    #[test]
    fn test_clone_box_does_not_share_state() {
        let params = adult_params();
        let patient = MinimalModelPatient::new(PatientId::new("adult#001"), params);
        let mut a = patient.clone_box();
        let b = patient.clone_box();

        a.step(80.0, 0.0, 1.0).unwrap();
        a.step(0.0, 0.0, 30.0).unwrap();

        assert!(a.glucose() > b.glucose());
        assert_eq!(b.glucose(), 130.0);
    }
}
