//! Insulin pump with delivery increments and limits.

use glucosim_env::{EnvError, PumpModel};

/// Delivery characteristics of a pump model. Amounts are in units (U).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpSpec {
    /// Type name
    pub name: &'static str,
    /// Smallest basal increment (U/h)
    pub inc_basal: f64,
    /// Smallest bolus increment (U)
    pub inc_bolus: f64,
    /// Maximum basal rate (U/h)
    pub max_basal: f64,
    /// Maximum single bolus (U)
    pub max_bolus: f64,
}

/// Known pump types.
pub const PUMP_SPECS: [PumpSpec; 2] = [
    PumpSpec {
        name: "Insulet",
        inc_basal: 0.05,
        inc_bolus: 0.05,
        max_basal: 30.0,
        max_bolus: 30.0,
    },
    PumpSpec {
        name: "Cozmo",
        inc_basal: 0.05,
        inc_bolus: 0.05,
        max_basal: 35.0,
        max_bolus: 75.0,
    },
];

impl PumpSpec {
    /// Looks up a pump type by name (case-insensitive).
    pub fn by_name(name: &str) -> Result<PumpSpec, EnvError> {
        PUMP_SPECS
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| EnvError::UnknownPump(name.to_string()))
    }
}

/// Rounds `amount` to the nearest multiple of `increment`, clamped to `[0, max]`.
fn quantize(amount: f64, increment: f64, max: f64) -> f64 {
    if !amount.is_finite() || amount <= 0.0 {
        return 0.0;
    }
    let steps = (amount / increment).round();
    (steps * increment).min(max)
}

/// Stateless pump.
#[derive(Debug, Clone)]
pub struct InsulinPump {
    spec: PumpSpec,
}

impl InsulinPump {
    /// Creates a pump of the named type.
    pub fn with_name(name: &str) -> Result<Self, EnvError> {
        Ok(Self {
            spec: PumpSpec::by_name(name)?,
        })
    }

    /// Pump characteristics.
    pub fn spec(&self) -> &PumpSpec {
        &self.spec
    }
}

impl PumpModel for InsulinPump {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn basal(&self, requested_u_per_min: f64) -> f64 {
        // Increments are specified per hour
        quantize(requested_u_per_min * 60.0, self.spec.inc_basal, self.spec.max_basal) / 60.0
    }

    fn bolus(&self, requested_u_per_min: f64) -> f64 {
        quantize(requested_u_per_min, self.spec.inc_bolus, self.spec.max_bolus)
    }

    fn clone_box(&self) -> Box<dyn PumpModel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_negative_requests_deliver_nothing() {
        let pump = InsulinPump::with_name("Insulet").unwrap();
        assert_eq!(pump.basal(-0.5), 0.0);
        assert_eq!(pump.bolus(-3.0), 0.0);
        assert_eq!(pump.bolus(f64::NAN), 0.0);
    }

    #[test]
    fn test_basal_quantized_per_hour() {
        let pump = InsulinPump::with_name("Insulet").unwrap();
        // 1.23 U/h rounds to 1.25 U/h
        assert_relative_eq!(pump.basal(1.23 / 60.0) * 60.0, 1.25, epsilon = 1e-9);
    }

    #[test]
    fn test_bolus_capped() {
        let pump = InsulinPump::with_name("Insulet").unwrap();
        assert_relative_eq!(pump.bolus(100.0), 30.0, epsilon = 1e-9);

        let cozmo = InsulinPump::with_name("cozmo").unwrap();
        assert_relative_eq!(cozmo.bolus(100.0), 75.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unknown_pump() {
        assert!(matches!(
            InsulinPump::with_name("Omnipod9000"),
            Err(EnvError::UnknownPump(_))
        ));
    }
}
