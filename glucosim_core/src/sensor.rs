//! Continuous glucose monitor with seeded Gaussian noise.

use glucosim_env::{EnvError, SensorModel};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

/// Static characteristics of a CGM model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSpec {
    /// Type name
    pub name: &'static str,
    /// Minutes between readings
    pub sample_time_min: f64,
    /// Noise standard deviation (mg/dL)
    pub noise_std: f64,
    /// Lowest reportable value (mg/dL)
    pub min: f64,
    /// Highest reportable value (mg/dL)
    pub max: f64,
}

/// Known sensor types.
pub const SENSOR_SPECS: [SensorSpec; 3] = [
    SensorSpec {
        name: "Dexcom",
        sample_time_min: 3.0,
        noise_std: 6.0,
        min: 39.0,
        max: 400.0,
    },
    SensorSpec {
        name: "GuardianRT",
        sample_time_min: 5.0,
        noise_std: 8.0,
        min: 40.0,
        max: 400.0,
    },
    SensorSpec {
        name: "Navigator",
        sample_time_min: 1.0,
        noise_std: 5.0,
        min: 20.0,
        max: 500.0,
    },
];

impl SensorSpec {
    /// Looks up a sensor type by name (case-insensitive).
    pub fn by_name(name: &str) -> Result<SensorSpec, EnvError> {
        SENSOR_SPECS
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| EnvError::UnknownSensor(name.to_string()))
    }
}

/// A CGM whose noise sequence is fully determined by its seed.
///
/// Cloning copies the generator state, so a clone replays the same noise
/// sequence from the point it was taken without affecting the original.
#[derive(Debug, Clone)]
pub struct CgmSensor {
    spec: SensorSpec,
    seed: u64,
    rng: ChaCha8Rng,
}

impl CgmSensor {
    /// Creates a sensor of the named type.
    pub fn with_name(name: &str, seed: u64) -> Result<Self, EnvError> {
        Ok(Self::new(SensorSpec::by_name(name)?, seed))
    }

    /// Creates a sensor from a spec.
    pub fn new(spec: SensorSpec, seed: u64) -> Self {
        Self {
            spec,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Sensor characteristics.
    pub fn spec(&self) -> &SensorSpec {
        &self.spec
    }

    /// Noise seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl SensorModel for CgmSensor {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn sample_time_min(&self) -> f64 {
        self.spec.sample_time_min
    }

    fn measure(&mut self, glucose: f64) -> f64 {
        let z: f64 = StandardNormal.sample(&mut self.rng);
        let reading = glucose + self.spec.noise_std * z;
        reading.clamp(self.spec.min, self.spec.max)
    }

    fn reset(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
    }

    fn clone_box(&self) -> Box<dyn SensorModel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(SensorSpec::by_name("dexcom").unwrap().sample_time_min, 3.0);
        assert!(matches!(
            SensorSpec::by_name("Libre"),
            Err(EnvError::UnknownSensor(_))
        ));
    }

    #[test]
    fn test_same_seed_same_readings() {
        let mut a = CgmSensor::with_name("Dexcom", 1).unwrap();
        let mut b = CgmSensor::with_name("Dexcom", 1).unwrap();

        for _ in 0..20 {
            assert_eq!(a.measure(120.0), b.measure(120.0));
        }
    }

    #[test]
    fn test_different_seed_different_readings() {
        let mut a = CgmSensor::with_name("Dexcom", 1).unwrap();
        let mut b = CgmSensor::with_name("Dexcom", 2).unwrap();

        let ra: Vec<f64> = (0..10).map(|_| a.measure(120.0)).collect();
        let rb: Vec<f64> = (0..10).map(|_| b.measure(120.0)).collect();
        assert_ne!(ra, rb);
    }

    #[test]
    fn test_readings_are_clamped() {
        let mut sensor = CgmSensor::with_name("Dexcom", 7).unwrap();
        for _ in 0..50 {
            let low = sensor.measure(0.0);
            let high = sensor.measure(900.0);
            assert!(low >= 39.0);
            assert!(high <= 400.0);
        }
    }

    #[test]
    fn test_reset_replays_noise() {
        let mut sensor = CgmSensor::with_name("GuardianRT", 3).unwrap();
        let first: Vec<f64> = (0..5).map(|_| sensor.measure(100.0)).collect();

        sensor.reset();
        let again: Vec<f64> = (0..5).map(|_| sensor.measure(100.0)).collect();

        assert_eq!(first, again);
    }
}
