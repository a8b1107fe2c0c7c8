//! Single-run simulation loop.

use crate::env::{SimulationEnvironment, TimeSeries};
use glucosim_env::{Controller, EnvError};
use std::time::Duration;

/// Runs one environment under one controller for `duration`.
///
/// The environment is reset first. A sample is recorded at every sensor
/// period from t=0 up to and including the last period start before
/// `duration`. A divergence stops the run and is returned as the error.
pub fn run_single(
    env: &mut SimulationEnvironment,
    controller: &mut dyn Controller,
    duration: Duration,
) -> Result<TimeSeries, EnvError> {
    env.reset();
    let total_min = duration.as_secs_f64() / 60.0;
    let sample = env.sensor.sample_time_min();

    let mut series = TimeSeries::new();
    while env.time_min() + 1e-9 < total_min {
        series.push(env.step(controller)?);
    }
    debug_assert!(series.len() as f64 <= (total_min / sample).ceil());
    Ok(series)
}
