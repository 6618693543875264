use crate::global_variables::{
    CROSSING_DISTANCE_M, CYCLE_PERIOD_SECS, GENERATOR_BACKOFF_MS, MAX_SPAWN_DELAY_SECS,
    RETRY_INTERVAL_MS, STRAIGHT_SPEED_RANGE, TURNING_SPEED_RANGE,
};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output format of the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Timing and generator settings shared by every task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Time between right-of-way toggles at each intersection.
    pub cycle_period: Duration,
    /// How long a blocked vehicle sleeps before asking again.
    pub retry_interval: Duration,
    /// Upper bound (whole seconds) of the generator's random pause.
    pub max_spawn_delay_secs: u64,
    /// Pause after a failed vehicle build.
    pub backoff_interval: Duration,
    /// Metres covered while crossing an intersection.
    pub crossing_distance_m: f64,
    /// Inclusive km/h band for NS/SN.
    pub straight_speed: (u32, u32),
    /// Inclusive km/h band for EW/WE.
    pub turning_speed: (u32, u32),
    /// Admission gate on live vehicle tasks; `None` spawns without limit.
    pub max_live_vehicles: Option<usize>,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
    pub log_format: LogFormat,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cycle_period: Duration::from_secs(CYCLE_PERIOD_SECS),
            retry_interval: Duration::from_millis(RETRY_INTERVAL_MS),
            max_spawn_delay_secs: MAX_SPAWN_DELAY_SECS,
            backoff_interval: Duration::from_millis(GENERATOR_BACKOFF_MS),
            crossing_distance_m: CROSSING_DISTANCE_M,
            straight_speed: STRAIGHT_SPEED_RANGE,
            turning_speed: TURNING_SPEED_RANGE,
            max_live_vehicles: None,
            seed: None,
            log_format: LogFormat::Text,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cycle_period.is_zero() {
            bail!("cycle period must be greater than zero");
        }
        if self.retry_interval.is_zero() {
            bail!("retry interval must be greater than zero");
        }
        if self.backoff_interval.is_zero() {
            bail!("generator back-off must be greater than zero");
        }
        if !(self.crossing_distance_m.is_finite() && self.crossing_distance_m > 0.0) {
            bail!(
                "crossing distance must be a positive number, got {}",
                self.crossing_distance_m
            );
        }
        for (name, (low, high)) in [
            ("straight", self.straight_speed),
            ("turning", self.turning_speed),
        ] {
            if low == 0 || low > high {
                bail!("{} speed band {}..={} is invalid", name, low, high);
            }
        }
        Ok(())
    }
}
