// Right-of-way cycle period, in seconds.
pub const CYCLE_PERIOD_SECS: u64 = 3;

// How long a blocked vehicle waits before checking the signal again.
pub const RETRY_INTERVAL_MS: u64 = 1000;

// Generator pacing: a random whole number of seconds in 0..=MAX_SPAWN_DELAY_SECS.
pub const MAX_SPAWN_DELAY_SECS: u64 = 2;

// Generator back-off after a failed vehicle build.
pub const GENERATOR_BACKOFF_MS: u64 = 1000;

// Distance covered while crossing an intersection, in metres.
pub const CROSSING_DISTANCE_M: f64 = 500.0;

// km/h -> m/s
pub const KMH_TO_MS: f64 = 0.27778;

// Speed bands (km/h, inclusive).
pub const STRAIGHT_SPEED_RANGE: (u32, u32) = (30, 60);
pub const TURNING_SPEED_RANGE: (u32, u32) = (20, 50);
