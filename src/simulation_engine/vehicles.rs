use crate::global_variables::KMH_TO_MS;
use crate::simulation_engine::intersections::{Direction, IntersectionIndex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unique, monotonically assigned vehicle identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub u64);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a vehicle travelling through the network.
///
/// Owned by exactly one vehicle task; nothing else reads or mutates it.
#[derive(Debug)]
pub struct Vehicle {
    pub id: VehicleId,
    /// Speed in km/h.
    pub speed: u32,
    pub direction: Direction,
    /// Time spent inside an intersection while crossing it.
    pub crossing_time: Duration,
    /// Where the vehicle is waiting or crossing; `None` once it has left the network.
    pub current: Option<IntersectionIndex>,
}

impl Vehicle {
    /// Creates a vehicle, deriving its crossing time from `speed` and `distance_m`.
    /// Returns `None` for a zero speed.
    pub fn new(
        id: VehicleId,
        speed: u32,
        direction: Direction,
        start: IntersectionIndex,
        distance_m: f64,
    ) -> Option<Self> {
        let crossing_time = crossing_time(distance_m, speed)?;
        Some(Self {
            id,
            speed,
            direction,
            crossing_time,
            current: Some(start),
        })
    }
}

/// `distance / (speed * km/h->m/s)` seconds, rounded to the nearest millisecond.
pub fn crossing_time(distance_m: f64, speed_kmh: u32) -> Option<Duration> {
    if speed_kmh == 0 || !distance_m.is_finite() || distance_m < 0.0 {
        return None;
    }
    let millis = (distance_m / (speed_kmh as f64 * KMH_TO_MS)).round();
    Some(Duration::from_millis(millis as u64))
}
