use crate::communication::messages::{EventLog, SimulationEvent};
use crate::config::SimulationConfig;
use crate::shared_data::{ActiveVehicles, SimulationStats};
use crate::simulation_engine::intersections::{Direction, IntersectionIndex};
use crate::simulation_engine::network::Network;
use crate::simulation_engine::simulation::{
    simulate_vehicle_journey, JourneyContext, JourneySummary,
};
use crate::simulation_engine::vehicles::{Vehicle, VehicleId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;

/// Why the generator could not produce a vehicle this round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    NoIntersections,
    EmptySpeedBand { low: u32, high: u32 },
    InvalidVehicle { id: VehicleId, speed: u32 },
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GeneratorError::NoIntersections => write!(f, "network has no intersections"),
            GeneratorError::EmptySpeedBand { low, high } => {
                write!(f, "speed band {}..={} is empty", low, high)
            }
            GeneratorError::InvalidVehicle { id, speed } => {
                write!(f, "could not build vehicle {} with speed {} km/h", id, speed)
            }
        }
    }
}

impl std::error::Error for GeneratorError {}

/// Result of handing a vehicle to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Spawned,
    Rejected,
}

/// Collects every vehicle task that has already finished, without waiting.
/// Returns the summaries of the journeys that completed.
pub fn reap_finished(vehicles: &mut JoinSet<JourneySummary>) -> Vec<JourneySummary> {
    let mut finished = Vec::new();
    while let Some(joined) = vehicles.try_join_next() {
        match joined {
            Ok(summary) => {
                log::debug!(
                    "Vehicle {} finished ({:?}) after crossing {:?} with {} waits",
                    summary.vehicle,
                    summary.outcome,
                    summary.crossed,
                    summary.waits
                );
                finished.push(summary);
            }
            Err(e) => log::error!("Vehicle task failed: {}", e),
        }
    }
    finished
}

/// Fabricates vehicles with random attributes and spawns their tasks.
pub struct VehicleGenerator {
    network: Arc<Network>,
    config: SimulationConfig,
    rng: StdRng,
    next_id: u64,
}

impl VehicleGenerator {
    pub fn new(network: Arc<Network>, config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            network,
            config,
            rng,
            next_id: 0,
        }
    }

    /// Builds the next vehicle: fresh id, random direction, a speed from the
    /// direction's band and a random starting intersection.
    pub fn next_vehicle(&mut self) -> Result<Vehicle, GeneratorError> {
        if self.network.is_empty() {
            return Err(GeneratorError::NoIntersections);
        }

        let id = VehicleId(self.next_id);
        self.next_id += 1;

        let direction = Direction::ALL[self.rng.random_range(0..Direction::ALL.len())];
        let (low, high) = if direction.is_turning() {
            self.config.turning_speed
        } else {
            self.config.straight_speed
        };
        if low > high {
            return Err(GeneratorError::EmptySpeedBand { low, high });
        }
        let speed = self.rng.random_range(low..=high);
        let start = IntersectionIndex(self.rng.random_range(0..self.network.len()));

        Vehicle::new(id, speed, direction, start, self.config.crossing_distance_m)
            .ok_or(GeneratorError::InvalidVehicle { id, speed })
    }

    /// Random pause before the next vehicle, in whole seconds.
    pub fn spawn_delay(&mut self) -> Duration {
        Duration::from_secs(self.rng.random_range(0..=self.config.max_spawn_delay_secs))
    }

    /// Starts `vehicle`'s task inside `vehicles`, unless the admission gate is full.
    /// A rejected vehicle is dropped here.
    pub fn launch(
        &self,
        vehicle: Vehicle,
        vehicles: &mut JoinSet<JourneySummary>,
        events: &EventLog,
        stats: &Arc<SimulationStats>,
        active: &ActiveVehicles,
    ) -> Admission {
        if let Some(limit) = self.config.max_live_vehicles {
            let live = active.len();
            if live >= limit {
                log::debug!("Vehicle {} rejected: {}/{} live", vehicle.id, live, limit);
                events.emit(SimulationEvent::VehicleRejected {
                    vehicle: vehicle.id,
                    live,
                    limit,
                });
                stats.record_rejected();
                return Admission::Rejected;
            }
        }

        let Some(start) = vehicle.current.and_then(|index| self.network.get(index)) else {
            log::warn!("Vehicle {} has no valid starting intersection", vehicle.id);
            stats.record_rejected();
            return Admission::Rejected;
        };
        let Some(registration) = active.register(vehicle.id) else {
            log::warn!("Vehicle {} is already live", vehicle.id);
            stats.record_rejected();
            return Admission::Rejected;
        };

        events.emit(SimulationEvent::VehicleSpawned {
            vehicle: vehicle.id,
            speed: vehicle.speed,
            direction: vehicle.direction,
            intersection: start.id,
            crossing_ms: vehicle.crossing_time.as_millis() as u64,
        });
        stats.record_spawned();

        let ctx = JourneyContext {
            network: Arc::clone(&self.network),
            retry_interval: self.config.retry_interval,
            events: events.clone(),
            stats: Arc::clone(stats),
        };
        vehicles.spawn(simulate_vehicle_journey(vehicle, ctx, registration));
        Admission::Spawned
    }

    /// Generates vehicles until `shutdown` changes (or its sender drops).
    ///
    /// Vehicle tasks live in a `JoinSet` owned by this loop: finished ones are
    /// reaped every iteration and the rest are cancelled on the way out.
    pub async fn run(
        mut self,
        events: EventLog,
        stats: Arc<SimulationStats>,
        active: ActiveVehicles,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut vehicles = JoinSet::new();

        loop {
            reap_finished(&mut vehicles);

            let pause = match self.next_vehicle() {
                Ok(vehicle) => {
                    self.launch(vehicle, &mut vehicles, &events, &stats, &active);
                    self.spawn_delay()
                }
                Err(e) => {
                    let retry = self.config.backoff_interval;
                    log::warn!("Vehicle generation failed: {}", e);
                    events.emit(SimulationEvent::GeneratorBackoff {
                        reason: e.to_string(),
                        retry_ms: retry.as_millis() as u64,
                    });
                    retry
                }
            };

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = sleep(pause) => {}
            }
        }

        log::info!("Vehicle generator stopping, cancelling {} vehicle tasks", vehicles.len());
        vehicles.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::intersections::IntersectionId;
    use crate::simulation_engine::network::NetworkBuilder;

    fn seeded(seed: u64) -> VehicleGenerator {
        let config = SimulationConfig {
            seed: Some(seed),
            ..SimulationConfig::default()
        };
        VehicleGenerator::new(Arc::new(Network::reference().unwrap()), config)
    }

    #[test]
    fn ids_are_monotonic() {
        let mut generator = seeded(1);
        let ids: Vec<u64> = (0..20).map(|_| generator.next_vehicle().unwrap().id.0).collect();
        assert_eq!(ids, (0..20).collect::<Vec<u64>>());
    }

    #[test]
    fn speed_bands_depend_on_direction() {
        let mut generator = seeded(42);
        let mut turning_max = 0;
        let mut straight_min = u32::MAX;
        for _ in 0..2000 {
            let vehicle = generator.next_vehicle().unwrap();
            if vehicle.direction.is_turning() {
                assert!((20..=50).contains(&vehicle.speed), "{:?}", vehicle);
                turning_max = turning_max.max(vehicle.speed);
            } else {
                assert!((30..=60).contains(&vehicle.speed), "{:?}", vehicle);
                straight_min = straight_min.min(vehicle.speed);
            }
            assert!(vehicle.current.unwrap().0 < 4);
        }
        assert!(turning_max <= 50);
        assert!(straight_min >= 30);
    }

    #[test]
    fn same_seed_same_vehicles() {
        let mut a = seeded(7);
        let mut b = seeded(7);
        for _ in 0..50 {
            let va = a.next_vehicle().unwrap();
            let vb = b.next_vehicle().unwrap();
            assert_eq!((va.direction, va.speed, va.current), (vb.direction, vb.speed, vb.current));
        }
    }

    #[test]
    fn spawn_delay_is_bounded() {
        let mut generator = seeded(3);
        for _ in 0..200 {
            assert!(generator.spawn_delay() <= Duration::from_secs(2));
        }
    }

    #[test]
    fn empty_network_is_an_error() {
        let network = Arc::new(NetworkBuilder::new().build().unwrap());
        let mut generator = VehicleGenerator::new(network, SimulationConfig::default());
        assert_eq!(
            generator.next_vehicle().unwrap_err(),
            GeneratorError::NoIntersections
        );
    }

    #[tokio::test(start_paused = true)]
    async fn admission_gate_rejects_when_full() {
        let config = SimulationConfig {
            seed: Some(5),
            max_live_vehicles: Some(2),
            ..SimulationConfig::default()
        };
        let mut generator = VehicleGenerator::new(Arc::new(Network::reference().unwrap()), config);
        let (events, _rx) = EventLog::channel();
        let stats = Arc::new(SimulationStats::default());
        let active = ActiveVehicles::new();
        let mut vehicles = JoinSet::new();

        let mut admissions = Vec::new();
        for _ in 0..4 {
            let vehicle = generator.next_vehicle().unwrap();
            admissions.push(generator.launch(vehicle, &mut vehicles, &events, &stats, &active));
        }
        assert_eq!(
            admissions,
            vec![
                Admission::Spawned,
                Admission::Spawned,
                Admission::Rejected,
                Admission::Rejected,
            ]
        );
        assert_eq!(active.len(), 2);
        assert_eq!(stats.snapshot(active.len()).rejected, 2);

        vehicles.shutdown().await;
        assert!(active.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reaping_returns_finished_journeys_only() {
        let network = Arc::new(Network::reference().unwrap());
        let config = SimulationConfig {
            seed: Some(9),
            ..SimulationConfig::default()
        };
        let generator = VehicleGenerator::new(Arc::clone(&network), config);
        let (events, _rx) = EventLog::channel();
        let stats = Arc::new(SimulationStats::default());
        let active = ActiveVehicles::new();
        let mut vehicles = JoinSet::new();

        let a = network.index_of(IntersectionId('A')).unwrap();
        let d = network.index_of(IntersectionId('D')).unwrap();
        // SN from A is open and continues to C, which is open for SN too.
        let through = Vehicle::new(VehicleId(100), 40, Direction::SouthNorth, a, 500.0).unwrap();
        // EW at A stays closed without a cycle task.
        let stuck = Vehicle::new(VehicleId(101), 40, Direction::EastWest, a, 500.0).unwrap();
        // WE at D is open and has no successor.
        let exiting = Vehicle::new(VehicleId(102), 40, Direction::WestEast, d, 500.0).unwrap();
        for vehicle in [through, stuck, exiting] {
            assert_eq!(
                generator.launch(vehicle, &mut vehicles, &events, &stats, &active),
                Admission::Spawned
            );
        }

        assert!(reap_finished(&mut vehicles).is_empty());
        sleep(Duration::from_secs(5)).await;

        let mut finished = reap_finished(&mut vehicles);
        finished.sort_by_key(|summary| summary.vehicle.0);
        let crossed: Vec<_> = finished
            .iter()
            .map(|summary| (summary.vehicle, summary.crossed.clone(), summary.waits))
            .collect();
        assert_eq!(
            crossed,
            vec![
                (VehicleId(100), vec![IntersectionId('A'), IntersectionId('C')], 0),
                (VehicleId(102), vec![IntersectionId('D')], 0),
            ]
        );
        assert_eq!(vehicles.len(), 1);
        assert!(active.contains(VehicleId(101)));

        vehicles.shutdown().await;
        assert!(reap_finished(&mut vehicles).is_empty());
        assert!(active.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown_and_cancels_vehicles() {
        let generator = seeded(11);
        let (events, _rx) = EventLog::channel();
        let stats = Arc::new(SimulationStats::default());
        let active = ActiveVehicles::new();
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(generator.run(events, Arc::clone(&stats), active.clone(), stop_rx));
        sleep(Duration::from_secs(10)).await;
        stop_tx.send(true).unwrap();
        task.await.unwrap();

        assert!(stats.snapshot(0).spawned > 0);
        assert!(active.is_empty());
    }
}
