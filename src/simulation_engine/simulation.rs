// simulation.rs
use crate::communication::messages::{EventLog, SimulationEvent};
use crate::config::SimulationConfig;
use crate::control_system::traffic_light_controller::TrafficLightController;
use crate::shared_data::{ActiveVehicle, ActiveVehicles, SimulationStats, StatsSnapshot};
use crate::simulation_engine::intersections::{Intersection, IntersectionId};
use crate::simulation_engine::network::Network;
use crate::simulation_engine::vehicle_generator::VehicleGenerator;
use crate::simulation_engine::vehicles::{Vehicle, VehicleId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

/// Where a vehicle task is in its journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleState {
    Approaching,
    Waiting,
    Crossing,
    Advanced,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JourneyOutcome {
    /// Left the network through a direction with no outgoing edge.
    Exited,
    /// Stopped because its intersection could not be resolved.
    Aborted,
}

/// What a finished vehicle task reports back to its supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JourneySummary {
    pub vehicle: VehicleId,
    pub outcome: JourneyOutcome,
    /// Intersections crossed, in order.
    pub crossed: Vec<IntersectionId>,
    /// Number of closed-signal retries.
    pub waits: u32,
}

/// Everything a vehicle task needs besides the vehicle itself.
#[derive(Debug, Clone)]
pub struct JourneyContext {
    pub network: Arc<Network>,
    pub retry_interval: Duration,
    pub events: EventLog,
    pub stats: Arc<SimulationStats>,
}

fn current_intersection<'a>(network: &'a Network, vehicle: &Vehicle) -> Result<&'a Intersection, String> {
    let index = vehicle
        .current
        .ok_or_else(|| "vehicle has no current intersection".to_string())?;
    network
        .get(index)
        .ok_or_else(|| format!("intersection index {} is not in the network", index.0))
}

/// Drives one vehicle through the network until it exits.
///
/// The vehicle is owned by this future. `registration` keeps the vehicle in
/// the live set and is released when the future completes or is dropped.
pub async fn simulate_vehicle_journey(
    mut vehicle: Vehicle,
    ctx: JourneyContext,
    registration: ActiveVehicle,
) -> JourneySummary {
    let network = &ctx.network;
    let mut state = VehicleState::Approaching;
    let mut crossed = Vec::new();
    let mut waits = 0;

    let outcome = loop {
        if state == VehicleState::Exited {
            break JourneyOutcome::Exited;
        }

        let intersection = match current_intersection(network, &vehicle) {
            Ok(intersection) => intersection,
            Err(reason) => {
                log::error!("Vehicle {} stopped: {}", vehicle.id, reason);
                ctx.events.emit(SimulationEvent::VehicleAborted {
                    vehicle: vehicle.id,
                    reason,
                });
                ctx.stats.record_aborted();
                break JourneyOutcome::Aborted;
            }
        };

        state = match state {
            VehicleState::Approaching => {
                if intersection.is_open(vehicle.direction) {
                    VehicleState::Crossing
                } else {
                    VehicleState::Waiting
                }
            }
            VehicleState::Waiting => {
                ctx.events.emit(SimulationEvent::VehicleWaiting {
                    vehicle: vehicle.id,
                    direction: vehicle.direction,
                    intersection: intersection.id,
                });
                waits += 1;
                sleep(ctx.retry_interval).await;
                VehicleState::Approaching
            }
            VehicleState::Crossing => {
                ctx.events.emit(SimulationEvent::VehicleCrossing {
                    vehicle: vehicle.id,
                    direction: vehicle.direction,
                    intersection: intersection.id,
                });
                sleep(vehicle.crossing_time).await;
                crossed.push(intersection.id);

                match intersection.next(vehicle.direction) {
                    Some(next) => {
                        vehicle.current = Some(next);
                        if let Some(to) = network.get(next) {
                            ctx.events.emit(SimulationEvent::VehicleArrived {
                                vehicle: vehicle.id,
                                direction: vehicle.direction,
                                from: intersection.id,
                                to: to.id,
                            });
                        }
                        VehicleState::Advanced
                    }
                    None => {
                        vehicle.current = None;
                        ctx.events.emit(SimulationEvent::VehicleExited {
                            vehicle: vehicle.id,
                            direction: vehicle.direction,
                            intersection: intersection.id,
                        });
                        ctx.stats.record_exited();
                        VehicleState::Exited
                    }
                }
            }
            VehicleState::Advanced => VehicleState::Approaching,
            VehicleState::Exited => VehicleState::Exited,
        };
    };

    drop(registration);
    JourneySummary {
        vehicle: vehicle.id,
        outcome,
        crossed,
        waits,
    }
}

/// The whole simulation: one cycle task per intersection plus the generator.
pub struct Simulation {
    network: Arc<Network>,
    config: SimulationConfig,
    events: EventLog,
    stats: Arc<SimulationStats>,
    active: ActiveVehicles,
}

impl Simulation {
    pub fn new(network: Arc<Network>, config: SimulationConfig, events: EventLog) -> Self {
        Self {
            network,
            config,
            events,
            stats: Arc::new(SimulationStats::default()),
            active: ActiveVehicles::new(),
        }
    }

    pub fn active_vehicles(&self) -> ActiveVehicles {
        self.active.clone()
    }

    /// Runs until `shutdown` resolves, then stops the generator (which
    /// cancels every live vehicle) and the cycle tasks.
    ///
    /// The returned snapshot's `live` is the number of vehicles that were
    /// still travelling when shutdown began.
    pub async fn run_until<F>(self, shutdown: F) -> StatsSnapshot
    where
        F: Future<Output = ()>,
    {
        log::info!(
            "Starting simulation with {} intersections, cycle period {:?}",
            self.network.len(),
            self.config.cycle_period
        );

        let cycle_tasks = TrafficLightController::initialize(&self.network).spawn_all(
            Arc::clone(&self.network),
            self.config.cycle_period,
            self.events.clone(),
            Arc::clone(&self.stats),
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let generator = VehicleGenerator::new(Arc::clone(&self.network), self.config.clone());
        let generator_task = tokio::spawn(generator.run(
            self.events.clone(),
            Arc::clone(&self.stats),
            self.active.clone(),
            stop_rx,
        ));

        shutdown.await;
        let live_at_shutdown = self.active.len();
        log::info!(
            "Shutting down simulation, cancelling {} live vehicles",
            live_at_shutdown
        );

        let _ = stop_tx.send(true);
        if let Err(e) = generator_task.await {
            log::error!("Vehicle generator failed: {}", e);
        }
        for task in cycle_tasks {
            task.abort();
            let _ = task.await;
        }

        if !self.active.is_empty() {
            log::warn!("{} vehicles still registered after shutdown", self.active.len());
        }
        self.stats.snapshot(live_at_shutdown)
    }
}
