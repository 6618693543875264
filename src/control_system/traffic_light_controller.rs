use crate::communication::messages::{EventLog, SimulationEvent};
use crate::shared_data::SimulationStats;
use crate::simulation_engine::intersections::{IntersectionIndex, Phase, SignalSnapshot};
use crate::simulation_engine::network::Network;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Right-of-way cycle of a single intersection.
#[derive(Debug)]
pub struct IntersectionController {
    pub intersection: IntersectionIndex,
    pub phase: Phase,
    pub cycles: u64,
}

impl IntersectionController {
    pub fn new(intersection: IntersectionIndex, phase: Phase) -> Self {
        Self {
            intersection,
            phase,
            cycles: 0,
        }
    }

    // Switches to the next phase and returns the resulting signals.
    // None if the intersection is not part of `network`.
    pub fn update(&mut self, network: &Network) -> Option<SignalSnapshot> {
        let intersection = network.get(self.intersection)?;
        self.phase = intersection.switch_phase(self.phase);
        self.cycles += 1;
        Some(intersection.signals())
    }

    // Publishes the current signals of the intersection.
    pub fn apply_current_phase(&self, network: &Network, events: &EventLog) {
        if let Some(intersection) = network.get(self.intersection) {
            events.emit(SimulationEvent::IntersectionCycled {
                intersection: intersection.id,
                cycle: self.cycles,
                signals: intersection.signals(),
            });
        }
    }

    // Runs forever: wait one period, toggle, report.
    // Locks are only held inside `update`, never across the sleep, so aborting
    // this task cannot leave a signal locked.
    pub async fn run_cycle_loop(
        mut self,
        network: Arc<Network>,
        period: Duration,
        events: EventLog,
        stats: Arc<SimulationStats>,
    ) {
        self.apply_current_phase(&network, &events);
        loop {
            sleep(period).await;
            if self.update(&network).is_none() {
                log::error!(
                    "Intersection index {:?} not found, stopping its cycle task",
                    self.intersection
                );
                return;
            }
            stats.record_cycle();
            self.apply_current_phase(&network, &events);
        }
    }
}

/// One controller per intersection of the network.
pub struct TrafficLightController {
    pub controllers: Vec<IntersectionController>,
}

impl TrafficLightController {
    pub fn initialize(network: &Network) -> Self {
        let controllers = network
            .iter()
            .map(|(index, intersection)| {
                let phase = intersection
                    .signals()
                    .phase()
                    .unwrap_or_else(|| Network::initial_phase(index));
                IntersectionController::new(index, phase)
            })
            .collect();
        Self { controllers }
    }

    // Calls update() on every controller, without waiting.
    pub fn update_all(&mut self, network: &Network) {
        for controller in self.controllers.iter_mut() {
            controller.update(network);
        }
    }

    // Spawns one cycle task per intersection.
    pub fn spawn_all(
        self,
        network: Arc<Network>,
        period: Duration,
        events: EventLog,
        stats: Arc<SimulationStats>,
    ) -> Vec<JoinHandle<()>> {
        self.controllers
            .into_iter()
            .map(|controller| {
                tokio::spawn(controller.run_cycle_loop(
                    Arc::clone(&network),
                    period,
                    events.clone(),
                    Arc::clone(&stats),
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::intersections::{Direction, IntersectionId};

    #[test]
    fn update_alternates_phases() {
        let network = Network::reference().unwrap();
        let a = network.index_of(IntersectionId('A')).unwrap();
        let mut controller = IntersectionController::new(a, Phase::NorthSouth);

        for cycle in 1..=8u64 {
            let signals = controller.update(&network).unwrap();
            let expected = if cycle % 2 == 0 {
                Phase::NorthSouth
            } else {
                Phase::EastWest
            };
            assert_eq!(signals.phase(), Some(expected), "cycle {}", cycle);
            assert_eq!(controller.cycles, cycle);
        }
    }

    #[test]
    fn update_on_unknown_intersection_is_none() {
        let network = Network::reference().unwrap();
        let mut controller = IntersectionController::new(IntersectionIndex(9), Phase::NorthSouth);
        assert!(controller.update(&network).is_none());
        assert_eq!(controller.cycles, 0);
    }

    #[test]
    fn update_all_toggles_every_intersection() {
        let network = Network::reference().unwrap();
        let mut controller = TrafficLightController::initialize(&network);
        assert_eq!(controller.controllers.len(), 4);
        controller.update_all(&network);
        let a = network.index_of(IntersectionId('A')).unwrap();
        let b = network.index_of(IntersectionId('B')).unwrap();
        assert!(network.is_open(a, Direction::EastWest));
        assert!(network.is_open(b, Direction::NorthSouth));
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_task_reports_every_period() {
        let network = Arc::new(Network::reference().unwrap());
        let stats = Arc::new(SimulationStats::default());
        let (events, mut rx) = EventLog::channel();
        let a = network.index_of(IntersectionId('A')).unwrap();
        let controller = IntersectionController::new(a, Phase::NorthSouth);
        let handle = tokio::spawn(controller.run_cycle_loop(
            Arc::clone(&network),
            Duration::from_secs(3),
            events,
            Arc::clone(&stats),
        ));

        let start = tokio::time::Instant::now();
        let mut phases = Vec::new();
        for expected_cycle in 0..5u64 {
            match rx.recv().await.unwrap() {
                SimulationEvent::IntersectionCycled { cycle, signals, .. } => {
                    assert_eq!(cycle, expected_cycle);
                    let due = Duration::from_secs(3 * expected_cycle);
                    let elapsed = start.elapsed();
                    assert!(elapsed >= due && elapsed < due + Duration::from_millis(50));
                    phases.push(signals.phase().unwrap());
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        handle.abort();

        assert_eq!(
            phases,
            vec![
                Phase::NorthSouth,
                Phase::EastWest,
                Phase::NorthSouth,
                Phase::EastWest,
                Phase::NorthSouth,
            ]
        );
        assert_eq!(stats.snapshot(0).cycles, 4);
        // Aborted mid-sleep: the signals are still readable.
        assert!(network.is_open(a, Direction::NorthSouth));
    }
}
