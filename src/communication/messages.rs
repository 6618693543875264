use crate::config::LogFormat;
use crate::simulation_engine::intersections::{Direction, IntersectionId, SignalSnapshot};
use crate::simulation_engine::vehicles::VehicleId;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

/// One line of the simulation event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum SimulationEvent {
    IntersectionCycled {
        intersection: IntersectionId,
        cycle: u64,
        signals: SignalSnapshot,
    },
    VehicleSpawned {
        vehicle: VehicleId,
        speed: u32,
        direction: Direction,
        intersection: IntersectionId,
        crossing_ms: u64,
    },
    VehicleWaiting {
        vehicle: VehicleId,
        direction: Direction,
        intersection: IntersectionId,
    },
    VehicleCrossing {
        vehicle: VehicleId,
        direction: Direction,
        intersection: IntersectionId,
    },
    VehicleArrived {
        vehicle: VehicleId,
        direction: Direction,
        from: IntersectionId,
        to: IntersectionId,
    },
    VehicleExited {
        vehicle: VehicleId,
        direction: Direction,
        intersection: IntersectionId,
    },
    VehicleAborted {
        vehicle: VehicleId,
        reason: String,
    },
    VehicleRejected {
        vehicle: VehicleId,
        live: usize,
        limit: usize,
    },
    GeneratorBackoff {
        reason: String,
        retry_ms: u64,
    },
}

impl fmt::Display for SimulationEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimulationEvent::IntersectionCycled {
                intersection,
                cycle,
                signals,
            } => write!(f, "Intersection {} (cycle {}): {}", intersection, cycle, signals),
            SimulationEvent::VehicleSpawned {
                vehicle,
                speed,
                direction,
                intersection,
                crossing_ms,
            } => write!(
                f,
                "Vehicle {}: spawned at intersection {}, direction {}, speed {} km/h, crossing {} ms",
                vehicle, intersection, direction, speed, crossing_ms
            ),
            SimulationEvent::VehicleWaiting {
                vehicle,
                direction,
                intersection,
            } => write!(
                f,
                "Vehicle {}: waiting at intersection {}, {} closed",
                vehicle, intersection, direction
            ),
            SimulationEvent::VehicleCrossing {
                vehicle,
                direction,
                intersection,
            } => write!(
                f,
                "Vehicle {}: crossing intersection {} heading {}",
                vehicle, intersection, direction
            ),
            SimulationEvent::VehicleArrived {
                vehicle,
                direction,
                from,
                to,
            } => write!(
                f,
                "Vehicle {}: left {} heading {}, arrived at intersection {}",
                vehicle, from, direction, to
            ),
            SimulationEvent::VehicleExited {
                vehicle,
                direction,
                intersection,
            } => write!(
                f,
                "Vehicle {}: exited the network from intersection {} heading {}",
                vehicle, intersection, direction
            ),
            SimulationEvent::VehicleAborted { vehicle, reason } => {
                write!(f, "Vehicle {}: aborted ({})", vehicle, reason)
            }
            SimulationEvent::VehicleRejected {
                vehicle,
                live,
                limit,
            } => write!(
                f,
                "Generator: vehicle {} rejected, {}/{} vehicles live",
                vehicle, live, limit
            ),
            SimulationEvent::GeneratorBackoff { reason, retry_ms } => {
                write!(f, "Generator: {}, retrying in {} ms", reason, retry_ms)
            }
        }
    }
}

/// Cloneable handle every task uses to publish events.
///
/// Sending never blocks; if the printer is gone the event is dropped.
#[derive(Debug, Clone)]
pub struct EventLog {
    tx: UnboundedSender<SimulationEvent>,
}

impl EventLog {
    pub fn channel() -> (Self, UnboundedReceiver<SimulationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: SimulationEvent) {
        if let Err(e) = self.tx.send(event) {
            log::debug!("Event log closed, dropping event: {}", e.0);
        }
    }
}

/// Formats one event as a single output line.
pub fn render_event(event: &SimulationEvent, format: LogFormat, elapsed_secs: f64) -> String {
    match format {
        LogFormat::Text => format!("[{:>9.3}s] {}", elapsed_secs, event),
        LogFormat::Json => match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                log::error!("Failed to serialize event {:?}: {}", event, e);
                format!("[{:>9.3}s] {}", elapsed_secs, event)
            }
        },
    }
}

/// Prints every event to stdout until all `EventLog` handles are dropped.
/// Returns how many events were printed.
pub async fn run_event_printer(
    mut rx: UnboundedReceiver<SimulationEvent>,
    format: LogFormat,
) -> u64 {
    let start = Instant::now();
    let mut printed = 0;
    while let Some(event) = rx.recv().await {
        println!("{}", render_event(&event, format, start.elapsed().as_secs_f64()));
        printed += 1;
    }
    printed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crossing() -> SimulationEvent {
        SimulationEvent::VehicleCrossing {
            vehicle: VehicleId(3),
            direction: Direction::SouthNorth,
            intersection: IntersectionId('A'),
        }
    }

    #[test]
    fn text_lines_name_actor_and_action() {
        let line = render_event(&crossing(), LogFormat::Text, 1.5);
        assert!(line.contains("Vehicle 3"), "{}", line);
        assert!(line.contains("crossing intersection A"), "{}", line);
        assert!(line.contains("SN"), "{}", line);

        let cycled = SimulationEvent::IntersectionCycled {
            intersection: IntersectionId('B'),
            cycle: 4,
            signals: SignalSnapshot {
                ns: false,
                sn: false,
                ew: true,
                we: true,
            },
        };
        let line = render_event(&cycled, LogFormat::Text, 0.0);
        assert!(line.contains("Intersection B"), "{}", line);
        assert!(line.contains("NS: closed, SN: closed, EW: open, WE: open"), "{}", line);
    }

    #[test]
    fn json_lines_are_tagged() {
        let line = render_event(&crossing(), LogFormat::Json, 0.0);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "VehicleCrossing");
        assert_eq!(value["direction"], "SN");
        assert_eq!(value["intersection"], "A");
        assert_eq!(value["vehicle"], 3);
    }

    #[tokio::test]
    async fn emit_after_printer_gone_is_ignored() {
        let (events, rx) = EventLog::channel();
        drop(rx);
        events.emit(crossing());
    }

    #[tokio::test]
    async fn printer_drains_until_senders_drop() {
        let (events, rx) = EventLog::channel();
        let printer = tokio::spawn(run_event_printer(rx, LogFormat::Text));
        events.emit(crossing());
        events.emit(crossing());
        drop(events);
        assert_eq!(printer.await.unwrap(), 2);
    }
}
