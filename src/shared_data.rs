// src/shared_data.rs

use crate::simulation_engine::vehicles::VehicleId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Run-wide counters, shared by the generator, the vehicles and the controllers.
#[derive(Debug, Default)]
pub struct SimulationStats {
    spawned: AtomicU64,
    exited: AtomicU64,
    aborted: AtomicU64,
    rejected: AtomicU64,
    cycles: AtomicU64,
}

impl SimulationStats {
    pub fn record_spawned(&self) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exited(&self) {
        self.exited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, live: usize) -> StatsSnapshot {
        StatsSnapshot {
            spawned: self.spawned.load(Ordering::Relaxed),
            exited: self.exited.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            live,
        }
    }
}

/// Counters at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub spawned: u64,
    pub exited: u64,
    pub aborted: u64,
    pub rejected: u64,
    pub cycles: u64,
    pub live: usize,
}

/// Ids of every vehicle whose task is still alive.
#[derive(Debug, Clone, Default)]
pub struct ActiveVehicles {
    ids: Arc<Mutex<HashSet<VehicleId>>>,
}

impl ActiveVehicles {
    pub fn new() -> Self {
        Self::default()
    }

    fn ids(&self) -> MutexGuard<'_, HashSet<VehicleId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `id`; the registration is released when the returned guard drops.
    /// Returns `None` if `id` is already live.
    pub fn register(&self, id: VehicleId) -> Option<ActiveVehicle> {
        if !self.ids().insert(id) {
            return None;
        }
        Some(ActiveVehicle {
            id,
            registry: self.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    pub fn contains(&self, id: VehicleId) -> bool {
        self.ids().contains(&id)
    }
}

/// Live registration of one vehicle task.
///
/// Dropped when the task finishes or is aborted, so a cancelled vehicle
/// never stays registered.
#[derive(Debug)]
pub struct ActiveVehicle {
    id: VehicleId,
    registry: ActiveVehicles,
}

impl Drop for ActiveVehicle {
    fn drop(&mut self) {
        self.registry.ids().remove(&self.id);
    }
}
