//! Device-state store.
//!
//! One store per configured device. The supervisor's read loop is the only
//! writer; any number of observers read concurrently. `snapshot()` hands out
//! a copy, so readers see either the pre- or post-update map, never a torn
//! one. Telemetry is monotonically refined: merges overwrite keys, nothing
//! ever prunes them.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use vaclink_types::FieldMap;

#[derive(Debug, Default)]
struct StateInner {
    fields: FieldMap,
    robot_connected: bool,
    cloud_connected: bool,
    serial: Option<String>,
}

/// Shared device state. Clone it cheaply – all clones view the same device.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    inner: Arc<RwLock<StateInner>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StateInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StateInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shallow top-level merge: each key in `partial` overwrites the stored
    /// value wholesale (nested maps are replaced, not deep-merged). Keys
    /// absent from `partial` are untouched.
    pub fn merge(&self, partial: &FieldMap) -> usize {
        let mut inner = self.write();
        for (key, value) in partial {
            inner.fields.insert(key.clone(), value.clone());
        }
        partial.len()
    }

    /// Point-in-time copy of the merged telemetry. Callers own the returned
    /// map; mutating it cannot affect the store.
    pub fn snapshot(&self) -> FieldMap {
        self.read().fields.clone()
    }

    /// Update only the flags provided. Reports whether any flag actually
    /// changed value, which drives bootstrap re-sync and listener
    /// notification decisions.
    pub fn set_connectivity(&self, robot: Option<bool>, cloud: Option<bool>) -> bool {
        let mut inner = self.write();
        let mut changed = false;
        if let Some(robot) = robot {
            changed |= inner.robot_connected != robot;
            inner.robot_connected = robot;
        }
        if let Some(cloud) = cloud {
            changed |= inner.cloud_connected != cloud;
            inner.cloud_connected = cloud;
        }
        changed
    }

    /// Record the device serial. Retained across reconnects until a payload
    /// supplies a different one.
    pub fn set_serial(&self, serial: &str) {
        self.write().serial = Some(serial.to_owned());
    }

    pub fn robot_connected(&self) -> bool {
        self.read().robot_connected
    }

    pub fn cloud_connected(&self) -> bool {
        self.read().cloud_connected
    }

    pub fn serial(&self) -> Option<String> {
        self.read().serial.clone()
    }
}
