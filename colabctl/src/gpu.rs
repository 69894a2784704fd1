//! Physical GPU allocation pool.
//!
//! A fixed set of device ids handed out one at a time to notebook sessions.
//! Allocation always returns the lowest free id. The pool only tracks which ids
//! are free; the session manager is responsible for remembering who holds what
//! and for releasing on teardown.
//!
//! The number of free devices is published as the `colabctl_gpus_available`
//! gauge through the `metrics` facade, so it shows up at `/internal/metrics`
//! whenever a recorder is installed.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use metrics::gauge;
use tracing::{debug, warn};

use crate::types::GpuId;

pub struct GpuPool {
    devices: BTreeSet<GpuId>,
    available: Mutex<BTreeSet<GpuId>>,
}

impl GpuPool {
    pub fn new(device_ids: impl IntoIterator<Item = GpuId>) -> Self {
        let devices: BTreeSet<GpuId> = device_ids.into_iter().collect();
        let pool = Self {
            available: Mutex::new(devices.clone()),
            devices,
        };
        pool.publish(pool.devices.len());
        pool
    }

    /// Take the lowest free GPU id, or `None` when every device is in use.
    pub fn allocate(&self) -> Option<GpuId> {
        let mut available = self.lock();
        let gpu = available.pop_first();
        let remaining = available.len();
        drop(available);

        match gpu {
            Some(id) => {
                debug!(gpu_id = id, remaining, "GPU allocated");
                self.publish(remaining);
            }
            None => debug!("GPU pool exhausted"),
        }
        gpu
    }

    /// Return a GPU id to the pool. Releasing an id that is already free does
    /// nothing; ids outside the configured device set are ignored.
    pub fn release(&self, id: GpuId) {
        if !self.devices.contains(&id) {
            warn!(gpu_id = id, "Ignoring release of GPU outside the configured pool");
            return;
        }

        let mut available = self.lock();
        if !available.insert(id) {
            debug!(gpu_id = id, "GPU already free");
            return;
        }
        let remaining = available.len();
        drop(available);

        debug!(gpu_id = id, remaining, "GPU released");
        self.publish(remaining);
    }

    /// Number of GPUs currently free.
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    /// Total number of GPUs in the pool.
    pub fn capacity(&self) -> usize {
        self.devices.len()
    }

    #[cfg(test)]
    pub fn is_free(&self, id: GpuId) -> bool {
        self.lock().contains(&id)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<GpuId>> {
        // The set is always left consistent, so a poisoned lock is still usable
        self.available.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Re-publish the free count, for a recorder installed after the pool was built.
    pub fn publish_current(&self) {
        self.publish(self.available());
    }

    fn publish(&self, free: usize) {
        gauge!("colabctl_gpus_available").set(free as f64);
    }
}
