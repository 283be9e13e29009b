// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Hardware synchronization counters ("sync points").
//!
//! A sync point is a monotonically increasing 32-bit value incremented by
//! hardware when an armed condition fires. Software reserves increments with
//! [`SyncPoint::incr_max`], which returns the threshold the counter will
//! reach once they all happened, then blocks in [`SyncPoint::wait`].

use std::{
    sync::{Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::trace;

/// The counter did not reach the threshold before the timeout.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("sync point {id} timed out at {value} waiting for {thresh}")]
pub struct SyncptTimeout {
    pub id: u32,
    pub thresh: u32,
    pub value: u32,
}

pub trait SyncPoint: Send + Sync {
    /// Hardware index programmed into the increment registers.
    fn id(&self) -> u32;

    /// Reserves `incrs` future increments and returns the new threshold.
    fn incr_max(&self, incrs: u32) -> u32;

    /// Current counter value.
    fn read(&self) -> u32;

    /// Increments the counter from the host, standing in for a reserved
    /// event the hardware will no longer raise.
    fn cpu_incr(&self);

    /// Blocks until the counter reaches `thresh` or `timeout` elapses.
    fn wait(&self, thresh: u32, timeout: Duration) -> Result<(), SyncptTimeout>;
}

/// True once `value` has reached `thresh`, tolerating wrap-around.
pub const fn expired(value: u32, thresh: u32) -> bool {
    value.wrapping_sub(thresh) as i32 >= 0
}

#[derive(Debug, Default)]
struct Counter {
    value: u32,
    max: u32,
}

/// Host-side sync point: the counter lives in memory and is incremented by
/// whoever models the hardware (see [`crate::sim`]).
#[derive(Debug)]
pub struct HostSyncpt {
    id: u32,
    counter: Mutex<Counter>,
    changed: Condvar,
}

impl HostSyncpt {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            counter: Mutex::new(Counter::default()),
            changed: Condvar::new(),
        }
    }

    /// Increments the counter by one and wakes every waiter.
    pub fn incr(&self) {
        let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        counter.value = counter.value.wrapping_add(1);
        trace!(id = self.id, value = counter.value, "syncpt incr");
        drop(counter);
        self.changed.notify_all();
    }

    /// Outstanding increments that have been reserved but not yet seen.
    pub fn pending(&self) -> u32 {
        let counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        counter.max.wrapping_sub(counter.value)
    }
}

impl SyncPoint for HostSyncpt {
    fn id(&self) -> u32 {
        self.id
    }

    fn incr_max(&self, incrs: u32) -> u32 {
        let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        counter.max = counter.max.wrapping_add(incrs);
        counter.max
    }

    fn read(&self) -> u32 {
        self.counter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .value
    }

    fn cpu_incr(&self) {
        self.incr();
    }

    fn wait(&self, thresh: u32, timeout: Duration) -> Result<(), SyncptTimeout> {
        let deadline = Instant::now() + timeout;
        let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        // Condvar wakeups may be spurious, the deadline is re-checked each turn.
        while !expired(counter.value, thresh) {
            let now = Instant::now();
            if now >= deadline {
                return Err(SyncptTimeout {
                    id: self.id,
                    thresh,
                    value: counter.value,
                });
            }
            counter = self
                .changed
                .wait_timeout(counter, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Ok(())
    }
}
