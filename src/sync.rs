// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Interrupt synchronization and bus arbitration.
//!
//! Both live in one [`EventFlags`] group so a waiter can block on "data
//! ready AND bus free" atomically, the way the background service does.
//! The `BUS_FREE` bit is the bus token: clearing it acquires the bus,
//! setting it releases the bus.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Falling edge seen on the data-ready line
pub const EVENT_IRQ: u8 = 1 << 0;
/// Bus token is available
pub const EVENT_BUS_FREE: u8 = 1 << 1;

/// A small group of binary flags with blocking, timeout-capable waits.
#[derive(Debug, Default)]
pub struct EventFlags {
    bits: Mutex<u8>,
    cond: Condvar,
}

impl EventFlags {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, u8> {
        self.bits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the bits in `mask` and wake every waiter.
    pub fn set(&self, mask: u8) {
        *self.lock() |= mask;
        self.cond.notify_all();
    }

    /// Current value of the group
    pub fn peek(&self) -> u8 {
        *self.lock()
    }

    /// Block until every bit in `mask` is set, then clear them.
    ///
    /// `None` waits indefinitely. Returns `false` if the deadline passed,
    /// in which case nothing is cleared.
    pub fn wait_all(&self, mask: u8, deadline: Option<Instant>) -> bool {
        let mut bits = self.lock();
        loop {
            if *bits & mask == mask {
                *bits &= !mask;
                return true;
            }
            bits = match deadline {
                None => self.cond.wait(bits).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.cond
                        .wait_timeout(bits, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

/// Handle given to an interrupt source.
///
/// [`notify`](IrqNotifier::notify) is all an edge handler may do: it sets
/// one flag and wakes waiters. No allocation, no logging, no I/O.
#[derive(Debug, Clone)]
pub struct IrqNotifier {
    events: Arc<EventFlags>,
}

impl IrqNotifier {
    pub fn new(events: Arc<EventFlags>) -> Self {
        Self { events }
    }

    #[inline]
    pub fn notify(&self) {
        self.events.set(EVENT_IRQ);
    }
}

/// Single-slot bus token.
///
/// Not reentrant and without owner identity: a holder that tries to
/// acquire again deadlocks. [`release`](BusArbiter::release) is a no-op
/// when the token is already free, so error paths can release
/// unconditionally.
#[derive(Debug, Clone)]
pub struct BusArbiter {
    events: Arc<EventFlags>,
}

impl BusArbiter {
    /// Create an arbiter over `events`. The token starts out held; call
    /// [`release`](BusArbiter::release) to make the bus available.
    pub fn new(events: Arc<EventFlags>) -> Self {
        Self { events }
    }

    /// Wait for the token. `None` waits indefinitely.
    pub fn acquire(&self, deadline: Option<Instant>) -> Option<BusGuard<'_>> {
        self.events
            .wait_all(EVENT_BUS_FREE, deadline)
            .then(|| BusGuard { arbiter: self })
    }

    pub fn release(&self) {
        self.events.set(EVENT_BUS_FREE);
    }

    pub fn is_free(&self) -> bool {
        self.events.peek() & EVENT_BUS_FREE != 0
    }
}

/// Holds the bus token until dropped.
#[derive(Debug)]
pub struct BusGuard<'a> {
    arbiter: &'a BusArbiter,
}

impl Drop for BusGuard<'_> {
    fn drop(&mut self) {
        self.arbiter.release();
    }
}
