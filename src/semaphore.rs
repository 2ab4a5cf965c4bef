// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 The banksim contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Counting semaphore for admission control.
//!
//! Limits how many fraud engines process transactions concurrently.
//! Permits are RAII guards: dropping a [`SemaphorePermit`] releases it and
//! wakes one waiter. No FIFO fairness is guaranteed; first-ready-wins
//! matches the condition-variable scheduling policy.

use crate::error::LedgerError;
use parking_lot::{Condvar, Mutex};

/// Counting semaphore backed by a single mutex/condvar pair.
#[derive(Debug)]
pub struct CountingSemaphore {
    permits: Mutex<usize>,
    available: Condvar,
    capacity: usize,
}

impl CountingSemaphore {
    /// Creates a semaphore with `capacity` permits.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, LedgerError> {
        if capacity == 0 {
            return Err(LedgerError::InvalidCapacity);
        }
        Ok(Self {
            permits: Mutex::new(capacity),
            available: Condvar::new(),
            capacity,
        })
    }

    /// Blocks until a permit is available, then takes it.
    ///
    /// This operation cannot fail, only block.
    pub fn acquire(&self) -> SemaphorePermit<'_> {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
        SemaphorePermit { semaphore: self }
    }

    /// Takes a permit if one is available, never blocking.
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        let mut permits = self.permits.lock();
        if *permits > 0 {
            *permits -= 1;
            Some(SemaphorePermit { semaphore: self })
        } else {
            None
        }
    }

    /// Snapshot of the free permit count.
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a permit. Count is capped at capacity; one waiter is woken.
    fn release(&self) {
        let mut permits = self.permits.lock();
        if *permits < self.capacity {
            *permits += 1;
            self.available.notify_one();
        }
    }
}

/// Permit held while a resource slot is in use. Released on drop.
#[derive(Debug)]
pub struct SemaphorePermit<'a> {
    semaphore: &'a CountingSemaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}
