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

//! Bounded, thread-safe FIFO connecting transaction producers to
//! fraud-engine consumers.
//!
//! Producers block while the queue is full; consumers block while it is
//! empty. [`close`] marks the queue permanently closed and wakes every
//! waiter so shutdown never strands a consumer.
//!
//! [`close`]: BoundedTransactionQueue::close

use crate::error::LedgerError;
use crate::transaction::Transaction;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

#[derive(Debug)]
struct QueueState {
    items: VecDeque<Transaction>,
    closed: bool,
}

/// Fixed-capacity blocking transaction queue.
///
/// Ordering guarantee: strict FIFO across all producers combined — items
/// are dequeued in the order their `enqueue` calls appended them under the
/// queue lock.
#[derive(Debug)]
pub struct BoundedTransactionQueue {
    state: Mutex<QueueState>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl BoundedTransactionQueue {
    /// Creates a queue holding at most `capacity` transactions.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, LedgerError> {
        if capacity == 0 {
            return Err(LedgerError::InvalidCapacity);
        }
        Ok(Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        })
    }

    /// Appends a transaction, blocking while the queue is full.
    ///
    /// Wakes one waiting consumer on success.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::QueueClosed`] if the queue was closed, either
    /// before the call or while this producer was blocked.
    pub fn enqueue(&self, transaction: Transaction) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        while state.items.len() >= self.capacity && !state.closed {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(LedgerError::QueueClosed);
        }
        state.items.push_back(transaction);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes and returns the oldest transaction, blocking while the
    /// queue is empty and still open.
    ///
    /// Returns `None` once the queue is closed and drained; wakes one
    /// waiting producer otherwise.
    pub fn dequeue(&self) -> Option<Transaction> {
        let mut state = self.state.lock();
        while state.items.is_empty() && !state.closed {
            self.not_empty.wait(&mut state);
        }
        match state.items.pop_front() {
            Some(transaction) => {
                self.not_full.notify_one();
                Some(transaction)
            }
            // closed and drained
            None => None,
        }
    }

    /// Marks the queue permanently closed and wakes all waiters.
    ///
    /// Pending items remain dequeueable; further `enqueue` calls fail.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Consistent, possibly stale, item count.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.state.lock().items.len() >= self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
