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

//! Error types for ledger and queue operations.
//!
//! Every variant is recoverable by the caller; none should terminate the
//! process. The demonstration deadlock is deliberately *not* an error —
//! it is observable state on [`crate::AccountLedger`]
//! (`deadlock_mode_active`, `pending_unordered`).

use crate::base::AccountId;
use thiserror::Error;

/// Failures reported by the banking core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Referenced account does not exist
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    /// Amount is negative
    #[error("invalid amount (must be non-negative)")]
    InvalidAmount,

    /// Capacity of a queue or semaphore is zero
    #[error("invalid capacity (must be at least 1)")]
    InvalidCapacity,

    /// Withdrawal or transfer exceeds the origin balance
    #[error("insufficient funds in {0}")]
    InsufficientFunds(AccountId),

    /// Safe transfer could not observe sufficient funds within the bound.
    /// Surfaced as a deadlock heuristic: a timeout is *presumed* deadlock,
    /// no wait-for cycle analysis is performed.
    #[error("transfer {origin} -> {destination} timed out (presumed deadlock)")]
    TransferTimeout {
        origin: AccountId,
        destination: AccountId,
    },

    /// Enqueue after the queue was closed
    #[error("transaction queue is closed")]
    QueueClosed,
}
