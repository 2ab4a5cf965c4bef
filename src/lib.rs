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

//! # Banksim
//!
//! A small concurrent banking backend built around classical
//! synchronization patterns: a bounded producer/consumer transaction
//! queue, a counting semaphore for admission control, a readers-writer
//! configuration store, a velocity/frequency fraud analyzer, and an
//! account ledger monitor with both a safe transfer protocol and a
//! deliberately unsafe cross-locking path used to demonstrate deadlock
//! and timeout-based recovery.
//!
//! ## Core components
//!
//! - [`BoundedTransactionQueue`]: fixed-capacity blocking FIFO between
//!   client producers and fraud-engine consumers
//! - [`CountingSemaphore`]: caps how many fraud engines run concurrently
//! - [`ConfigStore`]: readers-writer protected key/value configuration
//! - [`FraudContext`]: per-client velocity/frequency analysis
//! - [`AccountLedger`]: monitor over the balance map; safe transfers
//!   with bounded waits, plus the unordered deadlock demonstration
//!
//! ## Example
//!
//! ```
//! use banksim::{AccountId, AccountLedger};
//! use rust_decimal_macros::dec;
//!
//! let ledger = AccountLedger::new();
//! ledger.create_account(AccountId::from("ACC-001"), dec!(5000.00)).unwrap();
//! ledger.create_account(AccountId::from("ACC-002"), dec!(3000.00)).unwrap();
//!
//! ledger.transfer(
//!     &AccountId::from("ACC-001"),
//!     &AccountId::from("ACC-002"),
//!     dec!(250.00),
//! ).unwrap();
//!
//! assert_eq!(ledger.balance_of(&AccountId::from("ACC-002")).unwrap(), dec!(3250.00));
//! // transfers conserve the total
//! assert_eq!(ledger.total(), dec!(8000.00));
//! ```
//!
//! ## Thread safety
//!
//! Every component owns its state behind its own lock; cross-component
//! effects happen only through method calls. The core performs no I/O —
//! persistence and presentation are external collaborators consuming the
//! snapshots and results these operations return.

pub mod actors;
mod base;
mod config;
pub mod error;
mod fraud;
mod ledger;
mod queue;
mod semaphore;
mod transaction;

pub use actors::{Client, DeadlockDemo, DemoReport, FraudEngine, SimulationStats};
pub use base::{AccountId, ClientId, TransactionId};
pub use config::ConfigStore;
pub use error::LedgerError;
pub use fraud::{FraudContext, FraudPolicy};
pub use ledger::{
    AccountLedger, AcquisitionOrder, LedgerConfig, LockingStrategy, UnorderedOutcome,
};
pub use queue::BoundedTransactionQueue;
pub use semaphore::{CountingSemaphore, SemaphorePermit};
pub use transaction::{Transaction, TransactionKind};
