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

//! Account ledger monitor.
//!
//! One mutex/condvar pair protects every balance: the safe [`transfer`]
//! path holds only that global lock, so safe transfers are totally ordered
//! and can never deadlock with each other. A transfer that cannot observe
//! sufficient origin funds within a bounded wait is abandoned with
//! [`LedgerError::TransferTimeout`] — timeout as a deadlock heuristic, not
//! cycle detection.
//!
//! The *unordered* path exists purely to demonstrate deadlock: each
//! account carries its own fine-grained lock, and the two locks are
//! acquired in an attacker-chosen order with a delay in between. Two
//! concurrent calls with opposite orders form a circular wait. The
//! demonstration is driven by an explicit deadlock mode stored inside the
//! same mutex as the balances (no second source of truth); while the mode
//! is active, stalled calls are observable via [`pending_unordered`] and
//! apply no mutation. Clearing the mode releases them, each reporting
//! [`UnorderedOutcome::Abandoned`], and the caller replays the transfers
//! through the safe path.
//!
//! [`transfer`]: AccountLedger::transfer
//! [`pending_unordered`]: AccountLedger::pending_unordered

use crate::base::AccountId;
use crate::error::LedgerError;
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Lock acquisition discipline for a transfer, selected per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockingStrategy {
    /// Single global lock, total order, bounded wait. The production path.
    Ordered,
    /// Per-account locks taken in the given order with a hold delay in
    /// between. Deadlock-prone by construction; demonstration only.
    Unordered(AcquisitionOrder),
}

/// Which fine-grained lock the unordered path takes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionOrder {
    OriginFirst,
    DestinationFirst,
}

impl AcquisitionOrder {
    /// Coin-flip order, matching how the demonstration provokes opposite
    /// interleavings.
    pub fn random() -> Self {
        if rand::thread_rng().gen_bool(0.5) {
            AcquisitionOrder::OriginFirst
        } else {
            AcquisitionOrder::DestinationFirst
        }
    }
}

/// How an unordered transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnorderedOutcome {
    /// Both locks acquired with the deadlock mode inactive; the mutation
    /// was applied (through the global lock).
    Applied,
    /// The call observed the deadlock mode active; its mutation was
    /// suppressed and must be replayed through the safe path.
    Abandoned,
}

/// Tuning knobs for the monitor.
#[derive(Debug, Clone, Copy)]
pub struct LedgerConfig {
    /// Bound on the safe path's wait for sufficient funds.
    pub transfer_timeout: Duration,
    /// How long the unordered path holds its first lock before going for
    /// the second — wide enough for opposite orders to interleave.
    pub unordered_hold: Duration,
    /// Back-off before retrying when the second fine-grained lock is
    /// contended and the deadlock mode is inactive.
    pub unordered_backoff: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: Duration::from_secs(3),
            unordered_hold: Duration::from_millis(300),
            unordered_backoff: Duration::from_millis(10),
        }
    }
}

#[derive(Debug)]
struct AccountEntry {
    balance: Decimal,
    /// Fine-grained lock used only by the unordered demonstration path.
    guard: Arc<Mutex<()>>,
}

impl AccountEntry {
    fn new(balance: Decimal) -> Self {
        Self {
            balance,
            guard: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Debug)]
struct LedgerState {
    accounts: HashMap<AccountId, AccountEntry>,
    deadlock_mode: bool,
    pending_unordered: usize,
}

/// Monitor over the account balance map.
#[derive(Debug)]
pub struct AccountLedger {
    state: Mutex<LedgerState>,
    funds: Condvar,
    mode_cleared: Condvar,
    config: LedgerConfig,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                accounts: HashMap::new(),
                deadlock_mode: false,
                pending_unordered: 0,
            }),
            funds: Condvar::new(),
            mode_cleared: Condvar::new(),
            config,
        }
    }

    /// Creates an account with an initial balance.
    ///
    /// Idempotent: returns `Ok(false)` when the account already exists,
    /// leaving its balance untouched.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] for a negative initial balance.
    pub fn create_account(
        &self,
        account: AccountId,
        initial_balance: Decimal,
    ) -> Result<bool, LedgerError> {
        if initial_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let mut state = self.state.lock();
        if state.accounts.contains_key(&account) {
            info!(%account, "account already exists");
            return Ok(false);
        }
        info!(%account, balance = %initial_balance, "account created");
        state
            .accounts
            .insert(account, AccountEntry::new(initial_balance));
        Ok(true)
    }

    /// Point-in-time balance read under the global lock.
    pub fn balance_of(&self, account: &AccountId) -> Result<Decimal, LedgerError> {
        let state = self.state.lock();
        state
            .accounts
            .get(account)
            .map(|entry| entry.balance)
            .ok_or_else(|| LedgerError::AccountNotFound(account.clone()))
    }

    /// Unconditionally credits `amount` to the account.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] or [`LedgerError::InvalidAmount`].
    pub fn deposit(&self, account: &AccountId, amount: Decimal) -> Result<(), LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let mut state = self.state.lock();
        let entry = state
            .accounts
            .get_mut(account)
            .ok_or_else(|| LedgerError::AccountNotFound(account.clone()))?;
        entry.balance += amount;
        info!(%account, %amount, balance = %entry.balance, "deposit");
        // a credit may unblock transfers waiting on this account's funds
        self.funds.notify_all();
        Ok(())
    }

    /// Debits `amount` when the balance covers it; fails without mutation
    /// otherwise.
    pub fn withdraw(&self, account: &AccountId, amount: Decimal) -> Result<(), LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let mut state = self.state.lock();
        let entry = state
            .accounts
            .get_mut(account)
            .ok_or_else(|| LedgerError::AccountNotFound(account.clone()))?;
        if entry.balance < amount {
            return Err(LedgerError::InsufficientFunds(account.clone()));
        }
        entry.balance -= amount;
        info!(%account, %amount, balance = %entry.balance, "withdrawal");
        Ok(())
    }

    /// Safe transfer: single global lock, bounded wait for funds.
    ///
    /// Fails fast when either account is unknown. Waits up to
    /// [`LedgerConfig::transfer_timeout`] for the origin balance to cover
    /// `amount`; on expiry the transfer is abandoned without mutation.
    /// On success origin and destination are mutated atomically relative
    /// to every observer of this monitor, then all waiters are woken —
    /// the credit may unblock unrelated pending transfers.
    pub fn transfer(
        &self,
        origin: &AccountId,
        destination: &AccountId,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let mut state = self.state.lock();
        if !state.accounts.contains_key(origin) {
            return Err(LedgerError::AccountNotFound(origin.clone()));
        }
        if !state.accounts.contains_key(destination) {
            return Err(LedgerError::AccountNotFound(destination.clone()));
        }

        let deadline = Instant::now() + self.config.transfer_timeout;
        let mut timed_out = false;
        loop {
            // re-borrow each iteration; the wait releases the lock
            let balance = state
                .accounts
                .get(origin)
                .map(|entry| entry.balance)
                .ok_or_else(|| LedgerError::AccountNotFound(origin.clone()))?;
            if balance >= amount {
                break;
            }
            // the predicate is re-evaluated once after a timed-out wait:
            // a credit applied between the deadline expiring and this
            // thread reacquiring the lock still completes the transfer
            if timed_out {
                warn!(%origin, %destination, %amount, "transfer timed out (presumed deadlock)");
                return Err(LedgerError::TransferTimeout {
                    origin: origin.clone(),
                    destination: destination.clone(),
                });
            }
            timed_out = self.funds.wait_until(&mut state, deadline).timed_out();
        }

        Self::apply_transfer(&mut state, origin, destination, amount)?;
        self.funds.notify_all();
        Ok(())
    }

    /// Transfer with an explicit locking strategy.
    ///
    /// `Ordered` is [`transfer`](Self::transfer); reporting `Applied` on
    /// success. `Unordered` is the deadlock demonstration path.
    pub fn transfer_with(
        &self,
        origin: &AccountId,
        destination: &AccountId,
        amount: Decimal,
        strategy: LockingStrategy,
    ) -> Result<UnorderedOutcome, LedgerError> {
        match strategy {
            LockingStrategy::Ordered => {
                self.transfer(origin, destination, amount)?;
                Ok(UnorderedOutcome::Applied)
            }
            LockingStrategy::Unordered(order) => {
                self.transfer_unordered(origin, destination, amount, order)
            }
        }
    }

    /// Unsafe demonstration path: per-account locks, attacker-chosen order.
    ///
    /// The deadlock flag is read under the global lock at call start. A
    /// call that sees the mode active holds its first lock, contends once
    /// for the second, and parks on the monitor's condvar until the mode
    /// is cleared — two opposite-order calls on the same account pair
    /// form a circular wait, both observable through
    /// [`pending_unordered`](Self::pending_unordered). Once the mode is
    /// cleared such a call returns [`UnorderedOutcome::Abandoned`] without
    /// mutating; the controller replays through the safe path. A call that
    /// never saw the mode active acquires both locks — backing off and
    /// retrying when the second is contended, so opposite orders cannot
    /// wedge each other — applies its mutation through the global lock,
    /// and returns [`UnorderedOutcome::Applied`].
    pub fn transfer_unordered(
        &self,
        origin: &AccountId,
        destination: &AccountId,
        amount: Decimal,
        order: AcquisitionOrder,
    ) -> Result<UnorderedOutcome, LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }

        let (first, second, engaged) = {
            let mut state = self.state.lock();
            let origin_guard = state
                .accounts
                .get(origin)
                .map(|entry| Arc::clone(&entry.guard))
                .ok_or_else(|| LedgerError::AccountNotFound(origin.clone()))?;
            let destination_guard = state
                .accounts
                .get(destination)
                .map(|entry| Arc::clone(&entry.guard))
                .ok_or_else(|| LedgerError::AccountNotFound(destination.clone()))?;
            let engaged = state.deadlock_mode;
            state.pending_unordered += 1;
            match order {
                AcquisitionOrder::OriginFirst => (origin_guard, destination_guard, engaged),
                AcquisitionOrder::DestinationFirst => (destination_guard, origin_guard, engaged),
            }
        };
        let pending = PendingToken { ledger: self };

        let mut first_guard = first.lock();
        info!(%origin, %destination, ?order, "unordered transfer holds first lock");
        thread::sleep(self.config.unordered_hold);

        if engaged {
            // Circular-wait phase: the second lock is typically held by
            // the opposite-order peer; whether or not it lands here, the
            // call parks until the mode is resolved and never mutates.
            let second_guard = second.try_lock();
            {
                let mut state = self.state.lock();
                while state.deadlock_mode {
                    self.mode_cleared.wait(&mut state);
                }
            }
            drop(second_guard);
            drop(first_guard);
            drop(pending);
            warn!(%origin, %destination, "unordered transfer abandoned after deadlock mode cleared");
            return Ok(UnorderedOutcome::Abandoned);
        }

        // Mode never observed: complete as a fine-grained transfer. On
        // contention for the second lock the first is released before
        // retrying, so opposite-order calls cannot wedge each other. The
        // balance mutation still goes through the global lock.
        let _second_guard = loop {
            match second.try_lock() {
                Some(guard) => break guard,
                None => {
                    drop(first_guard);
                    thread::sleep(self.config.unordered_backoff);
                    first_guard = first.lock();
                }
            }
        };
        let result = {
            let mut state = self.state.lock();
            Self::apply_transfer(&mut state, origin, destination, amount)
        };
        drop(pending);
        result?;
        self.funds.notify_all();
        Ok(UnorderedOutcome::Applied)
    }

    /// Debit origin, credit destination. Caller holds the state lock.
    fn apply_transfer(
        state: &mut LedgerState,
        origin: &AccountId,
        destination: &AccountId,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        let origin_entry = state
            .accounts
            .get_mut(origin)
            .ok_or_else(|| LedgerError::AccountNotFound(origin.clone()))?;
        if origin_entry.balance < amount {
            return Err(LedgerError::InsufficientFunds(origin.clone()));
        }
        origin_entry.balance -= amount;
        let origin_balance = origin_entry.balance;

        let destination_entry = state
            .accounts
            .get_mut(destination)
            .ok_or_else(|| LedgerError::AccountNotFound(destination.clone()))?;
        destination_entry.balance += amount;
        info!(
            %origin,
            %destination,
            %amount,
            origin_balance = %origin_balance,
            destination_balance = %destination_entry.balance,
            "transfer applied"
        );
        Ok(())
    }

    /// Arms the deadlock demonstration.
    pub fn activate_deadlock_mode(&self) {
        let mut state = self.state.lock();
        state.deadlock_mode = true;
        warn!("deadlock mode activated; unordered transfers will stall");
    }

    /// Clears the deadlock mode, waking every stalled unordered call.
    pub fn resolve_deadlock_mode(&self) {
        let mut state = self.state.lock();
        state.deadlock_mode = false;
        self.mode_cleared.notify_all();
        info!("deadlock mode resolved");
    }

    pub fn deadlock_mode_active(&self) -> bool {
        self.state.lock().deadlock_mode
    }

    /// Number of unordered transfers currently in flight (stalled calls
    /// included) — the observable "not completed" signal of the demo.
    pub fn pending_unordered(&self) -> usize {
        self.state.lock().pending_unordered
    }

    /// Immutable snapshot of every balance, sorted by account id.
    pub fn snapshot(&self) -> BTreeMap<AccountId, Decimal> {
        let state = self.state.lock();
        state
            .accounts
            .iter()
            .map(|(id, entry)| (id.clone(), entry.balance))
            .collect()
    }

    /// Sum of all balances under one lock acquisition. Conserved by
    /// transfers; moved only by deposits and withdrawals.
    pub fn total(&self) -> Decimal {
        let state = self.state.lock();
        state.accounts.values().map(|entry| entry.balance).sum()
    }
}

impl Default for AccountLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps `pending_unordered` accurate even if an unordered call unwinds.
struct PendingToken<'a> {
    ledger: &'a AccountLedger,
}

impl Drop for PendingToken<'_> {
    fn drop(&mut self) {
        self.ledger.state.lock().pending_unordered -= 1;
    }
}
