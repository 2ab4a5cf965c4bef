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

//! Transaction records flowing from producers through the fraud stage
//! into the ledger.
//!
//! A transaction is created by a producer, enqueued, dequeued exactly once
//! by one consumer, annotated by the fraud stage, consumed into a ledger
//! mutation, then discarded (or handed to an external persistence
//! collaborator).

use crate::base::{AccountId, ClientId, TransactionId};
use crate::error::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Kind of ledger mutation a transaction requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Transfer,
    Withdrawal,
    Deposit,
}

/// Immutable transaction record.
///
/// The only mutation permitted after construction is flagging the
/// transaction as suspicious, exactly once, via [`mark_suspicious`].
///
/// [`mark_suspicious`]: Transaction::mark_suspicious
#[derive(Debug, Clone)]
pub struct Transaction {
    id: TransactionId,
    client: ClientId,
    kind: TransactionKind,
    amount: Decimal,
    origin: AccountId,
    destination: Option<AccountId>,
    created_at: Instant,
    suspicious: bool,
}

impl Transaction {
    /// Builds a transfer between two accounts.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] for a negative amount.
    pub fn transfer(
        id: TransactionId,
        client: ClientId,
        origin: AccountId,
        destination: AccountId,
        amount: Decimal,
    ) -> Result<Self, LedgerError> {
        Self::build(
            id,
            client,
            TransactionKind::Transfer,
            origin,
            Some(destination),
            amount,
        )
    }

    /// Builds a deposit into a single account.
    pub fn deposit(
        id: TransactionId,
        client: ClientId,
        account: AccountId,
        amount: Decimal,
    ) -> Result<Self, LedgerError> {
        Self::build(id, client, TransactionKind::Deposit, account, None, amount)
    }

    /// Builds a withdrawal from a single account.
    pub fn withdrawal(
        id: TransactionId,
        client: ClientId,
        account: AccountId,
        amount: Decimal,
    ) -> Result<Self, LedgerError> {
        Self::build(
            id,
            client,
            TransactionKind::Withdrawal,
            account,
            None,
            amount,
        )
    }

    fn build(
        id: TransactionId,
        client: ClientId,
        kind: TransactionKind,
        origin: AccountId,
        destination: Option<AccountId>,
        amount: Decimal,
    ) -> Result<Self, LedgerError> {
        if amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        Ok(Self {
            id,
            client,
            kind,
            amount,
            origin,
            destination,
            created_at: Instant::now(),
            suspicious: false,
        })
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn client(&self) -> &ClientId {
        &self.client
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn origin(&self) -> &AccountId {
        &self.origin
    }

    /// Destination account; `None` for deposits and withdrawals.
    pub fn destination(&self) -> Option<&AccountId> {
        self.destination.as_ref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_suspicious(&self) -> bool {
        self.suspicious
    }

    /// Flags the transaction as suspicious. Set once by the fraud stage;
    /// the flag never goes back to `false`.
    pub fn mark_suspicious(&mut self) {
        self.suspicious = true;
    }
}
