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

//! Producer/consumer actors and the deadlock demonstration controller.
//!
//! [`Client`] producers generate random transactions into the bounded
//! queue. [`FraudEngine`] consumers, admission-limited by the counting
//! semaphore, dequeue, run the fraud stage, and apply ledger mutations.
//! [`DeadlockDemo`] drives the two-phase DemonstrateDeadlock -> Resolve
//! protocol against the ledger's unordered path.

use crate::base::{AccountId, ClientId, TransactionId};
use crate::config::ConfigStore;
use crate::error::LedgerError;
use crate::fraud::FraudContext;
use crate::ledger::{AccountLedger, AcquisitionOrder, UnorderedOutcome};
use crate::queue::BoundedTransactionQueue;
use crate::semaphore::CountingSemaphore;
use crate::transaction::{Transaction, TransactionKind};
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Live counters shared between actors and the presentation layer.
#[derive(Debug, Default)]
pub struct SimulationStats {
    processed: AtomicU64,
    approved: AtomicU64,
    suspicious: AtomicU64,
}

impl SimulationStats {
    pub fn record_approved(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.approved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suspicious(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.suspicious.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn approved(&self) -> u64 {
        self.approved.load(Ordering::Relaxed)
    }

    pub fn suspicious(&self) -> u64 {
        self.suspicious.load(Ordering::Relaxed)
    }
}

/// Transaction producer acting as one bank client.
pub struct Client {
    id: ClientId,
    account: AccountId,
    queue: Arc<BoundedTransactionQueue>,
    ids: Arc<AtomicU64>,
    delay: Duration,
}

impl Client {
    pub fn new(
        id: ClientId,
        account: AccountId,
        queue: Arc<BoundedTransactionQueue>,
        ids: Arc<AtomicU64>,
        delay: Duration,
    ) -> Self {
        Self {
            id,
            account,
            queue,
            ids,
            delay,
        }
    }

    /// Produces random transactions until `shutdown` is set or the queue
    /// closes. Blocks on a full queue like any producer.
    pub fn run(&self, shutdown: &AtomicBool, accounts: &[AccountId]) {
        let mut rng = rand::thread_rng();
        while !shutdown.load(Ordering::Relaxed) {
            let transaction = match self.random_transaction(&mut rng, accounts) {
                Ok(transaction) => transaction,
                Err(error) => {
                    // only reachable via a negative amount, which the
                    // generator below cannot produce
                    warn!(client = %self.id, %error, "skipping malformed transaction");
                    continue;
                }
            };

            debug!(client = %self.id, tx = %transaction.id(), "producing");
            if self.queue.enqueue(transaction).is_err() {
                info!(client = %self.id, "queue closed, client stopping");
                break;
            }
            thread::sleep(self.delay);
        }
        info!(client = %self.id, "client finished");
    }

    fn random_transaction(
        &self,
        rng: &mut impl Rng,
        accounts: &[AccountId],
    ) -> Result<Transaction, LedgerError> {
        let id = TransactionId(self.ids.fetch_add(1, Ordering::Relaxed));
        // amounts 100.00 to 10000.00 in cents
        let amount = Decimal::new(rng.gen_range(10_000..=1_000_000), 2);

        match rng.gen_range(0..3u8) {
            0 => {
                let destination = accounts[rng.gen_range(0..accounts.len())].clone();
                Transaction::transfer(
                    id,
                    self.id.clone(),
                    self.account.clone(),
                    destination,
                    amount,
                )
            }
            1 => Transaction::withdrawal(id, self.id.clone(), self.account.clone(), amount),
            _ => Transaction::deposit(id, self.id.clone(), self.account.clone(), amount),
        }
    }
}

/// Transaction consumer: one anti-fraud engine.
pub struct FraudEngine {
    id: usize,
    queue: Arc<BoundedTransactionQueue>,
    semaphore: Arc<CountingSemaphore>,
    fraud: Arc<FraudContext>,
    config: Arc<ConfigStore>,
    ledger: Arc<AccountLedger>,
    stats: Arc<SimulationStats>,
    delay: Duration,
}

impl FraudEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        queue: Arc<BoundedTransactionQueue>,
        semaphore: Arc<CountingSemaphore>,
        fraud: Arc<FraudContext>,
        config: Arc<ConfigStore>,
        ledger: Arc<AccountLedger>,
        stats: Arc<SimulationStats>,
        delay: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            semaphore,
            fraud,
            config,
            ledger,
            stats,
            delay,
        }
    }

    /// Consumes transactions until the queue is closed and drained.
    ///
    /// Each iteration holds one semaphore permit for the duration of the
    /// analysis and ledger mutation.
    pub fn run(&self) {
        loop {
            let _permit = self.semaphore.acquire();
            let Some(mut transaction) = self.queue.dequeue() else {
                break;
            };

            if self.is_suspicious(&transaction) {
                transaction.mark_suspicious();
                self.stats.record_suspicious();
                warn!(
                    engine = self.id,
                    tx = %transaction.id(),
                    amount = %transaction.amount(),
                    "suspicious transaction flagged"
                );
            } else {
                self.stats.record_approved();
                debug!(engine = self.id, tx = %transaction.id(), "approved");
            }

            self.apply(&transaction);
            thread::sleep(self.delay);
        }
        info!(engine = self.id, "fraud engine finished");
    }

    /// Velocity/frequency context plus the original amount rules: above
    /// the configured limit is suspicious, as is a withdrawal above half
    /// of it.
    fn is_suspicious(&self, transaction: &Transaction) -> bool {
        if self.fraud.analyze_and_update(transaction) {
            return true;
        }

        let limit: Decimal = self
            .config
            .read_parsed("transaction_limit")
            .unwrap_or(Decimal::MAX);
        if transaction.amount() > limit {
            return true;
        }
        transaction.kind() == TransactionKind::Withdrawal
            && transaction.amount() > limit / Decimal::TWO
    }

    fn apply(&self, transaction: &Transaction) {
        let result = match transaction.kind() {
            TransactionKind::Deposit => self
                .ledger
                .deposit(transaction.origin(), transaction.amount()),
            TransactionKind::Withdrawal => self
                .ledger
                .withdraw(transaction.origin(), transaction.amount()),
            TransactionKind::Transfer => match transaction.destination() {
                Some(destination) => {
                    self.ledger
                        .transfer(transaction.origin(), destination, transaction.amount())
                }
                None => Err(LedgerError::AccountNotFound(transaction.origin().clone())),
            },
        };

        // recoverable errors are logged and the engine moves on
        if let Err(error) = result {
            warn!(
                engine = self.id,
                tx = %transaction.id(),
                %error,
                "ledger rejected transaction"
            );
        }
    }
}

/// One cross transfer of the deadlock demonstration.
#[derive(Debug, Clone)]
struct DemoTransfer {
    origin: AccountId,
    destination: AccountId,
    amount: Decimal,
}

/// Outcome of a resolved demonstration, one entry per replayed transfer.
#[derive(Debug)]
pub struct DemoReport {
    pub unordered_outcomes: Vec<Result<UnorderedOutcome, LedgerError>>,
    pub replays: Vec<Result<(), LedgerError>>,
}

/// Two-phase deadlock demonstration: `provoke` arms the ledger's deadlock
/// mode and launches two opposite-order unordered transfers; `resolve`
/// clears the mode, joins both stalled calls, and replays the transfers
/// through the safe path so the conservation invariant is restored.
pub struct DeadlockDemo {
    ledger: Arc<AccountLedger>,
    transfers: Vec<DemoTransfer>,
    handles: Vec<JoinHandle<Result<UnorderedOutcome, LedgerError>>>,
}

impl DeadlockDemo {
    /// Starts the demonstration with cross transfers between `a` and `b`.
    pub fn provoke(
        ledger: Arc<AccountLedger>,
        a: AccountId,
        b: AccountId,
        amount_ab: Decimal,
        amount_ba: Decimal,
    ) -> Self {
        ledger.activate_deadlock_mode();

        let transfers = vec![
            DemoTransfer {
                origin: a.clone(),
                destination: b.clone(),
                amount: amount_ab,
            },
            DemoTransfer {
                origin: b,
                destination: a,
                amount: amount_ba,
            },
        ];

        // Opposite acquisition orders on the same pair of accounts: each
        // thread grabs its first lock, then stalls wanting the other's
        // until the mode is resolved.
        let orders = [
            AcquisitionOrder::OriginFirst,
            AcquisitionOrder::OriginFirst,
        ];
        let handles = transfers
            .iter()
            .zip(orders)
            .map(|(transfer, order)| {
                let ledger = Arc::clone(&ledger);
                let transfer = transfer.clone();
                thread::spawn(move || {
                    ledger.transfer_unordered(
                        &transfer.origin,
                        &transfer.destination,
                        transfer.amount,
                        order,
                    )
                })
            })
            .collect();

        Self {
            ledger,
            transfers,
            handles,
        }
    }

    /// Calls still stalled inside the unordered path.
    pub fn pending(&self) -> usize {
        self.ledger.pending_unordered()
    }

    /// Phase two: clear the mode, join the stalled calls, replay safely.
    pub fn resolve(self) -> DemoReport {
        self.ledger.resolve_deadlock_mode();

        let unordered_outcomes = self
            .handles
            .into_iter()
            .map(|handle| handle.join().expect("unordered transfer thread panicked"))
            .collect();

        let replays = self
            .transfers
            .iter()
            .map(|transfer| {
                info!(
                    origin = %transfer.origin,
                    destination = %transfer.destination,
                    amount = %transfer.amount,
                    "replaying transfer through the safe path"
                );
                self.ledger
                    .transfer(&transfer.origin, &transfer.destination, transfer.amount)
            })
            .collect();

        DemoReport {
            unordered_outcomes,
            replays,
        }
    }
}
