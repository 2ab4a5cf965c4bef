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

//! Velocity/frequency fraud analyzer.
//!
//! Two heuristics, both per client:
//!
//! - **Velocity rule**: a transaction arriving less than
//!   [`FraudPolicy::velocity_threshold`] after the client's previous one
//!   is suspicious.
//! - **Frequency rule**: once the count of transactions inside the sliding
//!   [`FraudPolicy::frequency_window`] (current one included) reaches
//!   [`FraudPolicy::frequency_limit`], the transaction is suspicious.
//!
//! Decision and state update happen in one critical section per client:
//! the [`DashMap`] entry API holds the shard lock for the whole call, so
//! two concurrent calls for the same client can never both read stale
//! history, while calls for distinct clients proceed concurrently.

use crate::base::ClientId;
use crate::transaction::Transaction;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::warn;

/// Tuning knobs for the fraud heuristics.
#[derive(Debug, Clone, Copy)]
pub struct FraudPolicy {
    /// Minimum gap between two transactions of the same client.
    pub velocity_threshold: Duration,
    /// Length of the sliding window for the frequency rule.
    pub frequency_window: Duration,
    /// Transaction count (window-pruned, current included) that trips the
    /// frequency rule.
    pub frequency_limit: usize,
}

impl Default for FraudPolicy {
    fn default() -> Self {
        Self {
            velocity_threshold: Duration::from_secs(20),
            frequency_window: Duration::from_secs(60),
            frequency_limit: 5,
        }
    }
}

#[derive(Debug, Default)]
struct ClientHistory {
    last_seen: Option<Instant>,
    recent: Vec<Instant>,
}

/// Per-client transaction history and the policy applied to it.
#[derive(Debug)]
pub struct FraudContext {
    policy: FraudPolicy,
    histories: DashMap<ClientId, ClientHistory>,
}

impl FraudContext {
    pub fn new() -> Self {
        Self::with_policy(FraudPolicy::default())
    }

    pub fn with_policy(policy: FraudPolicy) -> Self {
        Self {
            policy,
            histories: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &FraudPolicy {
        &self.policy
    }

    /// Analyzes a transaction and updates the client history atomically.
    ///
    /// Returns `true` when the transaction is suspicious. The caller is
    /// responsible for flagging the transaction.
    pub fn analyze_and_update(&self, transaction: &Transaction) -> bool {
        let suspicious = self.observe(transaction.client(), transaction.created_at());
        if suspicious {
            warn!(
                tx = %transaction.id(),
                client = %transaction.client(),
                amount = %transaction.amount(),
                "velocity/frequency rule tripped"
            );
        }
        suspicious
    }

    /// Core decision: records an event for `client` at `now` and reports
    /// whether it trips either rule.
    ///
    /// The current event is recorded even when flagged, so subsequent
    /// calls see it. After this call the history never contains entries
    /// older than the frequency window.
    pub fn observe(&self, client: &ClientId, now: Instant) -> bool {
        // Entry guard holds the shard lock across decision and update.
        let mut history = self.histories.entry(client.clone()).or_default();

        let mut suspicious = false;

        if let Some(last) = history.last_seen {
            if now.saturating_duration_since(last) < self.policy.velocity_threshold {
                suspicious = true;
            }
        }

        let window = self.policy.frequency_window;
        history
            .recent
            .retain(|seen| now.saturating_duration_since(*seen) <= window);
        history.recent.push(now);
        if history.recent.len() >= self.policy.frequency_limit {
            suspicious = true;
        }

        history.last_seen = Some(now);
        suspicious
    }

    /// Number of clients with recorded history.
    pub fn tracked_clients(&self) -> usize {
        self.histories.len()
    }
}

impl Default for FraudContext {
    fn default() -> Self {
        Self::new()
    }
}
