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

//! Deadlock behaviour tests.
//!
//! Two kinds of tests live here. The first kind runs the *safe* transfer
//! path under heavy contention with parking_lot's deadlock detector
//! (`deadlock_detection` feature) watching the lock graph: the single
//! global monitor lock must never produce a cycle. The second kind drives
//! the deliberately unsafe unordered path end to end: provoke the
//! circular wait, observe both calls stalled, resolve, and verify the
//! safe-path replay restores the conservation invariant.

use banksim::{
    AccountId, AccountLedger, AcquisitionOrder, DeadlockDemo, LedgerConfig, UnorderedOutcome,
};
use parking_lot::deadlock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

// === Deadlock Detection Infrastructure ===

/// Starts a background thread that checks for deadlocks.
/// Returns a handle to stop the detector.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

/// Stops the deadlock detector.
fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150)); // Let detector thread exit
}

fn demo_ledger() -> Arc<AccountLedger> {
    let ledger = Arc::new(AccountLedger::with_config(LedgerConfig {
        transfer_timeout: Duration::from_millis(500),
        unordered_hold: Duration::from_millis(50),
        unordered_backoff: Duration::from_millis(5),
    }));
    ledger
        .create_account(AccountId::from("ACC-A"), dec!(1000.00))
        .unwrap();
    ledger
        .create_account(AccountId::from("ACC-B"), dec!(1000.00))
        .unwrap();
    ledger
}

// === Safe path: no cycles under contention ===

/// Many threads hammering transfers between the same accounts through the
/// global monitor lock. The detector must stay silent and the total must
/// be conserved.
#[test]
fn no_deadlock_safe_transfers_high_contention() {
    let detector = start_deadlock_detector();
    let ledger = Arc::new(AccountLedger::new());

    const NUM_ACCOUNTS: usize = 8;
    const NUM_THREADS: usize = 32;
    const OPS_PER_THREAD: usize = 100;

    for i in 0..NUM_ACCOUNTS {
        ledger
            .create_account(AccountId::from(format!("ACC-{i:03}").as_str()), dec!(10000.00))
            .unwrap();
    }
    let before = ledger.total();

    let mut handles = Vec::with_capacity(NUM_THREADS);
    for thread_id in 0..NUM_THREADS {
        let ledger = ledger.clone();
        handles.push(thread::spawn(move || {
            for i in 0..OPS_PER_THREAD {
                let origin = AccountId::from(format!("ACC-{:03}", (thread_id + i) % NUM_ACCOUNTS).as_str());
                let destination =
                    AccountId::from(format!("ACC-{:03}", (thread_id + i + 1) % NUM_ACCOUNTS).as_str());
                // small amounts, funds are always sufficient
                ledger.transfer(&origin, &destination, dec!(1.00)).unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    assert_eq!(ledger.total(), before, "transfers must conserve the total");
    for (_, balance) in ledger.snapshot() {
        assert!(balance >= Decimal::ZERO);
    }
}

/// A transfer waiting on funds must be released by a credit from another
/// thread instead of timing out.
#[test]
fn pending_transfer_released_by_incoming_credit() {
    let ledger = Arc::new(AccountLedger::with_config(LedgerConfig {
        transfer_timeout: Duration::from_secs(5),
        ..LedgerConfig::default()
    }));
    ledger
        .create_account(AccountId::from("ACC-POOR"), dec!(10.00))
        .unwrap();
    ledger
        .create_account(AccountId::from("ACC-RICH"), dec!(5000.00))
        .unwrap();

    let waiter_ledger = ledger.clone();
    let waiter = thread::spawn(move || {
        waiter_ledger.transfer(
            &AccountId::from("ACC-POOR"),
            &AccountId::from("ACC-RICH"),
            dec!(100.00),
        )
    });

    thread::sleep(Duration::from_millis(100));
    assert!(!waiter.is_finished(), "transfer should wait for funds");

    // fund the origin from the other account
    ledger
        .transfer(
            &AccountId::from("ACC-RICH"),
            &AccountId::from("ACC-POOR"),
            dec!(200.00),
        )
        .unwrap();

    waiter.join().unwrap().unwrap();
    assert_eq!(
        ledger.balance_of(&AccountId::from("ACC-POOR")).unwrap(),
        dec!(110.00)
    );
    assert_eq!(ledger.total(), dec!(5010.00));
}

// === Unordered path: the demonstration itself ===

/// Two opposite-order unordered transfers on the same account pair must
/// both stall while the deadlock mode is active, and neither may mutate
/// a balance.
#[test]
fn provoked_deadlock_stalls_both_transfers() {
    let ledger = demo_ledger();
    let before = ledger.snapshot();

    let demo = DeadlockDemo::provoke(
        ledger.clone(),
        AccountId::from("ACC-A"),
        AccountId::from("ACC-B"),
        dec!(75.00),
        dec!(110.00),
    );

    // well past the hold delay: both calls must still be in flight
    thread::sleep(Duration::from_millis(300));
    assert_eq!(demo.pending(), 2, "both unordered calls should be stalled");
    assert!(ledger.deadlock_mode_active());
    assert_eq!(ledger.snapshot(), before, "stalled calls must not mutate");

    let report = demo.resolve();
    for outcome in &report.unordered_outcomes {
        assert_eq!(*outcome, Ok(UnorderedOutcome::Abandoned));
    }
}

/// Resolving the demonstration replays both transfers through the safe
/// path exactly once: final balances reflect a single application of each
/// transfer and the total is conserved.
#[test]
fn resolved_deadlock_replays_without_double_apply() {
    let ledger = demo_ledger();
    let total_before = ledger.total();

    let demo = DeadlockDemo::provoke(
        ledger.clone(),
        AccountId::from("ACC-A"),
        AccountId::from("ACC-B"),
        dec!(75.00),
        dec!(110.00),
    );
    thread::sleep(Duration::from_millis(200));
    let report = demo.resolve();

    for outcome in report.unordered_outcomes {
        assert_eq!(outcome, Ok(UnorderedOutcome::Abandoned));
    }
    for replay in report.replays {
        replay.unwrap();
    }

    // A -> B 75.00 and B -> A 110.00, each applied once: net +35.00 to A
    assert_eq!(
        ledger.balance_of(&AccountId::from("ACC-A")).unwrap(),
        dec!(1035.00)
    );
    assert_eq!(
        ledger.balance_of(&AccountId::from("ACC-B")).unwrap(),
        dec!(965.00)
    );
    assert_eq!(ledger.total(), total_before);
    assert_eq!(ledger.pending_unordered(), 0);
    assert!(!ledger.deadlock_mode_active());
}

/// With the mode inactive, unordered transfers complete and apply even
/// when many run concurrently with mixed acquisition orders.
#[test]
fn unordered_transfers_apply_when_mode_inactive() {
    let detector = start_deadlock_detector();
    let ledger = demo_ledger();
    let before = ledger.total();

    const NUM_THREADS: usize = 6;
    let mut handles = Vec::with_capacity(NUM_THREADS);
    for i in 0..NUM_THREADS {
        let ledger = ledger.clone();
        let order = if i % 2 == 0 {
            AcquisitionOrder::OriginFirst
        } else {
            AcquisitionOrder::DestinationFirst
        };
        handles.push(thread::spawn(move || {
            ledger.transfer_unordered(
                &AccountId::from("ACC-A"),
                &AccountId::from("ACC-B"),
                dec!(5.00),
                order,
            )
        }));
    }

    for handle in handles {
        let outcome = handle.join().expect("Thread panicked").unwrap();
        assert_eq!(outcome, UnorderedOutcome::Applied);
    }

    stop_deadlock_detector(detector);

    assert_eq!(ledger.total(), before);
    assert_eq!(
        ledger.balance_of(&AccountId::from("ACC-A")).unwrap(),
        dec!(970.00)
    );
    assert_eq!(ledger.pending_unordered(), 0);
}

/// Clearing the mode wakes the stalled calls directly; resolution joins
/// both promptly instead of waiting out a polling interval.
#[test]
fn resolution_releases_stalled_calls_promptly() {
    let ledger = demo_ledger();

    let demo = DeadlockDemo::provoke(
        ledger.clone(),
        AccountId::from("ACC-A"),
        AccountId::from("ACC-B"),
        dec!(10.00),
        dec!(20.00),
    );
    thread::sleep(Duration::from_millis(200));
    assert_eq!(demo.pending(), 2);

    let start = Instant::now();
    let report = demo.resolve();
    assert!(
        start.elapsed() < Duration::from_secs(1),
        "stalled calls not released promptly"
    );
    for outcome in report.unordered_outcomes {
        assert_eq!(outcome, Ok(UnorderedOutcome::Abandoned));
    }
    assert_eq!(ledger.pending_unordered(), 0);
}

/// The safe path's bounded wait keeps a starved transfer from hanging the
/// simulation even while a deadlock is being demonstrated elsewhere.
#[test]
fn safe_path_stays_bounded_during_demonstration() {
    let ledger = demo_ledger();

    let demo = DeadlockDemo::provoke(
        ledger.clone(),
        AccountId::from("ACC-A"),
        AccountId::from("ACC-B"),
        dec!(10.00),
        dec!(20.00),
    );

    // a safe transfer with insufficient funds must time out on schedule,
    // unaffected by the stalled unordered calls
    let start = Instant::now();
    let result = ledger.transfer(
        &AccountId::from("ACC-A"),
        &AccountId::from("ACC-B"),
        dec!(999_999.00),
    );
    assert!(result.is_err());
    assert!(start.elapsed() < Duration::from_secs(3));

    let report = demo.resolve();
    for replay in report.replays {
        replay.unwrap();
    }
    assert_eq!(ledger.total(), dec!(2000.00));
}
