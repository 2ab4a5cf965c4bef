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

//! Concurrent producer/consumer tests for the bounded transaction queue
//! and the admission-control semaphore.

use banksim::{
    AccountId, BoundedTransactionQueue, ClientId, CountingSemaphore, LedgerError, Transaction,
    TransactionId,
};
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn make_tx(id: u64, client: &str) -> Transaction {
    Transaction::deposit(
        TransactionId(id),
        ClientId::from(client),
        AccountId::from("ACC-001"),
        dec!(10.00),
    )
    .expect("non-negative amount")
}

#[test]
fn producer_blocks_until_consumer_drains() {
    let queue = Arc::new(BoundedTransactionQueue::new(1).unwrap());
    queue.enqueue(make_tx(1, "a")).unwrap();
    assert!(queue.is_full());

    let producer_queue = Arc::clone(&queue);
    let producer = thread::spawn(move || producer_queue.enqueue(make_tx(2, "a")));

    thread::sleep(Duration::from_millis(50));
    assert!(!producer.is_finished(), "producer should block on full queue");

    assert_eq!(queue.dequeue().unwrap().id(), TransactionId(1));
    producer.join().unwrap().unwrap();
    assert_eq!(queue.dequeue().unwrap().id(), TransactionId(2));
}

#[test]
fn consumer_blocks_until_item_arrives() {
    let queue = Arc::new(BoundedTransactionQueue::new(4).unwrap());

    let consumer_queue = Arc::clone(&queue);
    let consumer = thread::spawn(move || consumer_queue.dequeue());

    thread::sleep(Duration::from_millis(50));
    assert!(!consumer.is_finished(), "consumer should block on empty queue");

    queue.enqueue(make_tx(7, "b")).unwrap();
    let received = consumer.join().unwrap().unwrap();
    assert_eq!(received.id(), TransactionId(7));
}

#[test]
fn close_releases_blocked_consumers() {
    let queue = Arc::new(BoundedTransactionQueue::new(2).unwrap());

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue())
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    queue.close();

    for handle in handles {
        assert!(handle.join().unwrap().is_none());
    }
}

#[test]
fn close_releases_blocked_producers_with_error() {
    let queue = Arc::new(BoundedTransactionQueue::new(1).unwrap());
    queue.enqueue(make_tx(1, "a")).unwrap();

    let producer_queue = Arc::clone(&queue);
    let producer = thread::spawn(move || producer_queue.enqueue(make_tx(2, "a")));

    thread::sleep(Duration::from_millis(50));
    queue.close();

    assert_eq!(producer.join().unwrap().unwrap_err(), LedgerError::QueueClosed);
}

#[test]
fn size_never_exceeds_capacity_under_contention() {
    const CAPACITY: usize = 5;
    const PRODUCERS: usize = 8;
    const ITEMS_PER_PRODUCER: u64 = 50;

    let queue = Arc::new(BoundedTransactionQueue::new(CAPACITY).unwrap());
    let ids = Arc::new(AtomicU64::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for producer in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        let ids = Arc::clone(&ids);
        handles.push(thread::spawn(move || {
            for _ in 0..ITEMS_PER_PRODUCER {
                let id = ids.fetch_add(1, Ordering::SeqCst);
                queue
                    .enqueue(make_tx(id, &format!("client-{producer}")))
                    .unwrap();
            }
        }));
    }

    // observer sampling the size while consumers drain
    {
        let queue = Arc::clone(&queue);
        let peak = Arc::clone(&peak);
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                peak.fetch_max(queue.len(), Ordering::SeqCst);
                thread::yield_now();
            }
        }));
    }

    let consumer_queue = Arc::clone(&queue);
    let consumer = thread::spawn(move || {
        let mut seen = Vec::new();
        while let Some(tx) = consumer_queue.dequeue() {
            seen.push(tx.id().0);
        }
        seen
    });

    for handle in handles {
        handle.join().unwrap();
    }
    queue.close();
    let seen = consumer.join().unwrap();

    assert_eq!(seen.len(), PRODUCERS * ITEMS_PER_PRODUCER as usize);
    let unique: HashSet<_> = seen.iter().copied().collect();
    assert_eq!(unique.len(), seen.len(), "every item dequeued exactly once");
    assert!(
        peak.load(Ordering::SeqCst) <= CAPACITY,
        "observed size exceeded capacity"
    );
}

#[test]
fn fifo_order_preserved_per_arrival() {
    // single producer and single consumer: arrival order is fully
    // determined, so the dequeue sequence must match it exactly
    let queue = Arc::new(BoundedTransactionQueue::new(3).unwrap());

    let consumer_queue = Arc::clone(&queue);
    let consumer = thread::spawn(move || {
        let mut seen = Vec::new();
        while let Some(tx) = consumer_queue.dequeue() {
            seen.push(tx.id().0);
        }
        seen
    });

    for id in 0..100u64 {
        queue.enqueue(make_tx(id, "only")).unwrap();
    }
    queue.close();

    let seen = consumer.join().unwrap();
    let expected: Vec<u64> = (0..100).collect();
    assert_eq!(seen, expected);
}

#[test]
fn semaphore_gates_consumers() {
    const PERMITS: usize = 2;
    const CONSUMERS: usize = 6;

    let queue = Arc::new(BoundedTransactionQueue::new(10).unwrap());
    let semaphore = Arc::new(CountingSemaphore::new(PERMITS).unwrap());
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let producer_queue = Arc::clone(&queue);
    let producer = thread::spawn(move || {
        for id in 0..120u64 {
            producer_queue.enqueue(make_tx(id, "feeder")).unwrap();
        }
        producer_queue.close();
    });

    let handles: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let semaphore = Arc::clone(&semaphore);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            thread::spawn(move || loop {
                let _permit = semaphore.acquire();
                let Some(_tx) = queue.dequeue() else { break };
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_micros(300));
                active.fetch_sub(1, Ordering::SeqCst);
            })
        })
        .collect();

    producer.join().unwrap();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(
        peak.load(Ordering::SeqCst) <= PERMITS,
        "more consumers processed concurrently than the semaphore permits"
    );
}
