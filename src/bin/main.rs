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

use banksim::actors::{Client, DeadlockDemo, FraudEngine, SimulationStats};
use banksim::{
    AccountId, AccountLedger, BoundedTransactionQueue, ClientId, ConfigStore, CountingSemaphore,
    FraudContext,
};
use clap::Parser;
use rand::Rng;
use rust_decimal_macros::dec;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::info;

/// Concurrent banking simulation.
///
/// Spawns client producers feeding a bounded transaction queue, fraud
/// engines limited by a counting semaphore, plus a configuration
/// reader/writer pair, then runs the deadlock demonstration and prints
/// the final account snapshot.
#[derive(Parser, Debug)]
#[command(name = "banksim")]
#[command(about = "Run the concurrent banking simulation", long_about = None)]
struct Args {
    /// Number of client producer threads
    #[arg(long, default_value_t = 5)]
    producers: usize,

    /// Number of fraud engine consumer threads
    #[arg(long, default_value_t = 4)]
    consumers: usize,

    /// Transaction queue capacity
    #[arg(long, default_value_t = 10)]
    queue_capacity: usize,

    /// Concurrent fraud engine permits
    #[arg(long, default_value_t = 3)]
    permits: usize,

    /// Simulation duration in seconds
    #[arg(long, default_value_t = 10)]
    duration: u64,

    /// Producer delay between transactions in milliseconds
    #[arg(long, default_value_t = 200)]
    producer_delay_ms: u64,

    /// Consumer processing delay in milliseconds
    #[arg(long, default_value_t = 150)]
    consumer_delay_ms: u64,

    /// Skip the deadlock demonstration at the end of the run
    #[arg(long, default_value_t = false)]
    no_deadlock_demo: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banksim=info".into()),
        )
        .init();

    let args = Args::parse();
    if let Err(error) = run(args) {
        eprintln!("simulation failed: {error}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), banksim::LedgerError> {
    let queue = Arc::new(BoundedTransactionQueue::new(args.queue_capacity)?);
    let semaphore = Arc::new(CountingSemaphore::new(args.permits)?);
    let config = Arc::new(ConfigStore::new());
    let fraud = Arc::new(FraudContext::new());
    let ledger = Arc::new(AccountLedger::new());
    let stats = Arc::new(SimulationStats::default());

    // stock demo accounts
    let seed_accounts = [
        ("juan", dec!(10000.00)),
        ("maria", dec!(8000.00)),
        ("pedro", dec!(15000.00)),
        ("ana", dec!(5000.00)),
        ("luis", dec!(12000.00)),
    ];
    let accounts: Vec<AccountId> = seed_accounts
        .iter()
        .map(|(name, balance)| {
            let account = AccountId(format!("ACC-{name}"));
            ledger.create_account(account.clone(), *balance)?;
            Ok(account)
        })
        .collect::<Result<_, banksim::LedgerError>>()?;

    let initial_total = ledger.total();
    info!(total = %initial_total, "simulation starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    let ids = Arc::new(AtomicU64::new(1));

    crossbeam::scope(|scope| {
        for index in 0..args.producers {
            let client = Client::new(
                ClientId(format!("client-{index}")),
                accounts[index % accounts.len()].clone(),
                Arc::clone(&queue),
                Arc::clone(&ids),
                Duration::from_millis(args.producer_delay_ms),
            );
            let shutdown = Arc::clone(&shutdown);
            let accounts = accounts.clone();
            scope.spawn(move |_| client.run(&shutdown, &accounts));
        }

        for index in 0..args.consumers {
            let engine = FraudEngine::new(
                index,
                Arc::clone(&queue),
                Arc::clone(&semaphore),
                Arc::clone(&fraud),
                Arc::clone(&config),
                Arc::clone(&ledger),
                Arc::clone(&stats),
                Duration::from_millis(args.consumer_delay_ms),
            );
            scope.spawn(move |_| engine.run());
        }

        // configuration actors: a financial analyst reading thresholds
        // and an administrator occasionally retuning them
        {
            let config = Arc::clone(&config);
            let shutdown = Arc::clone(&shutdown);
            scope.spawn(move |_| {
                let keys = ["transaction_limit", "fraud_engines", "queue_capacity"];
                let mut index = 0;
                while !shutdown.load(Ordering::Relaxed) {
                    let key = keys[index % keys.len()];
                    if let Some(value) = config.read(key) {
                        info!(key, value, "analyst read configuration");
                    }
                    index += 1;
                    thread::sleep(Duration::from_millis(700));
                }
            });
        }
        {
            let config = Arc::clone(&config);
            let shutdown = Arc::clone(&shutdown);
            scope.spawn(move |_| {
                let mut rng = rand::thread_rng();
                while !shutdown.load(Ordering::Relaxed) {
                    let limit = rng.gen_range(5_000..=15_000).to_string();
                    config.write("transaction_limit", &limit);
                    info!(limit, "administrator updated transaction limit");
                    thread::sleep(Duration::from_millis(2_000));
                }
            });
        }

        thread::sleep(Duration::from_secs(args.duration));
        shutdown.store(true, Ordering::Relaxed);
        // closing the queue releases every blocked producer and consumer
        queue.close();
    })
    .expect("simulation thread panicked");

    info!(
        processed = stats.processed(),
        approved = stats.approved(),
        suspicious = stats.suspicious(),
        total = %ledger.total(),
        "simulation phase done"
    );

    if !args.no_deadlock_demo {
        run_deadlock_demo(&ledger, &accounts);
    }

    println!("\n========== ACCOUNT STATE ==========");
    for (account, balance) in ledger.snapshot() {
        println!("{account}: ${balance:.2}");
    }
    println!("total: ${:.2}", ledger.total());
    println!(
        "processed: {} (approved {}, suspicious {})",
        stats.processed(),
        stats.approved(),
        stats.suspicious()
    );

    Ok(())
}

fn run_deadlock_demo(ledger: &Arc<AccountLedger>, accounts: &[AccountId]) {
    let total_before = ledger.total();
    let a = accounts[0].clone();
    let b = accounts[1].clone();

    info!(%a, %b, "provoking deadlock with opposite-order cross transfers");
    let demo = DeadlockDemo::provoke(Arc::clone(ledger), a, b, dec!(75.00), dec!(110.00));

    // give both unordered calls time to take their first lock and stall
    thread::sleep(Duration::from_secs(1));
    info!(pending = demo.pending(), "transfers stalled in circular wait");

    let report = demo.resolve();
    for (index, outcome) in report.unordered_outcomes.iter().enumerate() {
        info!(index, ?outcome, "unordered call finished");
    }
    for (index, replay) in report.replays.iter().enumerate() {
        match replay {
            Ok(()) => info!(index, "safe replay completed"),
            Err(error) => info!(index, %error, "safe replay failed"),
        }
    }

    let total_after = ledger.total();
    info!(%total_before, %total_after, "conservation across deadlock recovery");
}
