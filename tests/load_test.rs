//! Load testing for the exchange.

use std::time::{Duration, Instant};

use phrase_exchange::config::ExchangeConfig;
use sdk_rust::{ClaimOutcome, ExchangeClient, RegisterOutcome};

mod common;

#[tokio::test]
async fn test_load_performance() {
    let mut config = ExchangeConfig::default();
    // Every request comes from 127.0.0.1.
    config.rate_limit.requests_per_window = 10_000;
    let exchange = common::spawn_exchange(config).await;

    let concurrency = 20;
    let pairs_per_task = 25;
    let start = Instant::now();

    let mut tasks = Vec::new();
    for task_id in 0..concurrency {
        let url = exchange.url();
        tasks.push(tokio::spawn(async move {
            let client = ExchangeClient::new(&url);
            let mut exchanged = 0;
            for i in 0..pairs_per_task {
                // Unique per (task, i): number from the task, words from the index.
                let phrase = format!("{}-load{}-pair", task_id + 1, letters(i));
                let maddr = format!("/ip4/10.{task_id}.0.{i}");
                match client.register(&phrase, &maddr).await.unwrap() {
                    RegisterOutcome::Registered(_) => {}
                    other => panic!("register {phrase}: {other:?}"),
                }
                match client.claim(&phrase).await.unwrap() {
                    ClaimOutcome::Claimed(item) if item.maddr == maddr => exchanged += 1,
                    other => panic!("claim {phrase}: {other:?}"),
                }
            }
            exchanged
        }));
    }

    let mut total = 0;
    for task in tasks {
        total += task.await.unwrap();
    }
    let elapsed = start.elapsed();

    println!(
        "Exchanged {total} pairs in {elapsed:?} ({:.0} req/s)",
        (total * 2) as f64 / elapsed.as_secs_f64()
    );
    assert_eq!(total, concurrency * pairs_per_task);
    assert!(elapsed < Duration::from_secs(30));

    exchange.shutdown.trigger();
}

/// Lowercase suffix keeping the word inside the 3..=8 letter grammar.
fn letters(mut n: usize) -> String {
    let mut out = String::new();
    loop {
        out.push((b'a' + (n % 26) as u8) as char);
        n /= 26;
        if n == 0 {
            break;
        }
    }
    out
}
