//! Exponential backoff demo
//!
//! Retries a simulated flaky operation and prints how the run ended.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use exponential_backoff::{Attempt, BackoffConfig, BackoffPolicy, BackoffState, Report};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        eprintln!("Usage: {} [config.toml|config.yaml|config.json]", args[0]);
        eprintln!("\nRetries a simulated operation with exponential backoff.");
        eprintln!("\nEnvironment variables:");
        eprintln!("  BACKOFF_SUCCEED_ON=<n>  Attempt on which the operation succeeds (default: never)");
        std::process::exit(1);
    }

    let config = match args.get(1) {
        Some(path) => BackoffConfig::from_file(path),
        None => BackoffConfig::builder()
            .initial_interval_millis(2)
            .max_elapsed_time_millis(10_000)
            .multiplier(2.0)
            .randomization_factor(0.0)
            .build(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let succeed_on = std::env::var("BACKOFF_SUCCEED_ON")
        .ok()
        .and_then(|v| v.parse::<u32>().ok());

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let policy = BackoffPolicy::new(config);

    tracing::info!(policy = %policy.id(), config = ?policy.config(), "starting backoff");

    let state = policy
        .retry(move |attempt: Attempt, report: Report| {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                // Stand-in for real work
                let number: u64 = (1..=10_000u64).sum();
                println!(
                    "attempt {}: lastIntervalMillis={} elapsedTimeMillis={} result={}",
                    attempt.number,
                    attempt.last_interval_millis,
                    attempt.elapsed_time_millis,
                    number
                );
                report.report(succeed_on.is_some_and(|n| attempt.number >= n));
            });
        })
        .await;

    println!("\n{}", "=".repeat(60));
    println!("Backoff finished: {}", state);
    println!("{}", "=".repeat(60));
    println!("Attempts: {}", calls.load(Ordering::SeqCst));
    println!("Elapsed: {}ms", policy.elapsed_time_millis());

    if state != BackoffState::Succeeded {
        std::process::exit(1);
    }
}
