//! Work Coordinator scenario harness CLI.
//!
//! Runs the S1-S6 scenarios from WC-SPEC §8 against an in-memory Store and
//! prints a pass/fail line per scenario.
//!
//! Usage:
//!   wc-harness

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wc_harness::run_all;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("==============================================");
    println!("  Work Coordinator scenario harness");
    println!("==============================================");
    println!();

    let outcomes = run_all().await;
    let mut any_failed = false;

    for outcome in &outcomes {
        let status = if outcome.passed { "[PASS]" } else { "[FAIL]" };
        println!("  {} {}: {}", status, outcome.name, outcome.detail);
        any_failed = any_failed || !outcome.passed;
    }
    println!();

    let passed = outcomes.iter().filter(|o| o.passed).count();
    println!("{}/{} scenarios passed", passed, outcomes.len());

    if any_failed {
        std::process::exit(1);
    }
}
