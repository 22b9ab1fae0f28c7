//! Error capture demonstration
//!
//! This example wires an `ErrorTracer` to an in-process event target, installs the
//! panic hook, and raises a few errors. Captured records are printed by the callback
//! and, when `ERRORTRACE_API_URL` is set, posted to that endpoint.
//!
//! # Running the example
//!
//! ```bash
//! cargo run --example capture_demo
//! ERRORTRACE_API_URL=http://localhost:8080/errors cargo run --example capture_demo
//! ```

use errortrace::prelude::*;
use errortrace::ErrorRecord;
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("{}", "=".repeat(80));
    println!("Error Capture Demonstration");
    println!("{}", "=".repeat(80));

    let target = Arc::new(LocalEventTarget::new());
    let environment = StaticEnvironment::from_process()
        .with_location("app://capture-demo")
        .with_local_item("theme", "dark");
    let tracer = ErrorTracer::new(target.clone(), Arc::new(environment));

    let config = TracerConfig::from_env()?
        .with_ignore("ResizeObserver loop limit exceeded")
        .with_local_sources(std::env::current_dir()?)
        .with_callback(|record: &ErrorRecord| {
            println!("captured: {}", record.printable_summary());
            if let Some(source) = &record.source {
                for line in source {
                    println!("    {:>4} | {}", line.line_number, line.content);
                }
            }
        })
        .with_diagnostics(|err| eprintln!("tracer diagnostic: {}", err));
    tracer.init(config);

    install_panic_hook(target.clone());

    target.dispatch(HostEvent::error("ResizeObserver loop limit exceeded")).await;
    target
        .dispatch(HostEvent::error("config file missing").with_location(file!(), line!(), column!()))
        .await;
    target
        .dispatch(HostEvent::unhandled_rejection(RejectionReason::new("connection reset")))
        .await;

    let worker = tokio::spawn(async {
        let values: Vec<u32> = Vec::new();
        values[3]
    });
    let _ = worker.await;

    // Give the panic dispatch a moment to run
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    tracer.flush().await;

    println!();
    println!("History ({} records):", tracer.history().len());
    for summary in tracer.history().last_n_summaries(10) {
        println!("  {}", summary);
    }

    Ok(())
}
