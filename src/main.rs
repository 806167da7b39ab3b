use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;

use opslog::config::{Config, DemoConfig};
use opslog::{diagnostics, Lifetime, ScopeRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // Diagnostics go to stderr or files; stdout carries the records
    let diagnostics_target = diagnostics::init(&config.diagnostics)?;
    tracing::info!(
        diagnostics = ?diagnostics_target,
        sink = ?config.sink,
        "opslog demo starting"
    );

    let registry = ScopeRegistry::from_config(&config)?;

    let workers = [
        tokio::spawn(run_rounds(Arc::clone(&registry), config.demo.clone(), Worker::Cancel)),
        tokio::spawn(run_rounds(Arc::clone(&registry), config.demo.clone(), Worker::Timeout)),
        tokio::spawn(run_rounds(Arc::clone(&registry), config.demo.clone(), Worker::Deadline)),
    ];

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    for worker in &workers {
        worker.abort();
    }
    let summary = registry.flush_all();
    if summary.failed > 0 {
        tracing::warn!(failed = summary.failed, "Records lost during shutdown");
    }
    tracing::info!(flushed = summary.emitted, "Shutdown complete");
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Worker {
    Cancel,
    Timeout,
    Deadline,
}

/// Run two units of work per round, forever
async fn run_rounds(registry: Arc<ScopeRegistry>, demo: DemoConfig, worker: Worker) {
    loop {
        for n in 1..=2 {
            match worker {
                Worker::Cancel => work_with_cancel(&registry, n),
                Worker::Timeout => work_with_timeout(&registry, &demo, n).await,
                Worker::Deadline => work_with_deadline(&registry, &demo, n).await,
            }
        }
        tokio::time::sleep(Duration::from_secs(demo.round_interval_secs)).await;
    }
}

/// Scope ends through its parent being cancelled
fn work_with_cancel(registry: &Arc<ScopeRegistry>, n: u32) {
    let parent = Lifetime::new();
    let scope = registry.open(parent.child());
    scope.set_category("demo/cancel");
    scope.info(format!("Hello opslog with cancel. {}", n));
    parent.cancel();
}

/// Scope expires while the work is still running
async fn work_with_timeout(registry: &Arc<ScopeRegistry>, demo: &DemoConfig, n: u32) {
    let lifetime = Lifetime::with_timeout(Duration::from_secs(demo.scope_expiry_secs));
    let scope = registry.open(lifetime);
    scope.set_category("demo/timeout");
    scope.info(format!("Hello opslog with timeout. {}", n));
    tokio::time::sleep(Duration::from_secs(demo.work_duration_secs)).await;
}

async fn work_with_deadline(registry: &Arc<ScopeRegistry>, demo: &DemoConfig, n: u32) {
    let deadline = Instant::now() + Duration::from_secs(demo.scope_expiry_secs);
    let scope = registry.open(Lifetime::with_deadline(deadline));
    scope.set_category("demo/deadline");
    scope.info(format!("Hello opslog with deadline. {}", n));
    tokio::time::sleep(Duration::from_secs(demo.work_duration_secs)).await;
}
