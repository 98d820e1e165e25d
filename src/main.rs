// YARN Exporter - Prometheus exporter for the Hadoop YARN ResourceManager
//
// Polls the ResourceManager's REST API on each scrape and translates the
// returned JSON documents into a normalized Prometheus metric set.
//
// # Features
// - Cluster-level metrics (applications, memory, cores, containers, nodes)
// - Per-queue scheduler metrics
// - Per-application metrics
// - Availability signaling (yarn_up, yarn_scrape_failures_total)
// - Audit log channel carrying every raw queue/application record
// - Environment-driven configuration with documented defaults
//
// # Usage
// YARN_PROMETHEUS_ENDPOINT_HOST=rm.example.com yarn-exporter
//
// Metrics are then served on http://0.0.0.0:9113/metrics until the
// process is terminated. The exporter is stateless: every scrape fetches
// the current upstream state; nothing is retained between scrapes except
// the scrape failure counter.

use std::env;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::filter::{filter_fn, FilterExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Module declarations
mod audit;
mod collectors;
mod config;
mod server;

use audit::AuditLog;
use collectors::create_all_collectors;
use config::ExporterConfig;
use server::ExporterRegistry;

/// Application entry point
///
/// This function:
/// 1. Resolves configuration from the environment (fatal if invalid)
/// 2. Initializes logging and the audit channel
/// 3. Builds the shared HTTP client with the configured fetch timeout
/// 4. Constructs the three collectors and registers them
/// 5. Serves /metrics (runs forever)
#[tokio::main]
async fn main() -> Result<()> {
    // Configuration comes first: the audit log directory feeds the logging
    // setup, and an invalid configuration must abort before any scrape.
    let config = ExporterConfig::from_env().context("Failed to resolve configuration")?;

    let _audit_guard = init_logging(&config);

    info!("=== YARN Exporter Starting ===");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let endpoints = config
        .endpoints()
        .context("Failed to build upstream endpoint URLs")?;

    // One client shared by all collectors; the timeout bounds every fetch.
    let client = reqwest::Client::builder()
        .timeout(config.fetch_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let audit = AuditLog::new();
    let collectors = create_all_collectors(&endpoints, &client, &audit);
    info!("Created {} metric collector(s)", collectors.len());

    let mut registry = ExporterRegistry::new();
    for collector in collectors {
        registry.register(collector);
    }

    info!("=== YARN Exporter Started Successfully ===");

    server::serve(config.listen_addr, registry).await
}

/// Initializes the logging subsystem
///
/// Two layers share the subscriber:
/// - The regular layer writes to stdout/stderr: JSON format when running
///   under systemd (detected via INVOCATION_ID), human-readable with
///   colors otherwise. Level defaults to INFO, overridable via RUST_LOG.
/// - The audit layer routes the dedicated `metric` target to a daily
///   rolling file in the configured audit directory, through a
///   non-blocking writer so record forwarding never stalls a scrape.
///
/// The returned guard flushes the audit writer on drop; `main` holds it
/// for the life of the process.
fn init_logging(config: &ExporterConfig) -> tracing_appender::non_blocking::WorkerGuard {
    let is_systemd = env::var("INVOCATION_ID").is_ok();

    let appender = tracing_appender::rolling::daily(&config.audit_log_dir, "audit.log");
    let (audit_writer, guard) = tracing_appender::non_blocking(appender);
    let audit_layer = fmt::layer()
        .with_writer(audit_writer)
        .with_ansi(false)
        .with_target(false)
        .with_level(false)
        .with_filter(filter_fn(|metadata| {
            metadata.target() == audit::AUDIT_TARGET
        }));

    // Audit records bypass the level filter but stay out of the regular
    // output; everything else is filtered by RUST_LOG as usual.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let not_audit = filter_fn(|metadata| metadata.target() != audit::AUDIT_TARGET);

    if is_systemd {
        tracing_subscriber::registry()
            .with(audit_layer)
            .with(fmt::layer().json().with_filter(env_filter.and(not_audit)))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(audit_layer)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_filter(env_filter.and(not_audit)),
            )
            .init();
    }

    guard
}
