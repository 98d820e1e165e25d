// Server module - the registry and the /metrics scrape endpoint
//
// The registry owns the collector set. On each external scrape request it
// drives every collector's collect operation, drains the emitted sample
// families in registration order and encodes them in the Prometheus text
// exposition format.
//
// # Architecture
// - Collectors are independent data sources and are awaited concurrently;
//   registration order only fixes the order of the encoded output
// - A collector emitting zero samples is a normal outcome, not an error
// - The registry holds no per-scrape state; every scrape starts fresh

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::future::join_all;
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};
use tracing::{error, info};

use crate::collectors::MetricCollector;

/// Aggregates the collectors behind the scrape endpoint
#[derive(Default)]
pub struct ExporterRegistry {
    collectors: Vec<Box<dyn MetricCollector>>,
}

impl ExporterRegistry {
    pub fn new() -> Self {
        ExporterRegistry {
            collectors: Vec::new(),
        }
    }

    pub fn register(&mut self, collector: Box<dyn MetricCollector>) {
        info!(
            "Registered collector '{}' declaring {} metric(s)",
            collector.name(),
            collector.describe().len()
        );
        self.collectors.push(collector);
    }

    /// Every descriptor any registered collector can ever emit
    ///
    /// Independent of current upstream data; the declared set is stable
    /// across scrapes even when a scrape yields zero samples.
    pub fn describe_all(&self) -> Vec<&Desc> {
        self.collectors
            .iter()
            .flat_map(|collector| collector.describe())
            .collect()
    }

    /// Runs one scrape across all collectors
    ///
    /// Collectors share no mutable state and are awaited concurrently;
    /// results are concatenated in registration order.
    pub async fn gather(&self) -> Vec<MetricFamily> {
        let collections = join_all(
            self.collectors
                .iter()
                .map(|collector| collector.collect()),
        )
        .await;

        collections.into_iter().flatten().collect()
    }
}

/// Builds the scrape router around a registry
pub(crate) fn app(registry: Arc<ExporterRegistry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry)
}

/// Handles one external scrape request
async fn metrics_handler(State(registry): State<Arc<ExporterRegistry>>) -> Response {
    let families = registry.gather().await;

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        error!("Failed to encode metrics: {e}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], buffer).into_response()
}

/// Serves the /metrics endpoint until the process is terminated
pub async fn serve(addr: SocketAddr, registry: ExporterRegistry) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Serving metrics on http://{addr}/metrics");

    axum::serve(listener, app(Arc::new(registry)))
        .await
        .context("metrics server terminated")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::*;
    use crate::collectors::{new_desc, SampleBuffer};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Collector stub emitting a fixed value, or nothing at all
    struct StaticCollector {
        desc: Desc,
        value: Option<f64>,
    }

    impl StaticCollector {
        fn new(name: &str, value: Option<f64>) -> Self {
            StaticCollector {
                desc: new_desc(name, "test metric", &[], HashMap::new()),
                value,
            }
        }
    }

    #[async_trait]
    impl MetricCollector for StaticCollector {
        fn name(&self) -> &str {
            "Static"
        }

        fn describe(&self) -> Vec<&Desc> {
            vec![&self.desc]
        }

        async fn collect(&self) -> Vec<prometheus::proto::MetricFamily> {
            let mut buffer = SampleBuffer::new();
            if let Some(value) = self.value {
                buffer.gauge(&self.desc, value, &[]);
            }
            buffer.into_families()
        }
    }

    #[tokio::test]
    async fn test_gather_tolerates_empty_collectors() {
        let mut registry = ExporterRegistry::new();
        registry.register(Box::new(StaticCollector::new("silent", None)));
        registry.register(Box::new(StaticCollector::new("loud", Some(7.0))));

        let families = registry.gather().await;

        assert_eq!(sample_count(&families), 1);
        assert_eq!(sole_value(&families, "yarn_loud"), 7.0);
    }

    #[tokio::test]
    async fn test_describe_all_declares_every_collector() {
        let mut registry = ExporterRegistry::new();
        registry.register(Box::new(StaticCollector::new("silent", None)));
        registry.register(Box::new(StaticCollector::new("loud", Some(7.0))));

        let names: Vec<&str> = registry
            .describe_all()
            .iter()
            .map(|desc| desc.fq_name.as_str())
            .collect();

        // Declaration is independent of whether a scrape yields samples.
        assert_eq!(names, vec!["yarn_silent", "yarn_loud"]);
    }

    #[tokio::test]
    async fn test_gather_preserves_registration_order() {
        let mut registry = ExporterRegistry::new();
        registry.register(Box::new(StaticCollector::new("first", Some(1.0))));
        registry.register(Box::new(StaticCollector::new("second", Some(2.0))));

        let families = registry.gather().await;

        assert_eq!(families[0].get_name(), "yarn_first");
        assert_eq!(families[1].get_name(), "yarn_second");
    }

    #[tokio::test]
    async fn test_scrape_endpoint_end_to_end() {
        let mut registry = ExporterRegistry::new();
        registry.register(Box::new(StaticCollector::new("loud", Some(7.0))));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app(Arc::new(registry))).await.unwrap();
        });

        let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));

        let body = response.text().await.unwrap();
        assert!(body.contains("# HELP yarn_loud test metric"));
        assert!(body.contains("# TYPE yarn_loud gauge"));
        assert!(body.contains("yarn_loud 7"));
    }

    #[tokio::test]
    async fn test_scrape_endpoint_with_no_samples_is_ok() {
        let mut registry = ExporterRegistry::new();
        registry.register(Box::new(StaticCollector::new("silent", None)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app(Arc::new(registry))).await.unwrap();
        });

        let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response.text().await.unwrap().is_empty());
    }
}
