// Collectors module - the fetch/decode/map/emit pipeline
//
// This module provides the capability every collector implements, the
// descriptor factory that fixes metric identity at construction time, and
// the sample buffer collectors emit into during a scrape.
//
// # Design Philosophy
// - **Identity up front**: descriptors (name, help, label names) are built
//   once when a collector is constructed and never change afterwards, so
//   the exposition can declare metadata even for a scrape with no samples
// - **Failure stays local**: `collect` never returns an error; each
//   collector decides how a failed fetch is surfaced (see the individual
//   collector modules)
// - **Label lockstep**: label names and label values for a record type are
//   both fixed-size arrays derived from one field list, so a count or
//   order mismatch cannot be written in the first place

use std::collections::HashMap;

use async_trait::async_trait;
use prometheus::core::Desc;
use prometheus::proto::{Counter, Gauge, LabelPair, Metric, MetricFamily, MetricType};
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

pub mod apps;
pub mod cluster;
pub mod scheduler;

use crate::audit::AuditLog;
use crate::config::Endpoints;

/// Namespace every exported metric lives under
const METRICS_NAMESPACE: &str = "yarn";

/// One logical "fetch failed" outcome per collector
///
/// Transport failures, non-200 statuses and undecodable bodies are distinct
/// variants for diagnostics but are handled identically by every collector.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status: {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Whether a sample is exposed as a gauge or a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Gauge,
    Counter,
}

/// Capability every metric collector implements
///
/// The registry invokes both operations on each external scrape request:
/// `describe` to declare metric metadata, `collect` to obtain the current
/// sample set. The two must agree - a collector may only ever emit samples
/// under descriptors it describes.
#[async_trait]
pub trait MetricCollector: Send + Sync {
    /// Human-readable collector name, used for logging
    fn name(&self) -> &str;

    /// Every descriptor this collector can ever emit, independent of
    /// current upstream data. Idempotent between scrapes.
    fn describe(&self) -> Vec<&Desc>;

    /// The current sample set, possibly empty. Fetch failures are surfaced
    /// through the samples themselves (or their absence), never through a
    /// return value, so the exposition stays well-formed.
    async fn collect(&self) -> Vec<MetricFamily>;
}

/// Descriptor factory: builds the immutable identity of one exported metric
///
/// Namespaces `name` under the fixed `yarn` prefix. Called once per distinct
/// metric at collector construction; the resulting descriptors are shared
/// across concurrent scrapes. Names are compile-time constants, so an
/// invalid one is a programmer error and panics before the server starts.
pub(crate) fn new_desc(
    name: &str,
    help: &str,
    variable_labels: &[&str],
    const_labels: HashMap<String, String>,
) -> Desc {
    Desc::new(
        format!("{METRICS_NAMESPACE}_{name}"),
        help.to_string(),
        variable_labels.iter().map(|l| (*l).to_string()).collect(),
        const_labels,
    )
    .expect("valid metric descriptor")
}

/// Buffer collectors emit samples into during one scrape
///
/// Samples emitted under the same descriptor are grouped into a single
/// metric family so the text exposition declares each metric exactly once.
pub(crate) struct SampleBuffer {
    families: Vec<MetricFamily>,
}

impl SampleBuffer {
    pub(crate) fn new() -> Self {
        SampleBuffer {
            families: Vec::new(),
        }
    }

    pub(crate) fn gauge(&mut self, desc: &Desc, value: f64, label_values: &[&str]) {
        self.sample(desc, ValueKind::Gauge, value, label_values);
    }

    pub(crate) fn counter(&mut self, desc: &Desc, value: f64, label_values: &[&str]) {
        self.sample(desc, ValueKind::Counter, value, label_values);
    }

    /// Emits one sample: descriptor identity + value + ordered label values
    ///
    /// `label_values` must match the descriptor's variable labels by
    /// position and count; call sites guarantee this with fixed-size arrays
    /// derived from the same field list as the label names.
    pub(crate) fn sample(
        &mut self,
        desc: &Desc,
        kind: ValueKind,
        value: f64,
        label_values: &[&str],
    ) {
        debug_assert_eq!(
            desc.variable_labels.len(),
            label_values.len(),
            "label values out of lockstep with descriptor '{}'",
            desc.fq_name
        );

        let mut labels: Vec<LabelPair> = desc.const_label_pairs.clone();
        for (name, value) in desc.variable_labels.iter().zip(label_values) {
            let mut pair = LabelPair::default();
            pair.set_name(name.clone());
            pair.set_value((*value).to_string());
            labels.push(pair);
        }

        let mut metric = Metric::default();
        metric.set_label(labels);
        match kind {
            ValueKind::Counter => {
                let mut counter = Counter::default();
                counter.set_value(value);
                metric.set_counter(counter);
            }
            ValueKind::Gauge => {
                let mut gauge = Gauge::default();
                gauge.set_value(value);
                metric.set_gauge(gauge);
            }
        }

        match self
            .families
            .iter_mut()
            .find(|family| family.get_name() == desc.fq_name)
        {
            Some(family) => family.mut_metric().push(metric),
            None => {
                let mut family = MetricFamily::default();
                family.set_name(desc.fq_name.clone());
                family.set_help(desc.help.clone());
                family.set_field_type(match kind {
                    ValueKind::Counter => MetricType::COUNTER,
                    ValueKind::Gauge => MetricType::GAUGE,
                });
                family.set_metric(vec![metric]);
                self.families.push(family);
            }
        }
    }

    pub(crate) fn into_families(self) -> Vec<MetricFamily> {
        self.families
    }
}

/// Fetches one upstream endpoint and decodes its JSON body
///
/// Transport errors, non-200 statuses and decode errors all map to
/// [`FetchError`]; the response body is released on every path by RAII.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    client: &Client,
    endpoint: &Url,
) -> Result<T, FetchError> {
    let response = client.get(endpoint.clone()).send().await?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(FetchError::Status(status));
    }

    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Helper function to create all metric collectors
///
/// Instantiates one collector per upstream resource. All three share the
/// HTTP client (and with it the configured fetch timeout); the scheduler
/// and applications collectors additionally get the audit channel.
pub fn create_all_collectors(
    endpoints: &Endpoints,
    client: &Client,
    audit: &AuditLog,
) -> Vec<Box<dyn MetricCollector>> {
    vec![
        // Aggregate cluster state, plus the up/scrape_failures signals
        Box::new(cluster::ClusterCollector::new(
            endpoints.cluster.clone(),
            client.clone(),
        )),
        // Per-queue capacity and usage
        Box::new(scheduler::SchedulerCollector::new(
            endpoints.scheduler.clone(),
            client.clone(),
            audit.clone(),
        )),
        // Per-application resource usage
        Box::new(apps::ApplicationCollector::new(
            endpoints.apps.clone(),
            client.clone(),
            audit.clone(),
        )),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use prometheus::proto::{Metric, MetricFamily, MetricType};

    /// Total number of samples across all families
    pub(crate) fn sample_count(families: &[MetricFamily]) -> usize {
        families.iter().map(|family| family.get_metric().len()).sum()
    }

    pub(crate) fn family<'a>(families: &'a [MetricFamily], name: &str) -> &'a MetricFamily {
        families
            .iter()
            .find(|family| family.get_name() == name)
            .unwrap_or_else(|| panic!("no metric family named '{name}'"))
    }

    pub(crate) fn metric_value(family: &MetricFamily, metric: &Metric) -> f64 {
        match family.get_field_type() {
            MetricType::COUNTER => metric.get_counter().get_value(),
            _ => metric.get_gauge().get_value(),
        }
    }

    /// Value of a family expected to hold exactly one sample
    pub(crate) fn sole_value(families: &[MetricFamily], name: &str) -> f64 {
        let family = family(families, name);
        assert_eq!(
            family.get_metric().len(),
            1,
            "family '{name}' has more than one sample"
        );
        metric_value(family, &family.get_metric()[0])
    }

    pub(crate) fn label_pairs(metric: &Metric) -> Vec<(String, String)> {
        metric
            .get_label()
            .iter()
            .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
            .collect()
    }
}
