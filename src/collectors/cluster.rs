// Cluster metric collector
//
// Polls the ResourceManager's aggregate cluster metrics resource and maps
// one snapshot per scrape onto unlabeled gauges and counters. This is the
// only collector carrying the exporter's availability signals: `up` and
// `scrape_failures_total` are emitted on every scrape, success or not.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;
use url::Url;

use super::{fetch_json, new_desc, MetricCollector, SampleBuffer, ValueKind};

/// Aggregate cluster state as returned by the metrics resource
///
/// One snapshot per scrape; it replaces the previous one entirely. Fields
/// absent from the response decode as zero, matching the ResourceManager's
/// own behavior of omitting metrics it does not track.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ClusterSnapshot {
    apps_submitted: i64,
    apps_completed: i64,
    apps_pending: i64,
    apps_running: i64,
    apps_failed: i64,
    apps_killed: i64,
    #[serde(rename = "reservedMB")]
    reserved_mb: i64,
    #[serde(rename = "availableMB")]
    available_mb: i64,
    #[serde(rename = "allocatedMB")]
    allocated_mb: i64,
    #[serde(rename = "totalMB")]
    total_mb: i64,
    reserved_virtual_cores: i64,
    available_virtual_cores: i64,
    allocated_virtual_cores: i64,
    total_virtual_cores: i64,
    containers_allocated: i64,
    containers_reserved: i64,
    containers_pending: i64,
    total_nodes: i64,
    lost_nodes: i64,
    unhealthy_nodes: i64,
    decommissioned_nodes: i64,
    decommissioning_nodes: i64,
    active_nodes: i64,
    shutdown_nodes: i64,
}

#[derive(Debug, Deserialize)]
struct ClusterResponse {
    #[serde(default, rename = "clusterMetrics")]
    cluster_metrics: ClusterSnapshot,
}

/// Snapshot-to-metric mapping: name, help, kind, accessor
///
/// One row per exported metric, in emission order. Descriptors are built
/// from this table at construction and values are read through it per
/// scrape, so declaration and emission cannot drift apart.
type SnapshotField = (
    &'static str,
    &'static str,
    ValueKind,
    fn(&ClusterSnapshot) -> f64,
);

#[rustfmt::skip]
const SNAPSHOT_FIELDS: &[SnapshotField] = &[
    ("applications_submitted", "Total applications submitted",              ValueKind::Counter, |m| m.apps_submitted as f64),
    ("applications_completed", "Total applications completed",              ValueKind::Counter, |m| m.apps_completed as f64),
    ("applications_pending",   "Applications pending",                      ValueKind::Gauge,   |m| m.apps_pending as f64),
    ("applications_running",   "Applications running",                      ValueKind::Gauge,   |m| m.apps_running as f64),
    ("applications_failed",    "Total applications failed",                 ValueKind::Counter, |m| m.apps_failed as f64),
    ("applications_killed",    "Total applications killed",                 ValueKind::Counter, |m| m.apps_killed as f64),
    ("memory_reserved",        "Memory reserved (MB)",                      ValueKind::Gauge,   |m| m.reserved_mb as f64),
    ("memory_available",       "Memory available (MB)",                     ValueKind::Gauge,   |m| m.available_mb as f64),
    ("memory_allocated",       "Memory allocated (MB)",                     ValueKind::Gauge,   |m| m.allocated_mb as f64),
    ("memory_total",           "Total memory (MB)",                         ValueKind::Gauge,   |m| m.total_mb as f64),
    ("virtual_cores_reserved", "Virtual cores reserved",                    ValueKind::Gauge,   |m| m.reserved_virtual_cores as f64),
    ("virtual_cores_available","Virtual cores available",                   ValueKind::Gauge,   |m| m.available_virtual_cores as f64),
    ("virtual_cores_allocated","Virtual cores allocated",                   ValueKind::Gauge,   |m| m.allocated_virtual_cores as f64),
    ("virtual_cores_total",    "Total virtual cores",                       ValueKind::Gauge,   |m| m.total_virtual_cores as f64),
    ("containers_allocated",   "Containers allocated",                      ValueKind::Gauge,   |m| m.containers_allocated as f64),
    ("containers_reserved",    "Containers reserved",                       ValueKind::Gauge,   |m| m.containers_reserved as f64),
    ("containers_pending",     "Containers pending",                        ValueKind::Gauge,   |m| m.containers_pending as f64),
    ("nodes_total",            "Nodes total",                               ValueKind::Gauge,   |m| m.total_nodes as f64),
    ("nodes_lost",             "Nodes lost",                                ValueKind::Gauge,   |m| m.lost_nodes as f64),
    ("nodes_unhealthy",        "Nodes unhealthy",                           ValueKind::Gauge,   |m| m.unhealthy_nodes as f64),
    ("nodes_decommissioned",   "Nodes decommissioned",                      ValueKind::Gauge,   |m| m.decommissioned_nodes as f64),
    ("nodes_decommissioning",  "Nodes decommissioning",                     ValueKind::Gauge,   |m| m.decommissioning_nodes as f64),
    ("nodes_active",           "Nodes active",                              ValueKind::Gauge,   |m| m.active_nodes as f64),
    ("nodes_shutdown",         "Nodes shutdown",                            ValueKind::Gauge,   |m| m.shutdown_nodes as f64),
];

/// Cluster-level metric collector
///
/// Owns the cluster metrics endpoint and the process-lifetime scrape
/// failure counter. The counter is atomic because `collect` takes `&self`
/// and scrapes may run concurrently; it is written by this collector only.
pub struct ClusterCollector {
    endpoint: Url,
    client: Client,

    up: Desc,
    scrape_failures: Desc,
    snapshot_descs: Vec<Desc>,

    /// Monotonically increasing count of failed fetches; never reset
    failures: AtomicU64,
}

impl ClusterCollector {
    pub fn new(endpoint: Url, client: Client) -> Self {
        ClusterCollector {
            endpoint,
            client,
            up: new_desc("up", "Able to contact YARN", &[], Default::default()),
            scrape_failures: new_desc(
                "scrape_failures_total",
                "Number of errors while scraping YARN metrics",
                &[],
                Default::default(),
            ),
            snapshot_descs: SNAPSHOT_FIELDS
                .iter()
                .map(|(name, help, _, _)| new_desc(name, help, &[], Default::default()))
                .collect(),
            failures: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl MetricCollector for ClusterCollector {
    fn name(&self) -> &str {
        "Cluster"
    }

    fn describe(&self) -> Vec<&Desc> {
        let mut descs = vec![&self.up, &self.scrape_failures];
        descs.extend(self.snapshot_descs.iter());
        descs
    }

    /// Collects the current cluster snapshot
    ///
    /// Always emits `up` and `scrape_failures_total`. A failed fetch
    /// increments the failure counter and suppresses the snapshot samples;
    /// it is reported through those two metrics only, never as an error,
    /// so the exposition as a whole stays well-formed.
    async fn collect(&self) -> Vec<MetricFamily> {
        let mut buffer = SampleBuffer::new();

        let snapshot = match fetch_json::<ClusterResponse>(&self.client, &self.endpoint).await {
            Ok(response) => Some(response.cluster_metrics),
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Error while collecting data from YARN: {e}");
                None
            }
        };

        let up = if snapshot.is_some() { 1.0 } else { 0.0 };
        buffer.gauge(&self.up, up, &[]);
        buffer.counter(
            &self.scrape_failures,
            self.failures.load(Ordering::Relaxed) as f64,
            &[],
        );

        if let Some(snapshot) = snapshot {
            for (desc, (_, _, kind, value)) in self.snapshot_descs.iter().zip(SNAPSHOT_FIELDS) {
                buffer.sample(desc, *kind, value(&snapshot), &[]);
            }
        }

        buffer.into_families()
    }
}
