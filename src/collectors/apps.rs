// Applications metric collector
//
// Polls the ResourceManager's application list and maps each application
// onto a fixed set of gauges carrying the application's descriptive label
// tuple. Same failure policy as the scheduler collector: no samples and a
// log line when the fetch fails, no availability gauge.

use async_trait::async_trait;
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use super::{fetch_json, new_desc, MetricCollector, SampleBuffer};
use crate::audit::AuditLog;

/// Label names for every application metric, in emission order
///
/// `ApplicationRecord::label_values` mirrors this array element for
/// element; both being `[_; 8]` keeps names and values in lockstep.
const APPLICATION_LABELS: [&str; 8] = [
    "id",
    "user",
    "name",
    "queue",
    "state",
    "finalStatus",
    "applicationType",
    "applicationTags",
];

/// One row per application
///
/// Serialized back out (with wire field names) to the audit channel before
/// its metrics are emitted.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ApplicationRecord {
    elapsed_time: i64,
    #[serde(rename = "allocatedMB")]
    allocated_mb: i64,
    #[serde(rename = "allocatedVCores")]
    allocated_v_cores: i64,
    running_containers: i64,
    memory_seconds: i64,
    #[serde(rename = "vcoreSeconds")]
    vcore_seconds: i64,
    queue_usage_percentage: f64,
    cluster_usage_percentage: f64,

    id: String,
    user: String,
    name: String,
    queue: String,
    state: String,
    final_status: String,
    application_type: String,
    application_tags: String,
}

impl ApplicationRecord {
    /// Label values in [`APPLICATION_LABELS`] order
    fn label_values(&self) -> [&str; 8] {
        [
            &self.id,
            &self.user,
            &self.name,
            &self.queue,
            &self.state,
            &self.final_status,
            &self.application_type,
            &self.application_tags,
        ]
    }
}

// The ResourceManager returns `"apps": null` when no applications match;
// both wrapper levels are therefore optional.
#[derive(Debug, Deserialize)]
struct ApplicationsResponse {
    apps: Option<AppList>,
}

#[derive(Debug, Deserialize)]
struct AppList {
    app: Option<Vec<ApplicationRecord>>,
}

/// Application-to-metric mapping: name, help, accessor. All gauges.
type ApplicationField = (&'static str, &'static str, fn(&ApplicationRecord) -> f64);

#[rustfmt::skip]
const APPLICATION_FIELDS: &[ApplicationField] = &[
    ("elapsed_time",             "Elapsed time since the application started (ms)", |a| a.elapsed_time as f64),
    ("allocated_MB",             "Memory allocated to the application (MB)",        |a| a.allocated_mb as f64),
    ("allocated_v_cores",        "Virtual cores allocated to the application",      |a| a.allocated_v_cores as f64),
    ("running_containers",       "Containers running for the application",          |a| a.running_containers as f64),
    ("memory_seconds",           "Aggregated memory usage (MB-seconds)",            |a| a.memory_seconds as f64),
    ("v_core_seconds",           "Aggregated virtual core usage (core-seconds)",    |a| a.vcore_seconds as f64),
    ("queue_usage_percentage",   "Share of the queue's resources in use",           |a| a.queue_usage_percentage),
    ("cluster_usage_percentage", "Share of the cluster's resources in use",         |a| a.cluster_usage_percentage),
];

/// Per-application metric collector
pub struct ApplicationCollector {
    endpoint: Url,
    client: Client,
    audit: AuditLog,
    descs: Vec<Desc>,
}

impl ApplicationCollector {
    pub fn new(endpoint: Url, client: Client, audit: AuditLog) -> Self {
        ApplicationCollector {
            endpoint,
            client,
            audit,
            descs: APPLICATION_FIELDS
                .iter()
                .map(|(name, help, _)| {
                    new_desc(name, help, &APPLICATION_LABELS, Default::default())
                })
                .collect(),
        }
    }

    async fn fetch_applications(&self) -> Result<Vec<ApplicationRecord>, super::FetchError> {
        let response = fetch_json::<ApplicationsResponse>(&self.client, &self.endpoint).await?;

        Ok(response
            .apps
            .and_then(|apps| apps.app)
            .unwrap_or_default())
    }
}

#[async_trait]
impl MetricCollector for ApplicationCollector {
    fn name(&self) -> &str {
        "Applications"
    }

    fn describe(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    /// Collects the current application list
    ///
    /// Emits 8 samples per application. Each raw record is forwarded to
    /// the audit channel before emission (fire-and-forget). A failed fetch
    /// yields zero samples and a log line only.
    async fn collect(&self) -> Vec<MetricFamily> {
        let applications = match self.fetch_applications().await {
            Ok(applications) => applications,
            Err(e) => {
                warn!("Error while collecting data from YARN: {e}");
                return Vec::new();
            }
        };

        let mut buffer = SampleBuffer::new();
        for application in &applications {
            self.audit.record("application", application);

            let labels = application.label_values();
            for (desc, (_, _, value)) in self.descs.iter().zip(APPLICATION_FIELDS) {
                buffer.gauge(desc, value(application), &labels);
            }
        }

        buffer.into_families()
    }
}
