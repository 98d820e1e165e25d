// Scheduler metric collector
//
// Polls the ResourceManager's scheduler resource and maps each queue onto
// a fixed set of gauges labeled (queueName, type). Unlike the cluster
// collector there is no availability signal: a failed fetch suppresses
// this scrape's samples entirely and leaves only a diagnostic log line.
// Existing dashboards depend on that shape, so it stays.

use async_trait::async_trait;
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use super::{fetch_json, new_desc, MetricCollector, SampleBuffer};
use crate::audit::AuditLog;

/// Label names for every queue metric, in emission order
///
/// `QueueRecord::label_values` mirrors this array element for element;
/// both being `[_; 2]` keeps names and values in lockstep.
const QUEUE_LABELS: [&str; 2] = ["queueName", "type"];

/// One row per scheduler queue
///
/// Serialized back out (with wire field names) to the audit channel before
/// its metrics are emitted.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct QueueRecord {
    capacity: f64,
    max_capacity: f64,
    used_capacity: f64,
    absolute_capacity: f64,
    absolute_max_capacity: f64,
    absolute_used_capacity: f64,
    num_applications: i64,
    resources_used: ResourcesUsed,

    queue_name: String,
    #[serde(rename = "type")]
    queue_type: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ResourcesUsed {
    memory: i64,
    v_cores: i64,
}

impl QueueRecord {
    /// Label values in [`QUEUE_LABELS`] order
    fn label_values(&self) -> [&str; 2] {
        [&self.queue_name, &self.queue_type]
    }
}

// The queue list sits four levels deep in the scheduler document. Any
// absent level decodes as an empty scrape.
#[derive(Debug, Deserialize)]
struct SchedulerResponse {
    scheduler: Option<SchedulerBody>,
}

#[derive(Debug, Deserialize)]
struct SchedulerBody {
    #[serde(rename = "schedulerInfo")]
    scheduler_info: Option<SchedulerInfo>,
}

#[derive(Debug, Deserialize)]
struct SchedulerInfo {
    queues: Option<Queues>,
}

#[derive(Debug, Deserialize)]
struct Queues {
    queue: Option<Vec<QueueRecord>>,
}

/// Queue-to-metric mapping: name, help, accessor. All gauges.
type QueueField = (&'static str, &'static str, fn(&QueueRecord) -> f64);

#[rustfmt::skip]
const QUEUE_FIELDS: &[QueueField] = &[
    ("capacity",               "Queue capacity percentage",                  |q| q.capacity),
    ("max_capacity",           "Maximum queue capacity percentage",          |q| q.max_capacity),
    ("used_capacity",          "Used queue capacity percentage",             |q| q.used_capacity),
    ("num_applications",       "Applications in the queue",                  |q| q.num_applications as f64),
    ("absolute_capacity",      "Absolute capacity percentage",               |q| q.absolute_capacity),
    ("absolute_used_capacity", "Absolute used capacity percentage",          |q| q.absolute_used_capacity),
    ("absolute_max_capacity",  "Absolute maximum capacity percentage",       |q| q.absolute_max_capacity),
    ("resources_used_memory",  "Memory used by the queue (MB)",              |q| q.resources_used.memory as f64),
    ("resources_used_v_cores", "Virtual cores used by the queue",            |q| q.resources_used.v_cores as f64),
];

/// Per-queue metric collector
pub struct SchedulerCollector {
    endpoint: Url,
    client: Client,
    audit: AuditLog,
    descs: Vec<Desc>,
}

impl SchedulerCollector {
    pub fn new(endpoint: Url, client: Client, audit: AuditLog) -> Self {
        SchedulerCollector {
            endpoint,
            client,
            audit,
            descs: QUEUE_FIELDS
                .iter()
                .map(|(name, help, _)| new_desc(name, help, &QUEUE_LABELS, Default::default()))
                .collect(),
        }
    }

    async fn fetch_queues(&self) -> Result<Vec<QueueRecord>, super::FetchError> {
        let response = fetch_json::<SchedulerResponse>(&self.client, &self.endpoint).await?;

        Ok(response
            .scheduler
            .and_then(|scheduler| scheduler.scheduler_info)
            .and_then(|info| info.queues)
            .and_then(|queues| queues.queue)
            .unwrap_or_default())
    }
}

#[async_trait]
impl MetricCollector for SchedulerCollector {
    fn name(&self) -> &str {
        "Scheduler"
    }

    fn describe(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    /// Collects the current queue list
    ///
    /// Emits 9 samples per queue. Each raw record is forwarded to the
    /// audit channel before emission (fire-and-forget). A failed fetch
    /// yields zero samples and a log line only.
    async fn collect(&self) -> Vec<MetricFamily> {
        let queues = match self.fetch_queues().await {
            Ok(queues) => queues,
            Err(e) => {
                warn!("Error while collecting data from YARN: {e}");
                return Vec::new();
            }
        };

        let mut buffer = SampleBuffer::new();
        for queue in &queues {
            self.audit.record("queue", queue);

            let labels = queue.label_values();
            for (desc, (_, _, value)) in self.descs.iter().zip(QUEUE_FIELDS) {
                buffer.gauge(desc, value(queue), &labels);
            }
        }

        buffer.into_families()
    }
}
