//! Hosted search index push.
//!
//! The push is a full replace, never an incremental update. Records go to a
//! scratch index that is then moved over the live one, so readers see either
//! the old index or the new one and stale records disappear with the swap.
//! The scratch index is cleared first, since an aborted earlier push may have
//! left records in it:
//!
//! ```text
//! clear <index>_tmp ──copy settings──▶ <index>_tmp ──batch x N──▶ wait ──move──▶ <index>
//! ```
//!
//! Credentials come from the environment only:
//!
//! - `WH_SEARCH_USER`: application id
//! - `WH_SEARCH_WRITE_KEY`: API key with write access

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::ops::Range;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::models::SearchRecord;

/// Failures talking to the hosted index. Every one aborts the push.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{0} environment variable not set")]
    MissingCredential(&'static str),
    #[error("search API error during {operation}: {status}: {body}")]
    Api {
        operation: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("task {task_id} on {index} not published after {waited:?}")]
    TaskTimeout {
        index: String,
        task_id: u64,
        waited: Duration,
    },
}

/// Replaces the whole content of a hosted index.
#[async_trait]
pub trait IndexPublisher: Send + Sync {
    /// Target index name, for logs.
    fn index_name(&self) -> &str;

    async fn replace_all(&self, records: &[SearchRecord]) -> Result<()>;
}

#[derive(Clone)]
pub struct AlgoliaCredentials {
    pub app_id: String,
    pub api_key: String,
}

impl std::fmt::Debug for AlgoliaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgoliaCredentials")
            .field("app_id", &self.app_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl AlgoliaCredentials {
    pub fn from_env() -> Result<Self, PublishError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, PublishError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(PublishError::MissingCredential(key))
        };
        Ok(Self {
            app_id: read("WH_SEARCH_USER")?,
            api_key: read("WH_SEARCH_WRITE_KEY")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    #[serde(rename = "taskID")]
    task_id: u64,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    status: String,
}

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One call of a full replace, in the order [`replace_steps`] returns them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceStep {
    /// Drop every record left in the scratch index.
    ClearScratch,
    /// Copy settings, synonyms and rules of the live index to the scratch one.
    CopySettings,
    /// Upload `records[range]` to the scratch index.
    Batch(Range<usize>),
    /// Wait for all batches, then move the scratch index over the live one.
    MoveScratch,
}

/// The calls that replace an index with `record_count` records.
pub fn replace_steps(record_count: usize, batch_size: usize) -> Vec<ReplaceStep> {
    let batch_size = batch_size.max(1);
    let mut steps = vec![ReplaceStep::ClearScratch, ReplaceStep::CopySettings];
    steps.extend(
        (0..record_count)
            .step_by(batch_size)
            .map(|start| ReplaceStep::Batch(start..(start + batch_size).min(record_count))),
    );
    steps.push(ReplaceStep::MoveScratch);
    steps
}

/// Full replace against the Algolia REST API.
pub struct AlgoliaPublisher {
    client: reqwest::Client,
    credentials: AlgoliaCredentials,
    host: String,
    index: String,
    batch_size: usize,
    task_deadline: Duration,
}

impl AlgoliaPublisher {
    pub fn new(config: &Config, credentials: AlgoliaCredentials) -> Result<Self> {
        let timeout = Duration::from_secs(config.index.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let host = format!("https://{}.algolia.net", credentials.app_id);
        Ok(Self {
            client,
            credentials,
            host,
            index: config.index_name()?.to_string(),
            batch_size: config.index.batch_size,
            task_deadline: timeout,
        })
    }

    pub fn scratch_index(&self) -> String {
        scratch_index_name(&self.index)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = request
            .header("X-Algolia-Application-Id", &self.credentials.app_id)
            .header("X-Algolia-API-Key", &self.credentials.api_key)
            .header("Content-Type", "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Api {
                operation,
                status,
                body,
            }
            .into());
        }
        Ok(response)
    }

    async fn clear(&self, index: &str) -> Result<u64> {
        let url = format!("{}/1/indexes/{}/clear", self.host, index);
        let response = self.send("clear", self.client.post(url)).await?;
        let task: TaskResponse = response.json().await?;
        Ok(task.task_id)
    }

    /// `copy` or `move` `source` onto `destination`.
    async fn index_operation(
        &self,
        operation: &'static str,
        source: &str,
        destination: &str,
        scope: Option<&[&str]>,
    ) -> Result<u64> {
        let mut body = json!({ "operation": operation, "destination": destination });
        if let Some(scope) = scope {
            body["scope"] = json!(scope);
        }
        let url = format!("{}/1/indexes/{}/operation", self.host, source);
        let response = self
            .send(operation, self.client.post(url).json(&body))
            .await?;
        let task: TaskResponse = response.json().await?;
        Ok(task.task_id)
    }

    async fn upload_batch(&self, index: &str, records: &[SearchRecord]) -> Result<u64> {
        let url = format!("{}/1/indexes/{}/batch", self.host, index);
        let response = self
            .send("batch", self.client.post(url).json(&batch_body(records)))
            .await?;
        let task: TaskResponse = response.json().await?;
        Ok(task.task_id)
    }

    async fn wait_task(&self, index: &str, task_id: u64) -> Result<()> {
        let url = format!("{}/1/indexes/{}/task/{}", self.host, index, task_id);
        let started = Instant::now();
        loop {
            let response = self.send("task", self.client.get(&url)).await?;
            let status: TaskStatus = response.json().await?;
            if status.status == "published" {
                debug!(index, task_id, "task published");
                return Ok(());
            }
            if started.elapsed() >= self.task_deadline {
                return Err(PublishError::TaskTimeout {
                    index: index.to_string(),
                    task_id,
                    waited: started.elapsed(),
                }
                .into());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl IndexPublisher for AlgoliaPublisher {
    fn index_name(&self) -> &str {
        &self.index
    }

    async fn replace_all(&self, records: &[SearchRecord]) -> Result<()> {
        let scratch = self.scratch_index();
        let mut batches = Vec::new();

        for step in replace_steps(records.len(), self.batch_size) {
            match step {
                ReplaceStep::ClearScratch => {
                    let cleared = self.clear(&scratch).await?;
                    self.wait_task(&scratch, cleared).await?;
                }
                ReplaceStep::CopySettings => {
                    let copy = self
                        .index_operation(
                            "copy",
                            &self.index,
                            &scratch,
                            Some(&["settings", "synonyms", "rules"][..]),
                        )
                        .await?;
                    self.wait_task(&self.index, copy).await?;
                }
                ReplaceStep::Batch(range) => {
                    let chunk = &records[range];
                    let task_id = self.upload_batch(&scratch, chunk).await?;
                    debug!(batch = batches.len() + 1, records = chunk.len(), task_id, "batch sent");
                    batches.push(task_id);
                }
                ReplaceStep::MoveScratch => {
                    for task_id in batches.drain(..) {
                        self.wait_task(&scratch, task_id).await?;
                    }
                    let moved = self
                        .index_operation("move", &scratch, &self.index, None)
                        .await?;
                    self.wait_task(&scratch, moved).await?;
                }
            }
        }

        info!(index = %self.index, records = records.len(), "index replaced");
        Ok(())
    }
}

pub fn scratch_index_name(index: &str) -> String {
    format!("{}_tmp", index)
}

/// Body of a `batch` call: one `addObject` action per record.
pub fn batch_body(records: &[SearchRecord]) -> Value {
    let requests: Vec<Value> = records
        .iter()
        .map(|record| json!({ "action": "addObject", "body": record }))
        .collect();
    json!({ "requests": requests })
}

/// Push `records` with `publisher`, printing a one-line summary.
pub async fn publish(publisher: &dyn IndexPublisher, records: &[SearchRecord]) -> Result<()> {
    println!(
        "Pushing {} records to index '{}'...",
        records.len(),
        publisher.index_name()
    );
    publisher.replace_all(records).await?;
    println!("Index '{}' replaced.", publisher.index_name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RECORD_TYPE;
    use std::sync::Mutex;

    fn record(id: &str) -> SearchRecord {
        SearchRecord {
            object_id: id.to_string(),
            headings: "Intro".to_string(),
            main_title: "Page".to_string(),
            page_title: "Page".to_string(),
            content: "text".to_string(),
            url: "https://kotlinlang.org/docs/x.html".to_string(),
            record_type: RECORD_TYPE.to_string(),
            parent: None,
            page_views: 3,
            product: "help".to_string(),
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        pushed: Mutex<Vec<Vec<SearchRecord>>>,
    }

    #[async_trait]
    impl IndexPublisher for RecordingPublisher {
        fn index_name(&self) -> &str {
            "docs"
        }

        async fn replace_all(&self, records: &[SearchRecord]) -> Result<()> {
            self.pushed.lock().unwrap().push(records.to_vec());
            Ok(())
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl IndexPublisher for FailingPublisher {
        fn index_name(&self) -> &str {
            "docs"
        }

        async fn replace_all(&self, _records: &[SearchRecord]) -> Result<()> {
            Err(PublishError::Api {
                operation: "batch",
                status: reqwest::StatusCode::FORBIDDEN,
                body: "invalid key".to_string(),
            }
            .into())
        }
    }

    #[test]
    fn credentials_need_both_variables() {
        let creds = AlgoliaCredentials::from_lookup(|key| match key {
            "WH_SEARCH_USER" => Some("APP".to_string()),
            "WH_SEARCH_WRITE_KEY" => Some("secret".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(creds.app_id, "APP");
        assert!(!format!("{:?}", creds).contains("secret"));

        let err = AlgoliaCredentials::from_lookup(|key| {
            (key == "WH_SEARCH_USER").then(|| "APP".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, PublishError::MissingCredential("WH_SEARCH_WRITE_KEY")));
    }

    #[test]
    fn batch_body_uses_add_object() {
        let body = batch_body(&[record("a"), record("b")]);
        let requests = body["requests"].as_array().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["action"], "addObject");
        assert_eq!(requests[1]["body"]["objectID"], "b");
        assert_eq!(requests[0]["body"]["pageViews"], 3);
    }

    #[test]
    fn replace_clears_scratch_before_uploading() {
        let steps = replace_steps(5, 2);
        assert_eq!(
            steps,
            vec![
                ReplaceStep::ClearScratch,
                ReplaceStep::CopySettings,
                ReplaceStep::Batch(0..2),
                ReplaceStep::Batch(2..4),
                ReplaceStep::Batch(4..5),
                ReplaceStep::MoveScratch,
            ]
        );
    }

    #[test]
    fn empty_replace_still_clears_and_moves() {
        assert_eq!(
            replace_steps(0, 1000),
            vec![
                ReplaceStep::ClearScratch,
                ReplaceStep::CopySettings,
                ReplaceStep::MoveScratch,
            ]
        );
    }

    #[test]
    fn scratch_index_is_suffixed() {
        assert_eq!(scratch_index_name("prod_docs"), "prod_docs_tmp");
    }

    #[test]
    fn publisher_requires_an_index_name() {
        let config = Config::minimal("dist".into());
        let creds = AlgoliaCredentials {
            app_id: "APP".to_string(),
            api_key: "key".to_string(),
        };
        assert!(AlgoliaPublisher::new(&config, creds.clone()).is_err());

        let mut config = config;
        config.index.name = Some("docs".to_string());
        let publisher = AlgoliaPublisher::new(&config, creds).unwrap();
        assert_eq!(publisher.scratch_index(), "docs_tmp");
        assert_eq!(publisher.host, "https://APP.algolia.net");
    }

    #[tokio::test]
    async fn publish_hands_all_records_over() {
        let publisher = RecordingPublisher::default();
        publish(&publisher, &[record("a"), record("b")]).await.unwrap();
        let pushed = publisher.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].len(), 2);
    }

    #[tokio::test]
    async fn publish_failure_propagates() {
        let err = publish(&FailingPublisher, &[record("a")]).await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }
}
