use crate::config::Config;
use crate::decoder::{self, DecodeError};
use crate::filter::{Eligibility, EligibleRecord, EventFilter};
use crate::generator::{ContentGenerator, GenerationError, TextGenerator};
use crate::notification::{FileLocation, NotificationError};
use crate::persistence::{PersistedPersonalization, PersistenceError, PersonalizationStore};
use crate::source::{FetchError, ObjectSource};
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Failures that abort a run before any record is processed
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Failures confined to a single record
#[derive(Error, Debug)]
pub enum RecordError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Counts of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub file_processed: String,
    pub processed_count: u64,
    pub error_count: u64,
}

/// The result of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    Failed { error: String },
}

/// Envelope returned to the hosting environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON-encoded body
    pub body: String,
}

#[derive(Serialize)]
struct CompletedBody<'a> {
    message: &'static str,
    processed_count: u64,
    error_count: u64,
    file_processed: &'a str,
}

#[derive(Serialize)]
struct FailedBody<'a> {
    message: &'static str,
    error: &'a str,
}

impl RunOutcome {
    pub fn status_code(&self) -> u16 {
        match self {
            RunOutcome::Completed(_) => 200,
            RunOutcome::Failed { .. } => 500,
        }
    }

    /// Serialize into the invocation envelope
    pub fn to_response(&self) -> InvocationResponse {
        let body = match self {
            RunOutcome::Completed(summary) => serde_json::to_string(&CompletedBody {
                message: "Processing complete",
                processed_count: summary.processed_count,
                error_count: summary.error_count,
                file_processed: &summary.file_processed,
            }),
            RunOutcome::Failed { error } => serde_json::to_string(&FailedBody {
                message: "Internal server error",
                error,
            }),
        };

        InvocationResponse {
            status_code: self.status_code(),
            // Both bodies hold only strings and integers
            body: body.unwrap_or_default(),
        }
    }
}

/// Timeouts bounding each network call of a run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub target_event: String,
    pub fetch_timeout: Duration,
    pub generation_timeout: Duration,
    pub persistence_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_event: config.pipeline.target_event.clone(),
            fetch_timeout: config.fetch_timeout(),
            generation_timeout: config.generation_timeout(),
            persistence_timeout: config.persistence_timeout(),
        }
    }
}

/// Per-file personalization pipeline
pub struct Pipeline {
    source: Arc<dyn ObjectSource>,
    generator: ContentGenerator,
    store: Arc<dyn PersonalizationStore>,
    filter: EventFilter,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn ObjectSource>,
        text_generator: Arc<dyn TextGenerator>,
        store: Arc<dyn PersonalizationStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            generator: ContentGenerator::new(text_generator, settings.generation_timeout),
            store,
            filter: EventFilter::new(settings.target_event.clone()),
            settings,
        }
    }

    /// Process the file named by a notification. Never fails: every error,
    /// including a panic, is reported through the outcome.
    #[instrument(skip(self, notification), fields(run_id = %Uuid::new_v4()))]
    pub async fn run(&self, notification: &serde_json::Value) -> RunOutcome {
        let outcome = match AssertUnwindSafe(self.execute(notification))
            .catch_unwind()
            .await
        {
            Ok(Ok(summary)) => RunOutcome::Completed(summary),
            Ok(Err(e)) => {
                error!(error = %e, "Fatal error");
                RunOutcome::Failed { error: e.to_string() }
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(error = %message, "Run aborted by unexpected fault");
                RunOutcome::Failed { error: message }
            }
        };

        match &outcome {
            RunOutcome::Completed(_) => metrics::counter!("personalizer.runs.completed").increment(1),
            RunOutcome::Failed { .. } => metrics::counter!("personalizer.runs.failed").increment(1),
        }

        outcome
    }

    async fn execute(&self, notification: &serde_json::Value) -> Result<RunSummary, RunError> {
        let location = FileLocation::from_notification(notification)?;

        info!(
            file_key = %location.object_key,
            bucket = %location.container_id,
            "Processing file"
        );

        let bytes = tokio::time::timeout(
            self.settings.fetch_timeout,
            self.source.fetch(&location.container_id, &location.object_key),
        )
        .await
        .map_err(|_| FetchError::Timeout {
            key: location.object_key.clone(),
            elapsed: self.settings.fetch_timeout,
        })??;

        let records = decoder::decode(&bytes)?;

        let mut summary = RunSummary {
            file_processed: location.object_key,
            processed_count: 0,
            error_count: 0,
        };

        for record in records {
            let record = match self.filter.classify(record) {
                Eligibility::Eligible(record) => record,
                Eligibility::MissingKey => {
                    warn!(event = %self.filter.target_event(), "Skipping entry - missing user_id");
                    summary.error_count += 1;
                    metrics::counter!("personalizer.records.failed").increment(1);
                    continue;
                }
                Eligibility::Skip => {
                    metrics::counter!("personalizer.records.skipped").increment(1);
                    continue;
                }
            };

            match self.process_record(&record).await {
                Ok(()) => {
                    summary.processed_count += 1;
                    metrics::counter!("personalizer.records.processed").increment(1);
                    info!(user_id = %record.user_id(), "Successfully processed entry");
                }
                Err(e) => {
                    summary.error_count += 1;
                    metrics::counter!("personalizer.records.failed").increment(1);
                    error!(user_id = %record.user_id(), error = %e, "Error processing entry");
                }
            }
        }

        info!(
            file_key = %summary.file_processed,
            processed_count = summary.processed_count,
            error_count = summary.error_count,
            "Processing complete"
        );

        Ok(summary)
    }

    #[instrument(skip(self, record), fields(user_id = %record.user_id()))]
    async fn process_record(&self, record: &EligibleRecord) -> Result<(), RecordError> {
        let content = self.generator.generate(record).await?;

        let item = PersistedPersonalization {
            user_id: record.user_id().to_string(),
            data: content,
            timestamp: Utc::now().timestamp_millis(),
        };

        tokio::time::timeout(self.settings.persistence_timeout, self.store.put(&item))
            .await
            .map_err(|_| PersistenceError::Timeout(self.settings.persistence_timeout))??;

        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected fault".to_string()
    }
}
