use crate::filter::EligibleRecord;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Marker opening the structured block in a completion
pub const BLOCK_OPEN: &str = "```json";
/// Marker closing the structured block in a completion
pub const BLOCK_CLOSE: &str = "```";

const TASK_FRAMING: &str = "You help create marketing email content for a video on demand streaming company. \
You MUST answer in JSON format only. DO NOT use any other format while answering the question. \
Your task is to create a JSON object with 3 main elements: email title, heading and details (intro, episode details, cta). \
The email promotes a new episode of a series the viewer watched. Viewing event data: ";

const SERIES_CONTEXT: &str = "The series details: \"In a world where memories can be implanted, edited, and even stolen, \
a gifted memory detective must solve a series of murders linked to a powerful tech corporation.\" \
Create the JSON object promoting episode two with a fictitious story. Use the event data to personalize the messaging. ";

const OUTPUT_CONTRACT: &str = "Reply with a single fenced code block that starts with ```json and ends with ``` \
and contains only the JSON object.";

/// Generated content, stored as-is
pub type GeneratedContent = serde_json::Value;

/// Sampling parameters sent with every generation request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl GenerationParams {
    /// Fixed generation policy
    pub const POLICY: GenerationParams = GenerationParams {
        max_tokens: 500,
        temperature: 1.0,
        top_p: 0.9,
        top_k: 500,
    };
}

/// Errors reported by the text generation service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Generation request failed: {0}")]
    Request(String),

    #[error("Generation request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid generation response: {0}")]
    InvalidResponse(String),
}

/// Errors raised while generating content for one record
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Empty completion in generation response")]
    EmptyCompletion,

    #[error("No JSON block found in completion")]
    NoStructuredBlock,

    #[error("Error parsing JSON block: {0}")]
    MalformedStructuredData(#[source] serde_json::Error),
}

/// Text generation capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete a prompt. An absent completion is returned as an empty string.
    async fn invoke(&self, prompt: &str, params: &GenerationParams) -> Result<String, ServiceError>;
}

/// Builds prompts and turns completions into structured content
pub struct ContentGenerator {
    service: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl ContentGenerator {
    pub fn new(service: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Generate personalized content for an eligible record
    #[instrument(skip(self, record), fields(user_id = %record.user_id()))]
    pub async fn generate(&self, record: &EligibleRecord) -> Result<GeneratedContent, GenerationError> {
        let prompt = build_prompt(record);

        let started = Instant::now();
        let completion = tokio::time::timeout(
            self.timeout,
            self.service.invoke(&prompt, &GenerationParams::POLICY),
        )
        .await
        .map_err(|_| ServiceError::Timeout(self.timeout))??;

        metrics::histogram!("personalizer.generation.duration_seconds")
            .record(started.elapsed().as_secs_f64());

        if completion.trim().is_empty() {
            return Err(GenerationError::EmptyCompletion);
        }

        let block = extract_structured_block(&completion).ok_or_else(|| {
            warn!(completion_len = completion.len(), "Completion has no JSON block");
            GenerationError::NoStructuredBlock
        })?;

        let content = serde_json::from_str(block).map_err(GenerationError::MalformedStructuredData)?;

        debug!(block_len = block.len(), "Parsed generated content");

        Ok(content)
    }
}

/// Build the instruction sent for one record
pub fn build_prompt(record: &EligibleRecord) -> String {
    let properties = serde_json::to_string(record.properties()).unwrap_or_else(|_| "{}".to_string());

    format!("{TASK_FRAMING}{properties} {SERIES_CONTEXT}{OUTPUT_CONTRACT}")
}

/// Locate the first fenced JSON block in a completion.
///
/// ~~~text
/// ...any preamble...
/// ```json
/// { "email_title": "...", ... }
/// ```
/// ...anything after is ignored...
/// ~~~
///
/// The block starts right after the first ```` ```json ```` marker and ends
/// at the next ```` ``` ```` marker.
pub fn extract_structured_block(completion: &str) -> Option<&str> {
    let start = completion.find(BLOCK_OPEN)? + BLOCK_OPEN.len();
    let len = completion[start..].find(BLOCK_CLOSE)?;

    Some(&completion[start..start + len])
}
