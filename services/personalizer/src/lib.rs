//! Currents Personalizer
//!
//! Turns Braze Currents event exports into personalized email content. Each
//! invocation receives an S3 file-arrival notification, reads the Avro export,
//! picks the `view_content` events, asks a text generation model for an email
//! per user, and upserts the result into a DynamoDB table keyed by `user_id`.
//!
//! ## Features
//!
//! - **All-or-nothing decoding**: a corrupt export fails the run before any
//!   record is touched
//! - **Per-record isolation**: a generation or store failure is counted and
//!   the run moves on
//! - **Injected capabilities**: fetch, generation and storage are traits, so
//!   the pipeline runs unchanged against fakes
//!
//! ## Architecture
//!
//! ```text
//! S3 Notification           S3 Bucket               Bedrock
//! ┌──────────────┐         ┌──────────────┐        ┌──────────────┐
//! │ Invocation   │         │ Currents     │        │ Text         │
//! │ API          │         │ Avro export  │        │ Generation   │
//! └──────────────┘         └──────────────┘        └──────────────┘
//!        │                        │                       ▲
//!        ▼                        ▼                       │
//! ┌──────────────┐         ┌──────────────┐        ┌──────────────┐
//! │ Pipeline     │────────▶│ Decoder      │───────▶│ Content      │
//! │              │         │ + Filter     │        │ Generator    │
//! └──────────────┘         └──────────────┘        └──────────────┘
//!        ▲                                                │
//!        │                                                ▼
//!   RunOutcome                                     ┌──────────────┐
//!                                                  │ DynamoDB     │
//!                                                  │ Store        │
//!                                                  └──────────────┘
//! ```

pub mod api;
pub mod bedrock;
pub mod config;
pub mod decoder;
pub mod filter;
pub mod generator;
pub mod notification;
pub mod persistence;
pub mod pipeline;
pub mod source;

#[cfg(test)]
mod testing;

pub use api::{AppState, create_router, start_api_server};
pub use bedrock::BedrockTextGenerator;
pub use config::Config;
pub use decoder::{decode, DecodeError, RawRecord};
pub use filter::{Eligibility, EligibleRecord, EventFilter};
pub use generator::{
    extract_structured_block, ContentGenerator, GeneratedContent, GenerationError,
    GenerationParams, ServiceError, TextGenerator,
};
pub use notification::{FileLocation, NotificationError};
pub use persistence::{
    DynamoPersonalizationStore, PersistedPersonalization, PersistenceError, PersonalizationStore,
};
pub use pipeline::{InvocationResponse, Pipeline, PipelineSettings, RunOutcome, RunSummary};
pub use source::{FetchError, ObjectSource, S3ObjectSource};
