use crate::config::DynamoDbConfig;
use crate::generator::GeneratedContent;
use async_trait::async_trait;
use aws_sdk_dynamodb::config::Builder as DynamoConfigBuilder;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::operation::put_item::builders::PutItemFluentBuilder;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors raised while writing one personalization row
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Store write failed: {0}")]
    Store(String),

    #[error("Store write timed out after {0:?}")]
    Timeout(Duration),
}

/// One row of the personalization table
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedPersonalization {
    /// Partition key
    pub user_id: String,
    /// Generated content
    pub data: GeneratedContent,
    /// Unix epoch milliseconds at write time
    pub timestamp: i64,
}

/// Key-value upsert capability, last write wins per `user_id`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersonalizationStore: Send + Sync {
    async fn put(&self, item: &PersistedPersonalization) -> Result<(), PersistenceError>;
}

/// DynamoDB-backed personalization table
pub struct DynamoPersonalizationStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoPersonalizationStore {
    /// Create a new store from a loaded AWS configuration
    pub fn new(aws_config: &aws_config::SdkConfig, config: &DynamoDbConfig) -> Self {
        let mut builder = DynamoConfigBuilder::from(aws_config);

        // Configure custom endpoint for DynamoDB Local
        if let Some(ref endpoint_url) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        info!(table = %config.table_name, "DynamoDB personalization store initialized");

        Self {
            client: DynamoClient::from_conf(builder.build()),
            table_name: config.table_name.clone(),
        }
    }

    /// Unconditional `PutItem` for one row; replaces any row with the same key
    fn put_request(&self, item: &PersistedPersonalization) -> PutItemFluentBuilder {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("user_id", AttributeValue::S(item.user_id.clone()))
            .item("data", to_attribute_value(&item.data))
            .item("timestamp", AttributeValue::N(item.timestamp.to_string()))
    }
}

#[async_trait]
impl PersonalizationStore for DynamoPersonalizationStore {
    #[instrument(skip(self, item), fields(user_id = %item.user_id))]
    async fn put(&self, item: &PersistedPersonalization) -> Result<(), PersistenceError> {
        self.put_request(item)
            .send()
            .await
            .map_err(|e| PersistenceError::Store(DisplayErrorContext(&e).to_string()))?;

        debug!(table = %self.table_name, "Personalization row written");

        Ok(())
    }
}

/// Map JSON onto DynamoDB attribute values. Numbers keep their JSON text.
pub fn to_attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute_value).collect()),
        Value::Object(fields) => AttributeValue::M(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_attribute_value(v)))
                .collect::<HashMap<_, _>>(),
        ),
    }
}
