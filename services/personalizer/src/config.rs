use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the personalizer service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Shared AWS configuration
    #[serde(default)]
    pub aws: AwsConfig,
    /// S3 source configuration
    #[serde(default)]
    pub s3: S3Config,
    /// Bedrock configuration
    #[serde(default)]
    pub bedrock: BedrockConfig,
    /// DynamoDB configuration
    #[serde(default)]
    pub dynamodb: DynamoDbConfig,
    /// Pipeline behavior
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// AWS settings shared by every client
#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
}

/// S3 source configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3Config {
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Bedrock text generation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BedrockConfig {
    /// Foundation model identifier
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Custom endpoint URL
    pub endpoint_url: Option<String>,
}

/// DynamoDB configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DynamoDbConfig {
    /// Table holding one personalization row per user
    #[serde(default = "default_table_name")]
    pub table_name: String,
    /// Custom endpoint URL (for DynamoDB Local)
    pub endpoint_url: Option<String>,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Event name that selects records for personalization
    #[serde(default = "default_target_event")]
    pub target_event: String,
    /// Timeout for fetching the source object, in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Timeout for one generation call, in seconds
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    /// Timeout for one store write, in seconds
    #[serde(default = "default_persistence_timeout_secs")]
    pub persistence_timeout_secs: u64,
}

/// API configuration for the invocation endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

// Default value functions
fn default_service_name() -> String {
    "currents-personalizer".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_model_id() -> String {
    "anthropic.claude-v2".to_string()
}

fn default_table_name() -> String {
    "braze_user_personalization".to_string()
}

fn default_target_event() -> String {
    "view_content".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_generation_timeout_secs() -> u64 {
    25
}

fn default_persistence_timeout_secs() -> u64 {
    5
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/personalizer").required(false))
            .add_source(config::File::with_name("/etc/currents/personalizer").required(false))
            // Override with environment variables
            // PERSONALIZER__DYNAMODB__TABLE_NAME -> dynamodb.table_name
            .add_source(
                config::Environment::with_prefix("PERSONALIZER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get source fetch timeout as Duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.fetch_timeout_secs)
    }

    /// Get generation timeout as Duration
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.generation_timeout_secs)
    }

    /// Get persistence timeout as Duration
    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.persistence_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
        }
    }
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            endpoint_url: None,
        }
    }
}

impl Default for DynamoDbConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            endpoint_url: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_event: default_target_event(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            generation_timeout_secs: default_generation_timeout_secs(),
            persistence_timeout_secs: default_persistence_timeout_secs(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}
