use crate::config::BedrockConfig;
use crate::generator::{GenerationParams, ServiceError, TextGenerator};
use async_trait::async_trait;
use aws_sdk_bedrockruntime::config::Builder as BedrockConfigBuilder;
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

const CONTENT_TYPE: &str = "application/json";

/// Anthropic text-completion request body
#[derive(Debug, Serialize)]
struct CompletionRequest {
    prompt: String,
    max_tokens_to_sample: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

impl CompletionRequest {
    fn new(prompt: &str, params: &GenerationParams) -> Self {
        Self {
            prompt: format!("\n\nHuman:{prompt} \n\nAssistant:"),
            max_tokens_to_sample: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
        }
    }
}

/// Anthropic text-completion response body
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    completion: Option<String>,
}

/// Text generator backed by Amazon Bedrock `InvokeModel`
pub struct BedrockTextGenerator {
    client: BedrockClient,
    model_id: String,
}

impl BedrockTextGenerator {
    /// Create a new Bedrock generator from a loaded AWS configuration
    pub fn new(aws_config: &aws_config::SdkConfig, config: &BedrockConfig) -> Self {
        let mut builder = BedrockConfigBuilder::from(aws_config);

        if let Some(ref endpoint_url) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        info!(model_id = %config.model_id, "Bedrock text generator initialized");

        Self {
            client: BedrockClient::from_conf(builder.build()),
            model_id: config.model_id.clone(),
        }
    }
}

#[async_trait]
impl TextGenerator for BedrockTextGenerator {
    #[instrument(skip(self, prompt, params), fields(model_id = %self.model_id))]
    async fn invoke(&self, prompt: &str, params: &GenerationParams) -> Result<String, ServiceError> {
        let body = encode_request(prompt, params)?;

        let response = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type(CONTENT_TYPE)
            .accept(CONTENT_TYPE)
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| ServiceError::Request(DisplayErrorContext(&e).to_string()))?;

        let completion = decode_response(response.body().as_ref())?;

        debug!(completion_len = completion.len(), "Received completion");

        Ok(completion)
    }
}

fn encode_request(prompt: &str, params: &GenerationParams) -> Result<Vec<u8>, ServiceError> {
    serde_json::to_vec(&CompletionRequest::new(prompt, params))
        .map_err(|e| ServiceError::Request(format!("failed to encode request body: {e}")))
}

fn decode_response(body: &[u8]) -> Result<String, ServiceError> {
    let response: CompletionResponse =
        serde_json::from_slice(body).map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

    Ok(response.completion.unwrap_or_default())
}
