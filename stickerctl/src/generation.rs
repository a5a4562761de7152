//! Sticker image generation through an external prediction API.
//!
//! The provider is a trait so the billable flow can be exercised without network access.
//! [`HttpGenerationProvider`] speaks the Replicate-style predictions protocol:
//!
//! ```text
//! POST {url}
//! Authorization: Bearer {api_token}
//! Prefer: wait
//!
//! { "version": "...", "input": { "prompt": "...", "width": 1152, ... } }
//!
//! -> { "status": "succeeded", "output": ["https://.../sticker.webp"] }
//! ```
//!
//! Failures are reported as-is; there is no retry.

use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::config::GenerationConfig;

#[derive(Error, Debug)]
pub enum GenerationError {
    /// No API token configured
    #[error("Generation provider is not configured")]
    NotConfigured,

    /// Could not reach the provider or read its response
    #[error("Generation provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider answered with a non-success HTTP status
    #[error("Generation provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Provider reported a failed prediction
    #[error("Generation failed: {0}")]
    Failed(String),

    /// Provider answered without any image
    #[error("Generation provider returned no output")]
    EmptyOutput,
}

/// What to generate
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationRequest {
    pub prompt: String,
}

/// A completed generation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationOutput {
    pub prompt: String,
    /// URLs of the generated images, as returned by the provider
    pub image_urls: Vec<String>,
}

#[async_trait::async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, GenerationError>;
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
    steps: u32,
    output_format: &'a str,
    output_quality: u32,
    negative_prompt: &'a str,
    number_of_images: u32,
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Option<PredictionOutput>,
    #[serde(default)]
    error: Option<String>,
}

/// Models return either a list of URLs or a single URL
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictionOutput {
    Many(Vec<String>),
    One(String),
}

impl PredictionOutput {
    fn into_urls(self) -> Vec<String> {
        match self {
            PredictionOutput::Many(urls) => urls,
            PredictionOutput::One(url) => vec![url],
        }
    }
}

/// Calls the configured predictions endpoint over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpGenerationProvider {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl HttpGenerationProvider {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        // No-op when main has already installed it
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl GenerationProvider for HttpGenerationProvider {
    #[instrument(skip_all, err)]
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, GenerationError> {
        let token = self.config.api_token.as_deref().ok_or(GenerationError::NotConfigured)?;
        let auth = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| GenerationError::NotConfigured)?;

        let body = PredictionRequest {
            version: &self.config.model_version,
            input: PredictionInput {
                prompt: &request.prompt,
                width: self.config.width,
                height: self.config.height,
                steps: self.config.steps,
                output_format: &self.config.output_format,
                output_quality: self.config.output_quality,
                negative_prompt: &self.config.negative_prompt,
                number_of_images: self.config.number_of_images,
            },
        };

        let response = self
            .client
            .post(self.config.url.clone())
            .header(AUTHORIZATION, auth)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let prediction: PredictionResponse = response.json().await?;
        if let Some(error) = prediction.error.filter(|e| !e.is_empty()) {
            return Err(GenerationError::Failed(error));
        }
        if let Some(state) = prediction.status.as_deref()
            && matches!(state, "failed" | "canceled")
        {
            return Err(GenerationError::Failed(format!("prediction {state}")));
        }

        let image_urls = prediction.output.map(PredictionOutput::into_urls).unwrap_or_default();
        if image_urls.is_empty() {
            return Err(GenerationError::EmptyOutput);
        }

        debug!(images = image_urls.len(), "Generation completed");
        Ok(GenerationOutput {
            prompt: request.prompt.clone(),
            image_urls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path},
    };

    fn provider_for(server: &MockServer, token: Option<&str>) -> HttpGenerationProvider {
        let config = GenerationConfig {
            url: Url::parse(&format!("{}/v1/predictions", server.uri())).unwrap(),
            api_token: token.map(str::to_string),
            model_version: "test-version".to_string(),
            ..Default::default()
        };
        HttpGenerationProvider::new(config).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "a happy cat".to_string(),
        }
    }

    #[tokio::test]
    async fn test_successful_generation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/predictions"))
            .and(header("authorization", "Bearer r8_test"))
            .and(body_partial_json(serde_json::json!({
                "version": "test-version",
                "input": { "prompt": "a happy cat", "width": 1152, "number_of_images": 1 }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "status": "succeeded",
                "output": ["https://cdn.example.com/cat.webp"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = provider_for(&server, Some("r8_test")).generate(&request()).await.unwrap();
        assert_eq!(output.image_urls, vec!["https://cdn.example.com/cat.webp"]);
        assert_eq!(output.prompt, "a happy cat");
    }

    #[tokio::test]
    async fn test_single_url_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": "https://cdn.example.com/one.png"
            })))
            .mount(&server)
            .await;

        let output = provider_for(&server, Some("t")).generate(&request()).await.unwrap();
        assert_eq!(output.image_urls.len(), 1);
    }

    #[tokio::test]
    async fn test_error_status_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad input"))
            .mount(&server)
            .await;

        let err = provider_for(&server, Some("t")).generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Status { status: 422, ref body } if body == "bad input"));
    }

    #[tokio::test]
    async fn test_failed_prediction_and_empty_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "failed",
                "error": "NSFW content detected"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "output": [] })))
            .mount(&server)
            .await;

        let provider = provider_for(&server, Some("t"));
        assert!(matches!(provider.generate(&request()).await, Err(GenerationError::Failed(_))));
        assert!(matches!(provider.generate(&request()).await, Err(GenerationError::EmptyOutput)));
    }

    #[tokio::test]
    async fn test_missing_token_never_calls_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = provider_for(&server, None).generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured));
    }
}
