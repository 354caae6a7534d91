//! Image generation through the Imagen models of the Gemini API.
//!
//! The [`ImageGenerator`] trait is the seam the session talks to;
//! [`GeminiImageClient`] is the HTTP implementation. Failures are mapped to
//! the credential, quota and content-policy variants of [`AppError`] and
//! are never retried.

use crate::catalog::DEFAULT_IMAGE_MODEL;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use log::{debug, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// Most images a single request may ask for.
pub const MAX_IMAGES: u32 = 4;

/// Parameters of one generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub api_key: String,
    pub model: String,
    pub count: u32,
}

impl GenerationRequest {
    /// Requested image count clamped to `1..=MAX_IMAGES`.
    pub fn clamped_count(&self) -> u32 {
        self.count.clamp(1, MAX_IMAGES)
    }

    /// The model to call, falling back to the default when blank.
    pub fn effective_model(&self) -> &str {
        if self.model.trim().is_empty() {
            warn!("model name is missing, defaulting to {}", DEFAULT_IMAGE_MODEL);
            DEFAULT_IMAGE_MODEL
        } else {
            self.model.trim()
        }
    }
}

/// Produces encoded images from a text prompt.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns between one and four encoded images.
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Vec<u8>>>;
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: [Instance<'a>; 1],
    parameters: Parameters,
}

#[derive(Serialize)]
struct Instance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    sample_count: u32,
    output_mime_type: &'static str,
}

#[derive(Deserialize, Default)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// HTTP client for the Imagen `:predict` endpoint.
pub struct GeminiImageClient {
    client: reqwest::Client,
    base_url: url::Url,
}

impl GeminiImageClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BASE_URL)
    }

    /// Points the client at another API root, e.g. a proxy.
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let base_url = url::Url::parse(base_url)
            .map_err(|e| AppError::config(format!("Invalid base URL: {}", e)))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, model: &str) -> Result<url::Url> {
        let model = model.strip_prefix("models/").unwrap_or(model);
        self.base_url
            .join(&format!("models/{}:predict", model))
            .map_err(|e| AppError::config(format!("Invalid model name {}: {}", model, e)))
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Vec<u8>>> {
        if request.api_key.trim().is_empty() {
            return Err(AppError::MissingCredential);
        }

        let model = request.effective_model();
        let body = PredictRequest {
            instances: [Instance {
                prompt: &request.prompt,
            }],
            parameters: Parameters {
                sample_count: request.clamped_count(),
                output_mime_type: "image/png",
            },
        };

        debug!("requesting {} image(s) from {}", body.parameters.sample_count, model);
        let response = self
            .client
            .post(self.endpoint(model)?)
            .header("x-goog-api-key", request.api_key.trim())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(classify_failure(Some(status), &error_message(&text)));
        }

        let parsed: PredictResponse = serde_json::from_str(&text)?;
        decode_predictions(parsed)
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => {
            format!("{} ({})", envelope.error.message, envelope.error.status)
        }
        _ => body.trim().to_string(),
    }
}

fn decode_predictions(response: PredictResponse) -> Result<Vec<Vec<u8>>> {
    let images: Vec<Vec<u8>> = response
        .predictions
        .into_iter()
        .filter_map(|p| p.bytes_base64_encoded)
        .filter_map(|data| match BASE64.decode(data.as_bytes()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("dropping undecodable prediction: {}", e);
                None
            }
        })
        .collect();

    if images.is_empty() {
        return Err(AppError::ContentRejected);
    }
    Ok(images)
}

/// Maps an API failure onto the error taxonomy.
pub fn classify_failure(status: Option<StatusCode>, message: &str) -> AppError {
    let lower = message.to_lowercase();

    if lower.contains("api key not valid")
        || lower.contains("invalid api key")
        || lower.contains("permission denied")
        || lower.contains("permission_denied")
        || matches!(
            status,
            Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN)
        )
    {
        return AppError::InvalidCredential;
    }

    if lower.contains("quota") || status == Some(StatusCode::TOO_MANY_REQUESTS) {
        return AppError::QuotaExceeded;
    }

    AppError::gemini(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(api_key: &str, model: &str, count: u32) -> GenerationRequest {
        GenerationRequest {
            prompt: "a fox".into(),
            api_key: api_key.into(),
            model: model.into(),
            count,
        }
    }

    #[test]
    fn count_is_clamped() {
        assert_eq!(request("k", "m", 0).clamped_count(), 1);
        assert_eq!(request("k", "m", 3).clamped_count(), 3);
        assert_eq!(request("k", "m", 9).clamped_count(), 4);
    }

    #[test]
    fn blank_model_uses_default() {
        assert_eq!(request("k", "  ", 1).effective_model(), DEFAULT_IMAGE_MODEL);
        assert_eq!(request("k", "custom", 1).effective_model(), "custom");
    }

    #[test]
    fn endpoint_strips_models_prefix() {
        let client = GeminiImageClient::new().unwrap();
        let url = client.endpoint("models/imagen-3.0-generate-002").unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/imagen-3.0-generate-002:predict"
        );
    }

    #[test]
    fn request_body_shape() {
        let body = PredictRequest {
            instances: [Instance { prompt: "x" }],
            parameters: Parameters {
                sample_count: 4,
                output_mime_type: "image/png",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["instances"][0]["prompt"], "x");
        assert_eq!(json["parameters"]["sampleCount"], 4);
        assert_eq!(json["parameters"]["outputMimeType"], "image/png");
    }

    #[test]
    fn classifies_credential_failures() {
        let err = classify_failure(
            Some(StatusCode::BAD_REQUEST),
            "API key not valid. Please pass a valid API key.",
        );
        assert!(matches!(err, AppError::InvalidCredential));
        assert!(matches!(
            classify_failure(Some(StatusCode::FORBIDDEN), "nope"),
            AppError::InvalidCredential
        ));
    }

    #[test]
    fn classifies_quota_failures() {
        assert!(matches!(
            classify_failure(Some(StatusCode::TOO_MANY_REQUESTS), "slow down"),
            AppError::QuotaExceeded
        ));
        assert!(matches!(
            classify_failure(None, "Quota exceeded for metric"),
            AppError::QuotaExceeded
        ));
    }

    #[test]
    fn other_failures_keep_the_message() {
        match classify_failure(Some(StatusCode::INTERNAL_SERVER_ERROR), "backend down") {
            AppError::GeminiApi(msg) => assert_eq!(msg, "backend down"),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn error_envelope_is_unwrapped() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(error_message(body), "API key not valid. (INVALID_ARGUMENT)");
        assert_eq!(error_message(" plain text "), "plain text");
    }

    #[test]
    fn empty_predictions_are_content_rejection() {
        let parsed: PredictResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            decode_predictions(parsed),
            Err(AppError::ContentRejected)
        ));
    }

    #[test]
    fn predictions_are_base64_decoded() {
        let parsed: PredictResponse = serde_json::from_str(
            r#"{"predictions":[{"bytesBase64Encoded":"aGVsbG8=","mimeType":"image/png"},{"raiFilteredReason":"x"}]}"#,
        )
        .unwrap();
        let images = decode_predictions(parsed).unwrap();
        assert_eq!(images, vec![b"hello".to_vec()]);
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = GeminiImageClient::new().unwrap();
        let err = client.generate(&request("   ", "m", 1)).await.unwrap_err();
        assert!(matches!(err, AppError::MissingCredential));
    }
}
