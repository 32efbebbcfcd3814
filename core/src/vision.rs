//! Adapter for an OpenAI-compatible vision chat-completions endpoint.
//!
//! One photo in, one classified result out: validated [`NutritionFacts`] or an
//! [`AnalysisError`]. Nothing here touches the history store.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, ConfigError};
use crate::models::{NutritionFacts, json_type_name, validate_nutrition};
use crate::prompts::NUTRITION_ANALYSIS_PROMPT;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const TEMPERATURE: f64 = 0.2;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// How much raw model output to echo back in a MalformedResponse message.
const RAW_EXCERPT_CHARS: usize = 200;

/// Anything that can turn a food photo into nutrition facts.
#[async_trait]
pub trait FoodImageAnalyzer: Send + Sync {
    async fn analyze(&self, image: &[u8]) -> Result<NutritionFacts, AnalysisError>;
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub base_url: String,
    pub timeout: Duration,
}

impl AnalyzerConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: TEMPERATURE,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// --- Client ---

#[derive(Debug, Clone)]
pub struct VisionClient {
    client: Client,
    config: AnalyzerConfig,
}

impl VisionClient {
    pub fn new(config: AnalyzerConfig) -> Result<Self, ConfigError> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Point the client at a different endpoint (mock servers, proxies).
    pub fn with_base_url(
        mut config: AnalyzerConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        config.base_url = base_url.into();
        Self::new(config)
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send one photo and classify what comes back. Exactly one HTTP request,
    /// no retries.
    pub async fn analyze_image(&self, image: &[u8]) -> Result<NutritionFacts, AnalysisError> {
        info!(model = %self.config.model, bytes = image.len(), "Analyzing food image");

        let content = self.complete(image).await?;
        debug!(content = %content, "Vision model output");

        let result = classify_output(&content);
        match &result {
            Ok(facts) => info!(
                food = %facts.food_name,
                calories = facts.calories,
                confidence = %facts.confidence,
                "Analyzed food image"
            ),
            Err(e) => warn!(kind = %e.kind(), error = %e.message(), "Image analysis rejected"),
        }
        result
    }

    async fn complete(&self, image: &[u8]) -> Result<String, AnalysisError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: NUTRITION_ANALYSIS_PROMPT,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_data_url(image),
                        },
                    },
                ],
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| service_failure(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .map_or(body, |e| e.message);
            warn!(status = status.as_u16(), message = %message, "Vision service error");
            return Err(AnalysisError::ServiceFailure(format!(
                "HTTP {}: {message}",
                status.as_u16()
            )));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| service_failure(&e))?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                AnalysisError::ServiceFailure("response contained no message content".to_string())
            })
    }
}

#[async_trait]
impl FoodImageAnalyzer for VisionClient {
    async fn analyze(&self, image: &[u8]) -> Result<NutritionFacts, AnalysisError> {
        self.analyze_image(image).await
    }
}

fn service_failure(err: &reqwest::Error) -> AnalysisError {
    let message = if err.is_timeout() {
        format!("request timed out: {err}")
    } else {
        err.to_string()
    };
    AnalysisError::ServiceFailure(message)
}

// --- Pure helpers ---

/// Best-effort media type from leading magic bytes. Falls back to JPEG.
#[must_use]
pub fn sniff_media_type(image: &[u8]) -> &'static str {
    match image {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}

#[must_use]
pub fn image_data_url(image: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        sniff_media_type(image),
        STANDARD.encode(image)
    )
}

/// Classify raw model text.
///
/// Order matters: unparseable output is `MalformedResponse`; an object that
/// fails validation but carries `error` is `NotFood`; any other validation
/// failure is `SchemaViolation`.
pub fn classify_output(content: &str) -> Result<NutritionFacts, AnalysisError> {
    let value: Value = serde_json::from_str(content.trim()).map_err(|e| {
        AnalysisError::MalformedResponse(format!(
            "{e}; output began: {}",
            excerpt(content, RAW_EXCERPT_CHARS)
        ))
    })?;

    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(AnalysisError::MalformedResponse(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            )));
        }
    };

    validate_nutrition(&object).map_err(|violation| match object.get("error") {
        Some(reason) => AnalysisError::NotFood(render_reason(reason)),
        None => violation,
    })
}

fn render_reason(reason: &Value) -> String {
    match reason {
        Value::String(s) if s.trim().is_empty() => "no explanation given".to_string(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
