/// Provider client — the single point of entry for all vision-model calls.
///
/// ARCHITECTURAL RULE: No other module may call an inference provider
/// directly. Both analysis stages MUST go through a `FoodAnalyzer`.
///
/// Failures are surfaced to the caller as-is; there are no automatic retries.
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod prompts;

use crate::models::food::Food;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// Gemini model used for both analysis stages.
pub const GEMINI_MODEL: &str = "gemini-2.0-flash-exp";
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
/// OpenAI model for the image stage (supports vision input).
pub const OPENAI_VISION_MODEL: &str = "gpt-4-vision-preview";
/// OpenAI model for the text-only nutrition stage.
pub const OPENAI_TEXT_MODEL: &str = "gpt-4-turbo-preview";

const CALL_TIMEOUT_SECS: u64 = 60;
const IDENTIFY_MAX_TOKENS: u32 = 2048;
const NUTRITION_MAX_TOKENS: u32 = 4096;
const OPENAI_IDENTIFY_MAX_TOKENS: u32 = 1000;
const OPENAI_NUTRITION_MAX_TOKENS: u32 = 2000;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("network error calling provider: {0}")]
    Network(#[from] reqwest::Error),

    #[error("provider returned an empty response body")]
    EmptyResponse,

    #[error("provider error (status {status}): {body}")]
    Provider { status: u16, body: String },

    #[error("provider response envelope carries no text content")]
    MalformedResponse,

    #[error("provider text does not match the food schema: {0}")]
    Schema(String),
}

impl AnalysisError {
    /// Stable machine-readable code for the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::Network(_) => "NETWORK_ERROR",
            AnalysisError::EmptyResponse => "EMPTY_RESPONSE",
            AnalysisError::Provider { .. } => "PROVIDER_ERROR",
            AnalysisError::MalformedResponse => "MALFORMED_RESPONSE",
            AnalysisError::Schema(_) => "SCHEMA_ERROR",
        }
    }
}

/// The two-stage analysis contract. Stage 1 turns a photo into a dish draft
/// (name + products, no nutrition); stage 2 turns a product list into the
/// same dish with per-product and whole-dish nutrition filled in.
#[async_trait]
pub trait FoodAnalyzer: Send + Sync {
    async fn identify(&self, image_jpeg: &[u8]) -> Result<Food, AnalysisError>;
    async fn analyze_nutrition(&self, food: &Food) -> Result<Food, AnalysisError>;
}

// ── Gemini ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

impl GeminiRequest {
    fn for_parts(parts: Vec<GeminiPart>, max_output_tokens: u32) -> Self {
        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GenerationConfig {
                temperature: 0.4,
                top_k: 32,
                top_p: 1.0,
                max_output_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "topP")]
    top_p: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiTextPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiTextPart {
    text: Option<String>,
}

impl GeminiResponse {
    /// First candidate → content → first part → text. Anything missing along
    /// that path makes the envelope malformed.
    fn primary_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

/// Gemini-backed analyzer. The API key travels as a query parameter, per the
/// Generative Language API convention.
#[derive(Clone)]
pub struct GeminiAnalyzer {
    client: Client,
    api_key: String,
}

impl GeminiAnalyzer {
    pub fn new(api_key: String) -> Self {
        Self {
            client: build_http_client(),
            api_key,
        }
    }

    async fn generate(&self, request: &GeminiRequest) -> Result<Food, AnalysisError> {
        let url = format!(
            "{GEMINI_API_BASE}/{GEMINI_MODEL}:generateContent?key={}",
            self.api_key
        );
        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if body.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }
        if !status.is_success() {
            return Err(AnalysisError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: GeminiResponse =
            serde_json::from_str(&body).map_err(|_| AnalysisError::MalformedResponse)?;
        let text = envelope
            .primary_text()
            .ok_or(AnalysisError::MalformedResponse)?;
        parse_food_payload(text)
    }
}

#[async_trait]
impl FoodAnalyzer for GeminiAnalyzer {
    async fn identify(&self, image_jpeg: &[u8]) -> Result<Food, AnalysisError> {
        let request = GeminiRequest::for_parts(
            vec![
                GeminiPart::Text {
                    text: prompts::IDENTIFY_PROMPT.to_string(),
                },
                GeminiPart::InlineData {
                    inline_data: GeminiInlineData {
                        mime_type: "image/jpeg".to_string(),
                        data: BASE64.encode(image_jpeg),
                    },
                },
            ],
            IDENTIFY_MAX_TOKENS,
        );
        let food = self.generate(&request).await?;
        debug!(
            "identified dish '{}' with {} products",
            food.name,
            food.products.len()
        );
        Ok(food)
    }

    async fn analyze_nutrition(&self, food: &Food) -> Result<Food, AnalysisError> {
        let request = GeminiRequest::for_parts(
            vec![GeminiPart::Text {
                text: prompts::build_nutrition_prompt(food),
            }],
            NUTRITION_MAX_TOKENS,
        );
        let analyzed = self.generate(&request).await?;
        ensure_dish_nutrition(analyzed)
    }
}

// ── OpenAI ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: &'static str,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
}

impl OpenAiRequest {
    fn vision(prompt: String, image_jpeg: &[u8]) -> Self {
        Self {
            model: OPENAI_VISION_MODEL,
            messages: vec![OpenAiMessage {
                role: "user",
                content: OpenAiContent::Parts(vec![
                    OpenAiPart::Text { text: prompt },
                    OpenAiPart::ImageUrl {
                        image_url: OpenAiImageUrl {
                            url: format!(
                                "data:image/jpeg;base64,{}",
                                BASE64.encode(image_jpeg)
                            ),
                        },
                    },
                ]),
            }],
            max_tokens: OPENAI_IDENTIFY_MAX_TOKENS,
        }
    }

    fn text(prompt: String) -> Self {
        Self {
            model: OPENAI_TEXT_MODEL,
            messages: vec![OpenAiMessage {
                role: "user",
                content: OpenAiContent::Text(prompt),
            }],
            max_tokens: OPENAI_NUTRITION_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: OpenAiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiImageUrl },
}

#[derive(Debug, Serialize)]
struct OpenAiImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

impl OpenAiResponse {
    /// First choice → message → content.
    fn primary_text(&self) -> Option<&str> {
        self.choices.first()?.message.as_ref()?.content.as_deref()
    }
}

/// OpenAI-backed analyzer, a drop-in alternative to Gemini. Same extraction
/// contract, different envelope path and auth header.
#[derive(Clone)]
pub struct OpenAiAnalyzer {
    client: Client,
    api_key: String,
}

impl OpenAiAnalyzer {
    pub fn new(api_key: String) -> Self {
        Self {
            client: build_http_client(),
            api_key,
        }
    }

    async fn complete(&self, request: &OpenAiRequest) -> Result<Food, AnalysisError> {
        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if body.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }
        if !status.is_success() {
            return Err(AnalysisError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: OpenAiResponse =
            serde_json::from_str(&body).map_err(|_| AnalysisError::MalformedResponse)?;
        let text = envelope
            .primary_text()
            .ok_or(AnalysisError::MalformedResponse)?;
        parse_food_payload(text)
    }
}

#[async_trait]
impl FoodAnalyzer for OpenAiAnalyzer {
    async fn identify(&self, image_jpeg: &[u8]) -> Result<Food, AnalysisError> {
        let request = OpenAiRequest::vision(prompts::IDENTIFY_PROMPT.to_string(), image_jpeg);
        let food = self.complete(&request).await?;
        debug!(
            "identified dish '{}' with {} products",
            food.name,
            food.products.len()
        );
        Ok(food)
    }

    async fn analyze_nutrition(&self, food: &Food) -> Result<Food, AnalysisError> {
        let request = OpenAiRequest::text(prompts::build_nutrition_prompt(food));
        let analyzed = self.complete(&request).await?;
        ensure_dish_nutrition(analyzed)
    }
}

// ── Shared extraction ───────────────────────────────────────────────────────

fn build_http_client() -> Client {
    Client::builder()
        .connect_timeout(std::time::Duration::from_secs(CALL_TIMEOUT_SECS))
        .timeout(std::time::Duration::from_secs(CALL_TIMEOUT_SECS))
        .build()
        .expect("Failed to build HTTP client")
}

/// Parses the provider's text payload into a `Food`, stripping code fences
/// first. Model output that parses identically with and without fences is
/// the whole point of this step.
fn parse_food_payload(text: &str) -> Result<Food, AnalysisError> {
    let cleaned = strip_json_fences(text);
    serde_json::from_str(cleaned).map_err(|e| AnalysisError::Schema(e.to_string()))
}

/// A stage-2 response without the whole-dish block is useless downstream;
/// treat it as a schema violation rather than a partially analyzed dish.
fn ensure_dish_nutrition(food: Food) -> Result<Food, AnalysisError> {
    if food.nutrition.is_none() {
        return Err(AnalysisError::Schema(
            "missing whole-dish nutrition".to_string(),
        ));
    }
    Ok(food)
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn fenced_and_bare_payloads_parse_identically() {
        let bare = r#"{"name": "Salad", "products": [{"name": "Tomato", "weight": 80}]}"#;
        let fenced = format!("```json\n{bare}\n```");
        let a = parse_food_payload(bare).unwrap();
        let b = parse_food_payload(&fenced).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name, "Salad");
        assert_eq!(a.products[0].weight, 80.0);
        assert!(a.nutrition.is_none());
    }

    #[test]
    fn payload_not_matching_food_schema_is_a_schema_error() {
        let err = parse_food_payload(r#"{"dish": "Salad"}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::Schema(_)));
    }

    #[test]
    fn stage_two_payload_without_dish_nutrition_is_rejected() {
        let food: Food = serde_json::from_str(
            r#"{"name": "Salad", "products": [{"name": "Tomato", "weight": 80}]}"#,
        )
        .unwrap();
        assert!(matches!(
            ensure_dish_nutrition(food),
            Err(AnalysisError::Schema(_))
        ));
    }

    #[test]
    fn gemini_envelope_text_extraction_follows_the_first_candidate() {
        let envelope: GeminiResponse = serde_json::from_str(
            r#"{
                "candidates": [
                    {"content": {"parts": [{"text": "first"}, {"text": "second"}]}},
                    {"content": {"parts": [{"text": "other candidate"}]}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(envelope.primary_text(), Some("first"));
    }

    #[test]
    fn gemini_envelope_without_candidates_has_no_text() {
        let envelope: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert_eq!(envelope.primary_text(), None);

        let envelope: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert_eq!(envelope.primary_text(), None);
    }

    #[test]
    fn openai_envelope_text_extraction_follows_the_first_choice() {
        let envelope: OpenAiResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "payload"}}]}"#,
        )
        .unwrap();
        assert_eq!(envelope.primary_text(), Some("payload"));

        let empty: OpenAiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(empty.primary_text(), None);
    }

    #[test]
    fn gemini_identify_request_carries_prompt_image_and_config() {
        let request = GeminiRequest::for_parts(
            vec![
                GeminiPart::Text {
                    text: prompts::IDENTIFY_PROMPT.to_string(),
                },
                GeminiPart::InlineData {
                    inline_data: GeminiInlineData {
                        mime_type: "image/jpeg".to_string(),
                        data: BASE64.encode(b"fake-jpeg-bytes"),
                    },
                },
            ],
            IDENTIFY_MAX_TOKENS,
        );
        let value = serde_json::to_value(&request).unwrap();

        let parts = &value["contents"][0]["parts"];
        assert!(parts[0]["text"]
            .as_str()
            .unwrap()
            .contains("ONLY valid JSON"));
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(
            parts[1]["inline_data"]["data"],
            BASE64.encode(b"fake-jpeg-bytes")
        );

        let config = &value["generationConfig"];
        assert_eq!(config["temperature"], 0.4);
        assert_eq!(config["topK"], 32);
        assert_eq!(config["topP"], 1.0);
        assert_eq!(config["maxOutputTokens"], 2048);
    }

    #[test]
    fn gemini_nutrition_request_is_text_only_with_larger_budget() {
        let request = GeminiRequest::for_parts(
            vec![GeminiPart::Text {
                text: "prompt".to_string(),
            }],
            NUTRITION_MAX_TOKENS,
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"].as_array().unwrap().len(), 1);
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[test]
    fn openai_vision_request_embeds_the_image_as_a_data_url() {
        let request = OpenAiRequest::vision("prompt".to_string(), b"fake-jpeg-bytes");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], OPENAI_VISION_MODEL);
        assert_eq!(value["max_tokens"], 1000);
        let content = &value["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        let url = content[1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));

        let text_request = OpenAiRequest::text("prompt".to_string());
        let text_value = serde_json::to_value(&text_request).unwrap();
        assert_eq!(text_value["model"], OPENAI_TEXT_MODEL);
        assert_eq!(text_value["messages"][0]["content"], "prompt");
    }
}
