// src/gemini.rs

use crate::config::GenerationSettings;
use crate::error::{AppError, Result};
use crate::key_manager::preview;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const API_VERSION: &str = "v1beta";
const MAX_LOGGED_BODY: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part { text: text.into() }],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    pub max_output_tokens: u32,
}

impl From<&GenerationSettings> for GenerationConfig {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            temperature: settings.temperature,
            top_p: settings.top_p,
            max_output_tokens: settings.max_output_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

fn default_safety_settings() -> Vec<SafetySetting> {
    const CATEGORIES: [&str; 4] = [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ];
    CATEGORIES
        .iter()
        .map(|&category| SafetySetting {
            category,
            threshold: "BLOCK_ONLY_HIGH",
        })
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    generation_config: &'a GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

/// Outbound generateContent client bound to a single API key.
///
/// Instances are cheap (the underlying connection pool is shared through the
/// cloned `reqwest::Client`), so the orchestrator can drop and lazily
/// recreate one whenever its key leaves rotation.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    key: Secret<String>,
    generation: GenerationConfig,
}

impl GeminiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        key: Secret<String>,
        generation: GenerationConfig,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            key,
            generation,
        }
    }

    /// Sends one generateContent call and returns the trimmed text of the
    /// first candidate. Upstream rejections are mapped to the relay's error
    /// taxonomy so the orchestrator can pick a recovery policy.
    #[instrument(level = "debug", skip(self, contents), fields(model = model))]
    pub async fn generate(&self, model: &str, contents: &[Content]) -> Result<String> {
        let url = format!(
            "{}/{}/models/{}:generateContent",
            self.base_url, API_VERSION, model
        );
        let request = GenerateContentRequest {
            contents,
            generation_config: &self.generation,
            safety_settings: default_safety_settings(),
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", self.key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.classify_failure(status, &body, model));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let text = extract_text(&parsed);
        debug!(reply_len = text.len(), "Received model reply");
        Ok(text)
    }

    fn classify_failure(&self, status: StatusCode, body: &str, model: &str) -> AppError {
        let key_preview = preview(self.key.expose_secret());

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            AppError::KeyRejected { key_preview }
        } else if status == StatusCode::BAD_REQUEST
            && (body.contains("API_KEY_INVALID") || body.contains("API key not valid"))
        {
            AppError::KeyRejected { key_preview }
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            AppError::KeyQuotaExhausted { key_preview }
        } else if status == StatusCode::NOT_FOUND {
            AppError::ModelUnavailable {
                model: model.to_string(),
            }
        } else if status.is_server_error() {
            AppError::ServerBusy {
                status: status.as_u16(),
            }
        } else {
            let mut body = body.to_string();
            body.truncate(MAX_LOGGED_BODY);
            AppError::UpstreamServiceError {
                status: status.as_u16(),
                body,
            }
        }
    }
}

fn extract_text(response: &GenerateContentResponse) -> String {
    response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .map(|part| part.text.as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
        .trim()
        .to_string()
}
