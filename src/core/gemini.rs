//! Minimal blocking client for the Gemini `generateContent` REST endpoint.
//!
//! Requests are built from text and inline (base64) media parts. Each call
//! walks the configured model list in order and returns the first success.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{info, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("GEMINI_API_KEY not configured")]
    MissingApiKey,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gemini API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("No content in Gemini response")]
    EmptyResponse,
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: &'a [Part],
}

/// One request part: plain text or inline media.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline(mime_type: &str, bytes: &[u8]) -> Self {
        Part::Inline {
            inline_data: InlineData {
                mime_type: mime_type.to_string(),
                data: BASE64.encode(bytes),
            },
        }
    }

    pub fn from_file(mime_type: &str, path: &Path) -> Result<Self, GeminiError> {
        let bytes = std::fs::read(path).map_err(|source| GeminiError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::inline(mime_type, &bytes))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Concatenated text of the first candidate.
fn response_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    Some(text)
}

#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    models: Vec<String>,
    client: Client,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, models: Vec<String>) -> Result<Self, GeminiError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(GeminiError::MissingApiKey)?;

        let client = Client::builder().timeout(Duration::from_secs(300)).build()?;

        Ok(Self {
            api_key,
            models,
            client,
        })
    }

    /// Tries each model in order; returns the last error if all fail.
    pub fn generate(&self, parts: &[Part]) -> Result<String, GeminiError> {
        let mut last_error = None;

        for model in &self.models {
            info!("🤖 Calling Gemini model: {}", model);
            match self.call_model(model, parts) {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!("⚠️ Gemini model {} failed: {}", model, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(GeminiError::EmptyResponse))
    }

    fn call_model(&self, model: &str, parts: &[Part]) -> Result<String, GeminiError> {
        let url = format!("{}/{}:generateContent", API_BASE, model);
        let request = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GeminiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json()?;
        response_text(parsed).ok_or(GeminiError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_serialization() {
        let parts = vec![Part::text("hello"), Part::inline("image/jpeg", b"abc")];
        let request = GenerateRequest {
            contents: vec![Content { parts: &parts }],
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(
            json["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/jpeg"
        );
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["data"], "YWJj");
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"a "},{"text":"b"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response_text(response).as_deref(), Some("a b"));
    }

    #[test]
    fn test_response_without_candidates() {
        let response: GenerateResponse = serde_json::from_str(r#"{"promptFeedback":{}}"#).unwrap();
        assert_eq!(response_text(response), None);
    }

    #[test]
    fn test_missing_api_key() {
        let err = GeminiClient::new(None, vec!["m".into()]).err().unwrap();
        assert!(matches!(err, GeminiError::MissingApiKey));
        assert!(GeminiClient::new(Some("  ".into()), vec![]).is_err());
    }
}
