//! OpenAI-compatible chat-completions client for email analysis.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::llm::{EmailInsights, InsightProvider, InsightSource, redacted_payload};
use crate::message::InboundEmail;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SYSTEM_PROMPT: &str = r#"You analyze one inbound business email and return ONLY a JSON object:
{"summary": "<one sentence>", "topics": ["<topic>", ...], "action_items": ["<item>", ...], "urgent": true|false}
No prose, no markdown fences."#;

/// Insight provider backed by an OpenAI-compatible chat-completions API.
pub struct OpenAiInsightProvider {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl OpenAiInsightProvider {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    /// Point at a non-default endpoint (self-hosted compatible servers).
    pub fn with_base_url(
        api_key: SecretString,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl InsightProvider for OpenAiInsightProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn analyze(&self, email: &InboundEmail) -> Result<EmailInsights, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: redacted_payload(email),
                },
            ],
            max_completion_tokens: 512,
        };

        debug!(model = %self.model, "Requesting email analysis");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 429 and 5xx are worth one retry; other rejections are not.
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(ProviderError::Transient(format!("{status}: {body}")));
            }
            return Err(ProviderError::Rejected(format!("{status}: {body}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("response body: {e}")))?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in response".into()))?;

        parse_insights(content)
    }
}

/// Parse the model's JSON reply, tolerating markdown wrapping.
fn parse_insights(raw: &str) -> Result<EmailInsights, ProviderError> {
    let json_str = extract_json_object(raw);
    let parsed: InsightsJson = serde_json::from_str(&json_str)
        .map_err(|e| ProviderError::InvalidResponse(format!("JSON parse error: {e}")))?;

    if parsed.summary.trim().is_empty() {
        return Err(ProviderError::InvalidResponse("empty summary".into()));
    }

    Ok(EmailInsights {
        summary: parsed.summary,
        topics: parsed.topics,
        action_items: parsed.action_items,
        urgent: parsed.urgent,
        source: InsightSource::Provider,
    })
}

/// Extract a JSON object from model output (handles markdown fences).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_completion_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct InsightsJson {
    summary: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    action_items: Vec<String>,
    #[serde(default)]
    urgent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let insights = parse_insights(
            r#"{"summary": "Customer asks about invoice", "topics": ["billing"], "action_items": ["Resend invoice"], "urgent": false}"#,
        )
        .unwrap();
        assert_eq!(insights.summary, "Customer asks about invoice");
        assert_eq!(insights.topics, vec!["billing"]);
        assert_eq!(insights.source, InsightSource::Provider);
    }

    #[test]
    fn parses_markdown_wrapped_json() {
        let raw = "Here you go:\n```json\n{\"summary\": \"Outage report\", \"urgent\": true}\n```";
        let insights = parse_insights(raw).unwrap();
        assert_eq!(insights.summary, "Outage report");
        assert!(insights.urgent);
        assert!(insights.topics.is_empty());
    }

    #[test]
    fn recovers_object_from_surrounding_text() {
        let raw = "The analysis is {\"summary\": \"Question about pricing\"} as requested.";
        let insights = parse_insights(raw).unwrap();
        assert_eq!(insights.summary, "Question about pricing");
    }

    #[test]
    fn empty_summary_is_invalid() {
        let result = parse_insights(r#"{"summary": "  "}"#);
        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }

    #[test]
    fn garbage_is_invalid() {
        let result = parse_insights("I could not analyze this email.");
        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }
}
