use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GeminiConfig;
use crate::prompting;
use crate::types::{ChatMessage, HistoryTurn, LeadAnalysis, PipelineStats, Sender, Sentiment, User};

#[derive(Debug, Error)]
pub enum AiError {
    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("model returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("empty model response")]
    EmptyResponse,
    #[error("malformed model output: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The four model calls the server makes. Handlers and the pipeline only see
/// this trait, so tests can script outcomes without a network.
#[async_trait]
pub trait SalesAssistant: Send + Sync {
    /// Classifies one inbound customer message into intent, sentiment and a
    /// 0-100 conversion score.
    async fn analyze_lead_message(&self, message: &str) -> Result<LeadAnalysis, AiError>;

    /// Drafts a reply to `new_message` in the voice of the tenant's business,
    /// given the prior turns of the thread.
    async fn generate_auto_response(
        &self,
        profile: &User,
        history: &[HistoryTurn],
        new_message: &str,
    ) -> Result<String, AiError>;

    async fn summarize_conversation(&self, messages: &[ChatMessage]) -> Result<String, AiError>;

    async fn lead_health_brief(&self, stats: PipelineStats) -> Result<String, AiError>;
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnalysisWire {
    intent: String,
    sentiment: String,
    #[serde(rename = "leadScore")]
    lead_score: i64,
}

fn user_turn(text: String) -> Content {
    Content {
        role: "user",
        parts: vec![Part { text }],
    }
}

fn model_turn(text: String) -> Content {
    Content {
        role: "model",
        parts: vec![Part { text }],
    }
}

/// Strips an optional ```json fence the model sometimes wraps its output in.
fn strip_code_fence(text: &str) -> &str {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").unwrap()
    });
    match fence.captures(text) {
        Some(captures) => captures.get(1).map_or(text, |m| m.as_str()),
        None => text.trim(),
    }
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> GeminiClient {
        GeminiClient {
            client: Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        }
    }

    async fn generate(
        &self,
        contents: Vec<Content>,
        generation_config: Option<GenerationConfig>,
    ) -> Result<String, AiError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let request = GeminiRequest {
            contents,
            generation_config,
        };
        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: GeminiResponse = response.json().await?;
        parsed
            .candidates
            .and_then(|mut c| c.drain(..).next().and_then(|c| c.content))
            .and_then(|c| c.parts)
            .and_then(|mut p| p.drain(..).next().and_then(|p| p.text))
            .filter(|t| !t.trim().is_empty())
            .ok_or(AiError::EmptyResponse)
    }
}

#[async_trait]
impl SalesAssistant for GeminiClient {
    async fn analyze_lead_message(&self, message: &str) -> Result<LeadAnalysis, AiError> {
        let prompt = prompting::render_classify_prompt(message);
        let text = self
            .generate(
                vec![user_turn(prompt)],
                Some(GenerationConfig {
                    temperature: 0.2,
                    max_output_tokens: 256,
                    response_mime_type: Some("application/json".to_string()),
                }),
            )
            .await?;
        let wire: AnalysisWire = serde_json::from_str(strip_code_fence(&text))?;
        Ok(LeadAnalysis {
            intent: wire.intent,
            sentiment: Sentiment::parse_or_neutral(&wire.sentiment),
            lead_score: wire.lead_score.clamp(0, 100) as i32,
        })
    }

    async fn generate_auto_response(
        &self,
        profile: &User,
        history: &[HistoryTurn],
        new_message: &str,
    ) -> Result<String, AiError> {
        // The system context rides as the first user turn, acknowledged by a
        // scripted model turn, then the real thread follows.
        let mut contents = vec![
            user_turn(format!(
                "SYSTEM PROMPT: {}",
                prompting::render_auto_reply_context(profile)
            )),
            model_turn("Understood. I will act as the AI agent.".to_string()),
        ];
        for turn in history {
            let content = match turn.sender {
                Sender::Ai => model_turn(turn.text.clone()),
                _ => user_turn(turn.text.clone()),
            };
            contents.push(content);
        }
        contents.push(user_turn(new_message.to_string()));
        let text = self.generate(contents, None).await?;
        Ok(text.trim().to_string())
    }

    async fn summarize_conversation(&self, messages: &[ChatMessage]) -> Result<String, AiError> {
        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.sender.as_str().to_uppercase(), m.text))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = prompting::render_summary_prompt(&transcript);
        let text = self.generate(vec![user_turn(prompt)], None).await?;
        Ok(text.trim().to_string())
    }

    async fn lead_health_brief(&self, stats: PipelineStats) -> Result<String, AiError> {
        let prompt = prompting::render_health_brief_prompt(&stats);
        let text = self.generate(vec![user_turn(prompt)], None).await?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::new(&GeminiConfig {
            api_key: "test-key".to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: server.uri(),
        })
    }

    fn candidates_with(text: &str) -> serde_json::Value {
        json!({
            "candidates": [
                { "content": { "parts": [ { "text": text } ] } }
            ]
        })
    }

    #[test]
    fn fence_stripping_handles_plain_and_fenced_json() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn analyze_parses_fenced_output_and_clamps_score() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidates_with(
                "```json\n{\"intent\":\"Asking about pricing\",\"sentiment\":\"positive\",\"leadScore\":150}\n```",
            )))
            .mount(&server)
            .await;

        let analysis = client_for(&server)
            .analyze_lead_message("What are your prices?")
            .await
            .unwrap();
        assert_eq!(analysis.intent, "Asking about pricing");
        assert_eq!(analysis.sentiment, Sentiment::Positive);
        assert_eq!(analysis.lead_score, 100);
    }

    #[tokio::test]
    async fn analyze_surfaces_upstream_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .analyze_lead_message("hello")
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Upstream { status: 500, .. }));
    }

    #[tokio::test]
    async fn analyze_rejects_non_json_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(candidates_with("I cannot answer that.")),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .analyze_lead_message("hello")
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Malformed(_)));
    }

    #[tokio::test]
    async fn empty_candidates_map_to_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .summarize_conversation(&[])
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::EmptyResponse));
    }
}
