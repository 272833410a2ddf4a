//! Reply backend.
//!
//! `LlmClient` is the seam between the viewer and the model service. The
//! only implementation talks to the Gemini `generateContent` endpoint with
//! thinking enabled, splitting the returned parts into a thought summary
//! and the visible answer.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, bail};
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;

use crate::config::LlmConfig;
use crate::transcript::{ChatMessage, Sender};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub answer: String,
    pub thought: Option<String>,
}

/// Returned (inside `anyhow::Error`) when a request was stopped by the user.
#[derive(Debug)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Request aborted")
    }
}

impl std::error::Error for Cancelled {}

pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Cancelled>().is_some()
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.is_cancelled() {
            return Err(Cancelled.into());
        }
        Ok(())
    }
}

pub trait LlmClient: Send + Sync {
    /// Produce a reply to the conversation in `history`, whose last user
    /// message is the prompt. Placeholders in `history` are skipped.
    fn send(&self, history: &[ChatMessage], cancel: &CancelToken) -> anyhow::Result<Reply>;
}

/// Stand-in used when no backend could be configured; every request fails
/// with the configuration error so the transcript stays browsable.
pub struct Unavailable {
    reason: String,
}

impl Unavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl LlmClient for Unavailable {
    fn send(&self, _history: &[ChatMessage], cancel: &CancelToken) -> anyhow::Result<Reply> {
        cancel.check()?;
        bail!("{}", self.reason)
    }
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    agent: ureq::Agent,
    config: LlmConfig,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).with_context(|| {
            format!(
                "{} is not set (required to talk to {})",
                config.api_key_env, config.model
            )
        })?;
        if api_key.trim().is_empty() {
            bail!("{} is empty", config.api_key_env);
        }
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false)
            .build()
            .into();
        info!(
            "llm: gemini client for model={} base={}",
            config.model, config.api_base
        );
        Ok(Self {
            agent,
            config: config.clone(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }
}

impl LlmClient for GeminiClient {
    fn send(&self, history: &[ChatMessage], cancel: &CancelToken) -> anyhow::Result<Reply> {
        let body = request_body(history, &self.config);
        if body["contents"].as_array().is_none_or(Vec::is_empty) {
            bail!("nothing to send");
        }
        cancel.check()?;

        let url = self.endpoint();
        debug!(
            "llm: POST {url} ({} turn(s))",
            body["contents"].as_array().map_or(0, Vec::len)
        );
        let start = std::time::Instant::now();
        let mut response = self
            .agent
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .send(body.to_string())
            .with_context(|| format!("request to {} failed", self.config.model))?;
        let status = response.status();
        let text = response
            .body_mut()
            .read_to_string()
            .context("failed to read response body")?;
        if !status.is_success() && serde_json::from_str::<ErrorEnvelope>(&text).is_err() {
            bail!("{} returned HTTP {status}", self.config.model);
        }
        // The user may have pressed stop while the request was in flight.
        cancel.check()?;
        info!(
            "llm: response in {:.1}ms ({} bytes)",
            start.elapsed().as_secs_f64() * 1000.0,
            text.len()
        );
        parse_reply(&text)
    }
}

/// Build the `generateContent` request payload.
pub fn request_body(history: &[ChatMessage], config: &LlmConfig) -> serde_json::Value {
    let turns: Vec<&ChatMessage> = if config.send_history {
        history.iter().filter(|m| !m.is_placeholder()).collect()
    } else {
        history
            .iter()
            .rev()
            .find(|m| m.sender == Sender::User)
            .into_iter()
            .collect()
    };
    let contents: Vec<serde_json::Value> = turns
        .into_iter()
        .map(|m| {
            let role = match m.sender {
                Sender::User => "user",
                Sender::Ai => "model",
            };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();
    json!({
        "contents": contents,
        "generationConfig": {
            "thinkingConfig": {
                "thinkingBudget": config.thinking_budget,
                "includeThoughts": config.include_thoughts,
            }
        }
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Split a `generateContent` response into thought summary and answer.
pub fn parse_reply(body: &str) -> anyhow::Result<Reply> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        bail!("API error: {}", envelope.error.message);
    }
    let response: GenerateResponse =
        serde_json::from_str(body).context("malformed generateContent response")?;
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        bail!("prompt blocked: {reason}");
    }
    let Some(candidate) = response.candidates.into_iter().next() else {
        bail!("response has no candidates");
    };

    let mut answer = String::new();
    let mut thoughts: Vec<String> = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        let Some(text) = part.text else { continue };
        if part.thought {
            thoughts.push(text);
        } else {
            answer.push_str(&text);
        }
    }
    if answer.trim().is_empty() {
        match candidate.finish_reason {
            Some(reason) => bail!("empty answer (finish reason {reason})"),
            None => bail!("empty answer"),
        }
    }
    let thought = (!thoughts.is_empty()).then(|| thoughts.join("\n\n"));
    Ok(Reply { answer, thought })
}
