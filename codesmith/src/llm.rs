//! Conversations and the text-generation backends.
//!
//! Agents build a [`Conversation`] of role-tagged turns; the gateway renders
//! it into a single prompt and hands it to a [`TextGenerator`]. Two HTTP
//! backends are provided: Gemini `generateContent` and Anthropic Messages.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Capitalized label used when flattening a conversation.
    pub fn label(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Ordered turns for one request. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// A conversation holding a single turn.
    #[cfg(test)]
    pub(crate) fn single(turn: Turn) -> Self {
        Self { turns: vec![turn] }
    }

    /// The usual agent opening: system instructions followed by the task.
    pub fn with_system(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            turns: vec![
                Turn::new(Role::System, system),
                Turn::new(Role::User, user),
            ],
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn::new(role, content));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Flatten into one prompt. A lone turn is sent verbatim; otherwise each
    /// turn becomes a `"<Role>: <content>"` line.
    pub fn render_prompt(&self) -> String {
        if let [only] = self.turns.as_slice() {
            return only.content.clone();
        }
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role.label(), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The external text-generation capability. Only the gateway calls this.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, model_id: &str, prompt: &str) -> Result<String, GenerationError>;
}

/// Which backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    Anthropic,
}

impl Provider {
    /// Environment variable holding this provider's API key.
    pub fn key_env(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gemini => write!(f, "gemini"),
            Provider::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Build the backend for `provider`. A missing or blank key is a
/// configuration failure and is reported immediately.
pub fn connect(
    provider: Provider,
    api_key: Option<String>,
) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    let key = api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            GenerationError::MissingCredential(format!(
                "{} environment variable not set",
                provider.key_env()
            ))
        })?;
    Ok(match provider {
        Provider::Gemini => Arc::new(GeminiClient::new(key)),
        Provider::Anthropic => Arc::new(AnthropicClient::new(key)),
    })
}

// ── Gemini ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Google Generative Language API client.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(
            api_key,
            "https://generativelanguage.googleapis.com".to_string(),
        )
    }

    /// Point at a different host (mock servers, proxies).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            http: reqwest::Client::new(),
        }
    }
}

/// Map a failed Gemini HTTP response onto the error taxonomy.
fn classify_gemini(status: u16, body: &str) -> GenerationError {
    let (message, api_status) = match serde_json::from_str::<GeminiErrorBody>(body) {
        Ok(parsed) => (parsed.error.message, parsed.error.status),
        Err(_) => (body.to_string(), String::new()),
    };
    let capacity = status == 429
        || status == 503
        || api_status == "RESOURCE_EXHAUSTED"
        || api_status == "UNAVAILABLE";
    if capacity {
        GenerationError::Transient { status, message }
    } else {
        GenerationError::Terminal { status, message }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, model_id: &str, prompt: &str) -> Result<String, GenerationError> {
        let url = format!(
            "{}/v1beta/models/{model_id}:generateContent",
            self.base_url
        );
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_gemini(status.as_u16(), &body));
        }

        let parsed: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(format!("failed to parse response: {e}")))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| GenerationError::InvalidResponse("no candidates in response".into()))?;
        Ok(text)
    }
}

// ── Anthropic ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Claude Messages API client.
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    max_tokens: u32,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, "https://api.anthropic.com".to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            max_tokens: 8192,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate(&self, model_id: &str, prompt: &str) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": model_id,
            "max_tokens": self.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 || status == 529 {
            let message = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Transient { status, message });
        }
        if status >= 400 {
            let message = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Terminal { status, message });
        }

        let parsed: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(format!("failed to parse response: {e}")))?;

        Ok(parsed
            .content
            .into_iter()
            .filter_map(|b| match b {
                AnthropicBlock::Text { text } => Some(text),
                AnthropicBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_turn_is_verbatim() {
        let convo = Conversation::single(Turn::new(Role::User, "just this"));
        assert_eq!(convo.render_prompt(), "just this");
    }

    #[test]
    fn multi_turn_uses_role_labels() {
        let mut convo = Conversation::with_system("be terse", "write code");
        convo.push(Role::Assistant, "def f() pass");
        convo.push(Role::User, "fix it");
        assert_eq!(
            convo.render_prompt(),
            "System: be terse\nUser: write code\nAssistant: def f() pass\nUser: fix it"
        );
        assert_eq!(convo.len(), 4);
    }

    #[test]
    fn unknown_role_rejected() {
        assert_eq!("assistant".parse::<Role>(), Ok(Role::Assistant));
        assert!("tool".parse::<Role>().is_err());
        assert!(serde_json::from_str::<Turn>(r#"{"role":"narrator","content":"x"}"#).is_err());
    }

    #[test]
    fn connect_requires_key() {
        let err = connect(Provider::Gemini, None).err().unwrap();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
        assert!(connect(Provider::Anthropic, Some("  ".into())).is_err());
        assert!(connect(Provider::Gemini, Some("k".into())).is_ok());
    }

    #[test]
    fn gemini_quota_is_transient() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        match classify_gemini(429, body) {
            GenerationError::Transient { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "Quota exceeded");
            }
            other => panic!("expected transient, got {other:?}"),
        }
    }

    #[test]
    fn gemini_bad_request_is_terminal() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            classify_gemini(400, body),
            GenerationError::Terminal { status: 400, .. }
        ));
        assert!(matches!(
            classify_gemini(500, "not json"),
            GenerationError::Terminal { status: 500, .. }
        ));
    }

    #[test]
    fn provider_parse() {
        assert_eq!("Gemini".parse::<Provider>(), Ok(Provider::Gemini));
        assert_eq!("claude".parse::<Provider>(), Ok(Provider::Anthropic));
        assert!("openai".parse::<Provider>().is_err());
    }
}
