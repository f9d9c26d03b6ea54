use std::{env, fmt};

use anyhow::{Context, Result, anyhow, bail};
use reqwest::Client;
use serde::Deserialize;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
const CLAUDE_MAX_TOKENS: u32 = 8192;
const OPENAI_FALLBACK_MAX_TOKENS: u32 = 4096;

/// Enumerates the LLM backends selectable per evaluation request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LlmProvider {
    OpenAi,
    Claude,
}

impl LlmProvider {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "openai" => Ok(LlmProvider::OpenAi),
            "claude" => Ok(LlmProvider::Claude),
            other => bail!("지원하지 않는 AI 모델입니다: {other}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Claude => "claude",
        }
    }

    /// Label shown in the provider dropdown.
    pub fn label(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "OpenAI (GPT-4o)",
            LlmProvider::Claude => "Anthropic (Claude)",
        }
    }

    pub fn missing_key_message(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "OPENAI_API_KEY 환경변수가 설정되지 않았습니다.",
            LlmProvider::Claude => "ANTHROPIC_API_KEY 환경변수가 설정되지 않았습니다.",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response surface returned to the evaluation handler.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub provider: LlmProvider,
    pub model: String,
}

/// Entry point for invoking either backend with a system prompt and one user message.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

#[derive(Clone, Default)]
struct LlmConfig {
    openai_api_key: Option<String>,
    anthropic_api_key: Option<String>,
    openai_model: String,
    claude_model: String,
}

impl LlmClient {
    /// Build a client using environment variables. Missing keys are tolerated
    /// here and reported per request so the server can boot without them.
    pub fn from_env() -> Result<Self> {
        let openai_api_key = env::var("OPENAI_API_KEY").ok();
        let anthropic_api_key = env::var("ANTHROPIC_API_KEY").ok();
        let openai_model =
            env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string());
        let claude_model =
            env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_CLAUDE_MODEL.to_string());

        Ok(Self {
            http: Client::new(),
            config: LlmConfig {
                openai_api_key,
                anthropic_api_key,
                openai_model,
                claude_model,
            },
        })
    }

    pub fn has_key(&self, provider: LlmProvider) -> bool {
        match provider {
            LlmProvider::OpenAi => self.config.openai_api_key.is_some(),
            LlmProvider::Claude => self.config.anthropic_api_key.is_some(),
        }
    }

    /// Execute one request against the selected backend and return the first
    /// text output. The key check runs before any outbound call.
    pub async fn generate(
        &self,
        provider: LlmProvider,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<LlmResponse> {
        match provider {
            LlmProvider::OpenAi => self.generate_openai(system_prompt, user_message).await,
            LlmProvider::Claude => self.generate_claude(system_prompt, user_message).await,
        }
    }

    async fn generate_openai(&self, system_prompt: &str, user_message: &str) -> Result<LlmResponse> {
        let Some(api_key) = self.config.openai_api_key.as_ref() else {
            bail!("{}", LlmProvider::OpenAi.missing_key_message());
        };

        let model = self.config.openai_model.as_str();
        let payload = serde_json::json!({
            "model": model,
            "max_tokens": openai_max_tokens(model),
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_message },
            ],
        });

        let response = self
            .http
            .post(OPENAI_CHAT_URL)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = read_json_body(response, "OpenAI").await?;
        if !status.is_success() {
            bail!("openai call failed with status {}: {}", status, body);
        }

        let text = extract_openai_text(&body)
            .ok_or_else(|| anyhow!("unexpected OpenAI response payload: {}", body))?;

        Ok(LlmResponse {
            text,
            provider: LlmProvider::OpenAi,
            model: model.to_string(),
        })
    }

    async fn generate_claude(&self, system_prompt: &str, user_message: &str) -> Result<LlmResponse> {
        let Some(api_key) = self.config.anthropic_api_key.as_ref() else {
            bail!("{}", LlmProvider::Claude.missing_key_message());
        };

        let model = self.config.claude_model.as_str();
        let payload = serde_json::json!({
            "model": model,
            "max_tokens": CLAUDE_MAX_TOKENS,
            "system": system_prompt,
            "messages": [
                { "role": "user", "content": user_message },
            ],
        });

        let response = self
            .http
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = read_json_body(response, "Anthropic").await?;
        if !status.is_success() {
            bail!("anthropic call failed with status {}: {}", status, body);
        }

        let text = extract_claude_text(&body)
            .ok_or_else(|| anyhow!("unexpected Anthropic response payload: {}", body))?;

        Ok(LlmResponse {
            text,
            provider: LlmProvider::Claude,
            model: model.to_string(),
        })
    }
}

async fn read_json_body(response: reqwest::Response, vendor: &str) -> Result<serde_json::Value> {
    let response_text = response
        .text()
        .await
        .context("failed to read response body")?;
    serde_json::from_str(&response_text).with_context(|| {
        let preview = body_preview(&response_text);
        let ellipsis = if preview.len() < response_text.len() {
            "..."
        } else {
            ""
        };
        format!("failed to parse {vendor} response as JSON. Response body: {preview}{ellipsis}")
    })
}

const ERROR_BODY_PREVIEW_BYTES: usize = 500;

/// Leading slice of a non-JSON error body for diagnostics. The cut point backs
/// up to a char boundary so multi-byte bodies cannot make the slice panic.
fn body_preview(text: &str) -> &str {
    if text.len() <= ERROR_BODY_PREVIEW_BYTES {
        return text;
    }
    let mut end = ERROR_BODY_PREVIEW_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Completion ceilings per OpenAI model family.
fn openai_max_tokens(model: &str) -> u32 {
    match model {
        "gpt-4o" | "gpt-4o-mini" => 16384,
        "gpt-4" => 8192,
        "gpt-4-turbo" | "gpt-3.5-turbo" => 4096,
        _ => OPENAI_FALLBACK_MAX_TOKENS,
    }
}

fn extract_openai_text(value: &serde_json::Value) -> Option<String> {
    let payload = serde_json::from_value::<OpenAiChatCompletionPayload>(value.clone()).ok()?;
    payload
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
}

fn extract_claude_text(value: &serde_json::Value) -> Option<String> {
    let payload = serde_json::from_value::<ClaudeMessagePayload>(value.clone()).ok()?;
    payload
        .content
        .into_iter()
        .find_map(|block| match block.block_type.as_str() {
            "text" => block.text,
            _ => None,
        })
}

#[derive(Debug, Deserialize)]
struct OpenAiChatCompletionPayload {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChatMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeMessagePayload {
    #[serde(default)]
    content: Vec<ClaudeContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_without_keys() -> LlmClient {
        LlmClient {
            http: Client::new(),
            config: LlmConfig {
                openai_model: DEFAULT_OPENAI_MODEL.to_string(),
                claude_model: DEFAULT_CLAUDE_MODEL.to_string(),
                ..LlmConfig::default()
            },
        }
    }

    #[test]
    fn parse_accepts_known_providers_only() {
        assert_eq!(LlmProvider::parse("openai").unwrap(), LlmProvider::OpenAi);
        assert_eq!(LlmProvider::parse("claude").unwrap(), LlmProvider::Claude);
        assert!(LlmProvider::parse("gemini").is_err());
        assert!(LlmProvider::parse("").is_err());
    }

    #[test]
    fn openai_max_tokens_table() {
        assert_eq!(openai_max_tokens("gpt-4o"), 16384);
        assert_eq!(openai_max_tokens("gpt-4o-mini"), 16384);
        assert_eq!(openai_max_tokens("gpt-4"), 8192);
        assert_eq!(openai_max_tokens("gpt-4-turbo"), 4096);
        assert_eq!(openai_max_tokens("gpt-3.5-turbo"), 4096);
        assert_eq!(openai_max_tokens("something-new"), 4096);
    }

    #[test]
    fn extracts_openai_choice_content() {
        let body = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "평가 결과입니다." } }
            ],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
        });
        assert_eq!(
            extract_openai_text(&body).as_deref(),
            Some("평가 결과입니다.")
        );
    }

    #[test]
    fn extracts_first_claude_text_block() {
        let body = serde_json::json!({
            "content": [
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "강점과 약점을 정리했습니다." }
            ]
        });
        assert_eq!(
            extract_claude_text(&body).as_deref(),
            Some("강점과 약점을 정리했습니다.")
        );
    }

    #[test]
    fn body_preview_truncates_on_char_boundaries() {
        // 200 three-byte chars: byte 500 falls mid-character.
        let korean = "가".repeat(200);
        let preview = body_preview(&korean);
        assert!(preview.len() <= ERROR_BODY_PREVIEW_BYTES);
        assert!(korean.starts_with(preview));
        assert_eq!(preview.len() % 3, 0);

        let ascii = "x".repeat(600);
        assert_eq!(body_preview(&ascii).len(), ERROR_BODY_PREVIEW_BYTES);

        let short = "<html>Bad Gateway</html>";
        assert_eq!(body_preview(short), short);
    }

    #[test]
    fn extraction_rejects_empty_payloads() {
        assert!(extract_openai_text(&serde_json::json!({ "choices": [] })).is_none());
        assert!(extract_claude_text(&serde_json::json!({ "content": [] })).is_none());
    }

    #[tokio::test]
    async fn missing_openai_key_fails_before_any_call() {
        let client = client_without_keys();
        let err = client
            .generate(LlmProvider::OpenAi, "system", "user")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            LlmProvider::OpenAi.missing_key_message()
        );
    }

    #[tokio::test]
    async fn missing_anthropic_key_fails_before_any_call() {
        let client = client_without_keys();
        let err = client
            .generate(LlmProvider::Claude, "system", "user")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            LlmProvider::Claude.missing_key_message()
        );
    }
}
