//! OpenAI-compatible chat completions client.
//!
//! Works against any endpoint speaking the `/chat/completions` dialect
//! (OpenAI, OpenRouter, local gateways).

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};

const PROVIDER: &str = "openai_compat";

/// Chat completions over HTTP.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: &str, api_key: SecretString, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ApiRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(
            model = %self.model,
            message_count = request.messages.len(),
            "Sending chat completion"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = response.text().await.unwrap_or_default();
            return Err(map_status_error(status.as_u16(), &text, retry_after));
        }

        let parsed: ApiResponse = response.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        })?;

        into_completion(parsed)
    }
}

fn map_status_error(status: u16, body: &str, retry_after: Option<Duration>) -> LlmError {
    match status {
        401 | 403 => LlmError::AuthFailed {
            provider: PROVIDER.to_string(),
        },
        429 => LlmError::RateLimited {
            provider: PROVIDER.to_string(),
            retry_after,
        },
        _ => {
            let message = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|json| json["error"]["message"].as_str().map(String::from))
                .unwrap_or_else(|| body.to_string());
            LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {status}: {message}"),
            }
        }
    }
}

fn into_completion(parsed: ApiResponse) -> Result<CompletionResponse, LlmError> {
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "response contained no choices".to_string(),
        })?;
    let usage = parsed.usage.unwrap_or(ApiUsage {
        prompt_tokens: 0,
        completion_tokens: 0,
    });
    Ok(CompletionResponse {
        content: choice.message.content.unwrap_or_default(),
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        finish_reason: FinishReason::from_api(choice.finish_reason.as_deref()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_strips_trailing_slash() {
        let provider = OpenAiCompatProvider::new(
            "https://openrouter.ai/api/v1/",
            SecretString::from("sk-test"),
            "gpt-4o-mini",
        );
        assert_eq!(
            provider.endpoint(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert_eq!(provider.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn status_errors_are_classified() {
        assert!(matches!(
            map_status_error(401, "", None),
            LlmError::AuthFailed { .. }
        ));
        assert!(matches!(
            map_status_error(429, "", Some(Duration::from_secs(3))),
            LlmError::RateLimited {
                retry_after: Some(_),
                ..
            }
        ));
        let err = map_status_error(500, r#"{"error":{"message":"overloaded"}}"#, None);
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn response_parses_first_choice() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "Score: 7"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        let completion = into_completion(parsed).unwrap();
        assert_eq!(completion.content, "Score: 7");
        assert_eq!(completion.input_tokens, 12);
        assert_eq!(completion.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn empty_choices_is_invalid() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            into_completion(parsed),
            Err(LlmError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn request_serializes_messages_with_lowercase_roles() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let body = ApiRequest {
            model: "m",
            messages: &messages,
            temperature: Some(0.7),
            max_tokens: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert!(json.get("max_tokens").is_none());
    }
}
