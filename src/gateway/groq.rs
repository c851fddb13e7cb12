use super::{Completion, CompletionGateway, http_client, join_url, post_json};
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;

const BACKEND: &str = "groq";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Client for Groq's OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct GroqGateway {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for GroqGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqGateway")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GroqGateway {
    /// Creates a gateway for `endpoint` (the API base URL) using `model`.
    ///
    /// # Errors
    ///
    /// Returns a completion error if the HTTP client can't be built.
    pub fn new(
        endpoint: impl AsRef<str>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(BACKEND)?,
            url: join_url(endpoint.as_ref(), "chat/completions"),
            model: model.into(),
            api_key: api_key.into(),
        })
    }
}

impl CompletionGateway for GroqGateway {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn complete(&self, prompt: &str) -> Result<Completion> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let raw = post_json(
            &self.client,
            BACKEND,
            &self.url,
            Some(&self.api_key),
            &request,
        )
        .await?;
        let text = first_choice_text(&raw)?;

        Ok(Completion { text, raw })
    }
}

fn first_choice_text(raw: &Value) -> Result<String> {
    raw.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::completion(BACKEND, "payload has no choices[0].message.content"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_choice_text() {
        let raw = json!({
            "id": "chatcmpl-1",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": "first" } },
                { "index": 1, "message": { "role": "assistant", "content": "second" } }
            ]
        });

        assert_eq!(first_choice_text(&raw).unwrap(), "first");
    }

    #[test]
    fn test_no_choices() {
        let err = first_choice_text(&json!({ "choices": [] })).unwrap_err();

        assert!(err.is_completion());
    }

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "llama3-8b-8192",
            messages: [ChatMessage {
                role: "user",
                content: "hi",
            }],
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "llama3-8b-8192",
                "messages": [{ "role": "user", "content": "hi" }]
            })
        );
    }

    #[test]
    fn test_debug_hides_key() {
        let gateway = GroqGateway::new("https://api.groq.com/openai/v1", "m", "secret").unwrap();

        assert!(!format!("{gateway:?}").contains("secret"));
        assert_eq!(gateway.url, "https://api.groq.com/openai/v1/chat/completions");
    }
}
