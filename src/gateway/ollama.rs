use super::{Completion, CompletionGateway, http_client, join_url, post_json};
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;

const BACKEND: &str = "ollama";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Client for Ollama's `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaGateway {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaGateway {
    /// Creates a gateway for the server at `endpoint` using `model`.
    ///
    /// # Errors
    ///
    /// Returns a completion error if the HTTP client can't be built.
    pub fn new(endpoint: impl AsRef<str>, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(BACKEND)?,
            url: join_url(endpoint.as_ref(), "api/generate"),
            model: model.into(),
        })
    }
}

impl CompletionGateway for OllamaGateway {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn complete(&self, prompt: &str) -> Result<Completion> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let raw = post_json(&self.client, BACKEND, &self.url, None, &request).await?;
        let text = response_text(&raw)?;

        Ok(Completion { text, raw })
    }
}

fn response_text(raw: &Value) -> Result<String> {
    if let Some(message) = raw.get("error").and_then(Value::as_str) {
        return Err(Error::completion(BACKEND, message));
    }

    raw.get("response")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::completion(BACKEND, "payload has no 'response' field"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_text() {
        let raw = json!({
            "model": "llama3:instruct",
            "response": "**a.txt**\n```\nHELLO\n```\n",
            "done": true
        });

        assert_eq!(response_text(&raw).unwrap(), "**a.txt**\n```\nHELLO\n```\n");
    }

    #[test]
    fn test_response_text_service_error() {
        let err = response_text(&json!({ "error": "model 'x' not found" })).unwrap_err();

        assert!(err.is_completion());
        assert!(err.to_string().contains("model 'x' not found"));
    }

    #[test]
    fn test_response_text_missing_field() {
        assert!(response_text(&json!({ "done": true })).is_err());
    }

    #[test]
    fn test_request_shape() {
        let request = GenerateRequest {
            model: "llama3:instruct",
            prompt: "hi",
            stream: false,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "model": "llama3:instruct", "prompt": "hi", "stream": false })
        );
    }

    #[test]
    fn test_url() {
        let gateway = OllamaGateway::new("http://192.168.1.170:11434/", "llama3:instruct").unwrap();

        assert_eq!(gateway.url, "http://192.168.1.170:11434/api/generate");
        assert_eq!(gateway.backend(), "ollama");
    }
}
