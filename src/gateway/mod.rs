//! Access to LLM completion services.
//!
//! The pipeline only sees [`CompletionGateway`]: one prompt in, one
//! [`Completion`] out, no retries. The HTTP backends live in the
//! submodules, and [`AnyGateway`] picks one from a [`Config`].

mod groq;
mod ollama;

pub use groq::GroqGateway;
pub use ollama::OllamaGateway;

use crate::{
    config::{Backend, Config},
    error::{Error, Result},
};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use tracing::debug;

/// A finished completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Generated text
    pub text: String,

    /// Full payload as returned by the service
    pub raw: Value,
}

/// Something that completes prompts.
pub trait CompletionGateway {
    /// Short backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// Sends `prompt` and waits for the full completion.
    ///
    /// # Errors
    ///
    /// Returns a completion error on network, HTTP-status, auth or
    /// payload-shape failures.
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<Completion>> + Send;
}

/// The backend selected at runtime.
#[derive(Debug, Clone)]
pub enum AnyGateway {
    /// Local or remote Ollama server
    Ollama(OllamaGateway),
    /// Groq cloud API
    Groq(GroqGateway),
}

impl AnyGateway {
    /// Builds the gateway the configuration asks for.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if Groq is selected without a
    /// credential for a run that calls the service, or a completion error
    /// if the HTTP client can't be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let endpoint = config.endpoint();
        let model = config.model();

        match config.backend {
            Backend::Ollama => Ok(Self::Ollama(OllamaGateway::new(endpoint, model)?)),
            Backend::Groq => {
                let key = match config.credential.clone() {
                    Some(key) => key,
                    // Never sent: the run makes no completion calls.
                    None if !config.calls_service() => String::new(),
                    None => {
                        return Err(Error::config(
                            "The groq backend needs an API key (GROQ_API_KEY)",
                        ));
                    }
                };
                Ok(Self::Groq(GroqGateway::new(endpoint, model, key)?))
            }
        }
    }
}

impl CompletionGateway for AnyGateway {
    fn backend(&self) -> &str {
        match self {
            Self::Ollama(gateway) => gateway.backend(),
            Self::Groq(gateway) => gateway.backend(),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<Completion> {
        match self {
            Self::Ollama(gateway) => gateway.complete(prompt).await,
            Self::Groq(gateway) => gateway.complete(prompt).await,
        }
    }
}

fn http_client(backend: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("rebuild-it/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::completion(backend, e.to_string()))
}

/// POSTs `body` as JSON and returns the JSON reply.
async fn post_json<B: Serialize + Sync>(
    client: &reqwest::Client,
    backend: &str,
    url: &str,
    bearer: Option<&str>,
    body: &B,
) -> Result<Value> {
    debug!("POST {} ({})", url, backend);

    let mut request = client.post(url).json(body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| Error::completion(backend, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(Error::completion(
            backend,
            format!("HTTP {status}: {}", detail.trim()),
        ));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| Error::completion(backend, format!("invalid JSON payload: {e}")))
}

fn join_url(endpoint: &str, path: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), path.trim_start_matches('/'))
}
