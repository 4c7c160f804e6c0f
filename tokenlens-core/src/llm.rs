//! Generative-text collaborator interface.
//!
//! The segmentation and componentization passes delegate the judgement
//! calls (where to split, what to label) to an external text generator.
//! The pipeline only depends on the [`TextGenerator`] trait; the HTTP
//! implementation talks to Ollama, Claude, or OpenAI endpoints.
//!
//! Collaborator replies routinely arrive wrapped in prose or code fences,
//! so the lenient extraction helpers here pull the first JSON object or
//! array out of a reply before parsing.

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;
use std::time::Duration;

/// Chunked collaborator output. Dropping the stream cancels the request.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Text completion interface for the enrichment passes.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete `prompt` and return the full reply.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Complete `prompt` as a chunk stream.
    ///
    /// Consumers may stop polling and drop the stream at any point; no
    /// pipeline state is entangled with an in-flight stream.
    async fn generate_stream(&self, prompt: &str) -> Result<TextStream>;
}

/// Create the default HTTP-backed generator for a provider config.
pub fn create_generator(llm: &LlmConfig) -> Result<Box<dyn TextGenerator>> {
    Ok(Box::new(HttpTextGenerator::new(llm)?))
}

// ============================================
// Lenient reply parsing
// ============================================

/// Extract the first top-level JSON object from a reply.
pub(crate) fn extract_json_object(raw: &str) -> Result<String> {
    let start = raw
        .find('{')
        .ok_or_else(|| Error::Collaborator("reply did not contain a JSON object".to_string()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| Error::Collaborator("reply did not contain a JSON object".to_string()))?;
    if end <= start {
        return Err(Error::Collaborator(
            "reply JSON object bounds are invalid".to_string(),
        ));
    }
    Ok(raw[start..=end].to_string())
}

/// Extract the first top-level JSON array from a reply.
pub(crate) fn extract_json_array(raw: &str) -> Result<String> {
    let start = raw
        .find('[')
        .ok_or_else(|| Error::Collaborator("reply did not contain a JSON array".to_string()))?;
    let end = raw
        .rfind(']')
        .ok_or_else(|| Error::Collaborator("reply did not contain a JSON array".to_string()))?;
    if end <= start {
        return Err(Error::Collaborator(
            "reply JSON array bounds are invalid".to_string(),
        ));
    }
    Ok(raw[start..=end].to_string())
}

// ============================================
// HTTP client
// ============================================

/// HTTP-backed [`TextGenerator`] for Ollama, Claude, and OpenAI.
pub struct HttpTextGenerator {
    model: String,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpTextGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string());
        let api_key = match config.provider {
            LlmProvider::Ollama => None,
            LlmProvider::Claude => config
                .api_key
                .clone()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok()),
            LlmProvider::OpenAI => config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        };

        if matches!(config.provider, LlmProvider::Claude | LlmProvider::OpenAI) && api_key.is_none()
        {
            return Err(Error::Config(
                "llm.api_key (or provider env var) is required".to_string(),
            ));
        }

        let timeout_secs = config.timeout_secs.max(1);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Collaborator(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: config.model.clone(),
            provider: config.provider,
            endpoint,
            api_key,
            http,
        })
    }

    async fn generate_ollama(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.endpoint.trim_end_matches('/'));
        let resp = self
            .http
            .post(url)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
            }))
            .send()
            .await
            .map_err(|e| Error::Collaborator(format!("ollama request failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Collaborator(format!("ollama read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Collaborator(format!(
                "ollama returned {}: {}",
                status.as_u16(),
                body
            )));
        }
        let json: serde_json::Value = serde_json::from_str(&body)?;
        json.get("response")
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::Collaborator("ollama response missing string field `response`".to_string())
            })
    }

    async fn generate_claude(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.endpoint.trim_end_matches('/'));
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(self.api_key.as_deref().unwrap_or_default())
                .map_err(|e| Error::Collaborator(format!("invalid claude api key header: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(&json!({
                "model": self.model,
                "max_tokens": 1024,
                "temperature": 0,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .await
            .map_err(|e| Error::Collaborator(format!("claude request failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Collaborator(format!("claude read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Collaborator(format!(
                "claude returned {}: {}",
                status.as_u16(),
                body
            )));
        }
        let json: serde_json::Value = serde_json::from_str(&body)?;
        json.get("content")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.get("text"))
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| Error::Collaborator("claude response missing content[0].text".to_string()))
    }

    async fn generate_openai(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.endpoint.trim_end_matches('/')
        );
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!(
                "Bearer {}",
                self.api_key.as_deref().unwrap_or_default()
            ))
            .map_err(|e| Error::Collaborator(format!("invalid auth header: {e}")))?,
        );

        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(&json!({
                "model": self.model,
                "temperature": 0,
                "messages": [{ "role": "user", "content": prompt }]
            }))
            .send()
            .await
            .map_err(|e| Error::Collaborator(format!("openai request failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Collaborator(format!("openai read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Collaborator(format!(
                "openai returned {}: {}",
                status.as_u16(),
                body
            )));
        }
        let json: serde_json::Value = serde_json::from_str(&body)?;
        json.get("choices")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::Collaborator("openai response missing choices[0].message.content".to_string())
            })
    }

    /// NDJSON token stream from an Ollama `/api/generate` call.
    async fn stream_ollama(&self, prompt: &str) -> Result<TextStream> {
        let url = format!("{}/api/generate", self.endpoint.trim_end_matches('/'));
        let resp = self
            .http
            .post(url)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": true,
            }))
            .send()
            .await
            .map_err(|e| Error::Collaborator(format!("ollama request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Collaborator(format!(
                "ollama returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        // One JSON object per line; `done: true` on the final object.
        let bytes = resp.bytes_stream();
        let stream = futures::stream::unfold(
            (bytes, String::new(), false),
            |(mut bytes, mut buffer, finished)| async move {
                if finished {
                    return None;
                }
                loop {
                    if let Some(pos) = buffer.find('\n') {
                        let line = buffer[..pos].trim().to_string();
                        buffer.drain(..=pos);
                        if line.is_empty() {
                            continue;
                        }
                        return match serde_json::from_str::<serde_json::Value>(&line) {
                            Ok(value) => {
                                let chunk = value
                                    .get("response")
                                    .and_then(|v| v.as_str())
                                    .unwrap_or_default()
                                    .to_string();
                                let done =
                                    value.get("done").and_then(|v| v.as_bool()).unwrap_or(false);
                                Some((Ok(chunk), (bytes, buffer, done)))
                            }
                            Err(e) => Some((
                                Err(Error::Collaborator(format!(
                                    "ollama stream chunk was not JSON: {e}"
                                ))),
                                (bytes, buffer, true),
                            )),
                        };
                    }

                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            buffer.push_str(&String::from_utf8_lossy(&chunk));
                        }
                        Some(Err(e)) => {
                            return Some((
                                Err(Error::Collaborator(format!("ollama stream failed: {e}"))),
                                (bytes, buffer, true),
                            ));
                        }
                        None => {
                            let line = buffer.trim().to_string();
                            buffer.clear();
                            if line.is_empty() {
                                return None;
                            }
                            return match serde_json::from_str::<serde_json::Value>(&line) {
                                Ok(value) => {
                                    let chunk = value
                                        .get("response")
                                        .and_then(|v| v.as_str())
                                        .unwrap_or_default()
                                        .to_string();
                                    Some((Ok(chunk), (bytes, buffer, true)))
                                }
                                Err(_) => None,
                            };
                        }
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        match self.provider {
            LlmProvider::Ollama => self.generate_ollama(prompt).await,
            LlmProvider::Claude => self.generate_claude(prompt).await,
            LlmProvider::OpenAI => self.generate_openai(prompt).await,
        }
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream> {
        match self.provider {
            LlmProvider::Ollama => self.stream_ollama(prompt).await,
            // Hosted providers answer through the non-streaming endpoint;
            // the reply arrives as a single-chunk stream.
            LlmProvider::Claude | LlmProvider::OpenAI => {
                let reply = self.generate(prompt).await?;
                Ok(Box::pin(futures::stream::once(async move { Ok(reply) })))
            }
        }
    }
}
