//! HTTP writer: posts each emission as a flat JSON object.
//!
//! Deliveries never fail the run. A request that still fails after the
//! configured retries is logged and kept in a dead-letter list.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

use super::{BlockBuffer, DataWriter, WriterError};
use crate::config::EmissionMode;
use crate::retry::{RetryConfig, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpWriterConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 { 10_000 }

impl Default for HttpWriterConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// A queued POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpRequest {
    pub uri: String,
    pub body: serde_json::Map<String, serde_json::Value>,
}

impl HttpRequest {
    /// Build a request whose body maps each name to its stringified value.
    pub fn new(uri: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            uri: uri.into(),
            body: fields
                .into_iter()
                .map(|(name, value)| (name, serde_json::Value::String(value)))
                .collect(),
        }
    }
}

pub struct HttpWriter {
    client: reqwest::Client,
    retry: RetryPolicy,
    requests: BlockBuffer<HttpRequest>,
    delivered: usize,
    dead_letters: Vec<HttpRequest>,
}

impl HttpWriter {
    pub fn new(mode: EmissionMode, config: &HttpWriterConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            retry: RetryPolicy::new(config.retry.clone()),
            requests: BlockBuffer::new(mode),
            delivered: 0,
            dead_letters: Vec::new(),
        }
    }

    pub fn add_request(&mut self, request: HttpRequest) {
        self.requests.push(request);
    }

    /// Requests given up on after all retries.
    pub fn dead_letters(&self) -> &[HttpRequest] {
        &self.dead_letters
    }

    /// Number of successful deliveries.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    async fn post(&self, request: &HttpRequest) -> Result<(), String> {
        let body = serde_json::to_string(&request.body).map_err(|e| e.to_string())?;
        let response = self
            .client
            .post(&request.uri)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {status}"))
        }
    }

    async fn deliver(&mut self, requests: Vec<HttpRequest>) {
        for request in requests {
            let mut attempt = 0;
            loop {
                match self.post(&request).await {
                    Ok(()) => {
                        self.delivered += 1;
                        tracing::trace!(uri = %request.uri, "HTTP delivery succeeded");
                        break;
                    }
                    Err(reason) => {
                        attempt += 1;
                        match self.retry.next_delay(attempt) {
                            Some(delay) => {
                                tracing::debug!(uri = %request.uri, attempt, error = %reason, "Retrying HTTP delivery");
                                tokio::time::sleep(delay).await;
                            }
                            None => {
                                tracing::warn!(uri = %request.uri, attempts = attempt, error = %reason, "HTTP delivery failed, dead-lettered");
                                self.dead_letters.push(request);
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl DataWriter for HttpWriter {
    fn set_output_folder(&mut self, _folder: &Path) {}

    fn start_block(&mut self, _block_number: u64) {}

    async fn end_block(&mut self) -> Result<(), WriterError> {
        let due = self.requests.end_block();
        self.deliver(due).await;
        Ok(())
    }

    fn discard_block(&mut self) {
        self.requests.discard();
    }

    async fn end_program(&mut self) -> Result<(), WriterError> {
        let due = self.requests.end_program();
        self.deliver(due).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_flat_json_of_strings() {
        let request = HttpRequest::new(
            "http://localhost/hook",
            vec![("block".into(), "7".into()), ("ok".into(), "true".into())],
        );
        assert_eq!(
            serde_json::to_string(&request.body).unwrap(),
            r#"{"block":"7","ok":"true"}"#
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_dead_lettered() {
        let config = HttpWriterConfig {
            retry: RetryConfig {
                max_retries: 1,
                initial_backoff_ms: 1,
                max_backoff_ms: 1,
                multiplier: 1.0,
            },
            request_timeout_ms: 500,
        };
        let mut writer = HttpWriter::new(EmissionMode::Block, &config);
        writer.start_block(1);
        writer.add_request(HttpRequest::new("http://127.0.0.1:9/hook", vec![]));
        writer.end_block().await.unwrap();

        assert_eq!(writer.delivered(), 0);
        assert_eq!(writer.dead_letters().len(), 1);
    }
}
