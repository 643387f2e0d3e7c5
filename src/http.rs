use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// Bodies of failed responses are kept for classification but bounded in size
const MAX_ERROR_BODY: usize = 512;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HttpError {
    #[error("request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("connection error: {0}")]
    Connect(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid JSON body: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait HttpClient: Send + Sync + fmt::Debug {
    async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<Value, HttpError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn map_send_error(error: reqwest::Error, timeout: Duration) -> HttpError {
        if error.is_timeout() {
            HttpError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }
        } else if error.is_connect() {
            HttpError::Connect(error.to_string())
        } else {
            HttpError::Other(error.to_string())
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<Value, HttpError> {
        let mut request = self.client.get(url).query(query).timeout(timeout);

        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            if body.is_empty() {
                body = status.canonical_reason().unwrap_or("").to_string();
            }
            return Err(HttpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                Self::map_send_error(e, timeout)
            } else {
                HttpError::Decode(e.to_string())
            }
        })
    }
}
