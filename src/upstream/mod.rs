//! Upstream chat-completions client.
//!
//! Speaks the OpenAI Chat Completions shape against whatever base URL is
//! configured. Unary calls return the parsed JSON body; streaming calls
//! yield raw `data:` payloads over a channel, with an idle timeout
//! between chunks.

use std::time::Duration;

use futures_util::StreamExt;
use secrecy::ExposeSecret;
use tokio::sync::mpsc;

use crate::config::UpstreamConfig;
use crate::error::UpstreamError;

/// HTTP client for the upstream completion API.
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<secrecy::SecretString>,
    request_timeout: Duration,
    stream_idle_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| UpstreamError::Transport(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            request_timeout: config.request_timeout,
            stream_idle_timeout: config.stream_idle_timeout,
        })
    }

    /// Construct the API URL for a given path. Strips a trailing `/v1`
    /// from the base URL to avoid doubling it.
    fn api_url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = base.strip_suffix("/v1").unwrap_or(base);
        format!("{}/v1/{}", base, path.trim_start_matches('/'))
    }

    fn add_auth_header(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(
                "Authorization",
                format!("Bearer {}", key.expose_secret()),
            ),
            None => request,
        }
    }

    /// Unary chat completion: POST the sanitized body, return the JSON
    /// response.
    pub async fn complete(
        &self,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, UpstreamError> {
        let url = self.api_url("chat/completions");
        tracing::debug!(%url, "forwarding unary request upstream");

        let request = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .header("Content-Type", "application/json")
            .json(body);
        let response = self.add_auth_header(request).send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout(self.request_timeout)
            } else {
                UpstreamError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate(&text, 500),
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| UpstreamError::InvalidResponse(format!("JSON parse error: {}", e)))
    }

    /// Streaming chat completion: POST with `stream: true` and yield each
    /// SSE `data:` payload (without the prefix, `[DONE]` included) on the
    /// returned channel. The receiver closing cancels the transfer.
    pub async fn complete_stream(
        &self,
        body: &serde_json::Value,
    ) -> Result<mpsc::Receiver<Result<String, UpstreamError>>, UpstreamError> {
        let url = self.api_url("chat/completions");
        tracing::debug!(%url, "forwarding streaming request upstream");

        let request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(body);
        let response = self.add_auth_header(request).send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout(self.request_timeout)
            } else {
                UpstreamError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate(&text, 500),
            });
        }

        let (tx, rx) = mpsc::channel::<Result<String, UpstreamError>>(64);
        let idle_timeout = self.stream_idle_timeout;
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut line_buf = String::new();

            loop {
                let next = tokio::time::timeout(idle_timeout, bytes.next()).await;
                let chunk = match next {
                    Err(_) => {
                        let _ = tx.send(Err(UpstreamError::Timeout(idle_timeout))).await;
                        return;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        let _ = tx.send(Err(UpstreamError::Transport(e.to_string()))).await;
                        return;
                    }
                    Ok(Some(Ok(chunk))) => chunk,
                };

                line_buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = line_buf.find('\n') {
                    let line: String = line_buf.drain(..=pos).collect();
                    let line = line.trim_end_matches(['\n', '\r']);
                    if let Some(payload) = line.strip_prefix("data:") {
                        let payload = payload.trim_start();
                        if !payload.is_empty()
                            && tx.send(Ok(payload.to_string())).await.is_err()
                        {
                            // Receiver went away: client disconnected.
                            return;
                        }
                    }
                }
            }

            // Trailing line without a newline terminator.
            if let Some(payload) = line_buf.trim_end().strip_prefix("data:") {
                let _ = tx.send(Ok(payload.trim_start().to_string())).await;
            }
        });

        Ok(rx)
    }

    /// Fetch the upstream model list, passing the body through.
    pub async fn list_models(&self) -> Result<serde_json::Value, UpstreamError> {
        let url = self.api_url("models");
        let request = self.client.get(&url).timeout(self.request_timeout);
        let response = self
            .add_auth_header(request)
            .send()
            .await
            .map_err(UpstreamError::from)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate(&text, 500),
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| UpstreamError::InvalidResponse(format!("JSON parse error: {}", e)))
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> UpstreamClient {
        UpstreamClient::new(&UpstreamConfig {
            base_url: base_url.to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            stream_idle_timeout: Duration::from_secs(30),
        })
        .expect("client")
    }

    #[test]
    fn api_url_strips_duplicate_v1() {
        assert_eq!(
            client("https://api.example.com/v1").api_url("chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            client("https://api.example.com/").api_url("models"),
            "https://api.example.com/v1/models"
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
