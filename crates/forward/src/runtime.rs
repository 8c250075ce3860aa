//! The gateway call: forward one prompt to one backend and unwrap the reply.
//!
//! A [`Forwarder`] owns a pooled HTTP client and nothing else. It is cheap to clone and safe
//! to share across tasks; calls never observe each other.

use crate::catalog::EndpointConfig;
use crate::envelope::{self, ChatRequest};
use crate::error::{ForwardError, Result};
use crate::safety::{
    ERROR_DETAIL_CHARS, PROMPT_PREVIEW_CHARS, preview, redact_url, redact_url_str,
    sanitize_reqwest_error,
};
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::error::Error as _;
use tracing::{debug, error, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client,
}

impl Forwarder {
    /// Build a forwarder with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> std::result::Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("model-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Forward `prompt` to `endpoint` and return `choices[0].message.content`.
    ///
    /// The request is a single POST bounded by `endpoint.timeout`; there is no retry.
    ///
    /// # Errors
    ///
    /// - [`ForwardError::ConfigurationMissing`] if URL or key is unset (no request is sent)
    /// - [`ForwardError::Transport`] on connect/TLS/timeout failures
    /// - [`ForwardError::BackendStatus`] on a non-2xx reply
    /// - [`ForwardError::MalformedResponse`] if the reply is not a chat completion
    pub async fn forward(&self, prompt: &str, endpoint: &EndpointConfig) -> Result<String> {
        debug!(
            backend = %endpoint.label,
            prompt_len = prompt.chars().count(),
            prompt_preview = %preview(prompt, PROMPT_PREVIEW_CHARS),
            "received prompt"
        );

        let (Some(url), Some(api_key)) = (endpoint.url.as_deref(), endpoint.api_key.as_deref())
        else {
            let missing = endpoint.missing();
            error!(
                backend = %endpoint.label,
                missing = %missing.join(", "),
                "backend configuration missing"
            );
            return Err(ForwardError::ConfigurationMissing {
                label: endpoint.label.clone(),
                missing,
            });
        };

        let url = Url::parse(url).map_err(|e| {
            let err = ForwardError::Transport {
                label: endpoint.label.clone(),
                message: format!("invalid URL in {}: {e}", endpoint.url_var),
            };
            error!(backend = %endpoint.label, error = %err, "backend request failed");
            err
        })?;

        debug!(
            backend = %endpoint.label,
            url = %redact_url_str(url.as_str()),
            timeout_secs = endpoint.timeout.as_secs_f64(),
            "sending prompt to backend"
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&ChatRequest::user(prompt))
            .timeout(endpoint.timeout)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, &e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(endpoint, &e))?;

        if !status.is_success() {
            let detail = status_detail(status, &bytes);
            error!(
                backend = %endpoint.label,
                status = status.as_u16(),
                detail = %detail,
                "backend returned error status"
            );
            return Err(ForwardError::BackendStatus {
                label: endpoint.label.clone(),
                status: status.as_u16(),
                detail,
            });
        }

        match envelope::parse_reply(&bytes) {
            Ok(text) => {
                debug!(
                    backend = %endpoint.label,
                    response_len = text.chars().count(),
                    "received backend response"
                );
                Ok(text)
            }
            Err(reason) => {
                warn!(
                    backend = %endpoint.label,
                    reason = %reason,
                    body_preview = %preview(&String::from_utf8_lossy(&bytes), ERROR_DETAIL_CHARS),
                    "unexpected response format"
                );
                Err(ForwardError::MalformedResponse {
                    label: endpoint.label.clone(),
                    reason,
                })
            }
        }
    }

    /// Like [`Self::forward`], but always returns a string: the content on success, or an
    /// `Error: ...` sentence on any failure.
    pub async fn forward_text(&self, prompt: &str, endpoint: &EndpointConfig) -> String {
        match self.forward(prompt, endpoint).await {
            Ok(text) => text,
            Err(e) => e.to_tool_text(),
        }
    }

    /// Forward tabular rows as a JSON-encoded prompt.
    ///
    /// If the backend answers with JSON text, it is re-emitted pretty-printed; any other
    /// content is returned unchanged.
    ///
    /// # Errors
    ///
    /// Same as [`Self::forward`].
    pub async fn forward_rows(
        &self,
        rows: &[Map<String, Value>],
        endpoint: &EndpointConfig,
    ) -> Result<String> {
        let prompt = serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string());
        let content = self.forward(&prompt, endpoint).await?;
        Ok(pretty_if_json(content))
    }
}

fn pretty_if_json(content: String) -> String {
    match serde_json::from_str::<Value>(&content) {
        Ok(v) => serde_json::to_string_pretty(&v).unwrap_or(content),
        Err(_) => content,
    }
}

fn transport_error(endpoint: &EndpointConfig, e: &reqwest::Error) -> ForwardError {
    let message = if e.is_timeout() {
        format!("timed out after {}s", endpoint.timeout.as_secs_f64())
    } else {
        describe_reqwest_error(e)
    };
    let err = ForwardError::Transport {
        label: endpoint.label.clone(),
        message,
    };
    error!(backend = %endpoint.label, error = %err, "backend request failed");
    err
}

/// reqwest's top-level message rarely says *why* a connection failed; append the source chain.
fn describe_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = sanitize_reqwest_error(e);
    let mut source = e.source();
    while let Some(s) = source {
        let part = match e.url() {
            Some(u) => s.to_string().replace(u.as_str(), &redact_url(u)),
            None => s.to_string(),
        };
        if !msg.contains(&part) {
            msg.push_str(": ");
            msg.push_str(&part);
        }
        source = s.source();
    }
    msg
}

fn status_detail(status: StatusCode, body: &[u8]) -> String {
    let reason = status.canonical_reason().unwrap_or("Unknown");
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        reason.to_string()
    } else {
        format!("{reason} - {}", preview(text, ERROR_DETAIL_CHARS))
    }
}
