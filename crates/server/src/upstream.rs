//! Thin HTTP client for OpenAI's Responses API — the upstream this gateway
//! calls. Grounded in the same `reqwest` + `eventsource-stream` shape the
//! rest of this codebase's provider clients use.

use bridge::protocol::openai;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use secrecy::ExposeSecret;
use std::time::Duration;

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";

/// Errors reaching or returned by the upstream Responses API.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The HTTP round-trip itself failed (DNS, TLS, connect, timeout, body read).
    #[error("failed to reach upstream: {0}")]
    Connection(String),
    /// Upstream answered with a non-2xx status.
    #[error("upstream returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Thin, pooled HTTP client for `api.openai.com/v1/responses`.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    api_key: secrecy::SecretString,
}

impl UpstreamClient {
    /// Builds a client with connection pooling tuned for a long-lived gateway process.
    pub fn new(api_key: secrecy::SecretString) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .tcp_nodelay(true)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .pool_idle_timeout(Some(Duration::from_secs(5)))
            .build()
            .expect("failed to build upstream HTTP client");

        Self { http, api_key }
    }

    fn request_builder(&self) -> reqwest::RequestBuilder {
        self.http
            .post(RESPONSES_URL)
            .bearer_auth(self.api_key.expose_secret())
            .header("Content-Type", "application/json")
    }

    /// `GET`-equivalent health probe used by `/test-connection`: sends the
    /// smallest valid request and reports whether the round-trip succeeds.
    pub async fn probe(&self) -> Result<(), UpstreamError> {
        let request = openai::Request {
            model: "gpt-4.1".to_string(),
            input: vec![openai::InputItem::Message {
                role: "user".to_string(),
                content: openai::MessageContent::Text("ping".to_string()),
            }],
            instructions: None,
            max_output_tokens: 16,
            top_p: None,
            previous_response_id: None,
            tools: Vec::new(),
            tool_choice: None,
            stream: false,
        };

        self.send(&request).await.map(|_| ())
    }

    /// Sends a non-streaming request and decodes the JSON response body.
    pub async fn send(&self, request: &openai::Request) -> Result<openai::Response, UpstreamError> {
        let response = self
            .request_builder()
            .json(request)
            .send()
            .await
            .map_err(|err| UpstreamError::Connection(err.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|err| UpstreamError::Connection(format!("failed to parse upstream response: {err}")))
    }

    /// Opens the streaming path and hands back a decoded event stream. The
    /// HTTP round-trip (status, headers) happens here; the state machine in
    /// `crates/bridge` never sees a raw byte.
    pub async fn stream(
        &self,
        request: &openai::Request,
    ) -> Result<impl Stream<Item = openai::StreamEvent> + Send, UpstreamError> {
        let response = self
            .request_builder()
            .json(request)
            .send()
            .await
            .map_err(|err| UpstreamError::Connection(err.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let events = response.bytes_stream().eventsource().filter_map(|event| async move {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    log::warn!("SSE parsing error on upstream stream: {err}");
                    return None;
                }
            };

            if event.data.is_empty() {
                return None;
            }

            match serde_json::from_str::<openai::StreamEvent>(&event.data) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    log::warn!("failed to parse upstream stream event, skipping: {err}");
                    None
                }
            }
        });

        Ok(events)
    }
}
