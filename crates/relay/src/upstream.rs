use axum::http::header;
use localchat_core::frame::EVENT_STREAM;
use reqwest::Response;

/// Outbound side of the relay: one shared HTTP client pointed at the
/// model server's completion endpoint.
#[derive(Clone)]
pub struct UpstreamClient {
    http_client: reqwest::Client,
    model_url: String,
}

impl UpstreamClient {
    pub fn new(model_url: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            model_url: model_url.to_string(),
        }
    }

    pub fn model_url(&self) -> &str {
        &self.model_url
    }

    /// Start a streaming completion. Resolves once response headers arrive;
    /// the body is left unread for the caller to relay.
    pub async fn open_stream(&self, body: &serde_json::Value) -> reqwest::Result<Response> {
        self.http_client
            .post(&self.model_url)
            .header(header::ACCEPT, EVENT_STREAM)
            .json(body)
            .send()
            .await
    }

    pub async fn complete(&self, body: &serde_json::Value) -> reqwest::Result<Response> {
        self.http_client
            .post(&self.model_url)
            .json(body)
            .send()
            .await
    }
}
