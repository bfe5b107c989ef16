//! JSON/HTTP implementation of the bridge traits.
//!
//! Endpoints, relative to the configured base URL:
//!
//! * `POST v1/tools/{tool}` with the tool arguments as the JSON body
//! * `GET v1/sc/log/info?channel=...`
//! * `GET v1/sc/log/read?channel=...&after_seq=...`
//!
//! Any non-2xx answer is a rejection carrying the response text.

use super::{LogError, LogSource, ToolError, ToolSurface};
use async_trait::async_trait;
use reqwest::Client;
use rfqbot_sdk::objects::{LogInfo, LogRead};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpBridge {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBridge {
    /// Create a bridge talking to `base_url`.
    ///
    /// Requests time out after `timeout`; a tool call that times out is a
    /// failed action and is retried on a later tick.
    pub fn new(base_url: Url, token: Option<String>, timeout: Duration) -> Self {
        Self {
            http: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: with_trailing_slash(base_url),
            token,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_log<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        channel: &str,
        after_seq: Option<u64>,
    ) -> Result<T, LogError> {
        let mut url = self.endpoint(path)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("channel", channel);
            if let Some(after_seq) = after_seq {
                query.append_pair("after_seq", &after_seq.to_string());
            }
        }

        let resp = self.authorize(self.http.get(url)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LogError::Rejected {
                channel: channel.to_string(),
                message: format!("{status}: {body}"),
            });
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl LogSource for HttpBridge {
    async fn log_info(&self, channel: &str) -> Result<LogInfo, LogError> {
        self.get_log("v1/sc/log/info", channel, None).await
    }

    async fn log_read(&self, channel: &str, after_seq: u64) -> Result<LogRead, LogError> {
        self.get_log("v1/sc/log/read", channel, Some(after_seq)).await
    }
}

#[async_trait]
impl ToolSurface for HttpBridge {
    async fn invoke(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
        let url = self.endpoint(&format!("v1/tools/{tool}"))?;
        debug!(tool, "Invoking tool");

        let resp = self
            .authorize(self.http.post(url))
            .json(&args)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolError::rejected(tool, format!("{status}: {body}")));
        }
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|source| ToolError::Malformed {
            tool: tool.to_string(),
            source,
        })
    }
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_keep_base_path() {
        let base = Url::parse("http://127.0.0.1:9333/bridge").unwrap();
        let bridge = HttpBridge::new(base, None, Duration::from_secs(5));
        assert_eq!(
            bridge.endpoint("v1/tools/intercomswap_sc_info").unwrap().as_str(),
            "http://127.0.0.1:9333/bridge/v1/tools/intercomswap_sc_info"
        );

        let base = Url::parse("http://127.0.0.1:9333/").unwrap();
        let bridge = HttpBridge::new(base, Some("t".into()), Duration::from_secs(5));
        assert_eq!(
            bridge.endpoint("v1/sc/log/info").unwrap().as_str(),
            "http://127.0.0.1:9333/v1/sc/log/info"
        );
    }
}
