//! Seams between the automation and the peer process.
//!
//! The engine reads channel logs through a [`LogSource`] and performs every
//! side effect through a [`ToolSurface`]. Both are traits so that the HTTP
//! bridge in [`http`] can be swapped for in-memory doubles in tests.

pub mod http;

pub use http::HttpBridge;

use async_trait::async_trait;
use rfqbot_sdk::objects::{LogInfo, LogRead};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Errors from reading a channel log.
#[derive(Debug, Error)]
pub enum LogError {
    /// Transport error
    #[error("log request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Bad endpoint URL
    #[error("invalid log endpoint: {0}")]
    Url(#[from] url::ParseError),

    /// The log source answered with an error
    #[error("log source rejected read of {channel}: {message}")]
    Rejected { channel: String, message: String },

    /// The log source answered with something that is not a log response
    #[error("malformed log response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors from invoking a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Transport error
    #[error("tool request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Bad endpoint URL
    #[error("invalid tool endpoint: {0}")]
    Url(#[from] url::ParseError),

    /// The tool ran and reported a failure
    #[error("tool {tool} failed: {message}")]
    Rejected { tool: String, message: String },

    /// The tool result did not have the expected shape
    #[error("unexpected result from {tool}: {source}")]
    Malformed {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ToolError {
    pub fn rejected(tool: &str, message: impl Into<String>) -> Self {
        ToolError::Rejected {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}

/// Read access to the per-channel envelope logs.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Cheap summary of a channel log.
    async fn log_info(&self, channel: &str) -> Result<LogInfo, LogError>;

    /// Entries of a channel log with `seq > after_seq`.
    async fn log_read(&self, channel: &str, after_seq: u64) -> Result<LogRead, LogError>;
}

/// The action surface of the peer process.
#[async_trait]
pub trait ToolSurface: Send + Sync {
    /// Invoke a named tool with JSON arguments.
    async fn invoke(&self, tool: &str, args: Value) -> Result<Value, ToolError>;
}

/// Invoke a tool and deserialize its result.
pub async fn invoke_typed<T: DeserializeOwned>(
    tools: &dyn ToolSurface,
    tool: &str,
    args: Value,
) -> Result<T, ToolError> {
    let value = tools.invoke(tool, args).await?;
    serde_json::from_value(value).map_err(|source| ToolError::Malformed {
        tool: tool.to_string(),
        source,
    })
}
