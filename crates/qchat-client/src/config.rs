//! Client configuration.

use std::time::Duration;

use qchat_core::{ConnectionConfig, RetryPolicy};

/// Default base URL of the chat API.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default base URL of the push channel.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000";

/// Path of the push channel under the WebSocket base URL.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Time allowed for one control-plane call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Endpoints and timing for one chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the HTTP control plane
    pub api_url: String,
    /// Base URL of the WebSocket data plane
    pub ws_url: String,
    /// Path appended to `ws_url`
    pub ws_path: String,
    /// Reconnect delay policy
    pub retry: RetryPolicy,
    /// Timeout for each control-plane call
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            ws_url: DEFAULT_WS_URL.to_owned(),
            ws_path: DEFAULT_WS_PATH.to_owned(),
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Full URL of the push channel.
    pub fn ws_endpoint(&self) -> String {
        join_url(&self.ws_url, &self.ws_path)
    }

    /// Full URL of a control-plane call.
    pub fn api_endpoint(&self, path: &str) -> String {
        join_url(&self.api_url, path)
    }

    /// Connection state machine configuration.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig { endpoint: self.ws_endpoint(), retry: self.retry }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
