use std::time::Duration;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, warn};
use crate::errors::FleetError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyFailure {
    /// Unknown agent, agent not `running`, or no port assigned.
    AgentNotRunning,
    /// The request never produced a response.
    Transport(String),
    /// The path does not start with `/` and could redirect the request off localhost.
    InvalidPath(String),
}

impl ProxyFailure {
    pub fn code(&self) -> String {
        match self {
            Self::AgentNotRunning => "agent_not_running".to_string(),
            Self::Transport(msg) => format!("proxy_error:{}", msg),
            Self::InvalidPath(_) => "invalid_path".to_string(),
        }
    }
}

/// Outcome of a control-plane call. Never an `Err`: callers poll these in
/// tight loops and branch on the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyReply {
    /// The agent answered with a JSON body, passed through untouched.
    Json(Value),
    /// The agent answered with an empty body.
    Empty { ok: bool, status: u16 },
    /// The agent answered with a non-JSON body.
    Text { ok: bool, status: u16, body: String },
    Failed(ProxyFailure),
}

impl ProxyReply {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The JSON shape handed back to external callers.
    pub fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Empty { ok, status } => json!({ "ok": ok, "status": status }),
            Self::Text { ok, status, body } => json!({ "ok": ok, "status": status, "body": body }),
            Self::Failed(failure) => json!({ "ok": false, "error": failure.code() }),
        }
    }
}

/// HTTP client for the agents' local control plane.
#[derive(Debug, Clone)]
pub struct ControlClient {
    client: Client,
}

impl ControlClient {
    pub fn new(timeout: Duration) -> Result<Self, FleetError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FleetError::Network(format!("Failed to build control client: {}", e)))?;
        Ok(Self { client })
    }

    pub async fn send(&self, port: u16, method: Method, path: &str, body: Option<&Value>) -> ProxyReply {
        if !path.starts_with('/') {
            warn!(path, "Rejected agent control path");
            return ProxyReply::Failed(ProxyFailure::InvalidPath(path.to_string()));
        }
        let url = format!("http://127.0.0.1:{}{}", port, path);
        debug!(%url, %method, "Proxying agent control call");

        let mut request = self.client
            .request(method, &url)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return ProxyReply::Failed(ProxyFailure::Transport(e.to_string())),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => return ProxyReply::Failed(ProxyFailure::Transport(e.to_string())),
        };

        if text.is_empty() {
            return ProxyReply::Empty { ok: status.is_success(), status: status.as_u16() };
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(value) => ProxyReply::Json(value),
            Err(_) => ProxyReply::Text { ok: status.is_success(), status: status.as_u16(), body: text },
        }
    }
}
