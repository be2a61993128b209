//! Typed calls into an agent's control server.

use reqwest::Method;
use serde_json::{json, Value};
use super::manager::Supervisor;
use super::proxy::ProxyReply;

impl Supervisor {
    /// `GET /state`
    pub async fn agent_state(&self, team_id: &str, name: &str) -> ProxyReply {
        self.proxy_request(team_id, name, Method::GET, "/state", None).await
    }

    /// `POST /action` with an opaque action body.
    pub async fn send_action(&self, team_id: &str, name: &str, action: Value) -> ProxyReply {
        self.proxy_request(team_id, name, Method::POST, "/action", Some(action)).await
    }

    /// `POST /task`
    pub async fn assign_task(&self, team_id: &str, name: &str, task: Value) -> ProxyReply {
        self.proxy_request(team_id, name, Method::POST, "/task", Some(task)).await
    }

    /// `GET /task/status`
    pub async fn task_status(&self, team_id: &str, name: &str) -> ProxyReply {
        self.proxy_request(team_id, name, Method::GET, "/task/status", None).await
    }

    /// `GET /plan`
    pub async fn get_plan(&self, team_id: &str, name: &str) -> ProxyReply {
        self.proxy_request(team_id, name, Method::GET, "/plan", None).await
    }

    /// `POST /plan`
    pub async fn set_plan(&self, team_id: &str, name: &str, plan: Value) -> ProxyReply {
        self.proxy_request(team_id, name, Method::POST, "/plan", Some(plan)).await
    }

    /// `POST /message` with `{"message": ...}`.
    pub async fn send_message(&self, team_id: &str, name: &str, message: &str) -> ProxyReply {
        let body = json!({ "message": message });
        self.proxy_request(team_id, name, Method::POST, "/message", Some(body)).await
    }

    /// `GET /logs?limit=N` from the agent itself, as opposed to the
    /// supervisor's captured output.
    pub async fn agent_logs(&self, team_id: &str, name: &str, limit: usize) -> ProxyReply {
        let path = format!("/logs?limit={}", limit.max(1));
        self.proxy_request(team_id, name, Method::GET, &path, None).await
    }
}
