use serde::{Deserialize, Serialize};
use crate::board::BoardSeed;

/// Top-level fleet file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FleetConfig {
    pub board: Option<BoardConfig>,
    pub supervisor: Option<SupervisorConfig>,
    pub agents: Option<Vec<AgentConfig>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BoardConfig {
    pub state_file: Option<String>,
    pub seed: Option<BoardSeed>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SupervisorConfig {
    pub game_host: Option<String>,
    pub game_port: Option<u16>,
    pub base_port: Option<u16>,
    pub dry_run: Option<bool>,
    pub entrypoint: Option<String>,
    pub interpreter: Option<String>,
    pub working_dir: Option<String>,
    pub max_logs: Option<usize>,
    pub proxy_timeout_ms: Option<u64>,
    pub chat_whitelist: Option<String>,
    pub respawn: Option<RespawnConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default)]
pub struct RespawnConfig {
    pub max_attempts: Option<u32>,
    pub delay_step_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub stability_window_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    pub team: String,
    pub name: String,
    pub role: Option<String>,
    pub display_name: Option<String>,
    pub login_name: Option<String>,
    pub soul: Option<String>,
    #[serde(default)]
    pub self_hosted: bool,
}
