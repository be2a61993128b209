use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Registered,
    Spawning,
    Running,
    Respawning,
    Stopped,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Spawning => "spawning",
            Self::Running => "running",
            Self::Respawning => "respawning",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub msg: String,
}

/// Most-recent-N log lines; the oldest line is evicted first.
#[derive(Debug)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity.min(1024)), capacity }
    }

    pub fn push(&mut self, msg: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry { time: Utc::now(), msg: msg.into() });
    }

    /// The last `limit` entries, oldest first.
    pub fn tail(&self, limit: usize) -> Vec<LogEntry> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub type SharedLogs = Arc<Mutex<LogBuffer>>;

/// Registration input for an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMeta {
    pub name: String,
    pub role: Option<String>,
    pub display_name: Option<String>,
    pub login_name: Option<String>,
    pub soul: Option<String>,
    pub port: Option<u16>,
    pub viewer_port: Option<u16>,
    pub inventory_port: Option<u16>,
    /// The process is run by someone else; the supervisor only tracks it.
    #[serde(default)]
    pub self_hosted: bool,
}

impl AgentMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }
}

/// Read-only view of an agent record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentInfo {
    pub team_id: String,
    pub name: String,
    pub role: Option<String>,
    pub display_name: String,
    pub login_name: String,
    pub status: AgentStatus,
    pub self_hosted: bool,
    pub port: Option<u16>,
    pub viewer_port: Option<u16>,
    pub inventory_port: Option<u16>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub respawn_count: u32,
    pub last_error: Option<String>,
}

/// Handle to a live child process. The process itself is owned by its
/// monitor task; cancelling `kill` asks that task to terminate it.
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    pub pid: Option<u32>,
    pub kill: CancellationToken,
    /// Cancelled by the monitor once the process has been reaped.
    pub exited: CancellationToken,
}

#[derive(Debug)]
pub(crate) struct AgentRecord {
    pub team_id: String,
    pub name: String,
    pub role: Option<String>,
    pub display_name: String,
    pub login_name: String,
    pub soul: Option<String>,
    pub self_hosted: bool,
    pub port: Option<u16>,
    pub viewer_port: Option<u16>,
    pub inventory_port: Option<u16>,
    pub status: AgentStatus,
    pub process: Option<ProcessHandle>,
    pub started_at: Option<DateTime<Utc>>,
    pub run_started: Option<Instant>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub respawn_count: u32,
    pub last_error: Option<String>,
    pub logs: SharedLogs,
    /// Shared with the record's monitor and respawn tasks. Set once by
    /// `remove`; a re-registered agent gets a new flag.
    pub removed: Arc<AtomicBool>,
}

impl AgentRecord {
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// Whether `flag` belongs to this record rather than an earlier one under the same key.
    pub fn owns_flag(&self, flag: &Arc<AtomicBool>) -> bool {
        Arc::ptr_eq(&self.removed, flag)
    }

    pub async fn log(&self, msg: impl Into<String>) {
        self.logs.lock().await.push(msg);
    }

    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            team_id: self.team_id.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            display_name: self.display_name.clone(),
            login_name: self.login_name.clone(),
            status: self.status,
            self_hosted: self.self_hosted,
            port: self.port,
            viewer_port: self.viewer_port,
            inventory_port: self.inventory_port,
            pid: self.process.as_ref().and_then(|p| p.pid),
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            exit_code: self.exit_code,
            respawn_count: self.respawn_count,
            last_error: self.last_error.clone(),
        }
    }
}
