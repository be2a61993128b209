use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::Utc;
use futures::future::join_all;
use reqwest::Method;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use crate::errors::FleetError;
use super::entrypoint::{resolve_entrypoint, Entrypoint};
use super::identity::make_login_username;
use super::policy::RespawnDecision;
use super::ports::{PortAllocator, PortTriplet};
use super::proxy::{ControlClient, ProxyFailure, ProxyReply};
use super::record::{AgentInfo, AgentMeta, AgentRecord, AgentStatus, LogBuffer, LogEntry, ProcessHandle, SharedLogs};
use super::settings::SupervisorSettings;

pub const DEFAULT_LOG_LIMIT: usize = 50;

/// Time a process gets to exit after SIGTERM before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Extra time `shutdown` waits past the grace period for SIGKILLed processes to be reaped.
const REAP_SLACK: Duration = Duration::from_secs(2);

pub fn agent_key(team_id: &str, name: &str) -> String {
    format!("{}/{}", team_id, name)
}

struct SupervisorInner {
    settings: SupervisorSettings,
    ports: PortAllocator,
    agents: Mutex<HashMap<String, AgentRecord>>,
    control: ControlClient,
}

/// Registry of agent processes keyed by `team/name`.
///
/// The registry lock is only held for bookkeeping. Child processes are owned
/// by per-process monitor tasks, and respawns run from their own timer tasks.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings) -> Result<Self, FleetError> {
        let control = ControlClient::new(settings.proxy_timeout)?;
        Ok(Self {
            inner: Arc::new(SupervisorInner {
                ports: PortAllocator::new(settings.base_port),
                agents: Mutex::new(HashMap::new()),
                control,
                settings,
            }),
        })
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.inner.settings
    }

    pub fn allocate_ports(&self) -> Result<PortTriplet, FleetError> {
        self.inner.ports.allocate()
    }

    /// Register an agent. Registering an existing key returns the existing
    /// record unchanged.
    pub async fn register(&self, team_id: &str, meta: AgentMeta) -> Result<AgentInfo, FleetError> {
        let team_id = team_id.trim();
        let name = meta.name.trim();
        if team_id.is_empty() || name.is_empty() {
            return Err(FleetError::Validation("agent team and name are required".to_string()));
        }

        let key = agent_key(team_id, name);
        let mut agents = self.inner.agents.lock().await;
        if let Some(existing) = agents.get(&key) {
            debug!(agent = %key, "Agent already registered");
            return Ok(existing.info());
        }

        let (port, viewer_port, inventory_port) = if meta.port.is_none() && !meta.self_hosted {
            let ports = self.allocate_ports()?;
            (Some(ports.api), Some(ports.viewer), Some(ports.inventory))
        } else {
            (meta.port, meta.viewer_port, meta.inventory_port)
        };

        let login_name = meta
            .login_name
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| make_login_username(team_id, name));
        let display_name = meta
            .display_name
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("[{}] {}", team_id, name));

        let record = AgentRecord {
            team_id: team_id.to_string(),
            name: name.to_string(),
            role: meta.role,
            display_name,
            login_name,
            soul: meta.soul,
            self_hosted: meta.self_hosted,
            port,
            viewer_port,
            inventory_port,
            status: AgentStatus::Registered,
            process: None,
            started_at: None,
            run_started: None,
            stopped_at: None,
            exit_code: None,
            respawn_count: 0,
            last_error: None,
            logs: Arc::new(Mutex::new(LogBuffer::new(self.inner.settings.max_logs))),
            removed: Arc::new(AtomicBool::new(false)),
        };

        let info = record.info();
        agents.insert(key, record);
        info!(
            team_id,
            name,
            port = ?info.port,
            self_hosted = info.self_hosted,
            "Agent registered"
        );
        Ok(info)
    }

    pub async fn get_agent(&self, team_id: &str, name: &str) -> Option<AgentInfo> {
        let agents = self.inner.agents.lock().await;
        agents.get(&agent_key(team_id, name)).map(AgentRecord::info)
    }

    /// Agents of one team, sorted by name.
    pub async fn list_agents(&self, team_id: &str) -> Vec<AgentInfo> {
        let agents = self.inner.agents.lock().await;
        let mut list: Vec<AgentInfo> = agents
            .values()
            .filter(|r| r.team_id == team_id)
            .map(AgentRecord::info)
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    pub async fn all_agents(&self) -> Vec<AgentInfo> {
        let agents = self.inner.agents.lock().await;
        let mut list: Vec<AgentInfo> = agents.values().map(AgentRecord::info).collect();
        list.sort_by(|a, b| (&a.team_id, &a.name).cmp(&(&b.team_id, &b.name)));
        list
    }

    /// Start the agent's process. Returns `None` for an unknown agent.
    /// Spawn failures are recorded on the agent, not returned.
    pub async fn spawn(&self, team_id: &str, name: &str) -> Option<AgentInfo> {
        self.spawn_record(team_id, name, None).await
    }

    /// `expected` pins the spawn to one registration of the key, so a timer
    /// armed for a removed agent cannot start its replacement.
    async fn spawn_record(
        &self,
        team_id: &str,
        name: &str,
        expected: Option<&Arc<AtomicBool>>,
    ) -> Option<AgentInfo> {
        let settings = &self.inner.settings;
        let mut agents = self.inner.agents.lock().await;
        let record = agents.get_mut(&agent_key(team_id, name))?;

        if let Some(flag) = expected {
            if !record.owns_flag(flag) || record.is_removed() {
                return None;
            }
        }
        if record.process.is_some() || record.status == AgentStatus::Running {
            return Some(record.info());
        }
        if record.self_hosted {
            record.status = AgentStatus::Registered;
            return Some(record.info());
        }
        if settings.dry_run {
            record.status = AgentStatus::Running;
            record.started_at = Some(Utc::now());
            record.run_started = Some(Instant::now());
            record.exit_code = None;
            record.log("[dry-run] spawned").await;
            info!(team_id, name, "Agent marked running (dry run)");
            return Some(record.info());
        }

        record.status = AgentStatus::Spawning;
        let entry = match resolve_entrypoint(
            settings.entrypoint.as_ref(),
            settings.interpreter.as_deref(),
            &settings.working_dir,
        ) {
            Ok(entry) => entry,
            Err(e) => {
                mark_spawn_error(record, &e).await;
                return Some(record.info());
            }
        };

        let mut command = entry.command();
        let dir = entry.working_dir();
        if !dir.as_os_str().is_empty() {
            command.current_dir(dir);
        }
        command
            .envs(agent_environment(settings, record, &entry))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = FleetError::Spawn(format!("Failed to launch {}: {}", entry.path.display(), e));
                mark_spawn_error(record, &err).await;
                return Some(record.info());
            }
        };

        let pid = child.id();
        let kill = CancellationToken::new();
        let exited = CancellationToken::new();
        record.process = Some(ProcessHandle { pid, kill: kill.clone(), exited: exited.clone() });
        record.status = AgentStatus::Running;
        record.started_at = Some(Utc::now());
        record.run_started = Some(Instant::now());
        record.exit_code = None;
        record.last_error = None;
        record
            .log(format!(
                "[spawned] pid={} entry={}",
                pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string()),
                entry.path.display()
            ))
            .await;
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pipe_lines(stdout, record.logs.clone(), ""));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pipe_lines(stderr, record.logs.clone(), "[err] "));
        }
        info!(
            team_id,
            name,
            pid = ?pid,
            port = ?record.port,
            entry = %entry.path.display(),
            source = entry.source.as_str(),
            "Agent spawned"
        );

        let info = record.info();
        let removed = record.removed.clone();
        drop(agents);

        tokio::spawn(self.clone().monitor(
            team_id.to_string(),
            name.to_string(),
            child,
            kill,
            exited,
            removed,
        ));
        Some(info)
    }

    async fn monitor(
        self,
        team_id: String,
        name: String,
        mut child: Child,
        kill: CancellationToken,
        exited: CancellationToken,
        removed: Arc<AtomicBool>,
    ) {
        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = kill.cancelled() => None,
        };
        let status = match waited {
            Some(status) => status,
            None => terminate(&mut child).await,
        };
        exited.cancel();

        let exit_code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(team_id = %team_id, name = %name, error = %e, "Failed to wait on agent process");
                None
            }
        };
        self.handle_exit(&team_id, &name, &removed, exit_code).await;
    }

    async fn handle_exit(&self, team_id: &str, name: &str, removed: &Arc<AtomicBool>, exit_code: Option<i32>) {
        if removed.load(Ordering::SeqCst) {
            debug!(team_id, name, code = ?exit_code, "Removed agent exited");
            return;
        }

        let policy = self.inner.settings.respawn;
        let mut agents = self.inner.agents.lock().await;
        let Some(record) = agents.get_mut(&agent_key(team_id, name)) else {
            return;
        };
        if !record.owns_flag(removed) {
            return;
        }

        record.process = None;
        record.stopped_at = Some(Utc::now());
        record.exit_code = exit_code;
        let code = exit_code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string());
        record.log(format!("[exit] code={}", code)).await;

        let ran_for = record.run_started.take().map(|t| t.elapsed()).unwrap_or_default();
        let decision = policy.on_exit(record.respawn_count, ran_for);
        record.respawn_count = decision.count();

        match decision {
            RespawnDecision::Respawn { attempt, delay } => {
                record.status = AgentStatus::Respawning;
                record
                    .log(format!(
                        "[respawn] attempt {}/{} in {}s",
                        attempt,
                        policy.max_attempts,
                        delay.as_secs_f64()
                    ))
                    .await;
                warn!(
                    team_id,
                    name,
                    code = %code,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Agent exited, respawn scheduled"
                );
                drop(agents);
                self.schedule_respawn(team_id.to_string(), name.to_string(), removed.clone(), delay);
            }
            RespawnDecision::GiveUp { attempts } => {
                record.status = AgentStatus::Stopped;
                record.log(format!("[respawn] gave up after {} attempts", attempts)).await;
                error!(team_id, name, code = %code, attempts, "Agent keeps crashing, giving up");
            }
        }
    }

    fn schedule_respawn(&self, team_id: String, name: String, removed: Arc<AtomicBool>, delay: Duration) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if removed.load(Ordering::SeqCst) {
                debug!(team_id = %team_id, name = %name, "Respawn cancelled, agent removed");
                return;
            }
            match supervisor.spawn_record(&team_id, &name, Some(&removed)).await {
                Some(info) if info.status == AgentStatus::Error => {
                    error!(
                        team_id = %team_id,
                        name = %name,
                        error = info.last_error.as_deref().unwrap_or(""),
                        "Auto-respawn failed"
                    );
                }
                Some(_) => {}
                None => debug!(team_id = %team_id, name = %name, "Respawn skipped"),
            }
        });
    }

    /// Remove an agent, terminating its process and cancelling any pending
    /// respawn. Returns false for an unknown agent.
    pub async fn remove(&self, team_id: &str, name: &str) -> bool {
        self.detach(team_id, name).await.is_some()
    }

    /// Delete the record and signal its process. The inner token, present
    /// when a process was attached, fires once that process is reaped.
    async fn detach(&self, team_id: &str, name: &str) -> Option<Option<CancellationToken>> {
        let mut record = {
            let mut agents = self.inner.agents.lock().await;
            let record = agents.remove(&agent_key(team_id, name))?;
            record.removed.store(true, Ordering::SeqCst);
            record
        };

        let exited = record.process.take().map(|process| {
            info!(team_id, name, pid = ?process.pid, "Terminating agent process");
            process.kill.cancel();
            process.exited
        });
        record.status = AgentStatus::Stopped;
        info!(team_id, name, "Agent removed");
        Some(exited)
    }

    /// The last `limit` log lines (default 50, at least 1). Empty for an
    /// unknown agent.
    pub async fn get_logs(&self, team_id: &str, name: &str, limit: Option<usize>) -> Vec<LogEntry> {
        let logs = {
            let agents = self.inner.agents.lock().await;
            match agents.get(&agent_key(team_id, name)) {
                Some(record) => record.logs.clone(),
                None => return Vec::new(),
            }
        };
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT).max(1);
        let buffer = logs.lock().await;
        buffer.tail(limit)
    }

    /// Forward a request to a running agent's control server.
    pub async fn proxy_request(
        &self,
        team_id: &str,
        name: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ProxyReply {
        let port = {
            let agents = self.inner.agents.lock().await;
            match agents.get(&agent_key(team_id, name)) {
                Some(record) if record.status == AgentStatus::Running => record.port,
                _ => None,
            }
        };
        let Some(port) = port else {
            return ProxyReply::Failed(ProxyFailure::AgentNotRunning);
        };
        self.inner.control.send(port, method, path, body.as_ref()).await
    }

    /// Remove every agent and wait, up to the termination grace period, for
    /// their processes to exit.
    pub async fn shutdown(&self) {
        let keys: Vec<(String, String)> = {
            let agents = self.inner.agents.lock().await;
            agents.values().map(|r| (r.team_id.clone(), r.name.clone())).collect()
        };
        info!(count = keys.len(), "Shutting down agents");

        let pending: Vec<CancellationToken> = join_all(keys.iter().map(|(team_id, name)| self.detach(team_id, name)))
            .await
            .into_iter()
            .flatten()
            .flatten()
            .collect();
        if pending.is_empty() {
            return;
        }

        let reaped = join_all(pending.iter().map(CancellationToken::cancelled));
        if tokio::time::timeout(TERMINATE_GRACE + REAP_SLACK, reaped).await.is_err() {
            warn!(processes = pending.len(), "Agent processes still running after shutdown grace period");
        }
    }
}

async fn mark_spawn_error(record: &mut AgentRecord, err: &FleetError) {
    record.status = AgentStatus::Error;
    record.last_error = Some(err.to_string());
    record.log(format!("[spawn_error] {}", err)).await;
    error!(team_id = %record.team_id, name = %record.name, error = %err, "Agent spawn failed");
}

fn agent_environment(
    settings: &SupervisorSettings,
    record: &AgentRecord,
    entry: &Entrypoint,
) -> Vec<(&'static str, String)> {
    let port = |p: Option<u16>| p.map(|p| p.to_string()).unwrap_or_default();
    vec![
        ("MC_HOST", settings.game_host.clone()),
        ("MC_PORT", settings.game_port.to_string()),
        ("BOT_USERNAME", record.login_name.clone()),
        ("API_PORT", port(record.port)),
        ("VIEWER_PORT", port(record.viewer_port)),
        ("INVENTORY_PORT", port(record.inventory_port)),
        ("TEAM_ID", record.team_id.clone()),
        ("AGENT_NAME", record.name.clone()),
        ("SOUL", record.soul.clone().unwrap_or_default()),
        ("CHAT_WHITELIST", settings.chat_whitelist.clone()),
        ("RUNNER_SOURCE", entry.source.as_str().to_string()),
    ]
}

/// Copy the stream into the log buffer line by line until EOF. Invalid UTF-8
/// is replaced rather than ending the read, so the child never sees a closed pipe.
async fn pipe_lines<R>(reader: R, logs: SharedLogs, prefix: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim();
                if !line.is_empty() {
                    logs.lock().await.push(format!("{}{}", prefix, line));
                }
            }
            Err(e) => {
                debug!(error = %e, "Agent output stream closed");
                break;
            }
        }
    }
}

/// SIGTERM, then SIGKILL once the grace period runs out.
async fn terminate(child: &mut Child) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                if let Ok(status) = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                    return status;
                }
            }
        }
    }

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Kill signal not delivered");
    }
    child.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dry_run_settings() -> SupervisorSettings {
        SupervisorSettings { dry_run: true, base_port: 5100, ..Default::default() }
    }

    #[test]
    fn test_agent_key() {
        assert_eq!(agent_key("red", "alice"), "red/alice");
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let supervisor = Supervisor::new(dry_run_settings()).unwrap();
        let first = supervisor.register("red", AgentMeta::new("alice")).await.unwrap();
        let second = supervisor.register("red", AgentMeta::new("alice")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.port, Some(5100));
        assert_eq!(first.viewer_port, Some(5101));
        assert_eq!(first.inventory_port, Some(5102));
        assert_eq!(first.display_name, "[red] alice");
        assert!(first.login_name.starts_with("cc"));

        let other = supervisor.register("red", AgentMeta::new("bob")).await.unwrap();
        assert_eq!(other.port, Some(5103));
    }

    #[tokio::test]
    async fn test_register_rejects_blank_name() {
        let supervisor = Supervisor::new(dry_run_settings()).unwrap();
        let err = supervisor.register("red", AgentMeta::new("  ")).await.unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
    }

    #[tokio::test]
    async fn test_self_hosted_skips_ports_and_spawn() {
        let supervisor = Supervisor::new(dry_run_settings()).unwrap();
        let meta = AgentMeta { self_hosted: true, ..AgentMeta::new("eve") };
        let info = supervisor.register("blue", meta).await.unwrap();
        assert_eq!(info.port, None);

        let info = supervisor.spawn("blue", "eve").await.unwrap();
        assert_eq!(info.status, AgentStatus::Registered);
        assert!(supervisor.get_logs("blue", "eve", None).await.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_spawn() {
        let supervisor = Supervisor::new(dry_run_settings()).unwrap();
        supervisor.register("red", AgentMeta::new("alice")).await.unwrap();
        let info = supervisor.spawn("red", "alice").await.unwrap();
        assert_eq!(info.status, AgentStatus::Running);
        assert_eq!(info.pid, None);

        let logs = supervisor.get_logs("red", "alice", None).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].msg, "[dry-run] spawned");

        assert!(supervisor.spawn("red", "missing").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_and_lists() {
        let supervisor = Supervisor::new(dry_run_settings()).unwrap();
        supervisor.register("red", AgentMeta::new("zed")).await.unwrap();
        supervisor.register("red", AgentMeta::new("amy")).await.unwrap();
        supervisor.register("blue", AgentMeta::new("bob")).await.unwrap();

        let names: Vec<String> = supervisor.list_agents("red").await.into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["amy", "zed"]);
        assert_eq!(supervisor.all_agents().await.len(), 3);

        assert!(supervisor.remove("red", "zed").await);
        assert!(!supervisor.remove("red", "zed").await);
        assert!(supervisor.get_agent("red", "zed").await.is_none());

        supervisor.shutdown().await;
        assert!(supervisor.all_agents().await.is_empty());
    }

    #[tokio::test]
    async fn test_proxy_requires_running_agent() {
        let supervisor = Supervisor::new(dry_run_settings()).unwrap();
        supervisor.register("red", AgentMeta::new("alice")).await.unwrap();
        let reply = supervisor.proxy_request("red", "alice", Method::GET, "/state", None).await;
        assert!(matches!(reply, ProxyReply::Failed(ProxyFailure::AgentNotRunning)));

        let reply = supervisor.proxy_request("red", "ghost", Method::GET, "/state", None).await;
        assert!(matches!(reply, ProxyReply::Failed(ProxyFailure::AgentNotRunning)));
    }
}
