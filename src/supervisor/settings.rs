use std::path::PathBuf;
use std::time::Duration;
use crate::config::SupervisorConfig;
use crate::errors::FleetError;
use super::entrypoint::{EntrypointSource, EntrypointSpec};
use super::policy::RespawnPolicy;

pub const DEFAULT_MAX_LOGS: usize = 300;

/// Resolved supervisor settings.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub game_host: String,
    pub game_port: u16,
    pub base_port: u16,
    /// Mark agents running without launching anything.
    pub dry_run: bool,
    pub entrypoint: Option<EntrypointSpec>,
    pub interpreter: Option<String>,
    /// Base for relative entrypoints and candidate probing.
    pub working_dir: PathBuf,
    pub max_logs: usize,
    pub proxy_timeout: Duration,
    pub chat_whitelist: String,
    pub respawn: RespawnPolicy,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            game_host: "127.0.0.1".to_string(),
            game_port: 25565,
            base_port: 4000,
            dry_run: false,
            entrypoint: None,
            interpreter: None,
            working_dir: PathBuf::from("."),
            max_logs: DEFAULT_MAX_LOGS,
            proxy_timeout: Duration::from_secs(10),
            chat_whitelist: String::new(),
            respawn: RespawnPolicy::default(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, FleetError> {
    match env_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| FleetError::Config(format!("{} is not a valid value: {}", name, raw))),
        None => Ok(None),
    }
}

impl SupervisorSettings {
    /// Settings from the fleet file, falling back to environment variables
    /// and then to defaults.
    pub fn from_config(config: Option<&SupervisorConfig>) -> Result<Self, FleetError> {
        let defaults = Self::default();
        let config = config.cloned().unwrap_or_default();

        let entrypoint = match config.entrypoint {
            Some(path) => Some(EntrypointSpec { path, source: EntrypointSource::Config }),
            None => env_var("AGENT_ENTRYPOINT")
                .or_else(|| env_var("MINDCRAFT_ENTRYPOINT"))
                .or_else(|| env_var("BOT_ENTRYPOINT"))
                .map(|path| EntrypointSpec { path, source: EntrypointSource::Env }),
        };

        let dry_run = match config.dry_run {
            Some(flag) => flag,
            None => env_var("DRY_RUN_AGENTS").is_some_and(|v| v != "0" && !v.eq_ignore_ascii_case("false")),
        };

        let respawn = match config.respawn {
            Some(r) => {
                let base = defaults.respawn;
                RespawnPolicy {
                    max_attempts: r.max_attempts.unwrap_or(base.max_attempts),
                    delay_step: r.delay_step_ms.map(Duration::from_millis).unwrap_or(base.delay_step),
                    max_delay: r.max_delay_ms.map(Duration::from_millis).unwrap_or(base.max_delay),
                    stability_window: r.stability_window_ms.map(Duration::from_millis).unwrap_or(base.stability_window),
                }
            }
            None => defaults.respawn,
        };

        Ok(Self {
            game_host: config.game_host.or_else(|| env_var("MC_HOST")).unwrap_or(defaults.game_host),
            game_port: match config.game_port {
                Some(p) => p,
                None => env_parse("MC_PORT")?.unwrap_or(defaults.game_port),
            },
            base_port: match config.base_port {
                Some(p) => p,
                None => env_parse("AGENT_BASE_PORT")?.unwrap_or(defaults.base_port),
            },
            dry_run,
            entrypoint,
            interpreter: config.interpreter,
            working_dir: config.working_dir.map(PathBuf::from).unwrap_or(defaults.working_dir),
            max_logs: config.max_logs.unwrap_or(defaults.max_logs).max(1),
            proxy_timeout: config.proxy_timeout_ms.map(Duration::from_millis).unwrap_or(defaults.proxy_timeout),
            chat_whitelist: config.chat_whitelist.or_else(|| env_var("CHAT_WHITELIST")).unwrap_or_default(),
            respawn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RespawnConfig;

    #[test]
    fn test_defaults() {
        let s = SupervisorSettings::default();
        assert_eq!(s.base_port, 4000);
        assert_eq!(s.max_logs, 300);
        assert_eq!(s.respawn, RespawnPolicy::default());
    }

    #[test]
    fn test_config_values_win() {
        let config = SupervisorConfig {
            game_host: Some("mc.internal".into()),
            game_port: Some(25570),
            base_port: Some(5000),
            dry_run: Some(true),
            entrypoint: Some("bots/agent.js".into()),
            max_logs: Some(10),
            respawn: Some(RespawnConfig { max_attempts: Some(2), delay_step_ms: Some(100), ..Default::default() }),
            ..Default::default()
        };
        let s = SupervisorSettings::from_config(Some(&config)).unwrap();
        assert_eq!(s.game_host, "mc.internal");
        assert_eq!(s.game_port, 25570);
        assert_eq!(s.base_port, 5000);
        assert!(s.dry_run);
        assert_eq!(s.max_logs, 10);
        assert_eq!(s.entrypoint.unwrap().source, EntrypointSource::Config);
        assert_eq!(s.respawn.max_attempts, 2);
        assert_eq!(s.respawn.delay_step, Duration::from_millis(100));
        assert_eq!(s.respawn.max_delay, Duration::from_secs(30));
    }
}
