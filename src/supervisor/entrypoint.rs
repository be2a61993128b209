use std::path::{Path, PathBuf};
use serde::Serialize;
use tokio::process::Command;
use crate::errors::FleetError;

/// Runtime locations probed, in order, when no entrypoint is configured.
pub const CANDIDATES: &[&str] = &[
    "vendor/mindcraft/clawcraft-entry.js",
    "vendor/agent-runtime/agent.js",
    "vendor/agent-runtime/src/agent.js",
    "vendor/agent-runtime/index.js",
    "skills/clawcraft/agent.js",
    "app/agent-bridge.js",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrypointSource {
    Env,
    Config,
    Vendor,
    Fallback,
}

impl EntrypointSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Config => "config",
            Self::Vendor => "vendor",
            Self::Fallback => "fallback",
        }
    }
}

/// An explicitly requested entrypoint and where the request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrypointSpec {
    pub path: String,
    pub source: EntrypointSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entrypoint {
    pub path: PathBuf,
    pub source: EntrypointSource,
    pub interpreter: Option<String>,
}

impl Entrypoint {
    /// Agents run from their entrypoint's directory. Bridge entrypoints run
    /// from the sibling runtime directory, where the runtime's profiles live.
    pub fn working_dir(&self) -> PathBuf {
        let dir = self.path.parent().map(Path::to_path_buf).unwrap_or_default();
        if dir.file_name().is_some_and(|n| n == "mindcraft-bridge") {
            if let Some(parent) = dir.parent() {
                return parent.join("mindcraft");
            }
        }
        dir
    }

    pub fn command(&self) -> Command {
        match &self.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(&self.path);
                command
            }
            None => Command::new(&self.path),
        }
    }
}

fn default_interpreter(path: &Path) -> Option<String> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("js") | Some("mjs") | Some("cjs") => Some("node".to_string()),
        _ => None,
    }
}

/// Locate the agent runtime. An explicit entrypoint must exist; otherwise the
/// first existing [`CANDIDATES`] entry under `base_dir` wins.
pub fn resolve_entrypoint(
    explicit: Option<&EntrypointSpec>,
    interpreter: Option<&str>,
    base_dir: &Path,
) -> Result<Entrypoint, FleetError> {
    let (path, source) = match explicit {
        Some(spec) => {
            let requested = Path::new(&spec.path);
            let absolute = if requested.is_absolute() {
                requested.to_path_buf()
            } else {
                base_dir.join(requested)
            };
            if !absolute.exists() {
                return Err(FleetError::Spawn(format!(
                    "Agent entrypoint not found: {}",
                    absolute.display()
                )));
            }
            (absolute, spec.source)
        }
        None => {
            let found = CANDIDATES
                .iter()
                .map(|candidate| (*candidate, base_dir.join(candidate)))
                .find(|(_, path)| path.exists());
            match found {
                Some((candidate, path)) => {
                    let source = if candidate.starts_with("vendor/agent-runtime/") {
                        EntrypointSource::Vendor
                    } else {
                        EntrypointSource::Fallback
                    };
                    (path, source)
                }
                None => {
                    return Err(FleetError::Spawn(
                        "No agent runtime entrypoint found. Set AGENT_ENTRYPOINT or add vendor/agent-runtime.".into(),
                    ));
                }
            }
        }
    };

    let interpreter = interpreter
        .map(str::to_string)
        .or_else(|| default_interpreter(&path));

    Ok(Entrypoint { path, source, interpreter })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "").unwrap();
        path
    }

    #[test]
    fn test_explicit_missing_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let spec = EntrypointSpec { path: "nope/agent.js".into(), source: EntrypointSource::Env };
        let err = resolve_entrypoint(Some(&spec), None, dir.path()).unwrap_err();
        assert!(matches!(err, FleetError::Spawn(msg) if msg.contains("nope/agent.js")));
    }

    #[test]
    fn test_explicit_relative_resolved_against_base() {
        let dir = TempDir::new().unwrap();
        let path = touch(dir.path(), "bots/run.sh");
        let spec = EntrypointSpec { path: "bots/run.sh".into(), source: EntrypointSource::Config };
        let entry = resolve_entrypoint(Some(&spec), Some("/bin/sh"), dir.path()).unwrap();
        assert_eq!(entry.path, path);
        assert_eq!(entry.source, EntrypointSource::Config);
        assert_eq!(entry.interpreter.as_deref(), Some("/bin/sh"));
        assert_eq!(entry.working_dir(), dir.path().join("bots"));
    }

    #[test]
    fn test_candidate_order_and_source() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app/agent-bridge.js");
        let entry = resolve_entrypoint(None, None, dir.path()).unwrap();
        assert_eq!(entry.source, EntrypointSource::Fallback);
        assert_eq!(entry.interpreter.as_deref(), Some("node"));

        touch(dir.path(), "vendor/agent-runtime/index.js");
        let entry = resolve_entrypoint(None, None, dir.path()).unwrap();
        assert_eq!(entry.source, EntrypointSource::Vendor);
        assert!(entry.path.ends_with("vendor/agent-runtime/index.js"));
    }

    #[test]
    fn test_nothing_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(resolve_entrypoint(None, None, dir.path()), Err(FleetError::Spawn(_))));
    }

    #[test]
    fn test_bridge_runs_from_runtime_dir() {
        let entry = Entrypoint {
            path: PathBuf::from("/srv/vendor/mindcraft-bridge/clawcraft-entry.js"),
            source: EntrypointSource::Env,
            interpreter: None,
        };
        assert_eq!(entry.working_dir(), PathBuf::from("/srv/vendor/mindcraft"));
    }
}
