use std::collections::HashSet;
use std::path::{Path, PathBuf};
use crate::errors::FleetError;
use super::types::FleetConfig;
use super::schema::CONFIG_SCHEMA;
use tracing::warn;

pub const DEFAULT_BOARD_PATH: &str = "data/mission-board.json";

pub async fn parse_config(path: &Path) -> Result<FleetConfig, FleetError> {
    if !path.exists() {
        return Err(FleetError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > 1_048_576 {
        return Err(FleetError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<FleetConfig, FleetError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;

    // JSON Schema validation
    validate_schema(&yaml)?;

    // Parse into typed config
    let config: FleetConfig = serde_yaml::from_value(yaml)?;

    // Semantic conflict detection
    validate_conflicts(&config)?;

    Ok(config)
}

/// Board state path: config, then `CLAWCRAFT_MISSION_BOARD`, then the default.
pub fn resolve_board_path(config: &FleetConfig) -> PathBuf {
    config.board.as_ref()
        .and_then(|b| b.state_file.clone())
        .or_else(|| std::env::var("CLAWCRAFT_MISSION_BOARD").ok().filter(|p| !p.is_empty()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BOARD_PATH))
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), FleetError> {
    let json_value: serde_json::Value = serde_json::to_value(yaml)
        .map_err(|e| FleetError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| FleetError::Config(format!("Schema compilation error: {}", e)))?;

    let result = compiled.validate(&json_value);
    if let Err(errors) = result {
        // Advisory only: the typed parse and conflict checks below are authoritative.
        for e in errors {
            warn!(validation_error = %format!("{} at {}", e, e.instance_path), "Config schema warning");
        }
    }

    Ok(())
}

/// Detect semantic conflicts in the parsed configuration.
fn validate_conflicts(config: &FleetConfig) -> Result<(), FleetError> {
    if let Some(agents) = &config.agents {
        let mut seen = HashSet::new();
        for agent in agents {
            if agent.team.trim().is_empty() || agent.name.trim().is_empty() {
                return Err(FleetError::Config("Agent entries need a non-empty team and name".into()));
            }
            if agent.name.contains('/') || agent.team.contains('/') {
                return Err(FleetError::Config(format!(
                    "Agent '{}/{}': team and name may not contain '/'",
                    agent.team, agent.name
                )));
            }
            if !seen.insert((agent.team.as_str(), agent.name.as_str())) {
                return Err(FleetError::Config(format!(
                    "Duplicate agent '{}/{}'",
                    agent.team, agent.name
                )));
            }
        }
    }

    if let Some(supervisor) = &config.supervisor {
        if supervisor.base_port == Some(0) {
            return Err(FleetError::Config("supervisor.base_port must be non-zero".into()));
        }
        if supervisor.max_logs == Some(0) {
            return Err(FleetError::Config("supervisor.max_logs must be at least 1".into()));
        }
        if let Some(respawn) = &supervisor.respawn {
            if let (Some(step), Some(max)) = (respawn.delay_step_ms, respawn.max_delay_ms) {
                if max < step {
                    warn!(delay_step_ms = step, max_delay_ms = max, "Respawn delay cap is below the step; every respawn waits the cap");
                }
            }
        }
    }

    Ok(())
}
