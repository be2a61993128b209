use std::path::PathBuf;
use tracing::{error, info, warn};
use crate::board::MissionBoard;
use crate::cli::commands::RunArgs;
use crate::config::{self, AgentConfig, FleetConfig};
use crate::errors::FleetError;
use crate::supervisor::{AgentMeta, Supervisor, SupervisorSettings};

pub async fn handle_run(args: RunArgs) -> Result<(), FleetError> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        built_at = env!("BUILD_TIMESTAMP"),
        "Starting clawfleet"
    );

    let file_config = match &args.config {
        Some(path) => config::parse_config(&PathBuf::from(path)).await?,
        None => FleetConfig::default(),
    };

    let board = MissionBoard::open(config::resolve_board_path(&file_config));
    let seed = file_config
        .board
        .as_ref()
        .and_then(|b| b.seed.clone())
        .unwrap_or_default();
    let document = board.initialize(seed).await?;
    info!(goal = %document.collective_goal, "Collective goal");

    let mut settings = SupervisorSettings::from_config(file_config.supervisor.as_ref())?;
    if args.dry_run {
        settings.dry_run = true;
    }
    let supervisor = Supervisor::new(settings)?;

    let agents = file_config.agents.clone().unwrap_or_default();
    if agents.is_empty() {
        warn!("No agents configured; only the mission board is active");
    }
    for agent in &agents {
        let info = supervisor.register(&agent.team, agent_meta(agent)).await?;
        match supervisor.spawn(&info.team_id, &info.name).await {
            Some(spawned) => info!(
                team_id = %spawned.team_id,
                name = %spawned.name,
                status = %spawned.status,
                port = ?spawned.port,
                "Agent started"
            ),
            None => error!(team_id = %info.team_id, name = %info.name, "Agent vanished before spawn"),
        }
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| FleetError::Internal(format!("Failed to listen for Ctrl-C: {}", e)))?;
    info!("Shutdown requested");
    supervisor.shutdown().await;

    let snapshot = board.get_snapshot().await;
    let open = snapshot.all_missions().filter(|m| m.is_open()).count();
    info!(open_missions = open, "Fleet stopped");
    Ok(())
}

fn agent_meta(agent: &AgentConfig) -> AgentMeta {
    AgentMeta {
        role: agent.role.clone(),
        display_name: agent.display_name.clone(),
        login_name: agent.login_name.clone(),
        soul: agent.soul.clone(),
        self_hosted: agent.self_hosted,
        ..AgentMeta::new(agent.name.clone())
    }
}
