use std::path::PathBuf;
use console::style;
use serde::Serialize;
use tracing::info;
use crate::board::{BoardSeed, Mission, MissionBoard, MissionDraft, MissionStatus, Priority, ViewerTip};
use crate::cli::commands::{BoardArgs, BoardCommand};
use crate::config::{self, FleetConfig};
use crate::errors::FleetError;

pub async fn handle_board(args: BoardArgs) -> Result<(), FleetError> {
    let file_config = match &args.config {
        Some(path) => config::parse_config(&PathBuf::from(path)).await?,
        None => FleetConfig::default(),
    };
    let state_file = args
        .state_file
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(|| config::resolve_board_path(&file_config));
    info!(path = %state_file.display(), "Opening mission board");

    let board = MissionBoard::open(state_file);
    board.initialize(BoardSeed::default()).await?;

    match args.command {
        BoardCommand::Show => {
            let snapshot = board.get_snapshot().await;
            if args.json {
                return print_json(&snapshot);
            }
            println!("{} {}", style("Goal:").bold(), snapshot.collective_goal);
            print_section("Viewer missions", &snapshot.viewer_missions);
            print_section("Missions", &snapshot.missions);
        }
        BoardCommand::Open => {
            let open = board.get_open_missions().await;
            if args.json {
                return print_json(&open);
            }
            if open.is_empty() {
                println!("{}", style("No open missions").dim());
            }
            for ranked in &open {
                println!("{:>3}. {}", ranked.rank, mission_line(&ranked.mission));
            }
        }
        BoardCommand::Add { task, priority, id, depends_on } => {
            let mut draft = MissionDraft::new(task).with_priority(Priority::parse(&priority));
            if let Some(id) = id {
                draft = draft.with_id(id);
            }
            if !depends_on.is_empty() {
                draft = draft.with_depends_on(depends_on);
            }
            let mission = board.add_system_mission(draft).await?;
            report(args.json, "Added", &mission)?;
        }
        BoardCommand::Tip { task, tipper, amount, priority } => {
            let tip = ViewerTip {
                task,
                tipper,
                amount,
                priority: priority.as_deref().map(Priority::parse),
            };
            let mission = board.add_viewer_mission(tip).await?;
            report(args.json, "Added", &mission)?;
        }
        BoardCommand::Claim { agent, mission } => {
            match board.claim_mission(&agent, mission.as_deref()).await {
                Some(claimed) => report(args.json, "Claimed", &claimed)?,
                None => println!("{}", style("Nothing to claim").yellow()),
            }
        }
        BoardCommand::Release { agent, mission, reason } => {
            if board.release_mission(&agent, &mission, reason.as_deref()).await {
                println!("{} {}", style("Released").green(), mission);
            } else {
                return Err(FleetError::Validation(format!(
                    "Mission {} is not assigned to {}",
                    mission, agent
                )));
            }
        }
        BoardCommand::Complete { agent, mission, summary } => {
            let done = board.complete_mission(&agent, &mission, summary.as_deref()).await;
            finished(args.json, done, &mission)?;
        }
        BoardCommand::Fail { agent, mission, summary } => {
            let failed = board.fail_mission(&agent, &mission, summary.as_deref()).await;
            finished(args.json, failed, &mission)?;
        }
        BoardCommand::Block { agent, mission, summary } => {
            let blocked = board.block_mission(&agent, &mission, summary.as_deref()).await;
            finished(args.json, blocked, &mission)?;
        }
        BoardCommand::Reset => {
            let seed = file_config.board.and_then(|b| b.seed).unwrap_or_default();
            let document = board.reset(Some(seed)).await;
            if args.json {
                return print_json(&document);
            }
            println!(
                "{} {} missions, {} viewer missions",
                style("Board reset:").green(),
                document.missions.len(),
                document.viewer_missions.len()
            );
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), FleetError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(json: bool, verb: &str, mission: &Mission) -> Result<(), FleetError> {
    if json {
        return print_json(mission);
    }
    println!("{} {}", style(verb).green(), mission_line(mission));
    Ok(())
}

fn finished(json: bool, mission: Option<Mission>, mission_id: &str) -> Result<(), FleetError> {
    match mission {
        Some(mission) => report(json, "Updated", &mission),
        None => Err(FleetError::Validation(format!("Unknown mission: {}", mission_id))),
    }
}

fn print_section(title: &str, missions: &[Mission]) {
    println!();
    println!("{} ({})", style(title).bold(), missions.len());
    for mission in missions {
        println!("  {}", mission_line(mission));
    }
}

fn mission_line(mission: &Mission) -> String {
    let status = match mission.status {
        MissionStatus::Open => style(mission.status.as_str()).cyan(),
        MissionStatus::InProgress => style(mission.status.as_str()).yellow(),
        MissionStatus::Done => style(mission.status.as_str()).green(),
        MissionStatus::Blocked | MissionStatus::Failed => style(mission.status.as_str()).red(),
    };
    let mut line = format!(
        "[{}] {} {} {}",
        status,
        style(&mission.id).dim(),
        style(mission.priority.as_str()).magenta(),
        mission.task
    );
    if let Some(tipper) = &mission.tipper {
        line.push_str(&format!(
            " {}",
            style(format!("(tip {} from {})", mission.amount.as_deref().unwrap_or("0"), tipper)).dim()
        ));
    }
    if let Some(agent) = &mission.assigned_to {
        line.push_str(&format!(" -> {}", agent));
    }
    line
}
