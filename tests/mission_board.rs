use std::collections::HashSet;
use serde_json::json;
use clawfleet::board::{
    BoardSeed, MissionBoard, MissionDraft, MissionSource, MissionStatus, Priority, ViewerTip,
};

fn tip(task: &str, tipper: &str, amount: &str) -> ViewerTip {
    ViewerTip {
        task: task.to_string(),
        tipper: Some(tipper.to_string()),
        amount: Some(amount.to_string()),
        priority: None,
    }
}

async fn fresh_board(dir: &tempfile::TempDir) -> MissionBoard {
    let board = MissionBoard::open(dir.path().join("board.json"));
    board.initialize(BoardSeed::default()).await.unwrap();
    board
}

#[tokio::test]
async fn test_open_missions_follow_claim_order() {
    let dir = tempfile::tempdir().unwrap();
    let board = fresh_board(&dir).await;

    board.add_system_mission(MissionDraft::new("gather wood").with_id("s-normal")).await.unwrap();
    board
        .add_system_mission(MissionDraft::new("build wall").with_id("s-high").with_priority(Priority::High))
        .await
        .unwrap();
    board.add_viewer_mission(tip("dig a moat", "ana", "2")).await.unwrap();
    board.add_viewer_mission(tip("build a tower", "ben", "10")).await.unwrap();

    let open = board.get_open_missions().await;
    let tasks: Vec<&str> = open.iter().map(|r| r.mission.task.as_str()).collect();
    assert_eq!(tasks, vec!["build a tower", "dig a moat", "build wall", "gather wood"]);
    let ranks: Vec<usize> = open.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_claim_takes_best_mission_once() {
    let dir = tempfile::tempdir().unwrap();
    let board = fresh_board(&dir).await;
    board.add_system_mission(MissionDraft::new("plant wheat").with_id("m1")).await.unwrap();

    let claimed = board.claim_mission("zara", None).await.unwrap();
    assert_eq!(claimed.id, "m1");
    assert_eq!(claimed.status, MissionStatus::InProgress);
    assert_eq!(claimed.assigned_to.as_deref(), Some("zara"));
    assert_eq!(claimed.progress.text, "Claimed by zara");

    assert!(board.claim_mission("otto", Some("m1")).await.is_none());
    assert!(board.claim_mission("otto", None).await.is_none());
    assert!(board.get_open_missions().await.is_empty());
    assert_eq!(board.current_mission_for_agent("zara").await.unwrap().id, "m1");
}

#[tokio::test]
async fn test_release_only_by_assignee() {
    let dir = tempfile::tempdir().unwrap();
    let board = fresh_board(&dir).await;
    board.add_system_mission(MissionDraft::new("smelt iron").with_id("m1")).await.unwrap();
    board.claim_mission("zara", Some("m1")).await.unwrap();

    assert!(!board.release_mission("otto", "m1", None).await);
    assert!(!board.release_mission("zara", "missing", None).await);
    assert!(board.release_mission("zara", "m1", Some("need a pickaxe")).await);

    let snapshot = board.get_snapshot().await;
    let mission = snapshot.find("m1").unwrap();
    assert_eq!(mission.status, MissionStatus::Open);
    assert!(mission.assigned_to.is_none());
    assert_eq!(mission.progress.text, "need a pickaxe");
    assert!(board.current_mission_for_agent("zara").await.is_none());
}

#[tokio::test]
async fn test_finish_stamps_agent() {
    let dir = tempfile::tempdir().unwrap();
    let board = fresh_board(&dir).await;
    board.add_system_mission(MissionDraft::new("fence the farm").with_id("a")).await.unwrap();
    board.add_system_mission(MissionDraft::new("light the path").with_id("b")).await.unwrap();
    board.add_system_mission(MissionDraft::new("tame a wolf").with_id("c")).await.unwrap();

    let done = board.complete_mission("zara", "a", Some("fence up")).await.unwrap();
    assert_eq!(done.status, MissionStatus::Done);
    assert_eq!(done.progress.text, "fence up");
    assert_eq!(done.metadata["completed_by"], json!("zara"));

    let failed = board.fail_mission("otto", "b", None).await.unwrap();
    assert_eq!(failed.status, MissionStatus::Failed);
    assert_eq!(failed.metadata["failed_by"], json!("otto"));

    let blocked = board.block_mission("otto", "c", None).await.unwrap();
    assert_eq!(blocked.status, MissionStatus::Blocked);
    assert_eq!(blocked.metadata["blocked_by"], json!("otto"));

    assert!(board.complete_mission("zara", "nope", None).await.is_none());
    assert!(board.get_open_missions().await.is_empty());
    assert_eq!(board.get_missions_for_agent("otto").await.len(), 2);
}

#[tokio::test]
async fn test_state_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("board.json");

    let board = MissionBoard::open(&path);
    board
        .initialize(BoardSeed {
            collective_goal: Some("Raise a castle".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    board.add_viewer_mission(tip("build a bridge", "ana", "3.5")).await.unwrap();
    board.add_system_mission(MissionDraft::new("mine coal").with_id("coal")).await.unwrap();
    board.claim_mission("zara", Some("coal")).await.unwrap();
    assert!(path.exists());
    assert!(!dir.path().join("nested").join("board.json.tmp").exists());

    let reopened = MissionBoard::open(&path);
    let document = reopened.initialize(BoardSeed::default()).await.unwrap();
    assert_eq!(document.collective_goal, "Raise a castle");
    assert_eq!(document.viewer_missions.len(), 1);
    assert_eq!(document.viewer_missions[0].source, MissionSource::Viewer);
    assert_eq!(document.viewer_missions[0].amount.as_deref(), Some("3.5"));
    let coal = document.find("coal").unwrap();
    assert_eq!(coal.status, MissionStatus::InProgress);
    assert_eq!(coal.assigned_to.as_deref(), Some("zara"));
}

#[tokio::test]
async fn test_reset_restores_seed() {
    let dir = tempfile::tempdir().unwrap();
    let board = MissionBoard::open(dir.path().join("board.json"));
    let seed = BoardSeed {
        collective_goal: Some("Feed the village".to_string()),
        missions: Some(vec![json!({"id": "seed-1", "task": "harvest carrots", "priority": "high"})]),
        viewer_missions: None,
    };
    board.initialize(seed).await.unwrap();
    board.claim_mission("zara", Some("seed-1")).await.unwrap();
    board.add_viewer_mission(tip("build a statue", "ana", "1")).await.unwrap();

    let document = board.reset(None).await;
    assert_eq!(document.collective_goal, "Feed the village");
    assert!(document.viewer_missions.is_empty());
    assert_eq!(document.missions.len(), 1);
    assert_eq!(document.missions[0].status, MissionStatus::Open);
    assert!(document.missions[0].assigned_to.is_none());
    assert_eq!(document.missions[0].priority, Priority::High);
}

#[tokio::test]
async fn test_concurrent_claims_never_share_a_mission() {
    let dir = tempfile::tempdir().unwrap();
    let board = fresh_board(&dir).await;
    for i in 0..10 {
        board
            .add_system_mission(MissionDraft::new(format!("task {}", i)).with_id(format!("m{}", i)))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for agent in 0..16 {
        let board = board.clone();
        handles.push(tokio::spawn(async move {
            board.claim_mission(&format!("agent-{}", agent), None).await
        }));
    }

    let mut claimed = HashSet::new();
    let mut empty = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Some(mission) => assert!(claimed.insert(mission.id)),
            None => empty += 1,
        }
    }
    assert_eq!(claimed.len(), 10);
    assert_eq!(empty, 6);
}

#[tokio::test]
async fn test_initialize_tolerates_null_mission_list() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.json");
    let raw = json!({
        "version": 1,
        "collective_goal": "Keep me",
        "missions": [{"id": "m1", "task": "mine iron"}],
        "viewer_missions": null,
    });
    std::fs::write(&path, raw.to_string()).unwrap();

    let board = MissionBoard::open(&path);
    let document = board.initialize(BoardSeed::default()).await.unwrap();
    assert_eq!(document.collective_goal, "Keep me");
    assert_eq!(document.missions.len(), 1);
    assert_eq!(document.missions[0].id, "m1");
    assert!(document.viewer_missions.is_empty());

    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert!(on_disk.contains("\"m1\""));
    assert!(on_disk.contains("Keep me"));
}
