use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use crate::errors::FleetError;
use super::mission::{
    normalize_mission, Mission, MissionDraft, MissionSource, MissionStatus, Priority, RankedMission,
};
use super::ordering::{rank_missions, sort_missions};
use super::store::{BoardDocument, StateStore, StoredDocument, DOCUMENT_VERSION};

/// Initial board content. Missions given here replace whatever was persisted
/// for that list; the goal always wins over the persisted one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardSeed {
    pub collective_goal: Option<String>,
    pub missions: Option<Vec<Value>>,
    pub viewer_missions: Option<Vec<Value>>,
}

/// A tip-backed mission request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewerTip {
    pub task: String,
    pub tipper: Option<String>,
    pub amount: Option<String>,
    pub priority: Option<Priority>,
}

/// Partial update for [`MissionBoard::update_mission`].
///
/// `status` is raw text: anything unrecognized becomes `in_progress`.
/// `assigned_to: Some(None)` clears the assignee.
#[derive(Debug, Clone, Default)]
pub struct MissionPatch {
    pub status: Option<String>,
    pub assigned_to: Option<Option<String>>,
    pub progress: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl MissionPatch {
    pub fn with_status(mut self, status: MissionStatus) -> Self {
        self.status = Some(status.as_str().to_string());
        self
    }

    pub fn with_assignee(mut self, agent_id: Option<&str>) -> Self {
        self.assigned_to = Some(agent_id.map(str::to_string));
        self
    }

    pub fn with_progress(mut self, text: impl Into<String>) -> Self {
        self.progress = Some(text.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.get_or_insert_with(Map::new).insert(key.to_string(), value);
        self
    }
}

struct BoardState {
    document: BoardDocument,
    store: StateStore,
    seed: BoardSeed,
}

impl BoardState {
    /// Persist after a mutation. Failures are logged, not returned: the
    /// in-memory board stays authoritative and the next mutation rewrites
    /// the whole document anyway.
    async fn persist(&mut self) {
        self.document.updated_at = Utc::now();
        if let Err(e) = self.store.save_with_retry(&self.document).await {
            error!(
                path = %self.store.path().display(),
                error = %e,
                "Failed to persist mission board, keeping in-memory state"
            );
        }
    }

    fn resort(&mut self) {
        sort_missions(&mut self.document.missions);
        sort_missions(&mut self.document.viewer_missions);
    }

    fn insert(&mut self, mission: Mission) -> Result<(), FleetError> {
        if self.document.find(&mission.id).is_some() {
            return Err(FleetError::Validation(format!("mission id already exists: {}", mission.id)));
        }
        match mission.source {
            MissionSource::Viewer => self.document.viewer_missions.push(mission),
            MissionSource::System => self.document.missions.push(mission),
        }
        self.resort();
        Ok(())
    }

    fn ranked_open(&self) -> Vec<RankedMission> {
        rank_missions(self.document.all_missions().filter(|m| m.is_open()).cloned().collect())
    }
}

/// Normalize raw mission lists into a document: invalid entries and duplicate
/// ids are dropped, each mission lands in the list for its source.
fn build_document(
    version: u32,
    collective_goal: Option<&str>,
    system: Vec<Value>,
    viewer: Vec<Value>,
    now: DateTime<Utc>,
) -> BoardDocument {
    let mut document = BoardDocument::empty(collective_goal, now);
    document.version = version;

    let mut seen = HashSet::new();
    let entries = system
        .into_iter()
        .map(|v| (v, MissionSource::System))
        .chain(viewer.into_iter().map(|v| (v, MissionSource::Viewer)));

    for (raw, default_source) in entries {
        let mission = match MissionDraft::from_value(raw)
            .and_then(|draft| normalize_mission(draft, default_source, now))
        {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "Dropping invalid mission");
                continue;
            }
        };
        if !seen.insert(mission.id.clone()) {
            warn!(mission_id = %mission.id, "Dropping mission with duplicate id");
            continue;
        }
        match mission.source {
            MissionSource::Viewer => document.viewer_missions.push(mission),
            MissionSource::System => document.missions.push(mission),
        }
    }

    sort_missions(&mut document.missions);
    sort_missions(&mut document.viewer_missions);
    document
}

fn merge_seed(stored: Option<StoredDocument>, seed: &BoardSeed, now: DateTime<Utc>) -> BoardDocument {
    let stored = stored.unwrap_or_default();
    let goal = seed.collective_goal.as_deref()
        .filter(|g| !g.trim().is_empty())
        .or(stored.collective_goal.as_deref().filter(|g| !g.trim().is_empty()));
    let system = seed.missions.clone().unwrap_or(stored.missions);
    let viewer = seed.viewer_missions.clone().unwrap_or(stored.viewer_missions);
    build_document(stored.version.unwrap_or(DOCUMENT_VERSION), goal, system, viewer, now)
}

/// Durable, priority-ordered mission queue shared by every agent.
///
/// All operations go through one FIFO-fair async mutex that is held until the
/// document has been written, so at most one mutation is in flight and calls
/// take effect in the order they were submitted.
#[derive(Clone)]
pub struct MissionBoard {
    state: Arc<Mutex<BoardState>>,
}

impl MissionBoard {
    pub fn new(store: StateStore) -> Self {
        Self {
            state: Arc::new(Mutex::new(BoardState {
                document: BoardDocument::empty(None, Utc::now()),
                store,
                seed: BoardSeed::default(),
            })),
        }
    }

    pub fn open(state_file: impl Into<PathBuf>) -> Self {
        Self::new(StateStore::new(state_file))
    }

    /// Load the persisted board, merge `seed`, normalize and persist.
    ///
    /// Read or write failures here are fatal; afterwards the board only logs them.
    pub async fn initialize(&self, seed: BoardSeed) -> Result<BoardDocument, FleetError> {
        let mut state = self.state.lock().await;
        let stored = state.store.load().await?;
        state.document = merge_seed(stored, &seed, Utc::now());
        state.seed = seed;
        state.document.updated_at = Utc::now();
        state.store.save_with_retry(&state.document).await?;
        info!(
            path = %state.store.path().display(),
            missions = state.document.missions.len(),
            viewer_missions = state.document.viewer_missions.len(),
            "Mission board initialized"
        );
        Ok(state.document.clone())
    }

    /// Replace the board with `seed` (or the seed from [`initialize`](Self::initialize)).
    pub async fn reset(&self, seed: Option<BoardSeed>) -> BoardDocument {
        let mut state = self.state.lock().await;
        let seed = seed.unwrap_or_else(|| state.seed.clone());
        let seed_only = BoardSeed {
            collective_goal: seed.collective_goal.clone(),
            missions: Some(seed.missions.clone().unwrap_or_default()),
            viewer_missions: Some(seed.viewer_missions.clone().unwrap_or_default()),
        };
        state.document = merge_seed(None, &seed_only, Utc::now());
        state.seed = seed;
        state.persist().await;
        info!("Mission board reset");
        state.document.clone()
    }

    pub async fn add_system_mission(&self, draft: MissionDraft) -> Result<Mission, FleetError> {
        let mission = normalize_mission(draft, MissionSource::System, Utc::now())?;
        let mut state = self.state.lock().await;
        state.insert(mission.clone())?;
        state.persist().await;
        info!(mission_id = %mission.id, source = %mission.source, priority = %mission.priority, "Mission added");
        Ok(mission)
    }

    pub async fn add_viewer_mission(&self, tip: ViewerTip) -> Result<Mission, FleetError> {
        let draft = MissionDraft {
            task: tip.task,
            source: Some(MissionSource::Viewer.as_str().to_string()),
            tipper: Some(tip.tipper.unwrap_or_else(|| "anonymous".to_string())),
            amount: Some(Value::String(tip.amount.unwrap_or_else(|| "0".to_string()))),
            priority: tip.priority.map(|p| p.as_str().to_string()),
            ..Default::default()
        };
        let mission = normalize_mission(draft, MissionSource::Viewer, Utc::now())?;
        let mut state = self.state.lock().await;
        state.insert(mission.clone())?;
        state.persist().await;
        info!(
            mission_id = %mission.id,
            tipper = mission.tipper.as_deref().unwrap_or(""),
            amount = mission.amount.as_deref().unwrap_or("0"),
            "Viewer mission added"
        );
        Ok(mission)
    }

    /// Claim a specific open mission, or the highest-ranked one when
    /// `mission_id` is `None`. `None` means there is nothing to do.
    pub async fn claim_mission(&self, agent_id: &str, mission_id: Option<&str>) -> Option<Mission> {
        let mut state = self.state.lock().await;
        let target_id = match mission_id {
            Some(id) => state.document.find(id).filter(|m| m.is_open()).map(|m| m.id.clone()),
            None => state.ranked_open().into_iter().next().map(|r| r.mission.id),
        }?;

        let now = Utc::now();
        let claimed = {
            let mission = state.document.find_mut(&target_id)?;
            mission.status = MissionStatus::InProgress;
            mission.assigned_to = Some(agent_id.to_string());
            mission.set_progress(format!("Claimed by {}", agent_id), now);
            mission.clone()
        };
        state.resort();
        state.persist().await;
        info!(mission_id = %claimed.id, agent_id, "Mission claimed");
        Some(claimed)
    }

    /// Hand a mission back to the queue. Only its current assignee may do so.
    pub async fn release_mission(&self, agent_id: &str, mission_id: &str, reason: Option<&str>) -> bool {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        match state.document.find_mut(mission_id) {
            Some(mission) if mission.assigned_to.as_deref() == Some(agent_id) => {
                mission.assigned_to = None;
                mission.status = MissionStatus::Open;
                mission.set_progress(reason.unwrap_or("released"), now);
            }
            _ => return false,
        }
        state.resort();
        state.persist().await;
        info!(mission_id, agent_id, "Mission released");
        true
    }

    pub async fn update_mission(&self, mission_id: &str, patch: MissionPatch) -> Option<Mission> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let updated = {
            let mission = state.document.find_mut(mission_id)?;

            if let Some(status) = patch.status.as_deref() {
                mission.status = MissionStatus::parse(status).unwrap_or(MissionStatus::InProgress);
            }
            if let Some(assigned) = patch.assigned_to {
                mission.assigned_to = assigned.filter(|a| !a.trim().is_empty());
            }
            let text = patch.progress
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| mission.progress.text.clone());
            mission.set_progress(text, now);
            if let Some(metadata) = patch.metadata {
                mission.metadata.extend(metadata);
            }
            if mission.assigned_to.is_some() && mission.status == MissionStatus::Open {
                mission.status = MissionStatus::InProgress;
            }
            mission.clone()
        };
        state.resort();
        state.persist().await;
        debug!(mission_id, status = %updated.status, "Mission updated");
        Some(updated)
    }

    async fn finish(
        &self,
        agent_id: &str,
        mission_id: &str,
        status: MissionStatus,
        summary: Option<&str>,
        stamp_key: &str,
    ) -> Option<Mission> {
        let patch = MissionPatch::default()
            .with_status(status)
            .with_assignee(Some(agent_id))
            .with_progress(summary.filter(|s| !s.trim().is_empty()).unwrap_or(status_word(status)))
            .with_metadata(stamp_key, Value::String(agent_id.to_string()));
        let result = self.update_mission(mission_id, patch).await;
        if result.is_some() {
            info!(mission_id, agent_id, status = %status, "Mission finished");
        }
        result
    }

    pub async fn complete_mission(&self, agent_id: &str, mission_id: &str, summary: Option<&str>) -> Option<Mission> {
        self.finish(agent_id, mission_id, MissionStatus::Done, summary, "completed_by").await
    }

    pub async fn fail_mission(&self, agent_id: &str, mission_id: &str, summary: Option<&str>) -> Option<Mission> {
        self.finish(agent_id, mission_id, MissionStatus::Failed, summary, "failed_by").await
    }

    pub async fn block_mission(&self, agent_id: &str, mission_id: &str, summary: Option<&str>) -> Option<Mission> {
        self.finish(agent_id, mission_id, MissionStatus::Blocked, summary, "blocked_by").await
    }

    pub async fn get_open_missions(&self) -> Vec<RankedMission> {
        self.state.lock().await.ranked_open()
    }

    /// Every mission assigned to `agent_id`, most recently updated first.
    pub async fn get_missions_for_agent(&self, agent_id: &str) -> Vec<Mission> {
        let state = self.state.lock().await;
        let mut missions: Vec<Mission> = state.document
            .all_missions()
            .filter(|m| m.assigned_to.as_deref() == Some(agent_id))
            .cloned()
            .collect();
        missions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        missions
    }

    /// The agent's most recently touched in-progress mission, if any.
    pub async fn current_mission_for_agent(&self, agent_id: &str) -> Option<Mission> {
        self.get_missions_for_agent(agent_id)
            .await
            .into_iter()
            .find(|m| m.status == MissionStatus::InProgress)
    }

    pub async fn get_snapshot(&self) -> BoardDocument {
        self.state.lock().await.document.clone()
    }
}

fn status_word(status: MissionStatus) -> &'static str {
    match status {
        MissionStatus::Done => "completed",
        MissionStatus::Failed => "failed",
        MissionStatus::Blocked => "blocked",
        MissionStatus::Open => "open",
        MissionStatus::InProgress => "in progress",
    }
}
