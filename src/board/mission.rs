use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::errors::FleetError;

pub const DEFAULT_PROGRESS_TEXT: &str = "Waiting for agent";

/// Where a mission came from. Viewer missions always outrank system ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionSource {
    #[default]
    System,
    Viewer,
}

impl MissionSource {
    /// Anything other than `viewer` is a system mission.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("viewer") {
            Self::Viewer
        } else {
            Self::System
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Viewer => "viewer",
        }
    }
}

impl std::fmt::Display for MissionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    #[default]
    Open,
    InProgress,
    Done,
    Blocked,
    Failed,
}

impl MissionStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "blocked" => Some(Self::Blocked),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Unknown priorities clamp to `normal`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Normal,
        }
    }

    /// Higher rank is more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub text: String,
    pub updated_at: DateTime<Utc>,
}

/// A unit of work on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub task: String,
    pub source: MissionSource,
    pub status: MissionStatus,
    pub assigned_to: Option<String>,
    pub priority: Priority,
    /// Viewer missions only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipper: Option<String>,
    /// Viewer missions only. Decimal text, e.g. `"5"` or `"2.50"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    /// Stored for callers; claiming does not wait on these.
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Mission {
    /// Tip amount as a sort key. Missing, malformed or negative amounts count as zero.
    pub fn tip_value(&self) -> f64 {
        self.amount
            .as_deref()
            .and_then(|a| a.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(0.0)
    }

    pub fn is_open(&self) -> bool {
        self.status == MissionStatus::Open
    }

    /// Advance `updated_at` without ever moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    pub fn set_progress(&mut self, text: impl Into<String>, now: DateTime<Utc>) {
        self.progress = Progress { text: text.into(), updated_at: now };
        self.touch(now);
    }
}

/// An open mission annotated with its 1-based position in the claim order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedMission {
    #[serde(flatten)]
    pub mission: Mission,
    pub rank: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftProgress {
    pub text: Option<String>,
    pub updated_at: Option<String>,
}

/// Loosely typed mission input, as found in seeds, persisted documents and
/// caller requests. [`normalize_mission`] turns it into a [`Mission`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionDraft {
    pub id: Option<String>,
    pub task: String,
    pub source: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "assigned")]
    pub assigned_to: Option<String>,
    pub priority: Option<String>,
    pub tipper: Option<String>,
    /// String or number.
    pub amount: Option<Value>,
    pub depends_on: Option<Value>,
    pub progress: Option<DraftProgress>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub metadata: Option<Value>,
}

impl MissionDraft {
    pub fn new(task: impl Into<String>) -> Self {
        Self { task: task.into(), ..Default::default() }
    }

    pub fn from_value(value: Value) -> Result<Self, FleetError> {
        serde_json::from_value(value)
            .map_err(|e| FleetError::Validation(format!("Malformed mission: {}", e)))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority.as_str().to_string());
        self
    }

    pub fn with_depends_on(mut self, ids: Vec<String>) -> Self {
        self.depends_on = Some(Value::from(ids));
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(Value::Object(metadata));
        self
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn amount_text(value: Option<&Value>) -> String {
    let text = match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if text.is_empty() { "0".to_string() } else { text }
}

fn depends_on_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Build a complete mission from a draft, filling ids and timestamps.
///
/// Unknown statuses fall back to `open`, unknown priorities to `normal`, and
/// an assigned mission is never left `open`. Fails only when the trimmed
/// task is empty.
pub fn normalize_mission(
    draft: MissionDraft,
    default_source: MissionSource,
    now: DateTime<Utc>,
) -> Result<Mission, FleetError> {
    let task = draft.task.trim().to_string();
    if task.is_empty() {
        return Err(FleetError::Validation("mission task required".into()));
    }

    let source = draft.source.as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(MissionSource::parse)
        .unwrap_or(default_source);
    let status = draft.status.as_deref()
        .and_then(MissionStatus::parse)
        .unwrap_or(MissionStatus::Open);
    let assigned_to = non_empty(draft.assigned_to.as_deref());
    let priority = draft.priority.as_deref().map(Priority::parse).unwrap_or_default();

    let (tipper, amount) = match source {
        MissionSource::Viewer => (
            Some(non_empty(draft.tipper.as_deref()).unwrap_or_else(|| "system".to_string())),
            Some(amount_text(draft.amount.as_ref())),
        ),
        MissionSource::System => (None, None),
    };

    let progress = draft.progress.unwrap_or_default();
    let progress = Progress {
        text: non_empty(progress.text.as_deref()).unwrap_or_else(|| DEFAULT_PROGRESS_TEXT.to_string()),
        updated_at: parse_timestamp(progress.updated_at.as_deref()).unwrap_or(now),
    };

    let metadata = match draft.metadata {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let mut mission = Mission {
        id: non_empty(draft.id.as_deref()).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        task,
        source,
        status,
        assigned_to,
        priority,
        tipper,
        amount,
        depends_on: depends_on_list(draft.depends_on.as_ref()),
        progress,
        created_at: parse_timestamp(draft.created_at.as_deref()).unwrap_or(now),
        updated_at: parse_timestamp(draft.updated_at.as_deref()).unwrap_or(now),
        metadata,
    };

    if mission.assigned_to.is_some() && mission.status == MissionStatus::Open {
        mission.status = MissionStatus::InProgress;
    }

    Ok(mission)
}
