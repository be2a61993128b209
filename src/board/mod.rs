//! The mission board: a durable, priority-ordered work queue that agents
//! claim missions from.

pub mod mission;
pub mod ordering;
pub mod store;
pub mod manager;

pub use manager::{BoardSeed, MissionBoard, MissionPatch, ViewerTip};
pub use mission::{
    normalize_mission, Mission, MissionDraft, MissionSource, MissionStatus, Priority, Progress,
    RankedMission,
};
pub use store::{BoardDocument, StateStore};
