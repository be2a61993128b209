//! Agent process supervision.
//!
//! Each registered agent gets a port triplet and, unless self-hosted, a
//! child process launched from the resolved runtime entrypoint. Crashed
//! processes are respawned with a bounded linear backoff; `remove` cancels
//! everything tied to a registration.

pub mod control;
pub mod entrypoint;
pub mod identity;
pub mod manager;
pub mod policy;
pub mod ports;
pub mod proxy;
pub mod record;
pub mod settings;

pub use entrypoint::{resolve_entrypoint, Entrypoint, EntrypointSource, EntrypointSpec};
pub use identity::make_login_username;
pub use manager::{agent_key, Supervisor, DEFAULT_LOG_LIMIT};
pub use policy::{RespawnDecision, RespawnPolicy};
pub use ports::{PortAllocator, PortTriplet};
pub use proxy::{ControlClient, ProxyFailure, ProxyReply};
pub use record::{AgentInfo, AgentMeta, AgentStatus, LogEntry};
pub use settings::SupervisorSettings;
