//! Mission board and agent process supervisor for a fleet of game agents.

pub mod board;
pub mod cli;
pub mod config;
pub mod errors;
pub mod supervisor;
