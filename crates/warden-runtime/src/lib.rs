//! Warden's runtime: the ticket lifecycle engine, the community status
//! orchestrator, moderation commands, and the indicator channel updaters,
//! all driven from one gateway event loop.

pub mod actions;
pub mod categories;
pub mod commands;
pub mod indicators;
pub mod render;
pub mod replies;
pub mod runtime;
pub mod status;
pub mod tickets;

pub use runtime::{run_warden_runtime, RuntimeConfig, WardenRuntime};
pub use status::{CommunityStatus, StatusHolder};
