//! Foundational low-level utilities shared across Warden crates.
//!
//! Provides the millisecond timestamp helper used for form nonces plus the
//! string truncation/sanitization helpers shared by the Discord client and
//! the runtime.

pub mod text;
pub mod time_utils;

pub use text::{sanitize_channel_token, truncate_chars, truncate_for_error};
pub use time_utils::current_unix_timestamp_ms;
