//! Discord transport layer for Warden.
//!
//! Hosts the typed REST client, the gateway websocket session, the wire
//! models shared by both, and the form broker that turns modal submissions
//! into awaitable results.

pub mod forms;
pub mod gateway;
pub mod rest;
pub mod types;

pub use forms::{FormBroker, FormSubmission, FormTimeout, FormWait};
pub use gateway::{GatewayEvent, GatewaySession};
pub use rest::{DiscordApiClient, RestError, RestResult};
