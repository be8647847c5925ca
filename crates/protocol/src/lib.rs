//! Wire types for the dice relay protocol.
//!
//! This crate contains the serde-serializable types used for communication
//! with the relay service. These types represent the "protocol layer" - the
//! shapes of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * 1:1 with protocol: Match the relay's message schema
//! * Stable: Changes only when the wire protocol changes
//!
//! The ergonomic client API is built on top of these types in `dice-core`.

pub mod config;
pub mod messages;
pub mod types;

pub use config::*;
pub use messages::*;
pub use types::*;
