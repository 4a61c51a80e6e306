//! Core domain types for the snooze relay.
//!
//! Identifiers shared by the channel, provisioning and worker layers.

pub mod ids;

pub use ids::{MessageId, ReceiptHandle, RepoId, RepoIdError};
