//! Snooze - clears a "snooze" label when a GitHub issue sees new activity.
//!
//! GitHub webhooks are relayed through an SNS topic into an SQS queue per
//! repository. A listener drains each queue, decodes the deliveries and hands
//! them to event handlers; the snooze handler removes the marker label when
//! someone comments or pushes.

pub mod channel;
pub mod config;
pub mod github;
pub mod provision;
pub mod types;
pub mod webhooks;
pub mod worker;

mod tls;
