//! Per-repository consumer loops and their supervisor.
//!
//! Each configured repository gets one [`RepositoryListener`] running as its
//! own tokio task. Listeners share no mutable state; messages within one
//! repository are processed serially, repositories concurrently.
//!
//! # Module Structure
//!
//! - [`listener`]: receive, decode, dispatch, acknowledge
//! - [`poll`]: long-poll and interval configuration
//! - [`supervisor`]: task set that treats any listener exit as fatal

pub mod listener;
pub mod poll;
pub mod supervisor;

pub use listener::{PollSummary, RepositoryListener, WorkerError};
pub use poll::{LONG_POLL_WAIT, PollConfig};
pub use supervisor::{Supervisor, SupervisorError, WorkerExit};
