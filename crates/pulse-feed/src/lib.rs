//! Multi-feed aggregation.
//!
//! One [`FeedWorker`] per upstream source reads, parses and forwards into a
//! shared MPSC fan-in ring; a [`FanInDispatcher`] owns the workers, runs the
//! per-feed health state machine and promotes backups when every primary
//! goes dark. [`MultiFeedSession`] is the complete multi-feed run loop.
//!
//! Ordering is guaranteed within each feed, never across feeds.

mod config;
mod dispatcher;
mod monitor;
mod session;
mod worker;

pub use config::{ConfigError, FeedConfig, MultiFeedConfig};
pub use dispatcher::FanInDispatcher;
pub use monitor::{FeedMonitor, FeedStatus};
pub use session::MultiFeedSession;
pub use worker::{FeedError, FeedWorker};
