//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the lineup engine:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//! - Reachability monitoring shared by lineups and revalidation tasks
//!
//! Every other `core-*` crate depends on this one for its event types and
//! for the process-wide view of network reachability.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod reachability;

pub use error::{Error, Result};
pub use reachability::{ReachabilityMonitor, ReachabilitySignal};
