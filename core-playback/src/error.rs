//! # Playback Error Types
//!
//! Queue operations themselves never fail; they report a
//! [`QueueSignal`](crate::QueueSignal). Errors only come from building a queue
//! out of input that does not describe one.

use thiserror::Error;

/// Errors that can occur while constructing a queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// The requested start entry is not part of the source lineup.
    #[error("Uid '{uid}' is not in lineup '{prefix}'")]
    NotInLineup { prefix: String, uid: String },

    /// The source lineup has no entries to play.
    #[error("Lineup '{0}' is empty")]
    EmptyLineup(String),
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
