use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Entity not found: {kind} with id {id}")]
    NotFound { kind: String, id: u64 },

    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    #[error("Invalid uid '{uid}': {message}")]
    InvalidUid { uid: String, message: String },
}

impl LibraryError {
    /// Transport-level failures the caller may retry.
    pub fn is_network(&self) -> bool {
        match self {
            LibraryError::Network(_) => true,
            LibraryError::Bridge(err) => err.is_network(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
