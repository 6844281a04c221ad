//! Error types for bridge, registration and database operations

use thiserror::Error;

/// Bridge operation result type
pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// SQLite refused to register or unregister the VFS
    #[error("VFS registration failed: {0}")]
    VfsRegistrationFailed(i32),

    /// The registration was already released
    #[error("VFS registration already released")]
    AlreadyUnregistered,

    /// Files are still open through the registration, or databases hold it
    #[error("VFS still in use ({0} open files and databases)")]
    InUse(usize),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Path too long: {len} bytes (maximum {max})")]
    PathTooLong { len: usize, max: usize },

    /// Failure reported by the embedded engine, carried as its message
    #[error("{0}")]
    Engine(String),

    /// Database handle used before open or after close
    #[error("Database handle is closed")]
    Closed,

    /// A bridged call was issued from the control thread itself
    #[error("Bridged call issued from the control thread")]
    Reentrant,

    /// The control context went away before the call completed
    #[error("Control context disconnected")]
    Disconnected,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<rusqlite::Error> for BridgeError {
    fn from(err: rusqlite::Error) -> Self {
        BridgeError::Engine(err.to_string())
    }
}
