use thiserror::Error;

#[derive(Error, Debug)]
pub enum RotorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Failed to spawn worker: {0}")]
    WorkerSpawn(String),

    #[error("Signal handling error: {0}")]
    Signal(String),

    #[error("Server already installed for this process")]
    AlreadyInstalled,

    #[error("Server is already running")]
    AlreadyRunning,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RotorError>;
