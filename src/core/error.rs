use thiserror::Error;

/// Errors raised while loading or validating a [`SimulationConfig`](crate::core::config::SimulationConfig)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors reported by a snapshot transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

/// Errors surfaced by session lifecycle operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Session already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, SessionError>;
