//! Error definitions for the engine module

use crate::config::ConfigError;
use crate::mapping::MappingError;
use thiserror::Error;

/// Errors raised while starting, running or stopping the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine settings were rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Active profile was rejected
    #[error("Profile error: {0}")]
    Mapping(#[from] MappingError),

    /// Communication over a channel failed
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Engine task panicked or was aborted
    #[error("Task error: {0}")]
    TaskError(String),

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}
