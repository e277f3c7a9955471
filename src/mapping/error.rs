//! Error definitions for the mapping module

use crate::controller::button::ButtonId;
use thiserror::Error;

/// Errors raised while loading or validating a profile
#[derive(Debug, Error)]
pub enum MappingError {
    /// A chord must combine at least two buttons
    #[error("Chord {0:?} needs at least two buttons")]
    ChordTooSmall(Vec<ButtonId>),

    /// Two chords share the same button set
    #[error("Duplicate chord for buttons {0:?}")]
    DuplicateChord(Vec<ButtonId>),

    /// The same button activates more than one layer
    #[error("Button {0} activates more than one layer")]
    DuplicateLayerActivator(ButtonId),

    /// A layer activator cannot also be a chord member
    #[error("Layer activator {0} is also part of a chord")]
    ActivatorInChord(ButtonId),

    /// Two layers carry the same id
    #[error("Duplicate layer id: {0}")]
    DuplicateLayer(String),

    /// A timing value is zero where it must be positive
    #[error("Invalid timing for {button}: {reason}")]
    InvalidTiming { button: String, reason: String },

    /// Command wheel configuration is inconsistent
    #[error("Command wheel error: {0}")]
    WheelError(String),

    /// Profile document could not be parsed
    #[error("Profile parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Profile file could not be read
    #[error("Profile I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
