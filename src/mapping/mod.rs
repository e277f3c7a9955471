//! Profiles and action resolution.
//!
//! A [`Profile`] holds base button mappings, chords, layers, per-application
//! overrides, analog settings and the command wheel. [`resolver`] turns a
//! button (or a captured chord set, or a wheel selection) into the action
//! that should fire.

pub mod action;
pub mod error;
pub mod profile;
pub mod resolver;

pub use action::{Action, ActionMapping, KeyCode, Modifiers, MouseButton, SystemCommand};
pub use error::MappingError;
pub use profile::{Profile, ProfileSource, ProfileStore};
