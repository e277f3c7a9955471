//! Mapping engine.
//!
//! [`classifier`] resolves button edges, [`core`] joins it with the analog
//! pipeline and the command wheel, and [`lifecycle`] runs the core on a
//! tokio task.
//!
//! ```text
//! ControllerEvent ──► EngineCore ──► Effect ──► OutputSink
//!                     │  classifier (timers, chord window)
//!                     │  analog (sticks, touchpad)
//!                     └─ wheel (radial selector)
//! ```

pub mod chord;
pub mod classifier;
pub mod core;
pub mod error;
pub mod lifecycle;
pub mod timers;

pub use self::core::EngineCore;
pub use classifier::{ButtonClassifier, ClassifierSettings};
pub use error::EngineError;
pub use lifecycle::{MappingEngine, MappingEngineHandle, MappingEngineState};
