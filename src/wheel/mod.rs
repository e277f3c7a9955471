//! Command wheel: a radial menu driven by one stick while its activator
//! button is held.

pub mod item;
pub mod selector;

pub use item::{WheelActivation, WheelItem, WheelItemKind, WheelZone};
pub use selector::{segment_index, RadialSelector, SelectorSettings};
