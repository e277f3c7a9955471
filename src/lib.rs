//! Game controller to keyboard/mouse mapping engine.
//!
//! Button edges are classified into taps, double taps, long holds, chords,
//! repeats and held modifiers; sticks and the touchpad drive the pointer,
//! scrolling and zoom; a radial command wheel launches applications and
//! websites. Everything ends up as calls on an [`output::OutputSink`].

pub mod analog;
pub mod config;
pub mod controller;
pub mod engine;
pub mod mapping;
pub mod output;
pub mod timing;
pub mod wheel;
