//! Physical button input

pub mod buttons;

pub use buttons::{ButtonConfig, ButtonPin, EdgeDetector, EdgeTracker};
