//! Integration layer
//!
//! Ties the workers together:
//! - [`config`]: configuration for every component
//! - [`coordinator`]: the turn state machine
//! - [`runtime`]: worker startup and ordered shutdown

pub mod config;
pub mod coordinator;
pub mod runtime;

pub use config::AssistantConfig;
pub use coordinator::{Listener, Outbox, Player, TurnCoordinator, TurnState, GENERATING_TEXT};
pub use runtime::AssistantRuntime;
