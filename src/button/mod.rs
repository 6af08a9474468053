//! Button input model
//!
//! Defines the fixed four-button alphabet, logical press/release edges as
//! delivered by the external debounced edge source, and the press registry
//! that detects illegal concurrent presses.

mod edge;
mod registry;

pub use edge::{ButtonEdge, ButtonId, CallerId, Edge, RecordingChannel};
pub use registry::{PressOutcome, PressRegistry, RegistrySnapshot};
