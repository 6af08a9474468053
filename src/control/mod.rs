//! Button machine: edge routing and timer scheduling
//!
//! Connects the press registry, the per-button hold confirmers, the audio
//! arbiter, and the action dispatcher into one event-driven loop.

mod machine;

pub use machine::ButtonMachine;
