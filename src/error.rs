//! Error types for the simulator API.
//!
//! Wiring faults are never reported through these; they are collected as
//! [`crate::diagnostics::CircuitFault`] values in the simulation result.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("unknown component type '{kind}' for component {id}")]
    UnknownComponentType { id: String, kind: String },

    #[error("duplicate component id: {0}")]
    DuplicateComponent(String),

    #[error("component {id} is a {actual}, expected a {expected}")]
    WrongComponentType {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid {property} for {id}: {reason}")]
    InvalidValue {
        id: String,
        property: String,
        reason: String,
    },

    #[error("unknown pin {pin} on board {board}")]
    UnknownPin { board: String, pin: String },
}

pub type SimResult<T> = std::result::Result<T, SimError>;
