//! Error types shared by shapes, bodies, joints and the world container.

use thiserror::Error;

/// Errors raised by construction checks and lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// A shape was built with a non-positive dimension or too few vertices.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),
    /// An argument outside of its valid domain (negative length, unknown body type, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The operation is not allowed in the current attachment state.
    #[error("Illegal state: {0}")]
    IllegalState(String),
}

impl PhysicsError {
    pub fn invalid_shape(msg: impl Into<String>) -> Self {
        Self::InvalidShape(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }
}

/// Convenient result alias for fallible physics operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;
