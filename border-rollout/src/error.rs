//! Errors in the library.
use thiserror::Error;

/// Errors raised by [`RolloutBuffer`](crate::RolloutBuffer).
#[derive(Error, Debug)]
pub enum RolloutBufferError {
    /// Invalid construction parameters.
    #[error("Invalid rollout buffer configuration: {0}")]
    Config(String),

    /// The shape of an argument disagrees with the declared layout.
    #[error("Shape mismatch in {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Name of the offending argument or observation component.
        name: String,
        /// Shape declared at construction, including the env axis.
        expected: Vec<usize>,
        /// Shape of the given array.
        actual: Vec<usize>,
    },

    /// An array with time and environment axes was expected.
    #[error("Expected at least 2 axes (time, env), got shape {0:?}")]
    TooFewAxes(Vec<usize>),

    /// An observation component declared in the layout was not given.
    #[error("Missing observation component: {0}")]
    MissingKey(String),

    /// An observation component not declared in the layout was given.
    #[error("Unexpected observation component: {0}")]
    UnexpectedKey(String),

    /// [`add`](crate::RolloutBuffer::add) was called on a full buffer.
    #[error("Rollout buffer is full (capacity = {capacity})")]
    Capacity {
        /// Number of time steps the buffer holds.
        capacity: usize,
    },

    /// The buffer was read before all time steps were written.
    #[error("Rollout buffer is not full ({count}/{capacity} steps)")]
    NotFull {
        /// Number of time steps written since the last reset.
        count: usize,
        /// Number of time steps the buffer holds.
        capacity: usize,
    },

    /// Reshaping an array failed.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl RolloutBufferError {
    /// Returns `true` for errors caused by arguments of a wrong shape.
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. }
                | Self::TooFewAxes(_)
                | Self::MissingKey(_)
                | Self::UnexpectedKey(_)
        )
    }
}
