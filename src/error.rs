use thiserror::Error;

use crate::compositor::{Backend, ChannelRole};

/// Library error type for mask map compositing.
#[derive(Debug, Error)]
pub enum Error {
    /// The channel descriptors cannot produce a mask map.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),

    /// The selected backend could not finish the composite.
    #[error("{backend} backend failed: {reason}")]
    ExecutionFailure { backend: Backend, reason: String },
}

impl Error {
    pub(crate) fn execution(backend: Backend, reason: impl Into<String>) -> Self {
        Self::ExecutionFailure {
            backend,
            reason: reason.into(),
        }
    }

    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::ExecutionFailure { .. })
    }
}

/// Reasons an input set is rejected before any output is allocated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidInput {
    /// No channel has a source texture, so the output size is unknown.
    #[error("no channel source provided; assign at least one input texture")]
    NoSources,

    /// A source does not share the size of the first present source.
    #[error("{role} source is {found:?} but the mask map is {expected:?}")]
    DimensionMismatch {
        role: ChannelRole,
        expected: (u32, u32),
        found: (u32, u32),
    },

    /// A source with zero width or height.
    #[error("{role} source has no pixels")]
    EmptySource { role: ChannelRole },

    /// A fallback value that is NaN or infinite.
    #[error("{role} fallback value must be finite")]
    NonFiniteFallback { role: ChannelRole },
}

pub type Result<T> = std::result::Result<T, Error>;
