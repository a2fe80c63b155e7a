// =============================================================================
// Engine Errors
// =============================================================================
//
// Failures that stop the engine from producing *any* usable answer surface as
// an `EngineError`.  Failures that only affect part of a computation (one bar,
// one optimizer candidate) are absorbed where they happen and never reach this
// type.
// =============================================================================

use thiserror::Error;

/// Errors produced by the normalizer, indicator registry and optimizer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The input table has no parsable time axis or is structurally broken.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The requested indicator code is not in the registry.
    #[error("unknown indicator: {0}")]
    UnknownIndicator(String),

    /// Not enough history to run an optimization.
    #[error("insufficient data: need {required} bars, got {actual}")]
    DataUnavailable {
        /// Minimum bar count the optimizer needs.
        required: usize,
        /// Bars actually available.
        actual: usize,
    },

    /// A parameter is missing, non-numeric or out of range.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Degenerate numerical situation inside an indicator.
    #[error("computation error: {0}")]
    Computation(String),
}

impl EngineError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub fn computation(msg: impl Into<String>) -> Self {
        Self::Computation(msg.into())
    }

    /// `true` for errors the caller must see; `false` for errors that degrade
    /// to an empty result.
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self,
            Self::UnknownIndicator(_) | Self::DataUnavailable { .. }
        )
    }
}
