//! Denoiser error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building, submitting or tearing down the denoiser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DenoiseError {
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    #[error("failed to load shader {}: {reason}", path.display())]
    ShaderLoadFailed { path: PathBuf, reason: String },
    #[error("shader compilation failed: {0}")]
    ShaderCompilationFailed(String),
    #[error("descriptor pool exhausted: {0}")]
    DescriptorPoolExhausted(String),
    #[error("out of GPU memory")]
    OutOfMemory,
    #[error("GPU device lost")]
    DeviceLost,
    #[error("queue submission failed: {0}")]
    SubmissionFailed(String),
    /// The previous signal has not been waited on by the frame driver yet.
    #[error("signal semaphore still pending from the previous submission")]
    SignalNotConsumed,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("denoiser has been destroyed")]
    Destroyed,
}

impl DenoiseError {
    /// Returns true for errors raised while constructing GPU objects.
    pub fn is_construction_failure(&self) -> bool {
        matches!(
            self,
            Self::InitializationFailed(_)
                | Self::ResourceCreationFailed(_)
                | Self::ShaderLoadFailed { .. }
                | Self::ShaderCompilationFailed(_)
                | Self::DescriptorPoolExhausted(_)
                | Self::OutOfMemory
                | Self::DeviceLost
        )
    }
}

/// Result alias used throughout the crate.
pub type DenoiseResult<T> = Result<T, DenoiseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DenoiseError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = DenoiseError::ShaderLoadFailed {
            path: PathBuf::from("Denoiser.comp.spv"),
            reason: "not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to load shader Denoiser.comp.spv: not found"
        );
    }

    #[test]
    fn test_construction_failure_classification() {
        assert!(DenoiseError::DeviceLost.is_construction_failure());
        assert!(DenoiseError::DescriptorPoolExhausted("sets".into()).is_construction_failure());
        assert!(!DenoiseError::SignalNotConsumed.is_construction_failure());
        assert!(!DenoiseError::Destroyed.is_construction_failure());
    }
}
