//! Library error types.

use thiserror::Error;

/// Device-access failures. The Display text is what the user sees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera access denied: {0}")]
    PermissionDenied(String),

    #[error("No camera device found")]
    NoDevice,

    #[error("Camera unavailable: {0}")]
    Device(String),
}

impl CameraError {
    /// Classifies a backend error message.
    pub fn from_backend(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
            CameraError::PermissionDenied(message)
        } else if lower.contains("no device") || lower.contains("not found") {
            CameraError::NoDevice
        } else {
            CameraError::Device(message)
        }
    }
}

/// Errors on the perception service channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("gRPC status error: {0}")]
    Status(#[from] tonic::Status),

    #[error("Perception channel closed")]
    Closed,
}

/// Errors from the recommendation service.
#[derive(Error, Debug)]
pub enum RecommendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid recommendation endpoint: {0}")]
    InvalidEndpoint(String),
}
