//! Error types for optical transfer sessions.
//!
//! Every failure a caller can observe is a [`SyncError`]. Validation failures
//! are returned synchronously from [`SessionManager::send`](crate::SessionManager::send)
//! and [`SessionManager::receive`](crate::SessionManager::receive); everything
//! else surfaces only as the outcome of the session future.
//!
//! ## Error Categories
//!
//! - **Validation**: bad call-time arguments (empty payload, detached surface)
//! - **Cancelled**: explicit abort or supersession by a newer session of the same kind
//! - **DeviceCompatibility**: the renderer could not report a usable output backend
//! - **Decode**: the scanner reported a fatal error other than "no code found"
//! - **Render**: the renderer capability failed while drawing or capturing
//! - **Config**: a configuration document could not be parsed
//!
//! Frames from an unsupported protocol revision are deliberately *not* errors;
//! see [`Unrecognized`](crate::codec::Unrecognized).
//!
//! ```rust
//! use qrsync::SyncError;
//!
//! let error = SyncError::device_incompatible("render backend could not be determined");
//! assert!(!error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::sync::Arc;
use thiserror::Error;

use crate::cancel::CancelReason;

/// Result type alias for transfer operations.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Boxed capability error shared between cloned session states.
pub type SharedSource = Arc<dyn std::error::Error + Send + Sync>;

/// Main error type for transfer sessions.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum SyncError {
    #[error("Invalid argument: {reason}")]
    Validation { reason: String },

    #[error("Session cancelled: {reason}")]
    Cancelled { reason: CancelReason },

    #[error("Device not supported: {reason}")]
    DeviceCompatibility { reason: String },

    #[error("Scanner failed: {reason}")]
    Decode {
        reason: String,
        #[source]
        source: Option<SharedSource>,
    },

    #[error("Renderer failed during {operation}")]
    Render {
        operation: String,
        #[source]
        source: Option<SharedSource>,
    },

    #[error("Configuration error: {details}")]
    Config { details: String },
}

impl SyncError {
    /// Returns whether re-invoking the operation could plausibly succeed.
    ///
    /// No operation in this crate retries on its own; this only classifies.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Validation { .. } => false,
            SyncError::Cancelled { .. } => true,
            SyncError::DeviceCompatibility { .. } => false,
            SyncError::Decode { .. } => true,
            SyncError::Render { .. } => true,
            SyncError::Config { .. } => false,
        }
    }

    /// Returns whether this error is a cancellation (abort or supersession).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled { .. })
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            SyncError::Validation { .. } => vec![
                "Provide a non-empty string or a JSON object/array payload",
                "Attach the renderer or scanner to a live surface before starting",
            ],
            SyncError::Cancelled { .. } => vec![
                "Start a new session if the transfer is still wanted",
                "Check whether another session of the same kind replaced this one",
            ],
            SyncError::DeviceCompatibility { .. } => vec![
                "Use a renderer that reports an image or canvas backend",
                "Try a different device or display surface",
            ],
            SyncError::Decode { .. } => vec![
                "Check camera permissions and availability",
                "Try another preferred camera",
                "Restart the receive session",
            ],
            SyncError::Render { .. } => vec![
                "Verify the render container is still attached",
                "Restart the send session",
            ],
            SyncError::Config { .. } => vec![
                "Check the configuration document syntax",
                "Compare field names against the documented configuration keys",
            ],
        }
    }

    /// Helper constructor for validation errors.
    pub fn invalid(reason: impl Into<String>) -> Self {
        SyncError::Validation { reason: reason.into() }
    }

    /// Helper constructor for cancellation errors.
    pub fn cancelled(reason: CancelReason) -> Self {
        SyncError::Cancelled { reason }
    }

    /// Helper constructor for device compatibility errors.
    pub fn device_incompatible(reason: impl Into<String>) -> Self {
        SyncError::DeviceCompatibility { reason: reason.into() }
    }

    /// Helper constructor for fatal scanner errors.
    pub fn decode_failed(reason: impl Into<String>) -> Self {
        SyncError::Decode { reason: reason.into(), source: None }
    }

    /// Helper constructor for fatal scanner errors with source.
    pub fn decode_failed_with_source(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SyncError::Decode { reason: reason.into(), source: Some(Arc::new(source)) }
    }

    /// Helper constructor for renderer failures.
    pub fn render_failed(operation: impl Into<String>) -> Self {
        SyncError::Render { operation: operation.into(), source: None }
    }

    /// Helper constructor for renderer failures with source.
    pub fn render_failed_with_source(
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SyncError::Render { operation: operation.into(), source: Some(Arc::new(source)) }
    }
}

impl From<serde_yaml_ng::Error> for SyncError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        SyncError::Config { details: err.to_string() }
    }
}
