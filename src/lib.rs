//! Air-gapped data transfer over animated 2D codes.
//!
//! qrsync moves a text or JSON payload from one device to another with no
//! network between them. The sender splits the payload into small frames and
//! cycles them on screen; the receiver points a camera at the screen, collects
//! frames in any order and reassembles the payload once every frame has been
//! seen.
//!
//! # Features
//!
//! - **Self-describing frames**: every code carries protocol version, data-set
//!   fingerprint, index and count (`:V:D:I:C:T`)
//! - **Render once**: each frame is rendered a single time and replayed from a
//!   captured snapshot afterwards
//! - **Cancellation**: sessions honour caller abort signals and supersede
//!   each other cleanly
//! - **Capability traits**: drawing and camera decoding are supplied through
//!   [`FrameRenderer`] and [`FrameScanner`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use qrsync::{ReceiveOptions, SendOptions};
//! # use qrsync::{FrameRenderer, FrameScanner};
//! # async fn demo(renderer: impl FrameRenderer, scanner: impl FrameScanner) -> qrsync::Result<()> {
//! let payload = serde_json::json!({ "senderName": "Ann", "senderNote": "Hi" });
//!
//! let mut sending = qrsync::send(payload, renderer, SendOptions::default())?;
//! sending.started().await?;
//!
//! let mut receiving = qrsync::receive(scanner, ReceiveOptions::default())?;
//! let received = receiving.result().await?;
//! println!("{} frames from {}", received.frame_count, received.data_set_id);
//! # Ok(())
//! # }
//! ```

// Core types and error handling
pub mod cancel;
pub mod codec;
pub mod config;
mod error;
pub mod payload;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;

// Capabilities
pub mod renderer;
pub mod scanner;

// Sessions
pub mod manager;
pub mod session;

pub use cancel::{AbortController, AbortSignal, CancelReason};
pub use codec::{DataSetId, Frame, PROTOCOL_VERSION};
pub use config::{CameraFacing, ReceiveConfig, SendConfig, SyncConfig};
pub use error::*;
pub use manager::{SessionId, SessionKind, SessionManager};
pub use payload::{Payload, ReceivedPayload};
pub use renderer::{FrameRenderer, RenderBackend, Snapshot};
pub use scanner::{FrameScanner, ScanError, ScanOptions, ScanOutcome};
pub use session::{
    ReceiveOptions, ReceiveProgress, ReceiveSession, ReceiveState, ReceivedData, ReceivedFrame,
    RenderedFrame, SendOptions, SendSession, SendState,
};

/// Start displaying `payload` through `renderer`.
///
/// Uses the process-wide [`SessionManager`], so any send session started
/// earlier through this function is superseded.
///
/// # Errors
///
/// Returns [`SyncError::Validation`] if the payload is empty or cannot be
/// serialized, or if the renderer is not attached.
pub fn send<R: FrameRenderer>(
    payload: impl Into<Payload>,
    renderer: R,
    options: SendOptions,
) -> Result<SendSession> {
    SessionManager::global().send(payload, renderer, options)
}

/// Start scanning through `scanner`.
///
/// Uses the process-wide [`SessionManager`], so any receive session started
/// earlier through this function is superseded.
///
/// # Errors
///
/// Returns [`SyncError::Validation`] if the scanner is not attached.
pub fn receive<S: FrameScanner>(scanner: S, options: ReceiveOptions) -> Result<ReceiveSession> {
    SessionManager::global().receive(scanner, options)
}
