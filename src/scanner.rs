//! Scanner capability used by receive sessions

use thiserror::Error;

use crate::Result;
use crate::config::{CameraFacing, ReceiveConfig};

/// Options passed to a scanner when a receive session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub max_scans_per_second: u32,
    pub preferred_camera: CameraFacing,
    pub highlight_scan_region: bool,
}

impl From<&ReceiveConfig> for ScanOptions {
    fn from(config: &ReceiveConfig) -> Self {
        let config = config.normalized();
        Self {
            max_scans_per_second: config.max_scans_per_second,
            preferred_camera: config.preferred_camera,
            highlight_scan_region: config.highlight_scan_region,
        }
    }
}

/// A failed decode attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// Nothing decodable in view. Expected between frames.
    #[error("no code found")]
    NoCodeFound,

    /// Anything else the scanner reports; ends the receive session.
    #[error("{0}")]
    Failed(String),
}

impl ScanError {
    /// Classify a raw scanner error message.
    ///
    /// Scanner libraries tend to report "No QR code found" as an ordinary
    /// error string; it is matched case-insensitively.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("no qr code found") || lower.contains("no code found") {
            ScanError::NoCodeFound
        } else {
            ScanError::Failed(message)
        }
    }
}

/// One decode attempt.
pub type ScanOutcome = std::result::Result<String, ScanError>;

/// Trait for camera decode streams
///
/// Mirrors a pull-based frame source: each call to [`next_scan`](Self::next_scan)
/// waits for the scanner's next decode attempt. The scanner paces itself
/// according to [`ScanOptions::max_scans_per_second`].
#[async_trait::async_trait]
pub trait FrameScanner: Send + 'static {
    /// Whether the scanner is bound to a live capture surface.
    fn is_attached(&self) -> bool;

    /// Open the camera and begin decoding.
    async fn start(&mut self, options: &ScanOptions) -> Result<()>;

    /// Wait for the next decode attempt.
    ///
    /// Returns `None` once the scanner has stopped producing results.
    async fn next_scan(&mut self) -> Option<ScanOutcome>;

    /// Stop decoding and release the camera. Sessions always call this.
    async fn stop(&mut self);
}
