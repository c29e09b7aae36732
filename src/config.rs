//! Session configuration.
//!
//! Every numeric setting has a documented range. Out-of-range values are
//! clamped by `normalized()` when a session starts; they are never rejected.
//!
//! Configurations can be embedded in an application's YAML settings:
//!
//! ```rust
//! use qrsync::SyncConfig;
//!
//! let config = SyncConfig::from_yaml(
//!     "send:\n  max_frames_per_second: 50\nreceive:\n  preferred_camera: user\n",
//! ).unwrap();
//! assert_eq!(config.send.normalized().max_frames_per_second, 13);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::Result;
use crate::codec::{self, DEFAULT_CHUNK_SIZE};

/// Lowest rate accepted for frame rotation and scanning.
pub const MIN_RATE: u32 = 2;

/// Highest rate accepted for frame rotation and scanning.
pub const MAX_RATE: u32 = 13;

/// Smallest edge length of a rendered code, in pixels.
pub const MIN_FRAME_SIZE: u32 = 150;

const MIN_TICK: Duration = Duration::from_millis(75);
const MAX_TICK: Duration = Duration::from_millis(500);

/// Sender settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    /// Rotation rate, clamped to 2..=13
    pub max_frames_per_second: u32,

    /// Characters per frame, clamped to 25..=150
    pub chunk_size: usize,

    /// Requested code edge length in pixels; at least 150 is used
    pub frame_size: Option<u32>,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self { max_frames_per_second: 7, chunk_size: DEFAULT_CHUNK_SIZE, frame_size: None }
    }
}

impl SendConfig {
    pub fn with_max_frames_per_second(mut self, fps: u32) -> Self {
        self.max_frames_per_second = fps;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_frame_size(mut self, pixels: u32) -> Self {
        self.frame_size = Some(pixels);
        self
    }

    /// Clamp every setting into its supported range.
    pub fn normalized(&self) -> Self {
        Self {
            max_frames_per_second: self.max_frames_per_second.clamp(MIN_RATE, MAX_RATE),
            chunk_size: codec::clamp_chunk_size(self.chunk_size),
            frame_size: self.frame_size.map(|size| size.max(MIN_FRAME_SIZE)),
        }
    }

    /// Delay between rotation ticks.
    pub fn tick_interval(&self) -> Duration {
        let fps = self.max_frames_per_second.clamp(MIN_RATE, MAX_RATE);
        Duration::from_millis(1000u64.div_ceil(u64::from(fps))).clamp(MIN_TICK, MAX_TICK)
    }

    /// Edge length to render at, given the container's own size if known.
    pub fn effective_frame_size(&self, container: Option<u32>) -> u32 {
        self.frame_size.or(container).unwrap_or(0).max(MIN_FRAME_SIZE)
    }
}

/// Which camera a scanner should prefer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraFacing {
    /// Rear camera on phones and tablets
    #[default]
    Environment,
    /// Front camera
    User,
    /// A specific device id
    Device(String),
}

/// Receiver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveConfig {
    /// Scan attempts per second, clamped to 2..=13
    pub max_scans_per_second: u32,

    pub preferred_camera: CameraFacing,

    /// Ask the scanner to outline the region it is decoding
    pub highlight_scan_region: bool,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            max_scans_per_second: 10,
            preferred_camera: CameraFacing::Environment,
            highlight_scan_region: true,
        }
    }
}

impl ReceiveConfig {
    pub fn with_max_scans_per_second(mut self, rate: u32) -> Self {
        self.max_scans_per_second = rate;
        self
    }

    pub fn with_preferred_camera(mut self, camera: CameraFacing) -> Self {
        self.preferred_camera = camera;
        self
    }

    pub fn with_highlight_scan_region(mut self, highlight: bool) -> Self {
        self.highlight_scan_region = highlight;
        self
    }

    /// Clamp every setting into its supported range.
    pub fn normalized(&self) -> Self {
        Self {
            max_scans_per_second: self.max_scans_per_second.clamp(MIN_RATE, MAX_RATE),
            ..self.clone()
        }
    }
}

/// Combined settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub send: SendConfig,
    pub receive: ReceiveConfig,
}

impl SyncConfig {
    /// Parse a YAML settings document. Missing keys take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Read and parse a YAML settings file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading sync config {}", path.display()))?;
        let config = Self::from_yaml(&yaml)
            .with_context(|| format!("parsing sync config {}", path.display()))?;
        Ok(config)
    }
}
