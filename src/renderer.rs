//! Renderer capability used by send sessions

use std::sync::Arc;

use crate::Result;

/// Output backend a renderer draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderBackend {
    /// The code is an image element whose source can be reused directly
    Image,
    /// The code is drawn onto a canvas and must be exported to be reused
    Canvas,
}

/// A reusable copy of a fully rendered code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// Image source (typically a data URL)
    Source(String),
    /// Encoded image bytes exported from a canvas
    Encoded(Arc<[u8]>),
}

/// Trait for 2D-code rendering surfaces
///
/// Send sessions only ever talk to this trait; drawing, sizing and the code
/// symbology itself belong to the implementation. A renderer may draw
/// asynchronously: a frame is only guaranteed complete once the *next*
/// `update` has been issued, which is why sessions capture one frame late.
#[async_trait::async_trait]
pub trait FrameRenderer: Send + 'static {
    /// Whether the renderer is bound to a live container.
    fn is_attached(&self) -> bool;

    /// Size of the container in pixels, used when no frame size is configured.
    fn container_size(&self) -> Option<u32> {
        None
    }

    /// Construct the code for the first frame.
    ///
    /// Returns the backend the renderer negotiated, or `None` when it cannot
    /// tell which of the two supported backends is active.
    async fn create(&mut self, text: &str, size: u32) -> Result<Option<RenderBackend>>;

    /// Redraw the existing code in place with new text.
    async fn update(&mut self, text: &str) -> Result<()>;

    /// Read back the code currently on screen.
    async fn capture(&mut self, backend: RenderBackend) -> Result<Snapshot>;

    /// Show a previously captured code without re-rendering it.
    async fn display(&mut self, label: &str, snapshot: &Snapshot, backend: RenderBackend)
    -> Result<()>;

    /// Release render-completion listeners. Called once when the session ends.
    async fn detach(&mut self) {}
}
