//! Send session: frame generation and rotation
//!
//! The session owns a renderer and cycles the encoded frames through it
//! until it is cancelled. Rendering a code is expensive, so each frame is
//! rendered exactly once; after that the session replays captured snapshots.
//!
//! ```text
//! tick 1      create(f0)
//! tick 2      capture(f0) -> cache, update(f1)
//! ...
//! tick n      capture(fn-2) -> cache, update(fn-1)
//! tick n+1    capture(fn-1) -> cache, display(cache[0]), rotate
//! tick n+2..  display(cache[0]), rotate
//! ```
//!
//! Capture trails rendering by one tick because a renderer may finish
//! drawing asynchronously; a frame is only known to be complete once the
//! next render call has been issued.

use std::collections::VecDeque;
use std::convert::Infallible;

use futures::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, trace, warn};

use super::Callback;
use crate::cancel::{AbortController, AbortSignal, CancelReason};
use crate::codec::{self, DataSetId, Frame};
use crate::config::SendConfig;
use crate::manager::{SessionId, SlotRelease};
use crate::renderer::{FrameRenderer, RenderBackend, Snapshot};
use crate::{Result, SyncError};

/// Metadata of the frame shown on a rotation tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    pub frame_index: usize,
    pub frame_count: usize,
    pub chunk: String,
    pub data_set_id: DataSetId,
}

impl From<&Frame> for RenderedFrame {
    fn from(frame: &Frame) -> Self {
        Self {
            frame_index: frame.frame_index,
            frame_count: frame.frame_count,
            chunk: frame.chunk.clone(),
            data_set_id: frame.data_set_id,
        }
    }
}

/// Lifecycle of a send session.
#[derive(Debug, Clone)]
pub enum SendState {
    Idle,
    Generating,
    RenderingFirstFrame,
    /// Multi-frame transfer cycling on the rotation timer
    Rotating,
    /// Single-frame transfer; displayed once, no timer
    Holding,
    Cancelled(String),
    Superseded,
    Failed(SyncError),
}

impl SendState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SendState::Cancelled(_) | SendState::Superseded | SendState::Failed(_))
    }

    /// Whether a frame is on screen and the session is running.
    pub fn is_displaying(&self) -> bool {
        matches!(self, SendState::Rotating | SendState::Holding)
    }

    /// The error a terminal state stands for.
    pub fn terminal_error(&self) -> Option<SyncError> {
        match self {
            SendState::Cancelled(reason) => {
                Some(SyncError::cancelled(CancelReason::Aborted(reason.clone())))
            }
            SendState::Superseded => Some(SyncError::cancelled(CancelReason::Superseded)),
            SendState::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    fn from_error(error: &SyncError) -> Self {
        match error {
            SyncError::Cancelled { reason: CancelReason::Superseded } => SendState::Superseded,
            SyncError::Cancelled { reason: CancelReason::Aborted(reason) } => {
                SendState::Cancelled(reason.clone())
            }
            other => SendState::Failed(other.clone()),
        }
    }
}

/// Settings and hooks for one send session.
pub struct SendOptions {
    pub config: SendConfig,
    on_frame_rendered: Option<Callback<RenderedFrame>>,
    signal: Option<AbortSignal>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self::new(SendConfig::default())
    }
}

impl SendOptions {
    pub fn new(config: SendConfig) -> Self {
        Self { config, on_frame_rendered: None, signal: None }
    }

    /// Called once per rotation tick with the frame being displayed.
    pub fn on_frame_rendered<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&RenderedFrame) + Send + 'static,
    {
        self.on_frame_rendered = Some(Box::new(callback));
        self
    }

    /// Abort the session when `signal` fires.
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub(crate) fn caller_signal(&self) -> Option<&AbortSignal> {
        self.signal.as_ref()
    }
}

/// Handle to a running send session.
///
/// Dropping the handle cancels the session.
pub struct SendSession {
    id: SessionId,
    controller: AbortController,
    state: watch::Receiver<SendState>,
}

impl SendSession {
    /// Spawn the rotation task. Must be called within a Tokio runtime.
    pub(crate) fn spawn<R: FrameRenderer>(
        id: SessionId,
        payload: String,
        renderer: R,
        options: SendOptions,
        controller: AbortController,
        release: SlotRelease,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SendState::Idle);
        let config = options.config.normalized();
        let frame_size = config.effective_frame_size(renderer.container_size());

        let driver = SendDriver {
            id,
            renderer,
            config,
            frame_size,
            on_frame_rendered: options.on_frame_rendered,
            state: state_tx,
        };
        let signal = controller.signal();
        tokio::spawn(async move {
            let _release = release;
            driver.run(payload, signal).await
        });

        Self { id, controller, state: state_rx }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SendState {
        self.state.borrow().clone()
    }

    /// Stream of lifecycle states, starting with the current one.
    pub fn states(&self) -> impl Stream<Item = SendState> + 'static {
        WatchStream::new(self.state.clone())
    }

    /// Wait until the first frame is on screen and rotation has begun.
    ///
    /// Fails with [`SyncError::Cancelled`] if the session is aborted before
    /// that point, or with whatever error ended it.
    pub async fn started(&mut self) -> Result<()> {
        let state = self
            .state
            .wait_for(|state| state.is_displaying() || state.is_terminal())
            .await
            .map(|state| state.clone())
            .map_err(|_| task_gone())?;

        match state.terminal_error() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Wait for the session to end and return the reason it ended.
    pub async fn closed(&mut self) -> SyncError {
        match self.state.wait_for(SendState::is_terminal).await {
            Ok(state) => state.terminal_error().unwrap_or_else(task_gone),
            Err(_) => task_gone(),
        }
    }

    /// Stop rotating and release the renderer.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.controller.abort(reason);
    }
}

impl Drop for SendSession {
    fn drop(&mut self) {
        debug!(session_id = %self.id, "Dropping send session");
        self.controller.abort("send session dropped");
    }
}

fn task_gone() -> SyncError {
    SyncError::cancelled(CancelReason::Aborted("send task ended unexpectedly".to_string()))
}

/// Frame captured after rendering, ready to be redisplayed.
struct CachedFrame {
    frame: Frame,
    label: String,
    snapshot: Snapshot,
}

/// Pending queue and artifact cache for one data set.
struct Rotation {
    frame_count: usize,
    pending: VecDeque<Frame>,
    cache: VecDeque<CachedFrame>,
    /// Frame most recently handed to the renderer, not yet captured
    current: Option<Frame>,
    created: bool,
    backend: Option<RenderBackend>,
}

impl Rotation {
    fn new(frames: Vec<Frame>) -> Self {
        Self {
            frame_count: frames.len(),
            cache: VecDeque::with_capacity(frames.len()),
            pending: frames.into(),
            current: None,
            created: false,
            backend: None,
        }
    }

    fn still_rendering(&self) -> bool {
        self.frame_count == 1 || self.cache.len() < self.frame_count - 1
    }

    fn backend(&self) -> Result<RenderBackend> {
        self.backend.ok_or_else(|| {
            SyncError::device_incompatible("render backend could not be determined")
        })
    }
}

struct SendDriver<R> {
    id: SessionId,
    renderer: R,
    config: SendConfig,
    frame_size: u32,
    on_frame_rendered: Option<Callback<RenderedFrame>>,
    state: watch::Sender<SendState>,
}

impl<R: FrameRenderer> SendDriver<R> {
    async fn run(mut self, payload: String, signal: AbortSignal) {
        let outcome = tokio::select! {
            biased;
            reason = signal.aborted() => Err(SyncError::cancelled(reason)),
            result = self.drive(&payload, &signal) => result,
        };
        let error = match outcome {
            Ok(never) => match never {},
            Err(error) => error,
        };

        self.renderer.detach().await;

        if error.is_cancelled() {
            info!(session_id = %self.id, reason = %error, "Send session cancelled");
        } else {
            warn!(session_id = %self.id, error = %error, "Send session failed");
        }
        self.set_state(SendState::from_error(&error));
    }

    async fn drive(&mut self, payload: &str, signal: &AbortSignal) -> Result<Infallible> {
        signal.throw_if_aborted()?;

        self.set_state(SendState::Generating);
        let encoded = codec::encode_frames(payload, self.config.chunk_size);
        let interval = self.config.tick_interval();
        info!(
            session_id = %self.id,
            data_set_id = %encoded.data_set_id,
            frame_count = encoded.frame_count(),
            chunk_size = self.config.chunk_size,
            interval_ms = interval.as_millis() as u64,
            "Starting send session"
        );

        let mut rotation = Rotation::new(encoded.frames);

        self.set_state(SendState::RenderingFirstFrame);
        self.tick(&mut rotation, signal).await?;

        if rotation.frame_count == 1 {
            debug!(session_id = %self.id, "Single frame, holding without rotation");
            self.set_state(SendState::Holding);
            return std::future::pending().await;
        }

        self.set_state(SendState::Rotating);
        loop {
            tokio::time::sleep(interval).await;
            self.tick(&mut rotation, signal).await?;
        }
    }

    async fn tick(&mut self, rotation: &mut Rotation, signal: &AbortSignal) -> Result<()> {
        let shown = if rotation.still_rendering() {
            self.render_next(rotation).await?
        } else {
            self.replay_cached(rotation).await?
        };

        trace!(
            session_id = %self.id,
            frame_index = shown.frame_index,
            frame_count = shown.frame_count,
            cached = rotation.cache.len(),
            "Frame displayed"
        );

        // No callbacks once cancellation is visible.
        signal.throw_if_aborted()?;
        if let Some(callback) = self.on_frame_rendered.as_mut() {
            callback(&RenderedFrame::from(&shown));
        }
        Ok(())
    }

    async fn render_next(&mut self, rotation: &mut Rotation) -> Result<Frame> {
        let next = rotation
            .pending
            .pop_front()
            .ok_or_else(|| SyncError::render_failed("frame queue exhausted"))?;
        let wire = next.wire();

        if !rotation.created {
            let backend = self.renderer.create(&wire, self.frame_size).await?;
            rotation.created = true;
            rotation.backend = backend;
            debug!(session_id = %self.id, ?backend, size = self.frame_size, "Renderer created");

            // More frames follow, so this one will have to be captured.
            if !next.is_last() {
                rotation.backend()?;
            }
        } else {
            self.capture_current(rotation).await?;
            self.renderer.update(&wire).await?;
        }

        rotation.current = Some(next.clone());
        Ok(next)
    }

    async fn replay_cached(&mut self, rotation: &mut Rotation) -> Result<Frame> {
        if rotation.cache.len() == rotation.frame_count - 1 {
            self.capture_current(rotation).await?;
            debug!(session_id = %self.id, "All frames cached, switching to replay");
        }

        let backend = rotation.backend()?;
        let entry = rotation
            .cache
            .pop_front()
            .ok_or_else(|| SyncError::render_failed("frame cache empty"))?;
        self.renderer.display(&entry.label, &entry.snapshot, backend).await?;

        let frame = entry.frame.clone();
        rotation.cache.push_back(entry);
        Ok(frame)
    }

    /// Snapshot the frame currently on screen into the cache.
    async fn capture_current(&mut self, rotation: &mut Rotation) -> Result<()> {
        let Some(frame) = rotation.current.take() else {
            return Ok(());
        };
        let backend = rotation.backend()?;
        let snapshot = self.renderer.capture(backend).await?;
        rotation.cache.push_back(CachedFrame { label: frame.wire(), frame, snapshot });
        Ok(())
    }

    fn set_state(&self, state: SendState) {
        trace!(session_id = %self.id, ?state, "Send state");
        self.state.send_replace(state);
    }
}
