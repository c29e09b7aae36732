//! Session manager: one active sender and one active receiver.
//!
//! Starting a session supersedes the previous session of the same kind
//! before the new one is created. Send and receive sessions never interfere
//! with each other.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use tracing::{debug, info};

use crate::cancel::{AbortController, AbortSignal};
use crate::payload::Payload;
use crate::renderer::FrameRenderer;
use crate::scanner::FrameScanner;
use crate::session::{ReceiveOptions, ReceiveSession, SendOptions, SendSession};
use crate::{Result, SyncError};

/// Which kind of session a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Send,
    Receive,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Send => f.write_str("send"),
            SessionKind::Receive => f.write_str("receive"),
        }
    }
}

/// Identifier of a session, unique within its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Slot {
    id: SessionId,
    controller: AbortController,
}

#[derive(Default)]
struct Slots {
    send: Option<Slot>,
    receive: Option<Slot>,
    next_id: u64,
}

impl Slots {
    fn slot_mut(&mut self, kind: SessionKind) -> &mut Option<Slot> {
        match kind {
            SessionKind::Send => &mut self.send,
            SessionKind::Receive => &mut self.receive,
        }
    }
}

/// Clears a slot when the owning session task ends.
pub(crate) struct SlotRelease {
    slots: Weak<Mutex<Slots>>,
    kind: SessionKind,
    id: SessionId,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let Some(slots) = self.slots.upgrade() else {
            return;
        };
        let mut slots = lock(&slots);
        let slot = slots.slot_mut(self.kind);
        if slot.as_ref().is_some_and(|active| active.id == self.id) {
            *slot = None;
            debug!(kind = %self.kind, session_id = %self.id, "Session slot released");
        }
    }
}

fn lock(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    // Slot updates are single assignments; a poisoned lock still holds valid data.
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Tracks the active send and receive sessions.
///
/// Cloning a manager shares its slots.
///
/// ```rust,no_run
/// use qrsync::{SessionManager, SendOptions, SendConfig};
/// # use qrsync::renderer::FrameRenderer;
/// # async fn demo(renderer: impl FrameRenderer) -> qrsync::Result<()> {
/// let manager = SessionManager::new();
/// let mut session = manager.send(
///     "hello from the other side",
///     renderer,
///     SendOptions::new(SendConfig::default()).on_frame_rendered(|frame| {
///         println!("showing {}/{}", frame.frame_index + 1, frame.frame_count);
///     }),
/// )?;
/// session.started().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct SessionManager {
    slots: Arc<Mutex<Slots>>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("send", &self.active(SessionKind::Send))
            .field("receive", &self.active(SessionKind::Receive))
            .finish()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide manager behind [`crate::send`] and [`crate::receive`].
    pub fn global() -> &'static SessionManager {
        static GLOBAL: OnceLock<SessionManager> = OnceLock::new();
        GLOBAL.get_or_init(SessionManager::new)
    }

    /// The active session of `kind`, if any.
    pub fn active(&self, kind: SessionKind) -> Option<SessionId> {
        lock(&self.slots).slot_mut(kind).as_ref().map(|slot| slot.id)
    }

    /// Cancel the active session of `kind` as superseded.
    ///
    /// Returns the id of the session that was cancelled.
    pub fn supersede(&self, kind: SessionKind) -> Option<SessionId> {
        let previous = lock(&self.slots).slot_mut(kind).take()?;
        info!(kind = %kind, session_id = %previous.id, "Superseding active session");
        previous.controller.supersede();
        Some(previous.id)
    }

    /// Start displaying `payload` through `renderer`.
    ///
    /// Supersedes any active send session first. Fails immediately with
    /// [`SyncError::Validation`] when the payload is empty or not
    /// serializable, or when the renderer is not attached. Must be called
    /// within a Tokio runtime.
    pub fn send<R: FrameRenderer>(
        &self,
        payload: impl Into<Payload>,
        renderer: R,
        options: SendOptions,
    ) -> Result<SendSession> {
        self.supersede(SessionKind::Send);

        let payload = payload.into().serialize()?;
        if !renderer.is_attached() {
            return Err(SyncError::invalid("renderer is not attached to a render container"));
        }

        let (id, controller, release) = self.claim(SessionKind::Send, options.caller_signal());
        Ok(SendSession::spawn(id, payload, renderer, options, controller, release))
    }

    /// Start scanning through `scanner`.
    ///
    /// Supersedes any active receive session first. Fails immediately with
    /// [`SyncError::Validation`] when the scanner is not attached to a
    /// capture surface. Must be called within a Tokio runtime.
    pub fn receive<S: FrameScanner>(
        &self,
        scanner: S,
        options: ReceiveOptions,
    ) -> Result<ReceiveSession> {
        self.supersede(SessionKind::Receive);

        if !scanner.is_attached() {
            return Err(SyncError::invalid("scanner is not attached to a capture surface"));
        }

        let (id, controller, release) = self.claim(SessionKind::Receive, options.caller_signal());
        Ok(ReceiveSession::spawn(id, scanner, options, controller, release))
    }

    fn claim(
        &self,
        kind: SessionKind,
        caller: Option<&AbortSignal>,
    ) -> (SessionId, AbortController, SlotRelease) {
        let controller = match caller {
            Some(signal) => AbortController::linked(signal),
            None => AbortController::new(),
        };

        let mut slots = lock(&self.slots);
        slots.next_id += 1;
        let id = SessionId(slots.next_id);
        // A concurrent start may have filled the slot since we superseded it.
        let slot = Slot { id, controller: controller.clone() };
        if let Some(previous) = slots.slot_mut(kind).replace(slot) {
            previous.controller.supersede();
        }
        drop(slots);

        debug!(kind = %kind, session_id = %id, "Session slot claimed");
        let release = SlotRelease { slots: Arc::downgrade(&self.slots), kind, id };
        (id, controller, release)
    }
}
