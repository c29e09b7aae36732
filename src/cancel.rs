//! Cancellation fabric shared by send and receive sessions.
//!
//! An [`AbortController`] owns the right to abort; any number of cloned
//! [`AbortSignal`]s observe it. Signals can be linked so a session aborts when
//! either its caller or the [`SessionManager`](crate::SessionManager) asks it
//! to, while still reporting which of the two fired first.

use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

use crate::{Result, SyncError};

/// Why a session was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// Aborted through a signal or an explicit `cancel()` call.
    Aborted(String),
    /// Replaced by a newer session of the same kind.
    Superseded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Aborted(reason) => f.write_str(reason),
            CancelReason::Superseded => f.write_str("superseded by a newer session"),
        }
    }
}

/// Read side of an abort controller.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
    parent: Option<Box<AbortSignal>>,
}

impl AbortSignal {
    /// Whether this signal (or any linked parent) has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason recorded by whichever controller fired first.
    pub fn reason(&self) -> Option<CancelReason> {
        if !self.is_aborted() {
            return None;
        }
        self.reason
            .get()
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.reason()))
    }

    /// Wait until the signal is aborted and return the reason.
    pub async fn aborted(&self) -> CancelReason {
        self.token.cancelled().await;
        self.reason().unwrap_or_else(|| CancelReason::Aborted("aborted".to_string()))
    }

    /// Fail with [`SyncError::Cancelled`] if the signal has already fired.
    pub fn throw_if_aborted(&self) -> Result<()> {
        match self.reason() {
            Some(reason) => Err(SyncError::cancelled(reason)),
            None => Ok(()),
        }
    }
}

/// Write side of the cancellation fabric.
#[derive(Debug, Clone)]
pub struct AbortController {
    signal: AbortSignal,
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortController {
    /// Create an independent controller.
    pub fn new() -> Self {
        Self {
            signal: AbortSignal {
                token: CancellationToken::new(),
                reason: Arc::new(OnceLock::new()),
                parent: None,
            },
        }
    }

    /// Create a controller that also aborts when `parent` aborts.
    pub fn linked(parent: &AbortSignal) -> Self {
        Self {
            signal: AbortSignal {
                token: parent.token.child_token(),
                reason: Arc::new(OnceLock::new()),
                parent: Some(Box::new(parent.clone())),
            },
        }
    }

    /// Get a signal observing this controller.
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Abort with a caller-supplied reason. Later aborts keep the first reason.
    pub fn abort(&self, reason: impl Into<String>) {
        self.fire(CancelReason::Aborted(reason.into()));
    }

    /// Abort because a newer session of the same kind took over.
    pub fn supersede(&self) {
        self.fire(CancelReason::Superseded);
    }

    /// Whether this controller has fired (directly or through its parent).
    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }

    fn fire(&self, reason: CancelReason) {
        // A parent that already fired owns the reason.
        if self.signal.is_aborted() {
            return;
        }
        let _ = self.signal.reason.set(reason);
        self.signal.token.cancel();
    }
}
