//! Receive session: frame accumulation from a scanner

use futures::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, trace, warn};

use super::Callback;
use super::accumulator::{FrameAccumulator, Insert};
use crate::cancel::{AbortController, AbortSignal, CancelReason};
use crate::codec::{self, DataSetId};
use crate::config::ReceiveConfig;
use crate::manager::{SessionId, SlotRelease};
use crate::payload::ReceivedPayload;
use crate::scanner::{FrameScanner, ScanError, ScanOptions};
use crate::{Result, SyncError};

/// Reported after every accepted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Distinct indices received for the current data set
    pub frames_read: usize,
    pub frame_count: usize,
    pub frame_index: usize,
    pub chunk: String,
    pub data_set_id: DataSetId,
}

/// A fully reassembled transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedData {
    pub data_set_id: DataSetId,
    pub frame_count: usize,
    pub data: ReceivedPayload,
}

/// Snapshot of accumulation progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveProgress {
    pub data_set_id: Option<DataSetId>,
    pub frames_read: usize,
    pub frame_count: usize,
}

/// Lifecycle of a receive session.
#[derive(Debug, Clone)]
pub enum ReceiveState {
    Idle,
    Scanning,
    Completed,
    Cancelled(String),
    Superseded,
    Failed(SyncError),
}

impl ReceiveState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReceiveState::Idle | ReceiveState::Scanning)
    }

    fn from_outcome(outcome: &Result<ReceivedData>) -> Self {
        match outcome {
            Ok(_) => ReceiveState::Completed,
            Err(SyncError::Cancelled { reason: CancelReason::Superseded }) => {
                ReceiveState::Superseded
            }
            Err(SyncError::Cancelled { reason: CancelReason::Aborted(reason) }) => {
                ReceiveState::Cancelled(reason.clone())
            }
            Err(other) => ReceiveState::Failed(other.clone()),
        }
    }
}

/// Settings and hooks for one receive session.
pub struct ReceiveOptions {
    pub config: ReceiveConfig,
    on_frame_received: Option<Callback<ReceivedFrame>>,
    signal: Option<AbortSignal>,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self::new(ReceiveConfig::default())
    }
}

impl ReceiveOptions {
    pub fn new(config: ReceiveConfig) -> Self {
        Self { config, on_frame_received: None, signal: None }
    }

    /// Called after every accepted frame.
    pub fn on_frame_received<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&ReceivedFrame) + Send + 'static,
    {
        self.on_frame_received = Some(Box::new(callback));
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

/// Handle to a running receive session.
///
/// Dropping the handle cancels the session.
pub struct ReceiveSession {
    id: SessionId,
    controller: AbortController,
    state: watch::Receiver<ReceiveState>,
    progress: watch::Receiver<ReceiveProgress>,
    task: Option<JoinHandle<Result<ReceivedData>>>,
    outcome: Option<Result<ReceivedData>>,
}

impl ReceiveSession {
    /// Spawn the scan task. Must be called within a Tokio runtime.
    pub(crate) fn spawn<S: FrameScanner>(
        id: SessionId,
        scanner: S,
        options: ReceiveOptions,
        controller: AbortController,
        release: SlotRelease,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ReceiveState::Idle);
        let (progress_tx, progress_rx) = watch::channel(ReceiveProgress::default());

        let driver = ReceiveDriver {
            id,
            scanner,
            options: ScanOptions::from(&options.config),
            on_frame_received: options.on_frame_received,
            accumulator: FrameAccumulator::new(),
            state: state_tx,
            progress: progress_tx,
        };
        let signal = controller.signal();
        let task = tokio::spawn(async move {
            let _release = release;
            driver.run(signal).await
        });

        Self {
            id,
            controller,
            state: state_rx,
            progress: progress_rx,
            task: Some(task),
            outcome: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReceiveState {
        self.state.borrow().clone()
    }

    /// Current accumulation progress.
    pub fn current_progress(&self) -> ReceiveProgress {
        self.progress.borrow().clone()
    }

    /// Stream of progress snapshots, starting with the current one.
    pub fn progress(&self) -> impl Stream<Item = ReceiveProgress> + 'static {
        WatchStream::new(self.progress.clone())
    }

    /// Stop scanning and release the scanner.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.controller.abort(reason);
    }

    /// Wait for the transfer to complete.
    ///
    /// Cancel safe: dropping the future leaves the session running, so the
    /// handle can still [`cancel`](Self::cancel) and be awaited again. Once
    /// the session has ended every call returns the same outcome.
    pub async fn result(&mut self) -> Result<ReceivedData> {
        if let Some(task) = self.task.as_mut() {
            let joined = task.await;
            self.task = None;
            self.outcome = Some(match joined {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    warn!(session_id = %self.id, error = %join_error, "Receive task did not finish");
                    Err(task_gone())
                }
            });
        }
        self.outcome.clone().unwrap_or_else(|| Err(task_gone()))
    }
}

impl Drop for ReceiveSession {
    fn drop(&mut self) {
        debug!(session_id = %self.id, "Dropping receive session");
        self.controller.abort("receive session dropped");
    }
}

fn task_gone() -> SyncError {
    SyncError::cancelled(CancelReason::Aborted("receive task ended unexpectedly".to_string()))
}

struct ReceiveDriver<S> {
    id: SessionId,
    scanner: S,
    options: ScanOptions,
    on_frame_received: Option<Callback<ReceivedFrame>>,
    accumulator: FrameAccumulator,
    state: watch::Sender<ReceiveState>,
    progress: watch::Sender<ReceiveProgress>,
}

impl<S: FrameScanner> ReceiveDriver<S> {
    async fn run(mut self, signal: AbortSignal) -> Result<ReceivedData> {
        let outcome = tokio::select! {
            biased;
            reason = signal.aborted() => Err(SyncError::cancelled(reason)),
            result = self.scan(&signal) => result,
        };

        self.scanner.stop().await;

        match &outcome {
            Ok(received) => info!(
                session_id = %self.id,
                data_set_id = %received.data_set_id,
                frame_count = received.frame_count,
                "Receive session completed"
            ),
            Err(error) if error.is_cancelled() => {
                info!(session_id = %self.id, reason = %error, "Receive session cancelled")
            }
            Err(error) => warn!(session_id = %self.id, error = %error, "Receive session failed"),
        }
        self.state.send_replace(ReceiveState::from_outcome(&outcome));
        outcome
    }

    async fn scan(&mut self, signal: &AbortSignal) -> Result<ReceivedData> {
        signal.throw_if_aborted()?;

        info!(
            session_id = %self.id,
            max_scans_per_second = self.options.max_scans_per_second,
            camera = ?self.options.preferred_camera,
            "Starting receive session"
        );
        self.scanner.start(&self.options).await?;
        self.state.send_replace(ReceiveState::Scanning);

        loop {
            let Some(outcome) = self.scanner.next_scan().await else {
                return Err(SyncError::decode_failed(
                    "scanner stopped before the data set was complete",
                ));
            };

            let text = match outcome {
                Ok(text) => text,
                Err(ScanError::NoCodeFound) => continue,
                Err(error @ ScanError::Failed(_)) => {
                    return Err(SyncError::decode_failed_with_source(
                        "scanner reported a fatal error",
                        error,
                    ));
                }
            };

            let frame = match codec::decode(&text) {
                Ok(frame) => frame,
                Err(reason) => {
                    trace!(session_id = %self.id, %reason, "Ignoring scanned code");
                    continue;
                }
            };

            let frames_read = match self.accumulator.insert(&frame) {
                Insert::Stored { frames_read, reset } => {
                    if reset {
                        debug!(
                            session_id = %self.id,
                            data_set_id = %frame.data_set_id,
                            frame_count = frame.frame_count,
                            "Tracking data set"
                        );
                    }
                    frames_read
                }
                Insert::OutOfRange => {
                    warn!(
                        session_id = %self.id,
                        frame_index = frame.frame_index,
                        frame_count = frame.frame_count,
                        "Dropping frame with out-of-range index"
                    );
                    continue;
                }
            };

            trace!(
                session_id = %self.id,
                frame_index = frame.frame_index,
                frames_read,
                frame_count = frame.frame_count,
                "Frame accepted"
            );
            self.progress.send_replace(ReceiveProgress {
                data_set_id: Some(frame.data_set_id),
                frames_read,
                frame_count: frame.frame_count,
            });

            signal.throw_if_aborted()?;
            if let Some(callback) = self.on_frame_received.as_mut() {
                callback(&ReceivedFrame {
                    frames_read,
                    frame_count: frame.frame_count,
                    frame_index: frame.frame_index,
                    chunk: frame.chunk.clone(),
                    data_set_id: frame.data_set_id,
                });
            }

            if let Some(joined) = self.accumulator.assemble() {
                return Ok(ReceivedData {
                    data_set_id: frame.data_set_id,
                    frame_count: frame.frame_count,
                    data: ReceivedPayload::from_joined(joined),
                });
            }
        }
    }
}
