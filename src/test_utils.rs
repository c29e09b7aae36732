//! Test doubles for the renderer and scanner capabilities
//!
//! [`MockRenderer`] records every call it receives and can be inspected
//! through a [`RenderLog`] handle after the renderer has been moved into a
//! session. [`ChannelScanner`] replays decode attempts pushed through a
//! [`ScanFeed`].

#![cfg(any(test, feature = "benchmark"))]

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::Result;
use crate::SyncError;
use crate::renderer::{FrameRenderer, RenderBackend, Snapshot};
use crate::scanner::{FrameScanner, ScanError, ScanOptions, ScanOutcome};

/// One call made to a [`MockRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCall {
    Create { text: String, size: u32 },
    Update(String),
    Capture(String),
    Display(String),
    Detach,
}

/// Shared view of everything a [`MockRenderer`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct RenderLog {
    calls: Arc<Mutex<Vec<RenderCall>>>,
}

impl RenderLog {
    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Number of real renders (create plus update).
    pub fn render_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RenderCall::Create { .. } | RenderCall::Update(_)))
            .count()
    }

    pub fn display_count(&self) -> usize {
        self.calls().iter().filter(|call| matches!(call, RenderCall::Display(_))).count()
    }

    pub fn detached(&self) -> bool {
        self.calls().contains(&RenderCall::Detach)
    }

    fn push(&self, call: RenderCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

/// Renderer that draws nothing and remembers everything.
///
/// Snapshots are `Snapshot::Source("snap:<wire text>")`, so a test can tell
/// which frame a redisplayed snapshot came from.
#[derive(Debug)]
pub struct MockRenderer {
    log: RenderLog,
    backend: Option<RenderBackend>,
    attached: bool,
    container_size: Option<u32>,
    on_screen: String,
    screen_sink: Option<mpsc::UnboundedSender<String>>,
    fail_update: bool,
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRenderer {
    pub fn new() -> Self {
        Self {
            log: RenderLog::default(),
            backend: Some(RenderBackend::Image),
            attached: true,
            container_size: None,
            on_screen: String::new(),
            screen_sink: None,
            fail_update: false,
        }
    }

    pub fn log(&self) -> RenderLog {
        self.log.clone()
    }

    /// Report this backend (or none) from `create`.
    pub fn with_backend(mut self, backend: Option<RenderBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn detached(mut self) -> Self {
        self.attached = false;
        self
    }

    pub fn with_container_size(mut self, size: u32) -> Self {
        self.container_size = Some(size);
        self
    }

    /// Forward the text of every code that appears on screen.
    pub fn with_screen_sink(mut self, sink: mpsc::UnboundedSender<String>) -> Self {
        self.screen_sink = Some(sink);
        self
    }

    pub fn failing_updates(mut self) -> Self {
        self.fail_update = true;
        self
    }

    fn show(&mut self, text: &str) {
        self.on_screen = text.to_string();
        if let Some(sink) = &self.screen_sink {
            let _ = sink.send(text.to_string());
        }
    }
}

#[async_trait::async_trait]
impl FrameRenderer for MockRenderer {
    fn is_attached(&self) -> bool {
        self.attached
    }

    fn container_size(&self) -> Option<u32> {
        self.container_size
    }

    async fn create(&mut self, text: &str, size: u32) -> Result<Option<RenderBackend>> {
        self.log.push(RenderCall::Create { text: text.to_string(), size });
        self.show(text);
        Ok(self.backend)
    }

    async fn update(&mut self, text: &str) -> Result<()> {
        if self.fail_update {
            return Err(SyncError::render_failed("update"));
        }
        self.log.push(RenderCall::Update(text.to_string()));
        self.show(text);
        Ok(())
    }

    async fn capture(&mut self, _backend: RenderBackend) -> Result<Snapshot> {
        self.log.push(RenderCall::Capture(self.on_screen.clone()));
        Ok(Snapshot::Source(format!("snap:{}", self.on_screen)))
    }

    async fn display(
        &mut self,
        label: &str,
        snapshot: &Snapshot,
        _backend: RenderBackend,
    ) -> Result<()> {
        let Snapshot::Source(source) = snapshot else {
            return Err(SyncError::render_failed("display"));
        };
        if source.strip_prefix("snap:") != Some(label) {
            return Err(SyncError::render_failed("display"));
        }
        self.log.push(RenderCall::Display(label.to_string()));
        self.show(label);
        Ok(())
    }

    async fn detach(&mut self) {
        self.log.push(RenderCall::Detach);
    }
}

/// Observable scanner lifecycle.
#[derive(Debug, Clone, Default)]
pub struct ScannerLog {
    inner: Arc<Mutex<ScannerEvents>>,
}

#[derive(Debug, Default)]
struct ScannerEvents {
    started: Option<ScanOptions>,
    stopped: bool,
}

impl ScannerLog {
    pub fn started_with(&self) -> Option<ScanOptions> {
        self.inner.lock().ok().and_then(|events| events.started.clone())
    }

    pub fn stopped(&self) -> bool {
        self.inner.lock().map(|events| events.stopped).unwrap_or(false)
    }
}

/// Sending half that feeds decode attempts to a [`ChannelScanner`].
#[derive(Debug, Clone)]
pub struct ScanFeed {
    tx: mpsc::UnboundedSender<ScanOutcome>,
}

impl ScanFeed {
    pub fn code(&self, text: impl Into<String>) {
        let _ = self.tx.send(Ok(text.into()));
    }

    pub fn no_code(&self) {
        let _ = self.tx.send(Err(ScanError::NoCodeFound));
    }

    pub fn error(&self, message: impl Into<String>) {
        let _ = self.tx.send(Err(ScanError::Failed(message.into())));
    }
}

/// Scanner whose decode attempts come from a channel.
///
/// `next_scan` returns `None` once every [`ScanFeed`] has been dropped.
#[derive(Debug)]
pub struct ChannelScanner {
    rx: mpsc::UnboundedReceiver<ScanOutcome>,
    log: ScannerLog,
    attached: bool,
}

impl ChannelScanner {
    pub fn new() -> (Self, ScanFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx, log: ScannerLog::default(), attached: true }, ScanFeed { tx })
    }

    pub fn log(&self) -> ScannerLog {
        self.log.clone()
    }

    pub fn detached(mut self) -> Self {
        self.attached = false;
        self
    }
}

#[async_trait::async_trait]
impl FrameScanner for ChannelScanner {
    fn is_attached(&self) -> bool {
        self.attached
    }

    async fn start(&mut self, options: &ScanOptions) -> Result<()> {
        if let Ok(mut events) = self.log.inner.lock() {
            events.started = Some(options.clone());
        }
        Ok(())
    }

    async fn next_scan(&mut self) -> Option<ScanOutcome> {
        self.rx.recv().await
    }

    async fn stop(&mut self) {
        if let Ok(mut events) = self.log.inner.lock() {
            events.stopped = true;
        }
        self.rx.close();
    }
}

/// JSON payload of roughly `approx_len` characters for tests and benches.
pub fn sample_payload(approx_len: usize) -> String {
    let filler: String = "lorem ipsum dolor sit amet ".chars().cycle().take(approx_len).collect();
    serde_json::json!({ "senderName": "Ann", "senderNote": filler }).to_string()
}
