//! Newline-delimited JSON bridge to the host UI
//!
//! The host process owns the actual panel, browser windows, and notifications.
//! It talks to us over stdin/stdout, one JSON frame per line:
//!
//! stdin:
//! - `{"webview": {...}}`: a message from the authentication panel
//! - `{"window": {"source", "origin", "data"}}`: a browser `message` event
//! - `{"window-opened": {"id", "blocked"}}`: answer to `open-window`
//! - `"close"`: the user closed the panel
//! - `{"open": {"notice", "wait"}}`: show the panel
//!
//! stdout:
//! - `{"webview": {...}}`: a message for the panel
//! - `{"render": {...}}`: (re)render the panel
//! - `{"open-window": {"id", "url", "target", "features"}}`
//! - `{"notify": {...}}`: show a notification
//! - `{"token-ready": bool}`: an `open` with `wait` finished

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use auth_view::{
    AuthView, Error as ViewError, MessageApiCall, Notifier, OutboundMessage, PageContent,
    SurfaceEvent, SurfaceFactory, SurfaceHandle, UiSurface,
};
use github_auth::{BarrierOutcome, Browser, WindowId, WindowMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Frames read from the host.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Inbound {
    Webview(Value),
    Window(WindowFrame),
    WindowOpened(WindowOpenedFrame),
    Close,
    Open(OpenFrame),
}

#[derive(Debug, Deserialize)]
pub struct WindowFrame {
    #[serde(default)]
    pub source: Option<Uuid>,
    pub origin: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct WindowOpenedFrame {
    pub id: Uuid,
    #[serde(default)]
    pub blocked: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OpenFrame {
    pub notice: String,
    pub wait: bool,
}

/// Frames written to the host.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outbound {
    Webview(OutboundMessage),
    Render(PageContent),
    OpenWindow {
        id: Uuid,
        url: String,
        target: String,
        features: String,
    },
    Notify(MessageApiCall),
    TokenReady(bool),
}

/// Cloneable sender for stdout frames.
#[derive(Clone)]
pub struct Output {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Output {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a frame. Returns false once the writer is gone.
    pub fn send(&self, frame: Outbound) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Drain queued frames into `out`, one JSON document per line.
pub async fn write_frames<W>(mut out: W, mut frames: mpsc::UnboundedReceiver<Outbound>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let mut line = serde_json::to_vec(&frame)?;
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;
    }
    Ok(())
}

// --- panel ------------------------------------------------------------------

struct StdioSurface {
    output: Output,
    disposed: Arc<AtomicBool>,
}

impl UiSurface for StdioSurface {
    fn render(&self, page: &PageContent) {
        self.output.send(Outbound::Render(page.clone()));
    }

    fn post_message(&self, message: &OutboundMessage) -> auth_view::Result<()> {
        if self.is_disposed() {
            return Err(ViewError::Surface("panel closed".into()));
        }
        if !self.output.send(Outbound::Webview(message.clone())) {
            return Err(ViewError::Surface("host output closed".into()));
        }
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// The open panel's event sender and its disposal flag.
struct Panel {
    events: mpsc::UnboundedSender<SurfaceEvent>,
    disposed: Arc<AtomicBool>,
}

/// Creates panels on the host and routes their inbound frames.
pub struct StdioSurfaceFactory {
    output: Output,
    current: Mutex<Option<Panel>>,
}

impl StdioSurfaceFactory {
    pub fn new(output: Output) -> Self {
        Self {
            output,
            current: Mutex::new(None),
        }
    }

    /// Forward a panel message. Dropped when no panel is open.
    pub fn deliver(&self, message: Value) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(panel) if panel.events.send(SurfaceEvent::Message(message)).is_ok() => {}
            _ => warn!("panel message received with no open panel, dropping"),
        }
    }

    /// The host closed the panel. The flag flips before `Disposed` is queued so
    /// an `open` racing the view's pump already sees the panel as gone.
    pub fn close(&self) {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(panel) = current {
            panel.disposed.store(true, Ordering::SeqCst);
            let _ = panel.events.send(SurfaceEvent::Disposed);
        }
    }
}

impl SurfaceFactory for StdioSurfaceFactory {
    fn create(&self, view_type: &str, title: &str) -> auth_view::Result<SurfaceHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let disposed = Arc::new(AtomicBool::new(false));
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(Panel {
            events: tx,
            disposed: disposed.clone(),
        });
        debug!(view_type, title, "panel created");
        Ok(SurfaceHandle {
            surface: Arc::new(StdioSurface {
                output: self.output.clone(),
                disposed,
            }),
            events: rx,
        })
    }
}

// --- browser ----------------------------------------------------------------

/// How long to wait for the host to say whether a popup actually opened.
pub const WINDOW_REPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Browser windows live on the host; their messages come back over stdin.
///
/// `open_window` resolves once the host answers the `open-window` frame with
/// `window-opened`. A host that never answers is assumed to have opened the
/// popup.
pub struct StdioBrowser {
    output: Output,
    messages: broadcast::Sender<WindowMessage>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<bool>>>,
}

impl StdioBrowser {
    pub fn new(output: Output) -> Self {
        let (messages, _) = broadcast::channel(64);
        Self {
            output,
            messages,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<Uuid, oneshot::Sender<bool>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn deliver(&self, frame: WindowFrame) {
        let message = WindowMessage {
            source: frame.source.map(WindowId::from),
            origin: frame.origin,
            data: frame.data,
        };
        // No receivers just means no popup flow is waiting
        let _ = self.messages.send(message);
    }

    /// Resolve a pending `open_window` with the host's answer.
    pub fn report_opened(&self, frame: WindowOpenedFrame) {
        let waiter = self.pending().remove(&frame.id);
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(frame.blocked);
            }
            None => debug!(id = %frame.id, "window report for unknown or expired popup"),
        }
    }
}

impl Browser for StdioBrowser {
    fn open_window<'a>(
        &'a self,
        url: &'a str,
        target: &'a str,
        features: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<WindowId>> + Send + 'a>> {
        Box::pin(async move {
            let id = WindowId::new();
            let (tx, rx) = oneshot::channel();
            self.pending().insert(id.as_uuid(), tx);

            let sent = self.output.send(Outbound::OpenWindow {
                id: id.as_uuid(),
                url: url.to_owned(),
                target: target.to_owned(),
                features: features.to_owned(),
            });
            if !sent {
                self.pending().remove(&id.as_uuid());
                return None;
            }

            let blocked = match tokio::time::timeout(WINDOW_REPORT_TIMEOUT, rx).await {
                Ok(Ok(blocked)) => blocked,
                _ => {
                    self.pending().remove(&id.as_uuid());
                    warn!(%id, "host did not report popup state, assuming it opened");
                    false
                }
            };
            (!blocked).then_some(id)
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<WindowMessage> {
        self.messages.subscribe()
    }
}

// --- notifications ------------------------------------------------------------

/// Fire-and-forget notifications. The host has no way to report a choice back,
/// so every call resolves to `None`.
pub struct StdioNotifier {
    output: Output,
}

impl StdioNotifier {
    pub fn new(output: Output) -> Self {
        Self { output }
    }
}

impl Notifier for StdioNotifier {
    fn show<'a>(
        &'a self,
        call: &'a MessageApiCall,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        self.output.send(Outbound::Notify(call.clone()));
        Box::pin(async { None })
    }
}

// --- input loop ---------------------------------------------------------------

/// Routes host frames to the view and its collaborators.
pub struct Bridge {
    view: AuthView,
    surfaces: Arc<StdioSurfaceFactory>,
    browser: Arc<StdioBrowser>,
    output: Output,
}

impl Bridge {
    pub fn new(
        view: AuthView,
        surfaces: Arc<StdioSurfaceFactory>,
        browser: Arc<StdioBrowser>,
        output: Output,
    ) -> Self {
        Self {
            view,
            surfaces,
            browser,
            output,
        }
    }

    /// Show the panel. When waiting, `token-ready` is emitted once the token
    /// arrives or the wait expires.
    pub fn open(&self, notice: String, wait: bool) -> auth_view::Result<()> {
        let pending = self.view.open(notice, wait)?;
        if pending.is_waiting() {
            let output = self.output.clone();
            tokio::spawn(async move {
                let outcome = pending.await;
                let ready = outcome == Some(BarrierOutcome::Opened);
                info!(ready, "token wait finished");
                output.send(Outbound::TokenReady(ready));
            });
        }
        Ok(())
    }

    /// Handle one stdin line. Malformed frames are logged and skipped.
    pub fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let frame = match serde_json::from_str::<Inbound>(line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "ignoring malformed host frame");
                return;
            }
        };

        match frame {
            Inbound::Webview(message) => self.surfaces.deliver(message),
            Inbound::Window(frame) => self.browser.deliver(frame),
            Inbound::WindowOpened(frame) => self.browser.report_opened(frame),
            Inbound::Close => self.surfaces.close(),
            Inbound::Open(OpenFrame { notice, wait }) => {
                if let Err(e) = self.open(notice, wait) {
                    warn!(error = %e, "failed to open authentication panel");
                }
            }
        }
    }

    /// Read frames until EOF.
    pub async fn run<R>(&self, input: R) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            self.handle_line(&line);
        }
        debug!("host input closed");
        Ok(())
    }
}
