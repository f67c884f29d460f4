//! The authentication view
//!
//! One `AuthView` per process, constructed explicitly and shared by cloning
//! the handle. It owns:
//! - the current UI surface (created lazily, released when the user closes it)
//! - the token barrier shared by every caller waiting for a token
//! - the notice explaining why the surface was opened
//!
//! State lives behind a std Mutex that is never held across an await point.
//! Each surface request is answered in its own task, so a slow popup flow does
//! not hold up `get-token`, and a failing handler only loses its own reply.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use github_auth::{Barrier, BarrierOutcome, ConnectOutcome, TokenStore, TokenValidator};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connect::Connector;
use crate::error::{Error, Result};
use crate::notify::{MessageApiCall, Notifier};
use crate::protocol::{Envelope, OutboundMessage, Request};
use crate::surface::{
    PageContent, SurfaceEvent, SurfaceFactory, UiSurface, VIEW_TITLE, VIEW_TYPE,
};

/// Handle to the authentication view.
#[derive(Clone)]
pub struct AuthView {
    inner: Arc<Inner>,
}

struct Inner {
    tokens: Arc<TokenStore>,
    validator: Arc<TokenValidator>,
    connector: Arc<dyn Connector>,
    notifier: Arc<dyn Notifier>,
    surfaces: Arc<dyn SurfaceFactory>,
    page: PageContent,
    token_wait_timeout: Duration,
    state: Mutex<ViewState>,
}

struct ActiveSurface {
    id: u64,
    surface: Arc<dyn UiSurface>,
}

#[derive(Default)]
struct ViewState {
    surface: Option<ActiveSurface>,
    next_surface_id: u64,
    barrier: Option<Barrier>,
    notice: String,
    listening: bool,
}

impl AuthView {
    pub fn new(
        tokens: Arc<TokenStore>,
        validator: Arc<TokenValidator>,
        connector: Arc<dyn Connector>,
        notifier: Arc<dyn Notifier>,
        surfaces: Arc<dyn SurfaceFactory>,
        token_wait_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                tokens,
                validator,
                connector,
                notifier,
                surfaces,
                page: PageContent::authentication(),
                token_wait_timeout,
                state: Mutex::new(ViewState::default()),
            }),
        }
    }

    /// Show the view, optionally waiting for a token.
    ///
    /// Creates the surface if none is live, records `notice`, arms the shared
    /// token barrier when `wait_for_token` is set and none is pending, and
    /// re-renders. The returned `TokenWait` resolves when the barrier opens or
    /// expires, or immediately when not waiting. Nothing changes when the
    /// surface cannot be created.
    ///
    /// Must be called within a tokio runtime: a new surface gets a message
    /// pump task.
    pub fn open(&self, notice: impl Into<String>, wait_for_token: bool) -> Result<TokenWait> {
        let inner = &self.inner;

        let (surface, barrier, created, register_listener) = {
            let mut state = inner.lock_state();

            // A disposed surface whose pump has not caught up yet counts as gone
            let existing = state
                .surface
                .as_ref()
                .filter(|active| !active.surface.is_disposed())
                .map(|active| active.surface.clone());
            let (surface, created) = match existing {
                Some(surface) => (surface, None),
                None => {
                    let handle = inner.surfaces.create(VIEW_TYPE, VIEW_TITLE)?;
                    let id = state.next_surface_id;
                    state.next_surface_id += 1;
                    state.surface = Some(ActiveSurface {
                        id,
                        surface: handle.surface.clone(),
                    });
                    info!(surface_id = id, "authentication surface created");
                    (handle.surface, Some((id, handle.events)))
                }
            };

            state.notice = notice.into();

            // A settled barrier is spent; the next waiter gets a fresh one
            if wait_for_token && state.barrier.as_ref().is_none_or(|b| b.outcome().is_some()) {
                debug!(
                    timeout_secs = inner.token_wait_timeout.as_secs(),
                    "arming token barrier"
                );
                state.barrier = Some(Barrier::new(inner.token_wait_timeout));
            }
            let barrier = if wait_for_token {
                state.barrier.clone()
            } else {
                None
            };

            let register_listener = created.is_some() && !state.listening;
            state.listening |= register_listener;

            (surface, barrier, created, register_listener)
        };

        if register_listener {
            listen_for_token_changes(inner);
        }
        if let Some((id, events)) = created {
            tokio::spawn(pump(Arc::clone(inner), id, surface.clone(), events));
        }

        surface.render(&inner.page);
        Ok(TokenWait { barrier })
    }

    /// Whether a live surface is currently open.
    pub fn has_surface(&self) -> bool {
        self.inner
            .lock_state()
            .surface
            .as_ref()
            .is_some_and(|active| !active.surface.is_disposed())
    }

    /// Current notice text.
    pub fn notice(&self) -> String {
        self.inner.lock_state().notice.clone()
    }
}

/// Pending result of `AuthView::open`.
///
/// Await it to wait for the token barrier. Resolves to `None` when the view
/// was opened without waiting.
#[derive(Debug)]
pub struct TokenWait {
    barrier: Option<Barrier>,
}

impl TokenWait {
    pub fn is_waiting(&self) -> bool {
        self.barrier.is_some()
    }
}

impl IntoFuture for TokenWait {
    type Output = Option<BarrierOutcome>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            match self.barrier {
                Some(barrier) => Some(barrier.wait().await),
                None => None,
            }
        })
    }
}

/// Register the token change listener. Holds the view weakly so the token
/// store does not keep a dropped view alive.
fn listen_for_token_changes(inner: &Arc<Inner>) {
    let view = Arc::downgrade(inner);
    inner.tokens.on_did_change_token(move |token| {
        if let Some(inner) = view.upgrade() {
            inner.on_token_changed(token);
        }
    });
}

/// Route one surface's events until it is disposed.
async fn pump(
    inner: Arc<Inner>,
    surface_id: u64,
    surface: Arc<dyn UiSurface>,
    mut events: mpsc::UnboundedReceiver<SurfaceEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SurfaceEvent::Message(raw) => {
                let inner = Arc::clone(&inner);
                let surface = Arc::clone(&surface);
                tokio::spawn(async move {
                    if let Some(reply) = inner.handle_message(raw).await {
                        if let Err(e) = surface.post_message(&reply) {
                            debug!(error = %e, "surface gone before reply");
                        }
                    }
                });
            }
            SurfaceEvent::Disposed => break,
        }
    }
    inner.release_surface(surface_id);
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release_surface(&self, surface_id: u64) {
        let mut state = self.lock_state();
        if state.surface.as_ref().is_some_and(|active| active.id == surface_id) {
            state.surface = None;
            info!(surface_id, "authentication surface closed");
        }
    }

    fn on_token_changed(&self, token: &str) {
        let (barrier, surface) = {
            let mut state = self.lock_state();
            (
                state.barrier.take(),
                state.surface.as_ref().map(|active| active.surface.clone()),
            )
        };

        if let Some(barrier) = barrier {
            barrier.open();
        }
        if let Some(surface) = surface {
            if let Err(e) = surface.post_message(&OutboundMessage::token_changed(token)) {
                debug!(error = %e, "could not push token change to surface");
            }
        }
    }

    /// Answer one raw surface message. `None` means no reply is sent.
    async fn handle_message(&self, raw: Value) -> Option<OutboundMessage> {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "rejecting surface message");
                return None;
            }
        };

        let kind = envelope.request.kind();
        match self.dispatch(envelope.request).await {
            Ok(data) => Some(OutboundMessage::reply(envelope.id, kind, data)),
            Err(e) => {
                warn!(kind, error = %e, "surface request failed");
                None
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Option<Value>> {
        match request {
            Request::GetNotice => {
                let notice = self.lock_state().notice.clone();
                Ok(Some(Value::String(notice)))
            }
            Request::GetToken => Ok(Some(Value::String(self.tokens.get_token()))),
            Request::SetToken(token) => {
                if !token.is_empty() {
                    self.lock_state().notice.clear();
                }
                self.tokens.set_token(&token).await?;
                Ok(None)
            }
            Request::ValidateToken(token) => {
                let status = self.validator.validate_token(token.as_deref()).await;
                let data = serde_json::to_value(status)
                    .map_err(|e| Error::Protocol(format!("encoding token status: {e}")))?;
                Ok(Some(data))
            }
            Request::ConnectToGithub => {
                self.connect_to_github().await?;
                Ok(None)
            }
            Request::CallMessageApi(call) => {
                let picked = self.notifier.show(&call).await;
                Ok(Some(picked.map(Value::String).unwrap_or(Value::Null)))
            }
        }
    }

    async fn connect_to_github(&self) -> Result<()> {
        match self.connector.connect().await {
            ConnectOutcome::Token(token) => {
                self.tokens.set_token(token.expose()).await?;
                info!("access token received from authorization popup");
            }
            ConnectOutcome::Failed {
                error,
                error_description,
            } => {
                warn!(%error, %error_description, "authorization failed");
                // Not awaited: the notification resolves only when dismissed
                let notifier = Arc::clone(&self.notifier);
                tokio::spawn(async move {
                    let call = MessageApiCall::error(error_description);
                    notifier.show(&call).await;
                });
            }
            ConnectOutcome::Empty => debug!("authorization finished without a token"),
        }
        Ok(())
    }
}
