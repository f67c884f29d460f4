//! Browser popup OAuth flow
//!
//! Opens the GitHub authorization page in a popup and waits for the auth page
//! to post back a `{ type: "authorizing", payload }` message. The payload is
//! trusted only when:
//!
//! - the message came from the popup we opened, or the popup handle is
//!   unavailable because the browser blocked it (the user may still open it
//!   from the blocked-popup notice, so the message is still valid)
//! - the message origin equals the configured auth page origin exactly
//! - the message data has `type == "authorizing"`
//!
//! Anything else is ignored. The flow resolves exactly once: with the first
//! trusted payload, or with an `authorizing_timeout` error after the timeout.
//! Either way the message subscription is dropped on resolution.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::{
    AUTHORIZE_PATH, AUTHORIZE_TIMEOUT, AUTHORIZING_MESSAGE_TYPE, POPUP_FEATURES, POPUP_TARGET,
    SCOPES,
};

/// Opaque handle to a browser window opened by `Browser::open_window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(Uuid);

impl WindowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for WindowId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A cross-window message as delivered by the browser.
#[derive(Debug, Clone)]
pub struct WindowMessage {
    /// Window that posted the message, when the browser can tell
    pub source: Option<WindowId>,
    pub origin: String,
    pub data: serde_json::Value,
}

/// Browser window and messaging collaborator.
pub trait Browser: Send + Sync {
    /// Open `url` in a new window. Resolves to `None` when the browser blocked
    /// the popup.
    fn open_window<'a>(
        &'a self,
        url: &'a str,
        target: &'a str,
        features: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<WindowId>> + Send + 'a>>;

    /// Subscribe to the global cross-window message channel. Dropping the
    /// receiver deregisters the listener.
    fn subscribe(&self) -> broadcast::Receiver<WindowMessage>;
}

/// Popup flow settings.
#[derive(Debug, Clone)]
pub struct PopupConfig {
    pub base_url: String,
    pub client_id: String,
    /// Only messages from exactly this origin are trusted
    pub trusted_origin: String,
    pub timeout: Duration,
}

impl PopupConfig {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        trusted_origin: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            client_id: client_id.into(),
            trusted_origin: trusted_origin.into(),
            timeout: AUTHORIZE_TIMEOUT,
        }
    }
}

/// Result of one popup flow.
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    /// The auth page returned an access token
    Token(Secret<String>),
    /// The identity provider or the flow itself reported an error
    Failed {
        error: String,
        error_description: String,
    },
    /// A trusted message arrived without a token or an error
    Empty,
}

impl ConnectOutcome {
    pub fn timeout() -> Self {
        ConnectOutcome::Failed {
            error: "authorizing_timeout".into(),
            error_description: "Authorizing timeout".into(),
        }
    }

    /// Interpret the `payload` of an accepted `authorizing` message.
    ///
    /// An `error_description` wins over an `access_token`; a payload that is
    /// not an object (or is missing) is `Empty`.
    pub fn from_payload(payload: serde_json::Value) -> Self {
        #[derive(Deserialize)]
        struct Payload {
            access_token: Option<String>,
            error: Option<String>,
            error_description: Option<String>,
        }

        let Ok(payload) = serde_json::from_value::<Payload>(payload) else {
            return ConnectOutcome::Empty;
        };

        match (payload.error_description, payload.access_token) {
            (Some(error_description), _) if !error_description.is_empty() => {
                ConnectOutcome::Failed {
                    error: payload.error.unwrap_or_default(),
                    error_description,
                }
            }
            (_, Some(token)) if !token.is_empty() => ConnectOutcome::Token(Secret::new(token)),
            _ => ConnectOutcome::Empty,
        }
    }
}

/// Build the GitHub authorization URL for `client_id` on `base_url`.
pub fn build_authorization_url(base_url: &str, client_id: &str) -> String {
    format!(
        "{}{AUTHORIZE_PATH}?scope={SCOPES}&client_id={client_id}",
        base_url.trim_end_matches('/'),
    )
}

pub struct OAuthPopupFlow {
    browser: Arc<dyn Browser>,
    config: PopupConfig,
}

impl OAuthPopupFlow {
    pub fn new(browser: Arc<dyn Browser>, config: PopupConfig) -> Self {
        Self { browser, config }
    }

    pub fn authorization_url(&self) -> String {
        build_authorization_url(&self.config.base_url, &self.config.client_id)
    }

    /// Run the popup flow once.
    pub async fn connect(&self) -> ConnectOutcome {
        // Subscribe before opening so a fast reply cannot slip past us
        let mut messages = self.browser.subscribe();

        let url = self.authorization_url();
        let opener = self
            .browser
            .open_window(&url, POPUP_TARGET, POPUP_FEATURES)
            .await;
        match opener {
            Some(window) => info!(%window, "authorization popup opened"),
            None => warn!("authorization popup blocked, trusting origin and message shape only"),
        }

        let accepted = tokio::time::timeout(self.config.timeout, async {
            loop {
                match messages.recv().await {
                    Ok(message) => {
                        if self.is_trusted(&message, opener) {
                            return message.data;
                        }
                        debug!(origin = %message.origin, "ignoring untrusted window message");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "window message listener lagged");
                    }
                    // Nothing can arrive any more; only the timeout can settle us
                    Err(RecvError::Closed) => std::future::pending::<()>().await,
                }
            }
        })
        .await;
        drop(messages);

        match accepted {
            Ok(mut data) => {
                let payload = data
                    .get_mut("payload")
                    .map(serde_json::Value::take)
                    .unwrap_or_default();
                let outcome = ConnectOutcome::from_payload(payload);
                info!(?outcome, "authorization message accepted");
                outcome
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.timeout.as_secs(),
                    "no authorization message before timeout"
                );
                ConnectOutcome::timeout()
            }
        }
    }

    fn is_trusted(&self, message: &WindowMessage, opener: Option<WindowId>) -> bool {
        let valid_source = match opener {
            Some(window) => message.source == Some(window),
            None => true,
        };
        let valid_origin = message.origin == self.config.trusted_origin;
        let valid_shape = message.data.get("type").and_then(serde_json::Value::as_str)
            == Some(AUTHORIZING_MESSAGE_TYPE);
        valid_source && valid_origin && valid_shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::Notify;
    use tokio::time::Instant;

    const ORIGIN: &str = "https://auth.example.dev";

    struct FakeBrowser {
        tx: broadcast::Sender<WindowMessage>,
        blocked: bool,
        opened: Mutex<Vec<(String, String, String, Option<WindowId>)>>,
        opened_signal: Notify,
    }

    impl FakeBrowser {
        fn new(blocked: bool) -> Arc<Self> {
            let (tx, _) = broadcast::channel(16);
            Arc::new(Self {
                tx,
                blocked,
                opened: Mutex::new(Vec::new()),
                opened_signal: Notify::new(),
            })
        }

        /// Wait for the flow to open its popup, returning the handle it got.
        async fn popup(&self) -> Option<WindowId> {
            self.opened_signal.notified().await;
            self.opened.lock().unwrap().last().and_then(|o| o.3)
        }

        fn post(&self, source: Option<WindowId>, origin: &str, data: serde_json::Value) {
            let _ = self.tx.send(WindowMessage {
                source,
                origin: origin.into(),
                data,
            });
        }
    }

    impl Browser for FakeBrowser {
        fn open_window<'a>(
            &'a self,
            url: &'a str,
            target: &'a str,
            features: &'a str,
        ) -> Pin<Box<dyn Future<Output = Option<WindowId>> + Send + 'a>> {
            let window = (!self.blocked).then(WindowId::new);
            self.opened
                .lock()
                .unwrap()
                .push((url.into(), target.into(), features.into(), window));
            self.opened_signal.notify_one();
            Box::pin(async move { window })
        }

        fn subscribe(&self) -> broadcast::Receiver<WindowMessage> {
            self.tx.subscribe()
        }
    }

    fn flow(browser: Arc<FakeBrowser>) -> OAuthPopupFlow {
        OAuthPopupFlow::new(browser, PopupConfig::new("https://github.com", "Iv1.abc", ORIGIN))
    }

    fn authorizing(payload: serde_json::Value) -> serde_json::Value {
        json!({ "type": "authorizing", "payload": payload })
    }

    fn token_of(outcome: ConnectOutcome) -> String {
        match outcome {
            ConnectOutcome::Token(token) => token.expose().clone(),
            other => panic!("expected token, got {other:?}"),
        }
    }

    #[test]
    fn authorization_url_has_scope_and_client_id() {
        assert_eq!(
            build_authorization_url("https://github.com", "Iv1.abc"),
            "https://github.com/login/oauth/authorize?scope=repo,user:email&client_id=Iv1.abc"
        );
        assert_eq!(
            build_authorization_url("https://ghe.corp.example/", "x"),
            "https://ghe.corp.example/login/oauth/authorize?scope=repo,user:email&client_id=x"
        );
    }

    #[tokio::test]
    async fn opens_popup_with_fixed_layout() {
        let browser = FakeBrowser::new(false);
        let flow = flow(browser.clone());
        let task = tokio::spawn(async move { flow.connect().await });

        let window = browser.popup().await;
        browser.post(window, ORIGIN, authorizing(json!({ "access_token": "abc" })));
        task.await.unwrap();

        let opened = browser.opened.lock().unwrap();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].0.ends_with("client_id=Iv1.abc"));
        assert_eq!(opened[0].1, "_blank");
        assert!(opened[0].2.contains("width=800,height=520"));
    }

    #[tokio::test]
    async fn accepts_trusted_message_from_popup() {
        let browser = FakeBrowser::new(false);
        let flow = flow(browser.clone());
        let task = tokio::spawn(async move { flow.connect().await });

        let window = browser.popup().await;
        assert!(window.is_some());
        browser.post(window, ORIGIN, authorizing(json!({ "access_token": "abc" })));

        assert_eq!(token_of(task.await.unwrap()), "abc");
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_origin_is_ignored_until_timeout() {
        let browser = FakeBrowser::new(false);
        let flow = flow(browser.clone());
        let start = Instant::now();
        let task = tokio::spawn(async move { flow.connect().await });

        let window = browser.popup().await;
        browser.post(
            window,
            "https://evil.example",
            authorizing(json!({ "access_token": "stolen" })),
        );

        match task.await.unwrap() {
            ConnectOutcome::Failed {
                error,
                error_description,
            } => {
                assert_eq!(error, "authorizing_timeout");
                assert_eq!(error_description, "Authorizing timeout");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(start.elapsed() >= AUTHORIZE_TIMEOUT);
    }

    #[tokio::test]
    async fn blocked_popup_accepts_by_origin_and_shape() {
        let browser = FakeBrowser::new(true);
        let flow = flow(browser.clone());
        let task = tokio::spawn(async move { flow.connect().await });

        assert_eq!(browser.popup().await, None);
        browser.post(None, ORIGIN, authorizing(json!({ "access_token": "abc" })));

        assert_eq!(token_of(task.await.unwrap()), "abc");
    }

    #[tokio::test]
    async fn message_from_another_window_is_ignored() {
        let browser = FakeBrowser::new(false);
        let flow = flow(browser.clone());
        let task = tokio::spawn(async move { flow.connect().await });

        let window = browser.popup().await;
        browser.post(
            Some(WindowId::new()),
            ORIGIN,
            authorizing(json!({ "access_token": "other" })),
        );
        browser.post(None, ORIGIN, authorizing(json!({ "access_token": "sourceless" })));
        browser.post(window, ORIGIN, authorizing(json!({ "access_token": "mine" })));

        assert_eq!(token_of(task.await.unwrap()), "mine");
    }

    #[tokio::test]
    async fn wrong_message_type_is_ignored() {
        let browser = FakeBrowser::new(false);
        let flow = flow(browser.clone());
        let task = tokio::spawn(async move { flow.connect().await });

        let window = browser.popup().await;
        browser.post(window, ORIGIN, json!({ "type": "ready", "payload": { "access_token": "x" } }));
        browser.post(window, ORIGIN, json!("authorizing"));
        browser.post(window, ORIGIN, authorizing(json!({ "access_token": "real" })));

        assert_eq!(token_of(task.await.unwrap()), "real");
    }

    #[tokio::test]
    async fn provider_error_is_reported() {
        let browser = FakeBrowser::new(false);
        let flow = flow(browser.clone());
        let task = tokio::spawn(async move { flow.connect().await });

        let window = browser.popup().await;
        browser.post(
            window,
            ORIGIN,
            authorizing(json!({
                "error": "access_denied",
                "error_description": "The user has denied your application access."
            })),
        );

        match task.await.unwrap() {
            ConnectOutcome::Failed {
                error,
                error_description,
            } => {
                assert_eq!(error, "access_denied");
                assert_eq!(error_description, "The user has denied your application access.");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn listener_is_dropped_after_acceptance() {
        let browser = FakeBrowser::new(false);
        let flow = flow(browser.clone());
        let task = tokio::spawn(async move { flow.connect().await });

        let window = browser.popup().await;
        assert_eq!(browser.tx.receiver_count(), 1);
        browser.post(window, ORIGIN, authorizing(json!({ "access_token": "abc" })));
        task.await.unwrap();

        assert_eq!(browser.tx.receiver_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn listener_is_dropped_after_timeout() {
        let browser = FakeBrowser::new(false);
        let flow = flow(browser.clone());

        let outcome = flow.connect().await;

        assert!(matches!(outcome, ConnectOutcome::Failed { .. }));
        assert_eq!(browser.tx.receiver_count(), 0);
    }

    #[test]
    fn payload_interpretation() {
        assert_eq!(token_of(ConnectOutcome::from_payload(json!({ "access_token": "t" }))), "t");
        assert!(matches!(
            ConnectOutcome::from_payload(json!({ "access_token": "" })),
            ConnectOutcome::Empty
        ));
        assert!(matches!(
            ConnectOutcome::from_payload(serde_json::Value::Null),
            ConnectOutcome::Empty
        ));
        assert!(matches!(
            ConnectOutcome::from_payload(json!({ "error_description": "nope", "access_token": "t" })),
            ConnectOutcome::Failed { .. }
        ));
    }

    #[test]
    fn outcome_debug_redacts_token() {
        let outcome = ConnectOutcome::from_payload(json!({ "access_token": "gho_secret" }));
        let debug = format!("{outcome:?}");
        assert!(!debug.contains("gho_secret"), "token leaked: {debug}");
    }
}
