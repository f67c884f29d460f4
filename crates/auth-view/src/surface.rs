//! UI surface collaborator
//!
//! The view never renders anything itself. A `SurfaceFactory` creates the
//! interactive panel and hands back an event stream carrying the panel's
//! messages and its disposal.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::OutboundMessage;

/// Identifies the authentication panel to the host.
pub const VIEW_TYPE: &str = "auth-bridge.views.github-authentication";

/// Panel title shown by the host.
pub const VIEW_TITLE: &str = "Authenticating to GitHub";

/// What the surface should display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageContent {
    pub title: String,
    pub styles: Vec<String>,
    pub scripts: Vec<String>,
}

impl PageContent {
    pub fn authentication() -> Self {
        Self {
            title: "Authenticating To GitHub".into(),
            styles: vec![
                "assets/pages/components.css".into(),
                "assets/pages/github-authentication.css".into(),
            ],
            scripts: vec!["assets/pages/github-authentication.js".into()],
        }
    }
}

/// Events flowing from the surface to the view.
#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    /// Raw protocol message; parsed by the view
    Message(serde_json::Value),
    /// The user closed the surface
    Disposed,
}

pub trait UiSurface: Send + Sync {
    /// Replace the surface content.
    fn render(&self, page: &PageContent);

    /// Deliver a message to the surface. Fails once the surface is gone.
    fn post_message(&self, message: &OutboundMessage) -> Result<()>;

    /// True once the user has closed the surface. Must flip before the
    /// matching `SurfaceEvent::Disposed` is sent.
    fn is_disposed(&self) -> bool;
}

/// A freshly created surface and its event stream.
///
/// Dropping every sender of `events` is treated like `Disposed`.
pub struct SurfaceHandle {
    pub surface: Arc<dyn UiSurface>,
    pub events: mpsc::UnboundedReceiver<SurfaceEvent>,
}

pub trait SurfaceFactory: Send + Sync {
    fn create(&self, view_type: &str, title: &str) -> Result<SurfaceHandle>;
}
