//! Authentication view: relays between a UI surface and the token handshake
//!
//! `AuthView` owns at most one UI surface at a time and answers the surface's
//! protocol messages using the `github-auth` building blocks. Callers that
//! need a token call `AuthView::open(notice, true)` and await the returned
//! `TokenWait`; every concurrent waiter shares one barrier that opens when the
//! token store reports a change.
//!
//! Message flow:
//! 1. Caller opens the view (surface created lazily, barrier armed on demand)
//! 2. Surface sends `{id, type, data?}` requests through `SurfaceEvent::Message`
//! 3. The view answers each request in its own task with `{id, type, data?}`
//! 4. Token changes are pushed to the surface as `token-changed`
//! 5. Closing the surface (`SurfaceEvent::Disposed`) releases it; the next
//!    `open()` creates a new one

pub mod connect;
pub mod error;
pub mod notify;
pub mod protocol;
pub mod surface;
pub mod view;

pub use connect::Connector;
pub use error::{Error, Result};
pub use notify::{MessageApiCall, MessageLevel, Notifier};
pub use protocol::{Envelope, OutboundMessage, Request};
pub use surface::{PageContent, SurfaceEvent, SurfaceFactory, SurfaceHandle, UiSurface};
pub use view::{AuthView, TokenWait};
