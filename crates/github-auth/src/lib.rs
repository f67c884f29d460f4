//! GitHub OAuth token handshake library
//!
//! Provides the pieces a long-lived process needs to obtain a GitHub access
//! token from a human and share it with every caller waiting on it:
//!
//! 1. `barrier::Barrier` lets any number of callers await a token with a deadline
//! 2. `popup::OAuthPopupFlow` opens the authorization popup and accepts exactly
//!    one trusted `authorizing` message from it
//! 3. `token::TokenStore` persists the token and notifies listeners on change
//! 4. `validate::TokenValidator` probes the API and reports rate-limit status
//!
//! Persistence goes through the `storage::KeyValueStore` trait; the browser
//! goes through `popup::Browser`. Neither is tied to a concrete host.

pub mod barrier;
pub mod constants;
pub mod error;
pub mod popup;
pub mod storage;
pub mod token;
pub mod validate;

pub use barrier::{Barrier, BarrierOutcome};
pub use constants::*;
pub use error::{Error, Result};
pub use popup::{
    Browser, ConnectOutcome, OAuthPopupFlow, PopupConfig, WindowId, WindowMessage,
    build_authorization_url,
};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use token::TokenStore;
pub use validate::{TokenStatus, TokenValidator};
