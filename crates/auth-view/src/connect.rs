//! Connector seam between the view and the popup flow

use std::future::Future;
use std::pin::Pin;

use github_auth::{ConnectOutcome, OAuthPopupFlow};

/// Runs one interactive authorization and reports how it ended.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Connector>`).
pub trait Connector: Send + Sync {
    fn connect(&self) -> Pin<Box<dyn Future<Output = ConnectOutcome> + Send + '_>>;
}

impl Connector for OAuthPopupFlow {
    fn connect(&self) -> Pin<Box<dyn Future<Output = ConnectOutcome> + Send + '_>> {
        Box::pin(OAuthPopupFlow::connect(self))
    }
}
