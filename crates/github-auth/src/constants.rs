//! GitHub OAuth constants
//!
//! Client ids, hosts and the trusted auth page origin come from configuration.
//! These are the fixed parts of the handshake.

use std::time::Duration;

/// Key under which the access token is persisted
pub const TOKEN_KEY: &str = "github-oauth-token";

/// Public github.com host (override for GitHub Enterprise)
pub const DEFAULT_BASE_URL: &str = "https://github.com";

/// REST API root used for the token probe
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Authorization endpoint path, relative to the base URL
pub const AUTHORIZE_PATH: &str = "/login/oauth/authorize";

/// Scopes requested from the identity provider, sent unencoded
pub const SCOPES: &str = "repo,user:email";

/// Scheme used in the `Authorization` header of the probe request
pub const AUTHORIZATION_SCHEME: &str = "token";

/// Window target for the authorization popup
pub const POPUP_TARGET: &str = "_blank";

/// Fixed small-window layout for the authorization popup
pub const POPUP_FEATURES: &str = "directories=no,titlebar=no,toolbar=no,location=no,status=no,menubar=no,scrollbars=no,resizable=no,width=800,height=520,top=150,left=150";

/// `type` field the auth page puts on its cross-window message
pub const AUTHORIZING_MESSAGE_TYPE: &str = "authorizing";

/// How long the popup flow waits for a trusted message
pub const AUTHORIZE_TIMEOUT: Duration = Duration::from_secs(300);

/// How long callers of `open(.., wait_for_token = true)` wait for a token
pub const TOKEN_WAIT_TIMEOUT: Duration = Duration::from_secs(600);
