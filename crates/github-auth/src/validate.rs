//! Token probe against the GitHub REST API
//!
//! Validation issues one GET to the API root and reads the rate-limit headers.
//! A 401 means the token was rejected; any transport failure is collapsed into
//! the same `None`. Callers cannot tell the two apart at this layer.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::AUTHORIZATION_SCHEME;
use crate::token::TokenStore;

const RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
const RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATELIMIT_RESET: &str = "x-ratelimit-reset";
const RATELIMIT_RESOURCE: &str = "ratelimit-resource";
const RATELIMIT_USED: &str = "x-ratelimit-used";

/// Rate-limit snapshot returned by a successful probe.
///
/// Every field is 0 when its header is missing or not a non-negative integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    pub ratelimit_limit: u64,
    pub ratelimit_remaining: u64,
    pub ratelimit_reset: u64,
    pub ratelimit_resource: u64,
    pub ratelimit_used: u64,
}

impl TokenStatus {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ratelimit_limit: header_u64(headers, RATELIMIT_LIMIT),
            ratelimit_remaining: header_u64(headers, RATELIMIT_REMAINING),
            ratelimit_reset: header_u64(headers, RATELIMIT_RESET),
            ratelimit_resource: header_u64(headers, RATELIMIT_RESOURCE),
            ratelimit_used: header_u64(headers, RATELIMIT_USED),
        }
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> u64 {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

pub struct TokenValidator {
    client: reqwest::Client,
    api_url: String,
    tokens: Arc<TokenStore>,
}

impl TokenValidator {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>, tokens: Arc<TokenStore>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            tokens,
        }
    }

    /// Probe the API with a token.
    ///
    /// - `None` probes with the persisted token
    /// - `Some("")` probes anonymously (no `Authorization` header)
    /// - `Some(token)` probes with `token`
    ///
    /// Returns `None` on 401 or on any transport failure. Never errors.
    pub async fn validate_token(&self, token: Option<&str>) -> Option<TokenStatus> {
        let stored;
        let access_token = match token {
            Some(token) => token,
            None => {
                stored = self.tokens.get_token();
                stored.as_str()
            }
        };

        let mut request = self.client.get(&self.api_url);
        if !access_token.is_empty() {
            request = request.header(
                AUTHORIZATION,
                format!("{AUTHORIZATION_SCHEME} {access_token}"),
            );
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(api_url = %self.api_url, error = %e, "token probe failed");
                return None;
            }
        };

        if response.status() == StatusCode::UNAUTHORIZED {
            info!(api_url = %self.api_url, "token rejected by API");
            return None;
        }

        let status = TokenStatus::from_headers(response.headers());
        debug!(
            http_status = response.status().as_u16(),
            limit = status.ratelimit_limit,
            remaining = status.ratelimit_remaining,
            anonymous = access_token.is_empty(),
            "token probe succeeded"
        );
        Some(status)
    }
}
