//! GitHub Auth Bridge
//!
//! Single-binary host for the GitHub authentication view:
//! 1. Loads the persisted token and checks it against the API
//! 2. Opens the authentication panel when the token is missing or rejected
//! 3. Relays panel, browser, and notification traffic over stdin/stdout
//!
//! Logs go to stderr as JSON; stdout carries protocol frames only.

mod config;
mod stdio;

use std::sync::Arc;

use anyhow::{Context, Result};
use auth_view::AuthView;
use github_auth::{JsonFileStore, OAuthPopupFlow, PopupConfig, TokenStore, TokenValidator};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::stdio::{Bridge, Output, StdioBrowser, StdioNotifier, StdioSurfaceFactory};

const STARTUP_NOTICE: &str =
    "The stored GitHub token is missing or no longer valid. Connect to GitHub to continue.";

const USER_AGENT: &str = concat!("github-auth-bridge/", env!("CARGO_PKG_VERSION"));

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    info!("starting github-auth-bridge");

    let args: Vec<String> = std::env::args().collect();
    let config_path = Config::resolve_path(config_arg(&args));
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.github.base_url,
        api_url = %config.github.api_url,
        auth_page_origin = %config.github.auth_page_origin,
        token_file = %config.storage.token_file.display(),
        "configuration loaded"
    );

    let store = JsonFileStore::load(config.storage.token_file.clone())
        .await
        .with_context(|| {
            format!(
                "failed to load token file {}",
                config.storage.token_file.display()
            )
        })?;
    let tokens = Arc::new(TokenStore::new(Arc::new(store)));

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.timeouts.request())
        .build()
        .context("failed to build HTTP client")?;
    let validator = Arc::new(TokenValidator::new(
        client,
        &config.github.api_url,
        tokens.clone(),
    ));

    let (output, frames) = Output::channel();
    let mut writer = tokio::spawn(stdio::write_frames(tokio::io::stdout(), frames));

    let surfaces = Arc::new(StdioSurfaceFactory::new(output.clone()));
    let browser = Arc::new(StdioBrowser::new(output.clone()));

    let mut popup = PopupConfig::new(
        &config.github.base_url,
        &config.github.client_id,
        &config.github.auth_page_origin,
    );
    popup.timeout = config.timeouts.authorize();
    let flow = OAuthPopupFlow::new(browser.clone(), popup);

    let view = AuthView::new(
        tokens.clone(),
        validator.clone(),
        Arc::new(flow),
        Arc::new(StdioNotifier::new(output.clone())),
        surfaces.clone(),
        config.timeouts.token_wait(),
    );
    let bridge = Bridge::new(view, surfaces, browser, output);

    if needs_token(&tokens, &validator).await {
        bridge
            .open(STARTUP_NOTICE.into(), true)
            .context("failed to open authentication panel")?;
    }

    let input = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = bridge.run(input) => {
            result.context("failed to read host input")?;
            info!("host input closed, shutting down");
        }
        joined = &mut writer => match joined {
            Ok(Ok(())) => info!("host output closed, shutting down"),
            Ok(Err(e)) => warn!(error = %e, "writing to host failed, shutting down"),
            Err(e) => warn!(error = %e, "output writer task failed, shutting down"),
        },
        _ = shutdown_signal() => {}
    }

    info!("shutdown complete");
    Ok(())
}

/// Value of `--config <path>`, if given.
fn config_arg(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Whether the persisted token is unusable and the panel should be shown.
async fn needs_token(tokens: &TokenStore, validator: &TokenValidator) -> bool {
    if tokens.get_token().is_empty() {
        info!("no stored token");
        return true;
    }
    match validator.validate_token(None).await {
        Some(status) => {
            info!(
                limit = status.ratelimit_limit,
                remaining = status.ratelimit_remaining,
                "stored token is valid"
            );
            false
        }
        None => {
            warn!("stored token failed validation");
            true
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
