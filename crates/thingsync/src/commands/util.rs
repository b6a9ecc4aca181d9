//! Shared helpers for command handlers.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use thingsync_core::{AcceptUnsigned, EndpointConfig, SmartApp, SmartAppManager};

use crate::config::Config;
use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(prompt_err)
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Lifecycle manager for `endpoint`, with every recorded installation
/// registered and attached.
pub fn attached_manager(
    cfg: &Config,
    endpoint: &EndpointConfig,
) -> Result<Arc<SmartAppManager>, CliError> {
    let target_url = endpoint.webhook_url()?;
    let http = reqwest::Client::builder()
        .timeout(cfg.api_settings().transport.timeout)
        .build()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    let manager = SmartAppManager::new(target_url.as_str(), http, Arc::new(AcceptUnsigned));

    let profile = cfg.app_profile();
    for (entry_id, entry) in &cfg.installations {
        if !manager.is_registered(&entry.app_id) {
            manager.register_app(SmartApp::new(
                entry.app_id.clone(),
                profile.display_name.clone(),
                profile.description.clone(),
            ));
        }
        manager.attach_installation(entry.context(entry_id));
    }

    Ok(Arc::new(manager))
}

/// Bind `addr` and serve `router` until `cancel` fires.
pub async fn spawn_webhook_server(
    addr: &str,
    router: axum::Router,
    cancel: CancellationToken,
) -> Result<JoinHandle<std::io::Result<()>>, CliError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| CliError::Bind {
            addr: addr.into(),
            source,
        })?;
    info!(addr = %listener.local_addr()?, "webhook server listening");

    Ok(tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
    }))
}
