//! Long-running mode: webhook server plus one sync worker per installation.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use thingsync_core::webhook::router;
use thingsync_core::{LifecycleNotice, SyncWorker, WebhookRegistry};

use crate::cli::{GlobalOpts, ServeArgs};
use crate::config;
use crate::error::CliError;

use super::util;

pub async fn handle(args: ServeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::resolve_path(global);
    let cfg = config::load(global)?;
    let endpoint = cfg.endpoint_config()?;

    let manager = util::attached_manager(&cfg, &endpoint)?;
    let registry = WebhookRegistry::new();
    registry.register(endpoint.webhook_id.clone(), Arc::clone(&manager));

    let cancel = CancellationToken::new();
    let bind = args.bind.unwrap_or_else(|| cfg.webhook.bind.clone());
    let server =
        util::spawn_webhook_server(&bind, router(Arc::new(registry)), cancel.clone()).await?;

    let settings = cfg.sync_settings();
    let mut workers = JoinSet::new();
    for (entry_id, entry) in &cfg.installations {
        let client = config::installation_client(&cfg, entry)?;
        let worker = SyncWorker::new(client, entry.context(entry_id), &settings);
        workers.spawn(worker.run(manager.subscribe(), cancel.child_token()));
    }
    if workers.is_empty() {
        warn!("no installations recorded; run `thingsync setup` to install the SmartApp");
    }
    info!(
        webhook = %endpoint.webhook_url()?,
        installations = workers.len(),
        "serving"
    );

    let mut notices = manager.subscribe();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for ctrl-c");
                }
                info!("shutting down");
                break;
            }
            notice = notices.recv() => match notice {
                Ok(LifecycleNotice::Uninstalled { installed_app_id, .. }) => {
                    forget_installation(&path, &installed_app_id);
                }
                Ok(LifecycleNotice::Installed { installed_app_id, location_id, .. }) => {
                    info!(
                        %installed_app_id,
                        %location_id,
                        "installed outside of setup; run `thingsync setup` to record it"
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "lifecycle notices lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    cancel.cancel();
    while workers.join_next().await.is_some() {}
    match server.await {
        Ok(result) => result?,
        Err(e) => error!(error = %e, "webhook server task failed"),
    }
    Ok(())
}

/// Drop the record of an uninstalled app; failures are logged only.
fn forget_installation(path: &Path, installed_app_id: &str) {
    match config::remove_installation(path, installed_app_id) {
        Ok(Some(entry_id)) => info!(%entry_id, installed_app_id, "removed uninstalled installation"),
        Ok(None) => {}
        Err(e) => error!(installed_app_id, error = %e, "failed to remove installation record"),
    }
}
