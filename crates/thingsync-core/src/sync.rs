// ── Background subscription sync ──
//
// One worker per installed app. A pass runs immediately, then on every
// interval tick and whenever the lifecycle manager reports a change to
// the installation.

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use thingsync_api::SmartThingsClient;

use crate::config::SyncSettings;
use crate::error::CoreError;
use crate::model::Device;
use crate::reconcile::{FailureStreaks, ReconcileReport, Reconciler};
use crate::smartapp::{InstalledAppContext, LifecycleNotice};

pub struct SyncWorker {
    client: SmartThingsClient,
    reconciler: Reconciler,
    context: InstalledAppContext,
    interval: Duration,
    streaks: FailureStreaks,
}

impl SyncWorker {
    /// `client` must be authenticated for `context`'s installed app.
    pub fn new(client: SmartThingsClient, context: InstalledAppContext, settings: &SyncSettings) -> Self {
        Self {
            client,
            reconciler: Reconciler::from_settings(settings),
            context,
            interval: settings.interval,
            streaks: FailureStreaks::new(settings.escalate_after),
        }
    }

    pub fn context(&self) -> &InstalledAppContext {
        &self.context
    }

    /// Fetch the location's devices and reconcile once.
    pub async fn sync_once(&mut self) -> Result<ReconcileReport, CoreError> {
        let installed_app_id = self.context.installed_app_id.as_str();
        let devices: Vec<Device> = self
            .client
            .list_devices(&self.context.location_id)
            .await?
            .into_iter()
            .map(Device::from)
            .collect();
        debug!(installed_app_id, devices = devices.len(), "loaded devices");

        let report = self
            .reconciler
            .reconcile(
                &self.client,
                installed_app_id,
                &self.context.location_id,
                &devices,
            )
            .await?;

        for (capability, passes) in self.streaks.record(&report) {
            error!(
                %capability,
                installed_app_id,
                passes,
                "subscription has failed to converge on consecutive passes"
            );
        }

        Ok(report)
    }

    fn concerns_me(&self, notice: &LifecycleNotice) -> bool {
        notice.installed_app_id() == self.context.installed_app_id
    }

    /// Run until `cancel` fires, the installation is uninstalled, or the
    /// notice channel closes.
    pub async fn run(
        mut self,
        mut notices: broadcast::Receiver<LifecycleNotice>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        info!(
            installed_app_id = %self.context.installed_app_id,
            interval_secs = self.interval.as_secs(),
            "subscription sync started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                notice = notices.recv() => match notice {
                    Ok(notice) if !self.concerns_me(&notice) => continue,
                    Ok(LifecycleNotice::Uninstalled { .. }) => break,
                    Ok(
                        LifecycleNotice::Installed { .. }
                        | LifecycleNotice::Updated { .. }
                        | LifecycleNotice::DevicesChanged { .. },
                    ) => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "lifecycle notices lagged, resyncing");
                    }
                    Err(RecvError::Closed) => break,
                },
            }

            if let Err(e) = self.sync_once().await {
                warn!(
                    installed_app_id = %self.context.installed_app_id,
                    error = %e,
                    "subscription sync failed"
                );
            }
        }

        info!(installed_app_id = %self.context.installed_app_id, "subscription sync stopped");
    }
}
