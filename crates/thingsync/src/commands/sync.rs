//! One-shot subscription sync.

use serde::Serialize;
use tabled::Tabled;

use thingsync_core::reconcile::SubscriptionAction;
use thingsync_core::{ReconcileReport, SyncWorker};

use crate::cli::{GlobalOpts, SyncArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

/// Capability column for the location-wide device lifecycle subscription.
const DEVICE_LIFECYCLE_ROW: &str = "(device lifecycle)";

#[derive(Clone, Serialize, Tabled)]
struct ChangeRow {
    #[tabled(rename = "Installed App")]
    installed_app_id: String,
    #[tabled(rename = "Capability")]
    capability: String,
    #[tabled(rename = "Action")]
    action: &'static str,
    #[tabled(rename = "Result")]
    result: String,
}

fn rows(report: &ReconcileReport) -> Vec<ChangeRow> {
    let kept = report.kept.iter().map(|capability| ChangeRow {
        installed_app_id: report.installed_app_id.clone(),
        capability: capability.to_string(),
        action: "keep",
        result: "ok".into(),
    });
    let changed = report.outcomes.iter().map(|outcome| ChangeRow {
        installed_app_id: report.installed_app_id.clone(),
        capability: outcome.capability.to_string(),
        action: match outcome.action {
            SubscriptionAction::Create => "create",
            SubscriptionAction::Delete => "delete",
        },
        result: match &outcome.result {
            Ok(()) => "ok".into(),
            Err(message) => message.clone(),
        },
    });
    let lifecycle = report.device_lifecycle.iter().map(|result| ChangeRow {
        installed_app_id: report.installed_app_id.clone(),
        capability: DEVICE_LIFECYCLE_ROW.into(),
        action: "create",
        result: match result {
            Ok(()) => "ok".into(),
            Err(message) => message.clone(),
        },
    });
    kept.chain(changed).chain(lifecycle).collect()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: SyncArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let settings = cfg.sync_settings();
    let color = output::should_color(&global.color);

    let mut changes = Vec::new();
    let mut failures = 0;
    for (entry_id, entry) in config::select_installations(&cfg, args.installed_app_id.as_deref())? {
        let client = config::installation_client(&cfg, entry)?;
        let mut worker = SyncWorker::new(client, entry.context(entry_id), &settings);
        let report = worker.sync_once().await?;

        failures += report.failure_count();
        if !global.quiet {
            let summary = format!(
                "{}: {} kept, {} created, {} deleted",
                report.installed_app_id,
                report.kept.len(),
                report.created().len(),
                report.deleted().len(),
            );
            if report.is_converged() {
                eprintln!("{}", output::success(&summary, color));
            } else {
                eprintln!("{}", output::failure(&summary, color));
            }
        }
        changes.extend(rows(&report));
    }

    let out = output::render_list(
        &global.output,
        &changes,
        ChangeRow::clone,
        |row| row.capability.clone(),
    )?;
    output::print_output(&out, global.quiet);

    if failures > 0 {
        return Err(CliError::SyncIncomplete { failures });
    }
    Ok(())
}
