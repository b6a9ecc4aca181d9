//! Interactive installation: drives the handshake from the terminal while
//! serving the webhook so SmartThings can reach us during the flow.

use std::sync::Arc;
use std::time::Duration;

use dialoguer::{Confirm, Password, Select};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use thingsync_core::webhook::router;
use thingsync_core::{
    FlowContext, FlowEvent, FlowState, InstallFlow, InstallationRecord, LifecycleNotice, Prompt,
    SyncSettings, SyncWorker, WebhookRegistry,
};

use crate::cli::{GlobalOpts, SetupArgs};
use crate::config::{self, TomlInstallationStore};
use crate::error::CliError;
use crate::output;

use super::util::{self, prompt_err};

pub async fn handle(args: SetupArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::resolve_path(global);

    // Endpoint ids must be on disk before an app registration refers to them.
    config::update_config(&path, |stored| {
        stored.ensure_endpoint_ids();
        if let Some(public_url) = args.public_url {
            stored.webhook.public_url = Some(public_url);
        }
    })?;

    let cfg = config::load(global)?;
    let endpoint = cfg.endpoint_config()?;
    let manager = util::attached_manager(&cfg, &endpoint)?;
    let webhooks = Arc::new(WebhookRegistry::new());
    let mut notices = manager.subscribe();

    let cancel = CancellationToken::new();
    let bind = args.bind.unwrap_or_else(|| cfg.webhook.bind.clone());
    let server = util::spawn_webhook_server(&bind, router(Arc::clone(&webhooks)), cancel.clone())
        .await?;

    let settings = cfg.sync_settings();
    let flow = InstallFlow::new(FlowContext {
        api: cfg.api_settings(),
        endpoint,
        profile: cfg.app_profile(),
        webhooks,
        manager,
        store: Arc::new(TomlInstallationStore::new(path)),
    });

    let result = drive(&flow, &mut notices, &settings, global).await;

    cancel.cancel();
    if let Ok(Err(e)) = server.await {
        warn!(error = %e, "webhook server stopped with an error");
    }
    result
}

/// Run the flow to a terminal state, prompting for each step.
async fn drive(
    flow: &InstallFlow,
    notices: &mut broadcast::Receiver<LifecycleNotice>,
    settings: &SyncSettings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut state = flow.transition(FlowState::default(), FlowEvent::Show).await;
    let mut authorized: Option<FlowEvent> = None;

    while !state.is_terminal() {
        let event = match state.prompt() {
            Some(Prompt::ConfirmWebhook { webhook_url }) => {
                eprintln!("Webhook URL: {webhook_url}");
                eprintln!("   SmartThings must be able to reach this URL over HTTPS.");
                if !ask("Is this URL reachable from the internet?", true)? {
                    return Err(CliError::SetupAborted {
                        reason: "webhook URL not confirmed".into(),
                    });
                }
                FlowEvent::Confirm
            }

            Some(Prompt::EnterCredential { error }) => {
                show_error(error);
                let token = Password::new()
                    .with_prompt("Personal access token")
                    .interact()
                    .map_err(prompt_err)?;
                FlowEvent::SubmitToken(token)
            }

            Some(Prompt::ChooseLocation { choices, error }) => {
                show_error(error);
                choose_location(choices)?
            }

            Some(Prompt::OpenAuthorizeUrl {
                url,
                app_id,
                location_id,
                error,
            }) => {
                show_error(error);
                match authorized.take() {
                    Some(event) if error.is_some() => {
                        if !ask("Retry saving the installation?", true)? {
                            return Err(CliError::SetupAborted {
                                reason: "installation not saved".into(),
                            });
                        }
                        event
                    }
                    _ => {
                        eprintln!("\nOpen this URL to authorize the app in your location:\n\n   {url}\n");
                        let event = await_authorization(notices, app_id, location_id).await?;
                        authorized = Some(event.clone());
                        event
                    }
                }
            }

            Some(Prompt::Finished { .. } | Prompt::Aborted(_)) | None => FlowEvent::Show,
        };

        state = flow.transition(state, event).await;
    }

    match state {
        FlowState::Complete { entry_id, record } => {
            let color = output::should_color(&global.color);
            eprintln!(
                "{}",
                output::success(
                    &format!(
                        "✓ Installed {} at location {} (entry {entry_id})",
                        record.installed_app_id, record.location_id
                    ),
                    color
                )
            );
            initial_sync(flow, &entry_id, &record, settings, color).await;
            offer_keyring(global, &record.access_token)?;
            eprintln!("\n  Next: thingsync serve");
            Ok(())
        }
        FlowState::Aborted(reason) => Err(CliError::SetupAborted {
            reason: reason.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Subscribe the new installation right away instead of waiting for `serve`.
async fn initial_sync(
    flow: &InstallFlow,
    entry_id: &str,
    record: &InstallationRecord,
    settings: &SyncSettings,
    color: bool,
) {
    let result = async {
        let client = flow.context().api.client(&record.access_token)?;
        SyncWorker::new(client, record.context(entry_id), settings)
            .sync_once()
            .await
    }
    .await;

    match result {
        Ok(report) if report.is_converged() => eprintln!(
            "{}",
            output::success(
                &format!("✓ Subscribed to {} capabilities", report.desired.len()),
                color
            )
        ),
        Ok(report) => eprintln!(
            "{}",
            output::failure(
                &format!(
                    "✗ {} subscription change(s) failed; `thingsync sync` retries them",
                    report.failure_count()
                ),
                color
            )
        ),
        Err(e) => {
            warn!(error = %e, "initial subscription sync failed");
            eprintln!(
                "{}",
                output::failure("✗ Initial sync failed; `thingsync sync` retries it", color)
            );
        }
    }
}

// ── Prompts ─────────────────────────────────────────────────────────

fn ask(message: &str, default: bool) -> Result<bool, CliError> {
    Confirm::new()
        .with_prompt(message)
        .default(default)
        .interact()
        .map_err(prompt_err)
}

fn show_error(error: Option<&thingsync_core::FlowError>) {
    if let Some(e) = error {
        eprintln!("   ✗ {e}");
    }
}

fn choose_location(
    choices: &[thingsync_api::types::LocationSummary],
) -> Result<FlowEvent, CliError> {
    if choices.is_empty() {
        if !ask("Retry listing locations?", true)? {
            return Err(CliError::SetupAborted {
                reason: "no location selected".into(),
            });
        }
        return Ok(FlowEvent::Show);
    }

    let mut items: Vec<String> = choices
        .iter()
        .map(|l| format!("{} ({})", l.name, l.location_id))
        .collect();
    items.push("Refresh list".into());

    let selection = Select::new()
        .with_prompt("Location to install into")
        .items(&items)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    Ok(choices
        .get(selection)
        .map_or(FlowEvent::Show, |l| {
            FlowEvent::SelectLocation(l.location_id.clone())
        }))
}

/// Wait for the INSTALL lifecycle of `app_id` at `location_id`.
async fn await_authorization(
    notices: &mut broadcast::Receiver<LifecycleNotice>,
    app_id: &str,
    location_id: &str,
) -> Result<FlowEvent, CliError> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Waiting for authorization (Ctrl-C to cancel)");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break Err(CliError::SetupAborted { reason: "cancelled".into() });
            }
            notice = notices.recv() => match notice {
                Ok(notice) => {
                    if let Some(event) = FlowEvent::from_notice(&notice, app_id, location_id) {
                        break Ok(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "lifecycle notices lagged"),
                Err(RecvError::Closed) => {
                    break Err(CliError::SetupAborted {
                        reason: "webhook server stopped".into(),
                    });
                }
            },
        }
    };

    spinner.finish_and_clear();
    result
}

/// Offer to keep the token in the keyring for later API commands.
fn offer_keyring(global: &GlobalOpts, token: &secrecy::SecretString) -> Result<(), CliError> {
    if global.yes || global.token.is_some() {
        return Ok(());
    }
    if ask("Store the access token in the system keyring?", true)? {
        config::store_token(token)?;
        eprintln!("   ✓ Access token stored in system keyring");
    }
    Ok(())
}
