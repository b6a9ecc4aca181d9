//! Subscription listing for recorded installations.

use serde::Serialize;
use tabled::Tabled;

use thingsync_api::types::{SourceType, SubscriptionResponse};

use crate::cli::{GlobalOpts, SubscriptionsArgs, SubscriptionsCommand};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionItem {
    installed_app_id: String,
    id: String,
    source_type: SourceType,
    capability: Option<String>,
}

#[derive(Tabled)]
struct SubscriptionRow {
    #[tabled(rename = "Installed App")]
    installed_app_id: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Source")]
    source: &'static str,
    #[tabled(rename = "Capability")]
    capability: String,
}

fn source_name(source: SourceType) -> &'static str {
    match source {
        SourceType::Capability => "CAPABILITY",
        SourceType::Device => "DEVICE",
        SourceType::DeviceLifecycle => "DEVICE_LIFECYCLE",
        SourceType::DeviceHealth => "DEVICE_HEALTH",
        SourceType::Mode => "MODE",
        SourceType::SceneLifecycle => "SCENE_LIFECYCLE",
        SourceType::Other => "OTHER",
    }
}

impl From<&SubscriptionItem> for SubscriptionRow {
    fn from(s: &SubscriptionItem) -> Self {
        Self {
            installed_app_id: s.installed_app_id.clone(),
            id: s.id.clone(),
            source: source_name(s.source_type),
            capability: s.capability.clone().unwrap_or_default(),
        }
    }
}

impl From<SubscriptionResponse> for SubscriptionItem {
    fn from(s: SubscriptionResponse) -> Self {
        Self {
            capability: s.capability_name().map(str::to_owned),
            installed_app_id: s.installed_app_id,
            id: s.id,
            source_type: s.source_type,
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: SubscriptionsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        SubscriptionsCommand::List { installed_app_id } => {
            let cfg = config::load(global)?;

            let mut items = Vec::new();
            for (_, entry) in config::select_installations(&cfg, installed_app_id.as_deref())? {
                let client = config::installation_client(&cfg, entry)?;
                let subscriptions = client.list_subscriptions(&entry.installed_app_id).await?;
                items.extend(subscriptions.into_iter().map(SubscriptionItem::from));
            }

            let out = output::render_list(
                &global.output,
                &items,
                |s| SubscriptionRow::from(s),
                |s| s.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
