//! Locally recorded installations.

use serde::Serialize;
use tabled::Tabled;

use crate::cli::{GlobalOpts, InstallationsArgs, InstallationsCommand};
use crate::config::{self, InstallationEntry};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

/// Serializable view without secrets.
#[derive(Serialize)]
struct InstallationItem {
    entry_id: String,
    installed_app_id: String,
    app_id: String,
    location_id: String,
    created_at: String,
}

impl InstallationItem {
    fn new(entry_id: &str, entry: &InstallationEntry) -> Self {
        Self {
            entry_id: entry_id.to_owned(),
            installed_app_id: entry.installed_app_id.clone(),
            app_id: entry.app_id.clone(),
            location_id: entry.location_id.clone(),
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

#[derive(Tabled)]
struct InstallationRow {
    #[tabled(rename = "Entry")]
    entry_id: String,
    #[tabled(rename = "Installed App")]
    installed_app_id: String,
    #[tabled(rename = "Location")]
    location_id: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

impl From<&InstallationItem> for InstallationRow {
    fn from(i: &InstallationItem) -> Self {
        Self {
            entry_id: i.entry_id.clone(),
            installed_app_id: i.installed_app_id.clone(),
            location_id: i.location_id.clone(),
            created_at: i.created_at.clone(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: InstallationsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        InstallationsCommand::List => {
            let cfg = config::load(global)?;
            let items: Vec<_> = cfg
                .installations
                .iter()
                .map(|(id, entry)| InstallationItem::new(id, entry))
                .collect();

            let out = output::render_list(
                &global.output,
                &items,
                |i| InstallationRow::from(i),
                |i| i.installed_app_id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        InstallationsCommand::Remove { installed_app_id } => {
            if !util::confirm(
                &format!(
                    "Forget installation '{installed_app_id}'? The app stays installed in SmartThings."
                ),
                global.yes,
            )? {
                return Ok(());
            }

            let path = config::resolve_path(global);
            match config::remove_installation(&path, &installed_app_id)? {
                Some(entry_id) => {
                    if !global.quiet {
                        eprintln!("Installation {installed_app_id} removed (entry {entry_id})");
                    }
                    Ok(())
                }
                None => Err(CliError::NotFound {
                    resource_type: "installation".into(),
                    identifier: installed_app_id,
                    list_command: "installations list".into(),
                }),
            }
        }
    }
}
