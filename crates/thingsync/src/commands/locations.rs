//! Location listing with the personal access token.

use tabled::Tabled;

use thingsync_api::types::LocationSummary;

use crate::cli::{GlobalOpts, LocationsArgs, LocationsCommand};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct LocationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl From<&LocationSummary> for LocationRow {
    fn from(l: &LocationSummary) -> Self {
        Self {
            id: l.location_id.clone(),
            name: l.name.clone(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: LocationsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        LocationsCommand::List => {
            let cfg = config::load(global)?;
            let client = config::token_client(global, &cfg)?;
            let locations = client.list_locations().await?;

            let out = output::render_list(
                &global.output,
                &locations,
                |l| LocationRow::from(l),
                |l| l.location_id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
