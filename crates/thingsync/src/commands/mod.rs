//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod installations;
pub mod locations;
pub mod serve;
pub mod setup;
pub mod subscriptions;
pub mod sync;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Setup(args) => setup::handle(args, global).await,
        Command::Serve(args) => serve::handle(args, global).await,
        Command::Sync(args) => sync::handle(args, global).await,
        Command::Subscriptions(args) => subscriptions::handle(args, global).await,
        Command::Locations(args) => locations::handle(args, global).await,
        Command::Installations(args) => installations::handle(args, global),
        Command::Config(args) => config_cmd::handle(args, global),
        // Completions are generated before dispatch
        Command::Completions(_) => unreachable!(),
    }
}
