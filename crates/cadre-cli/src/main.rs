//! Admin CLI (§6): the operator-facing front door onto the same
//! `!`-command table the chat bridge exposes, operated directly against the
//! shared datastore rather than over a network API — there is no admin HTTP
//! surface, only the ingress `/proposals` route and this CLI.

use anyhow::Context;
use cadre_bridge::commands::{self, Command};
use cadre_core::config::Config;
use cadre_core::store::Store;
use clap::{Parser, Subcommand};
use uuid::Uuid;

/// cadre admin CLI -- inspect and operate the agency from a terminal.
#[derive(Parser)]
#[command(name = "cadre", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Teams + counts of active agents, active missions (default).
    Status,
    /// List teams with their agents.
    Teams,
    /// Full roster + pending hiring proposals.
    Roster,
    /// Today's totals, broken down by model tier.
    Costs,
    /// Manually approve a step.
    Approve { step_id: Uuid },
    /// Reactivate a dormant team.
    Activate { team_id: Uuid },
    /// Mark a team dormant.
    Deactivate { team_id: Uuid },
    /// Accept a pending hiring proposal.
    Hire { id: Uuid },
    /// Decline a pending hiring proposal.
    Reject { id: Uuid },
    /// Retire an agent by display name (chief-of-staff is protected).
    Fire { display_name: String },
    /// Create a new business unit (team).
    Newbiz { name: String },
    /// List available commands.
    Help,
}

impl From<Commands> for Command {
    fn from(c: Commands) -> Self {
        match c {
            Commands::Status => Command::Status,
            Commands::Teams => Command::Teams,
            Commands::Roster => Command::Roster,
            Commands::Costs => Command::Costs,
            Commands::Approve { step_id } => Command::Approve(step_id),
            Commands::Activate { team_id } => Command::Activate(team_id),
            Commands::Deactivate { team_id } => Command::Deactivate(team_id),
            Commands::Hire { id } => Command::Hire(id),
            Commands::Reject { id } => Command::Reject(id),
            Commands::Fire { display_name } => Command::Fire(display_name),
            Commands::Newbiz { name } => Command::Newbiz(name),
            Commands::Help => Command::Help,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load().unwrap_or_default();
    cadre_core::logging::init_logging("cadre-cli", &cfg.general.log_level);

    let store = Store::new(&cfg.store.path)
        .await
        .with_context(|| format!("failed to open datastore at {}", cfg.store.path))?;

    let command: Command = match Cli::parse().command {
        None => Command::Status,
        Some(c) => c.into(),
    };

    let reply = commands::handle(&store, command)
        .await
        .context("command failed")?;
    println!("{reply}");
    Ok(())
}
