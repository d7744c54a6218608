//! The `!`-prefixed command table (§6), parsed and dispatched against the
//! same `Store`/`MissionEngine`/`AgentRegistry` the daemon uses — the bridge
//! adds no state of its own.

use cadre_agents::mission::MissionEngine;
use cadre_agents::registry::AgentRegistry;
use cadre_core::store::Store;
use cadre_core::types::{AgentType, Priority, Team, TeamStatus};
use cadre_intelligence::cost_tracker::SpendTracker;
use uuid::Uuid;

use crate::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Teams,
    Roster,
    Costs,
    Approve(Uuid),
    Activate(Uuid),
    Deactivate(Uuid),
    Hire(Uuid),
    Reject(Uuid),
    Fire(String),
    Newbiz(String),
    Help,
    /// Not a recognized command; `text` is echoed back in the reply so the
    /// founder can see what didn't parse.
    Unknown(String),
}

/// Pure parse: `text` is the raw message body, already known to come from
/// the founder user id (the caller filters on `onMessage`'s `fromUserId`
/// before reaching here).
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    let rest = text.strip_prefix('!')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("").to_lowercase();
    let arg = parts.next().map(str::trim).unwrap_or("");

    Some(match name.as_str() {
        "status" => Command::Status,
        "teams" => Command::Teams,
        "roster" => Command::Roster,
        "costs" => Command::Costs,
        "help" => Command::Help,
        "approve" => match Uuid::parse_str(arg) {
            Ok(id) => Command::Approve(id),
            Err(_) => Command::Unknown(text.to_string()),
        },
        "activate" => match Uuid::parse_str(arg) {
            Ok(id) => Command::Activate(id),
            Err(_) => Command::Unknown(text.to_string()),
        },
        "deactivate" => match Uuid::parse_str(arg) {
            Ok(id) => Command::Deactivate(id),
            Err(_) => Command::Unknown(text.to_string()),
        },
        "hire" => match Uuid::parse_str(arg) {
            Ok(id) => Command::Hire(id),
            Err(_) => Command::Unknown(text.to_string()),
        },
        "reject" => match Uuid::parse_str(arg) {
            Ok(id) => Command::Reject(id),
            Err(_) => Command::Unknown(text.to_string()),
        },
        "fire" if !arg.is_empty() => Command::Fire(arg.to_string()),
        "newbiz" if !arg.is_empty() => Command::Newbiz(arg.to_string()),
        _ => Command::Unknown(text.to_string()),
    })
}

pub const HELP_TEXT: &str = "\
!status - teams + counts of active agents, active missions
!teams - list teams with their agents
!roster - full roster + pending hiring proposals
!costs - today's totals (tier breakdown)
!approve <stepId> - manual step approval
!activate <teamId> / !deactivate <teamId> - toggle team status
!hire <id> / !reject <id> - decide on a hiring proposal
!fire <displayName> - retire an agent (except chief-of-staff)
!newbiz <name> - create a business unit
!help - list commands";

/// Runs a parsed command against the store and returns the reply text to
/// post back to the channel. Never returns an `Err` for "not found" /
/// "protected" cases — those are reported in the reply text, matching
/// §6's "exit code is irrelevant; reply text is the product".
pub async fn handle(store: &Store, command: Command) -> Result<String, BridgeError> {
    match command {
        Command::Status => status(store).await,
        Command::Teams => teams(store).await,
        Command::Roster => roster(store).await,
        Command::Costs => costs(store).await,
        Command::Approve(step_id) => approve(store, step_id).await,
        Command::Activate(team_id) => set_team_active(store, team_id, TeamStatus::Active).await,
        Command::Deactivate(team_id) => set_team_active(store, team_id, TeamStatus::Dormant).await,
        Command::Hire(id) => hire(store, id).await,
        Command::Reject(id) => reject(store, id).await,
        Command::Fire(display_name) => fire(store, &display_name).await,
        Command::Newbiz(name) => newbiz(store, &name).await,
        Command::Help => Ok(HELP_TEXT.to_string()),
        Command::Unknown(text) => Ok(format!("unrecognized command: {text}\n\n{HELP_TEXT}")),
    }
}

async fn status(store: &Store) -> Result<String, BridgeError> {
    let teams = store.list_teams().await?;
    let agents = store.list_active_agents().await?;
    let missions = store.list_missions_by_status(cadre_core::types::MissionStatus::InProgress).await?;
    Ok(format!(
        "{} teams, {} active agents, {} active missions",
        teams.len(),
        agents.len(),
        missions.len()
    ))
}

async fn teams(store: &Store) -> Result<String, BridgeError> {
    let teams = store.list_teams().await?;
    if teams.is_empty() {
        return Ok("no teams yet".to_string());
    }
    let agents = store.list_agents().await?;
    let mut lines = Vec::new();
    for team in &teams {
        let members: Vec<&str> = agents
            .iter()
            .filter(|a| a.team_id == Some(team.id))
            .map(|a| a.display_name.as_str())
            .collect();
        lines.push(format!(
            "{} [{:?}] ({}): {}",
            team.name,
            team.status,
            team.id,
            if members.is_empty() { "no agents".to_string() } else { members.join(", ") }
        ));
    }
    Ok(lines.join("\n"))
}

async fn roster(store: &Store) -> Result<String, BridgeError> {
    let agents = store.list_agents().await?;
    let mut lines: Vec<String> = agents
        .iter()
        .map(|a| format!("{} - {} [{:?}]", a.display_name, a.role, a.status))
        .collect();
    let pending = store.list_pending_hiring_proposals().await?;
    if !pending.is_empty() {
        lines.push(String::new());
        lines.push("pending hiring proposals:".to_string());
        for p in pending {
            lines.push(format!("{} - {} ({})", p.id, p.role_title, p.justification));
        }
    }
    Ok(lines.join("\n"))
}

async fn costs(store: &Store) -> Result<String, BridgeError> {
    let tracker = SpendTracker::new(store);
    let breakdown = tracker.tier_breakdown_today().await?;
    if breakdown.is_empty() {
        return Ok("no spend recorded today".to_string());
    }
    let total: f64 = breakdown.iter().map(|(_, cost)| cost).sum();
    let mut lines = vec![format!("today's total: ${total:.2}")];
    for (tier, cost) in breakdown {
        lines.push(format!("  {tier}: ${cost:.2}"));
    }
    Ok(lines.join("\n"))
}

async fn approve(store: &Store, step_id: Uuid) -> Result<String, BridgeError> {
    let engine = MissionEngine::new(store);
    engine.approve_step(step_id).await?;
    Ok(format!("step {step_id} approved"))
}

async fn set_team_active(store: &Store, team_id: Uuid, status: TeamStatus) -> Result<String, BridgeError> {
    store.set_team_status(team_id, status).await?;
    Ok(format!("team {team_id} is now {status:?}"))
}

async fn hire(store: &Store, id: Uuid) -> Result<String, BridgeError> {
    let Some(proposal) = store.get_hiring_proposal(id).await? else {
        return Ok(format!("no hiring proposal with id {id}"));
    };
    let registry = AgentRegistry::new(store);
    let agent = registry.complete_hiring(&proposal).await?;
    Ok(format!("hired {} as {}", agent.display_name, agent.role))
}

async fn reject(store: &Store, id: Uuid) -> Result<String, BridgeError> {
    let Some(proposal) = store.get_hiring_proposal(id).await? else {
        return Ok(format!("no hiring proposal with id {id}"));
    };
    let registry = AgentRegistry::new(store);
    registry.reject_hiring_proposal(proposal.id).await?;
    Ok(format!("rejected hiring proposal for {}", proposal.role_title))
}

async fn fire(store: &Store, display_name: &str) -> Result<String, BridgeError> {
    let Some(agent) = store.get_agent_by_name(display_name).await? else {
        return Ok(format!("no agent named {display_name}"));
    };
    if agent.agent_type == AgentType::ChiefOfStaff {
        return Ok(format!("{display_name} is the chief of staff and cannot be fired"));
    }
    let registry = AgentRegistry::new(store);
    registry.set_agent_status(agent.id, cadre_core::types::AgentStatus::Retired).await?;
    Ok(format!("{display_name} has been retired"))
}

async fn newbiz(store: &Store, name: &str) -> Result<String, BridgeError> {
    let team = Team::new(name);
    store.upsert_team(&team).await?;
    Ok(format!("created business unit {name} ({})", team.id))
}

/// Unused by `newbiz` directly, kept here so future callers creating a
/// mission proposal from a chat command have a single place to start from.
#[allow(dead_code)]
async fn propose_mission(store: &Store, title: &str, description: &str) -> Result<String, BridgeError> {
    let engine = MissionEngine::new(store);
    let proposal = engine.create_proposal(title, description, Priority::Normal, None, None).await?;
    Ok(format!("proposal {} created", proposal.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse_command("!status"), Some(Command::Status));
        assert_eq!(parse_command("!teams"), Some(Command::Teams));
        assert_eq!(parse_command("!help"), Some(Command::Help));
    }

    #[test]
    fn parses_uuid_argument_commands() {
        let id = Uuid::new_v4();
        assert_eq!(parse_command(&format!("!approve {id}")), Some(Command::Approve(id)));
        assert_eq!(parse_command(&format!("!hire {id}")), Some(Command::Hire(id)));
    }

    #[test]
    fn bad_uuid_argument_is_unknown() {
        assert!(matches!(parse_command("!approve not-a-uuid"), Some(Command::Unknown(_))));
    }

    #[test]
    fn parses_string_argument_commands() {
        assert_eq!(parse_command("!fire Nova"), Some(Command::Fire("Nova".to_string())));
        assert_eq!(parse_command("!newbiz Widgets Co"), Some(Command::Newbiz("Widgets Co".to_string())));
    }

    #[test]
    fn text_with_no_bang_prefix_does_not_parse() {
        assert_eq!(parse_command("status"), None);
        assert_eq!(parse_command("hello there"), None);
    }

    #[tokio::test]
    async fn status_on_empty_store_reports_zeros() {
        let store = Store::new_in_memory().await.unwrap();
        let reply = handle(&store, Command::Status).await.unwrap();
        assert_eq!(reply, "0 teams, 0 active agents, 0 active missions");
    }

    #[tokio::test]
    async fn fire_protects_the_chief_of_staff() {
        let store = Store::new_in_memory().await.unwrap();
        let registry = AgentRegistry::new(&store);
        let agent = registry
            .create_agent(cadre_agents::registry::CreateAgentParams {
                role: "Chief of Staff".into(),
                team_id: None,
                agent_type: AgentType::ChiefOfStaff,
                preferred_source: None,
            })
            .await
            .unwrap();
        let reply = handle(&store, Command::Fire(agent.display_name.clone())).await.unwrap();
        assert!(reply.contains("cannot be fired"));
    }

    #[tokio::test]
    async fn fire_unknown_agent_reports_not_found() {
        let store = Store::new_in_memory().await.unwrap();
        let reply = handle(&store, Command::Fire("Nobody".to_string())).await.unwrap();
        assert!(reply.contains("no agent named"));
    }

    #[tokio::test]
    async fn newbiz_creates_an_active_team() {
        let store = Store::new_in_memory().await.unwrap();
        let reply = handle(&store, Command::Newbiz("Widgets".to_string())).await.unwrap();
        assert!(reply.contains("Widgets"));
        let teams = store.list_teams().await.unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].status, TeamStatus::Active);
    }

    #[tokio::test]
    async fn unknown_command_echoes_help() {
        let reply = handle(&Store::new_in_memory().await.unwrap(), Command::Unknown("!bogus".to_string()))
            .await
            .unwrap();
        assert!(reply.contains("unrecognized command"));
        assert!(reply.contains("!help"));
    }
}
