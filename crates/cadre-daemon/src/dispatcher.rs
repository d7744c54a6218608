//! The dispatcher process (§2, §4.1 promotion loop, §4.10 scheduled jobs).
//!
//! One tick does three things, in order: promote the next pending mission
//! proposal onto a team, run whichever scheduled jobs are due, and record
//! the tick against the health endpoint. It never touches mission steps
//! themselves — that's the executor's job.

use std::sync::Arc;
use std::time::Duration;

use cadre_core::store::Store;
use cadre_core::types::Team;
use chrono::Utc;
use uuid::Uuid;

use cadre_agents::mission::{parse_model_tier, parse_phases, MissionEngine};
use cadre_agents::registry::AgentRegistry;
use cadre_agents::roles;
use cadre_intelligence::cost_tracker::{BudgetCheck, SpendTracker};

use crate::health::HealthState;
use crate::scheduler::{DailyJob, Scheduler};
use crate::DaemonError;

pub struct Dispatcher {
    store: Arc<Store>,
    scheduler: Scheduler,
    health: Arc<HealthState>,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, timezone: chrono_tz::Tz, health: Arc<HealthState>) -> Self {
        Self {
            store,
            scheduler: Scheduler::new(timezone),
            health,
        }
    }

    pub async fn tick(&self, cfg: &cadre_core::config::Config) -> Result<(), DaemonError> {
        self.promote_next_proposal().await?;
        self.run_scheduled_jobs(cfg).await?;
        self.health.record_tick();
        Ok(())
    }

    /// Pops the oldest pending proposal (CAS via `claim_next_proposal`),
    /// routes its description to a standing team by keyword category,
    /// accepts it onto that team (creating the team row on first use), and
    /// creates its mission steps from the `[PHASES]` block — or a single
    /// `t1` step when the proposal carries no phases (§4.1 S1/S3).
    ///
    /// If the category has no agent able to take the work, an immediate
    /// gap hire is attempted; when the name pool is exhausted the proposal
    /// is deferred behind a hiring proposal instead of promoted (§4.2 S2).
    async fn promote_next_proposal(&self) -> Result<(), DaemonError> {
        let Some(proposal) = self.store.claim_next_proposal().await? else {
            return Ok(());
        };
        let category = roles::route_by_keywords(&proposal.description);
        let team_name = roles::standing_team_for(category);
        let team_id = self.team_id_for(team_name).await?;

        let mission_engine = MissionEngine::new(&self.store);
        let registry = AgentRegistry::new(&self.store);

        let Some(lead_agent_id) = self.ensure_agent_for_category(&registry, category, team_id).await? else {
            registry
                .create_hiring_proposal(
                    roles::canned_title_for(category),
                    team_id,
                    format!("no agent on {team_name} can handle: {}", proposal.title),
                    Some(proposal.id),
                )
                .await?;
            mission_engine.defer_proposal(proposal.id).await?;
            tracing::info!(proposal_id = %proposal.id, team = team_name, "proposal deferred pending a hire");
            return Ok(());
        };

        let Some(mission) = mission_engine.accept_proposal(&proposal, team_id).await? else {
            return Ok(());
        };

        let phases = parse_phases(&proposal.description);
        if phases.is_empty() {
            mission_engine
                .create_step(mission.id, proposal.description.clone(), Some(lead_agent_id), cadre_core::types::ModelTier::T1, 0, None)
                .await?;
        } else {
            let mut parent_step_id = None;
            for (idx, phase) in phases.iter().enumerate() {
                let phase_agent_id = match self.ensure_agent_for_category(&registry, &phase.role, team_id).await? {
                    Some(id) => id,
                    None => lead_agent_id,
                };
                let step = mission_engine
                    .create_step(
                        mission.id,
                        phase.description.clone(),
                        Some(phase_agent_id),
                        parse_model_tier(&phase.tier),
                        idx as i64,
                        parent_step_id,
                    )
                    .await?;
                parent_step_id = Some(step.id);
            }
        }

        tracing::info!(proposal_id = %proposal.id, mission_id = %mission.id, team = team_name, "proposal promoted to mission");
        Ok(())
    }

    /// Resolves an agent able to handle `category` on `team_id`: an active
    /// team member whose role matches, or the team lead as a generalist
    /// fallback (§4.1 `canTeamHandle`). Absent either, attempts an
    /// immediate gap hire onto the same team (§4.2 `autoHireGapAgent`).
    async fn ensure_agent_for_category(
        &self,
        registry: &AgentRegistry<'_>,
        category: &str,
        team_id: Uuid,
    ) -> Result<Option<Uuid>, DaemonError> {
        let team_agents = self.store.list_agents_by_team(team_id).await?;
        let active: Vec<_> = team_agents.iter().filter(|a| a.is_active()).collect();
        let tuples: Vec<(&str, &str, bool)> = active
            .iter()
            .map(|a| (a.display_name.as_str(), a.role.as_str(), a.agent_type == cadre_core::types::AgentType::TeamLead))
            .collect();
        let m = roles::can_team_handle(&tuples, category);
        if m.can_handle {
            if let Some(name) = m.matched_agent {
                if let Some(agent) = active.iter().find(|a| a.display_name == name) {
                    return Ok(Some(agent.id));
                }
            }
        }

        let role_title = roles::canned_title_for(category);
        let hired = registry
            .auto_hire_gap_agent(role_title, category, |_| Some(team_id))
            .await?;
        Ok(hired.map(|a| a.id))
    }

    async fn team_id_for(&self, name: &str) -> Result<Uuid, DaemonError> {
        let teams = self.store.list_teams().await?;
        if let Some(existing) = teams.iter().find(|t| t.name == name) {
            return Ok(existing.id);
        }
        let team = Team::new(name);
        let id = team.id;
        self.store.upsert_team(&team).await?;
        Ok(id)
    }

    async fn run_scheduled_jobs(&self, cfg: &cadre_core::config::Config) -> Result<(), DaemonError> {
        let now = Utc::now();
        for job in self.scheduler.due_daily_jobs(&cfg.scheduler, now) {
            self.run_daily_job(job).await?;
        }
        if self
            .scheduler
            .health_check_due(Duration::from_secs(cfg.scheduler.health_check_interval_secs), now)
        {
            self.run_health_check().await?;
        }
        self.run_cost_alert(cfg).await?;
        Ok(())
    }

    async fn run_daily_job(&self, job: DailyJob) -> Result<(), DaemonError> {
        let event_type = match job {
            DailyJob::Standup => "daily_standup",
            DailyJob::Summary => "daily_summary",
            DailyJob::Backup => "backup",
            DailyJob::StatePush => "state_push",
        };
        tracing::info!(job = event_type, "scheduled job fired");
        self.store
            .insert_event(&cadre_core::types::Event {
                id: Uuid::new_v4(),
                event_type: event_type.to_string(),
                severity: cadre_core::types::Severity::Info,
                description: format!("scheduled job {event_type} ran"),
                data: None,
                processed: false,
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    async fn run_health_check(&self) -> Result<(), DaemonError> {
        let active_agents = self.store.list_active_agents().await?;
        let status = if active_agents.is_empty() {
            cadre_core::types::HealthStatus::Warning
        } else {
            cadre_core::types::HealthStatus::Pass
        };
        self.store
            .insert_health_check(&cadre_core::types::HealthCheck {
                id: Uuid::new_v4(),
                component: "dispatcher".to_string(),
                status,
                latency_ms: 0,
                details: Some(format!("{} active agents", active_agents.len())),
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    async fn run_cost_alert(&self, cfg: &cadre_core::config::Config) -> Result<(), DaemonError> {
        let tracker = SpendTracker::new(&self.store);
        let crossed = tracker
            .crossed_alert_threshold(cfg.spending.daily_limit_usd, cfg.spending.alert_threshold_pct)
            .await?;
        if !crossed {
            return Ok(());
        }
        let check = tracker.check_daily_limit(cfg.spending.daily_limit_usd).await?;
        let description = match check {
            BudgetCheck::Denied { threshold_usd, spent_usd } => {
                format!("daily spend ${spent_usd:.2} has reached the ${threshold_usd:.2} limit")
            }
            BudgetCheck::Ok => {
                format!("daily spend crossed {:.0}% of the ${:.2} limit", cfg.spending.alert_threshold_pct * 100.0, cfg.spending.daily_limit_usd)
            }
        };
        self.store
            .insert_event(&cadre_core::types::Event {
                id: Uuid::new_v4(),
                event_type: "cost_alert".to_string(),
                severity: cadre_core::types::Severity::Warning,
                description,
                data: None,
                processed: false,
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}

/// Bootstraps the seven standing categories' teams so routing never targets
/// a nonexistent team on a fresh install (§9).
pub async fn ensure_standing_teams(store: &Store) -> Result<(), DaemonError> {
    let existing = store.list_teams().await?;
    for &category in roles::CATEGORIES {
        let name = roles::standing_team_for(category);
        if existing.iter().any(|t| t.name == name) {
            continue;
        }
        store.upsert_team(&Team::new(name)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthState;
    use cadre_agents::mission::MissionEngine;
    use cadre_core::types::Priority;

    async fn store() -> Store {
        Store::new_in_memory().await.unwrap()
    }

    fn dispatcher(store: Arc<Store>) -> Dispatcher {
        Dispatcher::new(store, chrono_tz::UTC, Arc::new(HealthState::new("dispatcher")))
    }

    #[tokio::test]
    async fn ensure_standing_teams_creates_each_category_exactly_once() {
        let store = store().await;
        ensure_standing_teams(&store).await.unwrap();
        let first_pass = store.list_teams().await.unwrap().len();
        assert_eq!(first_pass, roles::CATEGORIES.len());

        ensure_standing_teams(&store).await.unwrap();
        let second_pass = store.list_teams().await.unwrap().len();
        assert_eq!(second_pass, first_pass, "re-running must not duplicate teams");
    }

    #[tokio::test]
    async fn promote_next_proposal_is_a_noop_on_an_empty_queue() {
        let store = Arc::new(store().await);
        let d = dispatcher(store.clone());
        d.promote_next_proposal().await.unwrap();
        assert!(store.list_teams().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn promote_next_proposal_routes_to_a_standing_team_and_marks_accepted() {
        let store = Arc::new(store().await);
        let engine = MissionEngine::new(&store);
        let proposal = engine
            .create_proposal(
                "Ship the landing page",
                "design a new marketing landing page",
                Priority::Normal,
                None,
                None,
            )
            .await
            .unwrap();

        let d = dispatcher(store.clone());
        d.promote_next_proposal().await.unwrap();

        let teams = store.list_teams().await.unwrap();
        assert_eq!(teams.len(), 1);

        let reloaded = store.claim_next_proposal().await.unwrap();
        assert!(reloaded.is_none(), "the proposal must no longer be pending");
        let _ = proposal;
    }

    #[tokio::test]
    async fn promote_next_proposal_with_no_agent_defers_behind_a_hiring_proposal() {
        let store = Arc::new(store().await);
        let engine = MissionEngine::new(&store);
        engine
            .create_proposal("Ship the landing page", "design a new marketing landing page", Priority::Normal, None, None)
            .await
            .unwrap();

        let d = dispatcher(store.clone());
        d.promote_next_proposal().await.unwrap();

        assert!(store.list_missions_by_status(cadre_core::types::MissionStatus::InProgress).await.unwrap().is_empty());
        let pending_hires = store.list_pending_hiring_proposals().await.unwrap();
        assert_eq!(pending_hires.len(), 1);
    }

    #[tokio::test]
    async fn promote_next_proposal_creates_one_t1_step_when_there_are_no_phases() {
        let store = Arc::new(store().await);
        store.seed_name_pool(vec![("Nova".into(), "seed".into())]).await.unwrap();
        let engine = MissionEngine::new(&store);
        engine
            .create_proposal("Ship the landing page", "design a new marketing landing page", Priority::Normal, None, None)
            .await
            .unwrap();

        let d = dispatcher(store.clone());
        d.promote_next_proposal().await.unwrap();

        let missions = store.list_missions_by_status(cadre_core::types::MissionStatus::InProgress).await.unwrap();
        assert_eq!(missions.len(), 1);
        let steps = store.steps_for_mission(missions[0].id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].model_tier, cadre_core::types::ModelTier::T1);
        assert!(steps[0].assigned_agent_id.is_some());
    }

    #[tokio::test]
    async fn promote_next_proposal_chains_steps_from_phases_block() {
        let store = Arc::new(store().await);
        store
            .seed_name_pool(vec![("Nova".into(), "seed".into()), ("Atlas".into(), "seed".into())])
            .await
            .unwrap();
        let engine = MissionEngine::new(&store);
        let description = "Launch campaign\n[PHASES]\n\
            PHASE 1: Research the market | ROLE: research | TIER: tier1\n\
            PHASE 2: Write the plan | ROLE: strategy | TIER: tier2\n\
            [/PHASES]";
        engine
            .create_proposal("Launch campaign", description, Priority::Normal, None, None)
            .await
            .unwrap();

        let d = dispatcher(store.clone());
        d.promote_next_proposal().await.unwrap();

        let missions = store.list_missions_by_status(cadre_core::types::MissionStatus::InProgress).await.unwrap();
        assert_eq!(missions.len(), 1);
        let mut steps = store.steps_for_mission(missions[0].id).await.unwrap();
        steps.sort_by_key(|s| s.step_order);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].model_tier, cadre_core::types::ModelTier::T1);
        assert_eq!(steps[1].model_tier, cadre_core::types::ModelTier::T2);
        assert_eq!(steps[1].parent_step_id, Some(steps[0].id));
    }

    #[tokio::test]
    async fn run_cost_alert_is_silent_on_a_fresh_store() {
        let store = Arc::new(store().await);
        let d = dispatcher(store.clone());
        let cfg = cadre_core::config::Config::default();
        // No usage rows logged yet, so this must not error and must not
        // need any standing team or agent to exist.
        d.run_cost_alert(&cfg).await.unwrap();
    }
}
