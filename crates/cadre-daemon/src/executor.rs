//! The executor process (§2, §5): claims at most one pending step and
//! advances at most one step through review per tick — no task-level
//! parallelism inside the process, by construction rather than by a lock.

use std::sync::Arc;

use cadre_core::store::Store;
use cadre_core::types::{Agent, AgentType, MissionStep, StepStatus};
use uuid::Uuid;

use cadre_agents::mission::MissionEngine;
use cadre_agents::review::{self, ReviewChain, ReviewerChoice, Verdict};
use cadre_agents::roles;
use cadre_intelligence::context_builder::{self, build_agent_prompt};
use cadre_intelligence::model_router::{ModelRouter, TierContext};
use cadre_intelligence::persona;
use cadre_intelligence::skills;
use cadre_intelligence::tool_resolver::ToolResolver;

use crate::health::HealthState;
use crate::DaemonError;

pub struct Executor {
    store: Arc<Store>,
    router: Arc<ModelRouter>,
    tools: Arc<ToolResolver>,
    health: Arc<HealthState>,
}

impl Executor {
    pub fn new(store: Arc<Store>, router: Arc<ModelRouter>, tools: Arc<ToolResolver>, health: Arc<HealthState>) -> Self {
        Self { store, router, tools, health }
    }

    pub async fn tick(&self) -> Result<(), DaemonError> {
        self.work_pending_step().await?;
        self.advance_review_queue().await?;
        self.health.record_tick();
        Ok(())
    }

    async fn work_pending_step(&self) -> Result<(), DaemonError> {
        let Some(step) = self.store.pending_steps(1).await?.into_iter().next() else {
            return Ok(());
        };
        let Some(mission) = self.store.get_mission(step.mission_id).await? else {
            return Ok(());
        };

        let category = roles::route_by_keywords(&step.description);
        let team_agents = self.store.list_agents_by_team(mission.team_id).await?;
        let active: Vec<&Agent> = team_agents.iter().filter(|a| a.is_active()).collect();
        let roster: Vec<(&str, &str, bool)> = active
            .iter()
            .map(|a| (a.display_name.as_str(), a.role.as_str(), a.agent_type == AgentType::TeamLead))
            .collect();
        let routing = roles::can_team_handle(&roster, category);
        let Some(agent) = routing
            .matched_agent
            .and_then(|name| active.iter().find(|a| a.display_name == name))
        else {
            tracing::warn!(step_id = %step.id, category, "no agent on team can handle this step yet");
            return Ok(());
        };
        let agent_id = agent.id;

        if !self.store.claim_step(step.id, agent_id).await? {
            return Ok(());
        }

        let mut agent = self
            .store
            .get_agent(agent_id)
            .await?
            .ok_or(cadre_core::CoreError::NotFound { entity: "agent", id: agent_id })?;
        let persona_prompt = match self.store.latest_persona(agent.id).await? {
            Some(p) => p.system_prompt,
            None => {
                let sections = persona::generate_persona(self.router.provider().as_ref(), &agent.role).await;
                persona::save_persona(&self.store, &mut agent, sections).await?.system_prompt
            }
        };
        let system_prompt = build_agent_prompt(&self.store, &agent, &persona_prompt, &[category.to_string()]).await?;

        let appendix = self.tools.prefetch_appendix(&step.description).await;
        let mut user_message = context_builder::build_task_context(None, &agent.role, &step.description);
        user_message.push_str(&appendix);

        let is_final_step = self
            .store
            .steps_for_mission(mission.id)
            .await?
            .iter()
            .all(|s| s.step_order <= step.step_order);
        let tier = cadre_intelligence::model_router::select_tier(
            false,
            &step.description,
            TierContext { is_final_step },
        );

        match self
            .router
            .call_llm(&system_prompt, &user_message, tier, Some(agent.id), Some(step.id))
            .await
        {
            Ok(outcome) => {
                let resolved = self.tools.resolve(&outcome.content).await;
                let final_content = if resolved.had_web_markers {
                    let followup = ToolResolver::build_followup_message(&outcome.content, &resolved.web_data_block);
                    match self.router.call_llm(&system_prompt, &followup, outcome.tier_used, Some(agent.id), Some(step.id)).await {
                        Ok(followup_outcome) => followup_outcome.content,
                        Err(_) => outcome.content,
                    }
                } else {
                    outcome.content
                };
                let final_content = ToolResolver::strip_markers(&final_content);
                self.store.complete_step(step.id, &final_content).await?;
                self.track_skill_usage(agent.id, &step.description).await?;
                tracing::info!(step_id = %step.id, tier = ?outcome.tier_used, "step completed, awaiting review");
            }
            Err(e) => {
                self.store.fail_step(step.id, &e.to_string()).await?;
                tracing::warn!(step_id = %step.id, error = %e, "step failed");
            }
        }
        Ok(())
    }

    /// Post-task skill growth (§4.5): loads the agent's current skills,
    /// scans the task description for keyword hits, and persists any new
    /// or bumped usage counts.
    async fn track_skill_usage(&self, agent_id: Uuid, description: &str) -> Result<(), DaemonError> {
        let existing = self.store.skills_for_agent(agent_id).await?;
        let mut map: std::collections::HashMap<String, skills::Skill> = existing
            .into_iter()
            .map(|s| {
                (
                    s.name.clone(),
                    skills::Skill { name: s.name, proficiency: s.proficiency as u32, usage_count: s.usage_count as u32 },
                )
            })
            .collect();
        let leveled_up = skills::track_skill_usage(&mut map, description);
        for skill in map.values() {
            self.store
                .upsert_skill_usage(agent_id, &skill.name, skill.proficiency as i64, skill.usage_count as i64)
                .await?;
        }
        for name in leveled_up {
            tracing::info!(agent_id = %agent_id, skill = name, "skill leveled up");
        }
        Ok(())
    }

    async fn advance_review_queue(&self) -> Result<(), DaemonError> {
        let Some(step) = self.store.review_queue(1).await?.into_iter().next() else {
            return Ok(());
        };
        let Some(mission) = self.store.get_mission(step.mission_id).await? else {
            return Ok(());
        };
        let Some(author_agent_id) = step.assigned_agent_id else {
            return Ok(());
        };

        let category = roles::route_by_keywords(&step.description);
        let all_active = self.store.list_active_agents().await?;
        let team_agents = self.store.list_agents_by_team(mission.team_id).await?;
        let choice = review::select_reviewer(category, author_agent_id, &all_active, &team_agents);

        let applied = match choice {
            ReviewerChoice::AutoApprove => {
                self.store.set_step_status(step.id, StepStatus::Completed).await?;
                None
            }
            _ => Some(self.run_review_call(&step, author_agent_id, choice).await?),
        };

        if let Some(review::AppliedReview::Rejected { should_upskill: true, .. }) = &applied {
            self.upskill_author(&step, author_agent_id).await?;
        }

        if applied.is_none() || matches!(applied, Some(review::AppliedReview::ApprovedFinal)) {
            self.check_mission_completion(mission.id).await?;
        }
        Ok(())
    }

    async fn run_review_call(
        &self,
        step: &MissionStep,
        author_agent_id: Uuid,
        choice: ReviewerChoice,
    ) -> Result<review::AppliedReview, DaemonError> {
        let reviewer_agent_id = match choice {
            ReviewerChoice::DomainExpert { agent_id } => agent_id,
            ReviewerChoice::TeamQa { agent_id } => agent_id,
            ReviewerChoice::TeamLead { agent_id } => agent_id,
            ReviewerChoice::AutoApprove => unreachable!("handled by caller"),
        };
        let system_prompt = self
            .store
            .latest_persona(reviewer_agent_id)
            .await?
            .map(|p| p.system_prompt)
            .unwrap_or_default();
        let user_message = format!(
            "{}\n\n## DELIVERABLE\n{}",
            review::REVIEW_RUBRIC_PROMPT,
            step.result.clone().unwrap_or_default()
        );

        let outcome = self
            .router
            .call_llm(&system_prompt, &user_message, cadre_core::types::ModelTier::T1, Some(reviewer_agent_id), Some(step.id))
            .await;

        let (scores, stated_verdict, feedback) = match outcome {
            Ok(route) => review::parse_rubric_response(&route.content),
            Err(_) => (review::RubricScores::default(), Verdict::Reject, "reviewer call failed".to_string()),
        };
        let scored = review::score_review(scores, stated_verdict);

        self.store
            .insert_approval(&cadre_core::types::Approval {
                id: Uuid::new_v4(),
                mission_step_id: step.id,
                reviewer_agent_id,
                review_type: choice.review_type(),
                status: if scored.verdict == Verdict::Approve {
                    cadre_core::types::ApprovalStatus::Approved
                } else {
                    cadre_core::types::ApprovalStatus::Rejected
                },
                feedback: Some(feedback.clone()),
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
            .await?;

        let chain = ReviewChain::new(&self.store);
        Ok(chain
            .apply_outcome(step, author_agent_id, choice.review_type(), scored, &feedback)
            .await?)
    }

    async fn check_mission_completion(&self, mission_id: Uuid) -> Result<(), DaemonError> {
        MissionEngine::new(&self.store).check_mission_completion(mission_id).await?;
        Ok(())
    }

    /// Persona upskilling (§4.4): a step rejected `UPSKILL_REJECTION_THRESHOLD`
    /// times triggers a tier-1 call that turns the accumulated rejection
    /// feedback into a skill gap and a persona addition.
    async fn upskill_author(&self, step: &MissionStep, author_agent_id: Uuid) -> Result<(), DaemonError> {
        let Some(mut agent) = self.store.get_agent(author_agent_id).await? else {
            return Ok(());
        };
        let approvals = self.store.approvals_for_step(step.id).await?;
        let feedback: String = approvals
            .iter()
            .filter(|a| a.status == cadre_core::types::ApprovalStatus::Rejected)
            .filter_map(|a| a.feedback.as_deref())
            .collect::<Vec<_>>()
            .join("\n---\n");

        let prompt = format!(
            "This agent's work has been rejected {} times on the same task. \
             Read the accumulated reviewer feedback below and name one concrete skill gap and \
             one sentence to add to the agent's persona to close it. \
             Respond with ONLY JSON: {{\"skill_gap\": \"...\", \"expertise_addition\": \"...\"}}.\n\nFEEDBACK:\n{}",
            review::UPSKILL_REJECTION_THRESHOLD, feedback
        );
        let messages = vec![
            cadre_intelligence::llm::LlmMessage::system("You output only valid JSON, nothing else."),
            cadre_intelligence::llm::LlmMessage::user(prompt),
        ];
        let config = cadre_intelligence::llm::LlmConfig::default();
        let response = match self.router.provider().complete(&messages, &config).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(agent_id = %author_agent_id, error = %e, "upskill call failed");
                return Ok(());
            }
        };

        #[derive(serde::Deserialize)]
        struct UpskillPlan {
            skill_gap: String,
            expertise_addition: String,
        }
        let Ok(plan) = serde_json::from_str::<UpskillPlan>(response.content.trim()) else {
            tracing::warn!(agent_id = %author_agent_id, "upskill response was not valid JSON");
            return Ok(());
        };

        persona::upskill_persona(&self.store, &mut agent, &plan.skill_gap, &plan.expertise_addition).await?;
        self.store
            .insert_event(&cadre_core::types::Event {
                id: Uuid::new_v4(),
                event_type: "agent_upskilled".into(),
                severity: cadre_core::types::Severity::Info,
                description: format!("{} upskilled: {}", agent.display_name, plan.skill_gap),
                data: Some(serde_json::json!({
                    "agent_id": author_agent_id,
                    "skill_gap": plan.skill_gap,
                })),
                processed: false,
                created_at: chrono::Utc::now(),
            })
            .await?;
        cadre_intelligence::memory::save_memory(
            &self.store,
            author_agent_id,
            cadre_core::types::MemoryType::Lesson,
            format!("Upskilled: {}", plan.expertise_addition),
            vec!["upskilled".to_string(), plan.skill_gap.clone()],
            9,
        )
        .await?;
        tracing::info!(agent_id = %author_agent_id, skill_gap = %plan.skill_gap, "agent upskilled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_core::types::MissionStatus;
    use cadre_intelligence::llm::MockProvider;
    use cadre_intelligence::model_router::TierModels;

    async fn store() -> Arc<Store> {
        Arc::new(Store::new_in_memory().await.unwrap())
    }

    fn executor(store: Arc<Store>) -> Executor {
        let provider = Arc::new(MockProvider::new());
        let router = Arc::new(ModelRouter::new(
            provider,
            TierModels { t1: "t1".into(), t2: "t2".into(), t3: "t3".into() },
            store.clone(),
        ));
        let tools = Arc::new(cadre_daemon_tool_resolver());
        Executor::new(store, router, tools, Arc::new(HealthState::new("executor")))
    }

    fn cadre_daemon_tool_resolver() -> ToolResolver {
        crate::build_tool_resolver()
    }

    fn step(mission_id: Uuid, status: StepStatus) -> MissionStep {
        MissionStep {
            id: Uuid::new_v4(),
            mission_id,
            description: "write the thing".into(),
            assigned_agent_id: Some(Uuid::new_v4()),
            model_tier: cadre_core::types::ModelTier::T1,
            step_order: 0,
            parent_step_id: None,
            status,
            result: Some("draft".into()),
            error: None,
            announced: false,
            processed: false,
            started_at: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn team(id: Uuid) -> cadre_core::types::Team {
        cadre_core::types::Team { id, name: "Eng".into(), status: cadre_core::types::TeamStatus::Active, lead_agent_id: None, created_at: chrono::Utc::now(), updated_at: chrono::Utc::now() }
    }

    fn mission(team_id: Uuid) -> cadre_core::types::Mission {
        cadre_core::types::Mission {
            id: Uuid::new_v4(),
            proposal_id: Uuid::new_v4(),
            team_id,
            title: "Ship it".into(),
            status: MissionStatus::InProgress,
            completed_at: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn tick_is_a_noop_against_an_empty_store() {
        let store = store().await;
        let exec = executor(store.clone());
        exec.tick().await.unwrap();
    }

    #[tokio::test]
    async fn check_mission_completion_marks_mission_completed_when_all_steps_done() {
        let store = store().await;
        let exec = executor(store.clone());
        let t = team(Uuid::new_v4());
        store.upsert_team(&t).await.unwrap();
        let m = mission(t.id);
        store.insert_mission(&m).await.unwrap();
        let s = step(m.id, StepStatus::Completed);
        store.insert_step(&s).await.unwrap();

        exec.check_mission_completion(m.id).await.unwrap();

        let reloaded = store.get_mission(m.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, MissionStatus::Completed);
    }

    #[tokio::test]
    async fn check_mission_completion_marks_mission_failed_when_any_step_failed() {
        let store = store().await;
        let exec = executor(store.clone());
        let t = team(Uuid::new_v4());
        store.upsert_team(&t).await.unwrap();
        let m = mission(t.id);
        store.insert_mission(&m).await.unwrap();
        store.insert_step(&step(m.id, StepStatus::Completed)).await.unwrap();
        store.insert_step(&step(m.id, StepStatus::Failed)).await.unwrap();

        exec.check_mission_completion(m.id).await.unwrap();

        let reloaded = store.get_mission(m.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, MissionStatus::Failed);
    }

    #[tokio::test]
    async fn check_mission_completion_leaves_mission_open_while_a_step_is_pending() {
        let store = store().await;
        let exec = executor(store.clone());
        let t = team(Uuid::new_v4());
        store.upsert_team(&t).await.unwrap();
        let m = mission(t.id);
        store.insert_mission(&m).await.unwrap();
        store.insert_step(&step(m.id, StepStatus::Completed)).await.unwrap();
        store.insert_step(&step(m.id, StepStatus::Pending)).await.unwrap();

        exec.check_mission_completion(m.id).await.unwrap();

        let reloaded = store.get_mission(m.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, MissionStatus::InProgress);
    }

    #[tokio::test]
    async fn work_pending_step_is_a_noop_against_an_empty_queue() {
        let store = store().await;
        let exec = executor(store.clone());
        exec.work_pending_step().await.unwrap();
        assert!(store.pending_steps(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn work_pending_step_skips_a_step_no_active_agent_can_handle() {
        let store = store().await;
        let exec = executor(store.clone());
        let t = team(Uuid::new_v4());
        store.upsert_team(&t).await.unwrap();
        let m = mission(t.id);
        store.insert_mission(&m).await.unwrap();
        store.insert_step(&step(m.id, StepStatus::Pending)).await.unwrap();

        exec.work_pending_step().await.unwrap();

        let pending = store.pending_steps(10).await.unwrap();
        assert_eq!(pending.len(), 1, "an unclaimable step must stay pending");
    }

    fn agent(id: Uuid, team_id: Uuid) -> cadre_core::types::Agent {
        cadre_core::types::Agent {
            id,
            display_name: "Nova".into(),
            role: "Engineer".into(),
            agent_type: AgentType::SubAgent,
            team_id: Some(team_id),
            status: cadre_core::types::AgentStatus::Active,
            persona_version_id: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn upskill_author_applies_the_llm_plan_and_leaves_a_memory_and_event() {
        let store = store().await;
        let provider = Arc::new(MockProvider::new().with_response(cadre_intelligence::llm::LlmResponse {
            content: "{\"skill_gap\": \"citing sources\", \"expertise_addition\": \"Always cite primary sources.\"}".into(),
            model: "t1".into(),
            input_tokens: 10,
            output_tokens: 10,
        }));
        let router = Arc::new(ModelRouter::new(
            provider,
            TierModels { t1: "t1".into(), t2: "t2".into(), t3: "t3".into() },
            store.clone(),
        ));
        let exec = Executor::new(store.clone(), router, Arc::new(cadre_daemon_tool_resolver()), Arc::new(HealthState::new("executor")));

        let t = team(Uuid::new_v4());
        store.upsert_team(&t).await.unwrap();
        let a = agent(Uuid::new_v4(), t.id);
        store.upsert_agent(&a).await.unwrap();
        let m = mission(t.id);
        store.insert_mission(&m).await.unwrap();
        let mut s = step(m.id, StepStatus::InReview);
        s.assigned_agent_id = Some(a.id);
        store.insert_step(&s).await.unwrap();
        store
            .insert_approval(&cadre_core::types::Approval {
                id: Uuid::new_v4(),
                mission_step_id: s.id,
                reviewer_agent_id: Uuid::new_v4(),
                review_type: cadre_core::types::ReviewType::Qa,
                status: cadre_core::types::ApprovalStatus::Rejected,
                feedback: Some("missing citations".into()),
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        exec.upskill_author(&s, a.id).await.unwrap();

        let persona = store.latest_persona(a.id).await.unwrap().unwrap();
        assert!(persona.system_prompt.contains("Always cite primary sources."));
        let memories = store.recent_memory(a.id, 10).await.unwrap();
        assert!(memories.iter().any(|m| m.content.contains("Upskilled")));
    }
}
