//! Agent registry and hiring (§4.2).

use chrono::Utc;
use cadre_core::store::Store;
use cadre_core::types::{
    Agent, AgentStatus, AgentType, HiringProposal, HiringStatus,
};
use thiserror::Error;
use uuid::Uuid;

use crate::roles;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("name pool exhausted")]
    NamePoolExhausted,
    #[error(transparent)]
    Core(#[from] cadre_core::CoreError),
}

pub struct CreateAgentParams {
    pub role: String,
    pub team_id: Option<Uuid>,
    pub agent_type: AgentType,
    pub preferred_source: Option<String>,
}

pub struct AgentRegistry<'a> {
    pub store: &'a Store,
}

impl<'a> AgentRegistry<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Atomically: pick a random unassigned name (preferring
    /// `preferred_source` when one is given), insert the agent row, mark
    /// the pool entry assigned. `NamePoolExhausted` when none remain.
    ///
    /// The store's `claim_name` already releases the claim on insert
    /// failure by virtue of never having committed the agent row — there
    /// is nothing left to roll back on our side.
    pub async fn create_agent(&self, params: CreateAgentParams) -> Result<Agent, RegistryError> {
        let id = Uuid::new_v4();
        let name = self
            .store
            .claim_name(id, params.preferred_source.as_deref())
            .await?
            .ok_or(RegistryError::NamePoolExhausted)?;

        let now = Utc::now();
        let agent = Agent {
            id,
            display_name: name,
            role: params.role,
            agent_type: params.agent_type,
            team_id: params.team_id,
            status: AgentStatus::Active,
            persona_version_id: None,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_agent(&agent).await?;
        for skill_name in cadre_intelligence::skills::initial_skills_for_role(&agent.role) {
            self.store
                .insert_skill(&cadre_core::types::AgentSkill {
                    id: Uuid::new_v4(),
                    agent_id: agent.id,
                    name: skill_name.to_string(),
                    proficiency: 1,
                    usage_count: 0,
                    created_at: now,
                    updated_at: now,
                })
                .await?;
        }
        tracing::info!(agent_id = %agent.id, name = %agent.display_name, role = %agent.role, "agent hired");
        Ok(agent)
    }

    /// On transition to `retired`, the name-pool entry is released so the
    /// name can be reused by a future hire.
    pub async fn set_agent_status(&self, agent_id: Uuid, status: AgentStatus) -> Result<(), RegistryError> {
        let Some(mut agent) = self.store.get_agent(agent_id).await? else {
            return Ok(());
        };
        agent.status = status;
        agent.updated_at = Utc::now();
        self.store.upsert_agent(&agent).await?;
        if status == AgentStatus::Retired {
            self.store.release_name(agent_id).await?;
        }
        Ok(())
    }

    /// Idempotent per (role, team, pending): a duplicate request for the
    /// same role and team while one is still pending is a no-op that
    /// returns the existing proposal.
    pub async fn create_hiring_proposal(
        &self,
        role_title: impl Into<String>,
        target_team_id: Uuid,
        justification: impl Into<String>,
        triggering_proposal_id: Option<Uuid>,
    ) -> Result<HiringProposal, RegistryError> {
        let role_title = role_title.into();
        let pending = self.store.list_pending_hiring_proposals().await?;
        if let Some(existing) = pending
            .iter()
            .find(|p| p.role_title == role_title && p.target_team_id == target_team_id)
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let proposal = HiringProposal {
            id: Uuid::new_v4(),
            role_title,
            target_team_id,
            justification: justification.into(),
            status: HiringStatus::Pending,
            announced: false,
            triggering_proposal_id,
            created_agent_id: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_hiring_proposal(&proposal).await?;
        Ok(proposal)
    }

    pub async fn approve_hiring_proposal(&self, id: Uuid) -> Result<(), RegistryError> {
        self.store
            .update_hiring_status(id, HiringStatus::Approved, None)
            .await?;
        Ok(())
    }

    pub async fn reject_hiring_proposal(&self, id: Uuid) -> Result<(), RegistryError> {
        self.store
            .update_hiring_status(id, HiringStatus::Rejected, None)
            .await?;
        Ok(())
    }

    /// Completes an approved hiring proposal: creates the agent, transitions
    /// the proposal to `completed`, and returns the new agent so the caller
    /// can generate a persona (§4.4), initialize skills (§4.5), and
    /// re-queue the triggering mission-proposal.
    pub async fn complete_hiring(&self, proposal: &HiringProposal) -> Result<Agent, RegistryError> {
        let agent = self
            .create_agent(CreateAgentParams {
                role: proposal.role_title.clone(),
                team_id: Some(proposal.target_team_id),
                agent_type: AgentType::SubAgent,
                preferred_source: None,
            })
            .await?;
        self.store
            .update_hiring_status(proposal.id, HiringStatus::Completed, Some(agent.id))
            .await?;
        Ok(agent)
    }

    /// Immediate, no-approval hire used when a required role has no active
    /// agent anywhere. Places the agent on the category's standing team.
    /// Returns `None` when the name pool is exhausted — the caller then
    /// falls back to `create_hiring_proposal`.
    pub async fn auto_hire_gap_agent(
        &self,
        role_title: &str,
        category: &str,
        team_lookup: impl Fn(&str) -> Option<Uuid>,
    ) -> Result<Option<Agent>, RegistryError> {
        let standing_team = roles::standing_team_for(category);
        let Some(team_id) = team_lookup(standing_team) else {
            return Ok(None);
        };
        match self
            .create_agent(CreateAgentParams {
                role: role_title.to_string(),
                team_id: Some(team_id),
                agent_type: AgentType::SubAgent,
                preferred_source: None,
            })
            .await
        {
            Ok(agent) => Ok(Some(agent)),
            Err(RegistryError::NamePoolExhausted) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// One of the 2–5 roles produced by `determine_dynamic_project_roles`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProjectRole {
    pub title: String,
    pub category: String,
    pub reason: String,
}

/// LLM-assisted role determination (single tier-1 call). On invalid JSON,
/// an empty response, or an invalid category, falls back to keyword-based
/// category detection with canned titles.
pub async fn determine_dynamic_project_roles(
    provider: &dyn cadre_intelligence::llm::LlmProvider,
    project_description: &str,
    config: &cadre_intelligence::llm::LlmConfig,
) -> Vec<ProjectRole> {
    let prompt = format!(
        "Given this project description, propose 2-5 roles needed to execute it. \
         Respond with ONLY a JSON array of objects: [{{\"title\": \"...\", \"category\": \"...\", \"reason\": \"...\"}}]. \
         category must be one of: research, strategy, content, engineering, qa, marketing, knowledge.\n\n\
         PROJECT: {project_description}"
    );
    let messages = vec![
        cadre_intelligence::llm::LlmMessage::system("You output only valid JSON, nothing else."),
        cadre_intelligence::llm::LlmMessage::user(prompt),
    ];

    let response = match provider.complete(&messages, config).await {
        Ok(r) => r,
        Err(_) => return fallback_roles(project_description),
    };

    match serde_json::from_str::<Vec<ProjectRole>>(response.content.trim()) {
        Ok(parsed) if !parsed.is_empty() && parsed.iter().all(|r| roles::CATEGORIES.contains(&r.category.as_str())) => {
            parsed.into_iter().take(5).collect()
        }
        _ => fallback_roles(project_description),
    }
}

fn fallback_roles(project_description: &str) -> Vec<ProjectRole> {
    let category = roles::route_by_keywords(project_description);
    vec![ProjectRole {
        title: roles::canned_title_for(category).to_string(),
        category: category.to_string(),
        reason: "keyword-detected fallback".to_string(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_intelligence::llm::MockProvider;

    async fn store() -> Store {
        Store::new_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn create_agent_fails_with_name_pool_exhausted() {
        let store = store().await;
        let registry = AgentRegistry::new(&store);
        let err = registry
            .create_agent(CreateAgentParams {
                role: "Researcher".into(),
                team_id: None,
                agent_type: AgentType::SubAgent,
                preferred_source: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NamePoolExhausted));
    }

    #[tokio::test]
    async fn create_agent_claims_a_seeded_name() {
        let store = store().await;
        store.seed_name_pool(vec![("Nova".into(), "seed".into())]).await.unwrap();
        let registry = AgentRegistry::new(&store);
        let agent = registry
            .create_agent(CreateAgentParams {
                role: "Researcher".into(),
                team_id: None,
                agent_type: AgentType::SubAgent,
                preferred_source: None,
            })
            .await
            .unwrap();
        assert_eq!(agent.display_name, "Nova");
    }

    #[tokio::test]
    async fn create_hiring_proposal_is_idempotent_while_pending() {
        let store = store().await;
        let registry = AgentRegistry::new(&store);
        let team_id = Uuid::new_v4();
        let first = registry
            .create_hiring_proposal("Engineer", team_id, "need one", None)
            .await
            .unwrap();
        let second = registry
            .create_hiring_proposal("Engineer", team_id, "need one still", None)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn auto_hire_gap_agent_returns_none_when_team_lookup_fails() {
        let store = store().await;
        store.seed_name_pool(vec![("Nova".into(), "seed".into())]).await.unwrap();
        let registry = AgentRegistry::new(&store);
        let result = registry
            .auto_hire_gap_agent("Researcher", "research", |_| None)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    fn provider_with(content: &str) -> MockProvider {
        MockProvider::new().with_response(cadre_intelligence::llm::LlmResponse {
            content: content.to_string(),
            model: "test".into(),
            input_tokens: 0,
            output_tokens: 0,
        })
    }

    #[tokio::test]
    async fn determine_dynamic_project_roles_falls_back_on_invalid_category() {
        let provider = provider_with("[{\"title\":\"X\",\"category\":\"nonsense\",\"reason\":\"y\"}]");
        let config = cadre_intelligence::llm::LlmConfig::default();
        let roles = determine_dynamic_project_roles(&provider, "write a blog post", &config).await;
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].category, "content");
    }

    #[tokio::test]
    async fn determine_dynamic_project_roles_accepts_valid_json() {
        let provider = provider_with(
            "[{\"title\":\"Research Analyst\",\"category\":\"research\",\"reason\":\"scope it first\"}]",
        );
        let config = cadre_intelligence::llm::LlmConfig::default();
        let roles = determine_dynamic_project_roles(&provider, "investigate the market", &config).await;
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].title, "Research Analyst");
    }
}
