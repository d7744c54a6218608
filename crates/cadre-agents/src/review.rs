//! Review and approval chain (§4.9).
//!
//! Reviewer selection, the fixed five-criteria rubric, auto-rejection on a
//! low average score, and the rejection-counter wiring into persona
//! upskilling (§4.4) at exactly the fifth rejection.

use cadre_core::store::Store;
use cadre_core::types::{
    AgentMemory, Agent, MemoryType, MissionStep, ReviewType,
};
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::roles;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Core(#[from] cadre_core::CoreError),
}

/// The step count at which the upskilling loop fires — strictly once per
/// chronic failure (§4.4: "trigger is strictly on count=5").
pub const UPSKILL_REJECTION_THRESHOLD: i64 = 5;

#[derive(Debug, Clone, Copy)]
pub enum ReviewerChoice {
    DomainExpert { agent_id: Uuid },
    TeamQa { agent_id: Uuid },
    TeamLead { agent_id: Uuid },
    AutoApprove,
}

/// Selects the reviewer for a step now in `in_review`, in priority order:
/// 1. a domain expert (any active agent, any team, whose role matches the
///    step's routed category, excluding the step's author) — reviewed as
///    `team_lead`;
/// 2. else the step's team QA (role contains "qa");
/// 3. else the team lead;
/// 4. else auto-approve.
pub fn select_reviewer(
    category: &str,
    author_agent_id: Uuid,
    all_active_agents: &[Agent],
    team_agents: &[Agent],
) -> ReviewerChoice {
    let keywords = roles::CATEGORY_KEYWORDS
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, kw)| *kw)
        .unwrap_or(&[]);

    if let Some(expert) = all_active_agents.iter().find(|a| {
        a.id != author_agent_id
            && keywords.iter().any(|kw| a.role.to_lowercase().contains(kw))
    }) {
        return ReviewerChoice::DomainExpert { agent_id: expert.id };
    }

    if let Some(qa) = team_agents
        .iter()
        .find(|a| a.id != author_agent_id && a.role.to_lowercase().contains("qa"))
    {
        return ReviewerChoice::TeamQa { agent_id: qa.id };
    }

    if let Some(lead) = team_agents
        .iter()
        .find(|a| a.id != author_agent_id && a.agent_type == cadre_core::types::AgentType::TeamLead)
    {
        return ReviewerChoice::TeamLead { agent_id: lead.id };
    }

    ReviewerChoice::AutoApprove
}

impl ReviewerChoice {
    pub fn review_type(&self) -> ReviewType {
        match self {
            ReviewerChoice::DomainExpert { .. } => ReviewType::TeamLead,
            ReviewerChoice::TeamQa { .. } => ReviewType::Qa,
            ReviewerChoice::TeamLead { .. } => ReviewType::TeamLead,
            ReviewerChoice::AutoApprove => ReviewType::TeamLead,
        }
    }
}

/// The fixed five-criteria rubric, each scored 1–5. A missing criterion is
/// treated as 3 (§4.9).
#[derive(Debug, Clone, Copy, Default)]
pub struct RubricScores {
    pub completeness: Option<u8>,
    pub accuracy: Option<u8>,
    pub quality: Option<u8>,
    pub depth: Option<u8>,
    pub domain_specificity: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    Reject,
}

pub struct ReviewOutcome {
    pub verdict: Verdict,
    pub average_score: f64,
}

/// Parses a reviewer's stated verdict and rubric against the fixed scores,
/// applying the auto-rejection rule: average < 3 forces `reject`
/// regardless of the stated verdict.
pub fn score_review(scores: RubricScores, stated_verdict: Verdict) -> ReviewOutcome {
    let filled = [
        scores.completeness.unwrap_or(3),
        scores.accuracy.unwrap_or(3),
        scores.quality.unwrap_or(3),
        scores.depth.unwrap_or(3),
        scores.domain_specificity.unwrap_or(3),
    ];
    let average = filled.iter().map(|&s| s as f64).sum::<f64>() / filled.len() as f64;
    let verdict = if average < 3.0 { Verdict::Reject } else { stated_verdict };
    ReviewOutcome { verdict, average_score: average }
}

/// Fixed rubric prompt appended to the step result for the reviewer's
/// model call. Scores and a plain-text verdict are expected back,
/// delimited, and parsed by `parse_rubric_response`.
pub const REVIEW_RUBRIC_PROMPT: &str = "\
Score this deliverable on five criteria, each 1-5:
COMPLETENESS: <1-5>
ACCURACY: <1-5>
QUALITY: <1-5>
DEPTH: <1-5>
DOMAIN_SPECIFICITY: <1-5>
VERDICT: approve|reject
FEEDBACK: <one paragraph>";

pub fn parse_rubric_response(text: &str) -> (RubricScores, Verdict, String) {
    let mut scores = RubricScores::default();
    let mut verdict = Verdict::Reject;
    let mut feedback = String::new();

    for line in text.lines() {
        let line = line.trim();
        let Some((key, value)) = line.split_once(':') else { continue };
        let key = key.trim().to_uppercase();
        let value = value.trim();
        match key.as_str() {
            "COMPLETENESS" => scores.completeness = value.parse().ok(),
            "ACCURACY" => scores.accuracy = value.parse().ok(),
            "QUALITY" => scores.quality = value.parse().ok(),
            "DEPTH" => scores.depth = value.parse().ok(),
            "DOMAIN_SPECIFICITY" => scores.domain_specificity = value.parse().ok(),
            "VERDICT" => {
                verdict = if value.to_lowercase().starts_with("approve") {
                    Verdict::Approve
                } else {
                    Verdict::Reject
                };
            }
            "FEEDBACK" => feedback = value.to_string(),
            _ => {}
        }
    }
    (scores, verdict, feedback)
}

pub struct ReviewChain<'a> {
    pub store: &'a Store,
}

impl<'a> ReviewChain<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Applies the outcome of a submitted review (§4.9 `submitReview`):
    /// - reject → `sendBackForRevision`, a high-importance lesson for the
    ///   author, and a count of that author's rejections on this step so
    ///   the caller can decide whether to trigger upskilling.
    /// - approve + `team_lead` → `approveStep` then
    ///   `checkMissionCompletion` is the caller's responsibility.
    /// - approve + `qa` → nothing further; the dispatcher schedules the
    ///   team-lead review on its next tick.
    pub async fn apply_outcome(
        &self,
        step: &MissionStep,
        author_agent_id: Uuid,
        review_type: ReviewType,
        outcome: ReviewOutcome,
        feedback: &str,
    ) -> Result<AppliedReview, ReviewError> {
        match outcome.verdict {
            Verdict::Reject => {
                self.store.send_back_for_revision(step.id).await?;
                let memory = AgentMemory {
                    id: Uuid::new_v4(),
                    agent_id: author_agent_id,
                    memory_type: MemoryType::Lesson,
                    content: feedback.to_string(),
                    summary: Some("Step rejected on review".to_string()),
                    topic_tags: vec!["quality".to_string()],
                    importance: 8,
                    source_type: Some("review_rejection".to_string()),
                    source_id: Some(step.id),
                    related_agent_ids: vec![],
                    created_at: Utc::now(),
                };
                self.store.insert_memory(&memory).await?;
                let rejection_count = self.store.count_rejections(step.id).await?;
                Ok(AppliedReview::Rejected {
                    rejection_count,
                    should_upskill: rejection_count == UPSKILL_REJECTION_THRESHOLD,
                })
            }
            Verdict::Approve if review_type == ReviewType::TeamLead => {
                self.store.set_step_status(step.id, cadre_core::types::StepStatus::Completed).await?;
                Ok(AppliedReview::ApprovedFinal)
            }
            Verdict::Approve => Ok(AppliedReview::ApprovedAwaitingTeamLead),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedReview {
    Rejected { rejection_count: i64, should_upskill: bool },
    ApprovedFinal,
    ApprovedAwaitingTeamLead,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_core::types::{AgentStatus, AgentType, ModelTier, StepStatus};

    fn agent(id: Uuid, role: &str, agent_type: AgentType) -> Agent {
        Agent {
            id,
            display_name: "Test".into(),
            role: role.into(),
            agent_type,
            team_id: None,
            status: AgentStatus::Active,
            persona_version_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn select_reviewer_prefers_domain_expert_over_team_qa() {
        let author = Uuid::new_v4();
        let expert = agent(Uuid::new_v4(), "Research Analyst", AgentType::SubAgent);
        let qa = agent(Uuid::new_v4(), "QA Reviewer", AgentType::Qa);
        let choice = select_reviewer("research", author, &[expert.clone(), qa.clone()], &[qa]);
        assert!(matches!(choice, ReviewerChoice::DomainExpert { agent_id } if agent_id == expert.id));
    }

    #[test]
    fn select_reviewer_falls_back_to_team_qa() {
        let author = Uuid::new_v4();
        let qa = agent(Uuid::new_v4(), "QA Reviewer", AgentType::Qa);
        let choice = select_reviewer("engineering", author, &[qa.clone()], &[qa.clone()]);
        assert!(matches!(choice, ReviewerChoice::TeamQa { agent_id } if agent_id == qa.id));
    }

    #[test]
    fn select_reviewer_falls_back_to_auto_approve() {
        let author = Uuid::new_v4();
        let choice = select_reviewer("engineering", author, &[], &[]);
        assert!(matches!(choice, ReviewerChoice::AutoApprove));
    }

    #[test]
    fn score_review_forces_reject_below_average_three() {
        let scores = RubricScores {
            completeness: Some(2),
            accuracy: Some(2),
            quality: Some(2),
            depth: Some(2),
            domain_specificity: Some(2),
        };
        let outcome = score_review(scores, Verdict::Approve);
        assert_eq!(outcome.verdict, Verdict::Reject);
    }

    #[test]
    fn score_review_missing_criteria_default_to_three() {
        let scores = RubricScores { completeness: Some(5), ..Default::default() };
        let outcome = score_review(scores, Verdict::Approve);
        assert!((outcome.average_score - 3.4).abs() < 1e-9);
    }

    #[test]
    fn parse_rubric_response_extracts_all_fields() {
        let text = "COMPLETENESS: 4\nACCURACY: 5\nQUALITY: 4\nDEPTH: 3\nDOMAIN_SPECIFICITY: 5\nVERDICT: approve\nFEEDBACK: Solid work.";
        let (scores, verdict, feedback) = parse_rubric_response(text);
        assert_eq!(scores.accuracy, Some(5));
        assert_eq!(verdict, Verdict::Approve);
        assert_eq!(feedback, "Solid work.");
    }

    #[tokio::test]
    async fn apply_outcome_upskills_exactly_on_fifth_rejection() {
        let store = Store::new_in_memory().await.unwrap();
        let chain = ReviewChain::new(&store);
        let author = Uuid::new_v4();
        let reviewer = Uuid::new_v4();

        let mission_id = Uuid::new_v4();
        let step = MissionStep {
            id: Uuid::new_v4(),
            mission_id,
            description: "do it".into(),
            assigned_agent_id: Some(author),
            model_tier: ModelTier::T1,
            step_order: 0,
            parent_step_id: None,
            status: StepStatus::InReview,
            result: Some("draft".into()),
            error: None,
            announced: false,
            processed: true,
            started_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_step(&step).await.unwrap();

        let mut last = AppliedReview::ApprovedFinal;
        for _ in 0..5 {
            store.insert_approval(&cadre_core::types::Approval {
                id: Uuid::new_v4(),
                mission_step_id: step.id,
                reviewer_agent_id: reviewer,
                review_type: ReviewType::Qa,
                status: cadre_core::types::ApprovalStatus::Rejected,
                feedback: Some("needs work".into()),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }).await.unwrap();
            let outcome = score_review(RubricScores::default(), Verdict::Reject);
            last = chain
                .apply_outcome(&step, author, ReviewType::Qa, outcome, "needs work")
                .await
                .unwrap();
        }
        assert!(matches!(last, AppliedReview::Rejected { rejection_count: 5, should_upskill: true }));
    }
}
