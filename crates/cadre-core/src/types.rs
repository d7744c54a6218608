//! The relational data model — §3 of the design.
//!
//! Every entity here carries `created_at` and, where mutable, `updated_at`.
//! Rows are never deleted by the engine; lifetimes end only through
//! explicit status transitions (`Agent::status`, `MissionStep::status`, …).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    Active,
    Dormant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub status: TeamStatus,
    pub lead_agent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: TeamStatus::Active,
            lead_agent_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    ChiefOfStaff,
    TeamLead,
    Qa,
    SubAgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Dormant,
    Retired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub display_name: String,
    pub role: String,
    pub agent_type: AgentType,
    pub team_id: Option<Uuid>,
    pub status: AgentStatus,
    pub persona_version_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}

// ---------------------------------------------------------------------------
// Name pool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamePoolEntry {
    pub name: String,
    pub source: String,
    pub assigned: bool,
    pub assigned_to: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Persona
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub version: i64,
    pub identity: String,
    pub personality: String,
    pub skills: String,
    pub background: String,
    pub system_prompt: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Hiring proposal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HiringStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiringProposal {
    pub id: Uuid,
    pub role_title: String,
    pub target_team_id: Uuid,
    pub justification: String,
    pub status: HiringStatus,
    pub announced: bool,
    pub triggering_proposal_id: Option<Uuid>,
    pub created_agent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Mission proposal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Deferred,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionProposal {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub proposing_agent: Option<Uuid>,
    pub raw_message: Option<String>,
    pub status: ProposalStatus,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Mission
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub team_id: Uuid,
    pub title: String,
    pub status: MissionStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Mission step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    T1,
    T2,
    T3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    InReview,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionStep {
    pub id: Uuid,
    pub mission_id: Uuid,
    pub description: String,
    pub assigned_agent_id: Option<Uuid>,
    pub model_tier: ModelTier,
    pub step_order: i64,
    pub parent_step_id: Option<Uuid>,
    pub status: StepStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub announced: bool,
    pub processed: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Approval
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    Qa,
    TeamLead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: Uuid,
    pub mission_step_id: Uuid,
    pub reviewer_agent_id: Uuid,
    pub review_type: ReviewType,
    pub status: ApprovalStatus,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Agent memory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Task,
    Conversation,
    Observation,
    Decision,
    Lesson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMemory {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub memory_type: MemoryType,
    pub content: String,
    pub summary: Option<String>,
    pub topic_tags: Vec<String>,
    pub importance: i32,
    pub source_type: Option<String>,
    pub source_id: Option<Uuid>,
    pub related_agent_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Lesson
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub text: String,
    pub category: String,
    pub importance: i32,
    pub applied_count: i64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Agent skills
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub name: String,
    pub proficiency: i64,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Decision log / conversation history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: String,
    pub severity: Severity,
    pub description: String,
    pub data: Option<serde_json::Value>,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Model usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelUsage {
    pub id: Uuid,
    pub agent_id: Option<Uuid>,
    pub step_id: Option<Uuid>,
    pub model_name: String,
    pub tier: ModelTier,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub estimated_cost: f64,
    pub latency_ms: i64,
    pub success: bool,
    pub error: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub id: Uuid,
    pub component: String,
    pub status: HealthStatus,
    pub latency_ms: i64,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    SpendingLimit,
    ModelRouting,
    OperatingHours,
    DailySummary,
    CostAlert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub policy_type: PolicyType,
    pub version: i64,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_new_defaults_active() {
        let t = Team::new("team-research");
        assert_eq!(t.status, TeamStatus::Active);
        assert!(t.lead_agent_id.is_none());
    }

    #[test]
    fn agent_is_active_checks_status() {
        let mut a = Agent {
            id: Uuid::new_v4(),
            display_name: "Nova".into(),
            role: "Researcher".into(),
            agent_type: AgentType::SubAgent,
            team_id: None,
            status: AgentStatus::Active,
            persona_version_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(a.is_active());
        a.status = AgentStatus::Retired;
        assert!(!a.is_active());
    }

    #[test]
    fn enums_roundtrip_through_json() {
        let tier = ModelTier::T2;
        let json = serde_json::to_string(&tier).unwrap();
        assert_eq!(json, "\"t2\"");
        let back: ModelTier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tier);
    }
}
