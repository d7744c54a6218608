//! Persona generation and versioning (§4.4). Personas are append-only;
//! `savePersona` always inserts a new row and repoints the agent at it.

use cadre_core::store::Store;
use cadre_core::types::{Agent, Persona};
use cadre_core::CoreError;
use chrono::Utc;
use uuid::Uuid;

use crate::llm::{LlmConfig, LlmMessage, LlmProvider};

pub struct PersonaSections {
    pub identity: String,
    pub personality: String,
    pub skills: String,
    pub background: String,
}

const PERSONA_PROMPT_TEMPLATE: &str = "\
Generate a persona for an AI agent with the role \"{role}\". Respond with \
exactly four sections, each on its own line, in this delimited form:

IDENTITY: <one sentence>
PERSONALITY: <one sentence>
SKILLS: <comma separated list>
BACKGROUND: <one or two sentences>
";

fn generic_default(role: &str) -> PersonaSections {
    PersonaSections {
        identity: format!("A capable {role}."),
        personality: "Direct, thorough, and collaborative.".into(),
        skills: "general research, clear writing, careful analysis".into(),
        background: format!("An experienced professional specializing in {role} work."),
    }
}

fn parse_sections(role: &str, response: &str) -> PersonaSections {
    let mut identity = None;
    let mut personality = None;
    let mut skills = None;
    let mut background = None;

    for line in response.lines() {
        if let Some(rest) = line.strip_prefix("IDENTITY:") {
            identity = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("PERSONALITY:") {
            personality = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("SKILLS:") {
            skills = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("BACKGROUND:") {
            background = Some(rest.trim().to_string());
        }
    }

    let fallback = generic_default(role);
    PersonaSections {
        identity: identity.unwrap_or(fallback.identity),
        personality: personality.unwrap_or(fallback.personality),
        skills: skills.unwrap_or(fallback.skills),
        background: background.unwrap_or(fallback.background),
    }
}

fn render_system_prompt(sections: &PersonaSections) -> String {
    format!(
        "You are: {}\n\nPersonality: {}\n\nSkills: {}\n\nBackground: {}",
        sections.identity, sections.personality, sections.skills, sections.background
    )
}

/// Generates a persona via a single LLM call. On LLM failure a hardcoded
/// generic persona is used so the agent is never left unserviceable.
pub async fn generate_persona(provider: &dyn LlmProvider, role: &str) -> PersonaSections {
    let prompt = PERSONA_PROMPT_TEMPLATE.replace("{role}", role);
    let result = provider
        .complete(&[LlmMessage::user(prompt)], &LlmConfig::default())
        .await;
    match result {
        Ok(resp) => parse_sections(role, &resp.content),
        Err(_) => generic_default(role),
    }
}

pub async fn save_persona(
    store: &Store,
    agent: &mut Agent,
    sections: PersonaSections,
) -> Result<Persona, CoreError> {
    let previous_version = store
        .latest_persona(agent.id)
        .await?
        .map(|p| p.version)
        .unwrap_or(0);

    let persona = Persona {
        id: Uuid::new_v4(),
        agent_id: agent.id,
        version: previous_version + 1,
        identity: sections.identity,
        personality: sections.personality,
        skills: sections.skills,
        background: sections.background,
        system_prompt: String::new(),
        created_at: Utc::now(),
    };
    let mut persona = persona;
    persona.system_prompt = render_system_prompt(&PersonaSections {
        identity: persona.identity.clone(),
        personality: persona.personality.clone(),
        skills: persona.skills.clone(),
        background: persona.background.clone(),
    });

    store.insert_persona(&persona).await?;
    agent.persona_version_id = Some(persona.id);
    agent.updated_at = Utc::now();
    store.upsert_agent(agent).await?;
    Ok(persona)
}

/// Upskilling (§4.4): appends a "Learned Expertise" block to a new persona
/// version derived from the agent's most recent one.
pub async fn upskill_persona(
    store: &Store,
    agent: &mut Agent,
    skill_gap: &str,
    expertise_addition: &str,
) -> Result<Persona, CoreError> {
    let current = store.latest_persona(agent.id).await?;
    let (identity, personality, skills, background) = match &current {
        Some(p) => (p.identity.clone(), p.personality.clone(), p.skills.clone(), p.background.clone()),
        None => {
            let fallback = generic_default(&agent.role);
            (fallback.identity, fallback.personality, fallback.skills, fallback.background)
        }
    };

    let learned_block = format!(
        "\n\n## Learned Expertise\nGap identified: {skill_gap}\nNew capability: {expertise_addition}"
    );

    let previous_version = current.map(|p| p.version).unwrap_or(0);
    let mut persona = Persona {
        id: Uuid::new_v4(),
        agent_id: agent.id,
        version: previous_version + 1,
        identity: identity.clone(),
        personality: personality.clone(),
        skills: format!("{skills}, {expertise_addition}"),
        background: background.clone(),
        system_prompt: String::new(),
        created_at: Utc::now(),
    };
    persona.system_prompt = format!(
        "{}{}",
        render_system_prompt(&PersonaSections {
            identity,
            personality,
            skills: persona.skills.clone(),
            background,
        }),
        learned_block
    );

    store.insert_persona(&persona).await?;
    agent.persona_version_id = Some(persona.id);
    agent.updated_at = Utc::now();
    store.upsert_agent(agent).await?;
    Ok(persona)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, MockProvider};
    use cadre_core::types::{AgentStatus, AgentType};

    fn test_agent() -> Agent {
        Agent {
            id: Uuid::new_v4(),
            display_name: "Nova".into(),
            role: "Researcher".into(),
            agent_type: AgentType::SubAgent,
            team_id: None,
            status: AgentStatus::Active,
            persona_version_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn generate_persona_falls_back_on_llm_failure() {
        let provider = MockProvider::new().with_error("down");
        let sections = generate_persona(&provider, "Researcher").await;
        assert!(sections.identity.contains("Researcher"));
    }

    #[test]
    fn parse_sections_handles_missing_fields() {
        let sections = parse_sections("Researcher", "IDENTITY: A sharp researcher.\n");
        assert_eq!(sections.identity, "A sharp researcher.");
        assert!(sections.personality.contains("Direct"));
    }

    #[tokio::test]
    async fn save_persona_increments_version_and_repoints_agent() {
        let store = Store::new_in_memory().await.unwrap();
        let mut agent = test_agent();
        store.upsert_agent(&agent).await.unwrap();

        let first = save_persona(&store, &mut agent, generic_default(&agent.role)).await.unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(agent.persona_version_id, Some(first.id));

        let second = save_persona(&store, &mut agent, generic_default(&agent.role)).await.unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(agent.persona_version_id, Some(second.id));
    }

    #[tokio::test]
    async fn upskill_persona_appends_learned_expertise_block() {
        let store = Store::new_in_memory().await.unwrap();
        let mut agent = test_agent();
        store.upsert_agent(&agent).await.unwrap();
        save_persona(&store, &mut agent, generic_default(&agent.role)).await.unwrap();

        let upskilled = upskill_persona(&store, &mut agent, "citation hygiene", "rigorous source vetting")
            .await
            .unwrap();
        assert!(upskilled.system_prompt.contains("Learned Expertise"));
        assert!(upskilled.skills.contains("rigorous source vetting"));
    }

    #[test]
    fn mock_response_not_used_when_unset() {
        // sanity check that MockProvider's default path doesn't panic the parser
        let resp = LlmResponse {
            content: "IDENTITY: x\nPERSONALITY: y\nSKILLS: z\nBACKGROUND: w".into(),
            model: "m".into(),
            input_tokens: 1,
            output_tokens: 1,
        };
        let sections = parse_sections("Researcher", &resp.content);
        assert_eq!(sections.skills, "z");
    }
}
