//! Context builder (§4.7): composes the user-message side of a task
//! prompt from five fixed, ordered blocks. Also houses `build_agent_prompt`
//! (§4.3), which composes the *system*-message side: persona, memory,
//! skills, and the tool-use preamble.

use cadre_core::store::Store;
use cadre_core::types::Agent;
use cadre_core::CoreError;

use crate::skills::Skill;

const QUALITY_MANDATES: &[(&str, &str)] = &[
    (
        "research",
        "YOU ARE the research lead. Find and verify primary sources; synthesize findings into a clear, decision-ready brief. You are the doer, not the advisor; produce the actual deliverable, not instructions for how to produce it.",
    ),
    (
        "strategy",
        "YOU ARE the strategist. Reason about tradeoffs explicitly and commit to a recommendation. You are the doer, not the advisor; produce the actual deliverable, not instructions for how to produce it.",
    ),
    (
        "content",
        "YOU ARE the writer. Produce publication-ready copy, not an outline. You are the doer, not the advisor; produce the actual deliverable, not instructions for how to produce it.",
    ),
    (
        "engineering",
        "YOU ARE the engineer. Write the actual implementation or design, with concrete detail. You are the doer, not the advisor; produce the actual deliverable, not instructions for how to produce it.",
    ),
    (
        "qa",
        "YOU ARE the reviewer. Identify concrete defects and state a clear verdict. You are the doer, not the advisor; produce the actual deliverable, not instructions for how to produce it.",
    ),
    (
        "marketing",
        "YOU ARE the marketer. Produce the actual campaign assets, not a brief about them. You are the doer, not the advisor; produce the actual deliverable, not instructions for how to produce it.",
    ),
    (
        "knowledge",
        "YOU ARE the knowledge manager. Produce the organized reference material itself. You are the doer, not the advisor; produce the actual deliverable, not instructions for how to produce it.",
    ),
];

const GENERIC_MANDATE: &str = "YOU ARE the expert assigned to this task. You are the doer, not the advisor; produce the actual deliverable, not instructions for how to produce it.";

fn quality_mandate_for_role(agent_role: &str) -> &'static str {
    let lower = agent_role.to_lowercase();
    for (category, mandate) in QUALITY_MANDATES {
        if lower.contains(category) {
            return mandate;
        }
    }
    GENERIC_MANDATE
}

const TEMPLATE_KEYWORDS: &[(&str, &[&str])] = &[
    ("research", &["research", "investigate", "survey"]),
    ("strategy", &["strategy", "plan", "roadmap"]),
    ("content", &["blog", "post", "article", "copy"]),
    ("engineering", &["implement", "build", "code", "engineer"]),
    ("requirements", &["requirements", "specification", "spec"]),
];

fn output_template_for(description: &str) -> &'static str {
    let lower = description.to_lowercase();
    let mut best: Option<(&str, usize)> = None;
    for (name, keywords) in TEMPLATE_KEYWORDS {
        let score = keywords.iter().filter(|kw| lower.contains(**kw)).count();
        if score > 0 && best.map(|(_, b)| score > b).unwrap_or(true) {
            best = Some((name, score));
        }
    }
    match best.map(|(name, _)| name) {
        Some("research") => "# Findings\n\n## Key Takeaways\n\n## Sources\n",
        Some("strategy") => "# Recommendation\n\n## Rationale\n\n## Risks\n",
        Some("content") => "# Draft\n\n## Body\n\n## Call to Action\n",
        Some("engineering") => "# Implementation\n\n## Approach\n\n## Code\n\n## Testing Notes\n",
        Some("requirements") => "# Requirements\n\n## Scope\n\n## Acceptance Criteria\n",
        _ => "# Deliverable\n\n## Summary\n\n## Details\n",
    }
}

const QUALITY_STANDARDS: &str = "\
- Every claim must be evidence-backed; cite the source inline.
- No filler phrases (\"it's worth noting\", \"in today's world\").
- Quantify claims wherever a number is available.
- Explicitly state what's missing or unresolved, if anything.";

/// Composes the five-block task context described in §4.7.
pub fn build_task_context(
    original_request: Option<&str>,
    agent_role: &str,
    task_description: &str,
) -> String {
    let mut out = String::new();
    if let Some(request) = original_request {
        out.push_str("## ZERO'S ORIGINAL REQUEST\n");
        out.push_str(request);
        out.push_str("\n\n");
    }
    out.push_str("## ROLE MANDATE\n");
    out.push_str(quality_mandate_for_role(agent_role));
    out.push_str("\n\n## TASK\n");
    out.push_str(task_description);
    out.push_str("\n\n## OUTPUT TEMPLATE\n");
    out.push_str(output_template_for(task_description));
    out.push_str("\n## QUALITY STANDARDS\n");
    out.push_str(QUALITY_STANDARDS);
    out
}

const TOOL_USE_PREAMBLE: &str = "\
## Tools
You may request tools by emitting these markers in your response, each on its own line:
- `[WEB_SEARCH:<query>]` -- runs a web search and returns results.
- `[WEB_FETCH:<url>]` -- fetches and cleans a URL's content (max 3 per call).
- `[SOCIAL_POST:<text>]` -- posts text to the configured social channel, fire-and-forget.
Markers are resolved before your answer is persisted; never mention them to the end user.";

const MEMORY_REMINDER: &str = "You have persistent memory across tasks. The memory and lessons above are yours, carried forward from prior work, and will keep accumulating after this one.";

/// Composes the system prompt (§4.3 `buildAgentPrompt`): persona full text,
/// the agent's memory bundle, its skills (if any have been recorded yet),
/// the tool-use preamble, and a closing reminder that memory persists.
pub async fn build_agent_prompt(
    store: &Store,
    agent: &Agent,
    persona_system_prompt: &str,
    query_tags: &[String],
) -> Result<String, CoreError> {
    let memory = crate::memory::retrieve(store, agent.id, query_tags).await?;
    let skills = store.skills_for_agent(agent.id).await?;

    let mut out = String::new();
    out.push_str(persona_system_prompt);
    out.push_str("\n\n---\n\n");
    out.push_str(&memory.render());
    out.push_str("\n---\n\n");

    if !skills.is_empty() {
        out.push_str("## Skills\n");
        for s in &skills {
            let rendered = Skill {
                name: s.name.clone(),
                proficiency: s.proficiency as u32,
                usage_count: s.usage_count as u32,
            }
            .render_bar();
            out.push_str(&format!("- {}: {}\n", s.name, rendered));
        }
        out.push_str("\n---\n\n");
    }

    out.push_str(TOOL_USE_PREAMBLE);
    out.push_str("\n\n---\n\n");
    out.push_str(MEMORY_REMINDER);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_agent_prompt_includes_persona_memory_and_tool_preamble() {
        let store = Store::new_in_memory().await.unwrap();
        let agent = Agent {
            id: uuid::Uuid::new_v4(),
            display_name: "Nova".into(),
            role: "Researcher".into(),
            agent_type: cadre_core::types::AgentType::SubAgent,
            team_id: None,
            status: cadre_core::types::AgentStatus::Active,
            persona_version_id: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let prompt = build_agent_prompt(&store, &agent, "You are Nova.", &["research".to_string()])
            .await
            .unwrap();
        assert!(prompt.contains("You are Nova."));
        assert!(prompt.contains("Recent Memory"));
        assert!(prompt.contains("## Tools"));
        assert!(prompt.contains("persistent memory"));
    }

    #[tokio::test]
    async fn build_agent_prompt_includes_skills_block_once_seeded() {
        let store = Store::new_in_memory().await.unwrap();
        let agent_id = uuid::Uuid::new_v4();
        let agent = Agent {
            id: agent_id,
            display_name: "Nova".into(),
            role: "Researcher".into(),
            agent_type: cadre_core::types::AgentType::SubAgent,
            team_id: None,
            status: cadre_core::types::AgentStatus::Active,
            persona_version_id: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        store
            .insert_skill(&cadre_core::types::AgentSkill {
                id: uuid::Uuid::new_v4(),
                agent_id,
                name: "synthesis".into(),
                proficiency: 1,
                usage_count: 0,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let prompt = build_agent_prompt(&store, &agent, "You are Nova.", &[]).await.unwrap();
        assert!(prompt.contains("## Skills"));
        assert!(prompt.contains("synthesis"));
    }

    #[test]
    fn includes_originating_request_when_present() {
        let ctx = build_task_context(Some("please research X"), "Researcher", "research X");
        assert!(ctx.contains("ZERO'S ORIGINAL REQUEST"));
        assert!(ctx.contains("please research X"));
    }

    #[test]
    fn omits_originating_request_when_absent() {
        let ctx = build_task_context(None, "Researcher", "research X");
        assert!(!ctx.contains("ZERO'S ORIGINAL REQUEST"));
    }

    #[test]
    fn unmatched_role_gets_generic_mandate() {
        let ctx = build_task_context(None, "Mystery Role", "do a thing");
        assert!(ctx.contains("YOU ARE the expert assigned"));
    }

    #[test]
    fn every_mandate_contains_doer_directive() {
        for (_, mandate) in QUALITY_MANDATES {
            assert!(mandate.contains("you are the doer, not the advisor"));
        }
        assert!(GENERIC_MANDATE.contains("you are the doer, not the advisor"));
    }

    #[test]
    fn output_template_matches_engineering_keywords() {
        let ctx = build_task_context(None, "Engineer", "implement the login flow");
        assert!(ctx.contains("## Code"));
    }
}
