//! Compiled role/category tables (§4.1, §9 "dynamic dispatch over roles").
//!
//! Everything here is immutable data plus pure functions over it — no
//! state, no I/O. `routeByKeywords` and friends are exposed at module
//! scope so the dispatcher and context builder can both depend on them.

pub const CATEGORIES: &[&str] = &[
    "research",
    "strategy",
    "content",
    "engineering",
    "qa",
    "marketing",
    "knowledge",
];

/// `category → keyword[]`, checked in enumeration order; a tie keeps the
/// first category reached (§4.1).
pub const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("research", &["research", "investigate", "analyze", "survey", "competitive analysis"]),
    ("strategy", &["strategy", "plan", "roadmap", "vision", "recommendation"]),
    ("content", &["blog", "post", "article", "copy", "write", "newsletter"]),
    ("engineering", &["build", "implement", "code", "engineer", "deploy", "api"]),
    ("qa", &["test", "review", "qa", "verify", "audit"]),
    ("marketing", &["campaign", "marketing", "audience", "funnel", "brand"]),
    ("knowledge", &["document", "wiki", "knowledge base", "archive", "reference"]),
];

/// `category → standing-team-name`. Used by auto-hire to pick a default
/// home team for a newly created agent.
pub const STANDING_TEAMS: &[(&str, &str)] = &[
    ("research", "team-research"),
    ("strategy", "team-strategy"),
    ("content", "team-execution"),
    ("engineering", "team-execution"),
    ("qa", "team-execution"),
    ("marketing", "team-execution"),
    ("knowledge", "team-research"),
];

/// Canned role titles used when LLM-assisted role generation (§4.2
/// `determineDynamicProjectRoles`) falls back to keyword detection.
pub const CANNED_ROLE_TITLES: &[(&str, &str)] = &[
    ("research", "Research Analyst"),
    ("strategy", "Strategy Lead"),
    ("content", "Content Creator"),
    ("engineering", "Software Engineer"),
    ("qa", "QA Reviewer"),
    ("marketing", "Marketing Specialist"),
    ("knowledge", "Knowledge Manager"),
];

pub fn standing_team_for(category: &str) -> &'static str {
    STANDING_TEAMS
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, team)| *team)
        .unwrap_or("team-research")
}

pub fn canned_title_for(category: &str) -> &'static str {
    CANNED_ROLE_TITLES
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, title)| *title)
        .unwrap_or("Generalist")
}

/// `routeByKeywords(description)`: score = count of category keywords that
/// occur (case-insensitive substring) in the description; highest score
/// wins; ties resolved by enumeration order; default `research` when all
/// scores are zero.
pub fn route_by_keywords(description: &str) -> &'static str {
    let lower = description.to_lowercase();
    let mut best_category = "research";
    let mut best_score = 0usize;
    for (category, keywords) in CATEGORY_KEYWORDS {
        let score = keywords.iter().filter(|kw| lower.contains(**kw)).count();
        if score > best_score {
            best_score = score;
            best_category = category;
        }
    }
    best_category
}

/// `canTeamHandle`: an agent matches when its role text contains any
/// keyword of the category. Team leads are generalists and always match
/// when no specialist does.
pub struct TeamMatch<'a> {
    pub can_handle: bool,
    pub matched_agent: Option<&'a str>,
    pub category: &'static str,
}

pub fn can_team_handle<'a>(
    agents: &[(&'a str, &'a str, bool)], // (display_name, role, is_team_lead)
    category: &str,
) -> TeamMatch<'a> {
    let category_static = CATEGORIES.iter().find(|c| **c == category).copied().unwrap_or("research");
    let keywords = CATEGORY_KEYWORDS
        .iter()
        .find(|(c, _)| *c == category_static)
        .map(|(_, kw)| *kw)
        .unwrap_or(&[]);

    for (name, role, _) in agents {
        let role_lower = role.to_lowercase();
        if keywords.iter().any(|kw| role_lower.contains(kw)) {
            return TeamMatch {
                can_handle: true,
                matched_agent: Some(name),
                category: category_static,
            };
        }
    }
    if let Some((name, _, _)) = agents.iter().find(|(_, _, is_lead)| *is_lead) {
        return TeamMatch {
            can_handle: true,
            matched_agent: Some(name),
            category: category_static,
        };
    }
    TeamMatch {
        can_handle: false,
        matched_agent: None,
        category: category_static,
    }
}

#[derive(Debug, Clone)]
pub struct PhaseSpec {
    pub description: String,
    pub role: String,
    pub tier: String,
}

/// Parses an optional `[PHASES] ... [/PHASES]` block (§4.1). Tolerant:
/// missing block → empty list; malformed lines silently dropped.
pub fn parse_phases(text: &str) -> Vec<PhaseSpec> {
    let Some(start) = text.find("[PHASES]") else {
        return Vec::new();
    };
    let Some(end) = text[start..].find("[/PHASES]") else {
        return Vec::new();
    };
    let block = &text[start + "[PHASES]".len()..start + end];

    let mut phases = Vec::new();
    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(phase_idx) = line.find(':') else { continue };
        let (_, rest) = line.split_at(phase_idx + 1);
        let parts: Vec<&str> = rest.split('|').collect();
        if parts.len() != 3 {
            continue;
        }
        let description = parts[0].trim().to_string();
        let Some(role) = parts[1].trim().strip_prefix("ROLE:") else { continue };
        let Some(tier) = parts[2].trim().strip_prefix("TIER:") else { continue };
        if description.is_empty() {
            continue;
        }
        phases.push(PhaseSpec {
            description,
            role: role.trim().to_string(),
            tier: tier.trim().to_string(),
        });
    }
    phases
}

/// Renders a phase list back into the `[PHASES]` block form — the inverse
/// of `parse_phases`, used by round-trip tests (§8 property 9).
pub fn render_phases(phases: &[PhaseSpec]) -> String {
    let mut out = String::from("[PHASES]\n");
    for (idx, phase) in phases.iter().enumerate() {
        out.push_str(&format!(
            "PHASE {}: {} | ROLE: {} | TIER: {}\n",
            idx + 1,
            phase.description,
            phase.role,
            phase.tier
        ));
    }
    out.push_str("[/PHASES]");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_by_keywords_defaults_to_research() {
        assert_eq!(route_by_keywords("do a thing with no obvious keywords"), "research");
    }

    #[test]
    fn route_by_keywords_picks_highest_scoring_category() {
        assert_eq!(route_by_keywords("write a blog post article"), "content");
    }

    #[test]
    fn route_by_keywords_breaks_ties_by_enumeration_order() {
        // "research" keyword "analyze" (research) vs nothing else scoring higher.
        assert_eq!(route_by_keywords("please analyze this"), "research");
    }

    #[test]
    fn can_team_handle_matches_role_keyword() {
        let agents = [("Nova", "Research Analyst", false)];
        let result = can_team_handle(&agents, "research");
        assert!(result.can_handle);
        assert_eq!(result.matched_agent, Some("Nova"));
    }

    #[test]
    fn can_team_handle_falls_back_to_team_lead() {
        let agents = [("Lead", "Team Lead", true)];
        let result = can_team_handle(&agents, "engineering");
        assert!(result.can_handle);
        assert_eq!(result.matched_agent, Some("Lead"));
    }

    #[test]
    fn can_team_handle_returns_false_with_no_match() {
        let agents = [("Nova", "Marketing Specialist", false)];
        let result = can_team_handle(&agents, "engineering");
        assert!(!result.can_handle);
    }

    #[test]
    fn parse_phases_handles_missing_block() {
        assert!(parse_phases("just a plain description").is_empty());
    }

    #[test]
    fn parse_phases_extracts_two_well_formed_lines() {
        let text = "desc\n[PHASES]\nPHASE 1: Research market | ROLE: research | TIER: tier1\nPHASE 2: Strategy recommendation | ROLE: strategy | TIER: tier2\n[/PHASES]";
        let phases = parse_phases(text);
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].role, "research");
        assert_eq!(phases[1].tier, "tier2");
    }

    #[test]
    fn parse_phases_silently_drops_malformed_lines() {
        let text = "[PHASES]\nPHASE 1: ok | ROLE: research | TIER: tier1\nnot a valid line\n[/PHASES]";
        let phases = parse_phases(text);
        assert_eq!(phases.len(), 1);
    }

    #[test]
    fn parse_phases_roundtrips_through_render_phases() {
        let phases = vec![
            PhaseSpec { description: "Research market".into(), role: "research".into(), tier: "tier1".into() },
            PhaseSpec { description: "Strategy recommendation".into(), role: "strategy".into(), tier: "tier2".into() },
        ];
        let rendered = render_phases(&phases);
        let parsed = parse_phases(&rendered);
        assert_eq!(parsed.len(), phases.len());
        assert_eq!(parsed[0].description, phases[0].description);
        assert_eq!(parsed[1].role, phases[1].role);
    }
}
