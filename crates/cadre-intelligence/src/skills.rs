//! Per-agent skills (§4.5): proficiency grows from usage, usage grows from
//! keyword hits on completed task descriptions.

use std::collections::HashMap;

/// Monotonic usage-count thresholds; proficiency = index into this table,
/// capped at 10 (index 9, since the table is zero-based at proficiency 1).
pub const PROFICIENCY_THRESHOLDS: [u32; 10] = [0, 5, 12, 22, 35, 52, 73, 100, 135, 180];
pub const MAX_PROFICIENCY: u32 = 10;

/// Fixed dictionary mapping role substrings (case-insensitive) to an
/// initial skill set assigned at hire time.
pub fn initial_skills_for_role(role: &str) -> Vec<&'static str> {
    let role = role.to_lowercase();
    if role.contains("research") {
        vec!["source evaluation", "synthesis", "fact-checking"]
    } else if role.contains("strategy") {
        vec!["market analysis", "competitive positioning", "forecasting"]
    } else if role.contains("content") || role.contains("writer") || role.contains("writing") {
        vec!["copywriting", "editing", "storytelling"]
    } else if role.contains("engineer") || role.contains("developer") {
        vec!["system design", "debugging", "code review"]
    } else if role.contains("qa") {
        vec!["test design", "regression analysis", "bug triage"]
    } else if role.contains("marketing") {
        vec!["campaign design", "audience segmentation", "copy testing"]
    } else if role.contains("knowledge") {
        vec!["documentation", "taxonomy design", "archival research"]
    } else {
        vec!["research", "writing", "analysis"]
    }
}

/// Fixed dictionary: skill name → keywords that, when found in a completed
/// task's description, count as a use of that skill.
pub fn skill_keywords() -> HashMap<&'static str, &'static [&'static str]> {
    HashMap::from([
        ("source evaluation", ["source", "citation", "reference"].as_slice()),
        ("synthesis", ["synthesize", "summary", "combine"].as_slice()),
        ("fact-checking", ["fact-check", "verify", "accuracy"].as_slice()),
        ("market analysis", ["market", "industry", "competitor"].as_slice()),
        ("competitive positioning", ["positioning", "differentiation"].as_slice()),
        ("forecasting", ["forecast", "projection", "trend"].as_slice()),
        ("copywriting", ["copy", "headline", "tagline"].as_slice()),
        ("editing", ["edit", "proofread", "revise"].as_slice()),
        ("storytelling", ["narrative", "story", "arc"].as_slice()),
        ("system design", ["architecture", "design doc", "schema"].as_slice()),
        ("debugging", ["bug", "debug", "root cause"].as_slice()),
        ("code review", ["code review", "pull request", "diff"].as_slice()),
        ("test design", ["test plan", "test case", "coverage"].as_slice()),
        ("regression analysis", ["regression", "flaky"].as_slice()),
        ("bug triage", ["triage", "severity", "priority"].as_slice()),
        ("campaign design", ["campaign", "funnel"].as_slice()),
        ("audience segmentation", ["segment", "persona", "audience"].as_slice()),
        ("copy testing", ["a/b test", "variant"].as_slice()),
        ("documentation", ["documentation", "wiki", "readme"].as_slice()),
        ("taxonomy design", ["taxonomy", "category tree"].as_slice()),
        ("archival research", ["archive", "historical"].as_slice()),
    ])
}

#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub proficiency: u32,
    pub usage_count: u32,
}

impl Skill {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            proficiency: 1,
            usage_count: 0,
        }
    }

    /// Returns `true` when this use crossed a proficiency threshold
    /// (a level-up event should be emitted).
    pub fn record_usage(&mut self) -> bool {
        self.usage_count += 1;
        let new_proficiency = proficiency_for_usage(self.usage_count);
        if new_proficiency > self.proficiency {
            self.proficiency = new_proficiency;
            true
        } else {
            false
        }
    }

    /// Renders a 10-cell proficiency bar plus usage count, e.g. `[####------] 22 uses`.
    pub fn render_bar(&self) -> String {
        let filled = self.proficiency.min(MAX_PROFICIENCY) as usize;
        let empty = MAX_PROFICIENCY as usize - filled;
        format!(
            "[{}{}] {} uses",
            "#".repeat(filled),
            "-".repeat(empty),
            self.usage_count
        )
    }
}

fn proficiency_for_usage(usage_count: u32) -> u32 {
    let mut level = 1;
    for (idx, threshold) in PROFICIENCY_THRESHOLDS.iter().enumerate() {
        if usage_count >= *threshold {
            level = (idx as u32 + 1).min(MAX_PROFICIENCY);
        }
    }
    level
}

/// Scans a completed task's description for skill keywords, incrementing
/// usage for existing skills and cross-training (creating at proficiency 1)
/// for new ones. Returns the names of skills that leveled up.
pub fn track_skill_usage(skills: &mut HashMap<String, Skill>, description: &str) -> Vec<String> {
    let lower = description.to_lowercase();
    let mut leveled_up = Vec::new();
    for (skill_name, keywords) in skill_keywords() {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            let skill = skills
                .entry(skill_name.to_string())
                .or_insert_with(|| Skill::new(skill_name));
            if skill.record_usage() {
                leveled_up.push(skill_name.to_string());
            }
        }
    }
    leveled_up
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proficiency_advances_at_documented_thresholds() {
        assert_eq!(proficiency_for_usage(0), 1);
        assert_eq!(proficiency_for_usage(4), 1);
        assert_eq!(proficiency_for_usage(5), 2);
        assert_eq!(proficiency_for_usage(12), 3);
        assert_eq!(proficiency_for_usage(180), 10);
        assert_eq!(proficiency_for_usage(10_000), 10);
    }

    #[test]
    fn record_usage_reports_level_up_only_on_threshold_crossing() {
        let mut skill = Skill::new("debugging");
        for _ in 0..4 {
            assert!(!skill.record_usage());
        }
        assert!(skill.record_usage()); // 5th use crosses threshold 5
    }

    #[test]
    fn track_skill_usage_cross_trains_new_skills() {
        let mut skills = HashMap::new();
        let leveled = track_skill_usage(&mut skills, "please debug this regression");
        assert!(skills.contains_key("debugging"));
        assert!(skills.contains_key("regression analysis"));
        assert!(leveled.is_empty()); // first use never levels up from 0 -> 1
    }

    #[test]
    fn initial_skills_match_role_keyword() {
        let skills = initial_skills_for_role("Senior QA Reviewer");
        assert_eq!(skills.len(), 3);
        assert!(skills.contains(&"test design"));
    }
}
