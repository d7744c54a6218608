//! Per-agent memory: append-only experience log plus the fixed-shape
//! retrieval bundle (§4.3). Retrieval is keyword-and-recency based by
//! explicit decision — no embeddings, no vector search.

use cadre_core::store::Store;
use cadre_core::types::{AgentMemory, Lesson, MemoryType};
use cadre_core::CoreError;
use chrono::Utc;
use uuid::Uuid;

const RECENT_LIMIT: i64 = 10;
const TOPIC_MATCH_LIMIT: usize = 10;
const LESSON_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct MemoryBundle {
    pub recent: Vec<AgentMemory>,
    pub topic_matched: Vec<AgentMemory>,
    pub lessons: Vec<Lesson>,
}

impl MemoryBundle {
    /// Renders the bundle into the static three-section markdown block
    /// consumed by `buildAgentPrompt` (§4.3).
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("## Recent Memory\n");
        if self.recent.is_empty() {
            out.push_str("_none yet_\n");
        } else {
            for m in &self.recent {
                out.push_str(&format!("- [{}] {}\n", memory_type_label(m.memory_type), m.content));
            }
        }
        out.push_str("\n## Related Memory\n");
        if self.topic_matched.is_empty() {
            out.push_str("_none yet_\n");
        } else {
            for m in &self.topic_matched {
                out.push_str(&format!("- [{}] {}\n", memory_type_label(m.memory_type), m.content));
            }
        }
        out.push_str("\n## Lessons Learned\n");
        if self.lessons.is_empty() {
            out.push_str("_none yet_\n");
        } else {
            for l in &self.lessons {
                out.push_str(&format!("- ({}) {}\n", l.category, l.text));
            }
        }
        out
    }
}

fn memory_type_label(t: MemoryType) -> &'static str {
    match t {
        MemoryType::Task => "task",
        MemoryType::Conversation => "conversation",
        MemoryType::Observation => "observation",
        MemoryType::Decision => "decision",
        MemoryType::Lesson => "lesson",
    }
}

/// Assembles the memory bundle for a task: last 10 memories by recency,
/// up to 10 topic-matched memories (deduplicated against recent), and the
/// top 5 lessons by importance then applied-count.
pub async fn retrieve(store: &Store, agent_id: Uuid, query_tags: &[String]) -> Result<MemoryBundle, CoreError> {
    let recent = store.recent_memory(agent_id, RECENT_LIMIT).await?;
    let recent_ids: std::collections::HashSet<Uuid> = recent.iter().map(|m| m.id).collect();

    let all = store.memory_for_agent_by_importance(agent_id).await?;
    let mut topic_matched: Vec<AgentMemory> = all
        .into_iter()
        .filter(|m| !recent_ids.contains(&m.id))
        .filter(|m| query_tags.iter().any(|t| m.topic_tags.contains(t)))
        .collect();
    topic_matched.sort_by(|a, b| {
        b.importance
            .cmp(&a.importance)
            .then(b.created_at.cmp(&a.created_at))
    });
    topic_matched.truncate(TOPIC_MATCH_LIMIT);

    let mut lessons = store.lessons_for_agent(agent_id).await?;
    lessons.sort_by(|a, b| {
        b.importance
            .cmp(&a.importance)
            .then(b.applied_count.cmp(&a.applied_count))
    });
    lessons.truncate(LESSON_LIMIT);

    Ok(MemoryBundle {
        recent,
        topic_matched,
        lessons,
    })
}

pub async fn save_memory(
    store: &Store,
    agent_id: Uuid,
    memory_type: MemoryType,
    content: impl Into<String>,
    topic_tags: Vec<String>,
    importance: i32,
) -> Result<Uuid, CoreError> {
    let memory = AgentMemory {
        id: Uuid::new_v4(),
        agent_id,
        memory_type,
        content: content.into(),
        summary: None,
        topic_tags,
        importance,
        source_type: None,
        source_id: None,
        related_agent_ids: Vec::new(),
        created_at: Utc::now(),
    };
    store.insert_memory(&memory).await?;
    Ok(memory.id)
}

pub async fn save_lesson(
    store: &Store,
    agent_id: Uuid,
    text: impl Into<String>,
    category: impl Into<String>,
    importance: i32,
) -> Result<Uuid, CoreError> {
    let lesson = Lesson {
        id: Uuid::new_v4(),
        agent_id,
        text: text.into(),
        category: category.into(),
        importance,
        applied_count: 0,
        created_at: Utc::now(),
    };
    store.insert_lesson(&lesson).await?;
    Ok(lesson.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retrieve_deduplicates_topic_matched_against_recent() {
        let store = Store::new_in_memory().await.unwrap();
        let agent_id = Uuid::new_v4();

        save_memory(&store, agent_id, MemoryType::Task, "finished report", vec!["research".into()], 5)
            .await
            .unwrap();
        save_memory(&store, agent_id, MemoryType::Observation, "older note", vec!["research".into()], 9)
            .await
            .unwrap();

        let bundle = retrieve(&store, agent_id, &["research".to_string()]).await.unwrap();
        assert_eq!(bundle.recent.len(), 2);
        // Both entries already appear in `recent`, so topic_matched must be empty.
        assert!(bundle.topic_matched.is_empty());
    }

    #[tokio::test]
    async fn retrieve_orders_lessons_by_importance_then_applied_count() {
        let store = Store::new_in_memory().await.unwrap();
        let agent_id = Uuid::new_v4();
        save_lesson(&store, agent_id, "low importance", "quality", 2).await.unwrap();
        save_lesson(&store, agent_id, "high importance", "quality", 9).await.unwrap();

        let bundle = retrieve(&store, agent_id, &[]).await.unwrap();
        assert_eq!(bundle.lessons[0].text, "high importance");
    }

    #[test]
    fn render_includes_all_three_sections() {
        let bundle = MemoryBundle {
            recent: vec![],
            topic_matched: vec![],
            lessons: vec![],
        };
        let rendered = bundle.render();
        assert!(rendered.contains("Recent Memory"));
        assert!(rendered.contains("Related Memory"));
        assert!(rendered.contains("Lessons Learned"));
    }
}
