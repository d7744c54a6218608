//! `DocumentStore` (§6): `publishDeliverable` plus folder discovery, behind a
//! trait so the backup job and the executor's completed-deliverable path
//! don't need a real document backend to be testable.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliverable {
    pub title: String,
    pub content: String,
    pub team_id: Uuid,
    pub agent_name: String,
    pub mission_id: Uuid,
    pub step_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedDocument {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn publish_deliverable(&self, deliverable: &Deliverable) -> Option<PublishedDocument>;

    /// Folder path for a given day's backup, nested date-stamped per §6.
    fn daily_backup_folder(&self, day: chrono::NaiveDate) -> String;
}

/// Local stand-in: logs the publish and returns no URL. A real
/// implementation (Notion, Google Drive, a git-backed wiki) would call out
/// and return the document's public id/url.
pub struct NullDocumentStore;

#[async_trait]
impl DocumentStore for NullDocumentStore {
    async fn publish_deliverable(&self, deliverable: &Deliverable) -> Option<PublishedDocument> {
        tracing::info!(
            title = %deliverable.title,
            mission_id = %deliverable.mission_id,
            step_id = %deliverable.step_id,
            "no document store configured; deliverable stays in the datastore only"
        );
        None
    }

    fn daily_backup_folder(&self, day: chrono::NaiveDate) -> String {
        format!("backups/{}", day.format("%Y/%m/%d"))
    }
}

pub fn today_backup_folder(store: &dyn DocumentStore) -> String {
    store.daily_backup_folder(Utc::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_store_publish_returns_none() {
        let store = NullDocumentStore;
        let deliverable = Deliverable {
            title: "Report".into(),
            content: "body".into(),
            team_id: Uuid::new_v4(),
            agent_name: "Nova".into(),
            mission_id: Uuid::new_v4(),
            step_id: Uuid::new_v4(),
        };
        assert!(store.publish_deliverable(&deliverable).await.is_none());
    }

    #[test]
    fn daily_backup_folder_is_nested_by_date() {
        let store = NullDocumentStore;
        let day = chrono::NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        assert_eq!(store.daily_backup_folder(day), "backups/2026/07/28");
    }
}
