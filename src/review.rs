//! Staff review surface — listing, filtering, status changes, document
//! replacement, and the unlicensed checklist.
//!
//! Everything here writes through the store; notification triggers hang off
//! the store's change feed rather than being called inline, so a status
//! change from any code path notifies the same way.

use std::sync::Arc;

use tracing::info;

use crate::docs::{document_path, DocumentStore};
use crate::error::{Error, StoreError};
use crate::model::{
    ActivityEntry, ActivityKind, Application, ApplicationStatus, ChecklistItem, DocumentKind,
    Message, MessageSender,
};
use crate::store::ApplicationStore;

/// Listing filter. All parts optional and combined with AND.
#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    /// Case-insensitive substring match over name, email, phone, and area.
    pub search: Option<String>,
    pub status: Option<ApplicationStatus>,
    /// Include in-progress partial records, for chasing up abandoned
    /// applications. Off by default.
    pub include_partial: bool,
}

impl ReviewFilter {
    fn matches(&self, app: &Application) -> bool {
        if let Some(status) = self.status {
            if app.status != status {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let haystack = format!(
                "{} {} {} {} {}",
                app.first_name, app.last_name, app.email, app.phone, app.area
            )
            .to_lowercase();
            if !haystack.contains(&needle) {
                return false;
            }
        }
        true
    }
}

/// Dashboard counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewStats {
    pub total: usize,
    /// Counts per status, in display order.
    pub by_status: Vec<(ApplicationStatus, usize)>,
}

/// Staff-facing operations over the application store.
pub struct ReviewService {
    store: Arc<dyn ApplicationStore>,
    documents: Arc<dyn DocumentStore>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn ApplicationStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { store, documents }
    }

    /// Applications matching the filter, newest first. Partials appear only
    /// when the filter opts in.
    pub async fn list(&self, filter: &ReviewFilter) -> Result<Vec<Application>, Error> {
        let apps = if filter.include_partial {
            self.store.list_all().await
        } else {
            self.store.list_complete().await
        }
        .map_err(Error::Store)?;
        Ok(apps.into_iter().filter(|a| filter.matches(a)).collect())
    }

    /// Counters for the dashboard header.
    pub async fn stats(&self) -> Result<ReviewStats, Error> {
        let apps = self.store.list_complete().await.map_err(Error::Store)?;
        let by_status = ApplicationStatus::all()
            .into_iter()
            .map(|status| {
                let count = apps.iter().filter(|a| a.status == status).count();
                (status, count)
            })
            .collect();
        Ok(ReviewStats {
            total: apps.len(),
            by_status,
        })
    }

    /// One application with its audit trail.
    pub async fn detail(
        &self,
        id: &str,
    ) -> Result<(Application, Vec<ActivityEntry>), Error> {
        let app = self
            .store
            .get(id)
            .await
            .map_err(Error::Store)?
            .ok_or_else(|| Error::Store(StoreError::NotFound(id.to_string())))?;
        let activity = self.store.list_activity(id).await.map_err(Error::Store)?;
        Ok((app, activity))
    }

    /// Set the review status and record who moved it where.
    pub async fn set_status(
        &self,
        id: &str,
        status: ApplicationStatus,
    ) -> Result<Application, Error> {
        let before = self
            .store
            .get(id)
            .await
            .map_err(Error::Store)?
            .ok_or_else(|| Error::Store(StoreError::NotFound(id.to_string())))?;

        let app = self.store.set_status(id, status).await.map_err(Error::Store)?;

        let entry = ActivityEntry::new(
            id,
            ActivityKind::StatusChanged,
            format!("{} -> {}", before.status, status),
        );
        self.store.append_activity(&entry).await.map_err(Error::Store)?;

        info!(application_id = %id, from = %before.status, to = %status, "Status changed");
        Ok(app)
    }

    /// Upload a replacement document and point the slot at it. The old URL
    /// is overwritten, never blanked.
    pub async fn replace_document(
        &self,
        id: &str,
        kind: DocumentKind,
        filename: &str,
        content: &[u8],
    ) -> Result<Application, Error> {
        // Fail before uploading if the record doesn't exist
        if self.store.get(id).await.map_err(Error::Store)?.is_none() {
            return Err(Error::Store(StoreError::NotFound(id.to_string())));
        }

        let path = document_path(id, kind, filename);
        let url = self
            .documents
            .upload(&path, content)
            .await
            .map_err(Error::Upload)?;
        let app = self
            .store
            .set_document(id, kind, &url)
            .await
            .map_err(Error::Store)?;

        let entry = ActivityEntry::new(
            id,
            ActivityKind::DocumentReplaced,
            format!("{} replaced", kind.label()),
        );
        self.store.append_activity(&entry).await.map_err(Error::Store)?;
        Ok(app)
    }

    /// Toggle one milestone on an unlicensed application's checklist.
    pub async fn set_checklist_item(
        &self,
        id: &str,
        item: ChecklistItem,
        value: bool,
    ) -> Result<Application, Error> {
        let app = self
            .store
            .set_checklist_item(id, item, value)
            .await
            .map_err(Error::Store)?;

        let entry = ActivityEntry::new(
            id,
            ActivityKind::ChecklistUpdated,
            format!("{} = {}", item.key(), value),
        );
        self.store.append_activity(&entry).await.map_err(Error::Store)?;
        Ok(app)
    }

    /// Append a chat message to the application's conversation.
    pub async fn send_message(
        &self,
        id: &str,
        sender: MessageSender,
        sender_name: &str,
        content: &str,
    ) -> Result<Message, Error> {
        let message = Message::new(id, sender, sender_name, content);
        self.store.append_message(&message).await.map_err(Error::Store)?;

        let entry = ActivityEntry::new(
            id,
            ActivityKind::MessageSent,
            format!("{} message from {sender_name}", sender.as_str()),
        );
        self.store.append_activity(&entry).await.map_err(Error::Store)?;
        Ok(message)
    }

    /// Conversation history plus the unread count for the reader.
    pub async fn conversation(
        &self,
        id: &str,
        reader: MessageSender,
    ) -> Result<(Vec<Message>, usize), Error> {
        let messages = self.store.list_messages(id).await.map_err(Error::Store)?;
        let unread = self
            .store
            .unread_count(id, reader)
            .await
            .map_err(Error::Store)?;
        Ok((messages, unread))
    }
}
