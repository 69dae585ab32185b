//! Backend-agnostic `ApplicationStore` trait — the single async interface
//! every component persists through.

use async_trait::async_trait;

use crate::config::Branding;
use crate::error::StoreError;
use crate::model::{
    ActivityEntry, Application, ApplicationDetails, ApplicationStatus, ChecklistItem, DocumentKind,
    DocumentSet, Message, MessageSender,
};
use crate::store::watch::WatchHandle;

/// A partial write to an application record.
///
/// Only `Some` fields are written; everything else keeps its stored value.
/// `documents` merges slot-by-slot rather than replacing the whole set, so
/// a patch can never regress a previously uploaded document to empty.
/// Credentials have no field here on purpose — they go to the identity
/// provider, never to the store.
#[derive(Debug, Clone, Default)]
pub struct ApplicationPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub area: Option<String>,
    /// Replaces the details branch wholesale when present.
    pub details: Option<ApplicationDetails>,
    /// Merged monotonically over the stored set.
    pub documents: Option<DocumentSet>,
    pub status: Option<ApplicationStatus>,
    pub is_partial: Option<bool>,
    pub current_step: Option<u8>,
}

/// Async persistence interface for the intake workflow.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    // ── Applications ────────────────────────────────────────────────

    /// Fetch an application by account id.
    async fn get(&self, id: &str) -> Result<Option<Application>, StoreError>;

    /// Create-or-merge: writes the patch's `Some` fields over whatever is
    /// stored (creating the record if absent) and returns the result.
    async fn merge(&self, id: &str, patch: ApplicationPatch) -> Result<Application, StoreError>;

    /// All finalized applications (`is_partial = false`), newest first.
    async fn list_complete(&self) -> Result<Vec<Application>, StoreError>;

    /// Every application including in-progress partials, newest first.
    async fn list_all(&self) -> Result<Vec<Application>, StoreError>;

    /// Set the review status. Errors with `NotFound` for unknown ids.
    async fn set_status(
        &self,
        id: &str,
        status: ApplicationStatus,
    ) -> Result<Application, StoreError>;

    /// Store a document URL in the given slot.
    async fn set_document(
        &self,
        id: &str,
        kind: DocumentKind,
        url: &str,
    ) -> Result<Application, StoreError>;

    /// Toggle one checklist milestone on an unlicensed application.
    /// Errors with `Constraint` if the application is on the licensed path.
    async fn set_checklist_item(
        &self,
        id: &str,
        item: ChecklistItem,
        value: bool,
    ) -> Result<Application, StoreError>;

    // ── Conversations ───────────────────────────────────────────────

    /// Append a chat message.
    async fn append_message(&self, message: &Message) -> Result<(), StoreError>;

    /// All messages for an application, oldest first.
    async fn list_messages(&self, application_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Mark every message *to* `reader` (i.e. authored by the other party)
    /// as read. Returns the number of messages flipped.
    async fn mark_conversation_read(
        &self,
        application_id: &str,
        reader: MessageSender,
    ) -> Result<usize, StoreError>;

    /// Count of unread messages awaiting `reader`.
    async fn unread_count(
        &self,
        application_id: &str,
        reader: MessageSender,
    ) -> Result<usize, StoreError>;

    // ── Activity log ────────────────────────────────────────────────

    /// Append an audit-trail entry.
    async fn append_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError>;

    /// Activity entries for an application, newest first.
    async fn list_activity(&self, application_id: &str) -> Result<Vec<ActivityEntry>, StoreError>;

    // ── Push tokens & branding ──────────────────────────────────────

    /// Register (or refresh) a device push token for an account.
    async fn set_push_token(&self, account_id: &str, token: &str) -> Result<(), StoreError>;

    /// Current push token for an account, if any.
    async fn get_push_token(&self, account_id: &str) -> Result<Option<String>, StoreError>;

    /// Branding shown in notifications, falling back to defaults when unset.
    async fn get_branding(&self) -> Result<Branding, StoreError>;

    /// Persist branding overrides.
    async fn set_branding(&self, branding: &Branding) -> Result<(), StoreError>;

    // ── Subscriptions ───────────────────────────────────────────────

    /// Watch a single application's changes.
    fn watch(&self, application_id: &str) -> WatchHandle;

    /// Watch every store change.
    fn watch_all(&self) -> WatchHandle;
}
