//! Messages and activity log — append-only records referencing an
//! application. The only mutation after creation is the read flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    Applicant,
    Staff,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applicant => "applicant",
            Self::Staff => "staff",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "staff" => Self::Staff,
            _ => Self::Applicant,
        }
    }
}

/// One chat message between an applicant and staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub application_id: String,
    pub sender: MessageSender,
    pub sender_name: String,
    pub content: String,
    /// Set once the other party has viewed the message.
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        application_id: impl Into<String>,
        sender: MessageSender,
        sender_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id: application_id.into(),
            sender,
            sender_name: sender_name.into(),
            content: content.into(),
            read: false,
            created_at: Utc::now(),
        }
    }
}

/// What an activity entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Submitted,
    StatusChanged,
    DocumentReplaced,
    ChecklistUpdated,
    MessageSent,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::StatusChanged => "status_changed",
            Self::DocumentReplaced => "document_replaced",
            Self::ChecklistUpdated => "checklist_updated",
            Self::MessageSent => "message_sent",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "status_changed" => Self::StatusChanged,
            "document_replaced" => Self::DocumentReplaced,
            "checklist_updated" => Self::ChecklistUpdated,
            "message_sent" => Self::MessageSent,
            _ => Self::Submitted,
        }
    }
}

/// One audit-trail entry. Append-only, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub application_id: String,
    pub kind: ActivityKind,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        application_id: impl Into<String>,
        kind: ActivityKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id: application_id.into(),
            kind,
            detail: detail.into(),
            created_at: Utc::now(),
        }
    }
}
