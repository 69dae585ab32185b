//! Chat webhook relay — posts staff-room cards when applications land.
//!
//! The moments worth a ping: a brand-new complete submission, an abandoned
//! partial that finally completed, a status moving back to `Submitted`, and
//! an inbound applicant message. Everything else on the change feed is noise
//! to the staff room.

use serde_json::json;
use tracing::debug;

use crate::error::NotifyError;
use crate::model::{Application, ApplicationStatus, DocumentKind, Message, MessageSender};

/// Why the staff room is being pinged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTrigger {
    /// First complete write for this applicant.
    NewSubmission,
    /// A previously partial record completed.
    PartialCompleted,
    /// An existing complete record moved to `Submitted`.
    StatusSubmitted,
}

impl ChatTrigger {
    fn headline(&self, app: &Application) -> String {
        match self {
            Self::NewSubmission => format!("New driver application from {}", app.full_name()),
            Self::PartialCompleted => {
                format!("{} completed their in-progress application", app.full_name())
            }
            Self::StatusSubmitted => {
                format!("Application from {} is back in Submitted", app.full_name())
            }
        }
    }
}

/// Decide whether a store write warrants a chat ping.
pub fn chat_trigger(before: Option<&Application>, after: &Application) -> Option<ChatTrigger> {
    if after.is_partial {
        return None;
    }
    match before {
        None => Some(ChatTrigger::NewSubmission),
        Some(b) if b.is_partial => Some(ChatTrigger::PartialCompleted),
        Some(b)
            if b.status != ApplicationStatus::Submitted
                && after.status == ApplicationStatus::Submitted =>
        {
            Some(ChatTrigger::StatusSubmitted)
        }
        Some(_) => None,
    }
}

/// Decide whether an appended message warrants a chat ping. Staff replies
/// originate in the staff room, so only applicant messages go out.
pub fn message_trigger(message: &Message) -> bool {
    message.sender == MessageSender::Applicant
}

/// Build the webhook card payload for an inbound applicant message.
pub fn message_payload(app: &Application, message: &Message) -> serde_json::Value {
    json!({
        "text": format!("New message from {}", app.full_name()),
        "cardsV2": [{
            "cardId": format!("message-{}", message.id),
            "card": {
                "header": {
                    "title": app.full_name(),
                    "subtitle": format!("Message — {}", app.status),
                },
                "sections": [{
                    "widgets": [
                        { "decoratedText": { "topLabel": "Message", "text": message.content } },
                        { "decoratedText": { "topLabel": "Email", "text": app.email } },
                    ]
                }]
            }
        }]
    })
}

/// Build the webhook card payload.
pub fn chat_payload(trigger: ChatTrigger, app: &Application) -> serde_json::Value {
    let path = if !app.is_licensed_driver() {
        "Getting licensed"
    } else if app.has_own_vehicle() {
        "Licensed driver, own vehicle"
    } else {
        "Licensed driver"
    };
    let documents = DocumentKind::all()
        .iter()
        .filter(|k| app.documents.get(**k).is_some())
        .map(|k| k.label())
        .collect::<Vec<_>>()
        .join(", ");

    json!({
        "text": trigger.headline(app),
        "cardsV2": [{
            "cardId": format!("application-{}", app.id),
            "card": {
                "header": {
                    "title": app.full_name(),
                    "subtitle": format!("{path} — {}", app.status),
                },
                "sections": [{
                    "widgets": [
                        { "decoratedText": { "topLabel": "Email", "text": app.email } },
                        { "decoratedText": { "topLabel": "Phone", "text": app.phone } },
                        { "decoratedText": { "topLabel": "Area", "text": app.area } },
                        { "decoratedText": {
                            "topLabel": "Documents",
                            "text": if documents.is_empty() { "None".to_string() } else { documents },
                        } },
                    ]
                }]
            }
        }]
    })
}

/// Posts card payloads to a configured webhook URL.
pub struct ChatRelay {
    webhook_url: String,
    client: reqwest::Client,
}

impl ChatRelay {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// POST one card. Callers treat failures as log-and-continue; a dead
    /// webhook must never affect the applicant flow.
    pub async fn send(&self, trigger: ChatTrigger, app: &Application) -> Result<(), NotifyError> {
        self.post(chat_payload(trigger, app)).await?;
        debug!(application_id = %app.id, trigger = ?trigger, "Chat card sent");
        Ok(())
    }

    /// POST an inbound-message card.
    pub async fn send_message(
        &self,
        app: &Application,
        message: &Message,
    ) -> Result<(), NotifyError> {
        self.post(message_payload(app, message)).await?;
        debug!(application_id = %app.id, message_id = %message.id, "Message card sent");
        Ok(())
    }

    async fn post(&self, payload: serde_json::Value) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(NotifyError::Rejected(resp.status().as_u16()));
        }
        Ok(())
    }
}
