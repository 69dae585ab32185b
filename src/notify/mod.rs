//! Notification triggers — one agent on the store's change feed.
//!
//! Submission code never calls notifiers directly. The agent subscribes to
//! every store write and decides what each one warrants: a staff-room chat
//! card, a push to the applicant, or nothing. Delivery failures are logged
//! and swallowed; notifications are best-effort by design of the workflow,
//! not of this module.

pub mod chat;
pub mod push;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use chat::{chat_payload, chat_trigger, message_payload, message_trigger, ChatRelay, ChatTrigger};
pub use push::{status_push, LoggingPushGateway, PushGateway, PushNotification};

use crate::model::{Application, Message};
use crate::store::{ApplicationStore, ChangeEvent};

/// Background task translating store changes into notifications.
pub struct NotificationAgent {
    handle: JoinHandle<()>,
}

impl NotificationAgent {
    /// Subscribe to the store and start dispatching.
    pub fn spawn(
        store: Arc<dyn ApplicationStore>,
        chat: Option<Arc<ChatRelay>>,
        push: Arc<dyn PushGateway>,
    ) -> Self {
        let mut feed = store.watch_all();
        let handle = tokio::spawn(async move {
            while let Some(event) = feed.recv().await {
                match event {
                    ChangeEvent::ApplicationWritten { before, after } => {
                        dispatch(store.as_ref(), chat.as_deref(), push.as_ref(), before, after)
                            .await;
                    }
                    ChangeEvent::MessageAppended { message } => {
                        dispatch_message(store.as_ref(), chat.as_deref(), &message).await;
                    }
                }
            }
            debug!("Notification agent stopped");
        });
        Self { handle }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

async fn dispatch(
    store: &dyn ApplicationStore,
    chat: Option<&ChatRelay>,
    push: &dyn PushGateway,
    before: Option<Application>,
    after: Application,
) {
    if let Some(trigger) = chat::chat_trigger(before.as_ref(), &after) {
        match chat {
            Some(relay) => {
                if let Err(e) = relay.send(trigger, &after).await {
                    warn!(application_id = %after.id, error = %e, "Chat card delivery failed");
                }
            }
            None => debug!(application_id = %after.id, "No chat webhook configured"),
        }
    }

    // Status changes on complete records push to the applicant
    let status_changed = before
        .as_ref()
        .is_some_and(|b| !b.is_partial && b.status != after.status);
    if status_changed && !after.is_partial {
        match store.get_push_token(&after.id).await {
            Ok(Some(token)) => {
                let branding = store.get_branding().await.unwrap_or_default();
                let notification = push::status_push(&branding, &after, after.status);
                if let Err(e) = push.send(&token, &notification).await {
                    warn!(application_id = %after.id, error = %e, "Push delivery failed");
                }
            }
            Ok(None) => {
                debug!(application_id = %after.id, "No push token registered");
            }
            Err(e) => warn!(application_id = %after.id, error = %e, "Push token lookup failed"),
        }
    }
}

async fn dispatch_message(
    store: &dyn ApplicationStore,
    chat: Option<&ChatRelay>,
    message: &Message,
) {
    if !chat::message_trigger(message) {
        return;
    }
    let Some(relay) = chat else {
        debug!(application_id = %message.application_id, "No chat webhook configured");
        return;
    };
    match store.get(&message.application_id).await {
        Ok(Some(app)) => {
            if let Err(e) = relay.send_message(&app, message).await {
                warn!(application_id = %app.id, error = %e, "Message card delivery failed");
            }
        }
        Ok(None) => {
            debug!(application_id = %message.application_id, "Message for unknown application");
        }
        Err(e) => {
            warn!(application_id = %message.application_id, error = %e, "Application lookup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::NotifyError;
    use crate::model::{ApplicationDetails, ApplicationStatus, LicensedDetails, MessageSender};
    use crate::store::{ApplicationPatch, LibSqlBackend};

    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<(String, PushNotification)>>,
    }

    #[async_trait]
    impl PushGateway for RecordingGateway {
        async fn send(
            &self,
            token: &str,
            notification: &PushNotification,
        ) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((token.to_string(), notification.clone()));
            Ok(())
        }
    }

    async fn seed_complete(store: &LibSqlBackend, id: &str) {
        store
            .merge(
                id,
                ApplicationPatch {
                    first_name: Some("Amara".to_string()),
                    last_name: Some("Okafor".to_string()),
                    email: Some("amara@example.com".to_string()),
                    details: Some(ApplicationDetails::Licensed(LicensedDetails::default())),
                    status: Some(ApplicationStatus::Submitted),
                    is_partial: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn status_change_pushes_to_registered_token() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let gateway = Arc::new(RecordingGateway::default());
        seed_complete(&store, "uid-1").await;
        store.set_push_token("uid-1", "tok-1").await.unwrap();

        let agent = NotificationAgent::spawn(store.clone(), None, gateway.clone());
        store
            .set_status("uid-1", ApplicationStatus::Approved)
            .await
            .unwrap();

        // Give the agent a beat to drain the feed
        tokio::time::sleep(Duration::from_millis(50)).await;

        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "tok-1");
        assert!(sent[0].1.body.contains("Approved"));
        drop(sent);
        agent.abort();
    }

    #[tokio::test]
    async fn messages_route_to_chat_never_push() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let gateway = Arc::new(RecordingGateway::default());
        seed_complete(&store, "uid-1").await;
        store.set_push_token("uid-1", "tok-1").await.unwrap();

        let agent = NotificationAgent::spawn(store.clone(), None, gateway.clone());
        let inbound = Message::new("uid-1", MessageSender::Applicant, "Amara Okafor", "Hi");
        store.append_message(&inbound).await.unwrap();
        let reply = Message::new("uid-1", MessageSender::Staff, "Recruitment", "Hello");
        store.append_message(&reply).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gateway.sent.lock().unwrap().is_empty());
        agent.abort();
    }

    #[tokio::test]
    async fn autosaves_and_tokenless_accounts_stay_silent() {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let gateway = Arc::new(RecordingGateway::default());
        let agent = NotificationAgent::spawn(store.clone(), None, gateway.clone());

        // A partial write, then a status change with no token registered
        store
            .merge(
                "uid-1",
                ApplicationPatch {
                    first_name: Some("Amara".to_string()),
                    is_partial: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        seed_complete(&store, "uid-2").await;
        store
            .set_status("uid-2", ApplicationStatus::Contacted)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gateway.sent.lock().unwrap().is_empty());
        agent.abort();
    }
}
