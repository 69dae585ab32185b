//! Push notifications — applicant-facing status updates.
//!
//! Delivery is behind a trait so local runs and tests do not need a real
//! push service. The shipped implementation just logs; a production gateway
//! implements the same trait against whatever push backend is in use.

use async_trait::async_trait;
use tracing::info;

use crate::config::Branding;
use crate::error::NotifyError;
use crate::model::{Application, ApplicationStatus};

/// One rendered push notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    pub icon_url: String,
}

/// Render the status-change push with the configured branding.
pub fn status_push(
    branding: &Branding,
    app: &Application,
    status: ApplicationStatus,
) -> PushNotification {
    PushNotification {
        title: format!("{} — Application Update", branding.company_name),
        body: format!(
            "Hi {}, your application status is now \"{status}\".",
            app.first_name
        ),
        icon_url: branding.logo_url.clone(),
    }
}

/// Async push-delivery interface.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, token: &str, notification: &PushNotification) -> Result<(), NotifyError>;
}

/// Logs instead of delivering. Default gateway for local runs.
#[derive(Default)]
pub struct LoggingPushGateway;

#[async_trait]
impl PushGateway for LoggingPushGateway {
    async fn send(&self, token: &str, notification: &PushNotification) -> Result<(), NotifyError> {
        info!(
            token = %token,
            title = %notification.title,
            body = %notification.body,
            "Push notification (logging gateway)"
        );
        Ok(())
    }
}
