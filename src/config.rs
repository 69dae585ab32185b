//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Intake service configuration.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Service name for identification.
    pub name: String,
    /// Quiet period after the last form change before a partial save fires.
    pub autosave_debounce: Duration,
    /// Minimum password-policy score required at step 1.
    pub password_min_score: u8,
    /// Delay before the confirmation view auto-navigates after a successful
    /// submission.
    pub redirect_delay: Duration,
    /// Outbound chat webhook URL, if configured.
    pub chat_webhook_url: Option<String>,
    /// Branding used in notification payloads.
    pub branding: Branding,
}

impl IntakeConfig {
    /// Build from `DRIVER_INTAKE_*` environment variables, with defaults
    /// for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };
        Self {
            autosave_debounce: millis(
                "DRIVER_INTAKE_AUTOSAVE_DEBOUNCE_MS",
                defaults.autosave_debounce,
            ),
            redirect_delay: millis("DRIVER_INTAKE_REDIRECT_DELAY_MS", defaults.redirect_delay),
            chat_webhook_url: std::env::var("DRIVER_INTAKE_CHAT_WEBHOOK").ok(),
            branding: Branding {
                company_name: std::env::var("DRIVER_INTAKE_COMPANY_NAME")
                    .unwrap_or(defaults.branding.company_name),
                logo_url: std::env::var("DRIVER_INTAKE_LOGO_URL")
                    .unwrap_or(defaults.branding.logo_url),
                tagline: std::env::var("DRIVER_INTAKE_TAGLINE").ok(),
            },
            ..defaults
        }
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            name: "driver-intake".to_string(),
            autosave_debounce: Duration::from_millis(1500),
            password_min_score: 5,
            redirect_delay: Duration::from_secs(3),
            chat_webhook_url: None,
            branding: Branding::default(),
        }
    }
}

/// Branding shown in applicant-facing notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branding {
    pub company_name: String,
    pub logo_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            company_name: "Driver Recruitment".to_string(),
            logo_url: "/logo.png".to_string(),
            tagline: None,
        }
    }
}
