//! Identity provider seam — anonymous sessions and credential linking.
//!
//! The wizard runs under an anonymous identity from the first keystroke so
//! autosaves have a stable account id. Submission upgrades that identity in
//! place by linking the email/password from step 1, which keeps the account
//! id (and everything stored under it) unchanged.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::error::AuthError;

/// Provider-side floor on password length. Deliberately weaker than the
/// wizard's policy: the wizard validates before this is ever hit, but a
/// provider rejection still needs a mapped error.
const PROVIDER_MIN_PASSWORD_LEN: usize = 6;

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable account id, also the application record key.
    pub uid: String,
    /// Present once credentials are linked.
    pub email: Option<String>,
    pub is_anonymous: bool,
}

/// Async identity-provider interface.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Mint a fresh anonymous identity.
    async fn sign_in_anonymously(&self) -> Result<Identity, AuthError>;

    /// Attach email/password credentials to an anonymous identity,
    /// preserving its uid.
    async fn link_credentials(
        &self,
        uid: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError>;

    /// Sign in with previously linked credentials.
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Identity, AuthError>;
}

#[derive(Debug, Clone)]
struct AccountRecord {
    email: Option<String>,
    password: Option<String>,
}

/// In-memory provider used by tests and local runs.
#[derive(Default)]
pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<String, AccountRecord>>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, AccountRecord>> {
        // Mutex poisoning only happens if a holder panicked; propagating the
        // inner map is still sound for tests
        match self.accounts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in_anonymously(&self) -> Result<Identity, AuthError> {
        let uid = Uuid::new_v4().to_string();
        self.lock().insert(
            uid.clone(),
            AccountRecord {
                email: None,
                password: None,
            },
        );
        Ok(Identity {
            uid,
            email: None,
            is_anonymous: true,
        })
    }

    async fn link_credentials(
        &self,
        uid: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<Identity, AuthError> {
        if !email.contains('@') || !email.contains('.') {
            return Err(AuthError::InvalidEmail);
        }
        if password.expose_secret().len() < PROVIDER_MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let mut accounts = self.lock();
        if accounts
            .iter()
            .any(|(id, rec)| id != uid && rec.email.as_deref() == Some(email))
        {
            return Err(AuthError::EmailAlreadyInUse);
        }
        let record = accounts
            .get_mut(uid)
            .ok_or_else(|| AuthError::NoSession(uid.to_string()))?;
        if record.email.is_some() {
            return Err(AuthError::CredentialAlreadyInUse);
        }
        record.email = Some(email.to_string());
        record.password = Some(password.expose_secret().to_string());

        Ok(Identity {
            uid: uid.to_string(),
            email: Some(email.to_string()),
            is_anonymous: false,
        })
    }

    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Identity, AuthError> {
        let accounts = self.lock();
        let found = accounts.iter().find(|(_, rec)| {
            rec.email.as_deref() == Some(email)
                && rec.password.as_deref() == Some(password.expose_secret())
        });
        match found {
            Some((uid, rec)) => Ok(Identity {
                uid: uid.clone(),
                email: rec.email.clone(),
                is_anonymous: false,
            }),
            None => Err(AuthError::InvalidCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[tokio::test]
    async fn linking_preserves_uid() {
        let provider = MemoryIdentityProvider::new();
        let anon = provider.sign_in_anonymously().await.unwrap();
        assert!(anon.is_anonymous);

        let linked = provider
            .link_credentials(&anon.uid, "amara@example.com", &secret("S3cure!pw"))
            .await
            .unwrap();
        assert_eq!(linked.uid, anon.uid);
        assert!(!linked.is_anonymous);
        assert_eq!(linked.email.as_deref(), Some("amara@example.com"));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let provider = MemoryIdentityProvider::new();
        let a = provider.sign_in_anonymously().await.unwrap();
        let b = provider.sign_in_anonymously().await.unwrap();
        provider
            .link_credentials(&a.uid, "amara@example.com", &secret("S3cure!pw"))
            .await
            .unwrap();

        let err = provider
            .link_credentials(&b.uid, "amara@example.com", &secret("0ther!pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailAlreadyInUse));
    }

    #[tokio::test]
    async fn relinking_same_account_is_rejected() {
        let provider = MemoryIdentityProvider::new();
        let anon = provider.sign_in_anonymously().await.unwrap();
        provider
            .link_credentials(&anon.uid, "amara@example.com", &secret("S3cure!pw"))
            .await
            .unwrap();

        let err = provider
            .link_credentials(&anon.uid, "other@example.com", &secret("S3cure!pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CredentialAlreadyInUse));
    }

    #[tokio::test]
    async fn sign_in_roundtrip() {
        let provider = MemoryIdentityProvider::new();
        let anon = provider.sign_in_anonymously().await.unwrap();
        provider
            .link_credentials(&anon.uid, "amara@example.com", &secret("S3cure!pw"))
            .await
            .unwrap();

        let back = provider
            .sign_in("amara@example.com", &secret("S3cure!pw"))
            .await
            .unwrap();
        assert_eq!(back.uid, anon.uid);

        let err = provider
            .sign_in("amara@example.com", &secret("wrong-pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn weak_password_maps_to_provider_error() {
        let provider = MemoryIdentityProvider::new();
        let anon = provider.sign_in_anonymously().await.unwrap();
        let err = provider
            .link_credentials(&anon.uid, "amara@example.com", &secret("short"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::WeakPassword));
    }
}
