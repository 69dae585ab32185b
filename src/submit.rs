//! Submission — the one-shot pipeline that turns a wizard session into a
//! finalized application.
//!
//! Order matters: credentials are linked first (so uploads and the final
//! write happen under a permanent account), then staged documents upload
//! independently, then one merge write flips `is_partial` off. A failure at
//! any stage leaves everything already persisted in place; retrying the
//! submission picks up from the stored state.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::IdentityProvider;
use crate::docs::{document_path, DocumentStore};
use crate::error::{AuthError, StoreError, UploadError};
use crate::model::{
    ActivityEntry, ActivityKind, Application, ApplicationDetails, ApplicationStatus, DocumentKind,
    DocumentSet, UnlicensedProgress,
};
use crate::store::{ApplicationPatch, ApplicationStore};
use crate::wizard::{field_label, ApplicationForm, StagedDocument};

/// A submission failure, shaped for the error modal: which part of the form
/// to blame, and what to say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFailure {
    pub field_label: String,
    pub message: String,
}

impl SubmissionFailure {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field_label: field_label(field).to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SubmissionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field_label, self.message)
    }
}

fn auth_failure(e: &AuthError) -> SubmissionFailure {
    match e {
        AuthError::EmailAlreadyInUse | AuthError::InvalidEmail => {
            SubmissionFailure::new("email", e.to_string())
        }
        AuthError::WeakPassword => SubmissionFailure::new("password", e.to_string()),
        _ => SubmissionFailure::new("submission", e.to_string()),
    }
}

fn upload_failure(kind: DocumentKind, e: &UploadError) -> SubmissionFailure {
    SubmissionFailure {
        field_label: field_label("file_upload").to_string(),
        message: format!("{} upload failed: {e}", kind.label()),
    }
}

fn store_failure(e: &StoreError) -> SubmissionFailure {
    SubmissionFailure::new("submission", e.to_string())
}

/// Runs submissions and unlicensed finalizations.
pub struct SubmissionAgent {
    store: Arc<dyn ApplicationStore>,
    identity: Arc<dyn IdentityProvider>,
    documents: Arc<dyn DocumentStore>,
}

impl SubmissionAgent {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        identity: Arc<dyn IdentityProvider>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            store,
            identity,
            documents,
        }
    }

    /// Submit a completed licensed-path wizard session.
    ///
    /// On success the returned record is complete (`is_partial == false`,
    /// status `Submitted`). On failure whatever progressed stays persisted,
    /// so the applicant can fix the reported field and resubmit.
    pub async fn submit(
        &self,
        uid: &str,
        form: &ApplicationForm,
        staged: &BTreeMap<DocumentKind, StagedDocument>,
    ) -> Result<Application, SubmissionFailure> {
        self.link_credentials(uid, form).await?;

        // Uploads are independent; one bad file must not block the others
        let mut uploaded = DocumentSet::default();
        let mut first_failure: Option<SubmissionFailure> = None;
        for (kind, doc) in staged {
            let path = document_path(uid, *kind, &doc.filename);
            match self.documents.upload(&path, &doc.content).await {
                Ok(url) => uploaded.set(*kind, url),
                Err(e) => {
                    warn!(application_id = %uid, kind = %kind, error = %e, "Document upload failed");
                    first_failure.get_or_insert(upload_failure(*kind, &e));
                }
            }
        }

        if let Some(failure) = first_failure {
            // Persist the uploads that did land, but stay partial
            if !uploaded.is_empty() {
                let patch = ApplicationPatch {
                    documents: Some(uploaded),
                    ..Default::default()
                };
                if let Err(e) = self.store.merge(uid, patch).await {
                    warn!(application_id = %uid, error = %e, "Failed to persist partial uploads");
                }
            }
            return Err(failure);
        }

        let patch = ApplicationPatch {
            first_name: Some(form.first_name.clone()),
            last_name: Some(form.last_name.clone()),
            email: Some(form.email.clone()),
            phone: Some(form.phone.clone()),
            area: Some(form.area.clone()),
            details: Some(ApplicationDetails::Licensed(form.licensed_details())),
            documents: Some(uploaded),
            status: Some(ApplicationStatus::Submitted),
            is_partial: Some(false),
            ..Default::default()
        };
        let app = self
            .store
            .merge(uid, patch)
            .await
            .map_err(|e| store_failure(&e))?;

        self.log_submission(uid, "Application submitted").await;
        info!(application_id = %uid, "Application submitted");
        Ok(app)
    }

    /// Finalize an unlicensed applicant straight from step 1.
    ///
    /// There is no document or vehicle data to collect; the record goes
    /// complete immediately and the applicant lands on the progress
    /// checklist.
    pub async fn finalize_unlicensed(
        &self,
        uid: &str,
        form: &ApplicationForm,
    ) -> Result<Application, SubmissionFailure> {
        self.link_credentials(uid, form).await?;

        let patch = ApplicationPatch {
            first_name: Some(form.first_name.clone()),
            last_name: Some(form.last_name.clone()),
            email: Some(form.email.clone()),
            phone: Some(form.phone.clone()),
            area: Some(form.area.clone()),
            details: Some(ApplicationDetails::Unlicensed(UnlicensedProgress::default())),
            status: Some(ApplicationStatus::Submitted),
            is_partial: Some(false),
            ..Default::default()
        };
        let app = self
            .store
            .merge(uid, patch)
            .await
            .map_err(|e| store_failure(&e))?;

        self.log_submission(uid, "Unlicensed application registered")
            .await;
        info!(application_id = %uid, "Unlicensed applicant registered");
        Ok(app)
    }

    async fn link_credentials(
        &self,
        uid: &str,
        form: &ApplicationForm,
    ) -> Result<(), SubmissionFailure> {
        match self
            .identity
            .link_credentials(uid, &form.email, &form.password)
            .await
        {
            Ok(_) => Ok(()),
            // A previous attempt already linked this account; carry on
            Err(AuthError::CredentialAlreadyInUse) => {
                info!(application_id = %uid, "Credentials already linked, continuing");
                Ok(())
            }
            Err(e) => Err(auth_failure(&e)),
        }
    }

    async fn log_submission(&self, uid: &str, detail: &str) {
        let entry = ActivityEntry::new(uid, ActivityKind::Submitted, detail);
        if let Err(e) = self.store.append_activity(&entry).await {
            warn!(application_id = %uid, error = %e, "Failed to log submission activity");
        }
    }
}
