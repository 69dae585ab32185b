//! Wizard controller — owns the current step and form state, and gates every
//! advance on validation.
//!
//! Pure state transitions only. Autosave and submission are driven by the
//! caller off the outcomes this controller returns.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::model::{Application, DocumentKind, DocumentSet};
use crate::wizard::form::{ApplicationForm, StagedDocument};
use crate::wizard::state::{StepOutcome, WizardStep};
use crate::wizard::validate::{self, PasswordPolicy, StandardPasswordPolicy, ValidationErrors};

/// Result of asking the controller to advance.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// Validation failed; inline errors to render. The step does not change.
    Blocked(ValidationErrors),
    /// Moved to the given step.
    Moved(WizardStep),
    /// Step-1 success on the unlicensed branch — caller runs the unlicensed
    /// finalization and switches to the progress dashboard.
    FinalizeUnlicensed,
    /// Review-step success — caller runs the full submission.
    Submit,
}

/// Holds wizard position and form values for one applicant session.
pub struct WizardController {
    step: WizardStep,
    form: ApplicationForm,
    staged: BTreeMap<DocumentKind, StagedDocument>,
    /// Documents already uploaded on a previous pass, from the loaded record.
    existing_documents: DocumentSet,
    errors: ValidationErrors,
    policy: Arc<dyn PasswordPolicy>,
    min_score: u8,
}

impl WizardController {
    pub fn new(policy: Arc<dyn PasswordPolicy>, min_score: u8) -> Self {
        Self {
            step: WizardStep::Identity,
            form: ApplicationForm::default(),
            staged: BTreeMap::new(),
            existing_documents: DocumentSet::default(),
            errors: ValidationErrors::new(),
            policy,
            min_score,
        }
    }

    /// Controller with the default password policy and threshold.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(StandardPasswordPolicy), 5)
    }

    /// Re-enter the wizard with an existing partial record: restores the
    /// saved step and all values except credentials.
    pub fn resume(policy: Arc<dyn PasswordPolicy>, min_score: u8, app: &Application) -> Self {
        let mut controller = Self::new(policy, min_score);
        controller.form.restore(app);
        controller.existing_documents = app.documents.clone();
        if let Some(step) = app.current_step {
            controller.step = WizardStep::from_number(step);
        }
        controller
    }

    /// Entry point for an unlicensed applicant whose badge has arrived:
    /// flips the branch flag and starts at the badge step.
    pub fn convert_to_licensed(
        policy: Arc<dyn PasswordPolicy>,
        min_score: u8,
        app: &Application,
    ) -> Self {
        let mut controller = Self::new(policy, min_score);
        controller.form.restore(app);
        controller.existing_documents = app.documents.clone();
        controller.form.is_licensed_driver = true;
        controller.step = WizardStep::Badge;
        controller
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn form(&self) -> &ApplicationForm {
        &self.form
    }

    pub fn staged_documents(&self) -> &BTreeMap<DocumentKind, StagedDocument> {
        &self.staged
    }

    /// Inline errors from the last blocked advance.
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// (current, total) for the progress bar.
    pub fn progress(&self) -> (u8, u8) {
        (
            self.step.number(),
            WizardStep::total_steps(self.form.branches()),
        )
    }

    /// Update a text field. Clears any stale error on that field.
    pub fn set_text(&mut self, field: &str, value: &str) -> bool {
        let known = self.form.apply_text(field, value);
        if known {
            self.clear_error(field);
        }
        known
    }

    /// Update a boolean field. Clears any stale error on that field.
    pub fn set_flag(&mut self, field: &str, value: bool) -> bool {
        let known = self.form.apply_flag(field, value);
        if known {
            self.clear_error(field);
        }
        known
    }

    /// Stage a file for upload at submission time.
    pub fn stage_document(&mut self, kind: DocumentKind, doc: StagedDocument) {
        self.staged.insert(kind, doc);
    }

    /// Run the current step's validation without moving.
    pub fn validate_current(&self) -> ValidationErrors {
        validate::validate_step(
            self.step,
            &self.form,
            &self.staged,
            &self.existing_documents,
            self.policy.as_ref(),
            self.min_score,
        )
    }

    /// Advance from the current step, gated by validation.
    pub fn next(&mut self) -> AdvanceOutcome {
        let errors = self.validate_current();
        if !errors.is_empty() {
            self.errors = errors.clone();
            return AdvanceOutcome::Blocked(errors);
        }
        self.errors.clear();

        match self.step.forward(self.form.branches()) {
            StepOutcome::Next(step) => {
                self.step = step;
                AdvanceOutcome::Moved(step)
            }
            StepOutcome::FinalizeUnlicensed => AdvanceOutcome::FinalizeUnlicensed,
            StepOutcome::Submit => AdvanceOutcome::Submit,
        }
    }

    /// Step back. Never validates; returns the new step, or the current one
    /// when already at step 1.
    pub fn back(&mut self) -> WizardStep {
        if let Some(step) = self.step.backward(self.form.branches()) {
            self.step = step;
        }
        self.step
    }

    fn clear_error(&mut self, field: &str) {
        self.errors.retain(|k, _| *k != field);
    }
}
