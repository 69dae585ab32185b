//! Application wizard — step flow, form state, validation, and the
//! controller gluing them together.
//!
//! The wizard has two mutually exclusive paths. Unlicensed applicants finish
//! at step 1 and move to a progress dashboard; licensed applicants continue
//! through badge, licence, document, and vehicle steps to a final review.
//! The controller owns only in-memory state — persistence is driven by the
//! autosave and submission agents.

pub mod controller;
pub mod form;
pub mod state;
pub mod validate;

pub use controller::{AdvanceOutcome, WizardController};
pub use form::{ApplicationForm, StagedDocument, field_label};
pub use state::{Branches, StepOutcome, WizardStep};
pub use validate::{PasswordPolicy, PasswordScore, StandardPasswordPolicy, ValidationErrors};
