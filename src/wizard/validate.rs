//! Per-step validation — pure functions from form state to field errors.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::{DocumentKind, DocumentSet};
use crate::wizard::form::{ApplicationForm, StagedDocument};
use crate::wizard::state::WizardStep;

/// Field id → error message mapping. Empty means the step passes.
pub type ValidationErrors = BTreeMap<&'static str, String>;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\S+@\S+\.\S+$").unwrap());
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^07\d{9}$").unwrap());

/// Strength evaluation of a candidate password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordScore {
    /// Requirements met.
    pub score: u8,
    /// Requirements checked.
    pub max: u8,
}

/// External strength-evaluator hook for step-1 passwords.
pub trait PasswordPolicy: Send + Sync {
    fn evaluate(&self, password: &str) -> PasswordScore;
}

/// Default policy: length ≥ 8, a lowercase letter, an uppercase letter, a
/// digit, and a symbol. All five are required at the default threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPasswordPolicy;

impl PasswordPolicy for StandardPasswordPolicy {
    fn evaluate(&self, password: &str) -> PasswordScore {
        let checks = [
            password.len() >= 8,
            password.chars().any(|c| c.is_ascii_lowercase()),
            password.chars().any(|c| c.is_ascii_uppercase()),
            password.chars().any(|c| c.is_ascii_digit()),
            password.chars().any(|c| !c.is_alphanumeric()),
        ];
        PasswordScore {
            score: checks.iter().filter(|ok| **ok).count() as u8,
            max: checks.len() as u8,
        }
    }
}

/// Strip the separators users type into phone numbers.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect()
}

/// Whether a normalized phone number is a valid UK mobile number.
pub fn phone_is_valid(raw: &str) -> bool {
    PHONE_RE.is_match(&normalize_phone(raw))
}

/// Validate one wizard step.
///
/// Document-required fields are satisfied by either a newly staged file or a
/// URL already present on the loaded record, so re-validation after a resume
/// passes without a fresh upload.
pub fn validate_step(
    step: WizardStep,
    form: &ApplicationForm,
    staged: &BTreeMap<DocumentKind, StagedDocument>,
    existing: &DocumentSet,
    policy: &dyn PasswordPolicy,
    min_score: u8,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    let mut require = |field: &'static str, value: &str, message: &str| {
        if value.trim().is_empty() {
            errors.insert(field, message.to_string());
        }
    };

    match step {
        WizardStep::Identity => {
            require("first_name", &form.first_name, "First name is required");
            require("last_name", &form.last_name, "Last name is required");
            require("email", &form.email, "Email is required");
            require("phone", &form.phone, "Mobile number is required");
            require("area", &form.area, "Area / City of work is required");

            if !errors.contains_key("email") && !EMAIL_RE.is_match(&form.email) {
                errors.insert("email", "Email address is invalid".to_string());
            }
            if !errors.contains_key("phone") && !phone_is_valid(&form.phone) {
                errors.insert(
                    "phone",
                    "Please enter a valid 11-digit UK mobile number starting with 07".to_string(),
                );
            }

            let password = form.password_str();
            if password.is_empty() {
                errors.insert("password", "Password is required".to_string());
            } else if policy.evaluate(password).score < min_score {
                errors.insert(
                    "password",
                    "Password does not meet all requirements".to_string(),
                );
            }
            if !form.passwords_match() {
                errors.insert("confirm_password", "Passwords do not match".to_string());
            }
        }
        WizardStep::Badge => {
            require("badge_number", &form.badge_number, "Badge number is required");
            require(
                "badge_expiry",
                &form.badge_expiry,
                "Badge expiry date is required",
            );
            require(
                "issuing_council",
                &form.issuing_council,
                "Issuing council is required",
            );
        }
        WizardStep::Licence => {
            require(
                "driving_licence_number",
                &form.driving_licence_number,
                "Driving license number is required",
            );
            require(
                "licence_expiry",
                &form.licence_expiry,
                "License expiry date is required",
            );
        }
        WizardStep::Documents => {
            document_gate(
                &mut errors,
                "badge_document",
                DocumentKind::Badge,
                "Badge document is required",
                staged,
                existing,
            );
            document_gate(
                &mut errors,
                "driving_licence_document",
                DocumentKind::DrivingLicence,
                "Driving license document is required",
                staged,
                existing,
            );
        }
        WizardStep::VehicleOwnership => {
            // Binary question, either answer is valid
        }
        WizardStep::VehicleDetails => {
            require("vehicle_make", &form.vehicle_make, "Vehicle make is required");
            require(
                "vehicle_model",
                &form.vehicle_model,
                "Vehicle model is required",
            );
            require(
                "vehicle_reg",
                &form.vehicle_reg,
                "Vehicle registration is required",
            );
            require(
                "insurance_expiry",
                &form.insurance_expiry,
                "Insurance expiry date is required",
            );
            document_gate(
                &mut errors,
                "insurance_document",
                DocumentKind::Insurance,
                "Insurance document is required",
                staged,
                existing,
            );
        }
        WizardStep::Review => {
            if !form.details_confirmed {
                errors.insert(
                    "details_confirmed",
                    "Please confirm your details are correct".to_string(),
                );
            }
        }
    }

    errors
}

fn document_gate(
    errors: &mut ValidationErrors,
    field: &'static str,
    kind: DocumentKind,
    message: &str,
    staged: &BTreeMap<DocumentKind, StagedDocument>,
    existing: &DocumentSet,
) {
    if !staged.contains_key(&kind) && existing.get(kind).is_none() {
        errors.insert(field, message.to_string());
    }
}
