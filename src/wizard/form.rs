//! In-memory form state for the wizard.
//!
//! Credentials live in `SecretString`s and are excluded from every persisted
//! snapshot by construction — partial saves are built from the non-credential
//! fields only.

use secrecy::{ExposeSecret, SecretString};

use crate::model::{Application, ApplicationDetails, LicensedDetails};
use crate::wizard::state::Branches;

/// A file the applicant has selected but not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDocument {
    pub filename: String,
    pub content: Vec<u8>,
}

impl StagedDocument {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
        }
    }
}

/// Everything the applicant types into the wizard.
#[derive(Debug, Clone)]
pub struct ApplicationForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub area: String,
    pub password: SecretString,
    pub confirm_password: SecretString,
    pub is_licensed_driver: bool,
    pub has_own_vehicle: bool,
    pub badge_number: String,
    pub badge_expiry: String,
    pub issuing_council: String,
    pub driving_licence_number: String,
    pub licence_expiry: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub vehicle_reg: String,
    pub insurance_expiry: String,
    /// Review-step confirmation checkbox.
    pub details_confirmed: bool,
}

impl Default for ApplicationForm {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: String::new(),
            area: String::new(),
            password: SecretString::from(""),
            confirm_password: SecretString::from(""),
            is_licensed_driver: false,
            has_own_vehicle: false,
            badge_number: String::new(),
            badge_expiry: String::new(),
            issuing_council: String::new(),
            driving_licence_number: String::new(),
            licence_expiry: String::new(),
            vehicle_make: String::new(),
            vehicle_model: String::new(),
            vehicle_reg: String::new(),
            insurance_expiry: String::new(),
            details_confirmed: false,
        }
    }
}

impl ApplicationForm {
    /// Apply a text-field update by field id. Returns false for unknown ids.
    pub fn apply_text(&mut self, field: &str, value: &str) -> bool {
        match field {
            "first_name" => self.first_name = value.to_string(),
            "last_name" => self.last_name = value.to_string(),
            "email" => self.email = value.to_string(),
            "phone" => self.phone = value.to_string(),
            "area" => self.area = value.to_string(),
            "password" => self.password = SecretString::from(value),
            "confirm_password" => self.confirm_password = SecretString::from(value),
            "badge_number" => self.badge_number = value.to_string(),
            "badge_expiry" => self.badge_expiry = value.to_string(),
            "issuing_council" => self.issuing_council = value.to_string(),
            "driving_licence_number" => self.driving_licence_number = value.to_string(),
            "licence_expiry" => self.licence_expiry = value.to_string(),
            "vehicle_make" => self.vehicle_make = value.to_string(),
            "vehicle_model" => self.vehicle_model = value.to_string(),
            "vehicle_reg" => self.vehicle_reg = value.to_string(),
            "insurance_expiry" => self.insurance_expiry = value.to_string(),
            _ => return false,
        }
        true
    }

    /// Apply a boolean-field update by field id. Returns false for unknown ids.
    pub fn apply_flag(&mut self, field: &str, value: bool) -> bool {
        match field {
            "is_licensed_driver" => self.is_licensed_driver = value,
            "has_own_vehicle" => self.has_own_vehicle = value,
            "details_confirmed" => self.details_confirmed = value,
            _ => return false,
        }
        true
    }

    pub fn branches(&self) -> Branches {
        Branches {
            is_licensed_driver: self.is_licensed_driver,
            has_own_vehicle: self.has_own_vehicle,
        }
    }

    pub fn password_str(&self) -> &str {
        self.password.expose_secret()
    }

    pub fn passwords_match(&self) -> bool {
        self.password.expose_secret() == self.confirm_password.expose_secret()
    }

    /// Restore values from a previously saved partial record.
    ///
    /// Password fields always start blank — they are never persisted, so
    /// there is nothing to restore.
    pub fn restore(&mut self, app: &Application) {
        self.first_name = app.first_name.clone();
        self.last_name = app.last_name.clone();
        self.email = app.email.clone();
        self.phone = app.phone.clone();
        self.area = app.area.clone();
        self.password = SecretString::from("");
        self.confirm_password = SecretString::from("");
        match &app.details {
            ApplicationDetails::Licensed(d) => {
                self.is_licensed_driver = true;
                self.has_own_vehicle = d.has_own_vehicle;
                self.badge_number = d.badge_number.clone();
                self.badge_expiry = d.badge_expiry.clone();
                self.issuing_council = d.issuing_council.clone();
                self.driving_licence_number = d.driving_licence_number.clone();
                self.licence_expiry = d.licence_expiry.clone();
                self.vehicle_make = d.vehicle_make.clone().unwrap_or_default();
                self.vehicle_model = d.vehicle_model.clone().unwrap_or_default();
                self.vehicle_reg = d.vehicle_reg.clone().unwrap_or_default();
                self.insurance_expiry = d.insurance_expiry.clone().unwrap_or_default();
            }
            ApplicationDetails::Unlicensed(_) => {
                self.is_licensed_driver = false;
            }
        }
        // Confirmation is re-acknowledged on every pass through review
        self.details_confirmed = false;
    }

    /// Build the licensed-branch details from the current values.
    ///
    /// Vehicle fields are carried only when the applicant has their own
    /// vehicle, so a fleet driver's record cannot end up with stray vehicle
    /// data.
    pub fn licensed_details(&self) -> LicensedDetails {
        let vehicle = |s: &String| {
            if self.has_own_vehicle && !s.is_empty() {
                Some(s.clone())
            } else {
                None
            }
        };
        LicensedDetails {
            badge_number: self.badge_number.clone(),
            badge_expiry: self.badge_expiry.clone(),
            issuing_council: self.issuing_council.clone(),
            driving_licence_number: self.driving_licence_number.clone(),
            licence_expiry: self.licence_expiry.clone(),
            dbs_check_number: None,
            has_own_vehicle: self.has_own_vehicle,
            vehicle_make: vehicle(&self.vehicle_make),
            vehicle_model: vehicle(&self.vehicle_model),
            vehicle_reg: vehicle(&self.vehicle_reg),
            insurance_expiry: vehicle(&self.insurance_expiry),
        }
    }
}

/// Human-readable label for a field id, for submission-error modals.
pub fn field_label(field: &str) -> &str {
    match field {
        "first_name" => "First Name",
        "last_name" => "Last Name",
        "email" => "Email Address",
        "phone" => "Mobile Number",
        "area" => "Area / City of Work",
        "password" => "Password",
        "confirm_password" => "Confirm Password",
        "badge_number" => "Badge Number",
        "badge_expiry" => "Badge Expiry Date",
        "issuing_council" => "Issuing Council",
        "driving_licence_number" => "Driving License Number",
        "licence_expiry" => "License Expiry Date",
        "vehicle_make" => "Vehicle Make",
        "vehicle_model" => "Vehicle Model",
        "vehicle_reg" => "Vehicle Registration",
        "insurance_expiry" => "Insurance Expiry Date",
        "details_confirmed" => "Confirmation",
        "badge_document" => "Badge Document",
        "driving_licence_document" => "Driving License Document",
        "insurance_document" => "Insurance Certificate",
        "file_upload" => "File Upload",
        "submission" => "Application Submission",
        other => other,
    }
}
