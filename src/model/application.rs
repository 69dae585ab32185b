//! Application record — the one-per-applicant document the whole workflow
//! revolves around.
//!
//! Keyed by the applicant's account id. Created implicitly on first autosave
//! under an anonymous identity, finalized on submission (`is_partial` drops
//! to false), then mutated only by staff updates or by the applicant from
//! the post-submission status page. Never hard-deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Review status of an application.
///
/// Staff may set any value at any time — there is no enforced ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Submitted,
    #[serde(rename = "Under Review")]
    UnderReview,
    Contacted,
    #[serde(rename = "Meeting Scheduled")]
    MeetingScheduled,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    /// All statuses, in the order staff dashboards display them.
    pub fn all() -> [ApplicationStatus; 6] {
        use ApplicationStatus::*;
        [
            Submitted,
            UnderReview,
            Contacted,
            MeetingScheduled,
            Approved,
            Rejected,
        ]
    }

    /// The DB/display string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::UnderReview => "Under Review",
            Self::Contacted => "Contacted",
            Self::MeetingScheduled => "Meeting Scheduled",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    /// Parse the DB/display string. Unknown strings fall back to `Submitted`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "Under Review" => Self::UnderReview,
            "Contacted" => Self::Contacted,
            "Meeting Scheduled" => Self::MeetingScheduled,
            "Approved" => Self::Approved,
            "Rejected" => Self::Rejected,
            _ => Self::Submitted,
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kinds of document an application can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Badge,
    DrivingLicence,
    Insurance,
    V5c,
    PhvLicence,
}

impl DocumentKind {
    pub fn all() -> [DocumentKind; 5] {
        use DocumentKind::*;
        [Badge, DrivingLicence, Insurance, V5c, PhvLicence]
    }

    /// Key used in upload paths and in the stored documents JSON.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Badge => "badge",
            Self::DrivingLicence => "driving_licence",
            Self::Insurance => "insurance",
            Self::V5c => "v5c",
            Self::PhvLicence => "phv_licence",
        }
    }

    /// Inverse of [`DocumentKind::key`], for route parameters.
    pub fn from_key(s: &str) -> Option<Self> {
        match s {
            "badge" => Some(Self::Badge),
            "driving_licence" => Some(Self::DrivingLicence),
            "insurance" => Some(Self::Insurance),
            "v5c" => Some(Self::V5c),
            "phv_licence" => Some(Self::PhvLicence),
            _ => None,
        }
    }

    /// Human-readable label for error reports and staff views.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Badge => "Badge Document",
            Self::DrivingLicence => "Driving License Document",
            Self::Insurance => "Insurance Certificate",
            Self::V5c => "Vehicle Logbook (V5C)",
            Self::PhvLicence => "PHV Licence",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Durable fetch URLs for uploaded documents, one slot per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driving_licence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v5c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phv_licence: Option<String>,
}

impl DocumentSet {
    pub fn get(&self, kind: DocumentKind) -> Option<&str> {
        match kind {
            DocumentKind::Badge => self.badge.as_deref(),
            DocumentKind::DrivingLicence => self.driving_licence.as_deref(),
            DocumentKind::Insurance => self.insurance.as_deref(),
            DocumentKind::V5c => self.v5c.as_deref(),
            DocumentKind::PhvLicence => self.phv_licence.as_deref(),
        }
    }

    pub fn set(&mut self, kind: DocumentKind, url: impl Into<String>) {
        let slot = match kind {
            DocumentKind::Badge => &mut self.badge,
            DocumentKind::DrivingLicence => &mut self.driving_licence,
            DocumentKind::Insurance => &mut self.insurance,
            DocumentKind::V5c => &mut self.v5c,
            DocumentKind::PhvLicence => &mut self.phv_licence,
        };
        *slot = Some(url.into());
    }

    pub fn is_empty(&self) -> bool {
        DocumentKind::all().iter().all(|k| self.get(*k).is_none())
    }
}

/// Number of milestones in the unlicensed checklist.
pub const CHECKLIST_LEN: usize = 5;

/// One of the fixed milestones tracked for unlicensed applicants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistItem {
    EligibilityChecked,
    DbsApplied,
    MedicalBooked,
    KnowledgeTestPassed,
    CouncilApplicationSubmitted,
    /// Not part of the 5-step checklist — flips the applicant onto the
    /// licensed flow when set.
    BadgeReceived,
}

impl ChecklistItem {
    /// The five checklist milestones, in journey order.
    pub fn checklist() -> [ChecklistItem; CHECKLIST_LEN] {
        use ChecklistItem::*;
        [
            EligibilityChecked,
            DbsApplied,
            MedicalBooked,
            KnowledgeTestPassed,
            CouncilApplicationSubmitted,
        ]
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::EligibilityChecked => "eligibility_checked",
            Self::DbsApplied => "dbs_applied",
            Self::MedicalBooked => "medical_booked",
            Self::KnowledgeTestPassed => "knowledge_test_passed",
            Self::CouncilApplicationSubmitted => "council_application_submitted",
            Self::BadgeReceived => "badge_received",
        }
    }
}

/// Progress tracking for applicants who do not yet hold a badge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlicensedProgress {
    pub eligibility_checked: bool,
    pub dbs_applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbs_document_url: Option<String>,
    pub medical_booked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_document_url: Option<String>,
    pub knowledge_test_passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_test_document_url: Option<String>,
    pub council_application_submitted: bool,
    /// Triggers conversion to the licensed flow.
    pub badge_received: bool,
}

impl UnlicensedProgress {
    pub fn is_set(&self, item: ChecklistItem) -> bool {
        match item {
            ChecklistItem::EligibilityChecked => self.eligibility_checked,
            ChecklistItem::DbsApplied => self.dbs_applied,
            ChecklistItem::MedicalBooked => self.medical_booked,
            ChecklistItem::KnowledgeTestPassed => self.knowledge_test_passed,
            ChecklistItem::CouncilApplicationSubmitted => self.council_application_submitted,
            ChecklistItem::BadgeReceived => self.badge_received,
        }
    }

    pub fn set(&mut self, item: ChecklistItem, value: bool) {
        match item {
            ChecklistItem::EligibilityChecked => self.eligibility_checked = value,
            ChecklistItem::DbsApplied => self.dbs_applied = value,
            ChecklistItem::MedicalBooked => self.medical_booked = value,
            ChecklistItem::KnowledgeTestPassed => self.knowledge_test_passed = value,
            ChecklistItem::CouncilApplicationSubmitted => {
                self.council_application_submitted = value
            }
            ChecklistItem::BadgeReceived => self.badge_received = value,
        }
    }

    /// Count of completed checklist milestones (badge receipt excluded).
    pub fn completed_steps(&self) -> usize {
        ChecklistItem::checklist()
            .iter()
            .filter(|item| self.is_set(**item))
            .count()
    }

    /// Fraction of the checklist completed, for progress bars.
    pub fn fraction_complete(&self) -> f64 {
        self.completed_steps() as f64 / CHECKLIST_LEN as f64
    }
}

/// Details collected from applicants who already hold a badge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensedDetails {
    pub badge_number: String,
    pub badge_expiry: String,
    pub issuing_council: String,
    pub driving_licence_number: String,
    pub licence_expiry: String,
    /// DBS check number, validated by councils. Collected post-submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbs_check_number: Option<String>,
    /// true = own vehicle, false = fleet/rented.
    pub has_own_vehicle: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_reg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_expiry: Option<String>,
}

/// The two mutually exclusive branches of an application.
///
/// A sum type rather than a licensed flag plus optional fields, so illegal
/// combinations (vehicle data on an unlicensed record) cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum ApplicationDetails {
    Licensed(LicensedDetails),
    Unlicensed(UnlicensedProgress),
}

impl ApplicationDetails {
    pub fn is_licensed(&self) -> bool {
        matches!(self, Self::Licensed(_))
    }

    pub fn as_licensed(&self) -> Option<&LicensedDetails> {
        match self {
            Self::Licensed(d) => Some(d),
            Self::Unlicensed(_) => None,
        }
    }

    pub fn as_unlicensed(&self) -> Option<&UnlicensedProgress> {
        match self {
            Self::Licensed(_) => None,
            Self::Unlicensed(p) => Some(p),
        }
    }
}

/// One driver application, keyed by the applicant's account id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    /// Account id of the applicant (anonymous until credential linking).
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub area: String,
    pub details: ApplicationDetails,
    pub documents: DocumentSet,
    pub status: ApplicationStatus,
    /// While true the record is an in-progress autosave, excluded from
    /// staff-facing listings.
    pub is_partial: bool,
    /// Wizard step to resume at, 1-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn is_licensed_driver(&self) -> bool {
        self.details.is_licensed()
    }

    pub fn has_own_vehicle(&self) -> bool {
        self.details
            .as_licensed()
            .map(|d| d.has_own_vehicle)
            .unwrap_or(false)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_roundtrip() {
        for status in ApplicationStatus::all() {
            assert_eq!(ApplicationStatus::from_str_lossy(status.as_str()), status);
        }
        assert_eq!(
            ApplicationStatus::from_str_lossy("garbage"),
            ApplicationStatus::Submitted
        );
    }

    #[test]
    fn status_serde_matches_display() {
        for status in ApplicationStatus::all() {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
    }

    #[test]
    fn document_set_slot_roundtrip() {
        let mut docs = DocumentSet::default();
        assert!(docs.is_empty());
        docs.set(DocumentKind::Badge, "https://docs/badge.pdf");
        docs.set(DocumentKind::Badge, "https://docs/new-badge.pdf");
        assert_eq!(docs.get(DocumentKind::Badge), Some("https://docs/new-badge.pdf"));
        assert_eq!(docs.get(DocumentKind::V5c), None);
        assert!(!docs.is_empty());
    }

    #[test]
    fn document_kind_orders_for_map_keys() {
        let mut staged = std::collections::BTreeMap::new();
        for kind in DocumentKind::all() {
            staged.insert(kind, kind.key());
        }
        let keys: Vec<_> = staged.into_keys().collect();
        assert_eq!(keys, DocumentKind::all());
    }

    #[test]
    fn checklist_fraction() {
        let mut progress = UnlicensedProgress::default();
        assert_eq!(progress.completed_steps(), 0);
        assert_eq!(progress.fraction_complete(), 0.0);

        progress.set(ChecklistItem::EligibilityChecked, true);
        progress.set(ChecklistItem::DbsApplied, true);
        assert_eq!(progress.completed_steps(), 2);
        assert!((progress.fraction_complete() - 0.4).abs() < f64::EPSILON);

        // Badge receipt does not count toward the checklist fraction
        progress.set(ChecklistItem::BadgeReceived, true);
        assert_eq!(progress.completed_steps(), 2);
    }

    #[test]
    fn details_sum_type_accessors() {
        let licensed = ApplicationDetails::Licensed(LicensedDetails {
            has_own_vehicle: true,
            ..Default::default()
        });
        assert!(licensed.is_licensed());
        assert!(licensed.as_unlicensed().is_none());

        let unlicensed = ApplicationDetails::Unlicensed(UnlicensedProgress::default());
        assert!(!unlicensed.is_licensed());
        assert!(unlicensed.as_licensed().is_none());
    }
}
