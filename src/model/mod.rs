//! Data model — application records, messages, and activity log entries.

pub mod application;
pub mod message;

pub use application::{
    Application, ApplicationDetails, ApplicationStatus, ChecklistItem, DocumentKind, DocumentSet,
    LicensedDetails, UnlicensedProgress,
};
pub use message::{ActivityEntry, ActivityKind, Message, MessageSender};
