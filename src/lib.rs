//! Driver Intake — multi-step driver-recruitment application workflow.

pub mod auth;
pub mod autosave;
pub mod config;
pub mod docs;
pub mod error;
pub mod http;
pub mod migration;
pub mod model;
pub mod notify;
pub mod review;
pub mod store;
pub mod submit;
pub mod wizard;
