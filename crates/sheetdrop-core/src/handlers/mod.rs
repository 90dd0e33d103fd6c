//! Request handlers

pub mod export;
pub mod health;

pub use export::{CsvExport, CSV_CONTENT_TYPE};
pub use health::{Health, HealthStatus};
