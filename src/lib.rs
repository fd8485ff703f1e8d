//! Portrait photo compliance checking and correction against ICAO-style photo formats.
//!
//! [`PhotoValidator`] is the usual entry point: it validates an image against a named
//! format, detects formats from pixel dimensions and auto-fixes the correctable issues.

pub mod config;
pub mod correction;
pub mod models;
pub mod photo_validator;
pub mod processing;
pub mod utils;
pub mod validation;

pub use config::Settings;
pub use photo_validator::PhotoValidator;
pub use utils::ComplianceError;
