pub mod error;
pub mod snapshot;

pub use error::ComplianceError;
pub use snapshot::Snapshot;
