pub mod background;
pub mod compliance;
pub mod dimensions;
pub mod format;
pub mod position;
pub mod quality;
pub mod rules;

pub use background::BackgroundValidator;
pub use compliance::{ComplianceValidator, ComplianceWeights, COMPLIANCE_WEIGHTS, DEFAULT_PASS_THRESHOLD};
pub use dimensions::DimensionValidator;
pub use format::FormatDetector;
pub use position::PositionValidator;
pub use quality::QualityValidator;
pub use rules::RuleEvaluator;
