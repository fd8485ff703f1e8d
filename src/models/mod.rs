pub mod correction;
pub mod data;
pub mod format;
pub mod quality;
pub mod rules;

pub use correction::*;
pub use data::*;
pub use format::{FormatCatalog, FormatMatchResult, FormatSpec, QualityThresholds};
pub use quality::*;
pub use rules::{
    CatalogVersionInfo, Rule, RuleCatalog, RuleCategory, RuleEvaluationResult, Severity, Threshold,
    STANDARD_JURISDICTION,
};
