use crate::utils::ComplianceError;
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const DEFAULT_RULES: &str = include_str!("../../config/icao_rules.json");

/// Default jurisdiction, always present in every catalog.
pub const STANDARD_JURISDICTION: &str = "standard_icao";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "MINOR")]
    Minor,
    #[serde(alias = "MAJOR")]
    Major,
    #[serde(alias = "CRITICAL")]
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Minor => "MINOR",
            Severity::Major => "MAJOR",
            Severity::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Glasses,
    HeadCovering,
    Expression,
    Quality,
    Lighting,
}

/// How an observed value is compared against a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Threshold {
    /// Boundary rule: passes when `observed >= value`.
    Minimum { value: f64 },
    /// Ceiling rule: passes when `observed <= value`.
    Maximum { value: f64 },
    /// Band rule: passes when `lower <= observed <= upper`.
    Band { lower: f64, upper: f64 },
    /// Detector confidence rule: passes when `observed < value`.
    Detector { value: f64 },
}

impl Threshold {
    pub fn passes(&self, observed: f64) -> bool {
        match *self {
            Threshold::Minimum { value } => observed >= value,
            Threshold::Maximum { value } => observed <= value,
            Threshold::Band { lower, upper } => lower <= observed && observed <= upper,
            Threshold::Detector { value } => observed < value,
        }
    }

    pub fn is_valid(&self) -> bool {
        match *self {
            Threshold::Minimum { value }
            | Threshold::Maximum { value }
            | Threshold::Detector { value } => value.is_finite(),
            Threshold::Band { lower, upper } => lower.is_finite() && upper.is_finite() && lower <= upper,
        }
    }

    pub fn describe(&self) -> String {
        match *self {
            Threshold::Minimum { value } => format!(">= {:.2}", value),
            Threshold::Maximum { value } => format!("<= {:.2}", value),
            Threshold::Band { lower, upper } => format!("{:.2}..={:.2}", lower, upper),
            Threshold::Detector { value } => format!("< {:.2}", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    pub name: String,
    /// Observation key the rule is checked against. Defaults to `name`.
    #[serde(default)]
    pub metric: Option<String>,
    pub category: RuleCategory,
    pub severity: Severity,
    #[serde(default, alias = "regulation")]
    pub regulation_reference: String,
    #[serde(default)]
    pub description: String,
    pub threshold: Threshold,
    /// Per-jurisdiction thresholds. An override replaces the base threshold entirely.
    #[serde(default)]
    pub jurisdiction_overrides: BTreeMap<String, Threshold>,
}

impl Rule {
    pub fn metric_key(&self) -> &str {
        self.metric.as_deref().unwrap_or(&self.name)
    }

    /// Threshold in force for a jurisdiction, falling back to the base threshold.
    pub fn threshold_for(&self, jurisdiction: Option<&str>) -> &Threshold {
        jurisdiction
            .and_then(|j| self.jurisdiction_overrides.get(j))
            .unwrap_or(&self.threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleEvaluationResult {
    pub rule_id: String,
    pub passes: bool,
    pub confidence: f64,
    pub suggestion: String,
    pub severity: Severity,
    pub measured_value: f64,
    pub required: Threshold,
    pub regulation_reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogVersionInfo {
    pub version: String,
    pub document_reference: String,
    pub jurisdictions: Vec<String>,
    pub total_rules: usize,
}

#[derive(Deserialize)]
struct RuleDocument {
    #[serde(default)]
    version: String,
    #[serde(default)]
    document_reference: String,
    #[serde(default)]
    jurisdictions: Vec<String>,
    rules: Vec<serde_json::Value>,
}

/// Immutable set of rules loaded from one catalog document.
///
/// Never mutated after load; a reload builds a fresh catalog.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    version: String,
    document_reference: String,
    jurisdictions: Vec<String>,
    rules: Vec<Rule>,
}

impl RuleCatalog {
    /// The ICAO rule set bundled with the crate.
    pub fn builtin() -> Result<Self, ComplianceError> {
        Self::from_json_str(DEFAULT_RULES)
    }

    pub fn load_file(path: &Path) -> Result<Self, ComplianceError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ComplianceError::IoError(format!("Failed to read rules {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// Parse a catalog document.
    ///
    /// A malformed document is fatal. Individual malformed entries (missing `rule_id`,
    /// bad id shape, invalid threshold, duplicates) are skipped with a warning; a
    /// document where every entry is bad is fatal too.
    pub fn from_json_str(text: &str) -> Result<Self, ComplianceError> {
        let document: RuleDocument = serde_json::from_str(text)
            .map_err(|e| ComplianceError::ConfigError(format!("Malformed rule catalog: {}", e)))?;

        let id_pattern = Regex::new(r"^[A-Z][A-Z0-9]*(\.[0-9]+)+$")
            .map_err(|e| ComplianceError::ConfigError(e.to_string()))?;

        let total_entries = document.rules.len();
        let mut rules: Vec<Rule> = Vec::with_capacity(total_entries);

        for (index, entry) in document.rules.into_iter().enumerate() {
            match Self::parse_rule(entry, &id_pattern) {
                Ok(rule) => {
                    if rules.iter().any(|r| r.rule_id == rule.rule_id) {
                        warn!("Skipping duplicate rule {} (entry {})", rule.rule_id, index);
                        continue;
                    }
                    rules.push(rule);
                }
                Err(e) => warn!("Skipping rule entry {}: {}", index, e),
            }
        }

        if rules.is_empty() && total_entries > 0 {
            return Err(ComplianceError::ConfigError(format!(
                "None of the {} rule entries could be loaded",
                total_entries
            )));
        }

        let mut jurisdictions = vec![STANDARD_JURISDICTION.to_string()];
        for jurisdiction in document
            .jurisdictions
            .into_iter()
            .chain(rules.iter().flat_map(|r| r.jurisdiction_overrides.keys().cloned()))
        {
            if !jurisdictions.contains(&jurisdiction) {
                jurisdictions.push(jurisdiction);
            }
        }

        info!(
            "Loaded {} rules (catalog version {})",
            rules.len(),
            if document.version.is_empty() { "unversioned" } else { &document.version }
        );

        Ok(RuleCatalog {
            version: document.version,
            document_reference: document.document_reference,
            jurisdictions,
            rules,
        })
    }

    fn parse_rule(entry: serde_json::Value, id_pattern: &Regex) -> Result<Rule, ComplianceError> {
        let rule_id = entry
            .get("rule_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ComplianceError::ConfigError("missing required field rule_id".to_string()))?
            .to_string();

        if !id_pattern.is_match(&rule_id) {
            return Err(ComplianceError::ConfigError(format!(
                "rule id '{}' is not of the form AUTHORITY.N[.N...]",
                rule_id
            )));
        }

        let rule: Rule = serde_json::from_value(entry)
            .map_err(|e| ComplianceError::ConfigError(format!("rule {}: {}", rule_id, e)))?;

        if !rule.threshold.is_valid() {
            return Err(ComplianceError::ConfigError(format!(
                "rule {} has an invalid threshold",
                rule_id
            )));
        }
        if let Some((jurisdiction, _)) = rule
            .jurisdiction_overrides
            .iter()
            .find(|(_, threshold)| !threshold.is_valid())
        {
            return Err(ComplianceError::ConfigError(format!(
                "rule {} has an invalid override for {}",
                rule_id, jurisdiction
            )));
        }

        Ok(rule)
    }

    pub fn get_rule(&self, rule_id: &str) -> Result<&Rule, ComplianceError> {
        self.rules
            .iter()
            .find(|rule| rule.rule_id == rule_id)
            .ok_or_else(|| ComplianceError::UnknownRule(format!("No rule found with id: {}", rule_id)))
    }

    pub fn has_jurisdiction(&self, jurisdiction: &str) -> bool {
        self.jurisdictions.iter().any(|j| j == jurisdiction)
    }

    pub fn all_rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get_rules_by_severity(&self, severity: Severity) -> Vec<&Rule> {
        self.rules.iter().filter(|r| r.severity == severity).collect()
    }

    pub fn get_rules_by_category(&self, category: RuleCategory) -> Vec<&Rule> {
        self.rules.iter().filter(|r| r.category == category).collect()
    }

    pub fn glasses_rules(&self) -> Vec<&Rule> {
        self.get_rules_by_category(RuleCategory::Glasses)
    }

    pub fn head_covering_rules(&self) -> Vec<&Rule> {
        self.get_rules_by_category(RuleCategory::HeadCovering)
    }

    pub fn expression_rules(&self) -> Vec<&Rule> {
        self.get_rules_by_category(RuleCategory::Expression)
    }

    pub fn quality_rules(&self) -> Vec<&Rule> {
        self.get_rules_by_category(RuleCategory::Quality)
    }

    pub fn lighting_rules(&self) -> Vec<&Rule> {
        self.get_rules_by_category(RuleCategory::Lighting)
    }

    pub fn version_info(&self) -> CatalogVersionInfo {
        CatalogVersionInfo {
            version: self.version.clone(),
            document_reference: self.document_reference.clone(),
            jurisdictions: self.jurisdictions.clone(),
            total_rules: self.rules.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "version": "2023.1",
        "document_reference": "ICAO Doc 9303 Test",
        "jurisdictions": ["us_strict"],
        "rules": [
            {"rule_id": "ICAO.3.2.1", "name": "tinted_lenses", "category": "glasses",
             "severity": "critical", "regulation": "ICAO Doc 9303 Part 3 Section 3.2.1",
             "threshold": {"kind": "detector", "value": 0.3},
             "jurisdiction_overrides": {"us_strict": {"kind": "detector", "value": 0.1}}},
            {"rule_id": "ICAO.3.2.4", "name": "glasses_glare", "category": "glasses",
             "severity": "minor", "threshold": {"kind": "maximum", "value": 0.2}},
            {"rule_id": "ICAO.5.1.1", "name": "sharpness", "category": "quality",
             "severity": "major", "threshold": {"kind": "minimum", "value": 100}}
        ]
    }"#;

    #[test]
    fn test_load_sample_catalog() {
        let catalog = RuleCatalog::from_json_str(SAMPLE).unwrap();
        let info = catalog.version_info();

        assert_eq!(info.version, "2023.1");
        assert_eq!(info.total_rules, 3);
        assert!(info.jurisdictions.contains(&"standard_icao".to_string()));
        assert!(info.jurisdictions.contains(&"us_strict".to_string()));
        assert_eq!(catalog.get_rule("ICAO.3.2.1").unwrap().severity, Severity::Critical);
        assert_eq!(
            catalog.get_rule("ICAO.3.2.1").unwrap().regulation_reference,
            "ICAO Doc 9303 Part 3 Section 3.2.1"
        );
    }

    #[test]
    fn test_malformed_document_is_config_error() {
        let result = RuleCatalog::from_json_str("invalid json content");
        assert!(matches!(result, Err(ComplianceError::ConfigError(_))));
    }

    #[test]
    fn test_entry_without_rule_id_is_skipped() {
        let text = r#"{"rules": [
            {"name": "orphan", "category": "quality", "severity": "minor",
             "threshold": {"kind": "minimum", "value": 1}},
            {"rule_id": "ICAO.5.1.1", "name": "sharpness", "category": "quality",
             "severity": "major", "threshold": {"kind": "minimum", "value": 100}}
        ]}"#;

        let catalog = RuleCatalog::from_json_str(text).unwrap();
        assert_eq!(catalog.all_rules().len(), 1);
    }

    #[test]
    fn test_all_entries_invalid_is_config_error() {
        let text = r#"{"rules": [{"name": "orphan"}, {"rule_id": "bad id"}]}"#;
        assert!(matches!(
            RuleCatalog::from_json_str(text),
            Err(ComplianceError::ConfigError(_))
        ));
    }

    #[test]
    fn test_duplicate_and_inverted_band_skipped() {
        let text = r#"{"rules": [
            {"rule_id": "ICAO.6.1.1", "name": "brightness", "category": "lighting",
             "severity": "major", "threshold": {"kind": "band", "lower": 70, "upper": 210}},
            {"rule_id": "ICAO.6.1.1", "name": "brightness_again", "category": "lighting",
             "severity": "minor", "threshold": {"kind": "band", "lower": 0, "upper": 1}},
            {"rule_id": "ICAO.6.1.2", "name": "inverted", "category": "lighting",
             "severity": "minor", "threshold": {"kind": "band", "lower": 5, "upper": 1}}
        ]}"#;

        let catalog = RuleCatalog::from_json_str(text).unwrap();
        assert_eq!(catalog.all_rules().len(), 1);
        assert_eq!(catalog.get_rule("ICAO.6.1.1").unwrap().name, "brightness");
    }

    #[test]
    fn test_filters_by_severity_and_category() {
        let catalog = RuleCatalog::from_json_str(SAMPLE).unwrap();

        let critical = catalog.get_rules_by_severity(Severity::Critical);
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].rule_id, "ICAO.3.2.1");
        assert_eq!(catalog.get_rules_by_severity(Severity::Major)[0].rule_id, "ICAO.5.1.1");
        assert_eq!(catalog.get_rules_by_severity(Severity::Minor)[0].rule_id, "ICAO.3.2.4");

        assert_eq!(catalog.glasses_rules().len(), 2);
        assert_eq!(catalog.quality_rules().len(), 1);
        assert!(catalog.expression_rules().is_empty());
        assert!(catalog.lighting_rules().is_empty());
    }

    #[test]
    fn test_override_replaces_threshold() {
        let catalog = RuleCatalog::from_json_str(SAMPLE).unwrap();
        let rule = catalog.get_rule("ICAO.3.2.1").unwrap();

        assert_eq!(rule.threshold_for(None), &Threshold::Detector { value: 0.3 });
        assert_eq!(rule.threshold_for(Some("us_strict")), &Threshold::Detector { value: 0.1 });
        assert_eq!(rule.threshold_for(Some("elsewhere")), &Threshold::Detector { value: 0.3 });
    }

    #[test]
    fn test_unknown_rule() {
        let catalog = RuleCatalog::from_json_str(SAMPLE).unwrap();
        assert!(matches!(
            catalog.get_rule("ICAO.999.999"),
            Err(ComplianceError::UnknownRule(_))
        ));
    }

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = RuleCatalog::builtin().unwrap();
        assert!(catalog.get_rule("ICAO.5.1.1").is_ok());
        assert!(!catalog.expression_rules().is_empty());
        assert!(!catalog.lighting_rules().is_empty());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let catalog = RuleCatalog::load_file(file.path()).unwrap();
        assert_eq!(catalog.all_rules().len(), 3);

        let missing = RuleCatalog::load_file(Path::new("/nonexistent/rules.json"));
        assert!(matches!(missing, Err(ComplianceError::IoError(_))));
    }
}
