use crate::models::{Rule, RuleCatalog, RuleCategory, RuleEvaluationResult, Severity, Threshold};
use crate::utils::ComplianceError;
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Evaluates observations against a catalog snapshot.
///
/// Holds its own `Arc` to the catalog, so a reload elsewhere never changes the rules an
/// evaluator already in use sees.
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    catalog: Arc<RuleCatalog>,
    jurisdiction: Option<String>,
}

impl RuleEvaluator {
    pub fn new(catalog: Arc<RuleCatalog>) -> Self {
        RuleEvaluator {
            catalog,
            jurisdiction: None,
        }
    }

    pub fn with_jurisdiction(mut self, jurisdiction: &str) -> Result<Self, ComplianceError> {
        if !self.catalog.has_jurisdiction(jurisdiction) {
            return Err(ComplianceError::UnknownJurisdiction(format!(
                "'{}' (known: {})",
                jurisdiction,
                self.catalog.version_info().jurisdictions.join(", ")
            )));
        }
        self.jurisdiction = Some(jurisdiction.to_string());
        Ok(self)
    }

    pub fn jurisdiction(&self) -> Option<&str> {
        self.jurisdiction.as_deref()
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    /// Evaluate in the evaluator's own jurisdiction.
    pub fn evaluate(&self, rule_id: &str, observed: f64) -> Result<RuleEvaluationResult, ComplianceError> {
        self.evaluate_in(rule_id, observed, self.jurisdiction.as_deref())
    }

    pub fn evaluate_in(
        &self,
        rule_id: &str,
        observed: f64,
        jurisdiction: Option<&str>,
    ) -> Result<RuleEvaluationResult, ComplianceError> {
        let rule = self.catalog.get_rule(rule_id)?;
        Ok(Self::evaluate_rule(rule, observed, jurisdiction))
    }

    /// Evaluate every rule of `category` whose metric has an observation, in catalog order.
    pub fn evaluate_category(
        &self,
        category: RuleCategory,
        observations: &BTreeMap<String, f64>,
    ) -> Vec<RuleEvaluationResult> {
        self.evaluate_category_in(category, observations, self.jurisdiction.as_deref())
    }

    pub fn evaluate_category_in(
        &self,
        category: RuleCategory,
        observations: &BTreeMap<String, f64>,
        jurisdiction: Option<&str>,
    ) -> Vec<RuleEvaluationResult> {
        self.catalog
            .get_rules_by_category(category)
            .into_iter()
            .filter_map(|rule| {
                observations
                    .get(rule.metric_key())
                    .map(|observed| Self::evaluate_rule(rule, *observed, jurisdiction))
            })
            .collect()
    }

    pub fn evaluate_rule(rule: &Rule, observed: f64, jurisdiction: Option<&str>) -> RuleEvaluationResult {
        let threshold = rule.threshold_for(jurisdiction).clone();

        if !observed.is_finite() {
            return RuleEvaluationResult {
                rule_id: rule.rule_id.clone(),
                passes: false,
                confidence: 0.0,
                suggestion: format!("{}: measurement unavailable, recapture the photo", rule.name),
                severity: rule.severity,
                measured_value: observed,
                required: threshold,
                regulation_reference: rule.regulation_reference.clone(),
            };
        }

        let passes = threshold.passes(observed);
        let confidence = if passes {
            1.0
        } else {
            Self::failure_confidence(&threshold, observed)
        };
        let suggestion = Self::suggestion(rule, &threshold, observed, passes);

        debug!(
            "Rule {} observed {:.3} required {} -> {}",
            rule.rule_id,
            observed,
            threshold.describe(),
            if passes { "pass" } else { "fail" }
        );

        RuleEvaluationResult {
            rule_id: rule.rule_id.clone(),
            passes,
            confidence,
            suggestion,
            severity: rule.severity,
            measured_value: observed,
            required: threshold,
            regulation_reference: rule.regulation_reference.clone(),
        }
    }

    /// How close a failing observation came to passing, in [0, 1].
    fn failure_confidence(threshold: &Threshold, observed: f64) -> f64 {
        let closeness = match *threshold {
            Threshold::Minimum { value } => {
                if value <= 0.0 {
                    0.0
                } else {
                    observed / value
                }
            }
            Threshold::Maximum { value } => {
                if observed <= 0.0 {
                    0.0
                } else {
                    value / observed
                }
            }
            Threshold::Band { lower, upper } => {
                let width = (upper - lower).max(f64::EPSILON);
                let distance = if observed < lower { lower - observed } else { observed - upper };
                1.0 - distance / width
            }
            Threshold::Detector { .. } => 1.0 - observed,
        };
        closeness.clamp(0.0, 1.0)
    }

    fn suggestion(rule: &Rule, threshold: &Threshold, observed: f64, passes: bool) -> String {
        if passes {
            return format!("{} within requirement ({})", rule.name, threshold.describe());
        }

        let guidance = if rule.description.is_empty() {
            String::new()
        } else {
            format!(". {}", rule.description)
        };
        match *threshold {
            Threshold::Minimum { value } => {
                format!("{} {:.2} is below minimum {:.2}{}", rule.name, observed, value, guidance)
            }
            Threshold::Maximum { value } => {
                format!("{} {:.2} is above maximum {:.2}{}", rule.name, observed, value, guidance)
            }
            Threshold::Band { lower, upper } => {
                let side = if observed < lower { "below" } else { "above" };
                format!(
                    "{} {:.2} is {} the allowed range {:.2}-{:.2}{}",
                    rule.name, observed, side, lower, upper, guidance
                )
            }
            Threshold::Detector { value } => format!(
                "{} detected with confidence {:.2} (limit {:.2}){}",
                rule.name, observed, value, guidance
            ),
        }
    }

    /// Highest severity among failed results, if any failed.
    pub fn worst_failure(results: &[RuleEvaluationResult]) -> Option<Severity> {
        results.iter().filter(|r| !r.passes).map(|r| r.severity).max()
    }
}
