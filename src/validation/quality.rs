use crate::models::{
    BoundingBox, ComplianceIssue, FaceMetrics, FormatSpec, IssueCategory, QualityResult, Rule,
    RuleCategory, RuleEvaluationResult, Severity, Threshold,
};
use crate::processing::{QualityContext, QualityEngine};
use crate::validation::position::PositionValidator;
use crate::validation::rules::RuleEvaluator;
use image::DynamicImage;

pub struct QualityValidator;

impl QualityValidator {
    /// Run the quality engine and hold its raw measurements to the quality and lighting rules.
    pub fn check(
        img: &DynamicImage,
        face_region: Option<BoundingBox>,
        face: Option<&FaceMetrics>,
        spec: &FormatSpec,
        evaluator: &RuleEvaluator,
        jurisdiction: Option<&str>,
    ) -> (QualityResult, Vec<ComplianceIssue>) {
        let context = QualityContext {
            face_region,
            effective_dpi: Some(Self::effective_dpi(img.width(), img.height(), spec)),
        };
        let metrics = QualityEngine::assess_with_context(img, &context);
        let observations = metrics.observations();

        let mut issues = Vec::new();
        for category in [RuleCategory::Quality, RuleCategory::Lighting] {
            for result in evaluator.evaluate_category_in(category, &observations, jurisdiction) {
                if result.passes {
                    continue;
                }
                let issue_category = match evaluator.catalog().get_rule(&result.rule_id) {
                    Ok(rule) => Self::issue_category(rule, &result, metrics.detailed_metrics.lighting.highlight_fraction
                        >= metrics.detailed_metrics.lighting.shadow_fraction),
                    Err(_) => IssueCategory::Measurement,
                };
                issues.push(PositionValidator::rule_issue(issue_category, &result));
            }
        }

        if let Some(face) = face {
            let minimum = spec.quality_thresholds.min_eye_distance_px;
            if minimum > 0.0 && face.eye_distance < minimum {
                issues.push(
                    ComplianceIssue::new(
                        IssueCategory::Resolution,
                        Severity::Major,
                        format!(
                            "Eye distance {:.0} px is below the {:.0} px minimum",
                            face.eye_distance, minimum
                        ),
                        "Capture the face larger or at a higher resolution",
                    )
                    .with_reference("ISO/IEC 19794-5 - Inter-eye distance"),
                );
            }
        }

        let score = metrics.overall_score;
        let passes = score >= spec.quality_thresholds.min_overall_score
            && issues.iter().all(|issue| issue.severity < Severity::Major);

        (QualityResult { passes, score, metrics }, issues)
    }

    /// Print resolution if the image were printed at the format's physical size.
    pub fn effective_dpi(width: u32, height: u32, spec: &FormatSpec) -> f64 {
        let scale = (width as f64 / spec.width as f64).min(height as f64 / spec.height as f64);
        spec.dpi as f64 * scale
    }

    fn issue_category(rule: &Rule, result: &RuleEvaluationResult, highlights_dominate: bool) -> IssueCategory {
        match rule.metric_key() {
            "laplacian_variance" | "gradient_energy" => IssueCategory::Sharpness,
            "noise_sigma" => IssueCategory::Noise,
            "dpi" => IssueCategory::Resolution,
            "white_balance_angle" => IssueCategory::ColorBalance,
            "luminance_std_dev" => IssueCategory::Contrast,
            "glasses_glare_fraction" => IssueCategory::Occlusion,
            "mean_luminance" => match result.required {
                Threshold::Band { lower, .. } | Threshold::Minimum { value: lower }
                    if result.measured_value < lower =>
                {
                    IssueCategory::Underexposed
                }
                _ => IssueCategory::Overexposed,
            },
            "clipped_fraction" => {
                if highlights_dominate {
                    IssueCategory::Overexposed
                } else {
                    IssueCategory::Underexposed
                }
            }
            _ => match rule.category {
                RuleCategory::Lighting => IssueCategory::Contrast,
                _ => IssueCategory::Measurement,
            },
        }
    }
}
