use crate::models::{
    ComplianceIssue, ComplianceResult, CorrectionOperation, CorrectionPlan, CorrectionStep, FormatSpec,
    IssueCategory, MethodTier, Severity,
};
use crate::processing::ImageEnhancer;
use image::RgbImage;
use log::debug;

/// Luminance the brightness step aims the face region at.
const TARGET_LUMINANCE: f64 = 135.0;
/// Margin pixels this close to the dominant background colour are repainted.
const RECOLOR_MATCH_DISTANCE: f64 = 60.0;
/// Highest score the estimate will ever promise.
const ESTIMATE_CEILING: f64 = 95.0;

pub struct CorrectionPlanner;

impl CorrectionPlanner {
    /// Split issues into those a bounded image operation can address and the rest.
    pub fn analyze(result: &ComplianceResult) -> (Vec<ComplianceIssue>, Vec<ComplianceIssue>) {
        result.issues.iter().cloned().partition(|issue| issue.auto_fixable)
    }

    /// Upper bound on the score after fixing `fixable`, from issue severities.
    pub fn estimate_max_score(result: &ComplianceResult, fixable: &[ComplianceIssue]) -> f64 {
        let recoverable: f64 = fixable
            .iter()
            .map(|issue| match issue.severity {
                Severity::Critical => 15.0,
                Severity::Major => 8.0,
                Severity::Minor => 3.0,
            })
            .sum();
        (result.overall_score + recoverable)
            .min(ESTIMATE_CEILING)
            .max(result.overall_score)
    }

    /// Build the ordered operation list for `result`. Tiers are picked against `img`.
    pub fn plan(result: &ComplianceResult, spec: &FormatSpec, img: &RgbImage) -> CorrectionPlan {
        let (fixable, unfixable) = Self::analyze(result);
        let estimated_max_score = Self::estimate_max_score(result, &fixable);
        let face = result
            .face_metrics
            .as_ref()
            .and_then(|metrics| metrics.face_region(img.width(), img.height()));

        let mut steps: Vec<CorrectionStep> = Vec::new();
        for issue in &fixable {
            let operation = match Self::operation_for(issue.category, result, spec) {
                Some(operation) => operation,
                None => continue,
            };
            // One step per operation kind; later issues only add to what it addresses.
            if let Some(step) = steps.iter_mut().find(|s| s.operation.stage() == operation.stage()) {
                if !step.addresses.contains(&issue.category) {
                    step.addresses.push(issue.category);
                }
                continue;
            }

            let method = if ImageEnhancer::primary_available(&operation, img, face) {
                MethodTier::Primary
            } else {
                MethodTier::Fallback
            };
            debug!("Planned {} ({:?}) for {:?}", operation.name(), method, issue.category);
            steps.push(CorrectionStep {
                operation,
                method,
                addresses: vec![issue.category],
            });
        }
        steps.sort_by_key(|step| step.operation.stage());

        CorrectionPlan {
            steps,
            fixable,
            unfixable,
            estimated_max_score,
        }
    }

    fn operation_for(
        category: IssueCategory,
        result: &ComplianceResult,
        spec: &FormatSpec,
    ) -> Option<CorrectionOperation> {
        let mean_luminance = result.quality_check.metrics.detailed_metrics.lighting.mean_luminance;
        match category {
            IssueCategory::DimensionScale => Some(CorrectionOperation::Resize {
                width: spec.width,
                height: spec.height,
            }),
            IssueCategory::BackgroundColor => Some(CorrectionOperation::BackgroundRecolor {
                target: spec.background_color,
                match_distance: RECOLOR_MATCH_DISTANCE,
            }),
            IssueCategory::BackgroundUniformity => Some(CorrectionOperation::BackgroundSmooth {
                sigma: 3.0,
                face_padding: 10,
            }),
            IssueCategory::ColorBalance => Some(CorrectionOperation::WhiteBalance),
            IssueCategory::Underexposed => Some(CorrectionOperation::Brightness {
                factor: Self::brightness_factor(mean_luminance, 1.05, 1.6),
            }),
            IssueCategory::Overexposed => Some(CorrectionOperation::Brightness {
                factor: Self::brightness_factor(mean_luminance, 0.6, 0.95),
            }),
            IssueCategory::Contrast => Some(CorrectionOperation::LocalContrast {
                clip_limit: 2.0,
                tiles: 8,
            }),
            IssueCategory::Noise => Some(CorrectionOperation::Denoise { radius: 1 }),
            IssueCategory::Sharpness => Some(CorrectionOperation::Sharpen { blend: 0.5 }),
            _ => None,
        }
    }

    fn brightness_factor(mean_luminance: f64, min: f32, max: f32) -> f32 {
        if mean_luminance <= 0.0 || !mean_luminance.is_finite() {
            return max;
        }
        ((TARGET_LUMINANCE / mean_luminance) as f32).clamp(min, max)
    }
}
