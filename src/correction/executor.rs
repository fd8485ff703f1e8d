use crate::correction::planner::CorrectionPlanner;
use crate::models::{
    AppliedCorrection, AutoFixResult, ComplianceResult, CorrectionOperation, CorrectionStep, FaceMetrics,
    MethodTier,
};
use crate::processing::{ImageEnhancer, ImageProcessor};
use crate::utils::ComplianceError;
use crate::validation::ComplianceValidator;
use image::{DynamicImage, RgbImage};
use log::{info, warn};
use std::time::Instant;

/// Quality may drop by this much before the result is reported as not preserved.
const QUALITY_SLACK: f64 = 5.0;

/// Plans, applies and revalidates corrections, keeping the original image on regression.
pub struct AutoFixer;

impl AutoFixer {
    /// One correction attempt for `img`, given its validation `before`.
    ///
    /// The corrected image is accepted only if the score did not drop. Revalidation uses
    /// the format, face count and face measurements recorded in `before`, so issues that
    /// came from the detector rather than the pixels survive the correction.
    pub fn auto_fix(
        validator: &ComplianceValidator,
        img: &DynamicImage,
        before: &ComplianceResult,
    ) -> Result<AutoFixResult, ComplianceError> {
        let start_time = Instant::now();
        ImageProcessor::ensure_valid(img)?;
        let spec = validator.formats().get(&before.format_id)?;

        if before.overall_pass {
            return Ok(Self::unchanged(
                img,
                before,
                true,
                Vec::new(),
                vec!["Photo is already compliant".to_string()],
                before.overall_score,
                start_time,
            ));
        }

        // Analyze + plan
        let original = img.to_rgb8();
        let plan = CorrectionPlanner::plan(before, spec, &original);
        let mut recommendations = Self::recommendations(before);
        if plan.is_empty() {
            warn!("No auto-fixable issues for {}", before.format_id);
            return Ok(Self::unchanged(
                img,
                before,
                false,
                vec!["No auto-fixable issues found; a new capture is required".to_string()],
                recommendations,
                plan.estimated_max_score,
                start_time,
            ));
        }
        info!("Auto-fix plan for {}: {}", before.format_id, plan.operation_names().join(", "));

        // Apply
        let mut working = original;
        let mut face_metrics = before.face_metrics.clone();
        let mut input_metrics = before.input_face_metrics.clone();
        let mut applied = Vec::with_capacity(plan.steps.len());
        let mut warnings = Vec::new();
        for step in &plan.steps {
            let (next, correction) = Self::apply_step(step, &working, face_metrics.as_ref());
            if correction.method == MethodTier::Skipped {
                warnings.push(correction.message.clone());
            }
            if let CorrectionOperation::Resize { width, .. } = step.operation {
                if next.width() != working.width() {
                    face_metrics = face_metrics.map(|m| Self::rescale_metrics(m, working.width(), width));
                    input_metrics = input_metrics.map(|m| Self::rescale_metrics(m, working.width(), width));
                }
            }
            working = next;
            applied.push(correction);
        }

        if !applied.iter().any(|c| c.changed_image) {
            warnings.push("No correction changed the image".to_string());
            let mut result = Self::unchanged(
                img,
                before,
                false,
                warnings,
                recommendations,
                plan.estimated_max_score,
                start_time,
            );
            result.applied_corrections = applied;
            return Ok(result);
        }

        // Revalidate
        let corrected = DynamicImage::ImageRgb8(working);
        let after = validator.revalidate(&corrected, before, input_metrics.as_ref())?;
        let improvement = after.overall_score - before.overall_score;

        // Accept or roll back
        let (corrected_image, after_validation, rejected_validation, rolled_back) = if improvement >= 0.0 {
            info!(
                "Auto-fix accepted: {:.1} -> {:.1}",
                before.overall_score, after.overall_score
            );
            (corrected, after, None, false)
        } else {
            warn!(
                "Auto-fix rolled back: {:.1} -> {:.1}",
                before.overall_score, after.overall_score
            );
            warnings.push(format!(
                "Corrections were non-beneficial ({}: score {:.1} -> {:.1}); original image kept",
                applied
                    .iter()
                    .map(|c| c.operation.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                before.overall_score,
                after.overall_score
            ));
            (img.clone(), before.clone(), Some(after), true)
        };

        if !after_validation.overall_pass {
            recommendations.push(format!(
                "Score after correction is {:.1}; remaining issues need a new capture",
                after_validation.overall_score
            ));
        }
        let quality_preserved =
            after_validation.quality_check.score >= before.quality_check.score - QUALITY_SLACK;

        Ok(AutoFixResult {
            success: !rolled_back,
            applied_corrections: applied,
            corrected_image,
            improvement: after_validation.overall_score - before.overall_score,
            before_validation: before.clone(),
            after_validation,
            rejected_validation,
            rolled_back,
            quality_preserved,
            estimated_max_score: plan.estimated_max_score,
            warnings,
            recommendations,
            processing_time: start_time.elapsed().as_secs_f64(),
        })
    }

    /// Run one step, degrading primary -> fallback -> pass-through. Never fails.
    fn apply_step(
        step: &CorrectionStep,
        working: &RgbImage,
        face_metrics: Option<&FaceMetrics>,
    ) -> (RgbImage, AppliedCorrection) {
        let face = face_metrics.and_then(|m| m.face_region(working.width(), working.height()));
        let operation = &step.operation;

        let mut tiers = vec![step.method];
        if step.method == MethodTier::Primary {
            tiers.push(MethodTier::Fallback);
        }

        let mut failures = Vec::new();
        for tier in tiers {
            match ImageEnhancer::apply(operation, tier, working, face) {
                Ok(output) => {
                    let changed_image = output != *working;
                    let message = if failures.is_empty() {
                        format!("{} applied", operation.name())
                    } else {
                        format!("{} applied after primary failed: {}", operation.name(), failures.join("; "))
                    };
                    return (
                        output,
                        AppliedCorrection {
                            operation: operation.name().to_string(),
                            method: tier,
                            method_name: ImageEnhancer::method_name(operation, tier).to_string(),
                            changed_image,
                            message,
                        },
                    );
                }
                Err(e) => {
                    warn!("{} ({:?}) failed: {}", operation.name(), tier, e);
                    failures.push(e.to_string());
                }
            }
        }

        (
            working.clone(),
            AppliedCorrection {
                operation: operation.name().to_string(),
                method: MethodTier::Skipped,
                method_name: ImageEnhancer::method_name(operation, MethodTier::Skipped).to_string(),
                changed_image: false,
                message: format!("{} skipped: {}", operation.name(), failures.join("; ")),
            },
        )
    }

    /// Eye distance is in pixels and has to follow a resize; the ratios do not.
    fn rescale_metrics(mut metrics: FaceMetrics, old_width: u32, new_width: u32) -> FaceMetrics {
        if old_width > 0 {
            metrics.eye_distance *= new_width as f64 / old_width as f64;
        }
        metrics
    }

    fn recommendations(result: &ComplianceResult) -> Vec<String> {
        let mut recommendations: Vec<String> = Vec::new();
        for issue in result.issues.iter().filter(|issue| !issue.auto_fixable) {
            if !recommendations.contains(&issue.suggestion) {
                recommendations.push(issue.suggestion.clone());
            }
        }
        recommendations
    }

    fn unchanged(
        img: &DynamicImage,
        before: &ComplianceResult,
        success: bool,
        warnings: Vec<String>,
        recommendations: Vec<String>,
        estimated_max_score: f64,
        start_time: Instant,
    ) -> AutoFixResult {
        AutoFixResult {
            success,
            applied_corrections: Vec::new(),
            corrected_image: img.clone(),
            before_validation: before.clone(),
            after_validation: before.clone(),
            rejected_validation: None,
            rolled_back: false,
            quality_preserved: true,
            improvement: 0.0,
            estimated_max_score,
            warnings,
            recommendations,
            processing_time: start_time.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FaceDetection, FormatCatalog, IssueCategory, RuleCatalog};
    use image::Rgb;
    use std::sync::Arc;

    fn validator() -> ComplianceValidator {
        ComplianceValidator::new(
            Arc::new(RuleCatalog::builtin().unwrap()),
            Arc::new(FormatCatalog::builtin().unwrap()),
        )
    }

    fn face() -> FaceMetrics {
        FaceMetrics {
            face_height_ratio: 0.75,
            eye_height_ratio: 0.55,
            face_center_x: 0.5,
            face_center_y: 0.5,
            eye_distance: 100.0,
            face_angle: 0.0,
            eyes_open: true,
            mouth_closed: true,
            tinted_lens_confidence: None,
            head_covering_confidence: None,
        }
    }

    /// Red backdrop around a skin-toned ellipse with a little texture.
    fn red_portrait() -> DynamicImage {
        let (width, height) = (413u32, 531u32);
        let img = RgbImage::from_fn(width, height, |x, y| {
            let dx = (x as f64 - width as f64 / 2.0) / (width as f64 * 0.28);
            let dy = (y as f64 - height as f64 / 2.0) / (height as f64 * 0.375);
            if dx * dx + dy * dy <= 1.0 {
                let shade = ((x * 7 + y * 13) % 40) as u8;
                Rgb([200 + shade / 2, 150 + shade / 2, 120 + shade / 2])
            } else {
                Rgb([255, 0, 0])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_compliant_photo_is_left_alone() {
        let validator = validator();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(413, 531, Rgb([255, 255, 255])));
        let mut before = validator.validate(&img, "ICS-UAE", Some(&face())).unwrap();
        before.overall_pass = true;

        let result = AutoFixer::auto_fix(&validator, &img, &before).unwrap();
        assert!(result.success);
        assert!(result.applied_corrections.is_empty());
        assert_eq!(result.improvement, 0.0);
    }

    #[test]
    fn test_nothing_fixable() {
        let validator = validator();
        let mut closed = face();
        closed.eyes_open = false;
        let img = red_portrait();
        let mut before = validator.validate(&img, "ICS-UAE", Some(&closed)).unwrap();
        before.issues.retain(|issue| !issue.auto_fixable);

        let result = AutoFixer::auto_fix(&validator, &img, &before).unwrap();
        assert!(!result.success);
        assert!(!result.warnings.is_empty());
        assert!(!result.recommendations.is_empty());
    }

    #[test]
    fn test_red_background_is_repainted() {
        let validator = validator();
        let img = red_portrait();
        let before = validator.validate(&img, "ICS-UAE", Some(&face())).unwrap();
        assert!(before.has_category(IssueCategory::BackgroundColor));

        let result = AutoFixer::auto_fix(&validator, &img, &before).unwrap();
        assert!(result.after_validation.overall_score >= before.overall_score);
        if result.success {
            assert!(result.after_validation.background_check.score > before.background_check.score);
            assert!(result
                .applied_corrections
                .iter()
                .any(|c| c.operation == "background_recolor" && c.method == MethodTier::Primary));
        } else {
            assert!(result.rolled_back);
            assert!(result.warnings.iter().any(|w| w.contains("non-beneficial")));
        }
    }

    #[test]
    fn test_primary_fault_falls_back() {
        let step = CorrectionStep {
            operation: CorrectionOperation::BackgroundRecolor {
                target: [255, 255, 255],
                match_distance: 60.0,
            },
            method: MethodTier::Primary,
            addresses: vec![IssueCategory::BackgroundColor],
        };
        let img = red_portrait().to_rgb8();

        // No face region, so the face-masked recolor cannot run.
        let (output, correction) = AutoFixer::apply_step(&step, &img, None);
        assert_eq!(correction.method, MethodTier::Fallback);
        assert_eq!(correction.method_name, "margin_recolor");
        assert!(correction.changed_image);
        assert!(correction.message.contains("after primary failed"));
        assert_eq!(*output.get_pixel(0, 0), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_both_tiers_fault_skipped() {
        let step = CorrectionStep {
            operation: CorrectionOperation::Resize { width: 0, height: 0 },
            method: MethodTier::Primary,
            addresses: vec![IssueCategory::DimensionScale],
        };
        let img = red_portrait().to_rgb8();

        let (output, correction) = AutoFixer::apply_step(&step, &img, Some(&face()));
        assert_eq!(correction.method, MethodTier::Skipped);
        assert_eq!(correction.method_name, "none");
        assert!(!correction.changed_image);
        assert!(correction.message.contains("skipped"));
        assert_eq!(output, img);
    }

    #[test]
    fn test_regression_rolls_back() {
        let validator = validator();
        let img = red_portrait();
        let mut before = validator.validate(&img, "ICS-UAE", Some(&face())).unwrap();
        before.overall_score = 100.0;
        before.overall_pass = false;

        let result = AutoFixer::auto_fix(&validator, &img, &before).unwrap();
        assert!(result.rolled_back);
        assert!(!result.success);
        assert_eq!(result.corrected_image.to_rgb8(), img.to_rgb8());
        assert_eq!(result.after_validation, before);
        assert!(result.improvement == 0.0);
        assert!(result.warnings.iter().any(|w| w.contains("non-beneficial")));

        let rejected = result.rejected_validation.unwrap();
        assert!(rejected.overall_score < 100.0);
        assert!(!result.applied_corrections.is_empty());
    }

    #[test]
    fn test_multiple_faces_still_vetoed_after_fix() {
        let validator = validator();
        let img = red_portrait();
        let detection = FaceDetection {
            face_found: true,
            bounding_box: None,
            landmarks: Vec::new(),
            face_metrics: Some(face()),
            confidence: 0.9,
            face_count: 2,
        };
        let before = validator.validate_detection(&img, "ICS-UAE", &detection).unwrap();
        assert!(!before.overall_pass);

        let result = AutoFixer::auto_fix(&validator, &img, &before).unwrap();
        assert!(result.after_validation.has_category(IssueCategory::MultipleFaces));
        assert!(!result.after_validation.overall_pass);
        if let Some(rejected) = &result.rejected_validation {
            assert!(rejected.has_category(IssueCategory::MultipleFaces));
        }
    }

    #[test]
    fn test_clamped_measurement_survives_fix() {
        let validator = validator();
        let img = red_portrait();
        let mut off_frame = face();
        off_frame.face_center_x = 1.5;
        let before = validator.validate(&img, "ICS-UAE", Some(&off_frame)).unwrap();
        assert!(before.has_category(IssueCategory::Measurement));

        let result = AutoFixer::auto_fix(&validator, &img, &before).unwrap();
        assert!(result.after_validation.has_category(IssueCategory::Measurement));
    }

    #[test]
    fn test_resize_rescales_eye_distance() {
        let scaled = AutoFixer::rescale_metrics(face(), 826, 413);
        assert!((scaled.eye_distance - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_format_in_result() {
        let validator = validator();
        let img = red_portrait();
        let mut before = validator.validate(&img, "ICS-UAE", Some(&face())).unwrap();
        before.format_id = "Nope".to_string();
        assert!(matches!(
            AutoFixer::auto_fix(&validator, &img, &before),
            Err(ComplianceError::UnknownFormat(_))
        ));
    }
}
