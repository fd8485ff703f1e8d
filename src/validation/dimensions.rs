use crate::models::{ComplianceIssue, DimensionResult, FormatSpec, IssueCategory, Severity};
use crate::validation::format::{FormatDetector, ASPECT_EPSILON};

/// Deviation beyond tolerance at which the dimension score reaches zero.
const SCORE_FALLOFF: f64 = 0.5;

pub struct DimensionValidator;

impl DimensionValidator {
    pub fn check(width: u32, height: u32, spec: &FormatSpec) -> (DimensionResult, Vec<ComplianceIssue>) {
        let deviation = FormatDetector::deviation(spec, width, height);
        let passes = deviation <= spec.tolerance;
        let score = if passes {
            100.0
        } else {
            100.0 * (1.0 - (deviation - spec.tolerance) / SCORE_FALLOFF).clamp(0.0, 1.0)
        };

        let mut issues = Vec::new();
        if !passes {
            let severity = if deviation > 2.0 * spec.tolerance {
                Severity::Critical
            } else {
                Severity::Major
            };
            let message = format!(
                "Image is {}x{}, {} requires {}x{} (within {:.0}%)",
                width,
                height,
                spec.format_id,
                spec.width,
                spec.height,
                spec.tolerance * 100.0
            );

            let issue = if FormatDetector::aspect_difference(spec, width, height) <= ASPECT_EPSILON {
                ComplianceIssue::new(
                    IssueCategory::DimensionScale,
                    severity,
                    message,
                    &format!("Resize to {}x{} pixels", spec.width, spec.height),
                )
            } else {
                ComplianceIssue::new(
                    IssueCategory::AspectRatio,
                    severity,
                    message,
                    &format!(
                        "Recrop the photo to a {}:{} aspect ratio, then resize",
                        spec.width, spec.height
                    ),
                )
            };
            issues.push(issue.with_reference("ICAO Doc 9303 Part 3 - Photo dimensions"));
        }

        (
            DimensionResult {
                passes,
                actual_width: width,
                actual_height: height,
                required_width: spec.width,
                required_height: spec.height,
                deviation,
                score,
            },
            issues,
        )
    }
}
