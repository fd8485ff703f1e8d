use crate::models::{FormatCatalog, FormatMatchResult, FormatSpec};
use crate::utils::ComplianceError;
use log::debug;
use std::sync::Arc;

/// Minimum combined score for `detect_format` to commit to a format.
pub const DETECTION_FLOOR: f64 = 0.8;
/// Relative aspect difference still considered the same ratio.
pub const ASPECT_EPSILON: f64 = 0.02;
const PERFECT_ASPECT: f64 = 1e-3;
/// Deviation at which the dimension score reaches zero.
const HARD_MISMATCH: f64 = 0.5;
const DIMENSION_WEIGHT: f64 = 0.6;
const ASPECT_WEIGHT: f64 = 0.4;

/// Scores raw image dimensions against every cataloged format.
pub struct FormatDetector {
    catalog: Arc<FormatCatalog>,
}

impl FormatDetector {
    pub fn new(catalog: Arc<FormatCatalog>) -> Self {
        FormatDetector { catalog }
    }

    /// Best format scoring at least the detection floor.
    ///
    /// Equal scores resolve to the format declared first in the catalog.
    pub fn detect_format(&self, width: u32, height: u32) -> Option<FormatMatchResult> {
        let best = self.get_all_format_scores(width, height).into_iter().next()?;
        if best.confidence >= DETECTION_FLOOR {
            debug!("Detected {} for {}x{} ({:.2})", best.format_id, width, height, best.confidence);
            Some(best)
        } else {
            debug!(
                "No format for {}x{}; best was {} at {:.2}",
                width, height, best.format_id, best.confidence
            );
            None
        }
    }

    /// Every format's match result, best first. Stable, so catalog order breaks ties.
    pub fn get_all_format_scores(&self, width: u32, height: u32) -> Vec<FormatMatchResult> {
        if width == 0 || height == 0 {
            return Vec::new();
        }
        let mut results: Vec<FormatMatchResult> = self
            .catalog
            .formats()
            .iter()
            .map(|spec| Self::score_format(spec, width, height))
            .collect();
        results.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        results
    }

    pub fn score_format(spec: &FormatSpec, width: u32, height: u32) -> FormatMatchResult {
        let mut matched_criteria = Vec::new();
        let mut validation_errors = Vec::new();

        let (dimension_score, dimension_label) = Self::dimension_score(spec, width, height);
        let (aspect_score, aspect_label) = Self::aspect_score(spec, width, height);

        if dimension_score >= 0.7 {
            matched_criteria.push(dimension_label.to_string());
        } else {
            validation_errors.push(format!(
                "{}: {}x{} vs required {}x{}",
                dimension_label, width, height, spec.width, spec.height
            ));
        }
        if aspect_score >= 0.9 {
            matched_criteria.push(aspect_label.to_string());
        } else {
            validation_errors.push(format!(
                "{}: {:.3} vs required {:.3}",
                aspect_label,
                width as f64 / height as f64,
                spec.aspect_ratio()
            ));
        }

        let confidence = (DIMENSION_WEIGHT * dimension_score + ASPECT_WEIGHT * aspect_score).clamp(0.0, 1.0);
        FormatMatchResult {
            matched: confidence >= DETECTION_FLOOR,
            format_id: spec.format_id.clone(),
            confidence,
            matched_criteria,
            validation_errors,
        }
    }

    /// Largest relative deviation of either axis from the format size.
    pub fn deviation(spec: &FormatSpec, width: u32, height: u32) -> f64 {
        let dw = (width as f64 / spec.width as f64 - 1.0).abs();
        let dh = (height as f64 / spec.height as f64 - 1.0).abs();
        dw.max(dh)
    }

    pub fn aspect_difference(spec: &FormatSpec, width: u32, height: u32) -> f64 {
        if height == 0 {
            return f64::INFINITY;
        }
        ((width as f64 / height as f64) / spec.aspect_ratio() - 1.0).abs()
    }

    fn dimension_score(spec: &FormatSpec, width: u32, height: u32) -> (f64, &'static str) {
        let tolerance = spec.tolerance.max(1e-6);
        let deviation = Self::deviation(spec, width, height);

        if deviation <= tolerance {
            return (1.0, "exact dimension match");
        }
        if deviation <= 2.0 * tolerance {
            return (1.0 - 0.3 * (deviation - tolerance) / tolerance, "close dimension match");
        }

        let scale = width as f64 / spec.width as f64;
        if Self::aspect_difference(spec, width, height) <= ASPECT_EPSILON && (0.5..=2.0).contains(&scale) {
            return (0.7, "close match (proportional scale)");
        }

        let span = (HARD_MISMATCH - 2.0 * tolerance).max(f64::EPSILON);
        let score = 0.7 * (1.0 - (deviation - 2.0 * tolerance) / span).max(0.0);
        (score.min(0.69), "dimension mismatch")
    }

    fn aspect_score(spec: &FormatSpec, width: u32, height: u32) -> (f64, &'static str) {
        let difference = Self::aspect_difference(spec, width, height);
        if difference <= PERFECT_ASPECT {
            (1.0, "perfect aspect ratio")
        } else if difference <= ASPECT_EPSILON {
            (
                1.0 - 0.1 * (difference - PERFECT_ASPECT) / (ASPECT_EPSILON - PERFECT_ASPECT),
                "aspect ratio match",
            )
        } else {
            (0.79 * (1.0 - (difference - ASPECT_EPSILON) / HARD_MISMATCH).max(0.0), "aspect ratio mismatch")
        }
    }

    /// Human-readable steps that would bring an image of `width` x `height` into `format_id`.
    pub fn suggest_improvements(&self, width: u32, height: u32, format_id: &str) -> Result<Vec<String>, ComplianceError> {
        let spec = self.catalog.get(format_id)?;
        let mut suggestions = Vec::new();

        if width == 0 || height == 0 {
            suggestions.push("Image has no pixels; provide a valid photo".to_string());
            return Ok(suggestions);
        }

        if Self::deviation(spec, width, height) <= spec.tolerance {
            suggestions.push(format!("Dimensions already match {} ({}x{})", spec.format_id, spec.width, spec.height));
            return Ok(suggestions);
        }

        let target_aspect = spec.aspect_ratio();
        if Self::aspect_difference(spec, width, height) > ASPECT_EPSILON {
            let current_aspect = width as f64 / height as f64;
            if current_aspect > target_aspect {
                let crop_width = (height as f64 * target_aspect).round() as u32;
                suggestions.push(format!(
                    "Crop width from {} to {} px to reach the {}:{} aspect ratio",
                    width, crop_width, spec.width, spec.height
                ));
            } else {
                let crop_height = (width as f64 / target_aspect).round() as u32;
                suggestions.push(format!(
                    "Crop height from {} to {} px to reach the {}:{} aspect ratio",
                    height, crop_height, spec.width, spec.height
                ));
            }
        }

        suggestions.push(format!("Resize to {}x{} pixels", spec.width, spec.height));
        if width < spec.width || height < spec.height {
            suggestions.push(format!(
                "Source is smaller than {}x{}; upscaling softens detail, recapture at a higher resolution if possible",
                spec.width, spec.height
            ));
        }
        Ok(suggestions)
    }
}
