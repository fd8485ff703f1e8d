use crate::models::{
    BoundingBox, OverallQualityScore, QualityDetails, QualityGrade, QualityMetrics, QUALITY_WEIGHTS,
};
use crate::processing::color::ColorAnalyzer;
use crate::processing::image::ImageProcessor;
use crate::processing::lighting::LightingAnalyzer;
use crate::processing::noise::NoiseAnalyzer;
use crate::processing::resolution::ResolutionAnalyzer;
use crate::processing::sharpness::SharpnessAnalyzer;
use image::DynamicImage;
use log::debug;

/// Maps a non-negative measurement onto 0-100, reaching 63 at `x == scale`.
pub fn saturate(x: f64, scale: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 || scale <= 0.0 {
        return 0.0;
    }
    100.0 * (1.0 - (-x / scale).exp())
}

/// One analyzer's score with its raw measurements and findings.
#[derive(Debug, Clone)]
pub struct ComponentAssessment<D> {
    pub score: f64,
    pub detail: D,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl<D> ComponentAssessment<D> {
    pub fn new(score: f64, detail: D) -> Self {
        ComponentAssessment {
            score: if score.is_finite() { score.clamp(0.0, 100.0) } else { 0.0 },
            detail,
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn issue(&mut self, message: String, suggestion: &str) {
        self.issues.push(message);
        self.suggestions.push(suggestion.to_string());
    }
}

/// Optional knowledge about the frame that sharpens the assessment.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityContext {
    /// Sharpness, lighting, colour and noise are measured here when set.
    pub face_region: Option<BoundingBox>,
    pub effective_dpi: Option<f64>,
}

pub struct QualityEngine;

impl QualityEngine {
    pub fn assess_image_quality(img: &DynamicImage) -> QualityMetrics {
        Self::assess_with_context(img, &QualityContext::default())
    }

    /// Never fails: degenerate inputs produce the lowest tier with explicit issues.
    pub fn assess_with_context(img: &DynamicImage, context: &QualityContext) -> QualityMetrics {
        if img.width() == 0 || img.height() == 0 {
            return Self::degenerate(img.width(), img.height());
        }

        let rgb = img.to_rgb8();
        let region = context
            .face_region
            .filter(|r| r.width >= 3 && r.height >= 3 && r.x + r.width <= rgb.width() && r.y + r.height <= rgb.height());
        let face_rgb = ImageProcessor::crop_region(&rgb, region);
        let face_gray = ImageProcessor::luminance(&face_rgb);

        let sharpness = SharpnessAnalyzer::analyze(&face_gray);
        let lighting = LightingAnalyzer::analyze(&face_gray);
        let single_channel = img.color().channel_count() < 3;
        let color = if single_channel {
            ColorAnalyzer::grayscale()
        } else {
            ColorAnalyzer::analyze(&face_rgb, region.is_some())
        };
        let noise = NoiseAnalyzer::analyze(&face_gray);
        let resolution = ResolutionAnalyzer::analyze(rgb.width(), rgb.height(), context.effective_dpi);

        let w = QUALITY_WEIGHTS;
        let mut overall_score = w.sharpness * sharpness.score
            + w.lighting * lighting.score
            + w.color * color.score
            + w.noise * noise.score
            + w.resolution * resolution.score;
        if single_channel {
            overall_score = overall_score.min(49.0);
        }

        let mut issues = Vec::new();
        let mut suggestions = Vec::new();
        for (component_issues, component_suggestions) in [
            (sharpness.issues, sharpness.suggestions),
            (lighting.issues, lighting.suggestions),
            (color.issues, color.suggestions),
            (noise.issues, noise.suggestions),
            (resolution.issues, resolution.suggestions),
        ] {
            issues.extend(component_issues);
            suggestions.extend(component_suggestions);
        }

        debug!(
            "Quality: sharpness {:.1} lighting {:.1} color {:.1} noise {:.1} resolution {:.1} -> {:.1}",
            sharpness.score, lighting.score, color.score, noise.score, resolution.score, overall_score
        );

        QualityMetrics {
            sharpness_score: sharpness.score,
            lighting_score: lighting.score,
            color_score: color.score,
            noise_score: noise.score,
            resolution_score: resolution.score,
            overall_score: overall_score.clamp(0.0, 100.0),
            issues,
            suggestions,
            detailed_metrics: QualityDetails {
                sharpness: sharpness.detail,
                lighting: lighting.detail,
                color: color.detail,
                noise: noise.detail,
                resolution: resolution.detail,
            },
        }
    }

    fn degenerate(width: u32, height: u32) -> QualityMetrics {
        let mut metrics = QualityMetrics::default();
        metrics.detailed_metrics.resolution.width = width;
        metrics.detailed_metrics.resolution.height = height;
        metrics.issues.push(format!("Image has zero area ({}x{})", width, height));
        metrics.suggestions.push("Provide a decodable, non-empty image".to_string());
        metrics
    }

    /// Combine several assessments into one grade.
    ///
    /// Confidence falls as the individual scores spread apart; a single sample is fully
    /// confident.
    pub fn generate_quality_score(samples: &[QualityMetrics], pass_threshold: f64) -> OverallQualityScore {
        if samples.is_empty() {
            return OverallQualityScore {
                score: 0.0,
                grade: QualityGrade::Poor,
                passes: false,
                confidence: 0.0,
                sample_count: 0,
                issues: vec!["No quality assessments to aggregate".to_string()],
            };
        }

        let count = samples.len() as f64;
        let score = samples.iter().map(|m| m.overall_score).sum::<f64>() / count;
        let variance = samples
            .iter()
            .map(|m| (m.overall_score - score).powi(2))
            .sum::<f64>()
            / count;
        let confidence = (1.0 - variance.sqrt() / 50.0).clamp(0.0, 1.0);

        let mut issues: Vec<String> = Vec::new();
        for issue in samples.iter().flat_map(|m| m.issues.iter()) {
            if !issues.contains(issue) {
                issues.push(issue.clone());
            }
        }

        OverallQualityScore {
            score,
            grade: QualityGrade::from_score(score),
            passes: score >= pass_threshold,
            confidence,
            sample_count: samples.len(),
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn textured(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = (((x / 3 + y / 3) % 2) * 80 + 80) as u8;
            Rgb([v, v, v])
        }))
    }

    #[test]
    fn test_scores_within_bounds() {
        let metrics = QualityEngine::assess_image_quality(&textured(500, 500));

        for score in [
            metrics.sharpness_score,
            metrics.lighting_score,
            metrics.color_score,
            metrics.noise_score,
            metrics.resolution_score,
            metrics.overall_score,
        ] {
            assert!((0.0..=100.0).contains(&score));
        }
        assert!(metrics.sharpness_score > 50.0);
    }

    #[test]
    fn test_zero_area_is_lowest_tier() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let metrics = QualityEngine::assess_image_quality(&empty);

        assert_eq!(metrics.overall_score, 0.0);
        assert_eq!(metrics.grade(), QualityGrade::Poor);
        assert!(!metrics.issues.is_empty());
    }

    #[test]
    fn test_single_channel_is_lowest_tier() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_fn(500, 500, |x, _| Luma([(x % 200) as u8 + 30])));
        let metrics = QualityEngine::assess_image_quality(&gray);

        assert_eq!(metrics.color_score, 0.0);
        assert_eq!(metrics.grade(), QualityGrade::Poor);
        assert!(metrics.issues.iter().any(|i| i.contains("single channel")));
    }

    #[test]
    fn test_assessment_is_deterministic() {
        let img = textured(120, 160);
        let first = QualityEngine::assess_image_quality(&img);
        let second = QualityEngine::assess_image_quality(&img);
        assert_eq!(first, second);
    }

    #[test]
    fn test_face_region_is_used() {
        // Dark frame with a bright, textured centre.
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(200, 200, |x, y| {
            if (50..150).contains(&x) && (50..150).contains(&y) {
                let v = if (x + y) % 2 == 0 { 110 } else { 160 };
                Rgb([v, v, v])
            } else {
                Rgb([5, 5, 5])
            }
        }));
        let whole = QualityEngine::assess_image_quality(&img);
        let face = QualityEngine::assess_with_context(
            &img,
            &QualityContext {
                face_region: Some(BoundingBox { x: 50, y: 50, width: 100, height: 100 }),
                effective_dpi: None,
            },
        );

        assert!(face.detailed_metrics.lighting.mean_luminance > whole.detailed_metrics.lighting.mean_luminance);
        assert!(face.detailed_metrics.lighting.shadow_fraction < 1e-9);
    }

    #[test]
    fn test_generate_quality_score() {
        let mut good = QualityMetrics::default();
        good.overall_score = 90.0;
        let mut fair = QualityMetrics::default();
        fair.overall_score = 60.0;
        fair.issues.push("soft".to_string());

        let overall = QualityEngine::generate_quality_score(&[good.clone(), fair], 70.0);
        assert!((overall.score - 75.0).abs() < 1e-9);
        assert_eq!(overall.grade, QualityGrade::Good);
        assert!(overall.passes);
        assert!(overall.confidence < 1.0);
        assert_eq!(overall.issues, vec!["soft".to_string()]);

        let single = QualityEngine::generate_quality_score(&[good], 70.0);
        assert_eq!(single.confidence, 1.0);

        assert!(!QualityEngine::generate_quality_score(&[], 70.0).passes);
    }

    #[test]
    fn test_saturate_curve() {
        assert_eq!(saturate(0.0, 10.0), 0.0);
        assert!((saturate(10.0, 10.0) - 63.2).abs() < 0.1);
        assert!(saturate(1e9, 10.0) <= 100.0);
        assert_eq!(saturate(f64::NAN, 10.0), 0.0);
    }
}
