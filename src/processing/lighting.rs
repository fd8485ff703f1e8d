use crate::models::LightingDetail;
use crate::processing::histogram::Histogram;
use crate::processing::quality::{saturate, ComponentAssessment};
use image::GrayImage;

const SHADOW_LEVEL: u8 = 10;
const HIGHLIGHT_LEVEL: u8 = 245;
const IDEAL_MEAN: (f64, f64) = (100.0, 170.0);

pub struct LightingAnalyzer;

impl LightingAnalyzer {
    pub fn analyze(gray: &GrayImage) -> ComponentAssessment<LightingDetail> {
        let histogram = Histogram::from_luma(gray);
        let shadow_fraction = histogram.fraction_below(SHADOW_LEVEL);
        let highlight_fraction = histogram.fraction_above(HIGHLIGHT_LEVEL);
        let detail = LightingDetail {
            mean_luminance: histogram.mean(),
            luminance_std_dev: histogram.std_dev(),
            shadow_fraction,
            highlight_fraction,
            clipped_fraction: shadow_fraction + highlight_fraction,
        };

        let exposure_score = Self::exposure_score(detail.mean_luminance);
        let contrast_score = saturate(detail.luminance_std_dev, 20.0);
        let clipping_score = (100.0 * (1.0 - 2.0 * detail.clipped_fraction)).clamp(0.0, 100.0);
        let score = 0.5 * exposure_score + 0.25 * contrast_score + 0.25 * clipping_score;

        let mut assessment = ComponentAssessment::new(score, detail);
        let detail = assessment.detail.clone();

        if detail.mean_luminance < 70.0 {
            assessment.issue(
                format!("Face is underexposed (mean luminance {:.0})", detail.mean_luminance),
                "Add even frontal lighting or increase exposure",
            );
        } else if detail.mean_luminance > 210.0 {
            assessment.issue(
                format!("Face is overexposed (mean luminance {:.0})", detail.mean_luminance),
                "Reduce lighting intensity or exposure",
            );
        }
        if detail.luminance_std_dev < 15.0 {
            assessment.issue(
                format!("Flat lighting, low contrast (std dev {:.1})", detail.luminance_std_dev),
                "Use lighting that keeps facial features distinguishable",
            );
        }
        if detail.clipped_fraction > 0.25 {
            assessment.issue(
                format!("{:.0}% of pixels are clipped", detail.clipped_fraction * 100.0),
                "Avoid harsh light and deep shadows on the face",
            );
        }
        assessment
    }

    /// 100 inside the ideal band, losing 1.2 points per level outside it.
    fn exposure_score(mean: f64) -> f64 {
        let distance = if mean < IDEAL_MEAN.0 {
            IDEAL_MEAN.0 - mean
        } else if mean > IDEAL_MEAN.1 {
            mean - IDEAL_MEAN.1
        } else {
            0.0
        };
        (100.0 - 1.2 * distance).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient(offset: u8) -> GrayImage {
        GrayImage::from_fn(64, 64, |x, _| Luma([offset.saturating_add((x * 2) as u8)]))
    }

    #[test]
    fn test_well_exposed_scores_high() {
        let assessment = LightingAnalyzer::analyze(&gradient(70));
        assert!(assessment.score > 80.0, "score {}", assessment.score);
        assert!(assessment.issues.is_empty());
    }

    #[test]
    fn test_dark_image_flagged() {
        let dark = GrayImage::from_pixel(32, 32, Luma([20]));
        let assessment = LightingAnalyzer::analyze(&dark);

        assert!(assessment.score < 50.0);
        assert!(assessment.issues.iter().any(|i| i.contains("underexposed")));
    }

    #[test]
    fn test_clipped_highlights() {
        let white = GrayImage::from_pixel(16, 16, Luma([255]));
        let assessment = LightingAnalyzer::analyze(&white);

        assert!((assessment.detail.highlight_fraction - 1.0).abs() < 1e-9);
        assert!(assessment.issues.iter().any(|i| i.contains("overexposed")));
    }
}
