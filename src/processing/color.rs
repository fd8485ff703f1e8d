use crate::models::ColorDetail;
use crate::processing::image::ImageProcessor;
use crate::processing::quality::ComponentAssessment;
use image::RgbImage;

/// Chrominance box for skin in YCbCr (Chai and Ngan).
const SKIN_CB: (f32, f32) = (77.0, 127.0);
const SKIN_CR: (f32, f32) = (133.0, 173.0);

pub struct ColorAnalyzer;

impl ColorAnalyzer {
    /// `face_known` enables the skin-tone plausibility term; without a face the score is
    /// white balance alone.
    pub fn analyze(rgb: &RgbImage, face_known: bool) -> ComponentAssessment<ColorDetail> {
        let mean_rgb = Self::mean_rgb(rgb);
        let white_balance_angle = Self::neutral_angle(mean_rgb);
        let skin_tone_fraction = Self::skin_fraction(rgb);

        let balance_score = if white_balance_angle <= 3.0 {
            100.0
        } else {
            (100.0 * (1.0 - (white_balance_angle - 3.0) / 22.0)).clamp(0.0, 100.0)
        };
        let score = if face_known {
            let skin_score = (skin_tone_fraction / 0.4).min(1.0) * 100.0;
            0.7 * balance_score + 0.3 * skin_score
        } else {
            balance_score
        };

        let detail = ColorDetail {
            mean_rgb,
            white_balance_angle,
            skin_tone_fraction,
            is_grayscale: false,
        };
        let mut assessment = ComponentAssessment::new(score, detail);

        if white_balance_angle > 12.0 {
            assessment.issue(
                format!("Colour cast detected ({:.1} degrees off neutral)", white_balance_angle),
                "Use neutral white lighting or correct the white balance",
            );
        }
        if face_known && skin_tone_fraction < 0.15 {
            assessment.issue(
                format!(
                    "Skin tones look implausible ({:.0}% skin-coloured pixels in the face region)",
                    skin_tone_fraction * 100.0
                ),
                "Check for coloured lighting or heavy filters",
            );
        }
        assessment
    }

    /// Lowest-tier result for images without colour channels.
    pub fn grayscale() -> ComponentAssessment<ColorDetail> {
        let mut assessment = ComponentAssessment::new(
            0.0,
            ColorDetail {
                is_grayscale: true,
                ..ColorDetail::default()
            },
        );
        assessment.issue(
            "Image has a single channel; colour accuracy cannot be assessed".to_string(),
            "Submit a colour photograph",
        );
        assessment
    }

    pub fn mean_rgb(rgb: &RgbImage) -> [f64; 3] {
        let count = (rgb.width() as f64 * rgb.height() as f64).max(1.0);
        let mut sums = [0.0f64; 3];
        for pixel in rgb.pixels() {
            for (sum, &channel) in sums.iter_mut().zip(pixel.0.iter()) {
                *sum += channel as f64;
            }
        }
        sums.map(|sum| sum / count)
    }

    /// Angle in degrees between `mean` and the grey axis.
    pub fn neutral_angle(mean: [f64; 3]) -> f64 {
        let norm = (mean[0] * mean[0] + mean[1] * mean[1] + mean[2] * mean[2]).sqrt();
        if norm <= f64::EPSILON {
            return 0.0;
        }
        let cosine = (mean[0] + mean[1] + mean[2]) / (norm * 3f64.sqrt());
        cosine.clamp(-1.0, 1.0).acos().to_degrees()
    }

    pub fn skin_fraction(rgb: &RgbImage) -> f64 {
        let total = rgb.width() as u64 * rgb.height() as u64;
        if total == 0 {
            return 0.0;
        }
        let skin = rgb
            .pixels()
            .filter(|p| {
                let [_, cb, cr] = ImageProcessor::rgb_to_ycbcr(p.0);
                (SKIN_CB.0..=SKIN_CB.1).contains(&cb) && (SKIN_CR.0..=SKIN_CR.1).contains(&cr)
            })
            .count();
        skin as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_neutral_image_has_no_cast() {
        let grey = RgbImage::from_pixel(16, 16, Rgb([180, 180, 180]));
        let assessment = ColorAnalyzer::analyze(&grey, false);

        assert!(assessment.detail.white_balance_angle < 1e-6);
        assert!((assessment.score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_blue_cast_detected() {
        let blue = RgbImage::from_pixel(16, 16, Rgb([120, 140, 230]));
        let assessment = ColorAnalyzer::analyze(&blue, false);

        assert!(assessment.detail.white_balance_angle > 12.0);
        assert!(assessment.issues.iter().any(|i| i.contains("Colour cast")));
    }

    #[test]
    fn test_skin_pixels_recognized() {
        let skin = RgbImage::from_pixel(8, 8, Rgb([224, 172, 140]));
        assert!((ColorAnalyzer::skin_fraction(&skin) - 1.0).abs() < 1e-9);

        let red = RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]));
        assert_eq!(ColorAnalyzer::skin_fraction(&red), 0.0);
    }

    #[test]
    fn test_grayscale_is_lowest_tier() {
        let assessment = ColorAnalyzer::grayscale();
        assert_eq!(assessment.score, 0.0);
        assert!(assessment.detail.is_grayscale);
        assert_eq!(assessment.issues.len(), 1);
    }
}
