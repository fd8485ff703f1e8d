use crate::models::SharpnessDetail;
use crate::processing::quality::{saturate, ComponentAssessment};
use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::sobel_gradients;

/// Focus estimate from three independent edge-energy measures.
pub struct SharpnessAnalyzer;

impl SharpnessAnalyzer {
    pub fn analyze(gray: &GrayImage) -> ComponentAssessment<SharpnessDetail> {
        let detail = SharpnessDetail {
            laplacian_variance: Self::laplacian_variance(gray),
            gradient_energy: Self::gradient_energy(gray),
            high_frequency_ratio: Self::high_frequency_ratio(gray),
        };

        let score = (saturate(detail.laplacian_variance, 100.0)
            + saturate(detail.gradient_energy, 20.0)
            + saturate(detail.high_frequency_ratio, 0.15))
            / 3.0;

        let mut assessment = ComponentAssessment::new(score, detail);
        if score < 40.0 {
            assessment.issue(
                format!("Image appears blurry (sharpness {:.0}/100)", score),
                "Retake the photo with the camera focused on the face",
            );
        } else if score < 60.0 {
            assessment.issue(
                format!("Image is slightly soft (sharpness {:.0}/100)", score),
                "Hold the camera steady and focus on the eyes",
            );
        }
        assessment
    }

    /// Variance of the 4-neighbour Laplacian over interior pixels.
    pub fn laplacian_variance(gray: &GrayImage) -> f64 {
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return 0.0;
        }

        let at = |x: u32, y: u32| gray.get_pixel(x, y).0[0] as f64;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut count = 0.0;
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let value = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
                sum += value;
                sum_sq += value * value;
                count += 1.0;
            }
        }

        let mean = sum / count;
        (sum_sq / count - mean * mean).max(0.0)
    }

    /// Mean Sobel gradient magnitude.
    pub fn gradient_energy(gray: &GrayImage) -> f64 {
        if gray.width() < 3 || gray.height() < 3 {
            return 0.0;
        }
        let gradients = sobel_gradients(gray);
        let total: f64 = gradients.pixels().map(|p| p.0[0] as f64).sum();
        total / (gradients.width() as f64 * gradients.height() as f64)
    }

    /// Energy left after subtracting a Gaussian low-pass, relative to total AC energy.
    pub fn high_frequency_ratio(gray: &GrayImage) -> f64 {
        if gray.width() < 3 || gray.height() < 3 {
            return 0.0;
        }
        let blurred = gaussian_blur_f32(gray, 2.0);
        let count = (gray.width() * gray.height()) as f64;
        let mean = gray.pixels().map(|p| p.0[0] as f64).sum::<f64>() / count;

        let mut high = 0.0;
        let mut total = 0.0;
        for (original, low) in gray.pixels().zip(blurred.pixels()) {
            let value = original.0[0] as f64;
            let diff = value - low.0[0] as f64;
            high += diff * diff;
            total += (value - mean) * (value - mean);
        }

        if total <= f64::EPSILON {
            0.0
        } else {
            (high / total).clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn checkerboard(size: u32, cell: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Luma([30])
            } else {
                Luma([220])
            }
        })
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let flat = GrayImage::from_pixel(32, 32, Luma([128]));
        let assessment = SharpnessAnalyzer::analyze(&flat);

        assert_eq!(assessment.detail.laplacian_variance, 0.0);
        assert_eq!(assessment.detail.gradient_energy, 0.0);
        assert!(assessment.score < 1.0);
        assert!(!assessment.issues.is_empty());
    }

    #[test]
    fn test_blur_lowers_sharpness() {
        let sharp = checkerboard(64, 4);
        let blurred = gaussian_blur_f32(&sharp, 3.0);

        let sharp_score = SharpnessAnalyzer::analyze(&sharp).score;
        let blurred_score = SharpnessAnalyzer::analyze(&blurred).score;
        assert!(sharp_score > blurred_score);
        assert!(
            SharpnessAnalyzer::laplacian_variance(&sharp)
                > SharpnessAnalyzer::laplacian_variance(&blurred)
        );
    }

    #[test]
    fn test_tiny_image() {
        let tiny = GrayImage::from_pixel(2, 2, Luma([10]));
        assert_eq!(SharpnessAnalyzer::laplacian_variance(&tiny), 0.0);
        assert_eq!(SharpnessAnalyzer::high_frequency_ratio(&tiny), 0.0);
    }
}
