use crate::models::NoiseDetail;
use crate::processing::quality::ComponentAssessment;
use image::GrayImage;
use imageproc::gradients::sobel_gradients;

/// Pixels with a Sobel magnitude above this are treated as structure, not noise.
const EDGE_MAGNITUDE: u16 = 120;

pub struct NoiseAnalyzer;

impl NoiseAnalyzer {
    pub fn analyze(gray: &GrayImage) -> ComponentAssessment<NoiseDetail> {
        let (noise_sigma, sampled_pixels) = Self::estimate_sigma(gray);
        let count = (gray.width() as f64 * gray.height() as f64).max(1.0);
        let mean = gray.pixels().map(|p| p.0[0] as f64).sum::<f64>() / count;
        let snr_db = if noise_sigma <= 1e-3 {
            60.0
        } else {
            (20.0 * (mean.max(1.0) / noise_sigma).log10()).min(60.0)
        };

        let score = (100.0 * (1.0 - noise_sigma / 20.0)).clamp(0.0, 100.0);
        let mut assessment = ComponentAssessment::new(
            score,
            NoiseDetail {
                noise_sigma,
                snr_db,
                sampled_pixels,
            },
        );

        if noise_sigma > 8.0 {
            assessment.issue(
                format!("Visible sensor noise (sigma {:.1}, SNR {:.1} dB)", noise_sigma, snr_db),
                "Shoot with more light or a lower ISO setting",
            );
        }
        assessment
    }

    /// Immerkaer's fast noise estimate, restricted to non-edge pixels.
    ///
    /// Returns the standard deviation estimate and how many pixels contributed.
    pub fn estimate_sigma(gray: &GrayImage) -> (f64, usize) {
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return (0.0, 0);
        }

        let edges = sobel_gradients(gray);
        let at = |x: u32, y: u32| gray.get_pixel(x, y).0[0] as f64;

        let mut total = 0.0;
        let mut samples = 0usize;
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                if edges.get_pixel(x, y).0[0] > EDGE_MAGNITUDE {
                    continue;
                }
                let response = at(x - 1, y - 1) + at(x + 1, y - 1) + at(x - 1, y + 1) + at(x + 1, y + 1)
                    - 2.0 * (at(x, y - 1) + at(x - 1, y) + at(x + 1, y) + at(x, y + 1))
                    + 4.0 * at(x, y);
                total += response.abs();
                samples += 1;
            }
        }

        if samples == 0 {
            return (0.0, 0);
        }
        let sigma = (std::f64::consts::PI / 2.0).sqrt() * total / (6.0 * samples as f64);
        (sigma, samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_clean_image_scores_full() {
        let clean = GrayImage::from_pixel(32, 32, Luma([128]));
        let assessment = NoiseAnalyzer::analyze(&clean);

        assert_eq!(assessment.detail.noise_sigma, 0.0);
        assert_eq!(assessment.score, 100.0);
        assert_eq!(assessment.detail.snr_db, 60.0);
    }

    #[test]
    fn test_speckle_raises_sigma() {
        // Deterministic pseudo-noise of amplitude +-20.
        let noisy = GrayImage::from_fn(48, 48, |x, y| {
            let hash = (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663)) % 41;
            Luma([(108 + hash) as u8])
        });
        let assessment = NoiseAnalyzer::analyze(&noisy);

        assert!(assessment.detail.noise_sigma > 2.0);
        assert!(assessment.score < 100.0);
        assert!(assessment.detail.sampled_pixels > 0);
    }
}
