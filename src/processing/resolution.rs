use crate::models::ResolutionDetail;
use crate::processing::quality::ComponentAssessment;

/// Roughly a 35x45 mm print at 300 dpi.
pub const MIN_PRINT_PIXELS: f64 = 200_000.0;
pub const MIN_PRINT_DPI: f64 = 300.0;

pub struct ResolutionAnalyzer;

impl ResolutionAnalyzer {
    pub fn analyze(width: u32, height: u32, effective_dpi: Option<f64>) -> ComponentAssessment<ResolutionDetail> {
        let pixels = width as f64 * height as f64;
        let pixel_score = (pixels / MIN_PRINT_PIXELS).min(1.0) * 100.0;
        let score = match effective_dpi {
            Some(dpi) => 0.5 * pixel_score + 0.5 * (dpi / MIN_PRINT_DPI).clamp(0.0, 1.0) * 100.0,
            None => pixel_score,
        };

        let mut assessment = ComponentAssessment::new(
            score,
            ResolutionDetail {
                width,
                height,
                megapixels: pixels / 1_000_000.0,
                effective_dpi,
            },
        );

        if pixels < MIN_PRINT_PIXELS {
            assessment.issue(
                format!("Low resolution: {}x{} ({:.2} MP)", width, height, pixels / 1_000_000.0),
                "Use a higher resolution capture",
            );
        }
        if let Some(dpi) = effective_dpi.filter(|dpi| *dpi < MIN_PRINT_DPI) {
            assessment.issue(
                format!("Print resolution {:.0} dpi is below {:.0} dpi", dpi, MIN_PRINT_DPI),
                "Provide the photo at the full required pixel size",
            );
        }
        assessment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_size_scores_full() {
        let assessment = ResolutionAnalyzer::analyze(600, 600, Some(300.0));
        assert_eq!(assessment.score, 100.0);
        assert!(assessment.issues.is_empty());
    }

    #[test]
    fn test_small_image_flagged() {
        let assessment = ResolutionAnalyzer::analyze(100, 100, Some(150.0));
        assert!(assessment.score < 30.0);
        assert_eq!(assessment.issues.len(), 2);
    }

    #[test]
    fn test_unknown_dpi_uses_pixels_only() {
        let assessment = ResolutionAnalyzer::analyze(1000, 1000, None);
        assert_eq!(assessment.score, 100.0);
        assert_eq!(assessment.detail.effective_dpi, None);
    }
}
