use crate::models::{BackgroundResult, BoundingBox, ComplianceIssue, FormatSpec, IssueCategory, Severity};
use crate::processing::ImageProcessor;
use image::RgbImage;

const BLOCK: u32 = 8;
/// Mean block standard deviation at which uniformity reaches zero.
const UNIFORMITY_FALLOFF: f64 = 32.0;
const COLOR_WEIGHT: f64 = 0.6;
const UNIFORMITY_WEIGHT: f64 = 0.4;

pub struct BackgroundValidator;

impl BackgroundValidator {
    /// Compare the margin colour against the format and measure how flat it is.
    /// `face` is excluded from sampling when known.
    pub fn check(rgb: &RgbImage, face: Option<BoundingBox>, spec: &FormatSpec) -> (BackgroundResult, Vec<ComplianceIssue>) {
        let mut samples = ImageProcessor::background_pixels(rgb, face);
        if samples.is_empty() {
            samples = rgb.pixels().map(|p| p.0).collect();
        }

        let detected_color = ImageProcessor::median_color(&samples);
        let color_distance = ImageProcessor::color_distance(detected_color, spec.background_color);
        let tolerance = spec.background_tolerance.max(1.0);
        let color_component = if color_distance <= tolerance {
            1.0
        } else {
            (1.0 - (color_distance - tolerance) / (2.0 * tolerance)).max(0.0)
        };

        let uniformity = Self::uniformity(rgb, face);
        let color_ok = color_distance <= tolerance;
        let uniform = uniformity >= spec.uniformity_threshold;

        let mut issues = Vec::new();
        if !color_ok {
            let severity = if color_distance > 2.0 * tolerance {
                Severity::Critical
            } else {
                Severity::Major
            };
            issues.push(
                ComplianceIssue::new(
                    IssueCategory::BackgroundColor,
                    severity,
                    format!(
                        "Background colour {:?} is {:.0} away from required {:?} (tolerance {:.0})",
                        detected_color, color_distance, spec.background_color, tolerance
                    ),
                    "Use a plain background of the required colour",
                )
                .with_reference("ICAO Doc 9303 Part 3 - Background colour"),
            );
        }
        if !uniform {
            issues.push(
                ComplianceIssue::new(
                    IssueCategory::BackgroundUniformity,
                    Severity::Major,
                    format!(
                        "Background is not uniform ({:.2}, required {:.2})",
                        uniformity, spec.uniformity_threshold
                    ),
                    "Remove patterns, objects and shadows from the background",
                )
                .with_reference("ICAO Doc 9303 Part 3 - Background uniformity"),
            );
        }

        (
            BackgroundResult {
                passes: color_ok && uniform,
                detected_color,
                required_color: spec.background_color,
                color_distance,
                uniformity,
                score: 100.0 * (COLOR_WEIGHT * color_component + UNIFORMITY_WEIGHT * uniformity),
            },
            issues,
        )
    }

    /// One minus the mean per-block colour standard deviation (scaled), over 8x8 blocks
    /// lying entirely in the margins and clear of the face.
    pub fn uniformity(rgb: &RgbImage, face: Option<BoundingBox>) -> f64 {
        let (width, height) = rgb.dimensions();
        let edge = ImageProcessor::edge_width(width, height);
        let in_margin = |x: u32, y: u32| {
            x < edge || y < edge || x >= width.saturating_sub(edge) || y >= height.saturating_sub(edge)
        };
        let clear = |x: u32, y: u32| in_margin(x, y) && !face.map_or(false, |f| f.contains(x, y));

        let mut total_std = 0.0;
        let mut blocks = 0usize;
        for by in (0..height.saturating_sub(BLOCK - 1)).step_by(BLOCK as usize) {
            for bx in (0..width.saturating_sub(BLOCK - 1)).step_by(BLOCK as usize) {
                let corners = [
                    (bx, by),
                    (bx + BLOCK - 1, by),
                    (bx, by + BLOCK - 1),
                    (bx + BLOCK - 1, by + BLOCK - 1),
                ];
                if !corners.iter().all(|&(x, y)| clear(x, y)) {
                    continue;
                }
                total_std += Self::block_std(rgb, bx, by);
                blocks += 1;
            }
        }

        if blocks == 0 {
            return 1.0;
        }
        (1.0 - (total_std / blocks as f64) / UNIFORMITY_FALLOFF).clamp(0.0, 1.0)
    }

    fn block_std(rgb: &RgbImage, bx: u32, by: u32) -> f64 {
        let count = (BLOCK * BLOCK) as f64;
        let mut result = 0.0;
        for channel in 0..3 {
            let mut sum = 0.0;
            let mut sum_sq = 0.0;
            for y in by..by + BLOCK {
                for x in bx..bx + BLOCK {
                    let value = rgb.get_pixel(x, y).0[channel] as f64;
                    sum += value;
                    sum_sq += value * value;
                }
            }
            let mean = sum / count;
            result += (sum_sq / count - mean * mean).max(0.0).sqrt();
        }
        result / 3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FormatCatalog;
    use image::Rgb;

    fn spec() -> FormatSpec {
        FormatCatalog::builtin().unwrap().get("ICS-UAE").unwrap().clone()
    }

    #[test]
    fn test_white_background_passes() {
        let img = RgbImage::from_pixel(413, 531, Rgb([255, 255, 255]));
        let (result, issues) = BackgroundValidator::check(&img, None, &spec());

        assert!(result.passes);
        assert_eq!(result.uniformity, 1.0);
        assert_eq!(result.score, 100.0);
        assert!(issues.is_empty());
    }

    #[test]
    fn test_red_background_is_critical_and_fixable() {
        let img = RgbImage::from_pixel(413, 531, Rgb([255, 0, 0]));
        let (result, issues) = BackgroundValidator::check(&img, None, &spec());

        assert!(!result.passes);
        assert_eq!(result.detected_color, [255, 0, 0]);
        let issue = &issues[0];
        assert_eq!(issue.category, IssueCategory::BackgroundColor);
        assert_eq!(issue.category.group(), "background");
        assert_eq!(issue.severity, Severity::Critical);
        assert!(issue.auto_fixable);
    }

    #[test]
    fn test_noisy_background_not_uniform() {
        let img = RgbImage::from_fn(200, 200, |x, y| {
            if (x / 2 + y / 2) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([200, 200, 200])
            }
        });
        let (result, issues) = BackgroundValidator::check(&img, None, &spec());

        assert!(result.uniformity < 0.5);
        assert!(issues.iter().any(|i| i.category == IssueCategory::BackgroundUniformity));
    }

    #[test]
    fn test_face_excluded_from_sampling() {
        let face = BoundingBox { x: 0, y: 0, width: 100, height: 200 };
        let img = RgbImage::from_fn(200, 200, |x, _| {
            if x < 100 {
                Rgb([30, 30, 30])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let (result, _) = BackgroundValidator::check(&img, Some(face), &spec());
        assert_eq!(result.detected_color, [255, 255, 255]);
    }
}
