use crate::models::quality::QualityMetrics;
use crate::models::rules::Severity;
use crate::utils::ComplianceError;
use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    /// Grow by `padding` pixels on every side, clipped to the image.
    pub fn padded(&self, padding: u32, image_width: u32, image_height: u32) -> BoundingBox {
        let x = self.x.saturating_sub(padding);
        let y = self.y.saturating_sub(padding);
        let right = (self.x + self.width + padding).min(image_width);
        let bottom = (self.y + self.height + padding).min(image_height);
        BoundingBox {
            x,
            y,
            width: right.saturating_sub(x),
            height: bottom.saturating_sub(y),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Face geometry reported by the external detector.
///
/// Ratios and centre coordinates are normalized to the image size, `eye_distance` is in
/// pixels and `face_angle` is the roll in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMetrics {
    pub face_height_ratio: f64,
    /// Height of the eye line above the bottom edge, as a share of image height.
    pub eye_height_ratio: f64,
    pub face_center_x: f64,
    pub face_center_y: f64,
    pub eye_distance: f64,
    pub face_angle: f64,
    #[serde(default = "default_true")]
    pub eyes_open: bool,
    #[serde(default = "default_true")]
    pub mouth_closed: bool,
    #[serde(default)]
    pub tinted_lens_confidence: Option<f64>,
    #[serde(default)]
    pub head_covering_confidence: Option<f64>,
}

impl FaceMetrics {
    /// Approximate face rectangle: height from the ratio, width three quarters of that.
    pub fn face_region(&self, image_width: u32, image_height: u32) -> Option<BoundingBox> {
        if image_width == 0 || image_height == 0 {
            return None;
        }
        let height = (self.face_height_ratio * image_height as f64).clamp(0.0, image_height as f64);
        let width = (height * 0.75).min(image_width as f64);
        if height < 1.0 || width < 1.0 {
            return None;
        }

        let cx = self.face_center_x * image_width as f64;
        let cy = self.face_center_y * image_height as f64;
        let x = (cx - width / 2.0).clamp(0.0, image_width as f64 - width);
        let y = (cy - height / 2.0).clamp(0.0, image_height as f64 - height);

        Some(BoundingBox {
            x: x.round() as u32,
            y: y.round() as u32,
            width: (width.round() as u32).min(image_width - x.round() as u32),
            height: (height.round() as u32).min(image_height - y.round() as u32),
        })
    }

    /// Replace non-finite or out-of-range values so scoring stays total.
    /// Returns the cleaned metrics and a `MeasurementError` for each value that had to be changed.
    pub fn sanitized(&self) -> (FaceMetrics, Vec<ComplianceError>) {
        let mut notes = Vec::new();
        let mut clean = self.clone();

        fn fix(value: &mut f64, lower: f64, upper: f64, fallback: f64, name: &str, notes: &mut Vec<ComplianceError>) {
            if !value.is_finite() {
                notes.push(ComplianceError::MeasurementError(format!("{} was not a finite number", name)));
                *value = fallback;
            } else if *value < lower || *value > upper {
                notes.push(ComplianceError::MeasurementError(format!(
                    "{} {:.3} outside [{}, {}]",
                    name, value, lower, upper
                )));
                *value = value.clamp(lower, upper);
            }
        }

        fix(&mut clean.face_height_ratio, 0.0, 1.0, 0.0, "face_height_ratio", &mut notes);
        fix(&mut clean.eye_height_ratio, 0.0, 1.0, 0.0, "eye_height_ratio", &mut notes);
        fix(&mut clean.face_center_x, 0.0, 1.0, 0.5, "face_center_x", &mut notes);
        fix(&mut clean.face_center_y, 0.0, 1.0, 0.5, "face_center_y", &mut notes);
        fix(&mut clean.eye_distance, 0.0, f64::MAX, 0.0, "eye_distance", &mut notes);
        fix(&mut clean.face_angle, -180.0, 180.0, 90.0, "face_angle", &mut notes);

        for (name, confidence) in [
            ("tinted_lens_confidence", &mut clean.tinted_lens_confidence),
            ("head_covering_confidence", &mut clean.head_covering_confidence),
        ] {
            if let Some(value) = confidence.as_mut() {
                fix(value, 0.0, 1.0, 1.0, name, &mut notes);
            }
        }

        (clean, notes)
    }
}

/// Output of the face/landmark detector collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub face_found: bool,
    pub bounding_box: Option<BoundingBox>,
    pub landmarks: Vec<(f64, f64)>,
    pub face_metrics: Option<FaceMetrics>,
    pub confidence: f64,
    pub face_count: usize,
}

impl FaceDetection {
    pub fn not_found() -> Self {
        FaceDetection {
            face_found: false,
            bounding_box: None,
            landmarks: Vec::new(),
            face_metrics: None,
            confidence: 0.0,
            face_count: 0,
        }
    }
}

/// Closed set of problems the validator can report. The auto-fix planner routes on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    DimensionScale,
    AspectRatio,
    Resolution,
    FaceSize,
    EyePosition,
    Centering,
    HeadPose,
    Expression,
    NoFace,
    MultipleFaces,
    Occlusion,
    BackgroundColor,
    BackgroundUniformity,
    Underexposed,
    Overexposed,
    Contrast,
    Sharpness,
    Noise,
    ColorBalance,
    Measurement,
}

impl IssueCategory {
    /// Whether a bounded image operation can address this category.
    pub fn auto_fixable(&self) -> bool {
        matches!(
            self,
            IssueCategory::DimensionScale
                | IssueCategory::BackgroundColor
                | IssueCategory::BackgroundUniformity
                | IssueCategory::Underexposed
                | IssueCategory::Overexposed
                | IssueCategory::Contrast
                | IssueCategory::Sharpness
                | IssueCategory::Noise
                | IssueCategory::ColorBalance
        )
    }

    /// Check the category belongs to, as used in exports.
    pub fn group(&self) -> &'static str {
        match self {
            IssueCategory::DimensionScale | IssueCategory::AspectRatio => "dimensions",
            IssueCategory::FaceSize
            | IssueCategory::EyePosition
            | IssueCategory::Centering
            | IssueCategory::HeadPose => "position",
            IssueCategory::Expression
            | IssueCategory::NoFace
            | IssueCategory::MultipleFaces
            | IssueCategory::Occlusion
            | IssueCategory::Measurement => "face",
            IssueCategory::BackgroundColor | IssueCategory::BackgroundUniformity => "background",
            IssueCategory::Resolution
            | IssueCategory::Underexposed
            | IssueCategory::Overexposed
            | IssueCategory::Contrast
            | IssueCategory::Sharpness
            | IssueCategory::Noise
            | IssueCategory::ColorBalance => "quality",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceIssue {
    pub category: IssueCategory,
    pub severity: Severity,
    pub message: String,
    pub suggestion: String,
    pub auto_fixable: bool,
    pub regulation_reference: String,
    pub rule_id: Option<String>,
}

impl ComplianceIssue {
    pub fn new(category: IssueCategory, severity: Severity, message: String, suggestion: &str) -> Self {
        ComplianceIssue {
            category,
            severity,
            message,
            suggestion: suggestion.to_string(),
            auto_fixable: category.auto_fixable(),
            regulation_reference: String::new(),
            rule_id: None,
        }
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.regulation_reference = reference.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionResult {
    pub passes: bool,
    pub actual_width: u32,
    pub actual_height: u32,
    pub required_width: u32,
    pub required_height: u32,
    /// Largest relative deviation across both axes.
    pub deviation: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionResult {
    pub passes: bool,
    pub face_found: bool,
    pub face_height_ratio: f64,
    pub eye_height_ratio: f64,
    pub centering_offset: f64,
    pub face_angle: f64,
    pub centering_score: f64,
    pub positioning_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackgroundResult {
    pub passes: bool,
    pub detected_color: [u8; 3],
    pub required_color: [u8; 3],
    pub color_distance: f64,
    /// 0-1, one means perfectly flat.
    pub uniformity: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityResult {
    pub passes: bool,
    pub score: f64,
    pub metrics: QualityMetrics,
}

/// One validation pass. Never mutated after it is returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceResult {
    pub format_id: String,
    pub overall_score: f64,
    pub overall_pass: bool,
    pub dimension_check: DimensionResult,
    pub position_check: PositionResult,
    pub background_check: BackgroundResult,
    pub quality_check: QualityResult,
    /// Ordered most severe first, then in check order.
    pub issues: Vec<ComplianceIssue>,
    /// Seconds.
    pub processing_time: f64,
    /// Measurements after clamping, as scored.
    pub face_metrics: Option<FaceMetrics>,
    /// Measurements as supplied, before clamping. Revalidation starts from these.
    pub input_face_metrics: Option<FaceMetrics>,
    /// Faces the detector reported; one when measurements were passed in directly.
    pub face_count: usize,
    /// SHA-256 of the RGB pixel buffer, hex encoded.
    pub image_digest: String,
    pub validated_at: String,
}

impl ComplianceResult {
    pub fn compliance_score(&self) -> f64 {
        self.overall_score
    }

    pub fn critical_issues(&self) -> Vec<&ComplianceIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Critical)
            .collect()
    }

    pub fn auto_fixable_issues(&self) -> Vec<&ComplianceIssue> {
        self.issues.iter().filter(|issue| issue.auto_fixable).collect()
    }

    pub fn has_category(&self, category: IssueCategory) -> bool {
        self.issues.iter().any(|issue| issue.category == category)
    }

    pub fn summary(&self) -> String {
        let status = if self.overall_pass { "PASS" } else { "FAIL" };
        format!(
            "{} {} - score {:.1}/100, {} issue(s) ({} critical, {} auto-fixable)",
            self.format_id,
            status,
            self.overall_score,
            self.issues.len(),
            self.critical_issues().len(),
            self.auto_fixable_issues().len()
        )
    }
}
