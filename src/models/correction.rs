use crate::models::data::{ComplianceIssue, ComplianceResult, IssueCategory};
use image::DynamicImage;
use serde::Serialize;

/// Primitive image operations the planner can schedule, with their parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum CorrectionOperation {
    Resize { width: u32, height: u32 },
    /// Repaint background pixels close to the dominant background colour with `target`.
    BackgroundRecolor { target: [u8; 3], match_distance: f64 },
    /// Blur the background, leaving the padded face box untouched.
    BackgroundSmooth { sigma: f32, face_padding: u32 },
    WhiteBalance,
    /// Multiplicative lightness factor, above one brightens.
    Brightness { factor: f32 },
    LocalContrast { clip_limit: f32, tiles: u32 },
    Denoise { radius: u32 },
    /// Share of the sharpened image in the final blend.
    Sharpen { blend: f32 },
}

impl CorrectionOperation {
    pub fn name(&self) -> &'static str {
        match self {
            CorrectionOperation::Resize { .. } => "resize",
            CorrectionOperation::BackgroundRecolor { .. } => "background_recolor",
            CorrectionOperation::BackgroundSmooth { .. } => "background_smooth",
            CorrectionOperation::WhiteBalance => "white_balance",
            CorrectionOperation::Brightness { .. } => "brightness",
            CorrectionOperation::LocalContrast { .. } => "local_contrast",
            CorrectionOperation::Denoise { .. } => "denoise",
            CorrectionOperation::Sharpen { .. } => "sharpen",
        }
    }

    /// Position in the fixed execution order: geometry, background, colour, tone, detail.
    pub fn stage(&self) -> u8 {
        match self {
            CorrectionOperation::Resize { .. } => 0,
            CorrectionOperation::BackgroundRecolor { .. } => 1,
            CorrectionOperation::BackgroundSmooth { .. } => 2,
            CorrectionOperation::WhiteBalance => 3,
            CorrectionOperation::Brightness { .. } => 4,
            CorrectionOperation::LocalContrast { .. } => 5,
            CorrectionOperation::Denoise { .. } => 6,
            CorrectionOperation::Sharpen { .. } => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodTier {
    Primary,
    Fallback,
    /// Neither method could run; the image passed through unchanged.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionStep {
    #[serde(flatten)]
    pub operation: CorrectionOperation,
    pub method: MethodTier,
    pub addresses: Vec<IssueCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionPlan {
    pub steps: Vec<CorrectionStep>,
    pub fixable: Vec<ComplianceIssue>,
    pub unfixable: Vec<ComplianceIssue>,
    /// Upper bound on the score reachable by fixing only the fixable issues.
    pub estimated_max_score: f64,
}

impl CorrectionPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn operation_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.operation.name()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedCorrection {
    pub operation: String,
    pub method: MethodTier,
    pub method_name: String,
    pub changed_image: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoFixResult {
    pub success: bool,
    pub applied_corrections: Vec<AppliedCorrection>,
    #[serde(skip)]
    pub corrected_image: DynamicImage,
    pub before_validation: ComplianceResult,
    pub after_validation: ComplianceResult,
    /// Set when the corrected image was rejected as a regression.
    pub rejected_validation: Option<ComplianceResult>,
    pub rolled_back: bool,
    pub quality_preserved: bool,
    pub improvement: f64,
    pub estimated_max_score: f64,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub processing_time: f64,
}
