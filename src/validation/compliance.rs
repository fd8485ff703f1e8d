use crate::models::{
    ComplianceIssue, ComplianceResult, FaceDetection, FaceMetrics, FormatCatalog, IssueCategory,
    RuleCatalog, Severity,
};
use crate::processing::ImageProcessor;
use crate::utils::ComplianceError;
use crate::validation::background::BackgroundValidator;
use crate::validation::dimensions::DimensionValidator;
use crate::validation::position::PositionValidator;
use crate::validation::quality::QualityValidator;
use crate::validation::rules::RuleEvaluator;
use image::DynamicImage;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Fixed weights for the four sub-scores. They sum to one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplianceWeights {
    pub dimensions: f64,
    pub position: f64,
    pub background: f64,
    pub quality: f64,
}

pub const COMPLIANCE_WEIGHTS: ComplianceWeights = ComplianceWeights {
    dimensions: 0.25,
    position: 0.30,
    background: 0.20,
    quality: 0.25,
};

pub const DEFAULT_PASS_THRESHOLD: f64 = 70.0;

/// Runs the dimension, position, background and quality checks and fuses them into one
/// `ComplianceResult`.
#[derive(Debug, Clone)]
pub struct ComplianceValidator {
    evaluator: RuleEvaluator,
    formats: Arc<FormatCatalog>,
    pass_threshold: f64,
}

impl ComplianceValidator {
    pub fn new(rules: Arc<RuleCatalog>, formats: Arc<FormatCatalog>) -> Self {
        ComplianceValidator {
            evaluator: RuleEvaluator::new(rules),
            formats,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }

    /// Force one jurisdiction for every format instead of each format's own.
    pub fn with_jurisdiction(mut self, jurisdiction: &str) -> Result<Self, ComplianceError> {
        self.evaluator = self.evaluator.with_jurisdiction(jurisdiction)?;
        Ok(self)
    }

    pub fn with_pass_threshold(mut self, pass_threshold: f64) -> Self {
        self.pass_threshold = pass_threshold.clamp(0.0, 100.0);
        self
    }

    pub fn pass_threshold(&self) -> f64 {
        self.pass_threshold
    }

    pub fn formats(&self) -> &FormatCatalog {
        &self.formats
    }

    pub fn evaluator(&self) -> &RuleEvaluator {
        &self.evaluator
    }

    /// Validate `img` against `format_id`.
    ///
    /// Only zero-area images and unknown formats are errors; everything else, including
    /// a missing face or unusable measurements, is reported through `issues`.
    pub fn validate(
        &self,
        img: &DynamicImage,
        format_id: &str,
        face_metrics: Option<&FaceMetrics>,
    ) -> Result<ComplianceResult, ComplianceError> {
        let face_count = usize::from(face_metrics.is_some());
        self.validate_with(img, format_id, face_metrics, face_count)
    }

    /// Validate using a detector collaborator's output.
    pub fn validate_detection(
        &self,
        img: &DynamicImage,
        format_id: &str,
        detection: &FaceDetection,
    ) -> Result<ComplianceResult, ComplianceError> {
        let face = if detection.face_found {
            detection.face_metrics.as_ref()
        } else {
            None
        };
        if detection.face_found && face.is_none() {
            warn!("Detector reported a face without metrics; validating as faceless");
        }
        let face_count = if detection.face_found {
            detection.face_count.max(1)
        } else {
            0
        };
        self.validate_with(img, format_id, face, face_count)
    }

    /// Validate a corrected copy of the image behind `previous`.
    ///
    /// The face count from `previous` is carried over. `face_metrics` should be the
    /// measurements as originally supplied (`previous.input_face_metrics`), rescaled if the
    /// correction resized the image, so clamp notes are reproduced.
    pub fn revalidate(
        &self,
        img: &DynamicImage,
        previous: &ComplianceResult,
        face_metrics: Option<&FaceMetrics>,
    ) -> Result<ComplianceResult, ComplianceError> {
        self.validate_with(img, &previous.format_id, face_metrics, previous.face_count)
    }

    fn validate_with(
        &self,
        img: &DynamicImage,
        format_id: &str,
        face_metrics: Option<&FaceMetrics>,
        face_count: usize,
    ) -> Result<ComplianceResult, ComplianceError> {
        let start_time = Instant::now();
        ImageProcessor::ensure_valid(img)?;
        let spec = self.formats.get(format_id)?;

        let jurisdiction = self.effective_jurisdiction(spec.jurisdiction.as_deref());
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();

        let mut issues = Vec::new();
        if face_count > 1 {
            issues.push(
                ComplianceIssue::new(
                    IssueCategory::MultipleFaces,
                    Severity::Critical,
                    format!("{} faces detected; exactly one is allowed", face_count),
                    "Retake the photo with only the applicant in frame",
                )
                .with_reference("ICAO Doc 9303 Part 3 - Single subject"),
            );
        }

        // Face metrics are external input; clamp anything unusable and say so.
        let face = face_metrics.map(|metrics| {
            let (clean, notes) = metrics.sanitized();
            for note in notes {
                issues.push(ComplianceIssue::new(
                    IssueCategory::Measurement,
                    Severity::Major,
                    note.to_string(),
                    "Re-run face detection on a clearer capture",
                ));
            }
            clean
        });
        let face_region = face.as_ref().and_then(|f| f.face_region(width, height));

        let (dimension_check, dimension_issues) = DimensionValidator::check(width, height, spec);
        let (position_check, position_issues) = PositionValidator::check(face.as_ref(), spec);
        let face_rule_issues = face
            .as_ref()
            .map(|f| PositionValidator::face_rule_issues(f, &self.evaluator, jurisdiction))
            .unwrap_or_default();
        let (background_check, background_issues) = BackgroundValidator::check(&rgb, face_region, spec);
        let (quality_check, quality_issues) =
            QualityValidator::check(img, face_region, face.as_ref(), spec, &self.evaluator, jurisdiction);

        issues.extend(dimension_issues);
        issues.extend(position_issues);
        issues.extend(face_rule_issues);
        issues.extend(background_issues);
        issues.extend(quality_issues);
        // Stable: within a severity, issues stay in check order.
        issues.sort_by(|a, b| b.severity.cmp(&a.severity));

        let w = COMPLIANCE_WEIGHTS;
        let overall_score = (w.dimensions * dimension_check.score
            + w.position * position_check.positioning_score
            + w.background * background_check.score
            + w.quality * quality_check.score)
            .clamp(0.0, 100.0);
        let has_critical = issues.iter().any(|issue| issue.severity == Severity::Critical);
        let overall_pass = overall_score >= self.pass_threshold && !has_critical;

        debug!(
            "{}: dimensions {:.1} position {:.1} background {:.1} quality {:.1}",
            format_id,
            dimension_check.score,
            position_check.positioning_score,
            background_check.score,
            quality_check.score
        );

        let result = ComplianceResult {
            format_id: spec.format_id.clone(),
            overall_score,
            overall_pass,
            dimension_check,
            position_check,
            background_check,
            quality_check,
            issues,
            processing_time: start_time.elapsed().as_secs_f64(),
            face_metrics: face,
            input_face_metrics: face_metrics.cloned(),
            face_count,
            image_digest: ImageProcessor::digest(img),
            validated_at: chrono::Utc::now().to_rfc3339(),
        };

        info!("{}", result.summary());
        Ok(result)
    }

    /// Explicit jurisdiction wins, then the format's own if the catalog knows it.
    fn effective_jurisdiction<'a>(&'a self, format_jurisdiction: Option<&'a str>) -> Option<&'a str> {
        if let Some(explicit) = self.evaluator.jurisdiction() {
            return Some(explicit);
        }
        match format_jurisdiction {
            Some(j) if self.evaluator.catalog().has_jurisdiction(j) => Some(j),
            Some(j) => {
                debug!("Format jurisdiction {} not in rule catalog; using base thresholds", j);
                None
            }
            None => None,
        }
    }
}
