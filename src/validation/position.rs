use crate::models::{
    ComplianceIssue, FaceMetrics, FormatSpec, IssueCategory, PositionResult, RuleCategory,
    RuleEvaluationResult, Severity,
};
use crate::validation::rules::RuleEvaluator;
use std::collections::BTreeMap;

const FACE_HEIGHT_WEIGHT: f64 = 0.4;
const EYE_WEIGHT: f64 = 0.3;
const CENTERING_WEIGHT: f64 = 0.2;
const ANGLE_WEIGHT: f64 = 0.1;

pub struct PositionValidator;

impl PositionValidator {
    /// Geometry checks against the format bands. `face` must already be sanitized.
    pub fn check(face: Option<&FaceMetrics>, spec: &FormatSpec) -> (PositionResult, Vec<ComplianceIssue>) {
        let face = match face {
            Some(face) => face,
            None => {
                let issue = ComplianceIssue::new(
                    IssueCategory::NoFace,
                    Severity::Critical,
                    "No face detected in the image".to_string(),
                    "Retake the photo facing the camera with the full face visible",
                )
                .with_reference("ICAO Doc 9303 Part 3 - Face presence");
                return (
                    PositionResult {
                        passes: false,
                        face_found: false,
                        face_height_ratio: 0.0,
                        eye_height_ratio: 0.0,
                        centering_offset: 0.0,
                        face_angle: 0.0,
                        centering_score: 0.0,
                        positioning_score: 0.0,
                    },
                    vec![issue],
                );
            }
        };

        let mut issues = Vec::new();

        // Face height
        let (face_lower, face_upper) = spec.face_height_ratio;
        let height_ok = face_lower <= face.face_height_ratio && face.face_height_ratio <= face_upper;
        if !height_ok {
            let suggestion = if face.face_height_ratio < face_lower {
                "Move closer to the camera or crop tighter around the head"
            } else {
                "Move further from the camera or crop wider around the head"
            };
            issues.push(
                ComplianceIssue::new(
                    IssueCategory::FaceSize,
                    Severity::Critical,
                    format!(
                        "Face height ratio {:.2} outside {:.2}-{:.2}",
                        face.face_height_ratio, face_lower, face_upper
                    ),
                    suggestion,
                )
                .with_reference("ICAO Doc 9303 Part 3 - Face height"),
            );
        }

        // Eye line
        let (eye_lower, eye_upper) = spec.eye_height_ratio;
        let eyes_ok = eye_lower <= face.eye_height_ratio && face.eye_height_ratio <= eye_upper;
        if !eyes_ok {
            issues.push(
                ComplianceIssue::new(
                    IssueCategory::EyePosition,
                    Severity::Major,
                    format!(
                        "Eye height ratio {:.2} outside {:.2}-{:.2}",
                        face.eye_height_ratio, eye_lower, eye_upper
                    ),
                    "Adjust the vertical framing so the eyes sit in the required band",
                )
                .with_reference("ICAO Doc 9303 Part 3 - Eye position"),
            );
        }

        // Centering
        let centering_offset =
            ((face.face_center_x - 0.5).powi(2) + (face.face_center_y - 0.5).powi(2)).sqrt();
        let centered = centering_offset <= spec.centering_tolerance;
        if !centered {
            issues.push(
                ComplianceIssue::new(
                    IssueCategory::Centering,
                    Severity::Major,
                    format!(
                        "Face centre is {:.3} from the image centre (limit {:.3})",
                        centering_offset, spec.centering_tolerance
                    ),
                    "Center the face in the frame",
                )
                .with_reference("ICAO Doc 9303 Part 3 - Face centering"),
            );
        }

        // Roll
        let angle = face.face_angle.abs();
        let level = angle <= spec.max_face_angle;
        if !level {
            issues.push(
                ComplianceIssue::new(
                    IssueCategory::HeadPose,
                    Severity::Major,
                    format!("Head tilted {:.1} degrees (limit {:.1})", face.face_angle, spec.max_face_angle),
                    "Keep the head straight and look directly at the camera",
                )
                .with_reference("ICAO Doc 9303 Part 3 - Head pose"),
            );
        }

        let height_component = Self::band_component(face.face_height_ratio, face_lower, face_upper);
        let eye_component = Self::band_component(face.eye_height_ratio, eye_lower, eye_upper);
        let centering_score = Self::limit_component(centering_offset, spec.centering_tolerance);
        let angle_component = Self::limit_component(angle, spec.max_face_angle);

        let positioning_score = 100.0
            * (FACE_HEIGHT_WEIGHT * height_component
                + EYE_WEIGHT * eye_component
                + CENTERING_WEIGHT * centering_score
                + ANGLE_WEIGHT * angle_component);

        (
            PositionResult {
                passes: height_ok && eyes_ok && centered && level,
                face_found: true,
                face_height_ratio: face.face_height_ratio,
                eye_height_ratio: face.eye_height_ratio,
                centering_offset,
                face_angle: face.face_angle,
                centering_score: centering_score * 100.0,
                positioning_score: positioning_score.clamp(0.0, 100.0),
            },
            issues,
        )
    }

    /// 1.0 at the band centre, 0.7 at its edges, falling to zero one half-width outside.
    pub fn band_component(value: f64, lower: f64, upper: f64) -> f64 {
        let half_width = ((upper - lower) / 2.0).max(f64::EPSILON);
        let centre = (lower + upper) / 2.0;
        let distance = (value - centre).abs();
        if distance <= half_width {
            0.7 + 0.3 * (1.0 - distance / half_width)
        } else {
            0.7 * (1.0 - (distance - half_width) / half_width).max(0.0)
        }
    }

    /// Same shape as `band_component` for a one-sided limit starting at zero.
    pub fn limit_component(value: f64, limit: f64) -> f64 {
        let limit = limit.max(f64::EPSILON);
        if value <= limit {
            0.7 + 0.3 * (1.0 - value / limit)
        } else {
            0.7 * (1.0 - (value - limit) / limit).max(0.0)
        }
    }

    /// Expression and accessory rules for a detected face.
    pub fn face_rule_issues(
        face: &FaceMetrics,
        evaluator: &RuleEvaluator,
        jurisdiction: Option<&str>,
    ) -> Vec<ComplianceIssue> {
        let mut observations = BTreeMap::new();
        observations.insert("eyes_open".to_string(), if face.eyes_open { 1.0 } else { 0.0 });
        observations.insert("mouth_closed".to_string(), if face.mouth_closed { 1.0 } else { 0.0 });
        if let Some(confidence) = face.tinted_lens_confidence {
            observations.insert("tinted_lens_confidence".to_string(), confidence);
        }
        if let Some(confidence) = face.head_covering_confidence {
            observations.insert("head_covering_confidence".to_string(), confidence);
        }

        let mut issues = Vec::new();
        for (category, issue_category) in [
            (RuleCategory::Expression, IssueCategory::Expression),
            (RuleCategory::Glasses, IssueCategory::Occlusion),
            (RuleCategory::HeadCovering, IssueCategory::Occlusion),
        ] {
            for result in evaluator.evaluate_category_in(category, &observations, jurisdiction) {
                if !result.passes {
                    issues.push(Self::rule_issue(issue_category, &result));
                }
            }
        }
        issues
    }

    pub fn rule_issue(category: IssueCategory, result: &RuleEvaluationResult) -> ComplianceIssue {
        let mut issue = ComplianceIssue::new(
            category,
            result.severity,
            format!("{} failed: {}", result.rule_id, result.suggestion),
            &result.suggestion,
        )
        .with_reference(&result.regulation_reference);
        issue.rule_id = Some(result.rule_id.clone());
        issue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FormatCatalog, RuleCatalog};
    use std::sync::Arc;

    fn spec() -> FormatSpec {
        FormatCatalog::builtin().unwrap().get("ICS-UAE").unwrap().clone()
    }

    fn face() -> FaceMetrics {
        FaceMetrics {
            face_height_ratio: 0.75,
            eye_height_ratio: 0.55,
            face_center_x: 0.5,
            face_center_y: 0.5,
            eye_distance: 100.0,
            face_angle: 0.0,
            eyes_open: true,
            mouth_closed: true,
            tinted_lens_confidence: None,
            head_covering_confidence: None,
        }
    }

    fn evaluator() -> RuleEvaluator {
        RuleEvaluator::new(Arc::new(RuleCatalog::builtin().unwrap()))
    }

    #[test]
    fn test_centered_face_scores_full() {
        let (result, issues) = PositionValidator::check(Some(&face()), &spec());

        assert!(result.passes);
        assert!(issues.is_empty());
        assert!((result.positioning_score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_band_edges_pass() {
        let mut edge = face();
        edge.face_height_ratio = 0.70;
        edge.eye_height_ratio = 0.60;
        let (result, _) = PositionValidator::check(Some(&edge), &spec());

        assert!(result.passes);
        assert!(result.positioning_score < 100.0);
    }

    #[test]
    fn test_small_face_is_critical() {
        let mut small = face();
        small.face_height_ratio = 0.5;
        let (result, issues) = PositionValidator::check(Some(&small), &spec());

        assert!(!result.passes);
        assert_eq!(issues[0].category, IssueCategory::FaceSize);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert!(!issues[0].auto_fixable);
    }

    #[test]
    fn test_tilt_and_offset() {
        let mut tilted = face();
        tilted.face_angle = -9.0;
        tilted.face_center_x = 0.6;
        let (result, issues) = PositionValidator::check(Some(&tilted), &spec());

        assert!(!result.passes);
        assert!(issues.iter().any(|i| i.category == IssueCategory::HeadPose));
        assert!(issues.iter().any(|i| i.category == IssueCategory::Centering));
    }

    #[test]
    fn test_missing_face() {
        let (result, issues) = PositionValidator::check(None, &spec());

        assert!(!result.face_found);
        assert_eq!(result.positioning_score, 0.0);
        assert_eq!(issues[0].category, IssueCategory::NoFace);
        assert_eq!(issues[0].severity, Severity::Critical);
    }

    #[test]
    fn test_band_component_shape() {
        assert!((PositionValidator::band_component(0.75, 0.7, 0.8) - 1.0).abs() < 1e-9);
        assert!((PositionValidator::band_component(0.7, 0.7, 0.8) - 0.7).abs() < 1e-9);
        assert_eq!(PositionValidator::band_component(0.9, 0.7, 0.8), 0.0);
    }

    #[test]
    fn test_closed_eyes_and_tinted_lenses() {
        let mut closed = face();
        closed.eyes_open = false;
        closed.mouth_closed = false;
        closed.tinted_lens_confidence = Some(0.2);

        let issues = PositionValidator::face_rule_issues(&closed, &evaluator(), None);
        let eyes = issues.iter().find(|i| i.rule_id.as_deref() == Some("ICAO.4.1.1")).unwrap();
        assert_eq!(eyes.severity, Severity::Critical);
        assert!(!eyes.auto_fixable);
        let mouth = issues.iter().find(|i| i.rule_id.as_deref() == Some("ICAO.4.1.2")).unwrap();
        assert_eq!(mouth.severity, Severity::Major);
        // 0.2 is under the base limit of 0.3 ...
        assert!(!issues.iter().any(|i| i.rule_id.as_deref() == Some("ICAO.3.2.1")));

        // ... but over the us_strict limit of 0.1.
        let strict = PositionValidator::face_rule_issues(&closed, &evaluator(), Some("us_strict"));
        assert!(strict.iter().any(|i| i.rule_id.as_deref() == Some("ICAO.3.2.1")));
    }
}
