use crate::utils::ComplianceError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_FORMATS: &str = include_str!("../../config/formats.json");

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Minimum quality engine score for the quality check to pass.
    pub min_overall_score: f64,
    /// Minimum inter-eye distance in pixels.
    pub min_eye_distance_px: f64,
}

/// A fully resolved photo format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatSpec {
    pub format_id: String,
    pub display_name: String,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
    /// Allowed relative deviation per axis, e.g. 0.02 for 2%.
    pub tolerance: f64,
    pub face_height_ratio: (f64, f64),
    pub eye_height_ratio: (f64, f64),
    /// Maximum face-centre offset from the image centre, as a fraction of the image diagonal.
    pub centering_tolerance: f64,
    /// Maximum roll in degrees.
    pub max_face_angle: f64,
    /// RGB
    pub background_color: [u8; 3],
    /// Maximum Euclidean RGB distance between sampled and required background colour.
    pub background_tolerance: f64,
    pub uniformity_threshold: f64,
    pub quality_thresholds: QualityThresholds,
    /// Jurisdiction whose rule overrides apply to this format.
    pub jurisdiction: Option<String>,
}

impl FormatSpec {
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// A catalog entry as written in configuration. Every field except the id may be
/// omitted when `inherits_from` names a parent that supplies it.
#[derive(Debug, Clone, Default, Deserialize)]
struct FormatDefinition {
    format_id: Option<String>,
    display_name: Option<String>,
    inherits_from: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    dpi: Option<u32>,
    tolerance: Option<f64>,
    face_height_ratio: Option<(f64, f64)>,
    eye_height_ratio: Option<(f64, f64)>,
    centering_tolerance: Option<f64>,
    max_face_angle: Option<f64>,
    background_color: Option<[u8; 3]>,
    background_tolerance: Option<f64>,
    uniformity_threshold: Option<f64>,
    quality_thresholds: Option<QualityThresholds>,
    jurisdiction: Option<String>,
}

impl FormatDefinition {
    /// Child fields win; anything the child leaves out comes from the parent.
    fn merged_over(&self, parent: &FormatDefinition) -> FormatDefinition {
        FormatDefinition {
            format_id: self.format_id.clone(),
            display_name: self.display_name.clone().or_else(|| parent.display_name.clone()),
            inherits_from: None,
            width: self.width.or(parent.width),
            height: self.height.or(parent.height),
            dpi: self.dpi.or(parent.dpi),
            tolerance: self.tolerance.or(parent.tolerance),
            face_height_ratio: self.face_height_ratio.or(parent.face_height_ratio),
            eye_height_ratio: self.eye_height_ratio.or(parent.eye_height_ratio),
            centering_tolerance: self.centering_tolerance.or(parent.centering_tolerance),
            max_face_angle: self.max_face_angle.or(parent.max_face_angle),
            background_color: self.background_color.or(parent.background_color),
            background_tolerance: self.background_tolerance.or(parent.background_tolerance),
            uniformity_threshold: self.uniformity_threshold.or(parent.uniformity_threshold),
            quality_thresholds: self.quality_thresholds.or(parent.quality_thresholds),
            jurisdiction: self.jurisdiction.clone().or_else(|| parent.jurisdiction.clone()),
        }
    }

    fn resolve(self) -> Result<FormatSpec, String> {
        let format_id = self.format_id.ok_or("missing format_id")?;
        let width = self.width.ok_or("missing width")?;
        let height = self.height.ok_or("missing height")?;
        if width == 0 || height == 0 {
            return Err(format!("{} has zero dimensions", format_id));
        }

        let face_height_ratio = self.face_height_ratio.unwrap_or((0.70, 0.80));
        let eye_height_ratio = self.eye_height_ratio.unwrap_or((0.50, 0.60));
        for (name, (lower, upper)) in [("face_height_ratio", face_height_ratio), ("eye_height_ratio", eye_height_ratio)] {
            if !(lower.is_finite() && upper.is_finite() && lower <= upper) {
                return Err(format!("{} has an invalid {} band", format_id, name));
            }
        }

        Ok(FormatSpec {
            display_name: self.display_name.unwrap_or_else(|| format_id.clone()),
            width,
            height,
            dpi: self.dpi.unwrap_or(300),
            tolerance: self.tolerance.unwrap_or(0.02).abs(),
            face_height_ratio,
            eye_height_ratio,
            centering_tolerance: self.centering_tolerance.unwrap_or(0.05),
            max_face_angle: self.max_face_angle.unwrap_or(5.0),
            background_color: self.background_color.unwrap_or([255, 255, 255]),
            background_tolerance: self.background_tolerance.unwrap_or(30.0),
            uniformity_threshold: self.uniformity_threshold.unwrap_or(0.8),
            quality_thresholds: self.quality_thresholds.unwrap_or(QualityThresholds {
                min_overall_score: 50.0,
                min_eye_distance_px: 0.0,
            }),
            jurisdiction: self.jurisdiction,
            format_id,
        })
    }
}

#[derive(Deserialize)]
struct FormatDocument {
    #[serde(default)]
    version: String,
    formats: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatMatchResult {
    pub matched: bool,
    pub format_id: String,
    pub confidence: f64,
    pub matched_criteria: Vec<String>,
    pub validation_errors: Vec<String>,
}

/// Known photo formats in declaration order.
#[derive(Debug, Clone)]
pub struct FormatCatalog {
    version: String,
    formats: Vec<FormatSpec>,
}

impl FormatCatalog {
    pub fn builtin() -> Result<Self, ComplianceError> {
        Self::from_json_str(DEFAULT_FORMATS)
    }

    pub fn load_file(path: &Path) -> Result<Self, ComplianceError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ComplianceError::IoError(format!("Failed to read formats {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ComplianceError> {
        let document: FormatDocument = serde_json::from_str(text)
            .map_err(|e| ComplianceError::ConfigError(format!("Malformed format catalog: {}", e)))?;

        let total_entries = document.formats.len();

        // Parse every entry first so children may reference parents declared later.
        let mut definitions: Vec<FormatDefinition> = Vec::with_capacity(total_entries);
        for (index, entry) in document.formats.into_iter().enumerate() {
            match serde_json::from_value::<FormatDefinition>(entry) {
                Ok(definition) if definition.format_id.is_some() => definitions.push(definition),
                Ok(_) => warn!("Skipping format entry {}: missing format_id", index),
                Err(e) => warn!("Skipping format entry {}: {}", index, e),
            }
        }

        let mut formats: Vec<FormatSpec> = Vec::with_capacity(definitions.len());
        for definition in &definitions {
            let id = definition.format_id.clone().unwrap_or_default();
            if formats.iter().any(|f| f.format_id == id) {
                warn!("Skipping duplicate format {}", id);
                continue;
            }

            match Self::resolve_definition(definition, &definitions) {
                Ok(spec) => formats.push(spec),
                Err(e) => warn!("Skipping format {}: {}", id, e),
            }
        }

        if formats.is_empty() {
            return Err(ComplianceError::ConfigError(format!(
                "No usable formats among {} entries",
                total_entries
            )));
        }

        info!("Loaded {} photo formats", formats.len());

        Ok(FormatCatalog {
            version: document.version,
            formats,
        })
    }

    fn resolve_definition(
        definition: &FormatDefinition,
        all: &[FormatDefinition],
    ) -> Result<FormatSpec, String> {
        let merged = match &definition.inherits_from {
            None => definition.clone(),
            Some(parent_id) => {
                let parent = all
                    .iter()
                    .find(|d| d.format_id.as_deref() == Some(parent_id.as_str()))
                    .ok_or_else(|| format!("unknown parent format {}", parent_id))?;
                if parent.inherits_from.is_some() {
                    return Err(format!(
                        "parent {} itself inherits; only one level of inheritance is supported",
                        parent_id
                    ));
                }
                definition.merged_over(parent)
            }
        };
        merged.resolve()
    }

    pub fn get(&self, format_id: &str) -> Result<&FormatSpec, ComplianceError> {
        self.formats
            .iter()
            .find(|f| f.format_id == format_id)
            .ok_or_else(|| ComplianceError::UnknownFormat(format!("No format found with id: {}", format_id)))
    }

    pub fn formats(&self) -> &[FormatSpec] {
        &self.formats
    }

    pub fn format_ids(&self) -> Vec<&str> {
        self.formats.iter().map(|f| f.format_id.as_str()).collect()
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_formats_in_declaration_order() {
        let catalog = FormatCatalog::builtin().unwrap();
        let ids = catalog.format_ids();

        assert_eq!(ids[0], "ICS-UAE");
        assert!(ids.contains(&"US-Visa"));
        assert!(ids.contains(&"Schengen-Visa"));

        let uae = catalog.get("ICS-UAE").unwrap();
        assert_eq!((uae.width, uae.height), (413, 531));
        assert_eq!(uae.face_height_ratio, (0.70, 0.80));
        assert_eq!(uae.eye_height_ratio, (0.50, 0.60));
    }

    #[test]
    fn test_child_overrides_only_specified_fields() {
        let catalog = FormatCatalog::builtin().unwrap();
        let parent = catalog.get("ICS-UAE").unwrap();
        let child = catalog.get("Schengen-Visa").unwrap();

        assert_eq!(child.background_color, [240, 240, 240]);
        assert_eq!(child.width, parent.width);
        assert_eq!(child.face_height_ratio, parent.face_height_ratio);
        assert_eq!(child.jurisdiction.as_deref(), Some("standard_icao"));
    }

    #[test]
    fn test_two_level_inheritance_rejected() {
        let text = r#"{"formats": [
            {"format_id": "A", "width": 100, "height": 100},
            {"format_id": "B", "inherits_from": "A"},
            {"format_id": "C", "inherits_from": "B"}
        ]}"#;

        let catalog = FormatCatalog::from_json_str(text).unwrap();
        assert_eq!(catalog.format_ids(), vec!["A", "B"]);
    }

    #[test]
    fn test_bad_entries_skipped() {
        let text = r#"{"formats": [
            {"display_name": "no id", "width": 10, "height": 10},
            {"format_id": "Z", "width": 0, "height": 10},
            {"format_id": "OK", "width": 10, "height": 20},
            {"format_id": "OK", "width": 99, "height": 99}
        ]}"#;

        let catalog = FormatCatalog::from_json_str(text).unwrap();
        assert_eq!(catalog.format_ids(), vec!["OK"]);
        assert_eq!(catalog.get("OK").unwrap().width, 10);
    }

    #[test]
    fn test_empty_or_malformed_catalog() {
        assert!(matches!(
            FormatCatalog::from_json_str("{not json"),
            Err(ComplianceError::ConfigError(_))
        ));
        assert!(matches!(
            FormatCatalog::from_json_str(r#"{"formats": []}"#),
            Err(ComplianceError::ConfigError(_))
        ));
    }

    #[test]
    fn test_unknown_format() {
        let catalog = FormatCatalog::builtin().unwrap();
        assert!(matches!(catalog.get("Mars-Visa"), Err(ComplianceError::UnknownFormat(_))));
    }
}
