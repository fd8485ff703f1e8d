use crate::config::Settings;
use crate::correction::AutoFixer;
use crate::models::*;
use crate::processing::{FaceDetector, ImageProcessor};
use crate::utils::{ComplianceError, Snapshot};
use crate::validation::{ComplianceValidator, FormatDetector};
use image::DynamicImage;
use log::info;
use std::path::Path;
use std::sync::Arc;

/// Entry point tying the catalogs, validator and auto-fixer together.
///
/// Both catalogs live in reloadable snapshots: a validation in flight keeps the catalog
/// version it started with, and a reload swaps in a complete new version or nothing.
pub struct PhotoValidator {
    rules: Snapshot<RuleCatalog>,
    formats: Snapshot<FormatCatalog>,
    settings: Settings,
}

impl PhotoValidator {
    /// Built-in catalogs and default settings.
    pub fn new() -> Result<Self, ComplianceError> {
        Self::from_settings(Settings::default())
    }

    pub fn from_settings(settings: Settings) -> Result<Self, ComplianceError> {
        settings.validate()?;
        let rules = Self::read_rules(&settings, None)?;
        let formats = Self::read_formats(&settings, None)?;
        let validator = Self::with_catalogs(rules, formats, settings);
        // Surface a bad jurisdiction at construction rather than on first use.
        validator.validator()?;
        Ok(validator)
    }

    pub fn with_catalogs(rules: RuleCatalog, formats: FormatCatalog, settings: Settings) -> Self {
        PhotoValidator {
            rules: Snapshot::new(rules),
            formats: Snapshot::new(formats),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn rule_catalog(&self) -> Arc<RuleCatalog> {
        self.rules.load()
    }

    pub fn format_catalog(&self) -> Arc<FormatCatalog> {
        self.formats.load()
    }

    /// A validator bound to the catalog versions current right now.
    pub fn validator(&self) -> Result<ComplianceValidator, ComplianceError> {
        let validator = ComplianceValidator::new(self.rules.load(), self.formats.load())
            .with_pass_threshold(self.settings.pass_threshold);
        match &self.settings.jurisdiction {
            Some(jurisdiction) => validator.with_jurisdiction(jurisdiction),
            None => Ok(validator),
        }
    }

    pub fn validate(
        &self,
        img: &DynamicImage,
        format_id: &str,
        face_metrics: Option<&FaceMetrics>,
    ) -> Result<ComplianceResult, ComplianceError> {
        self.validator()?.validate(img, format_id, face_metrics)
    }

    /// Validate with measurements from a detector backend.
    pub fn validate_detection(
        &self,
        img: &DynamicImage,
        format_id: &str,
        detector: &dyn FaceDetector,
    ) -> Result<ComplianceResult, ComplianceError> {
        let detection = detector.detect_face(img);
        self.validator()?.validate_detection(img, format_id, &detection)
    }

    /// Load an image and validate it, detecting the format from its size when
    /// `format_id` is not given.
    pub fn validate_file(
        &self,
        image_path: &Path,
        format_id: Option<&str>,
        face_metrics: Option<&FaceMetrics>,
    ) -> Result<(DynamicImage, ComplianceResult), ComplianceError> {
        let img = ImageProcessor::load_image(image_path)?;
        let format_id = match format_id {
            Some(format_id) => format_id.to_string(),
            None => self.resolve_format(img.width(), img.height())?,
        };
        let result = self.validate(&img, &format_id, face_metrics)?;
        Ok((img, result))
    }

    pub fn auto_fix(&self, img: &DynamicImage, result: &ComplianceResult) -> Result<AutoFixResult, ComplianceError> {
        AutoFixer::auto_fix(&self.validator()?, img, result)
    }

    pub fn detect_format(&self, width: u32, height: u32) -> Option<FormatMatchResult> {
        FormatDetector::new(self.formats.load()).detect_format(width, height)
    }

    pub fn format_scores(&self, width: u32, height: u32) -> Vec<FormatMatchResult> {
        FormatDetector::new(self.formats.load()).get_all_format_scores(width, height)
    }

    pub fn suggest_improvements(&self, width: u32, height: u32, format_id: &str) -> Result<Vec<String>, ComplianceError> {
        FormatDetector::new(self.formats.load()).suggest_improvements(width, height, format_id)
    }

    /// Detected format, else the configured default.
    pub fn resolve_format(&self, width: u32, height: u32) -> Result<String, ComplianceError> {
        if let Some(matched) = self.detect_format(width, height) {
            return Ok(matched.format_id);
        }
        self.settings.default_format.clone().ok_or_else(|| {
            ComplianceError::UnknownFormat(format!("No format matches {}x{} and no default is set", width, height))
        })
    }

    /// Replace the rule catalog from `path`, the configured path, or the built-in document.
    pub fn reload_rules(&self, path: Option<&Path>) -> Result<CatalogVersionInfo, ComplianceError> {
        let catalog = Self::read_rules(&self.settings, path)?;
        self.check_jurisdiction(&catalog)?;
        let info = catalog.version_info();
        self.rules.replace(catalog);
        info!("Reloaded rule catalog {} ({} rules)", info.version, info.total_rules);
        Ok(info)
    }

    pub fn reload_formats(&self, path: Option<&Path>) -> Result<usize, ComplianceError> {
        let catalog = Self::read_formats(&self.settings, path)?;
        let count = catalog.formats().len();
        self.formats.replace(catalog);
        info!("Reloaded format catalog ({} formats)", count);
        Ok(count)
    }

    /// Reload both catalogs. Nothing is swapped unless both parse.
    pub fn reload_configuration(&self) -> Result<(), ComplianceError> {
        let rules = Self::read_rules(&self.settings, None)?;
        let formats = Self::read_formats(&self.settings, None)?;
        self.check_jurisdiction(&rules)?;
        self.rules.replace(rules);
        self.formats.replace(formats);
        info!("Reloaded rule and format catalogs");
        Ok(())
    }

    /// The configured jurisdiction must survive a rule reload.
    fn check_jurisdiction(&self, catalog: &RuleCatalog) -> Result<(), ComplianceError> {
        match &self.settings.jurisdiction {
            Some(jurisdiction) if !catalog.has_jurisdiction(jurisdiction) => {
                let info = catalog.version_info();
                Err(ComplianceError::UnknownJurisdiction(format!(
                    "'{}' is not declared by rule catalog {} (known: {})",
                    jurisdiction,
                    info.version,
                    info.jurisdictions.join(", ")
                )))
            }
            _ => Ok(()),
        }
    }

    fn read_rules(settings: &Settings, path: Option<&Path>) -> Result<RuleCatalog, ComplianceError> {
        match path.or(settings.rules_path.as_deref()) {
            Some(path) => RuleCatalog::load_file(path),
            None => RuleCatalog::builtin(),
        }
    }

    fn read_formats(settings: &Settings, path: Option<&Path>) -> Result<FormatCatalog, ComplianceError> {
        match path.or(settings.formats_path.as_deref()) {
            Some(path) => FormatCatalog::load_file(path),
            None => FormatCatalog::builtin(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::StaticFaceDetector;
    use image::{Rgb, RgbImage};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_unknown_jurisdiction_rejected() {
        let settings = Settings {
            jurisdiction: Some("atlantis".to_string()),
            ..Settings::default()
        };
        assert!(matches!(
            PhotoValidator::from_settings(settings),
            Err(ComplianceError::UnknownJurisdiction(_))
        ));
    }

    #[test]
    fn test_reload_keeps_old_snapshot() {
        let validator = PhotoValidator::new().unwrap();
        let before = validator.rule_catalog();

        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version": "test", "rules": [{{
                "rule_id": "ICAO.5.1.1", "name": "sharpness", "metric": "laplacian_variance",
                "category": "quality", "severity": "major", "regulation": "test",
                "description": "", "threshold": {{"kind": "minimum", "value": 1}}
            }}]}}"#
        )
        .unwrap();

        let info = validator.reload_rules(Some(file.path())).unwrap();
        assert_eq!(info.version, "test");
        assert_eq!(info.total_rules, 1);
        assert_eq!(validator.rule_catalog().all_rules().len(), 1);
        assert!(before.all_rules().len() > 1);
    }

    #[test]
    fn test_failed_reload_changes_nothing() {
        let validator = PhotoValidator::new().unwrap();
        let count = validator.rule_catalog().all_rules().len();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(validator.reload_rules(Some(file.path())).is_err());
        assert_eq!(validator.rule_catalog().all_rules().len(), count);
    }

    #[test]
    fn test_reload_must_keep_configured_jurisdiction() {
        let validator = PhotoValidator::from_settings(Settings {
            jurisdiction: Some("us_strict".to_string()),
            ..Settings::default()
        })
        .unwrap();
        let before = validator.rule_catalog();

        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version": "bare", "rules": [{{
                "rule_id": "ICAO.5.1.1", "name": "sharpness", "metric": "laplacian_variance",
                "category": "quality", "severity": "major", "regulation": "test",
                "description": "", "threshold": {{"kind": "minimum", "value": 1}}
            }}]}}"#
        )
        .unwrap();

        assert!(matches!(
            validator.reload_rules(Some(file.path())),
            Err(ComplianceError::UnknownJurisdiction(_))
        ));
        assert!(Arc::ptr_eq(&before, &validator.rule_catalog()));

        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(413, 531, Rgb([255, 255, 255])));
        assert!(validator.validate(&img, "ICS-UAE", None).is_ok());
    }

    #[test]
    fn test_resolve_format() {
        let validator = PhotoValidator::new().unwrap();
        assert_eq!(validator.resolve_format(413, 531).unwrap(), "ICS-UAE");
        assert!(validator.resolve_format(1000, 100).is_err());

        let fallback = PhotoValidator::from_settings(Settings {
            default_format: Some("US-Visa".to_string()),
            ..Settings::default()
        })
        .unwrap();
        assert_eq!(fallback.resolve_format(1000, 100).unwrap(), "US-Visa");
    }

    #[test]
    fn test_detector_backend() {
        let validator = PhotoValidator::new().unwrap();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(413, 531, Rgb([255, 255, 255])));

        let result = validator
            .validate_detection(&img, "ICS-UAE", &StaticFaceDetector::empty())
            .unwrap();
        assert!(result.has_category(IssueCategory::NoFace));
        assert!(!result.overall_pass);
    }
}
