use serde::Serialize;
use std::collections::BTreeMap;

/// Fixed weights for combining the five quality sub-scores. They sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityWeights {
    pub sharpness: f64,
    pub lighting: f64,
    pub color: f64,
    pub noise: f64,
    pub resolution: f64,
}

pub const QUALITY_WEIGHTS: QualityWeights = QualityWeights {
    sharpness: 0.30,
    lighting: 0.25,
    color: 0.15,
    noise: 0.15,
    resolution: 0.15,
};

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SharpnessDetail {
    pub laplacian_variance: f64,
    pub gradient_energy: f64,
    /// Share of signal energy left after removing the low-pass component.
    pub high_frequency_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LightingDetail {
    pub mean_luminance: f64,
    pub luminance_std_dev: f64,
    pub shadow_fraction: f64,
    pub highlight_fraction: f64,
    pub clipped_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ColorDetail {
    pub mean_rgb: [f64; 3],
    /// Angle in degrees between the mean colour and the neutral axis.
    pub white_balance_angle: f64,
    pub skin_tone_fraction: f64,
    pub is_grayscale: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NoiseDetail {
    pub noise_sigma: f64,
    pub snr_db: f64,
    pub sampled_pixels: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResolutionDetail {
    pub width: u32,
    pub height: u32,
    pub megapixels: f64,
    pub effective_dpi: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct QualityDetails {
    pub sharpness: SharpnessDetail,
    pub lighting: LightingDetail,
    pub color: ColorDetail,
    pub noise: NoiseDetail,
    pub resolution: ResolutionDetail,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct QualityMetrics {
    pub sharpness_score: f64,
    pub lighting_score: f64,
    pub color_score: f64,
    pub noise_score: f64,
    pub resolution_score: f64,
    pub overall_score: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub detailed_metrics: QualityDetails,
}

impl QualityMetrics {
    pub fn grade(&self) -> QualityGrade {
        QualityGrade::from_score(self.overall_score)
    }

    /// Raw measurements keyed by the metric names rules refer to.
    pub fn observations(&self) -> BTreeMap<String, f64> {
        let details = &self.detailed_metrics;
        let mut observations = BTreeMap::new();
        observations.insert("laplacian_variance".to_string(), details.sharpness.laplacian_variance);
        observations.insert("gradient_energy".to_string(), details.sharpness.gradient_energy);
        observations.insert("mean_luminance".to_string(), details.lighting.mean_luminance);
        observations.insert("luminance_std_dev".to_string(), details.lighting.luminance_std_dev);
        observations.insert("clipped_fraction".to_string(), details.lighting.clipped_fraction);
        observations.insert("noise_sigma".to_string(), details.noise.noise_sigma);
        if !details.color.is_grayscale {
            observations.insert("white_balance_angle".to_string(), details.color.white_balance_angle);
        }
        if let Some(dpi) = details.resolution.effective_dpi {
            observations.insert("dpi".to_string(), dpi);
        }
        observations
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            QualityGrade::Excellent
        } else if score >= 70.0 {
            QualityGrade::Good
        } else if score >= 50.0 {
            QualityGrade::Fair
        } else {
            QualityGrade::Poor
        }
    }
}

/// Aggregate over several assessments, e.g. a batch of frames of one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallQualityScore {
    pub score: f64,
    pub grade: QualityGrade,
    pub passes: bool,
    /// One minus the normalized spread of the individual scores.
    pub confidence: f64,
    pub sample_count: usize,
    pub issues: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        let w = QUALITY_WEIGHTS;
        let total = w.sharpness + w.lighting + w.color + w.noise + w.resolution;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(QualityGrade::from_score(85.0), QualityGrade::Excellent);
        assert_eq!(QualityGrade::from_score(84.9), QualityGrade::Good);
        assert_eq!(QualityGrade::from_score(70.0), QualityGrade::Good);
        assert_eq!(QualityGrade::from_score(50.0), QualityGrade::Fair);
        assert_eq!(QualityGrade::from_score(49.9), QualityGrade::Poor);
    }

    #[test]
    fn test_observations_skip_unknown_dpi() {
        let metrics = QualityMetrics::default();
        let observations = metrics.observations();
        assert!(observations.contains_key("laplacian_variance"));
        assert!(!observations.contains_key("dpi"));
    }
}
