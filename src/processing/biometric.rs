use crate::models::{FaceDetection, FaceMetrics};
use image::DynamicImage;

/// Pluggable face/landmark detection backend.
///
/// Implementations must not panic or fail on empty input; they report
/// `face_found = false` instead.
pub trait FaceDetector: Send + Sync {
    fn detect_face(&self, img: &DynamicImage) -> FaceDetection;
}

pub struct BiometricProcessor;

impl BiometricProcessor {
    /// Build a detection record from already-known face metrics: bounding box from the
    /// face region, landmarks for both eye centres.
    pub fn detection_from_metrics(width: u32, height: u32, metrics: &FaceMetrics) -> FaceDetection {
        let bounding_box = match metrics.face_region(width, height) {
            Some(bbox) => bbox,
            None => return FaceDetection::not_found(),
        };

        // Eye line measured from the bottom of the frame.
        let eye_y = (1.0 - metrics.eye_height_ratio) * height as f64;
        let center_x = metrics.face_center_x * width as f64;
        let half_span = metrics.eye_distance / 2.0;
        let landmarks = vec![(center_x - half_span, eye_y), (center_x + half_span, eye_y)];

        FaceDetection {
            face_found: true,
            bounding_box: Some(bounding_box),
            landmarks,
            face_metrics: Some(metrics.clone()),
            confidence: 1.0,
            face_count: 1,
        }
    }
}

/// Detector that reports fixed, externally measured metrics for every image.
#[derive(Debug, Clone)]
pub struct StaticFaceDetector {
    metrics: Option<FaceMetrics>,
}

impl StaticFaceDetector {
    pub fn new(metrics: FaceMetrics) -> Self {
        StaticFaceDetector { metrics: Some(metrics) }
    }

    /// A detector that never finds a face.
    pub fn empty() -> Self {
        StaticFaceDetector { metrics: None }
    }
}

impl FaceDetector for StaticFaceDetector {
    fn detect_face(&self, img: &DynamicImage) -> FaceDetection {
        match &self.metrics {
            Some(metrics) if img.width() > 0 && img.height() > 0 => {
                BiometricProcessor::detection_from_metrics(img.width(), img.height(), metrics)
            }
            _ => FaceDetection::not_found(),
        }
    }
}
