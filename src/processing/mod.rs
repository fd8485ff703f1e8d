pub mod biometric;
pub mod color;
pub mod enhancement;
pub mod histogram;
pub mod image;
pub mod lighting;
pub mod noise;
pub mod quality;
pub mod resolution;
pub mod sharpness;

pub use biometric::{BiometricProcessor, FaceDetector, StaticFaceDetector};
pub use enhancement::ImageEnhancer;
pub use histogram::Histogram;
pub use self::image::ImageProcessor;
pub use quality::{QualityContext, QualityEngine};
