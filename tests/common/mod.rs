#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};
use pasfoto::models::FaceMetrics;
use pasfoto::PhotoValidator;

pub const SKIN: [u8; 3] = [224, 172, 140];
pub const WHITE: [u8; 3] = [255, 255, 255];
pub const RED: [u8; 3] = [255, 0, 0];

/// Face geometry sitting in the middle of the ICS-UAE bands.
pub fn centered_metrics() -> FaceMetrics {
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

/// Plain background with a skin-toned face ellipse matching `metrics`, two dark eyes and
/// a little shading so the face is not perfectly flat.
pub fn portrait(width: u32, height: u32, background: [u8; 3], metrics: &FaceMetrics) -> DynamicImage {
    let face_height = metrics.face_height_ratio * height as f64;
    let face_width = face_height * 0.75;
    let cx = metrics.face_center_x * width as f64;
    let cy = metrics.face_center_y * height as f64;
    let eye_y = (1.0 - metrics.eye_height_ratio) * height as f64;
    let eye_dx = metrics.eye_distance / 2.0;
    let eye_radius = (face_width * 0.05).max(2.0);

    let img = RgbImage::from_fn(width, height, |x, y| {
        let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
        let nx = (px - cx) / (face_width / 2.0);
        let ny = (py - cy) / (face_height / 2.0);
        if nx * nx + ny * ny > 1.0 {
            return Rgb(background);
        }

        for eye_x in [cx - eye_dx, cx + eye_dx] {
            if (px - eye_x).powi(2) + (py - eye_y).powi(2) <= eye_radius * eye_radius {
                return Rgb([40, 30, 30]);
            }
        }

        let shade = ((x * 7 + y * 13) % 24) as u8;
        Rgb([SKIN[0] - shade, SKIN[1] - shade, SKIN[2] - shade])
    });
    DynamicImage::ImageRgb8(img)
}

/// Every pixel scaled by `factor` (darkening below one).
pub fn scaled(img: &DynamicImage, factor: f64) -> DynamicImage {
    let mut rgb = img.to_rgb8();
    for pixel in rgb.pixels_mut() {
        for channel in 0..3 {
            pixel.0[channel] = (pixel.0[channel] as f64 * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

pub fn validator() -> PhotoValidator {
    PhotoValidator::new().unwrap()
}
