use crate::models::BoundingBox;
use crate::utils::ComplianceError;
use image::{imageops, DynamicImage, GrayImage, RgbImage};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Buffer-level helpers shared by the analyzers and the enhancer. All pixel data is RGB.
pub struct ImageProcessor;

impl ImageProcessor {
    pub fn load_image(image_path: &Path) -> Result<DynamicImage, ComplianceError> {
        let img = image::open(image_path).map_err(|e| {
            ComplianceError::InvalidImage(format!("Failed to open {}: {}", image_path.display(), e))
        })?;
        Self::ensure_valid(&img)?;
        Ok(img)
    }

    pub fn save_image(img: &DynamicImage, image_path: &Path) -> Result<(), ComplianceError> {
        img.save(image_path).map_err(|e| {
            ComplianceError::IoError(format!("Failed to write {}: {}", image_path.display(), e))
        })
    }

    pub fn ensure_valid(img: &DynamicImage) -> Result<(), ComplianceError> {
        if img.width() == 0 || img.height() == 0 {
            return Err(ComplianceError::InvalidImage(format!(
                "Image has zero area ({}x{})",
                img.width(),
                img.height()
            )));
        }
        Ok(())
    }

    /// Crop to `region` when given, otherwise copy the whole frame.
    pub fn crop_region(img: &RgbImage, region: Option<BoundingBox>) -> RgbImage {
        match region {
            Some(r) if r.width > 0 && r.height > 0 => {
                imageops::crop_imm(img, r.x, r.y, r.width, r.height).to_image()
            }
            _ => img.clone(),
        }
    }

    pub fn luminance(img: &RgbImage) -> GrayImage {
        imageops::grayscale(img)
    }

    /// SHA-256 over the dimensions and RGB bytes, hex encoded.
    pub fn digest(img: &DynamicImage) -> String {
        let rgb = img.to_rgb8();
        let mut hasher = Sha256::new();
        hasher.update(rgb.width().to_le_bytes());
        hasher.update(rgb.height().to_le_bytes());
        hasher.update(rgb.as_raw());
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }

    /// Width of the margin strips sampled as background.
    pub fn edge_width(width: u32, height: u32) -> u32 {
        (width.min(height) / 10).clamp(1, 50)
    }

    /// Pixels in the four margin strips, minus anything inside `exclude`.
    pub fn background_pixels(img: &RgbImage, exclude: Option<BoundingBox>) -> Vec<[u8; 3]> {
        let (width, height) = img.dimensions();
        let edge = Self::edge_width(width, height);
        img.enumerate_pixels()
            .filter(|(x, y, _)| {
                let in_margin = *x < edge || *y < edge || *x >= width.saturating_sub(edge) || *y >= height.saturating_sub(edge);
                in_margin && !exclude.map_or(false, |bbox| bbox.contains(*x, *y))
            })
            .map(|(_, _, pixel)| pixel.0)
            .collect()
    }

    /// Per-channel median; black when `pixels` is empty.
    pub fn median_color(pixels: &[[u8; 3]]) -> [u8; 3] {
        if pixels.is_empty() {
            return [0, 0, 0];
        }
        let mut median = [0u8; 3];
        for (channel, slot) in median.iter_mut().enumerate() {
            let mut values: Vec<u8> = pixels.iter().map(|p| p[channel]).collect();
            values.sort_unstable();
            *slot = values[values.len() / 2];
        }
        median
    }

    pub fn color_distance(a: [u8; 3], b: [u8; 3]) -> f64 {
        let dr = a[0] as f64 - b[0] as f64;
        let dg = a[1] as f64 - b[1] as f64;
        let db = a[2] as f64 - b[2] as f64;
        (dr * dr + dg * dg + db * db).sqrt()
    }

    /// sRGB (D65) to CIE L*a*b*.
    pub fn rgb_to_lab(rgb: [u8; 3]) -> [f32; 3] {
        fn linear(c: u8) -> f32 {
            let c = c as f32 / 255.0;
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        fn f(t: f32) -> f32 {
            if t > 0.008856 {
                t.cbrt()
            } else {
                7.787 * t + 16.0 / 116.0
            }
        }

        let (r, g, b) = (linear(rgb[0]), linear(rgb[1]), linear(rgb[2]));
        let x = (0.4124 * r + 0.3576 * g + 0.1805 * b) / 0.95047;
        let y = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        let z = (0.0193 * r + 0.1192 * g + 0.9505 * b) / 1.08883;

        let (fx, fy, fz) = (f(x), f(y), f(z));
        [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
    }

    pub fn lab_to_rgb(lab: [f32; 3]) -> [u8; 3] {
        fn finv(t: f32) -> f32 {
            let cube = t * t * t;
            if cube > 0.008856 {
                cube
            } else {
                (t - 16.0 / 116.0) / 7.787
            }
        }
        fn gamma(c: f32) -> u8 {
            let c = if c <= 0.0031308 {
                12.92 * c
            } else {
                1.055 * c.powf(1.0 / 2.4) - 0.055
            };
            (c * 255.0).round().clamp(0.0, 255.0) as u8
        }

        let fy = (lab[0] + 16.0) / 116.0;
        let fx = fy + lab[1] / 500.0;
        let fz = fy - lab[2] / 200.0;
        let x = finv(fx) * 0.95047;
        let y = finv(fy);
        let z = finv(fz) * 1.08883;

        let r = 3.2406 * x - 1.5372 * y - 0.4986 * z;
        let g = -0.9689 * x + 1.8758 * y + 0.0415 * z;
        let b = 0.0557 * x - 0.2040 * y + 1.0570 * z;
        [gamma(r), gamma(g), gamma(b)]
    }

    /// Hue in degrees, saturation and value in 0-1.
    pub fn rgb_to_hsv(rgb: [u8; 3]) -> [f32; 3] {
        let r = rgb[0] as f32 / 255.0;
        let g = rgb[1] as f32 / 255.0;
        let b = rgb[2] as f32 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * (((g - b) / delta).rem_euclid(6.0))
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        let saturation = if max == 0.0 { 0.0 } else { delta / max };
        [hue, saturation, max]
    }

    pub fn hsv_to_rgb(hsv: [f32; 3]) -> [u8; 3] {
        let [h, s, v] = hsv;
        let c = v * s;
        let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
        let m = v - c;
        let (r, g, b) = match (h.rem_euclid(360.0) / 60.0) as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let to_u8 = |channel: f32| ((channel + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        [to_u8(r), to_u8(g), to_u8(b)]
    }

    /// ITU-R BT.601 full-range YCbCr.
    pub fn rgb_to_ycbcr(rgb: [u8; 3]) -> [f32; 3] {
        let (r, g, b) = (rgb[0] as f32, rgb[1] as f32, rgb[2] as f32);
        let y = 0.299 * r + 0.587 * g + 0.114 * b;
        let cb = 128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b;
        let cr = 128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b;
        [y, cb, cr]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_lab_round_trip_close() {
        for color in [[255u8, 255, 255], [200, 150, 120], [10, 80, 200]] {
            let back = ImageProcessor::lab_to_rgb(ImageProcessor::rgb_to_lab(color));
            for channel in 0..3 {
                assert!((back[channel] as i32 - color[channel] as i32).abs() <= 2);
            }
        }
        let white = ImageProcessor::rgb_to_lab([255, 255, 255]);
        assert!((white[0] - 100.0).abs() < 0.5);
    }

    #[test]
    fn test_hsv_primary_colors() {
        let red = ImageProcessor::rgb_to_hsv([255, 0, 0]);
        assert_eq!(red, [0.0, 1.0, 1.0]);
        assert_eq!(ImageProcessor::hsv_to_rgb([120.0, 1.0, 1.0]), [0, 255, 0]);
    }

    #[test]
    fn test_digest_depends_on_pixels() {
        let a = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])));
        let b = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([1, 2, 4])));

        assert_eq!(ImageProcessor::digest(&a), ImageProcessor::digest(&a.clone()));
        assert_ne!(ImageProcessor::digest(&a), ImageProcessor::digest(&b));
        assert_eq!(ImageProcessor::digest(&a).len(), 64);
    }

    #[test]
    fn test_zero_area_rejected() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        assert!(matches!(
            ImageProcessor::ensure_valid(&empty),
            Err(ComplianceError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_background_sampling_excludes_face() {
        let img = RgbImage::from_fn(100, 100, |x, _| if x < 50 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) });
        let all = ImageProcessor::background_pixels(&img, None);
        let without_left = ImageProcessor::background_pixels(
            &img,
            Some(BoundingBox { x: 0, y: 0, width: 50, height: 100 }),
        );

        assert_eq!(ImageProcessor::edge_width(100, 100), 10);
        assert_eq!(all.len(), 100 * 100 - 80 * 80);
        assert!(without_left.iter().all(|p| *p == [0, 0, 255]));
        assert_eq!(ImageProcessor::median_color(&without_left), [0, 0, 255]);
    }

    #[test]
    fn test_crop_region() {
        let img = RgbImage::from_pixel(20, 10, Rgb([9, 9, 9]));
        let cropped = ImageProcessor::crop_region(
            &img,
            Some(BoundingBox { x: 5, y: 2, width: 4, height: 3 }),
        );
        assert_eq!(cropped.dimensions(), (4, 3));
        assert_eq!(ImageProcessor::crop_region(&img, None).dimensions(), (20, 10));
    }
}
