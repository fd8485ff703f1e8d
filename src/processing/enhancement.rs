use crate::models::{BoundingBox, CorrectionOperation, MethodTier};
use crate::processing::histogram::Histogram;
use crate::processing::image::ImageProcessor;
use crate::utils::ComplianceError;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::filter::{gaussian_blur_f32, median_filter};

/// Sharpening kernel, weights sum to one.
const SHARPEN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

/// Bounded pixel operations used by the auto-fixer.
///
/// Every operation has a primary and a fallback method. `primary_available` is the
/// capability check the planner uses to pick one up front; both methods return an error
/// rather than panicking so the executor can degrade to a no-op.
pub struct ImageEnhancer;

impl ImageEnhancer {
    pub fn method_name(operation: &CorrectionOperation, tier: MethodTier) -> &'static str {
        use CorrectionOperation::*;
        match (operation, tier) {
            (_, MethodTier::Skipped) => "none",
            (Resize { .. }, MethodTier::Primary) => "lanczos3_resample",
            (Resize { .. }, MethodTier::Fallback) => "triangle_resample",
            (BackgroundRecolor { .. }, MethodTier::Primary) => "face_masked_recolor",
            (BackgroundRecolor { .. }, MethodTier::Fallback) => "margin_recolor",
            (BackgroundSmooth { .. }, MethodTier::Primary) => "face_masked_gaussian",
            (BackgroundSmooth { .. }, MethodTier::Fallback) => "gentle_global_blur",
            (WhiteBalance, MethodTier::Primary) => "gray_world",
            (WhiteBalance, MethodTier::Fallback) => "white_patch",
            (Brightness { .. }, MethodTier::Primary) => "lab_lightness",
            (Brightness { .. }, MethodTier::Fallback) => "hsv_value",
            (LocalContrast { .. }, MethodTier::Primary) => "clahe_lab_lightness",
            (LocalContrast { .. }, MethodTier::Fallback) => "global_contrast_stretch",
            (Denoise { .. }, MethodTier::Primary) => "median_filter",
            (Denoise { .. }, MethodTier::Fallback) => "gaussian_smoothing",
            (Sharpen { .. }, MethodTier::Primary) => "kernel_sharpen_blend",
            (Sharpen { .. }, MethodTier::Fallback) => "unsharp_mask_blend",
        }
    }

    pub fn primary_available(operation: &CorrectionOperation, img: &RgbImage, face: Option<BoundingBox>) -> bool {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return false;
        }
        match operation {
            CorrectionOperation::Resize { width, height } => *width > 0 && *height > 0,
            CorrectionOperation::BackgroundRecolor { .. } | CorrectionOperation::BackgroundSmooth { .. } => {
                face.map_or(false, |f| f.area() > 0 && f.area() < width as u64 * height as u64)
            }
            CorrectionOperation::WhiteBalance => {
                let mean = Self::channel_means(img);
                mean.iter().all(|m| *m >= 1.0)
            }
            CorrectionOperation::Brightness { .. } => true,
            CorrectionOperation::LocalContrast { tiles, .. } => {
                *tiles > 0 && width >= tiles * 8 && height >= tiles * 8
            }
            CorrectionOperation::Denoise { radius } => width > 2 * radius && height > 2 * radius,
            CorrectionOperation::Sharpen { .. } => width >= 3 && height >= 3,
        }
    }

    pub fn apply(
        operation: &CorrectionOperation,
        tier: MethodTier,
        img: &RgbImage,
        face: Option<BoundingBox>,
    ) -> Result<RgbImage, ComplianceError> {
        if img.width() == 0 || img.height() == 0 {
            return Err(ComplianceError::InvalidImage("Cannot enhance an empty image".to_string()));
        }
        match tier {
            MethodTier::Primary => Self::apply_primary(operation, img, face),
            MethodTier::Fallback => Self::apply_fallback(operation, img),
            MethodTier::Skipped => Ok(img.clone()),
        }
    }

    fn apply_primary(
        operation: &CorrectionOperation,
        img: &RgbImage,
        face: Option<BoundingBox>,
    ) -> Result<RgbImage, ComplianceError> {
        match operation {
            CorrectionOperation::Resize { width, height } => {
                Self::checked_resize(img, *width, *height, FilterType::Lanczos3)
            }
            CorrectionOperation::BackgroundRecolor { target, match_distance } => {
                let face = Self::require_face(face, operation)?;
                Ok(Self::recolor_background(img, *target, *match_distance, |x, y| {
                    !Self::inside_ellipse(face, x, y)
                }))
            }
            CorrectionOperation::BackgroundSmooth { sigma, face_padding } => {
                let face = Self::require_face(face, operation)?;
                let keep = face.padded(*face_padding, img.width(), img.height());
                let blurred = gaussian_blur_f32(img, sigma.max(0.1));
                Ok(RgbImage::from_fn(img.width(), img.height(), |x, y| {
                    if keep.contains(x, y) {
                        *img.get_pixel(x, y)
                    } else {
                        *blurred.get_pixel(x, y)
                    }
                }))
            }
            CorrectionOperation::WhiteBalance => Self::gray_world(img),
            CorrectionOperation::Brightness { factor } => Ok(Self::map_pixels(img, |p| {
                let [l, a, b] = ImageProcessor::rgb_to_lab(p);
                ImageProcessor::lab_to_rgb([(l * factor).clamp(0.0, 100.0), a, b])
            })),
            CorrectionOperation::LocalContrast { clip_limit, tiles } => Self::clahe(img, *clip_limit, *tiles),
            CorrectionOperation::Denoise { radius } => {
                if img.width() <= 2 * radius || img.height() <= 2 * radius {
                    return Err(ComplianceError::OperationFailure(format!(
                        "median radius {} too large for {}x{}",
                        radius,
                        img.width(),
                        img.height()
                    )));
                }
                Ok(median_filter(img, *radius, *radius))
            }
            CorrectionOperation::Sharpen { blend } => {
                let sharpened = imageops::filter3x3(img, &SHARPEN_KERNEL);
                Ok(Self::blend(img, &sharpened, *blend))
            }
        }
    }

    fn apply_fallback(operation: &CorrectionOperation, img: &RgbImage) -> Result<RgbImage, ComplianceError> {
        match operation {
            CorrectionOperation::Resize { width, height } => {
                Self::checked_resize(img, *width, *height, FilterType::Triangle)
            }
            CorrectionOperation::BackgroundRecolor { target, match_distance } => {
                let (width, height) = img.dimensions();
                let edge = ImageProcessor::edge_width(width, height);
                Ok(Self::recolor_background(img, *target, *match_distance, |x, y| {
                    x < edge || y < edge || x >= width.saturating_sub(edge) || y >= height.saturating_sub(edge)
                }))
            }
            CorrectionOperation::BackgroundSmooth { .. } => Ok(gaussian_blur_f32(img, 0.8)),
            CorrectionOperation::WhiteBalance => Self::white_patch(img),
            CorrectionOperation::Brightness { factor } => {
                // Two thirds of the requested change, applied to HSV value.
                let factor = 1.0 + (factor - 1.0) * (2.0 / 3.0);
                Ok(Self::map_pixels(img, |p| {
                    let [h, s, v] = ImageProcessor::rgb_to_hsv(p);
                    ImageProcessor::hsv_to_rgb([h, s, (v * factor).clamp(0.0, 1.0)])
                }))
            }
            CorrectionOperation::LocalContrast { .. } => Ok(imageops::contrast(img, 20.0)),
            CorrectionOperation::Denoise { .. } => Ok(gaussian_blur_f32(img, 0.7)),
            CorrectionOperation::Sharpen { blend } => {
                let sharpened = imageops::unsharpen(img, 1.0, 2);
                Ok(Self::blend(img, &sharpened, *blend))
            }
        }
    }

    fn require_face(face: Option<BoundingBox>, operation: &CorrectionOperation) -> Result<BoundingBox, ComplianceError> {
        face.ok_or_else(|| {
            ComplianceError::OperationFailure(format!("{} needs a face region", operation.name()))
        })
    }

    fn checked_resize(img: &RgbImage, width: u32, height: u32, filter: FilterType) -> Result<RgbImage, ComplianceError> {
        if width == 0 || height == 0 {
            return Err(ComplianceError::OperationFailure(format!(
                "cannot resize to {}x{}",
                width, height
            )));
        }
        Ok(imageops::resize(img, width, height, filter))
    }

    fn inside_ellipse(face: BoundingBox, x: u32, y: u32) -> bool {
        let rx = face.width as f64 / 2.0;
        let ry = face.height as f64 / 2.0;
        if rx <= 0.0 || ry <= 0.0 {
            return false;
        }
        let dx = (x as f64 + 0.5 - (face.x as f64 + rx)) / rx;
        let dy = (y as f64 + 0.5 - (face.y as f64 + ry)) / ry;
        dx * dx + dy * dy <= 1.0
    }

    /// Repaint pixels near the dominant margin colour, within the `eligible` area only.
    fn recolor_background<F>(img: &RgbImage, target: [u8; 3], match_distance: f64, eligible: F) -> RgbImage
    where
        F: Fn(u32, u32) -> bool,
    {
        let source = ImageProcessor::median_color(&ImageProcessor::background_pixels(img, None));
        let mut out = img.clone();
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            if eligible(x, y) && ImageProcessor::color_distance(pixel.0, source) <= match_distance {
                *pixel = Rgb(target);
            }
        }
        out
    }

    fn channel_means(img: &RgbImage) -> [f64; 3] {
        let count = (img.width() as f64 * img.height() as f64).max(1.0);
        let mut sums = [0.0f64; 3];
        for pixel in img.pixels() {
            for channel in 0..3 {
                sums[channel] += pixel.0[channel] as f64;
            }
        }
        sums.map(|s| s / count)
    }

    fn gray_world(img: &RgbImage) -> Result<RgbImage, ComplianceError> {
        let means = Self::channel_means(img);
        if means.iter().any(|m| *m < 1.0) {
            return Err(ComplianceError::OperationFailure(
                "gray world needs every channel present".to_string(),
            ));
        }
        let gray = (means[0] + means[1] + means[2]) / 3.0;
        let gains = means.map(|m| (gray / m).clamp(0.5, 2.0));
        Ok(Self::scale_channels(img, gains))
    }

    fn white_patch(img: &RgbImage) -> Result<RgbImage, ComplianceError> {
        let mut maxima = [0u8; 3];
        for pixel in img.pixels() {
            for channel in 0..3 {
                maxima[channel] = maxima[channel].max(pixel.0[channel]);
            }
        }
        if maxima.iter().any(|m| *m == 0) {
            return Err(ComplianceError::OperationFailure(
                "white patch needs a non-zero maximum per channel".to_string(),
            ));
        }
        let gains = maxima.map(|m| (255.0 / m as f64).clamp(1.0, 2.0));
        Ok(Self::scale_channels(img, gains))
    }

    fn scale_channels(img: &RgbImage, gains: [f64; 3]) -> RgbImage {
        let mut out = img.clone();
        for pixel in out.pixels_mut() {
            for channel in 0..3 {
                pixel.0[channel] = (pixel.0[channel] as f64 * gains[channel]).round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }

    fn map_pixels<F>(img: &RgbImage, f: F) -> RgbImage
    where
        F: Fn([u8; 3]) -> [u8; 3],
    {
        let mut out = img.clone();
        for pixel in out.pixels_mut() {
            pixel.0 = f(pixel.0);
        }
        out
    }

    /// `(1 - amount) * original + amount * processed`.
    fn blend(original: &RgbImage, processed: &RgbImage, amount: f32) -> RgbImage {
        let amount = amount.clamp(0.0, 1.0);
        let mut out = original.clone();
        for (pixel, other) in out.pixels_mut().zip(processed.pixels()) {
            for channel in 0..3 {
                let mixed = (1.0 - amount) * pixel.0[channel] as f32 + amount * other.0[channel] as f32;
                pixel.0[channel] = mixed.round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }

    /// Contrast-limited adaptive histogram equalisation of LAB lightness over a
    /// `tiles` x `tiles` grid, with bilinear blending between tile mappings.
    fn clahe(img: &RgbImage, clip_limit: f32, tiles: u32) -> Result<RgbImage, ComplianceError> {
        let (width, height) = img.dimensions();
        if tiles == 0 || width < tiles * 8 || height < tiles * 8 {
            return Err(ComplianceError::OperationFailure(format!(
                "{}x{} is too small for a {}x{} tile grid",
                width, height, tiles, tiles
            )));
        }

        let labs: Vec<[f32; 3]> = img.pixels().map(|p| ImageProcessor::rgb_to_lab(p.0)).collect();
        let lightness: Vec<u8> = labs
            .iter()
            .map(|lab| (lab[0] * 2.55).round().clamp(0.0, 255.0) as u8)
            .collect();

        let tile_width = (width + tiles - 1) / tiles;
        let tile_height = (height + tiles - 1) / tiles;
        let mut luts: Vec<[u8; 256]> = Vec::with_capacity((tiles * tiles) as usize);
        for ty in 0..tiles {
            for tx in 0..tiles {
                let x0 = tx * tile_width;
                let y0 = ty * tile_height;
                let x1 = (x0 + tile_width).min(width);
                let y1 = (y0 + tile_height).min(height);
                let values = (y0..y1).flat_map(|y| (x0..x1).map(move |x| (x, y)));
                let histogram =
                    Histogram::from_values(values.map(|(x, y)| lightness[(y * width + x) as usize]));
                luts.push(histogram.clipped_equalization(clip_limit));
            }
        }

        let grid = |position: u32, size: u32| -> (usize, usize, f32) {
            let f = (position as f32 + 0.5) / size as f32 - 0.5;
            let low = f.floor().clamp(0.0, (tiles - 1) as f32);
            let high = (low + 1.0).min((tiles - 1) as f32);
            let weight = (f - low).clamp(0.0, 1.0);
            (low as usize, high as usize, weight)
        };

        let mut out = RgbImage::new(width, height);
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let index = (y * width + x) as usize;
            let value = lightness[index] as usize;
            let (tx0, tx1, wx) = grid(x, tile_width);
            let (ty0, ty1, wy) = grid(y, tile_height);
            let at = |tx: usize, ty: usize| luts[ty * tiles as usize + tx][value] as f32;

            let top = at(tx0, ty0) * (1.0 - wx) + at(tx1, ty0) * wx;
            let bottom = at(tx0, ty1) * (1.0 - wx) + at(tx1, ty1) * wx;
            let mapped = top * (1.0 - wy) + bottom * wy;

            let lab = labs[index];
            *pixel = Rgb(ImageProcessor::lab_to_rgb([mapped / 2.55, lab[1], lab[2]]));
        }
        Ok(out)
    }
}
