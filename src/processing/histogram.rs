use image::GrayImage;

/// 256-bin luminance histogram.
#[derive(Debug, Clone)]
pub struct Histogram {
    bins: [u64; 256],
    total: u64,
}

impl Histogram {
    pub fn from_luma(img: &GrayImage) -> Self {
        Self::from_values(img.pixels().map(|p| p.0[0]))
    }

    pub fn from_values<I: IntoIterator<Item = u8>>(values: I) -> Self {
        let mut bins = [0u64; 256];
        for value in values {
            bins[value as usize] += 1;
        }
        let total = bins.iter().sum();
        Histogram { bins, total }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn mean(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let sum: u64 = self
            .bins
            .iter()
            .enumerate()
            .map(|(value, &count)| value as u64 * count)
            .sum();
        sum as f64 / self.total as f64
    }

    pub fn std_dev(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .bins
            .iter()
            .enumerate()
            .map(|(value, &count)| {
                let diff = value as f64 - mean;
                diff * diff * count as f64
            })
            .sum::<f64>()
            / self.total as f64;
        variance.sqrt()
    }

    /// Luminance below which `p` (0-1) of the pixels fall.
    pub fn percentile(&self, p: f64) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let target = (self.total as f64 * p.clamp(0.0, 1.0)).round() as u64;
        let mut cumulative = 0u64;
        for (value, &count) in self.bins.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return value as u8;
            }
        }
        255
    }

    /// Share of pixels at or below `threshold`.
    pub fn fraction_below(&self, threshold: u8) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.bins[..=threshold as usize].iter().sum::<u64>() as f64 / self.total as f64
    }

    /// Share of pixels at or above `threshold`.
    pub fn fraction_above(&self, threshold: u8) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.bins[threshold as usize..].iter().sum::<u64>() as f64 / self.total as f64
    }

    /// Contrast-limited equalisation lookup table.
    ///
    /// Counts above `clip_limit` times the mean bin height are cut and spread evenly over
    /// all bins before the cumulative distribution is taken.
    pub fn clipped_equalization(&self, clip_limit: f32) -> [u8; 256] {
        let mut lut = [0u8; 256];
        if self.total == 0 {
            for (value, slot) in lut.iter_mut().enumerate() {
                *slot = value as u8;
            }
            return lut;
        }

        let limit = ((clip_limit.max(1.0) as f64) * self.total as f64 / 256.0).max(1.0);
        let mut clipped = [0f64; 256];
        let mut excess = 0.0;
        for (slot, &count) in clipped.iter_mut().zip(self.bins.iter()) {
            let count = count as f64;
            if count > limit {
                excess += count - limit;
                *slot = limit;
            } else {
                *slot = count;
            }
        }
        let share = excess / 256.0;

        let mut cumulative = 0.0;
        for (value, slot) in lut.iter_mut().enumerate() {
            cumulative += clipped[value] + share;
            *slot = (cumulative / self.total as f64 * 255.0).round().clamp(0.0, 255.0) as u8;
        }
        lut
    }
}
