// Privacy redaction: irreversibly blur sensitive regions before any hazard
// analysis sees the image.
//
// Regions are applied sequentially in supplied order; an overlapping region
// re-blurs the already-blurred pixels of earlier ones. Out-of-bounds regions
// are clamped, never an error.

use crate::core::types::SensitiveRegion;
use image::RgbImage;
use tracing::debug;

/// Blur each region of `image` in place and return the redacted buffer.
///
/// The blur must destroy identity, not just soften it; `sigma` comes from
/// config and defaults to 30.
pub fn redact(mut image: RgbImage, regions: &[SensitiveRegion], sigma: f32) -> RgbImage {
    for region in regions {
        let Some((x, y, width, height)) = clamp_region(region, image.width(), image.height())
        else {
            continue;
        };

        let sub = image::imageops::crop_imm(&image, x, y, width, height).to_image();
        let blurred = image::imageops::blur(&sub, sigma);
        image::imageops::replace(&mut image, &blurred, i64::from(x), i64::from(y));
    }

    if !regions.is_empty() {
        debug!("Redacted {} sensitive regions", regions.len());
    }
    image
}

/// Clip a region to the image bounds. Returns `None` when nothing of the
/// region lies inside the image.
fn clamp_region(
    region: &SensitiveRegion,
    image_width: u32,
    image_height: u32,
) -> Option<(u32, u32, u32, u32)> {
    if region.x >= image_width || region.y >= image_height {
        return None;
    }
    let width = region.width.min(image_width - region.x);
    let height = region.height.min(image_height - region.y);
    if width == 0 || height == 0 {
        return None;
    }
    Some((region.x, region.y, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Identity-risk bound on per-channel pixel variance after blurring.
    const VARIANCE_THRESHOLD: f64 = 100.0;

    /// High-contrast checkerboard; unblurred variance is ~16000.
    fn checkerboard(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    fn region_variance(image: &RgbImage, region: &SensitiveRegion) -> f64 {
        let mut values = Vec::new();
        for y in region.y..(region.y + region.height).min(image.height()) {
            for x in region.x..(region.x + region.width).min(image.width()) {
                values.push(f64::from(image.get_pixel(x, y)[0]));
            }
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
    }

    #[test]
    fn test_blur_destroys_region_detail() {
        let image = checkerboard(64, 64);
        let region = SensitiveRegion {
            x: 0,
            y: 0,
            width: 64,
            height: 64,
        };
        assert!(region_variance(&image, &region) > 10_000.0);

        let redacted = redact(image, &[region], 30.0);
        assert!(region_variance(&redacted, &region) < VARIANCE_THRESHOLD);
    }

    #[test]
    fn test_reblur_stays_below_threshold() {
        // Blurring is lossy, not idempotent; only the identity-risk bound is
        // guaranteed to hold across repeated passes.
        let region = SensitiveRegion {
            x: 8,
            y: 8,
            width: 32,
            height: 32,
        };
        let once = redact(checkerboard(64, 64), &[region], 30.0);
        let twice = redact(once, &[region], 30.0);
        assert!(region_variance(&twice, &region) < VARIANCE_THRESHOLD);
    }

    #[test]
    fn test_no_regions_returns_image_unchanged() {
        let image = checkerboard(16, 16);
        let copy = image.clone();
        let redacted = redact(image, &[], 30.0);
        assert_eq!(redacted.as_raw(), copy.as_raw());
    }

    #[test]
    fn test_out_of_bounds_region_is_clamped() {
        let image = checkerboard(32, 32);
        let region = SensitiveRegion {
            x: 16,
            y: 16,
            width: 100,
            height: 100,
        };
        let redacted = redact(image, &[region], 30.0);
        let clamped = SensitiveRegion {
            x: 16,
            y: 16,
            width: 16,
            height: 16,
        };
        assert!(region_variance(&redacted, &clamped) < VARIANCE_THRESHOLD);
    }

    #[test]
    fn test_fully_outside_region_is_skipped() {
        let image = checkerboard(16, 16);
        let copy = image.clone();
        let region = SensitiveRegion {
            x: 100,
            y: 100,
            width: 10,
            height: 10,
        };
        let redacted = redact(image, &[region], 30.0);
        assert_eq!(redacted.as_raw(), copy.as_raw());
    }

    #[test]
    fn test_overlapping_regions_apply_sequentially() {
        let first = SensitiveRegion {
            x: 0,
            y: 0,
            width: 40,
            height: 64,
        };
        let second = SensitiveRegion {
            x: 24,
            y: 0,
            width: 40,
            height: 64,
        };
        let redacted = redact(checkerboard(64, 64), &[first, second], 30.0);
        assert!(region_variance(&redacted, &first) < VARIANCE_THRESHOLD);
        assert!(region_variance(&redacted, &second) < VARIANCE_THRESHOLD);
    }
}
