use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::gaussian_blur_f32;
use imageproc::integral_image::{integral_image, sum_image_pixels};

use crate::pipeline::Region;

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Inverted mean-based adaptive threshold.
///
/// A pixel becomes foreground (255) when it is at or below the mean of the
/// `(2 * block_radius + 1)` square around it minus `offset`, so dark strokes
/// on a lighter face turn white. The block is clipped at the image border and
/// its mean comes from an integral image.
pub fn adaptive_threshold_inv(img: &GrayImage, block_radius: u32, offset: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    let sums: Image<Luma<u64>> = integral_image::<_, u64>(img);

    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels() {
        let left = x.saturating_sub(block_radius);
        let top = y.saturating_sub(block_radius);
        let right = x.saturating_add(block_radius).min(width - 1);
        let bottom = y.saturating_add(block_radius).min(height - 1);

        let total = sum_image_pixels(&sums, left, top, right, bottom)[0];
        let count = (right - left + 1) as u64 * (bottom - top + 1) as u64;
        let mean = total as f32 / count as f32;
        if pixel[0] as f32 <= mean - offset {
            out.put_pixel(x, y, Luma([255]));
        }
    }
    out
}

/// Bounding rectangle of all non-zero pixels
pub fn content_bounds(img: &GrayImage) -> Option<Region> {
    let (width, height) = img.dimensions();
    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut has_content = false;

    for (x, y, pixel) in img.enumerate_pixels() {
        if pixel[0] > 0 {
            has_content = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    has_content.then(|| Region {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

/// Factor that brings the shorter side up to `min_size`, never below 1.0
pub fn min_size_scale(width: u32, height: u32, min_size: u32) -> f32 {
    let min_size = min_size as f32;
    (min_size / width as f32).max(min_size / height as f32).max(1.0)
}

/// Aspect-preserving cubic upscale so both sides reach `min_size`
pub fn upscale_to_min_size(img: &GrayImage, min_size: u32) -> GrayImage {
    let (width, height) = img.dimensions();
    let scale = min_size_scale(width, height, min_size);
    if scale <= 1.0 {
        return img.clone();
    }
    let new_w = ((width as f32 * scale).round() as u32).max(min_size);
    let new_h = ((height as f32 * scale).round() as u32).max(min_size);
    imageops::resize(img, new_w, new_h, FilterType::CatmullRom)
}

/// Center the image on a zero square whose side is its longer dimension
pub fn pad_to_square(img: &GrayImage) -> GrayImage {
    let (width, height) = img.dimensions();
    let side = width.max(height);
    if width == height {
        return img.clone();
    }
    let mut canvas = GrayImage::new(side, side);
    let offset_x = (side - width) / 2;
    let offset_y = (side - height) / 2;
    imageops::replace(&mut canvas, img, offset_x.into(), offset_y.into());
    canvas
}

/// Area-averaging resize: every output pixel is the coverage-weighted mean
/// of the source pixels under it.
pub fn resize_area(img: &GrayImage, new_width: u32, new_height: u32) -> GrayImage {
    let (width, height) = img.dimensions();
    if (width, height) == (new_width, new_height) {
        return img.clone();
    }

    let sx = width as f64 / new_width as f64;
    let sy = height as f64 / new_height as f64;
    let mut out = GrayImage::new(new_width, new_height);

    for oy in 0..new_height {
        let fy0 = oy as f64 * sy;
        let fy1 = fy0 + sy;
        let ys = fy0.floor() as u32;
        let ye = (fy1.ceil() as u32).min(height);

        for ox in 0..new_width {
            let fx0 = ox as f64 * sx;
            let fx1 = fx0 + sx;
            let xs = fx0.floor() as u32;
            let xe = (fx1.ceil() as u32).min(width);

            let mut sum = 0.0;
            let mut area = 0.0;
            for y in ys..ye {
                let wy = fy1.min(y as f64 + 1.0) - fy0.max(y as f64);
                if wy <= 0.0 {
                    continue;
                }
                for x in xs..xe {
                    let wx = fx1.min(x as f64 + 1.0) - fx0.max(x as f64);
                    if wx <= 0.0 {
                        continue;
                    }
                    sum += wx * wy * img.get_pixel(x, y)[0] as f64;
                    area += wx * wy;
                }
            }

            let value = if area > 0.0 { (sum / area).round().clamp(0.0, 255.0) } else { 0.0 };
            out.put_pixel(ox, oy, Luma([value as u8]));
        }
    }
    out
}
