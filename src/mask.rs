// mask.rs -- Soft-blend masks for the mouth region.
//
// The blender wants 1.0 where the pasted mouth should show and 0.0 where
// the original frame should. A hard-edged filled ellipse is enough: the
// mask pyramid smooths the edge per frequency band.

use crate::image::Image;
use crate::region::Rect;

/// Default shrink, in pixels per axis, between the pasted box and the ellipse.
pub const DEFAULT_BLEND_RANGE: i32 = 6;

/// Filled axis-aligned ellipse of 1.0 on a 0.0 background.
///
/// `center` and `axes` (semi-axes) are truncated to whole pixels first. A
/// pixel is inside when `(dx/a)^2 + (dy/b)^2 <= 1`. Non-positive axes draw
/// nothing. Parts outside the image are clipped.
pub fn ellipse_mask(width: usize, height: usize, center: (f64, f64), axes: (f64, f64)) -> Image<f32> {
    let mut mask = Image::new(width, height);
    let (cx, cy) = (center.0.trunc() as i64, center.1.trunc() as i64);
    let (a, b) = (axes.0.trunc() as i64, axes.1.trunc() as i64);
    if a <= 0 || b <= 0 {
        return mask;
    }

    let (a2, b2) = ((a * a) as f64, (b * b) as f64);
    let y0 = (cy - b).max(0);
    let y1 = (cy + b).min(height as i64 - 1);
    for y in y0..=y1 {
        let dy = (y - cy) as f64;
        let rest = 1.0 - dy * dy / b2;
        if rest < 0.0 {
            continue;
        }
        // Half-width of this scanline, from (dx/a)^2 <= rest.
        let half = (a2 * rest).sqrt().floor() as i64;
        let x0 = (cx - half).max(0);
        let x1 = (cx + half).min(width as i64 - 1);
        if x0 > x1 {
            continue;
        }
        let row = mask.row_mut(y as usize);
        for v in &mut row[x0 as usize..=x1 as usize] {
            *v = 1.0;
        }
    }
    mask
}

/// Ellipse inscribed in `region`, shrunk by `blend_range` pixels per axis.
pub fn mouth_mask(width: usize, height: usize, region: Rect, blend_range: i32) -> Image<f32> {
    let center = (
        region.x as f64 + 0.5 * region.width as f64,
        region.y as f64 + 0.5 * region.height as f64,
    );
    let axes = (
        0.5 * region.width as f64 - blend_range as f64,
        0.5 * region.height as f64 - blend_range as f64,
    );
    ellipse_mask(width, height, center, axes)
}
