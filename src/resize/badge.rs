//! Play badge compositing for still-frame extraction.
//!
//! When an animation is reduced to its first frame, a centered badge (dark
//! disc, white play triangle) tells the viewer there was motion here.

use image::RgbaImage;

/// Disc radius as a fraction of the frame's short side.
const DISC_SCALE: f32 = 0.2;
/// Smallest and largest disc radius in pixels.
const DISC_MIN: f32 = 4.0;
const DISC_MAX: f32 = 48.0;
/// How much of the underlying pixel survives under the disc.
const DISC_SHADE: f32 = 0.35;

/// Composite a play badge over the center of `frame`. Frames too small to
/// show a legible badge are left alone.
pub fn composite_play_badge(frame: &mut RgbaImage) {
    let (w, h) = frame.dimensions();
    if w < 12 || h < 12 {
        return;
    }

    let cx = w as f32 / 2.0;
    let cy = h as f32 / 2.0;
    let radius = (w.min(h) as f32 * DISC_SCALE).clamp(DISC_MIN, DISC_MAX);

    // Triangle pointing right: flat edge at x0, apex at x1
    let x0 = cx - radius * 0.45;
    let x1 = cx + radius * 0.65;
    let half_height = radius * 0.55;

    let min_x = (cx - radius).floor().max(0.0) as u32;
    let max_x = ((cx + radius).ceil() as u32).min(w);
    let min_y = (cy - radius).floor().max(0.0) as u32;
    let max_y = ((cy + radius).ceil() as u32).min(h);

    for y in min_y..max_y {
        for x in min_x..max_x {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;
            let dx = px - cx;
            let dy = py - cy;
            if dx * dx + dy * dy > radius * radius {
                continue;
            }

            let pixel = frame.get_pixel_mut(x, y);
            if inside_triangle(px, py, x0, x1, cy, half_height) {
                pixel.0 = [255, 255, 255, 255];
            } else {
                for c in 0..3 {
                    pixel.0[c] = (pixel.0[c] as f32 * DISC_SHADE) as u8;
                }
                pixel.0[3] = 255;
            }
        }
    }
}

/// Point-in-triangle for the play glyph: the allowed |dy| shrinks linearly
/// from the flat edge to the apex.
fn inside_triangle(px: f32, py: f32, x0: f32, x1: f32, cy: f32, half_height: f32) -> bool {
    if px < x0 || px > x1 || x1 <= x0 {
        return false;
    }
    let span = (px - x0) / (x1 - x0);
    (py - cy).abs() <= half_height * (1.0 - span)
}
