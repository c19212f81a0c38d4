//! Frame annotation for weapon-like detections.

use image::{Rgb, RgbImage};

use crate::detect::{BoundingBox, Detection};

pub const ALERT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const BOX_THICKNESS: u32 = 3;
/// Height of the filled label bar drawn above each box.
pub const LABEL_BAR_HEIGHT: u32 = 12;

/// Outline every detection in red with a filled bar above the box whose width
/// tracks the confidence.
pub fn annotate(frame: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
        draw_box(frame, &detection.bbox, ALERT_COLOR, BOX_THICKNESS);
        draw_label_bar(frame, detection, ALERT_COLOR);
    }
}

/// Hollow rectangle, clipped to the frame.
pub fn draw_box(frame: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    let left = bbox.x as i64;
    let top = bbox.y as i64;
    let right = left + bbox.width as i64;
    let bottom = top + bbox.height as i64;
    let t = thickness as i64;

    fill_rect(frame, left, top, right, top + t, color);
    fill_rect(frame, left, bottom - t, right, bottom, color);
    fill_rect(frame, left, top, left + t, bottom, color);
    fill_rect(frame, right - t, top, right, bottom, color);
}

fn draw_label_bar(frame: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
    let bbox = &detection.bbox;
    let left = bbox.x as i64;
    let bar_width = (bbox.width as f32 * detection.confidence.clamp(0.0, 1.0)).round() as i64;
    let bottom = bbox.y as i64;
    let top = if bottom >= LABEL_BAR_HEIGHT as i64 {
        bottom - LABEL_BAR_HEIGHT as i64
    } else {
        // No room above; draw inside the box.
        bottom + BOX_THICKNESS as i64
    };
    fill_rect(
        frame,
        left,
        top,
        left + bar_width.max(1),
        top + LABEL_BAR_HEIGHT as i64,
        color,
    );
}

/// Fill the half-open rectangle [x0, x1) × [y0, y1), clipped to the frame.
fn fill_rect(frame: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    let (w, h) = (frame.width() as i64, frame.height() as i64);
    let (x0, x1) = (x0.clamp(0, w), x1.clamp(0, w));
    let (y0, y1) = (y0.clamp(0, h), y1.clamp(0, h));
    for y in y0..y1 {
        for x in x0..x1 {
            frame.put_pixel(x as u32, y as u32, color);
        }
    }
}
