//! Transparent RGBA overlay drawn from a detection result.
//!
//! The surface is sized to the display, not the native stream, so boxes are
//! scaled on the way in. Rendering always clears the previous contents:
//! results replace each other wholesale, and an empty result wipes the
//! surface rather than leaving stale boxes behind.

use image::{Rgba, RgbaImage};

use crate::overlay::labels;
use crate::shared::face::{DetectionResult, FaceBox};

#[derive(Clone, Copy, Debug)]
pub struct OverlayStyle {
    pub box_color: Rgba<u8>,
    pub landmark_color: Rgba<u8>,
    pub label_color: Rgba<u8>,
    pub label_background: Rgba<u8>,
    pub box_thickness: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_color: Rgba([64, 220, 120, 255]),
            landmark_color: Rgba([255, 220, 64, 255]),
            label_color: Rgba([255, 255, 255, 255]),
            label_background: Rgba([0, 0, 0, 180]),
            box_thickness: 2,
        }
    }
}

pub struct OverlayRenderer {
    surface: RgbaImage,
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_style(width, height, OverlayStyle::default())
    }

    pub fn with_style(width: u32, height: u32, style: OverlayStyle) -> Self {
        Self {
            surface: RgbaImage::new(width.max(1), height.max(1)),
            style,
        }
    }

    /// Redraw the surface for `result` at `display` pixels.
    ///
    /// Coordinates are scaled by the display/native width ratio, assuming the
    /// display preserves the stream aspect ratio.
    pub fn render(&mut self, result: &DetectionResult, display: (u32, u32)) {
        self.resize_if_needed(display);
        self.surface.fill(0);
        if result.is_empty() || result.native_width() == 0 {
            return;
        }

        let scale = display.0 as f32 / result.native_width() as f32;
        for face in result.faces() {
            let bbox = face.bbox.scaled(scale);
            self.draw_box(&bbox);
            if let Some(points) = &face.landmarks {
                for (px, py) in points {
                    imageproc::drawing::draw_filled_circle_mut(
                        &mut self.surface,
                        ((px * scale) as i32, (py * scale) as i32),
                        2,
                        self.style.landmark_color,
                    );
                }
            }
            if let Some(text) = face.label() {
                self.draw_face_label(&bbox, &text);
            }
        }
    }

    /// Wipe the surface to fully transparent.
    pub fn clear(&mut self) {
        self.surface.fill(0);
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    fn resize_if_needed(&mut self, display: (u32, u32)) {
        let (w, h) = (display.0.max(1), display.1.max(1));
        if self.surface.dimensions() != (w, h) {
            self.surface = RgbaImage::new(w, h);
        }
    }

    fn draw_box(&mut self, bbox: &FaceBox) {
        let x = bbox.x.round() as i32;
        let y = bbox.y.round() as i32;
        let w = bbox.width.round() as i32;
        let h = bbox.height.round() as i32;
        for inset in 0..self.style.box_thickness as i32 {
            let rw = (w - 2 * inset).max(1) as u32;
            let rh = (h - 2 * inset).max(1) as u32;
            imageproc::drawing::draw_hollow_rect_mut(
                &mut self.surface,
                imageproc::rect::Rect::at(x + inset, y + inset).of_size(rw, rh),
                self.style.box_color,
            );
        }
    }

    fn draw_face_label(&mut self, bbox: &FaceBox, text: &str) {
        let strip_h = labels::label_height() as i32;
        let box_y = bbox.y.round() as i32;
        // Above the box when there is room, below it near the top edge.
        let y = if box_y >= strip_h {
            box_y - strip_h
        } else {
            box_y + bbox.height.round() as i32
        };
        labels::draw_label(
            &mut self.surface,
            bbox.x.round() as i32,
            y,
            text,
            self.style.label_color,
            self.style.label_background,
        );
    }
}
