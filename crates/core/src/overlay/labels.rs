//! 8x12 bitmap glyphs for overlay labels.
//!
//! Covers exactly the characters a face label can produce: digits, `M`, `F`,
//! `%`, `~` and space. Unknown characters render as blanks. Each glyph row is
//! one byte, most significant bit leftmost.

use image::{Rgba, RgbaImage};

pub const GLYPH_WIDTH: u32 = 8;
pub const GLYPH_HEIGHT: u32 = 12;

/// Padding between the text and the edge of the background strip.
const LABEL_PADDING: i32 = 2;

fn glyph(ch: char) -> [u8; 12] {
    match ch {
        '0' => [
            0x00, 0x3C, 0x66, 0x66, 0x6E, 0x76, 0x66, 0x66, 0x66, 0x3C, 0x00, 0x00,
        ],
        '1' => [
            0x00, 0x18, 0x38, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x3C, 0x00, 0x00,
        ],
        '2' => [
            0x00, 0x3C, 0x66, 0x06, 0x0C, 0x18, 0x30, 0x60, 0x66, 0x7E, 0x00, 0x00,
        ],
        '3' => [
            0x00, 0x3C, 0x66, 0x06, 0x06, 0x1C, 0x06, 0x06, 0x66, 0x3C, 0x00, 0x00,
        ],
        '4' => [
            0x00, 0x0C, 0x1C, 0x3C, 0x6C, 0x7E, 0x0C, 0x0C, 0x0C, 0x0C, 0x00, 0x00,
        ],
        '5' => [
            0x00, 0x7E, 0x60, 0x60, 0x7C, 0x06, 0x06, 0x06, 0x66, 0x3C, 0x00, 0x00,
        ],
        '6' => [
            0x00, 0x1C, 0x30, 0x60, 0x7C, 0x66, 0x66, 0x66, 0x66, 0x3C, 0x00, 0x00,
        ],
        '7' => [
            0x00, 0x7E, 0x06, 0x06, 0x0C, 0x0C, 0x18, 0x18, 0x30, 0x30, 0x00, 0x00,
        ],
        '8' => [
            0x00, 0x3C, 0x66, 0x66, 0x66, 0x3C, 0x66, 0x66, 0x66, 0x3C, 0x00, 0x00,
        ],
        '9' => [
            0x00, 0x3C, 0x66, 0x66, 0x66, 0x3E, 0x06, 0x06, 0x0C, 0x38, 0x00, 0x00,
        ],
        'M' => [
            0x00, 0x63, 0x77, 0x7F, 0x6B, 0x63, 0x63, 0x63, 0x63, 0x63, 0x00, 0x00,
        ],
        'F' => [
            0x00, 0x7E, 0x60, 0x60, 0x7C, 0x60, 0x60, 0x60, 0x60, 0x60, 0x00, 0x00,
        ],
        '%' => [
            0x00, 0x62, 0x66, 0x0C, 0x0C, 0x18, 0x30, 0x30, 0x66, 0x46, 0x00, 0x00,
        ],
        '~' => [
            0x00, 0x00, 0x00, 0x00, 0x00, 0x32, 0x4C, 0x00, 0x00, 0x00, 0x00, 0x00,
        ],
        _ => [0; 12],
    }
}

/// Pixel width of the background strip for `text`.
pub fn label_width(text: &str) -> u32 {
    text.chars().count() as u32 * GLYPH_WIDTH + 2 * LABEL_PADDING as u32
}

/// Pixel height of the background strip.
pub fn label_height() -> u32 {
    GLYPH_HEIGHT + 2 * LABEL_PADDING as u32
}

/// Draw `text` with (`x`, `y`) as the top-left corner of the background
/// strip. Pixels outside the image are clipped.
pub fn draw_label(
    img: &mut RgbaImage,
    x: i32,
    y: i32,
    text: &str,
    foreground: Rgba<u8>,
    background: Rgba<u8>,
) {
    let strip_w = label_width(text) as i32;
    let strip_h = label_height() as i32;

    for dy in 0..strip_h {
        for dx in 0..strip_w {
            put_pixel_clipped(img, x + dx, y + dy, background);
        }
    }

    let mut pen_x = x + LABEL_PADDING;
    let pen_y = y + LABEL_PADDING;
    for ch in text.chars() {
        let pattern = glyph(ch);
        for (row, bits) in pattern.iter().enumerate() {
            for col in 0..GLYPH_WIDTH as i32 {
                if (bits >> (7 - col)) & 1 == 1 {
                    put_pixel_clipped(img, pen_x + col, pen_y + row as i32, foreground);
                }
            }
        }
        pen_x += GLYPH_WIDTH as i32;
    }
}

fn put_pixel_clipped(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
        img.put_pixel(x as u32, y as u32, color);
    }
}
