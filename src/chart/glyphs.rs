//! Minimal bitmap font for axis labels.
//!
//! Glyphs are 3x5 cells; each row is a 3-bit mask, most significant bit left.

use tiny_skia::{Paint, Pixmap, Rect, Transform};

const GLYPH_W: u32 = 3;
const GLYPH_H: u32 = 5;

fn glyph(c: char) -> Option<[u8; 5]> {
    let rows = match c {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        ' ' => [0; 5],
        _ => return None,
    };
    Some(rows)
}

/// Width in pixels of `text` at `scale`, with one blank column between glyphs.
pub fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        0
    } else {
        (n * (GLYPH_W + 1) - 1) * scale
    }
}

pub fn text_height(scale: u32) -> u32 {
    GLYPH_H * scale
}

/// Draw `text` with its top-left corner at `(x, y)`. Unknown characters are skipped.
pub fn draw_text(pixmap: &mut Pixmap, text: &str, x: f32, y: f32, scale: u32, paint: &Paint) {
    let cell = scale as f32;
    let advance = ((GLYPH_W + 1) * scale) as f32;

    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else { continue };
        let gx = x + i as f32 * advance;

        for (row, mask) in rows.iter().enumerate() {
            for col in 0..GLYPH_W {
                if mask & (1 << (GLYPH_W - 1 - col)) == 0 {
                    continue;
                }
                let px = gx + col as f32 * cell;
                let py = y + row as f32 * cell;
                if let Some(rect) = Rect::from_xywh(px, py, cell, cell) {
                    pixmap.fill_rect(rect, paint, Transform::identity(), None);
                }
            }
        }
    }
}
