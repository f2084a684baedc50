//! Two-colour approximation of a 2×2 pixel block using Unicode quadrant
//! block elements.
//!
//! Each pixel is classified as dark (strictly below the block's mean
//! brightness) or light. The dark pixels become the glyph's inked quadrants
//! and are averaged into the foreground colour; the light pixels are averaged
//! into the background colour.

use crate::color::Rgb;

pub const FULL_BLOCK: char = '█';

/// Dark/light pattern → glyph. Bits are `tl tr bl br`, most significant first,
/// with `1` meaning dark.
const QUADRANT_GLYPHS: [(u8, char); 16] = [
    (0b0000, ' '),
    (0b1111, '█'),
    (0b1000, '▘'),
    (0b0100, '▝'),
    (0b0010, '▖'),
    (0b0001, '▗'),
    (0b1100, '▀'),
    (0b0011, '▄'),
    (0b1010, '▌'),
    (0b0101, '▐'),
    (0b1011, '▙'),
    (0b0111, '▟'),
    (0b1110, '▛'),
    (0b1101, '▜'),
    (0b1001, '▚'),
    (0b0110, '▞'),
];

/// Result of quantizing one 2×2 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quadrant {
    pub glyph: char,
    pub foreground: Rgb,
    pub background: Rgb,
}

/// Glyph for a dark/light pattern; unknown patterns render as a full block.
pub fn glyph_for_pattern(pattern: u8) -> char {
    QUADRANT_GLYPHS
        .iter()
        .find(|(bits, _)| *bits == pattern)
        .map(|(_, glyph)| *glyph)
        .unwrap_or(FULL_BLOCK)
}

/// Every glyph the quantizer can produce.
pub fn glyphs() -> impl Iterator<Item = char> {
    QUADRANT_GLYPHS.iter().map(|(_, glyph)| *glyph)
}

/// Dark/light pattern of a block in `tl, tr, bl, br` order.
pub fn pattern(block: &[Rgb; 4]) -> u8 {
    let levels = block.map(Rgb::brightness);
    let mean = levels.iter().sum::<f64>() / 4.0;
    levels
        .iter()
        .fold(0u8, |bits, level| (bits << 1) | u8::from(*level < mean))
}

/// Quantizes a block given in reading order: top-left, top-right,
/// bottom-left, bottom-right.
///
/// A block with no brightness contrast has an empty dark or light subset;
/// both colours then fall back to the mean of all four pixels and the block
/// is drawn as a solid full block.
pub fn quantize(block: [Rgb; 4]) -> Quadrant {
    let bits = pattern(&block);
    let mut dark = Vec::with_capacity(4);
    let mut light = Vec::with_capacity(4);
    for (index, pixel) in block.iter().enumerate() {
        if bits & (0b1000 >> index) != 0 {
            dark.push(*pixel);
        } else {
            light.push(*pixel);
        }
    }

    if dark.is_empty() || light.is_empty() {
        let solid = Rgb::mean(&block);
        return Quadrant {
            glyph: FULL_BLOCK,
            foreground: solid,
            background: solid,
        };
    }

    Quadrant {
        glyph: glyph_for_pattern(bits),
        foreground: Rgb::mean(&dark),
        background: Rgb::mean(&light),
    }
}
