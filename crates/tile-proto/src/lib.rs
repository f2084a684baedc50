//! Shared primitives for addressing and writing cells on a tiled text canvas.
//! Kept free of any runtime or transport code so front-ends can encode edits
//! without pulling in the streaming stack.

pub mod color;
pub mod coords;
pub mod edit;
pub mod glyph;
pub mod wire;

pub use color::{ColorParseError, Rgb};
pub use coords::{Origin, TileCoord, TileSize};
pub use edit::Edit;
pub use glyph::{quantize, Quadrant};
pub use wire::{decode_write_frame, encode_write_frame, WireError, WriteFrame};
