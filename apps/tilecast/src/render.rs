//! Turns a source region into the ordered edits one worker sends.
//!
//! Edits are produced in row-major order and numbered from zero per call, so
//! every shard's sequence indices restart at zero.

use tile_proto::{quantize, Edit, Origin, Quadrant, Rgb, TileSize};
use time::OffsetDateTime;

use crate::config::{ImageRender, RunConfig};
use crate::partition::Region;
use crate::source::{PixelGrid, Source, TextGrid};

/// Per-run inputs to the colour policy and coordinate mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub origin: Origin,
    pub tile: TileSize,
    pub wipe: bool,
    pub foreground: Rgb,
    pub background: Option<Rgb>,
}

impl EncodeOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            origin: config.origin,
            tile: TileSize::DEFAULT,
            wipe: config.wipe,
            foreground: config.foreground,
            background: config.background,
        }
    }
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            origin: Origin::default(),
            tile: TileSize::DEFAULT,
            wipe: false,
            foreground: Rgb::BLACK,
            background: None,
        }
    }
}

/// What one canvas cell should show before the colour policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellPaint {
    Text(char),
    Pixel(Rgb),
    Quadrant(Quadrant),
}

/// `(content, foreground, background)` for a cell.
fn paint(options: &EncodeOptions, cell: CellPaint) -> (char, Rgb, Option<Rgb>) {
    if options.wipe {
        return (' ', Rgb::BLACK, None);
    }
    match cell {
        CellPaint::Text(ch) => (ch, options.foreground, options.background),
        CellPaint::Pixel(color) => (' ', Rgb::BLACK, Some(color)),
        CellPaint::Quadrant(quadrant) => (
            quadrant.glyph,
            quadrant.foreground,
            Some(quadrant.background),
        ),
    }
}

/// Builds one edit for the cell at `(local_x, local_y)` relative to the origin.
pub fn encode_cell(
    options: &EncodeOptions,
    local_x: i64,
    local_y: i64,
    cell: CellPaint,
    sequence_index: u64,
    timestamp: i64,
) -> Edit {
    let (content, foreground, background) = paint(options, cell);
    Edit {
        coord: options.origin.map(local_x, local_y, options.tile),
        timestamp,
        content,
        sequence_index,
        foreground,
        background,
    }
}

/// Accumulates edits with a running sequence index.
pub struct EditEncoder<'a> {
    options: &'a EncodeOptions,
    edits: Vec<Edit>,
}

impl<'a> EditEncoder<'a> {
    pub fn with_capacity(options: &'a EncodeOptions, capacity: usize) -> Self {
        Self {
            options,
            edits: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, local_x: usize, local_y: usize, cell: CellPaint) {
        let index = self.edits.len() as u64;
        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        self.edits.push(encode_cell(
            self.options,
            to_i64(local_x),
            to_i64(local_y),
            cell,
            index,
            timestamp,
        ));
    }

    pub fn finish(self) -> Vec<Edit> {
        self.edits
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// One edit per character of every line in `region`.
pub fn encode_text(grid: &TextGrid, region: &Region, options: &EncodeOptions) -> Vec<Edit> {
    let rows = grid
        .rows()
        .get(region.rows())
        .unwrap_or_default();
    let mut encoder = EditEncoder::with_capacity(options, rows.iter().map(Vec::len).sum());
    for (row_index, line) in rows.iter().enumerate() {
        for (col_index, ch) in line.iter().enumerate() {
            encoder.push(col_index, region.row_offset + row_index, CellPaint::Text(*ch));
        }
    }
    encoder.finish()
}

/// One edit per pixel, painted through the cell background.
pub fn encode_pixels(grid: &PixelGrid, region: &Region, options: &EncodeOptions) -> Vec<Edit> {
    let end = region.end_row.min(grid.height());
    let start = region.start_row.min(end);
    let mut encoder = EditEncoder::with_capacity(options, (end - start) * grid.width());
    for y in start..end {
        for (x, color) in grid.row(y).iter().enumerate() {
            encoder.push(x, region.row_offset + (y - start), CellPaint::Pixel(*color));
        }
    }
    encoder.finish()
}

/// One quadrant glyph per 2×2 block within `width` columns of `region`.
/// Pixels outside the grid, or a trailing odd row or column, are skipped.
pub fn encode_quadrants(
    grid: &PixelGrid,
    width: usize,
    region: &Region,
    options: &EncodeOptions,
) -> Vec<Edit> {
    let width = width.min(grid.width());
    let end = region.end_row.min(grid.height());
    let start = region.start_row.min(end);
    let mut encoder = EditEncoder::with_capacity(options, ((end - start) / 2) * (width / 2));
    for y in (start..end).step_by(2) {
        for x in (0..width).step_by(2) {
            let block = match (
                grid.get(x, y),
                grid.get(x + 1, y),
                grid.get(x, y + 1),
                grid.get(x + 1, y + 1),
            ) {
                (Some(tl), Some(tr), Some(bl), Some(br)) if y + 1 < end && x + 1 < width => {
                    [tl, tr, bl, br]
                }
                _ => continue,
            };
            encoder.push(
                x / 2,
                region.row_offset + (y - start) / 2,
                CellPaint::Quadrant(quantize(block)),
            );
        }
    }
    encoder.finish()
}

/// Encodes one region of any source with the selected image rendering.
/// For quadrant rendering `region` is in pixel rows and `row_offset` in
/// block rows, as produced by [`crate::partition::partition_blocks`].
pub fn encode_region(
    source: &Source,
    render: ImageRender,
    region: &Region,
    options: &EncodeOptions,
) -> Vec<Edit> {
    match (source, render) {
        (Source::Text(grid), _) => encode_text(grid, region, options),
        (Source::Image(grid), ImageRender::Pixel) => encode_pixels(grid, region, options),
        (Source::Image(grid), ImageRender::Quadrant) => {
            let width = grid.width() - grid.width() % 2;
            encode_quadrants(grid, width, region, options)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{partition, partition_blocks};
    use tile_proto::glyph::FULL_BLOCK;
    use tile_proto::TileCoord;

    fn whole(rows: usize) -> Region {
        Region {
            start_row: 0,
            end_row: rows,
            row_offset: 0,
        }
    }

    fn coord(block_row: i64, block_col: i64, sub_row: i64, sub_col: i64) -> TileCoord {
        TileCoord {
            block_row,
            block_col,
            sub_row,
            sub_col,
        }
    }

    #[test_timeout::timeout]
    fn plain_text_row_lands_in_origin_tile() {
        let grid = TextGrid::parse("abc");
        let edits = encode_text(&grid, &whole(1), &EncodeOptions::default());
        assert_eq!(edits.len(), 3);
        for (index, (edit, ch)) in edits.iter().zip(['a', 'b', 'c']).enumerate() {
            assert_eq!(edit.coord, coord(0, 0, 0, index as i64));
            assert_eq!(edit.content, ch);
            assert_eq!(edit.sequence_index, index as u64);
            assert_eq!(edit.foreground, Rgb::BLACK);
            assert_eq!(edit.background, None);
        }
    }

    #[test_timeout::timeout]
    fn wipe_blanks_text_and_drops_colours() {
        let grid = TextGrid::parse("abc");
        let options = EncodeOptions {
            wipe: true,
            foreground: Rgb::new(9, 9, 9),
            background: Some(Rgb::new(1, 1, 1)),
            ..EncodeOptions::default()
        };
        let edits = encode_text(&grid, &whole(1), &options);
        assert!(edits.iter().all(|e| e.content == ' '
            && e.foreground == Rgb::BLACK
            && e.background.is_none()));
    }

    #[test_timeout::timeout]
    fn text_uses_supplied_colours() {
        let options = EncodeOptions {
            foreground: Rgb::new(255, 0, 0),
            background: Some(Rgb::new(0, 0, 255)),
            ..EncodeOptions::default()
        };
        let edits = encode_text(&TextGrid::parse("x"), &whole(1), &options);
        assert_eq!(edits[0].foreground, Rgb::new(255, 0, 0));
        assert_eq!(edits[0].background, Some(Rgb::new(0, 0, 255)));
    }

    #[test_timeout::timeout]
    fn text_region_is_reanchored_by_row_offset() {
        let grid = TextGrid::parse("a\nb\nc\nd\n");
        let regions = partition(grid.height(), 2);
        let second = encode_text(&grid, &regions[1], &EncodeOptions::default());
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].content, 'c');
        assert_eq!(second[0].coord, coord(0, 0, 2, 0));
        assert_eq!(second[0].sequence_index, 0);
    }

    #[test_timeout::timeout]
    fn origin_and_overflow_wrap_into_next_tiles() {
        let options = EncodeOptions {
            origin: Origin::new(-1, 2),
            ..EncodeOptions::default()
        };
        let line: String = std::iter::repeat('z').take(17).collect();
        let edits = encode_text(&TextGrid::parse(&line), &whole(1), &options);
        assert_eq!(edits[0].coord, coord(2, -1, 0, 0));
        assert_eq!(edits[16].coord, coord(2, 0, 0, 0));
    }

    #[test_timeout::timeout]
    fn pixels_paint_background() {
        let red = Rgb::new(255, 0, 0);
        let grid = PixelGrid::filled(3, 2, red);
        let edits = encode_pixels(&grid, &whole(2), &EncodeOptions::default());
        assert_eq!(edits.len(), 6);
        assert!(edits.iter().all(|e| e.content == ' '
            && e.foreground == Rgb::BLACK
            && e.background == Some(red)));
        assert_eq!(edits[3].coord, coord(0, 0, 1, 0));
        assert_eq!(edits[5].sequence_index, 5);
    }

    #[test_timeout::timeout]
    fn all_black_quadrants_become_solid_blocks() {
        let grid = PixelGrid::filled(16, 8, Rgb::BLACK);
        let parts = partition_blocks(grid.width(), grid.height(), 1);
        let edits = encode_quadrants(&grid, parts.width, &parts.regions[0], &EncodeOptions::default());
        assert_eq!(edits.len(), 32);
        for edit in &edits {
            assert_eq!(edit.content, FULL_BLOCK);
            assert_eq!(edit.foreground, Rgb::BLACK);
            assert_eq!(edit.background, Some(Rgb::BLACK));
        }
        assert_eq!(edits[8].coord, coord(0, 0, 1, 0));
    }

    #[test_timeout::timeout]
    fn quadrant_shards_use_block_row_offsets() {
        let white = Rgb::new(255, 255, 255);
        let grid = PixelGrid::filled(4, 8, white);
        let parts = partition_blocks(4, 8, 2);
        let second = encode_region(
            &Source::Image(grid),
            ImageRender::Quadrant,
            &parts.regions[1],
            &EncodeOptions::default(),
        );
        assert_eq!(second.len(), 4);
        assert_eq!(second[0].coord, coord(0, 0, 2, 0));
        assert_eq!(second[3].coord, coord(0, 0, 3, 1));
    }

    #[test_timeout::timeout]
    fn odd_edges_are_skipped() {
        let grid = PixelGrid::filled(5, 3, Rgb::new(7, 7, 7));
        let edits = encode_region(
            &Source::Image(grid),
            ImageRender::Quadrant,
            &whole(3),
            &EncodeOptions::default(),
        );
        assert_eq!(edits.len(), 2);
    }

    #[test_timeout::timeout]
    fn encoding_is_repeatable_apart_from_timestamps() {
        let grid = TextGrid::parse("hello\nworld");
        let options = EncodeOptions::default();
        let first: Vec<Edit> = encode_text(&grid, &whole(2), &options)
            .iter()
            .map(Edit::without_timestamp)
            .collect();
        let second: Vec<Edit> = encode_text(&grid, &whole(2), &options)
            .iter()
            .map(Edit::without_timestamp)
            .collect();
        assert_eq!(first, second);
    }
}
