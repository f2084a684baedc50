use std::ops::Range;

/// Below this many pixel rows, quadrant rendering uses at most
/// [`SMALL_IMAGE_SHARDS`] shards.
pub const SMALL_IMAGE_ROWS: usize = 80;
pub const SMALL_IMAGE_SHARDS: usize = 2;

/// Half-open row range of the source owned by one shard.
///
/// `row_offset` is the canvas row the first source row lands on, relative to
/// the drawing origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start_row: usize,
    pub end_row: usize,
    pub row_offset: usize,
}

impl Region {
    pub fn rows(&self) -> Range<usize> {
        self.start_row..self.end_row
    }
}

/// Splits `[0, total)` into `shards` contiguous ranges. Every shard gets
/// `total / shards` rows; the last also takes the remainder.
pub fn partition(total: usize, shards: usize) -> Vec<Region> {
    if shards == 0 {
        return Vec::new();
    }
    let base = total / shards;
    (0..shards)
        .map(|index| {
            let start_row = index * base;
            let end_row = if index + 1 == shards {
                total
            } else {
                start_row + base
            };
            Region {
                start_row,
                end_row,
                row_offset: start_row,
            }
        })
        .collect()
}

/// Pixel regions for 2×2 block rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPartition {
    /// Even-sized dimensions after trimming.
    pub width: usize,
    pub height: usize,
    /// Pixel row ranges; boundaries are even and `row_offset` is the first
    /// canvas row (one canvas row per block row).
    pub regions: Vec<Region>,
}

/// Trims to even dimensions, caps small images at two shards, then splits
/// block rows so that every region boundary stays on an even pixel row.
pub fn partition_blocks(width: usize, height: usize, shards: usize) -> BlockPartition {
    let width = width - width % 2;
    let height = height - height % 2;
    let shards = if height < SMALL_IMAGE_ROWS {
        shards.min(SMALL_IMAGE_SHARDS)
    } else {
        shards
    };
    let regions = partition(height / 2, shards)
        .into_iter()
        .map(|blocks| Region {
            start_row: blocks.start_row * 2,
            end_row: blocks.end_row * 2,
            row_offset: blocks.start_row,
        })
        .collect();
    BlockPartition {
        width,
        height,
        regions,
    }
}
