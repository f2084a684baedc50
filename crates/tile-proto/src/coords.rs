/// Dimensions of one addressable canvas tile, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSize {
    pub width: i64,
    pub height: i64,
}

impl TileSize {
    pub const DEFAULT: TileSize = TileSize {
        width: 16,
        height: 8,
    };
}

impl Default for TileSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Anchor of a drawing, expressed in whole tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Origin {
    pub x: i64,
    pub y: i64,
}

impl Origin {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Maps a cell position relative to this origin onto tile coordinates.
    ///
    /// The origin is already tile aligned, so only the local offset is split
    /// into whole tiles and a remainder. Tile indices saturate at the `i64`
    /// bounds instead of overflowing.
    pub fn map(&self, local_x: i64, local_y: i64, tile: TileSize) -> TileCoord {
        TileCoord {
            block_row: self.y.saturating_add(local_y.div_euclid(tile.height)),
            block_col: self.x.saturating_add(local_x.div_euclid(tile.width)),
            sub_row: local_y.rem_euclid(tile.height),
            sub_col: local_x.rem_euclid(tile.width),
        }
    }
}

/// Address of a single cell: the tile it lives in plus its offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub block_row: i64,
    pub block_col: i64,
    pub sub_row: i64,
    pub sub_col: i64,
}

impl TileCoord {
    /// Floor division keeps negative positions in consistent negative tiles
    /// with a non-negative in-tile offset.
    pub fn from_absolute(abs_x: i64, abs_y: i64, tile: TileSize) -> Self {
        Self {
            block_row: abs_y.div_euclid(tile.height),
            block_col: abs_x.div_euclid(tile.width),
            sub_row: abs_y.rem_euclid(tile.height),
            sub_col: abs_x.rem_euclid(tile.width),
        }
    }

    /// Absolute `(x, y)` cell position this coordinate addresses, or `None`
    /// when it lies beyond the `i64` range.
    pub fn absolute(&self, tile: TileSize) -> Option<(i64, i64)> {
        let x = self.block_col.checked_mul(tile.width)?.checked_add(self.sub_col)?;
        let y = self.block_row.checked_mul(tile.height)?.checked_add(self.sub_row)?;
        Some((x, y))
    }
}
