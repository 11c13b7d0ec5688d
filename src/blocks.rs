//! Block geometry of persisted rasters.
//!
//! # Raster Memory Layout
//!
//! Large rasters are stored as rectangular blocks: either
//! tiles of a fixed size, or runs of full-width scanlines.
//! A block is the unit of decoding, so partial I/O is only
//! efficient (and for tiled stores, only supported) along
//! block boundaries.
//!
//! For a tiled layout, every windowed access must start at
//! a multiple of the tile size on both axes. This is a
//! precondition checked by [`BlockGeometry::check_aligned`]
//! and never silently corrected; callers that have an
//! arbitrary window may expand it with
//! [`BlockGeometry::align_window`] first.
use serde_derive::{Deserialize, Serialize};

use crate::geometry::{RasterDims, RasterWindow};
use crate::{Error, Result};

/// Default tile edge used when creating a raster.
pub const DEFAULT_TILE_SIZE: usize = 2048;

/// Default scanline run height, used when a store does not
/// report one.
pub const DEFAULT_ROWS_PER_BLOCK: usize = 16;

/// Native block layout of a raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockGeometry {
    width: usize,
    height: usize,
    tiled: bool,
}

/// The blocks covering a window, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockRegion {
    Tiles {
        first_x: usize,
        last_x: usize,
        first_y: usize,
        last_y: usize,
    },
    Scanlines { first_row: usize, last_row: usize },
}

mod iters;

#[cfg(feature = "use-rayon")]
mod par_iters;

/// Constructors
impl BlockGeometry {
    pub fn tiled(width: usize, height: usize) -> Result<Self> {
        if width < 1 || height < 1 {
            return Err(Error::Argument(format!(
                "tile size must be positive: {}x{}",
                width, height
            )));
        }
        Ok(BlockGeometry {
            width,
            height,
            tiled: true,
        })
    }

    /// Full-width runs of `rows_per_block` scanlines of a
    /// raster `cols` wide.
    pub fn scanline(cols: usize, rows_per_block: usize) -> Result<Self> {
        if cols < 1 || rows_per_block < 1 {
            return Err(Error::Argument(format!(
                "scanline block must be positive: {}x{}",
                cols, rows_per_block
            )));
        }
        Ok(BlockGeometry {
            width: cols,
            height: rows_per_block,
            tiled: false,
        })
    }
}

impl BlockGeometry {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_tiled(&self) -> bool {
        self.tiled
    }

    /// Whether the window origin falls on a block corner.
    /// Always true for scanline layouts.
    pub fn is_aligned(&self, win: RasterWindow) -> bool {
        let ((x, y), _) = win;
        !self.tiled || (x % self.width as isize == 0 && y % self.height as isize == 0)
    }

    pub fn check_aligned(&self, win: RasterWindow) -> Result<()> {
        if self.is_aligned(win) {
            return Ok(());
        }
        let ((x, y), _) = win;
        Err(Error::Argument(format!(
            "window corner ({}, {}) must fall on a {}x{} tile boundary",
            x, y, self.width, self.height
        )))
    }

    /// Blocks covering the (non-empty, non-negative) window
    /// `win`.
    pub fn region(&self, win: RasterWindow) -> BlockRegion {
        let ((x, y), (w, h)) = win;
        debug_assert!(x >= 0 && y >= 0 && w > 0 && h > 0);
        let (x, y) = (x as usize, y as usize);

        if self.tiled {
            BlockRegion::Tiles {
                first_x: x / self.width,
                last_x: (x + w - 1) / self.width,
                first_y: y / self.height,
                last_y: (y + h - 1) / self.height,
            }
        } else {
            BlockRegion::Scanlines {
                first_row: y,
                last_row: y + h - 1,
            }
        }
    }

    /// The smallest window containing `win` whose origin is
    /// aligned, and whose far edges are aligned or at the
    /// raster edge. Clipped to a raster of dimension `dim`.
    pub fn align_window(&self, win: RasterWindow, dim: RasterDims) -> RasterWindow {
        let ((x, y), (w, h)) = win;
        let x0 = x.max(0) as usize;
        let y0 = y.max(0) as usize;
        let x1 = window_end(x, w).min(dim.0);
        let y1 = window_end(y, h).min(dim.1);

        let (bw, bh) = if self.tiled {
            (self.width, self.height)
        } else {
            (1, 1)
        };

        let left = (x0 / bw * bw).min(dim.0);
        let top = (y0 / bh * bh).min(dim.1);
        let right = mod_ceil(x1, bw).min(dim.0).max(left);
        let bot = mod_ceil(y1, bh).min(dim.1).max(top);

        ((left as isize, top as isize), (right - left, bot - top))
    }
}

impl BlockRegion {
    /// Number of blocks (tiles or scanlines) in the region.
    pub fn len(&self) -> usize {
        match *self {
            BlockRegion::Tiles {
                first_x,
                last_x,
                first_y,
                last_y,
            } => (last_x - first_x + 1) * (last_y - first_y + 1),
            BlockRegion::Scanlines {
                first_row,
                last_row,
            } => last_row - first_row + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[inline]
/// Far edge of a window span, saturating at both ends.
fn window_end(origin: isize, len: usize) -> usize {
    if origin >= 0 {
        (origin as usize).saturating_add(len)
    } else {
        len.saturating_sub(origin.unsigned_abs())
    }
}

fn mod_ceil(num: usize, m: usize) -> usize {
    let rem = num % m;
    if rem == 0 {
        num
    } else {
        num + (m - rem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_alignment() {
        let geom = BlockGeometry::tiled(256, 256).unwrap();
        assert!(geom.check_aligned(((256, 0), (256, 256))).is_ok());
        assert!(geom.check_aligned(((512, 768), (10, 10))).is_ok());
        assert!(matches!(
            geom.check_aligned(((100, 0), (256, 256))),
            Err(Error::Argument(_))
        ));
        assert!(geom.check_aligned(((0, 1), (256, 256))).is_err());
    }

    #[test]
    fn scanlines_are_always_aligned() {
        let geom = BlockGeometry::scanline(1000, 16).unwrap();
        assert!(geom.check_aligned(((3, 7), (10, 10))).is_ok());
        assert_eq!(
            geom.region(((0, 7), (1000, 10))),
            BlockRegion::Scanlines {
                first_row: 7,
                last_row: 16
            }
        );
    }

    #[test]
    fn covering_tiles() {
        let geom = BlockGeometry::tiled(256, 128).unwrap();
        let region = geom.region(((256, 0), (300, 128)));
        assert_eq!(
            region,
            BlockRegion::Tiles {
                first_x: 1,
                last_x: 2,
                first_y: 0,
                last_y: 0
            }
        );
        assert_eq!(region.len(), 2);
        assert_eq!(geom.region(((0, 0), (1, 1))).len(), 1);
    }

    #[test]
    fn align_window_expands() {
        let geom = BlockGeometry::tiled(256, 256).unwrap();
        assert_eq!(
            geom.align_window(((100, 300), (200, 10)), (1000, 1000)),
            ((0, 256), (512, 256))
        );
        assert_eq!(
            geom.align_window(((900, 900), (200, 200)), (1000, 1000)),
            ((768, 768), (232, 232))
        );

        let lines = BlockGeometry::scanline(1000, 16).unwrap();
        assert_eq!(
            lines.align_window(((-5, 3), (20, 4)), (1000, 1000)),
            ((0, 3), (15, 4))
        );

        // Spans past the end of the address space clip.
        assert_eq!(
            geom.align_window(((300, 0), (usize::MAX, 10)), (1000, 1000)),
            ((256, 0), (744, 256))
        );
        assert_eq!(
            geom.align_window(((isize::MIN, 0), (10, 10)), (1000, 1000)),
            ((0, 0), (0, 256))
        );
    }

    #[test]
    fn rejects_empty_blocks() {
        assert!(BlockGeometry::tiled(0, 16).is_err());
        assert!(BlockGeometry::scanline(16, 0).is_err());
    }
}
