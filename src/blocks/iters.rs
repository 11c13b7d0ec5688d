use super::BlockGeometry;
use crate::geometry::{RasterDims, RasterWindow};
use std::{iter::*, ops::Range};

impl BlockGeometry {
    /// Number of blocks along each axis of a raster of
    /// dimension `dim`.
    pub fn blocks_across(&self, dim: RasterDims) -> (usize, usize) {
        (
            (dim.0 + self.width - 1) / self.width,
            (dim.1 + self.height - 1) / self.height,
        )
    }

    pub(super) fn iter_mapper(&self, dim: RasterDims) -> (usize, impl Fn(usize) -> RasterWindow) {
        let (nx, ny) = self.blocks_across(dim);
        let (bw, bh) = (self.width, self.height);

        (nx * ny, move |i| {
            let (bx, by) = (i % nx, i / nx);
            let (x, y) = (bx * bw, by * bh);
            let w = bw.min(dim.0 - x);
            let h = bh.min(dim.1 - y);
            ((x as isize, y as isize), (w, h))
        })
    }

    /// Iterate, in raster order, over the block windows
    /// tiling a raster of dimension `dim`. Every window is
    /// aligned; windows on the far edges are clipped to the
    /// raster.
    pub fn windows(&self, dim: RasterDims) -> Map<Range<usize>, impl Fn(usize) -> RasterWindow> {
        let (count, func) = self.iter_mapper(dim);
        (0..count).map(func)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_cover_raster() {
        let geom = BlockGeometry::tiled(256, 256).unwrap();
        let wins: Vec<_> = geom.windows((600, 300)).collect();
        assert_eq!(wins.len(), 6);
        assert_eq!(wins[0], ((0, 0), (256, 256)));
        assert_eq!(wins[2], ((512, 0), (88, 256)));
        assert_eq!(wins[5], ((512, 256), (88, 44)));

        let area: usize = wins.iter().map(|(_, (w, h))| w * h).sum();
        assert_eq!(area, 600 * 300);
        assert!(wins.iter().all(|w| geom.is_aligned(*w)));
    }

    #[test]
    fn scanline_runs() {
        let geom = BlockGeometry::scanline(40, 16).unwrap();
        let wins: Vec<_> = geom.windows((40, 40)).collect();
        assert_eq!(
            wins,
            vec![((0, 0), (40, 16)), ((0, 16), (40, 16)), ((0, 32), (40, 8))]
        );
        assert_eq!(geom.windows((40, 40)).len(), 3);
    }
}
