//! Geometry vocabulary shared across the crate.
use geo::Rect;
use nalgebra::{Matrix3, Point2};

/// A location in pixel, projected or geographic space.
pub type Loc = Point2<f64>;

/// A homogeneous 3x3 affine transform.
pub type PixelTransform = Matrix3<f64>;

/// Raster dimensions as `(width, height)`.
pub type RasterDims = (usize, usize);

/// Pixel offset of a window as `(x, y)`.
pub type RasterOffset = (isize, isize);

/// A rectangular window: offset and dimensions.
pub type RasterWindow = (RasterOffset, RasterDims);

/// An axis-aligned rectangle in continuous coordinates.
pub type Bounds = Rect<f64>;

/// Convert a GDAL geotransform `[c, a, b, f, d, e]` to a
/// `PixelTransform`.
pub fn transform_from_gdal(t: &[f64; 6]) -> PixelTransform {
    Matrix3::new(t[1], t[2], t[0], t[4], t[5], t[3], 0., 0., 1.)
}

/// Inverse of [`transform_from_gdal`]. Ignores the
/// (projective) bottom row.
pub fn transform_to_gdal(t: &PixelTransform) -> [f64; 6] {
    [t[(0, 2)], t[(0, 0)], t[(0, 1)], t[(1, 2)], t[(1, 0)], t[(1, 1)]]
}

/// Window helpers for continuous rectangles in pixel space.
pub trait BoundsExt {
    /// The smallest window covering `self`, clipped to a
    /// raster of dimension `dim`. Empty if the bounds fall
    /// outside the raster.
    fn window_from_bounds(&self, dim: RasterDims) -> RasterWindow;
}

impl BoundsExt for Bounds {
    fn window_from_bounds(&self, dim: RasterDims) -> RasterWindow {
        let (cols, rows) = (dim.0 as f64, dim.1 as f64);
        let left = self.min().x.floor().max(0.).min(cols);
        let top = self.min().y.floor().max(0.).min(rows);
        let right = self.max().x.ceil().min(cols).max(left);
        let bot = self.max().y.ceil().min(rows).max(top);

        (
            (left as isize, top as isize),
            ((right - left) as usize, (bot - top) as usize),
        )
    }
}

/// Whether `win` lies entirely within a raster of
/// dimension `dim`.
pub fn window_within(win: RasterWindow, dim: RasterDims) -> bool {
    let ((x, y), (w, h)) = win;
    let fits = |o: isize, len: usize, edge: usize| {
        o >= 0 && (o as usize).checked_add(len).map_or(false, |end| end <= edge)
    };
    fits(x, w, dim.0) && fits(y, h, dim.1)
}
