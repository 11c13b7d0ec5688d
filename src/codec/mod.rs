//! Raster codec backends.
//!
//! A backend knows how to decode and encode ranges of
//! blocks of a store; it knows nothing about alignment
//! rules, channel order or sample conversion, which are
//! handled by [`TiledBlockResource`]. Backends report
//! failures as [`anyhow::Error`]s; the resource turns them
//! into [`Error::Io`][crate::Error::Io] at the call that
//! saw them.
//!
//! [`TiledBlockResource`]: crate::resource::TiledBlockResource
use ndarray::Array3;
use std::path::Path;

use crate::blocks::{BlockGeometry, BlockRegion};
use crate::geometry::RasterWindow;
use crate::georef::GeoMetadata;
use crate::Result;

#[cfg(feature = "gdal")]
pub mod gdal;
pub mod memory;

/// Block layout of a store, as a tagged variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Fixed-size tiles. `random_order` tells the backend
    /// that tiles may be written in any order.
    Tiled {
        width: usize,
        height: usize,
        random_order: bool,
    },
    /// Runs of full-width scanlines.
    Scanline { rows_per_block: usize },
}

impl Layout {
    /// Block geometry of this layout on a raster `cols`
    /// wide.
    pub fn geometry(&self, cols: usize) -> Result<BlockGeometry> {
        match *self {
            Layout::Tiled { width, height, .. } => BlockGeometry::tiled(width, height),
            Layout::Scanline { rows_per_block } => BlockGeometry::scanline(cols, rows_per_block),
        }
    }
}

/// Header metadata of a store.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreHeader {
    pub cols: usize,
    pub rows: usize,
    /// Channel names, in the (unspecified) order the store
    /// reports them.
    pub channels: Vec<String>,
    pub layout: Layout,
}

/// Opens and creates stores.
pub trait BlockCodec {
    type Reader: StoreReader;
    type Writer: StoreWriter;

    fn open(&self, path: &Path) -> anyhow::Result<Self::Reader>;

    /// Create (or truncate) a store of `f32` samples with
    /// the channels and layout of `header`.
    fn create(&self, path: &Path, header: &StoreHeader) -> anyhow::Result<Self::Writer>;
}

/// Read access to an open store.
pub trait StoreReader {
    fn header(&self) -> &StoreHeader;

    /// Decode the blocks of `region` and copy the samples of
    /// window `win` into `out`, which has shape
    /// `(channels.len(), height, width)`. Plane `i` of `out`
    /// receives the channel named `channels[i]`.
    fn read_region(
        &self,
        region: &BlockRegion,
        win: RasterWindow,
        channels: &[String],
        out: &mut Array3<f32>,
    ) -> anyhow::Result<()>;

    /// Georeference stored with the raster, if any.
    fn geo_metadata(&self) -> anyhow::Result<Option<GeoMetadata>>;
}

/// Write access to a created store.
pub trait StoreWriter {
    /// Encode the blocks of `region` from `data`, the
    /// samples of window `win`. Plane `i` of `data` is
    /// stored as the channel named `channels[i]`.
    fn write_region(
        &mut self,
        region: &BlockRegion,
        win: RasterWindow,
        channels: &[String],
        data: &Array3<f32>,
    ) -> anyhow::Result<()>;

    fn set_geo_metadata(&mut self, meta: &GeoMetadata) -> anyhow::Result<()>;

    /// Flush and release the store.
    fn finish(self) -> anyhow::Result<()>;
}
