//! An in-memory block store.
//!
//! Rasters live in a map shared by every clone of a
//! [`MemoryCodec`], keyed by path. Channels are kept in a
//! sorted map, so the store reports channel names in
//! lexical order regardless of the order they were
//! created in. Every decode and encode is counted.
use anyhow::{anyhow, bail, ensure};
use ndarray::{s, Array2, Array3, Axis};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{BlockCodec, Layout, StoreHeader, StoreReader, StoreWriter};
use crate::blocks::BlockRegion;
use crate::geometry::{window_within, RasterWindow};
use crate::georef::GeoMetadata;

#[derive(Clone, Debug, Default)]
pub struct MemoryCodec {
    rasters: Arc<Mutex<BTreeMap<PathBuf, MemoryRaster>>>,
}

#[derive(Debug)]
struct MemoryRaster {
    cols: usize,
    rows: usize,
    layout: Layout,
    planes: BTreeMap<String, Array2<f32>>,
    geo: Option<GeoMetadata>,
    stats: MemoryStats,
}

/// Access counters of one raster.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryStats {
    pub decodes: usize,
    pub encodes: usize,
    pub last_region: Option<BlockRegion>,
}

impl MemoryCodec {
    pub fn new() -> Self {
        Default::default()
    }

    /// Store a raster directly. `planes` must all have shape
    /// `(rows, cols)`.
    pub fn insert<P: AsRef<Path>>(
        &self,
        path: P,
        layout: Layout,
        planes: Vec<(String, Array2<f32>)>,
    ) -> anyhow::Result<()> {
        let (rows, cols) = planes
            .first()
            .map(|(_, p)| p.dim())
            .ok_or_else(|| anyhow!("raster needs at least one plane"))?;
        ensure!(
            planes.iter().all(|(_, p)| p.dim() == (rows, cols)),
            "planes differ in shape"
        );

        let raster = MemoryRaster {
            cols,
            rows,
            layout,
            planes: planes.into_iter().collect(),
            geo: None,
            stats: Default::default(),
        };
        self.lock().insert(path.as_ref().to_owned(), raster);
        Ok(())
    }

    /// A copy of the named plane of a stored raster.
    pub fn plane<P: AsRef<Path>>(&self, path: P, channel: &str) -> Option<Array2<f32>> {
        self.lock()
            .get(path.as_ref())
            .and_then(|r| r.planes.get(channel).cloned())
    }

    pub fn stats<P: AsRef<Path>>(&self, path: P) -> Option<MemoryStats> {
        self.lock().get(path.as_ref()).map(|r| r.stats.clone())
    }

    fn lock(&self) -> MutexGuard<BTreeMap<PathBuf, MemoryRaster>> {
        // A panic while holding the lock leaves the map
        // itself consistent.
        self.rasters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BlockCodec for MemoryCodec {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn open(&self, path: &Path) -> anyhow::Result<MemoryReader> {
        let rasters = self.lock();
        let raster = rasters
            .get(path)
            .ok_or_else(|| anyhow!("no raster stored at {}", path.display()))?;

        let header = StoreHeader {
            cols: raster.cols,
            rows: raster.rows,
            channels: raster.planes.keys().cloned().collect(),
            layout: raster.layout,
        };
        Ok(MemoryReader {
            codec: self.clone(),
            path: path.to_owned(),
            header,
        })
    }

    fn create(&self, path: &Path, header: &StoreHeader) -> anyhow::Result<MemoryWriter> {
        ensure!(
            header.cols > 0 && header.rows > 0,
            "cannot create an empty raster"
        );
        let planes = header
            .channels
            .iter()
            .map(|c| (c.clone(), Array2::zeros((header.rows, header.cols))))
            .collect::<BTreeMap<_, _>>();
        ensure!(
            planes.len() == header.channels.len(),
            "duplicate channel names: {:?}",
            header.channels
        );

        let raster = MemoryRaster {
            cols: header.cols,
            rows: header.rows,
            layout: header.layout,
            planes,
            geo: None,
            stats: Default::default(),
        };
        self.lock().insert(path.to_owned(), raster);
        Ok(MemoryWriter {
            codec: self.clone(),
            path: path.to_owned(),
        })
    }
}

pub struct MemoryReader {
    codec: MemoryCodec,
    path: PathBuf,
    header: StoreHeader,
}

pub struct MemoryWriter {
    codec: MemoryCodec,
    path: PathBuf,
}

impl StoreReader for MemoryReader {
    fn header(&self) -> &StoreHeader {
        &self.header
    }

    fn read_region(
        &self,
        region: &BlockRegion,
        win: RasterWindow,
        channels: &[String],
        out: &mut Array3<f32>,
    ) -> anyhow::Result<()> {
        let mut rasters = self.codec.lock();
        let raster = rasters
            .get_mut(&self.path)
            .ok_or_else(|| anyhow!("raster {} was removed", self.path.display()))?;
        raster.check_region(region, win)?;

        let ((x, y), (w, h)) = win;
        let (x, y) = (x as usize, y as usize);
        for (i, name) in channels.iter().enumerate() {
            let plane = raster
                .planes
                .get(name)
                .ok_or_else(|| anyhow!("no channel named \"{}\"", name))?;
            out.index_axis_mut(Axis(0), i)
                .assign(&plane.slice(s![y..y + h, x..x + w]));
        }

        raster.stats.decodes += 1;
        raster.stats.last_region = Some(*region);
        Ok(())
    }

    fn geo_metadata(&self) -> anyhow::Result<Option<GeoMetadata>> {
        Ok(self
            .codec
            .lock()
            .get(&self.path)
            .and_then(|r| r.geo.clone()))
    }
}

impl StoreWriter for MemoryWriter {
    fn write_region(
        &mut self,
        region: &BlockRegion,
        win: RasterWindow,
        channels: &[String],
        data: &Array3<f32>,
    ) -> anyhow::Result<()> {
        let mut rasters = self.codec.lock();
        let raster = rasters
            .get_mut(&self.path)
            .ok_or_else(|| anyhow!("raster {} was removed", self.path.display()))?;
        raster.check_region(region, win)?;

        let ((x, y), (w, h)) = win;
        let (x, y) = (x as usize, y as usize);
        for (i, name) in channels.iter().enumerate() {
            let plane = raster
                .planes
                .get_mut(name)
                .ok_or_else(|| anyhow!("no channel named \"{}\"", name))?;
            plane
                .slice_mut(s![y..y + h, x..x + w])
                .assign(&data.index_axis(Axis(0), i));
        }

        raster.stats.encodes += 1;
        raster.stats.last_region = Some(*region);
        Ok(())
    }

    fn set_geo_metadata(&mut self, meta: &GeoMetadata) -> anyhow::Result<()> {
        let mut rasters = self.codec.lock();
        let raster = rasters
            .get_mut(&self.path)
            .ok_or_else(|| anyhow!("raster {} was removed", self.path.display()))?;
        raster.geo = Some(meta.clone());
        Ok(())
    }

    fn finish(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl MemoryRaster {
    /// The region must be exactly the blocks covering the
    /// window, as a block-decoding store would need.
    fn check_region(&self, region: &BlockRegion, win: RasterWindow) -> anyhow::Result<()> {
        if !window_within(win, (self.cols, self.rows)) {
            bail!("window {:?} exceeds raster of {}x{}", win, self.cols, self.rows);
        }
        let geometry = self.layout.geometry(self.cols)?;
        let expected = geometry.region(win);
        ensure!(
            *region == expected,
            "block region {:?} does not cover window {:?} (expected {:?})",
            region,
            win,
            expected
        );
        Ok(())
    }
}
