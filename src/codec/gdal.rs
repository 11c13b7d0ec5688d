//! GDAL-backed block stores.
//!
//! Channels map to raster bands; a band's description is
//! its channel name (`Channel<n>` for bands without one).
//! Georeferences are stored as the dataset geotransform,
//! spatial reference and `AREA_OR_POINT` metadata item.
use anyhow::{anyhow, bail, Context};
use gdal::raster::{Buffer, RasterCreationOption};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::{Array3, Axis};
use std::path::{Path, PathBuf};

use super::{BlockCodec, Layout, StoreHeader, StoreReader, StoreWriter};
use crate::blocks::{BlockRegion, DEFAULT_ROWS_PER_BLOCK};
use crate::geometry::RasterWindow;
use crate::georef::GeoMetadata;
use crate::transform::PixelConvention;

const AREA_OR_POINT: &str = "AREA_OR_POINT";

/// Opens rasters with any GDAL driver, and creates them with
/// a configurable driver (`GTiff` by default).
#[derive(Clone, Debug)]
pub struct GdalCodec {
    driver: String,
    options: Vec<(String, String)>,
}

impl Default for GdalCodec {
    fn default() -> Self {
        GdalCodec {
            driver: "GTiff".into(),
            options: vec![],
        }
    }
}

/// Builder methods
impl GdalCodec {
    pub fn new() -> Self {
        Default::default()
    }

    /// Driver used to create rasters.
    pub fn with_driver(mut self, driver: &str) -> Self {
        self.driver = driver.into();
        self
    }

    /// Extra creation option passed to the driver, in
    /// addition to the layout options.
    pub fn with_creation_option(mut self, key: &str, value: &str) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }
}

impl BlockCodec for GdalCodec {
    type Reader = GdalReader;
    type Writer = GdalWriter;

    fn open(&self, path: &Path) -> anyhow::Result<GdalReader> {
        let dataset =
            Dataset::open(path).with_context(|| format!("opening dataset {}", path.display()))?;
        let (cols, rows) = dataset.raster_size();
        let count = dataset.raster_count();
        if count < 1 {
            return Err(anyhow!("{} has no raster bands", path.display()));
        }

        let mut channels = Vec::with_capacity(count as usize);
        for idx in 1..=count {
            let band = dataset
                .rasterband(idx)
                .with_context(|| format!("unable to open rasterband {}", idx))?;
            let name = band.description().unwrap_or_default();
            let name = if name.is_empty() {
                format!("Channel{}", idx - 1)
            } else {
                name
            };
            if channels.contains(&name) {
                bail!("{}: more than one band is named {}", path.display(), name);
            }
            channels.push(name);
        }

        let layout = layout_from_block_size(cols, dataset.rasterband(1)?.block_size());

        Ok(GdalReader {
            dataset,
            path: path.to_owned(),
            header: StoreHeader {
                cols,
                rows,
                channels,
                layout,
            },
        })
    }

    fn create(&self, path: &Path, header: &StoreHeader) -> anyhow::Result<GdalWriter> {
        let driver = DriverManager::get_driver_by_name(&self.driver)
            .with_context(|| format!("loading driver {}", self.driver))?;

        let mut options: Vec<(String, String)> = match header.layout {
            Layout::Tiled {
                width,
                height,
                random_order,
            } => {
                if random_order {
                    log::warn!(
                        "{}: random tile order is not a GDAL option; tiles are accepted in any order",
                        path.display()
                    );
                }
                log::debug!("tiled layout {}x{}", width, height);
                vec![
                    ("TILED".into(), "YES".into()),
                    ("BLOCKXSIZE".into(), width.to_string()),
                    ("BLOCKYSIZE".into(), height.to_string()),
                ]
            }
            Layout::Scanline { rows_per_block } => {
                vec![("BLOCKYSIZE".into(), rows_per_block.to_string())]
            }
        };
        options.extend(self.options.iter().cloned());
        let options: Vec<_> = options
            .iter()
            .map(|(key, value)| RasterCreationOption { key, value })
            .collect();

        let dataset = driver
            .create_with_band_type_with_options::<f32, _>(
                path,
                header.cols as isize,
                header.rows as isize,
                header.channels.len() as isize,
                &options,
            )
            .with_context(|| format!("creating dataset {}", path.display()))?;

        for (idx, name) in header.channels.iter().enumerate() {
            let mut band = dataset.rasterband(idx as isize + 1)?;
            band.set_description(name)
                .with_context(|| format!("labelling band {} as {}", idx + 1, name))?;
        }

        Ok(GdalWriter {
            dataset,
            path: path.to_owned(),
            channels: header.channels.clone(),
        })
    }
}

/// Strips span the full width; anything narrower is a tile.
/// A store reporting no block height gets the default run.
fn layout_from_block_size(cols: usize, (bw, bh): (usize, usize)) -> Layout {
    if bw > 0 && bw < cols && bh > 0 {
        Layout::Tiled {
            width: bw,
            height: bh,
            random_order: false,
        }
    } else if bh > 0 {
        Layout::Scanline { rows_per_block: bh }
    } else {
        Layout::Scanline {
            rows_per_block: DEFAULT_ROWS_PER_BLOCK,
        }
    }
}

pub struct GdalReader {
    dataset: Dataset,
    path: PathBuf,
    header: StoreHeader,
}

pub struct GdalWriter {
    dataset: Dataset,
    path: PathBuf,
    channels: Vec<String>,
}

fn band_index(channels: &[String], name: &str) -> anyhow::Result<isize> {
    channels
        .iter()
        .position(|c| c == name)
        .map(|i| i as isize + 1)
        .ok_or_else(|| anyhow!("no band labelled \"{}\"", name))
}

impl StoreReader for GdalReader {
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
        let (off, size) = win;
        log::trace!("{}: decoding {:?}", self.path.display(), region);

        for (i, name) in channels.iter().enumerate() {
            let idx = band_index(&self.header.channels, name)?;
            let band = self.dataset.rasterband(idx)?;

            let mut plane = out.index_axis_mut(Axis(0), i);
            let buf = plane
                .as_slice_mut()
                .ok_or_else(|| anyhow!("output plane is not contiguous"))?;
            band.read_into_slice(off, size, size, buf, None)
                .with_context(|| {
                    format!(
                        "reading window @ ({},{}) of dimension ({}x{}) from band {}",
                        off.0, off.1, size.0, size.1, idx
                    )
                })?;
        }
        Ok(())
    }

    fn geo_metadata(&self) -> anyhow::Result<Option<GeoMetadata>> {
        let transform = match self.dataset.geo_transform() {
            Ok(gt) => gt,
            Err(_) => return Ok(None),
        };

        let wkt = self.dataset.projection();
        let proj4 = if wkt.is_empty() {
            "+proj=longlat +datum=WGS84".to_string()
        } else {
            SpatialRef::from_wkt(&wkt)
                .and_then(|srs| srs.to_proj4())
                .with_context(|| format!("converting spatial reference of {}", self.path.display()))?
        };

        let convention = self
            .dataset
            .metadata_item(AREA_OR_POINT, "")
            .and_then(|s| PixelConvention::from_name(&s))
            .unwrap_or(PixelConvention::PixelAsArea);

        Ok(Some(GeoMetadata {
            transform,
            convention,
            proj4: proj4.trim().to_string(),
        }))
    }
}

impl StoreWriter for GdalWriter {
    fn write_region(
        &mut self,
        region: &BlockRegion,
        win: RasterWindow,
        channels: &[String],
        data: &Array3<f32>,
    ) -> anyhow::Result<()> {
        let (off, size) = win;
        log::trace!("{}: encoding {:?}", self.path.display(), region);

        for (i, name) in channels.iter().enumerate() {
            let idx = band_index(&self.channels, name)?;
            let mut band = self.dataset.rasterband(idx)?;

            let plane = data.index_axis(Axis(0), i);
            let buf = Buffer::new(size, plane.iter().cloned().collect());
            band.write(off, size, &buf).with_context(|| {
                format!(
                    "writing window @ ({},{}) of dimension ({}x{}) to band {}",
                    off.0, off.1, size.0, size.1, idx
                )
            })?;
        }
        Ok(())
    }

    fn set_geo_metadata(&mut self, meta: &GeoMetadata) -> anyhow::Result<()> {
        let srs = SpatialRef::from_proj4(&meta.proj4)
            .with_context(|| format!("parsing spatial reference \"{}\"", meta.proj4))?;
        self.dataset
            .set_metadata_item(AREA_OR_POINT, meta.convention.as_str(), "")?;
        self.dataset.set_geo_transform(&meta.transform)?;
        self.dataset.set_projection(&srs.to_wkt()?)?;
        Ok(())
    }

    fn finish(self) -> anyhow::Result<()> {
        // Dropping the dataset flushes it to disk.
        drop(self.dataset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockGeometry;
    use tempdir::TempDir;

    #[test]
    fn create_then_open() -> anyhow::Result<()> {
        let tmp_dir = TempDir::new("georaster_test")?;
        let path = tmp_dir.path().join("foo.tif");

        let header = StoreHeader {
            cols: 64,
            rows: 48,
            channels: vec!["R".into(), "G".into(), "B".into()],
            layout: Layout::Tiled {
                width: 32,
                height: 16,
                random_order: true,
            },
        };
        let codec = GdalCodec::new();
        {
            let mut writer = codec.create(&path, &header)?;
            let geometry = BlockGeometry::tiled(32, 16)?;
            let win = ((32, 16), (32, 16));
            let data = Array3::from_shape_fn((3, 16, 32), |(p, r, c)| (p * 1000 + r * 32 + c) as f32);
            writer.write_region(&geometry.region(win), win, &header.channels, &data)?;
            writer.finish()?;
        }

        let reader = codec.open(&path)?;
        assert_eq!(reader.header().cols, 64);
        assert_eq!(reader.header().rows, 48);
        assert_eq!(reader.header().channels, header.channels);
        assert_eq!(
            reader.header().layout,
            Layout::Tiled {
                width: 32,
                height: 16,
                random_order: false
            }
        );

        let win = ((32, 16), (32, 16));
        let geometry = reader.header().layout.geometry(64)?;
        let mut out = Array3::zeros((1, 16, 32));
        reader.read_region(&geometry.region(win), win, &["B".to_string()], &mut out)?;
        assert_eq!(out[(0, 0, 0)], 2000.);
        assert_eq!(out[(0, 15, 31)], 2000. + 15. * 32. + 31.);
        Ok(())
    }

    #[test]
    fn unlabelled_bands_get_default_names() -> anyhow::Result<()> {
        let tmp_dir = TempDir::new("georaster_test")?;
        let path = tmp_dir.path().join("plain.tif");
        {
            let driver = DriverManager::get_driver_by_name("GTiff")?;
            driver.create_with_band_type::<u8, _>(&path, 20, 10, 2)?;
        }

        let reader = GdalCodec::new().open(&path)?;
        assert_eq!(reader.header().channels, vec!["Channel0", "Channel1"]);
        assert!(matches!(reader.header().layout, Layout::Scanline { .. }));
        Ok(())
    }

    #[test]
    fn duplicate_band_names_are_rejected() -> anyhow::Result<()> {
        let tmp_dir = TempDir::new("georaster_test")?;
        let path = tmp_dir.path().join("twins.tif");
        let header = StoreHeader {
            cols: 8,
            rows: 8,
            channels: vec!["elevation".into(), "elevation".into()],
            layout: Layout::Scanline { rows_per_block: 8 },
        };
        GdalCodec::new().create(&path, &header)?.finish()?;

        let err = GdalCodec::new().open(&path).err().unwrap();
        assert!(format!("{:#}", err).contains("more than one band is named elevation"));
        Ok(())
    }

    #[test]
    fn block_sizes_pick_a_layout() {
        assert_eq!(
            layout_from_block_size(100, (32, 16)),
            Layout::Tiled {
                width: 32,
                height: 16,
                random_order: false
            }
        );
        assert_eq!(
            layout_from_block_size(100, (100, 4)),
            Layout::Scanline { rows_per_block: 4 }
        );
        assert_eq!(
            layout_from_block_size(100, (100, 0)),
            Layout::Scanline {
                rows_per_block: DEFAULT_ROWS_PER_BLOCK
            }
        );
        assert_eq!(
            layout_from_block_size(100, (0, 0)),
            Layout::Scanline {
                rows_per_block: DEFAULT_ROWS_PER_BLOCK
            }
        );
    }

    #[test]
    fn open_garbage_fails() -> anyhow::Result<()> {
        let tmp_dir = TempDir::new("georaster_test")?;
        let path = tmp_dir.path().join("garbage.tif");
        std::fs::write(&path, b"definitely not a tiff")?;
        assert!(GdalCodec::new().open(&path).is_err());
        Ok(())
    }
}
