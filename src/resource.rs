//! Windowed, block-aligned access to persisted rasters.
//!
//! A [`TiledBlockResource`] binds to exactly one store,
//! either for reading ([`open`]) or for writing
//! ([`create`]), and then moves windows of samples between
//! `ndarray` buffers and the store. It is not meant to be
//! shared across threads: tasks working on the same raster
//! each bind their own resource.
//!
//! [`open`]: BlockImageResource::open
//! [`create`]: BlockImageResource::create
use log::{debug, info};
use ndarray::{Array3, ArrayView3, ArrayViewMut3};
use std::path::{Path, PathBuf};

use crate::blocks::{BlockGeometry, DEFAULT_TILE_SIZE};
use crate::channels::ChannelLabelTable;
use crate::codec::{BlockCodec, Layout, StoreHeader, StoreReader, StoreWriter};
use crate::format::{ElementType, PixelKind, RasterFormat, Sample};
use crate::geometry::{window_within, RasterWindow};
use crate::georef::GeoMetadata;
use crate::{Error, Result};

/// Block-oriented access to one persisted raster.
pub trait BlockImageResource {
    /// Bind to an existing store for reading.
    fn open(&mut self, path: &Path) -> Result<()>;

    /// Bind to a new store for writing. The store has
    /// `max(format.planes, format.pixel_kind.channels())`
    /// planes.
    fn create(&mut self, path: &Path, format: &RasterFormat) -> Result<()>;

    fn format(&self) -> Result<RasterFormat>;

    /// Block geometry of the bound store. Reads and writes
    /// of a tiled store must start on a block corner.
    fn native_block_size(&self) -> Result<BlockGeometry>;

    /// Fill `dest`, of shape `(planes, height, width)`, with
    /// the samples of window `win`. Plane `i` holds the
    /// channel labelled `labels()[i]`.
    fn read<T: Sample>(&self, dest: ArrayViewMut3<T>, win: RasterWindow) -> Result<()>;

    /// Store `src`, of shape `(planes, height, width)`, as
    /// the samples of window `win`.
    fn write<T: Sample>(&mut self, src: ArrayView3<T>, win: RasterWindow) -> Result<()>;

    /// Release the store. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Read window `win` into a new array.
    fn read_window<T: Sample>(&self, win: RasterWindow) -> Result<Array3<T>> {
        let planes = self.format()?.planes;
        let (_, (w, h)) = win;
        let mut out = Array3::default((planes, h, w));
        self.read(out.view_mut(), win)?;
        Ok(out)
    }
}

enum State<C: BlockCodec> {
    Unbound,
    Read {
        reader: C::Reader,
        geometry: BlockGeometry,
    },
    Write {
        writer: C::Writer,
        path: PathBuf,
        header: StoreHeader,
        geometry: BlockGeometry,
        written: bool,
        /// Replayed when the store is recreated.
        geo: Option<GeoMetadata>,
    },
    Closed,
}

/// A [`BlockImageResource`] over any [`BlockCodec`]
/// backend, supporting tiled and scanline layouts.
pub struct TiledBlockResource<C: BlockCodec> {
    codec: C,
    state: State<C>,
    format: Option<RasterFormat>,
    labels: ChannelLabelTable,
}

/// Constructors
impl<C: BlockCodec> TiledBlockResource<C> {
    /// An unbound resource using `codec`.
    pub fn new(codec: C) -> Self {
        TiledBlockResource {
            codec,
            state: State::Unbound,
            format: None,
            labels: ChannelLabelTable::from_store::<&str>(&[]),
        }
    }

    /// Shorthand for `new` followed by `open`.
    pub fn open_with<P: AsRef<Path>>(codec: C, path: P) -> Result<Self> {
        let mut res = TiledBlockResource::new(codec);
        res.open(path.as_ref())?;
        Ok(res)
    }

    /// Shorthand for `new` followed by `create`.
    pub fn create_with<P: AsRef<Path>>(codec: C, path: P, format: &RasterFormat) -> Result<Self> {
        let mut res = TiledBlockResource::new(codec);
        res.create(path.as_ref(), format)?;
        Ok(res)
    }
}

/// Layout selection
impl<C: BlockCodec> TiledBlockResource<C> {
    /// Store the raster in `width` x `height` tiles.
    /// `random_order` hints that tiles may be written in
    /// any order. Only valid before the first write.
    pub fn set_tiled_layout(&mut self, width: usize, height: usize, random_order: bool) -> Result<()> {
        BlockGeometry::tiled(width, height)?;
        self.relayout(Layout::Tiled {
            width,
            height,
            random_order,
        })
    }

    /// Store the raster in runs of `rows_per_block`
    /// full-width scanlines. Only valid before the first
    /// write.
    pub fn set_scanline_layout(&mut self, rows_per_block: usize) -> Result<()> {
        if rows_per_block < 1 {
            return Err(Error::Argument("scanline runs must be at least one row".into()));
        }
        self.relayout(Layout::Scanline { rows_per_block })
    }

    fn relayout(&mut self, layout: Layout) -> Result<()> {
        // The store is recreated with the new layout; the
        // resource stays closed if that fails.
        let (writer, path, mut header, geo) = match std::mem::replace(&mut self.state, State::Closed) {
            State::Write {
                writer,
                path,
                header,
                written: false,
                geo,
                ..
            } => (writer, path, header, geo),
            other => {
                let msg = match other {
                    State::Write { .. } => "layout cannot change after data has been written",
                    _ => "layout can only be set on a created resource",
                };
                self.state = other;
                return Err(Error::Logic(msg.into()));
            }
        };
        writer
            .finish()
            .map_err(|e| Error::backend(&format!("releasing {}", path.display()), e))?;

        header.layout = layout;
        let geometry = layout
            .geometry(header.cols)
            .map_err(|e| Error::Io(e.to_string()))?;
        let mut writer = self
            .codec
            .create(&path, &header)
            .map_err(|e| Error::backend(&format!("recreating {}", path.display()), e))?;
        if let Some(meta) = &geo {
            writer
                .set_geo_metadata(meta)
                .map_err(|e| Error::backend("writing georeference", e))?;
        }
        debug!("{}: layout set to {:?}", path.display(), layout);

        self.state = State::Write {
            writer,
            path,
            header,
            geometry,
            written: false,
            geo,
        };
        Ok(())
    }
}

/// Accessors
impl<C: BlockCodec> TiledBlockResource<C> {
    pub fn cols(&self) -> Result<usize> {
        Ok(self.format()?.cols)
    }

    pub fn rows(&self) -> Result<usize> {
        Ok(self.format()?.rows)
    }

    pub fn planes(&self) -> Result<usize> {
        Ok(self.format()?.planes)
    }

    /// Channel label of each plane. Empty until bound.
    pub fn labels(&self) -> &ChannelLabelTable {
        &self.labels
    }

    /// Georeference stored with the raster, if any. Only
    /// available when bound for reading.
    pub fn geo_metadata(&self) -> Result<Option<GeoMetadata>> {
        match &self.state {
            State::Read { reader, .. } => reader
                .geo_metadata()
                .map_err(|e| Error::backend("reading georeference", e)),
            _ => Err(Error::Logic(
                "georeference can only be read from an opened resource".into(),
            )),
        }
    }

    /// Store a georeference with the raster. Only available
    /// when bound for writing.
    pub fn set_geo_metadata(&mut self, meta: &GeoMetadata) -> Result<()> {
        match &mut self.state {
            State::Write { writer, geo, .. } => {
                writer
                    .set_geo_metadata(meta)
                    .map_err(|e| Error::backend("writing georeference", e))?;
                *geo = Some(meta.clone());
                Ok(())
            }
            _ => Err(Error::Logic(
                "georeference can only be written to a created resource".into(),
            )),
        }
    }

    fn check_unbound(&self) -> Result<()> {
        match self.state {
            State::Unbound => Ok(()),
            State::Closed => Err(Error::Logic("a closed resource cannot be rebound".into())),
            _ => Err(Error::Logic("resource is already bound".into())),
        }
    }

    /// Validates `win` against the bound raster and a
    /// buffer of shape `dim`.
    fn check_window(
        &self,
        geometry: &BlockGeometry,
        win: RasterWindow,
        dim: (usize, usize, usize),
    ) -> Result<()> {
        let format = self.format()?;
        let (_, (w, h)) = win;
        if w == 0 || h == 0 {
            return Err(Error::Argument(format!("empty window {:?}", win)));
        }
        if !window_within(win, format.dims()) {
            return Err(Error::Argument(format!(
                "window {:?} exceeds raster of {}x{}",
                win, format.cols, format.rows
            )));
        }
        if dim != (format.planes, h, w) {
            return Err(Error::Argument(format!(
                "buffer of shape {:?} does not fit window {:?} of {} planes",
                dim, win, format.planes
            )));
        }
        geometry.check_aligned(win)
    }
}

impl<C: BlockCodec> BlockImageResource for TiledBlockResource<C> {
    fn open(&mut self, path: &Path) -> Result<()> {
        self.check_unbound()?;

        let reader = self
            .codec
            .open(path)
            .map_err(|e| Error::backend(&format!("could not open {}", path.display()), e))?;
        let header = reader.header().clone();
        let geometry = header
            .layout
            .geometry(header.cols)
            .map_err(|e| Error::Io(format!("{}: bad block layout: {}", path.display(), e)))?;
        let format = RasterFormat::new(
            header.cols,
            header.rows,
            header.channels.len(),
            ElementType::F32,
            PixelKind::Scalar,
        )
        .map_err(|e| Error::Io(format!("{}: bad header: {}", path.display(), e)))?;

        info!(
            "opened {} ({}x{}, {} planes, {:?})",
            path.display(),
            format.cols,
            format.rows,
            format.planes,
            header.layout
        );
        self.labels = ChannelLabelTable::from_store(&header.channels);
        self.format = Some(format);
        self.state = State::Read { reader, geometry };
        Ok(())
    }

    fn create(&mut self, path: &Path, format: &RasterFormat) -> Result<()> {
        self.check_unbound()?;

        let channels = format.pixel_kind.channels();
        if format.planes > 1 && channels > 1 {
            return Err(Error::NotImplemented(format!(
                "{} planes of {:?} pixels: a raster is either multi-plane or multi-channel",
                format.planes, format.pixel_kind
            )));
        }
        let planes = format.planes.max(channels);
        let labels = ChannelLabelTable::for_pixel_kind(format.pixel_kind, planes)?;
        if format.element_type != ElementType::F32 {
            debug!(
                "{}: {:?} samples are stored as F32",
                path.display(),
                format.element_type
            );
        }

        let header = StoreHeader {
            cols: format.cols,
            rows: format.rows,
            channels: labels.labels().to_vec(),
            layout: Layout::Tiled {
                width: DEFAULT_TILE_SIZE,
                height: DEFAULT_TILE_SIZE,
                random_order: false,
            },
        };
        let geometry = header.layout.geometry(header.cols)?;
        let writer = self
            .codec
            .create(path, &header)
            .map_err(|e| Error::backend(&format!("could not create {}", path.display()), e))?;

        info!(
            "created {} ({}x{}, {} planes)",
            path.display(),
            format.cols,
            format.rows,
            planes
        );
        self.labels = labels;
        self.format = Some(RasterFormat {
            planes,
            element_type: ElementType::F32,
            ..*format
        });
        self.state = State::Write {
            writer,
            path: path.to_owned(),
            header,
            geometry,
            written: false,
            geo: None,
        };
        Ok(())
    }

    fn format(&self) -> Result<RasterFormat> {
        match (&self.state, self.format) {
            (State::Read { .. }, Some(f)) | (State::Write { .. }, Some(f)) => Ok(f),
            _ => Err(Error::Logic("resource is not bound".into())),
        }
    }

    fn native_block_size(&self) -> Result<BlockGeometry> {
        match &self.state {
            State::Read { geometry, .. } | State::Write { geometry, .. } => Ok(*geometry),
            _ => Err(Error::Logic("resource is not bound".into())),
        }
    }

    fn read<T: Sample>(&self, mut dest: ArrayViewMut3<T>, win: RasterWindow) -> Result<()> {
        let (reader, geometry) = match &self.state {
            State::Read { reader, geometry } => (reader, geometry),
            State::Write { .. } => {
                return Err(Error::Logic("resource is bound for writing".into()))
            }
            _ => return Err(Error::Logic("read from an unbound resource".into())),
        };
        self.check_window(geometry, win, dest.dim())?;

        let region = geometry.region(win);
        debug!("reading window {:?} ({} blocks: {:?})", win, region.len(), region);

        let mut staging = Array3::<f32>::zeros(dest.dim());
        reader
            .read_region(&region, win, self.labels.labels(), &mut staging)
            .map_err(|e| Error::backend(&format!("reading window {:?}", win), e))?;
        dest.zip_mut_with(&staging, |d, s| *d = T::from_f32(*s));
        Ok(())
    }

    fn write<T: Sample>(&mut self, src: ArrayView3<T>, win: RasterWindow) -> Result<()> {
        let geometry = match &self.state {
            State::Write { geometry, .. } => *geometry,
            State::Read { .. } => {
                return Err(Error::Logic("resource is bound for reading".into()))
            }
            _ => return Err(Error::Logic("write to an unbound resource".into())),
        };
        self.check_window(&geometry, win, src.dim())?;

        let region = geometry.region(win);
        debug!("writing window {:?} ({} blocks: {:?})", win, region.len(), region);

        let staging = src.mapv(T::to_f32);
        if let State::Write { writer, written, .. } = &mut self.state {
            writer
                .write_region(&region, win, self.labels.labels(), &staging)
                .map_err(|e| Error::backend(&format!("writing window {:?}", win), e))?;
            *written = true;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Unbound => {
                self.state = State::Unbound;
                Ok(())
            }
            State::Read { .. } | State::Closed => Ok(()),
            State::Write { writer, path, .. } => {
                info!("closing {}", path.display());
                writer
                    .finish()
                    .map_err(|e| Error::backend(&format!("could not finish {}", path.display()), e))
            }
        }
    }
}
