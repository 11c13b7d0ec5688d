//! Georeferenced raster helpers.
//!
//! Thin wrappers pairing a [`GeoReference`] with a
//! [`TiledBlockResource`]: the georeference travels as
//! store-level metadata, and pixels are moved one native
//! block at a time.
use log::debug;
use ndarray::{s, Array3, ArrayView3};
use std::path::Path;

use crate::codec::BlockCodec;
use crate::format::{PixelKind, RasterFormat, Sample};
use crate::georef::GeoReference;
use crate::resource::{BlockImageResource, TiledBlockResource};
use crate::{Error, Result};

/// Load the georeference stored with an opened resource
/// into `georef`. Returns `false`, leaving `georef`
/// untouched, if the store carries none.
pub fn read_georeference<C: BlockCodec>(
    georef: &mut GeoReference,
    res: &TiledBlockResource<C>,
) -> Result<bool> {
    match res.geo_metadata()? {
        Some(meta) => {
            *georef = GeoReference::from_metadata(&meta)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Store `georef` with a created resource.
pub fn write_georeference<C: BlockCodec>(
    res: &mut TiledBlockResource<C>,
    georef: &GeoReference,
) -> Result<()> {
    res.set_geo_metadata(&georef.to_metadata())
}

/// Read a whole raster and its georeference. A store
/// without one yields the default georeference.
pub fn read_georeferenced_image<T: Sample, C: BlockCodec>(
    codec: C,
    path: &Path,
) -> Result<(Array3<T>, GeoReference)> {
    let mut res = TiledBlockResource::open_with(codec, path)?;
    let mut georef = GeoReference::new();
    if !read_georeference(&mut georef, &res)? {
        debug!("{}: no georeference stored", path.display());
    }

    let format = res.format()?;
    let geometry = res.native_block_size()?;
    let mut image = Array3::default((format.planes, format.rows, format.cols));
    for win in geometry.windows(format.dims()) {
        let ((x, y), (w, h)) = win;
        let (x, y) = (x as usize, y as usize);
        res.read(image.slice_mut(s![.., y..y + h, x..x + w]), win)?;
    }
    res.close()?;
    Ok((image, georef))
}

/// Write `image`, of shape `(planes, rows, cols)`, as a
/// raster of `pixel_kind` pixels georeferenced by
/// `georef`. Color pixel kinds need exactly as many planes
/// as the kind has channels.
pub fn write_georeferenced_image<T: Sample, C: BlockCodec>(
    codec: C,
    path: &Path,
    image: ArrayView3<T>,
    pixel_kind: PixelKind,
    georef: &GeoReference,
) -> Result<()> {
    let (planes, rows, cols) = image.dim();
    let format = match pixel_kind {
        PixelKind::Scalar => RasterFormat::new(cols, rows, planes, T::ELEMENT_TYPE, pixel_kind)?,
        _ if planes == pixel_kind.channels() => {
            RasterFormat::new(cols, rows, 1, T::ELEMENT_TYPE, pixel_kind)?
        }
        _ => {
            return Err(Error::Argument(format!(
                "{:?} pixels need {} planes, got {}",
                pixel_kind,
                pixel_kind.channels(),
                planes
            )))
        }
    };

    let mut res = TiledBlockResource::create_with(codec, path, &format)?;
    write_georeference(&mut res, georef)?;

    let geometry = res.native_block_size()?;
    for win in geometry.windows(format.dims()) {
        let ((x, y), (w, h)) = win;
        let (x, y) = (x as usize, y as usize);
        res.write(image.slice(s![.., y..y + h, x..x + w]), win)?;
    }
    res.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::memory::MemoryCodec;
    use crate::codec::Layout;
    use crate::geometry::Loc;
    use approx::assert_abs_diff_eq;
    use nalgebra::Matrix3;
    use ndarray::{Array, Array2};

    fn utm_georef() -> GeoReference {
        let mut georef = GeoReference::new();
        georef
            .set_transform(Matrix3::new(
                10., 0., 440000., 0., -10., 4650000., 0., 0., 1.,
            ))
            .unwrap();
        georef.set_UTM(31, true).unwrap();
        georef
    }

    #[test]
    fn rgb_image_round_trip() {
        let codec = MemoryCodec::new();
        let path = Path::new("rgb.tif");
        let image = Array::from_shape_fn((3, 5, 7), |(p, r, c)| (p * 100 + r * 7 + c) as u16);
        let georef = utm_georef();

        write_georeferenced_image(codec.clone(), path, image.view(), PixelKind::Rgb, &georef)
            .unwrap();
        // Lexically ordered in the store.
        assert_eq!(codec.plane(path, "B").unwrap()[(0, 0)], 200.);

        let (back, back_ref) = read_georeferenced_image::<u16, _>(codec, path).unwrap();
        assert_eq!(back, image);
        assert!(back_ref.is_projected());
        assert_eq!(back_ref.transform(), georef.transform());

        let pix = Loc::new(3., 4.);
        let a = georef.pixel_to_lonlat(pix).unwrap();
        let b = back_ref.pixel_to_lonlat(pix).unwrap();
        assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-9);
        assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-9);
    }

    #[test]
    fn multi_block_read() {
        let codec = MemoryCodec::new();
        let plane = Array2::from_shape_fn((10, 9), |(r, c)| (r * 9 + c) as f32);
        codec
            .insert(
                "tiles",
                Layout::Tiled {
                    width: 4,
                    height: 4,
                    random_order: false,
                },
                vec![("Channel0".into(), plane.clone())],
            )
            .unwrap();

        let mut georef = utm_georef();
        let (image, got) = read_georeferenced_image::<f32, _>(codec.clone(), Path::new("tiles")).unwrap();
        assert_eq!(image.index_axis(ndarray::Axis(0), 0), plane);
        assert!(!got.is_projected());
        // 3 x 3 tiles.
        assert_eq!(codec.stats("tiles").unwrap().decodes, 9);

        let res = TiledBlockResource::open_with(codec, "tiles").unwrap();
        assert!(!read_georeference(&mut georef, &res).unwrap());
        assert!(georef.is_projected());
    }

    #[test]
    fn color_kinds_need_matching_planes() {
        let image = Array3::<u8>::zeros((2, 4, 4));
        let err = write_georeferenced_image(
            MemoryCodec::new(),
            Path::new("x"),
            image.view(),
            PixelKind::Rgba,
            &GeoReference::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
    }
}
