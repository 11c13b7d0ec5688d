//! Mapping from image coordinates to projected and
//! geographic coordinates.
//!
//! A [`GeoReference`] composes three pieces of state:
//!
//! - an affine transform from pixel to projected
//! coordinates, together with the [`PixelConvention`]
//! that fixes what an integer pixel coordinate denotes;
//!
//! - a [`Datum`];
//!
//! - a [`Projection`] between geographic and projected
//! coordinates.
//!
//! Derived state (the convention-shifted "native"
//! transform, its inverse, and the projection context) is
//! rebuilt by every setter before it returns, so the
//! conversion methods only read. A failure to build the
//! projection context is kept and reported by the
//! geographic conversions, which are the only operations
//! that need it.
use serde_derive::{Deserialize, Serialize};
use std::fmt;

use crate::datum::Datum;
use crate::geometry::{
    transform_from_gdal, transform_to_gdal, Bounds, BoundsExt, Loc, PixelTransform, RasterDims,
    RasterWindow,
};
use crate::projection::{ProjContext, Projection};
use crate::transform::{AffineTransform, PixelConvention};
use crate::{Error, Result};

pub struct GeoReference {
    transform: AffineTransform,
    native: AffineTransform,
    convention: PixelConvention,
    datum: Datum,
    projection: Projection,
    context: std::result::Result<Option<ProjContext>, String>,
}

/// Store-level representation of a [`GeoReference`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoMetadata {
    /// Affine transform in GDAL order `[c, a, b, f, d, e]`.
    pub transform: [f64; 6],
    pub convention: PixelConvention,
    /// Full proj4 string: projection and datum terms.
    pub proj4: String,
}

/// Constructors
impl GeoReference {
    /// Identity transform, WGS84 datum, no projection.
    pub fn new() -> Self {
        GeoReference::with_datum(Datum::default())
    }

    pub fn with_datum(datum: Datum) -> Self {
        let mut georef = GeoReference {
            transform: AffineTransform::identity(),
            native: AffineTransform::identity(),
            convention: PixelConvention::default(),
            datum,
            projection: Projection::Geographic,
            context: Ok(None),
        };
        georef.rebuild_context();
        georef
    }

    pub fn with_transform(datum: Datum, transform: PixelTransform) -> Result<Self> {
        let mut georef = GeoReference::with_datum(datum);
        georef.set_transform(transform)?;
        Ok(georef)
    }

    /// Reconstruct from store-level metadata.
    pub fn from_metadata(meta: &GeoMetadata) -> Result<Self> {
        let (datum, projection) = Projection::parse_proj4(&meta.proj4)?;
        let mut georef = GeoReference::with_datum(datum.unwrap_or_default());
        georef.set_pixel_convention(meta.convention)?;
        georef.set_transform(transform_from_gdal(&meta.transform))?;
        georef.set_projection(projection)?;
        Ok(georef)
    }
}

impl Default for GeoReference {
    fn default() -> Self {
        GeoReference::new()
    }
}

/// Setters. Each one rebuilds all derived state.
impl GeoReference {
    /// Replace the pixel to projected transform. Fails with
    /// [`Error::Argument`] if `transform` is singular or not
    /// affine; `self` is unchanged in that case.
    pub fn set_transform(&mut self, transform: PixelTransform) -> Result<()> {
        let transform = AffineTransform::new(transform)?;
        let native = transform.shifted(self.convention)?;
        self.transform = transform;
        self.native = native;
        Ok(())
    }

    pub fn set_pixel_convention(&mut self, convention: PixelConvention) -> Result<()> {
        self.native = self.transform.shifted(convention)?;
        self.convention = convention;
        Ok(())
    }

    /// Replace the datum. The transform is untouched.
    pub fn set_datum(&mut self, datum: Datum) {
        self.datum = datum;
        self.rebuild_context();
    }

    /// Set the datum by name; see [`Datum::well_known`].
    pub fn set_well_known_geogcs(&mut self, name: &str) -> Result<()> {
        self.set_datum(Datum::well_known(name)?);
        Ok(())
    }

    /// Replace the projection configuration. `Utm` zones
    /// outside `1..=60` fail with [`Error::Argument`].
    pub fn set_projection(&mut self, projection: Projection) -> Result<()> {
        if let Projection::Utm { zone, north } = projection {
            Projection::utm(zone as i32, north)?;
        }
        self.projection = projection;
        self.rebuild_context();
        Ok(())
    }

    pub fn set_geographic(&mut self) {
        self.replace_projection(Projection::Geographic);
    }

    pub fn set_sinusoidal(&mut self, center_longitude: f64, false_easting: f64, false_northing: f64) {
        self.replace_projection(Projection::Sinusoidal {
            center_longitude,
            false_easting,
            false_northing,
        });
    }

    pub fn set_mercator(
        &mut self,
        center_latitude: f64,
        center_longitude: f64,
        latitude_of_true_scale: f64,
        false_easting: f64,
        false_northing: f64,
    ) {
        self.replace_projection(Projection::Mercator {
            center_latitude,
            center_longitude,
            latitude_of_true_scale,
            false_easting,
            false_northing,
        });
    }

    pub fn set_transverse_mercator(
        &mut self,
        center_latitude: f64,
        center_longitude: f64,
        scale: f64,
        false_easting: f64,
        false_northing: f64,
    ) {
        self.replace_projection(Projection::TransverseMercator {
            center_latitude,
            center_longitude,
            scale,
            false_easting,
            false_northing,
        });
    }

    pub fn set_orthographic(
        &mut self,
        center_latitude: f64,
        center_longitude: f64,
        false_easting: f64,
        false_northing: f64,
    ) {
        self.replace_projection(Projection::Orthographic {
            center_latitude,
            center_longitude,
            false_easting,
            false_northing,
        });
    }

    pub fn set_stereographic(
        &mut self,
        center_latitude: f64,
        center_longitude: f64,
        scale: f64,
        false_easting: f64,
        false_northing: f64,
    ) {
        self.replace_projection(Projection::Stereographic {
            center_latitude,
            center_longitude,
            scale,
            false_easting,
            false_northing,
        });
    }

    pub fn set_oblique_stereographic(
        &mut self,
        center_latitude: f64,
        center_longitude: f64,
        scale: f64,
        false_easting: f64,
        false_northing: f64,
    ) {
        self.replace_projection(Projection::ObliqueStereographic {
            center_latitude,
            center_longitude,
            scale,
            false_easting,
            false_northing,
        });
    }

    pub fn set_lambert_azimuthal(
        &mut self,
        center_latitude: f64,
        center_longitude: f64,
        false_easting: f64,
        false_northing: f64,
    ) {
        self.replace_projection(Projection::LambertAzimuthal {
            center_latitude,
            center_longitude,
            false_easting,
            false_northing,
        });
    }

    pub fn set_lambert_conformal(
        &mut self,
        std_parallel_1: f64,
        std_parallel_2: f64,
        center_latitude: f64,
        center_longitude: f64,
        false_easting: f64,
        false_northing: f64,
    ) {
        self.replace_projection(Projection::LambertConformal {
            std_parallel_1,
            std_parallel_2,
            center_latitude,
            center_longitude,
            false_easting,
            false_northing,
        });
    }

    #[allow(non_snake_case)]
    pub fn set_UTM(&mut self, zone: i32, north: bool) -> Result<()> {
        let projection = Projection::utm(zone, north)?;
        self.replace_projection(projection);
        Ok(())
    }

    /// Use raw proj4 projection terms. The datum terms are
    /// still generated from the current [`Datum`].
    pub fn set_proj4_projection_str(&mut self, s: &str) {
        self.replace_projection(Projection::Proj4(s.into()));
    }

    fn replace_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.rebuild_context();
    }

    fn rebuild_context(&mut self) {
        self.context = if self.projection.is_projected() {
            ProjContext::new(&self.projection, &self.datum)
                .map(Some)
                .map_err(|e| e.to_string())
        } else {
            Ok(None)
        };
        if let Err(e) = &self.context {
            log::warn!("projection context unavailable: {}", e);
        }
    }
}

/// Getters
impl GeoReference {
    /// The raw (unshifted) pixel to projected transform.
    pub fn transform(&self) -> &PixelTransform {
        self.transform.matrix()
    }

    pub fn pixel_convention(&self) -> PixelConvention {
        self.convention
    }

    pub fn datum(&self) -> &Datum {
        &self.datum
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// True iff a projection other than geographic is
    /// configured.
    pub fn is_projected(&self) -> bool {
        self.projection.is_projected()
    }

    /// Full proj4 string: projection and datum.
    pub fn proj4_str(&self) -> String {
        format!("{} {}", self.projection.proj4_str(), self.datum.proj4_str())
    }

    pub fn to_metadata(&self) -> GeoMetadata {
        GeoMetadata {
            transform: transform_to_gdal(self.transform.matrix()),
            convention: self.convention,
            proj4: self.proj4_str(),
        }
    }
}

/// Coordinate conversions
impl GeoReference {
    /// Position of pixel `pix` in projected space.
    pub fn pixel_to_point(&self, pix: Loc) -> Loc {
        self.native.apply(&pix)
    }

    /// Pixel coordinates of projected location `loc`.
    pub fn point_to_pixel(&self, loc: Loc) -> Loc {
        self.native.apply_inverse(&loc)
    }

    /// Projected location to (lon, lat) in degrees. The
    /// identity if no projection is configured.
    pub fn point_to_lonlat(&self, loc: Loc) -> Result<Loc> {
        match self.context()? {
            Some(ctx) => ctx.inverse(&loc),
            None => Ok(loc),
        }
    }

    /// (lon, lat) in degrees to projected location. The
    /// identity if no projection is configured.
    pub fn lonlat_to_point(&self, lonlat: Loc) -> Result<Loc> {
        match self.context()? {
            Some(ctx) => ctx.forward(&lonlat),
            None => Ok(lonlat),
        }
    }

    pub fn pixel_to_lonlat(&self, pix: Loc) -> Result<Loc> {
        self.point_to_lonlat(self.pixel_to_point(pix))
    }

    pub fn lonlat_to_pixel(&self, lonlat: Loc) -> Result<Loc> {
        Ok(self.point_to_pixel(self.lonlat_to_point(lonlat)?))
    }

    /// Bounds in projected space of the pixel window `win`,
    /// with pixels treated as unit cells under the
    /// configured convention.
    pub fn pixel_bounds(&self, win: RasterWindow) -> Bounds {
        let ((x, y), (w, h)) = win;
        let (x, y) = (x as f64 - 0.5, y as f64 - 0.5);
        let (w, h) = (w as f64, h as f64);
        corners_bounds(
            [(x, y), (x + w, y), (x, y + h), (x + w, y + h)]
                .iter()
                .map(|&(px, py)| self.pixel_to_point(Loc::new(px, py))),
        )
    }

    /// Smallest window of a raster of dimension `dim`
    /// containing every pixel cell that meets the
    /// projected-space `bounds`.
    pub fn pixel_window(&self, bounds: Bounds, dim: RasterDims) -> RasterWindow {
        let (min, max) = (bounds.min(), bounds.max());
        let cells = corners_bounds(
            [(min.x, min.y), (max.x, min.y), (min.x, max.y), (max.x, max.y)]
                .iter()
                .map(|&(qx, qy)| self.point_to_pixel(Loc::new(qx, qy)))
                .map(|p| Loc::new(snap(p.x + 0.5), snap(p.y + 0.5))),
        );
        cells.window_from_bounds(dim)
    }

    fn context(&self) -> Result<Option<&ProjContext>> {
        match &self.context {
            Ok(ctx) => Ok(ctx.as_ref()),
            Err(e) => Err(Error::Runtime(e.clone())),
        }
    }
}

/// Round values within floating-point noise of an integer,
/// so cell edges do not spill into the next pixel.
fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < 1e-9 {
        r
    } else {
        v
    }
}

fn corners_bounds<I: Iterator<Item = Loc>>(corners: I) -> Bounds {
    let (mut lo, mut hi) = (
        Loc::new(f64::INFINITY, f64::INFINITY),
        Loc::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
    );
    for c in corners {
        lo = Loc::new(lo.x.min(c.x), lo.y.min(c.y));
        hi = Loc::new(hi.x.max(c.x), hi.y.max(c.y));
    }
    Bounds::new((lo.x, lo.y), (hi.x, hi.y))
}

impl Clone for GeoReference {
    fn clone(&self) -> Self {
        let mut georef = GeoReference {
            transform: self.transform,
            native: self.native,
            convention: self.convention,
            datum: self.datum.clone(),
            projection: self.projection.clone(),
            context: Ok(None),
        };
        georef.rebuild_context();
        georef
    }
}

impl fmt::Debug for GeoReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("GeoReference")
            .field("transform", self.transform.matrix())
            .field("convention", &self.convention)
            .field("datum", &self.datum)
            .field("projection", &self.projection)
            .finish()
    }
}

impl fmt::Display for GeoReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "-- Proj.4 Geospatial Reference Object --")?;
        writeln!(f, "\tTransform  : {:?}", transform_to_gdal(self.transform.matrix()))?;
        writeln!(f, "\tConvention : {}", self.convention.as_str())?;
        writeln!(f, "\t{}", self.datum)?;
        writeln!(f, "\tProj.4 String: {}", self.proj4_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector2};

    fn utm_transform() -> PixelTransform {
        Matrix3::new(30., 0., 399960., 0., -30., 5000040., 0., 0., 1.)
    }

    #[test]
    fn defaults() {
        let georef = GeoReference::new();
        assert_eq!(*georef.transform(), Matrix3::identity());
        assert_eq!(georef.datum(), &Datum::wgs84());
        assert!(!georef.is_projected());
        assert_eq!(georef.proj4_str(), "+proj=longlat +datum=WGS84");
    }

    #[test]
    fn pixel_round_trip_random_transforms() {
        use rand::*;
        let mut rng = thread_rng();
        let mut georef = GeoReference::new();

        for _ in 0..200 {
            let t: Matrix3<f64> = Matrix3::new(
                rng.gen_range(-100., 100.),
                rng.gen_range(-1., 1.),
                rng.gen_range(-1e6, 1e6),
                rng.gen_range(-1., 1.),
                rng.gen_range(-100., 100.),
                rng.gen_range(-1e6, 1e6),
                0.,
                0.,
                1.,
            );
            if t.determinant().abs() < 1e-3 {
                continue;
            }
            georef.set_transform(t).unwrap();
            let convention = if rng.gen() {
                PixelConvention::PixelAsArea
            } else {
                PixelConvention::PixelAsPoint
            };
            georef.set_pixel_convention(convention).unwrap();

            let p = Loc::new(rng.gen_range(-1e4, 1e4), rng.gen_range(-1e4, 1e4));
            let back = georef.point_to_pixel(georef.pixel_to_point(p));
            assert_relative_eq!(back.x, p.x, epsilon = 1e-6);
            assert_relative_eq!(back.y, p.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn convention_shift() {
        let mut georef = GeoReference::with_transform(Datum::wgs84(), utm_transform()).unwrap();
        let p = Loc::new(10., 20.);
        assert_eq!(georef.pixel_to_point(p), utm_transform().transform_point(&p));

        georef.set_pixel_convention(PixelConvention::PixelAsArea).unwrap();
        let shifted = utm_transform() * Matrix3::new_translation(&Vector2::new(0.5, 0.5));
        let q = georef.pixel_to_point(p);
        let expected = shifted.transform_point(&p);
        assert_relative_eq!(q.x, expected.x);
        assert_relative_eq!(q.y, expected.y);

        // Raw transform is not affected by the convention.
        assert_eq!(*georef.transform(), utm_transform());
    }

    #[test]
    fn singular_transform_leaves_state() {
        let mut georef = GeoReference::with_transform(Datum::wgs84(), utm_transform()).unwrap();
        let singular = Matrix3::new(1., 1., 0., 1., 1., 0., 0., 0., 1.);
        assert!(matches!(georef.set_transform(singular), Err(Error::Argument(_))));
        assert_eq!(*georef.transform(), utm_transform());
    }

    #[test]
    fn utm_validation() {
        let mut georef = GeoReference::new();
        assert!(matches!(georef.set_UTM(0, true), Err(Error::Argument(_))));
        assert!(matches!(georef.set_UTM(61, true), Err(Error::Argument(_))));
        assert!(!georef.is_projected());

        georef.set_UTM(31, true).unwrap();
        assert!(georef.is_projected());

        assert!(georef
            .set_projection(Projection::Utm { zone: 0, north: true })
            .is_err());
        assert!(georef.is_projected());
    }

    #[test]
    fn geographic_is_identity() {
        let georef = GeoReference::new();
        let q = Loc::new(12.5, -33.25);
        assert_eq!(georef.point_to_lonlat(q).unwrap(), q);
        assert_eq!(georef.lonlat_to_point(q).unwrap(), q);
    }

    #[test]
    fn projection_round_trip() {
        let mut georef = GeoReference::with_transform(Datum::wgs84(), utm_transform()).unwrap();
        georef.set_UTM(31, true).unwrap();

        let q = georef.pixel_to_point(Loc::new(1830., 1830.));
        let ll = georef.point_to_lonlat(q).unwrap();
        assert!(ll.x > 0. && ll.x < 6., "lon: {}", ll.x);
        assert!(ll.y > 40. && ll.y < 50., "lat: {}", ll.y);

        let back = georef.lonlat_to_point(ll).unwrap();
        assert_relative_eq!(back.x, q.x, epsilon = 1e-4);
        assert_relative_eq!(back.y, q.y, epsilon = 1e-4);

        let pix = georef.lonlat_to_pixel(ll).unwrap();
        assert_relative_eq!(pix.x, 1830., epsilon = 1e-6);
        assert_relative_eq!(pix.y, 1830., epsilon = 1e-6);
    }

    #[test]
    fn other_projections_round_trip() {
        let mut georef = GeoReference::new();
        let ll = Loc::new(10.5, 51.25);

        let configure: Vec<Box<dyn Fn(&mut GeoReference)>> = vec![
            Box::new(|g: &mut GeoReference| g.set_mercator(0., 0., 0., 0., 0.)),
            Box::new(|g: &mut GeoReference| g.set_transverse_mercator(0., 9., 0.9996, 500000., 0.)),
            Box::new(|g: &mut GeoReference| g.set_lambert_azimuthal(52., 10., 4321000., 3210000.)),
            Box::new(|g: &mut GeoReference| g.set_lambert_conformal(49., 56., 52., 10., 0., 0.)),
            Box::new(|g: &mut GeoReference| g.set_stereographic(90., 0., 0.994, 2000000., 2000000.)),
            Box::new(|g: &mut GeoReference| g.set_sinusoidal(0., 0., 0.)),
            Box::new(|g: &mut GeoReference| g.set_sinusoidal(-60., 1000., -2000.)),
            Box::new(|g: &mut GeoReference| g.set_orthographic(40., 0., 0., 0.)),
            Box::new(|g: &mut GeoReference| {
                g.set_oblique_stereographic(52.156, 5.387, 0.9999079, 155000., 463000.)
            }),
        ];
        for configure in configure {
            configure(&mut georef);
            assert!(georef.is_projected());

            let q = georef.lonlat_to_point(ll).unwrap();
            let back = georef.point_to_lonlat(q).unwrap();
            assert_relative_eq!(back.x, ll.x, epsilon = 1e-6);
            assert_relative_eq!(back.y, ll.y, epsilon = 1e-6);
        }

        georef.set_geographic();
        assert!(!georef.is_projected());
        assert_eq!(georef.lonlat_to_point(ll).unwrap(), ll);
    }

    #[test]
    fn datum_change_rebuilds_context() {
        let mut georef = GeoReference::new();
        georef.set_mercator(0., 0., 0., 0., 0.);
        let wgs = georef.lonlat_to_point(Loc::new(1., 0.)).unwrap();

        georef.set_datum(Datum::from_axes("sphere", 6370997., 6370997.).unwrap());
        let sphere = georef.lonlat_to_point(Loc::new(1., 0.)).unwrap();

        assert_relative_eq!(wgs.x, 6378137. * 1f64.to_radians(), epsilon = 1e-6);
        assert_relative_eq!(sphere.x, 6370997. * 1f64.to_radians(), epsilon = 1e-6);
        assert!(georef.proj4_str().ends_with("+a=6370997 +b=6370997"));
    }

    #[test]
    fn malformed_projection_is_runtime_error() {
        let mut georef = GeoReference::new();
        georef.set_proj4_projection_str("+proj=no_such_projection");
        assert!(georef.is_projected());
        assert!(matches!(
            georef.point_to_lonlat(Loc::new(0., 0.)),
            Err(Error::Runtime(_))
        ));
        // Pixel conversions do not need the context.
        assert_eq!(georef.pixel_to_point(Loc::new(1., 2.)), Loc::new(1., 2.));

        georef.set_geographic();
        assert!(georef.point_to_lonlat(Loc::new(0., 0.)).is_ok());
    }

    #[test]
    fn pixel_bounds_and_window() {
        let georef = GeoReference::with_transform(Datum::wgs84(), utm_transform()).unwrap();
        let b = georef.pixel_bounds(((0, 0), (10, 10)));
        assert_relative_eq!(b.min().x, 399960. - 15.);
        assert_relative_eq!(b.max().y, 5000040. + 15.);

        let win = georef.pixel_window(b, (100, 100));
        assert_eq!(win, ((0, 0), (10, 10)));

        let mut area = georef.clone();
        area.set_pixel_convention(PixelConvention::PixelAsArea).unwrap();
        let b = area.pixel_bounds(((2, 3), (4, 5)));
        assert_relative_eq!(b.min().x, 399960. + 60.);
        assert_relative_eq!(b.max().x, 399960. + 180.);
        assert_eq!(area.pixel_window(b, (100, 100)), ((2, 3), (4, 5)));
    }

    #[test]
    fn metadata_round_trip() {
        let mut georef = GeoReference::with_transform(Datum::wgs84(), utm_transform()).unwrap();
        georef.set_pixel_convention(PixelConvention::PixelAsArea).unwrap();
        georef.set_UTM(17, false).unwrap();

        let meta = georef.to_metadata();
        assert_eq!(meta.transform, [399960., 30., 0., 5000040., 0., -30.]);

        let back = GeoReference::from_metadata(&meta).unwrap();
        assert_eq!(back.projection(), &Projection::Utm { zone: 17, north: false });
        assert_eq!(back.pixel_convention(), PixelConvention::PixelAsArea);
        assert_eq!(back.transform(), georef.transform());
        assert_eq!(back.datum(), georef.datum());
    }

    #[test]
    fn metadata_keeps_datum_terms() {
        let proj4 = "+proj=sinu +lon_0=0 +x_0=0 +y_0=0 +units=m \
                     +ellps=intl +towgs84=-87,-98,-121,0,0,0,0";
        let meta = GeoMetadata {
            transform: [0., 463.3127165279165, 0., 0., 0., -463.3127165279165],
            convention: PixelConvention::PixelAsArea,
            proj4: proj4.into(),
        };
        let georef = GeoReference::from_metadata(&meta).unwrap();
        assert_eq!(georef.datum().semi_major_axis(), 6378388.);
        assert!(matches!(georef.projection(), Projection::Sinusoidal { .. }));
        assert_eq!(georef.to_metadata().proj4, proj4);

        let ll = georef.point_to_lonlat(Loc::new(1.0e6, 5.0e6)).unwrap();
        let back = georef.lonlat_to_point(ll).unwrap();
        assert_relative_eq!(back.x, 1.0e6, epsilon = 1e-4);
        assert_relative_eq!(back.y, 5.0e6, epsilon = 1e-4);
    }

    #[test]
    fn serializes_metadata() {
        let meta = GeoReference::new().to_metadata();
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["convention"], "PixelAsPoint");
        assert_eq!(json["proj4"], "+proj=longlat +datum=WGS84");
    }

    #[test]
    fn display_mentions_proj4() {
        let mut georef = GeoReference::new();
        georef.set_UTM(31, true).unwrap();
        let s = georef.to_string();
        assert!(s.contains("+proj=utm +zone=31"));
        assert!(s.contains("WGS_1984"));
    }
}
