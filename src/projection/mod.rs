//! Map projection configurations and the adapter over the
//! [`proj4rs`] geodesy backend.
//!
//! A [`Projection`] is pure configuration: it renders to
//! the projection part of a proj4 string. The datum part
//! comes from a [`Datum`]. A [`ProjContext`] is built from
//! both, and is the only place `proj4rs` errors are seen;
//! they leave this module as [`Error::Runtime`].
//!
//! Sinusoidal and orthographic maps are not provided by
//! `proj4rs`; those run on the [`native`] implementations.
use proj4rs::proj::Proj;
use serde_derive::{Deserialize, Serialize};

use crate::datum::{Datum, DATUM_KEYS};
use crate::geometry::Loc;
use crate::{Error, Result};

mod native;
use native::{DomainError, NativeProjection};

/// Supported projection configurations. Angles are in
/// degrees; false eastings and northings in metres.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// No projection: projected coordinates are (lon, lat).
    Geographic,
    Sinusoidal {
        center_longitude: f64,
        false_easting: f64,
        false_northing: f64,
    },
    Mercator {
        center_latitude: f64,
        center_longitude: f64,
        latitude_of_true_scale: f64,
        false_easting: f64,
        false_northing: f64,
    },
    TransverseMercator {
        center_latitude: f64,
        center_longitude: f64,
        scale: f64,
        false_easting: f64,
        false_northing: f64,
    },
    Orthographic {
        center_latitude: f64,
        center_longitude: f64,
        false_easting: f64,
        false_northing: f64,
    },
    Stereographic {
        center_latitude: f64,
        center_longitude: f64,
        scale: f64,
        false_easting: f64,
        false_northing: f64,
    },
    ObliqueStereographic {
        center_latitude: f64,
        center_longitude: f64,
        scale: f64,
        false_easting: f64,
        false_northing: f64,
    },
    LambertAzimuthal {
        center_latitude: f64,
        center_longitude: f64,
        false_easting: f64,
        false_northing: f64,
    },
    LambertConformal {
        std_parallel_1: f64,
        std_parallel_2: f64,
        center_latitude: f64,
        center_longitude: f64,
        false_easting: f64,
        false_northing: f64,
    },
    /// Universal Transverse Mercator; `zone` is in `1..=60`.
    Utm { zone: u8, north: bool },
    /// Raw proj4 projection terms, without datum terms.
    Proj4(String),
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Geographic
    }
}

/// Terms that carry no information for a projection
/// context.
const IGNORED_KEYS: &[&str] = &["no_defs", "wktext", "type"];

impl Projection {
    /// Validated UTM configuration.
    pub fn utm(zone: i32, north: bool) -> Result<Self> {
        if zone < 1 || zone > 60 {
            return Err(Error::Argument(format!(
                "UTM zone must be in [1, 60], got {}",
                zone
            )));
        }
        Ok(Projection::Utm {
            zone: zone as u8,
            north,
        })
    }

    /// True iff this configuration actually projects.
    pub fn is_projected(&self) -> bool {
        match self {
            Projection::Geographic => false,
            Projection::Proj4(s) => !is_geographic_str(s),
            _ => true,
        }
    }

    /// Render the projection part of a proj4 string.
    pub fn proj4_str(&self) -> String {
        use Projection::*;
        match self {
            Geographic => "+proj=longlat".into(),
            Sinusoidal {
                center_longitude,
                false_easting,
                false_northing,
            } => format!(
                "+proj=sinu +lon_0={} +x_0={} +y_0={} +units=m",
                center_longitude, false_easting, false_northing
            ),
            Mercator {
                center_latitude,
                center_longitude,
                latitude_of_true_scale,
                false_easting,
                false_northing,
            } => format!(
                "+proj=merc +lon_0={} +lat_0={} +lat_ts={} +x_0={} +y_0={} +units=m",
                center_longitude,
                center_latitude,
                latitude_of_true_scale,
                false_easting,
                false_northing
            ),
            TransverseMercator {
                center_latitude,
                center_longitude,
                scale,
                false_easting,
                false_northing,
            } => format!(
                "+proj=tmerc +lat_0={} +lon_0={} +k={} +x_0={} +y_0={} +units=m",
                center_latitude, center_longitude, scale, false_easting, false_northing
            ),
            Orthographic {
                center_latitude,
                center_longitude,
                false_easting,
                false_northing,
            } => format!(
                "+proj=ortho +lat_0={} +lon_0={} +x_0={} +y_0={} +units=m",
                center_latitude, center_longitude, false_easting, false_northing
            ),
            Stereographic {
                center_latitude,
                center_longitude,
                scale,
                false_easting,
                false_northing,
            } => format!(
                "+proj=stere +lat_0={} +lon_0={} +k={} +x_0={} +y_0={} +units=m",
                center_latitude, center_longitude, scale, false_easting, false_northing
            ),
            ObliqueStereographic {
                center_latitude,
                center_longitude,
                scale,
                false_easting,
                false_northing,
            } => format!(
                "+proj=sterea +lat_0={} +lon_0={} +k={} +x_0={} +y_0={} +units=m",
                center_latitude, center_longitude, scale, false_easting, false_northing
            ),
            LambertAzimuthal {
                center_latitude,
                center_longitude,
                false_easting,
                false_northing,
            } => format!(
                "+proj=laea +lat_0={} +lon_0={} +x_0={} +y_0={} +units=m",
                center_latitude, center_longitude, false_easting, false_northing
            ),
            LambertConformal {
                std_parallel_1,
                std_parallel_2,
                center_latitude,
                center_longitude,
                false_easting,
                false_northing,
            } => format!(
                "+proj=lcc +lat_1={} +lat_2={} +lat_0={} +lon_0={} +x_0={} +y_0={} +units=m",
                std_parallel_1,
                std_parallel_2,
                center_latitude,
                center_longitude,
                false_easting,
                false_northing
            ),
            Utm { zone, north } => {
                if *north {
                    format!("+proj=utm +zone={} +units=m", zone)
                } else {
                    format!("+proj=utm +zone={} +south +units=m", zone)
                }
            }
            Proj4(s) => s.trim().into(),
        }
    }

    /// Split a full proj4 string into its datum and
    /// projection parts. Geographic, UTM, sinusoidal and
    /// orthographic configurations are recognized; any other
    /// projection is kept as raw [`Projection::Proj4`] terms.
    pub fn parse_proj4(s: &str) -> Result<(Option<Datum>, Projection)> {
        let terms = proj4_terms(s)?;

        let datum = Datum::from_proj4_terms(
            terms
                .iter()
                .filter(|(k, _)| DATUM_KEYS.contains(k))
                .cloned(),
        )?;

        let rest: Vec<_> = terms
            .into_iter()
            .filter(|(k, _)| !DATUM_KEYS.contains(k) && !IGNORED_KEYS.contains(k))
            .collect();

        let lookup = |key: &str| rest.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);
        let projection = match lookup("proj").flatten() {
            Some("longlat") | Some("latlong") => Projection::Geographic,
            Some("utm") => {
                let zone = lookup("zone")
                    .flatten()
                    .and_then(|z| z.parse().ok())
                    .ok_or_else(|| Error::Argument(format!("UTM without a valid zone: \"{}\"", s)))?;
                Projection::utm(zone, lookup("south").is_none())?
            }
            Some(name @ "sinu") | Some(name @ "ortho") if only_keys(&rest, CENTERED_KEYS) => {
                let param = |key: &str| -> Result<f64> {
                    match lookup(key).flatten() {
                        Some(v) => v.parse().map_err(|_| {
                            Error::Argument(format!("invalid value for +{}: \"{}\"", key, v))
                        }),
                        None => Ok(0.),
                    }
                };
                if name == "sinu" {
                    Projection::Sinusoidal {
                        center_longitude: param("lon_0")?,
                        false_easting: param("x_0")?,
                        false_northing: param("y_0")?,
                    }
                } else {
                    Projection::Orthographic {
                        center_latitude: param("lat_0")?,
                        center_longitude: param("lon_0")?,
                        false_easting: param("x_0")?,
                        false_northing: param("y_0")?,
                    }
                }
            }
            Some(_) => Projection::Proj4(
                rest.iter()
                    .map(|(k, v)| match v {
                        Some(v) => format!("+{}={}", k, v),
                        None => format!("+{}", k),
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            None => {
                return Err(Error::Argument(format!(
                    "proj4 string without +proj: \"{}\"",
                    s
                )))
            }
        };

        Ok((datum, projection))
    }
}

/// Tokenize `+key=value` / `+flag` terms.
fn proj4_terms(s: &str) -> Result<Vec<(&str, Option<&str>)>> {
    s.split_whitespace()
        .map(|term| {
            let term = term
                .strip_prefix('+')
                .ok_or_else(|| Error::Argument(format!("malformed proj4 term \"{}\"", term)))?;
            let mut kv = term.splitn(2, '=');
            let key = kv.next().unwrap_or("");
            Ok((key, kv.next()))
        })
        .collect()
}

/// Terms understood by the centered projection variants.
const CENTERED_KEYS: &[&str] = &["proj", "lat_0", "lon_0", "x_0", "y_0", "units"];

fn only_keys(terms: &[(&str, Option<&str>)], keys: &[&str]) -> bool {
    terms.iter().all(|(k, v)| match *k {
        "units" => *v == Some("m"),
        k => keys.contains(&k),
    })
}

fn is_geographic_str(s: &str) -> bool {
    s.split_whitespace()
        .any(|t| t == "+proj=longlat" || t == "+proj=latlong")
}

/// Forward and inverse maps between geographic coordinates
/// (degrees) and a projected coordinate system, both over
/// the same datum.
pub struct ProjContext {
    backend: Backend,
    definition: String,
}

enum Backend {
    Proj4 { geographic: Proj, projected: Proj },
    Native(NativeProjection),
}

impl ProjContext {
    pub fn new(projection: &Projection, datum: &Datum) -> Result<Self> {
        let definition = format!("{} {}", projection.proj4_str(), datum.proj4_str());
        log::trace!("building projection context: {}", definition);

        if let Some(native) = NativeProjection::new(projection, datum) {
            return Ok(ProjContext {
                backend: Backend::Native(native),
                definition,
            });
        }

        let geographic = format!("+proj=longlat {}", datum.proj4_str());
        let geographic = Proj::from_proj_string(&geographic).map_err(|e| {
            Error::Runtime(format!("invalid datum \"{}\": {}", datum.proj4_str(), e))
        })?;
        let projected = Proj::from_proj_string(&definition)
            .map_err(|e| Error::Runtime(format!("invalid projection \"{}\": {}", definition, e)))?;

        Ok(ProjContext {
            backend: Backend::Proj4 {
                geographic,
                projected,
            },
            definition,
        })
    }

    /// The proj4 definition of the projected side.
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// (lon, lat) in degrees to projected coordinates.
    pub fn forward(&self, lonlat: &Loc) -> Result<Loc> {
        let input = (lonlat.x.to_radians(), lonlat.y.to_radians());
        let (x, y) = match &self.backend {
            Backend::Proj4 {
                geographic,
                projected,
            } => self.run(geographic, projected, input)?,
            Backend::Native(native) => native
                .forward(input.0, input.1)
                .map_err(|e| self.domain_error(lonlat, e))?,
        };
        self.check_finite(lonlat, (x, y))?;
        Ok(Loc::new(x, y))
    }

    /// Projected coordinates to (lon, lat) in degrees.
    pub fn inverse(&self, point: &Loc) -> Result<Loc> {
        let input = (point.x, point.y);
        let (lon, lat) = match &self.backend {
            Backend::Proj4 {
                geographic,
                projected,
            } => self.run(projected, geographic, input)?,
            Backend::Native(native) => native
                .inverse(input.0, input.1)
                .map_err(|e| self.domain_error(point, e))?,
        };
        self.check_finite(point, (lon, lat))?;
        Ok(Loc::new(lon.to_degrees(), lat.to_degrees()))
    }

    fn run(&self, src: &Proj, dst: &Proj, input: (f64, f64)) -> Result<(f64, f64)> {
        let mut pt = (input.0, input.1, 0.);
        proj4rs::transform::transform(src, dst, &mut pt).map_err(|e| {
            Error::Runtime(format!(
                "{}: transform of ({}, {}) failed: {}",
                self.definition, input.0, input.1, e
            ))
        })?;
        Ok((pt.0, pt.1))
    }

    fn domain_error(&self, input: &Loc, err: DomainError) -> Error {
        Error::Runtime(format!(
            "{}: transform of ({}, {}) failed: {}",
            self.definition, input.x, input.y, err
        ))
    }

    fn check_finite(&self, input: &Loc, out: (f64, f64)) -> Result<()> {
        if !out.0.is_finite() || !out.1.is_finite() {
            return Err(Error::Runtime(format!(
                "{}: ({}, {}) is outside the projection domain",
                self.definition, input.x, input.y
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn utm_zone_range() {
        assert!(matches!(Projection::utm(0, true), Err(Error::Argument(_))));
        assert!(matches!(Projection::utm(61, true), Err(Error::Argument(_))));
        assert_eq!(
            Projection::utm(31, false).unwrap().proj4_str(),
            "+proj=utm +zone=31 +south +units=m"
        );
    }

    #[test]
    fn projected_flag() {
        assert!(!Projection::Geographic.is_projected());
        assert!(!Projection::Proj4("+proj=longlat".into()).is_projected());
        assert!(Projection::Proj4("+proj=robin".into()).is_projected());
        assert!(Projection::utm(12, true).unwrap().is_projected());
    }

    #[test]
    fn parse_recognizes_utm_and_datum() {
        let (datum, proj) =
            Projection::parse_proj4("+proj=utm +zone=33 +south +datum=WGS84 +units=m +no_defs")
                .unwrap();
        assert_eq!(datum, Some(Datum::wgs84()));
        assert_eq!(proj, Projection::Utm { zone: 33, north: false });

        let (datum, proj) = Projection::parse_proj4("+proj=longlat +ellps=clrk66 +no_defs").unwrap();
        assert_eq!(datum.unwrap().name(), "North_American_Datum_1927");
        assert_eq!(proj, Projection::Geographic);
    }

    #[test]
    fn parse_keeps_other_projections_raw() {
        let (datum, proj) =
            Projection::parse_proj4("+proj=laea +lat_0=52 +lon_0=10 +x_0=4321000 +ellps=GRS80")
                .unwrap();
        assert_eq!(datum.unwrap().proj4_str(), "+ellps=GRS80");
        assert_eq!(
            proj,
            Projection::Proj4("+proj=laea +lat_0=52 +lon_0=10 +x_0=4321000".into())
        );

        assert!(Projection::parse_proj4("proj=merc").is_err());
        assert!(Projection::parse_proj4("+lon_0=3").is_err());
    }

    #[test]
    fn utm_context_round_trip() {
        let ctx = ProjContext::new(&Projection::utm(31, true).unwrap(), &Datum::wgs84()).unwrap();

        // Central meridian of zone 31 is 3E.
        let pt = ctx.forward(&Loc::new(3., 45.)).unwrap();
        assert_relative_eq!(pt.x, 500000., epsilon = 1e-3);
        assert!(pt.y > 4_900_000. && pt.y < 5_100_000., "northing: {}", pt.y);

        let ll = ctx.inverse(&pt).unwrap();
        assert_relative_eq!(ll.x, 3., epsilon = 1e-7);
        assert_relative_eq!(ll.y, 45., epsilon = 1e-7);
    }

    #[test]
    fn parse_recognizes_centered_projections() {
        let (datum, proj) =
            Projection::parse_proj4("+proj=sinu +lon_0=-60 +x_0=0 +y_0=0 +R=6371007.181 +units=m")
                .unwrap();
        assert_eq!(datum.unwrap().semi_major_axis(), 6371007.181);
        assert_eq!(
            proj,
            Projection::Sinusoidal {
                center_longitude: -60.,
                false_easting: 0.,
                false_northing: 0.,
            }
        );

        let (_, proj) = Projection::parse_proj4("+proj=ortho +lat_0=40 +lon_0=-100 +datum=WGS84").unwrap();
        assert_eq!(
            proj,
            Projection::Orthographic {
                center_latitude: 40.,
                center_longitude: -100.,
                false_easting: 0.,
                false_northing: 0.,
            }
        );

        // Terms outside the variant stay raw.
        let (_, proj) = Projection::parse_proj4("+proj=ortho +lat_0=40 +h=1000").unwrap();
        assert!(matches!(proj, Projection::Proj4(_)));
    }

    #[test]
    fn sinusoidal_and_orthographic_contexts() {
        let sinu = Projection::Sinusoidal {
            center_longitude: 10.,
            false_easting: 100.,
            false_northing: -50.,
        };
        let ctx = ProjContext::new(&sinu, &Datum::wgs84()).unwrap();
        assert_eq!(
            ctx.definition(),
            "+proj=sinu +lon_0=10 +x_0=100 +y_0=-50 +units=m +datum=WGS84"
        );
        let pt = ctx.forward(&Loc::new(20., 0.)).unwrap();
        assert_relative_eq!(pt.x, 6378137. * 10f64.to_radians() + 100., epsilon = 1e-6);
        assert_relative_eq!(pt.y, -50., epsilon = 1e-6);

        let ortho = Projection::Orthographic {
            center_latitude: 0.,
            center_longitude: 0.,
            false_easting: 0.,
            false_northing: 0.,
        };
        let ctx = ProjContext::new(&ortho, &Datum::wgs84()).unwrap();
        // Behind the globe.
        assert!(matches!(ctx.forward(&Loc::new(120., 0.)), Err(Error::Runtime(_))));
        assert!(matches!(ctx.inverse(&Loc::new(7e6, 0.)), Err(Error::Runtime(_))));
    }

    #[test]
    fn malformed_context_is_runtime_error() {
        let bogus = Projection::Proj4("+proj=no_such_projection".into());
        assert!(matches!(
            ProjContext::new(&bogus, &Datum::wgs84()),
            Err(Error::Runtime(_))
        ));
    }
}
