//! Sinusoidal and orthographic maps, computed directly.
//!
//! Angles are in radians on the geographic side.
use std::f64::consts::{FRAC_PI_2, PI};

use super::Projection;
use crate::datum::Datum;

const EPS: f64 = 1e-10;
const MAX_ITER: usize = 20;

#[derive(Debug, PartialEq, thiserror::Error)]
pub(crate) enum DomainError {
    #[error("point is on the far side of the globe")]
    FarSide,
    #[error("point lies outside the projected disc")]
    OffDisc,
    #[error("latitude did not converge")]
    NoConvergence,
}

#[derive(Clone, Debug)]
pub(crate) enum NativeProjection {
    /// Ellipsoidal sinusoidal (equal area).
    Sinusoidal {
        a: f64,
        e2: f64,
        lon0: f64,
        false_easting: f64,
        false_northing: f64,
    },
    /// Spherical orthographic, on a sphere of radius `a`.
    Orthographic {
        radius: f64,
        lat0: f64,
        lon0: f64,
        false_easting: f64,
        false_northing: f64,
    },
}

impl NativeProjection {
    /// The native map for `projection`, if there is one.
    pub fn new(projection: &Projection, datum: &Datum) -> Option<Self> {
        match *projection {
            Projection::Sinusoidal {
                center_longitude,
                false_easting,
                false_northing,
            } => Some(NativeProjection::Sinusoidal {
                a: datum.semi_major_axis(),
                e2: datum.eccentricity_squared(),
                lon0: center_longitude.to_radians(),
                false_easting,
                false_northing,
            }),
            Projection::Orthographic {
                center_latitude,
                center_longitude,
                false_easting,
                false_northing,
            } => Some(NativeProjection::Orthographic {
                radius: datum.semi_major_axis(),
                lat0: center_latitude.to_radians(),
                lon0: center_longitude.to_radians(),
                false_easting,
                false_northing,
            }),
            _ => None,
        }
    }

    pub fn forward(&self, lon: f64, lat: f64) -> Result<(f64, f64), DomainError> {
        match *self {
            NativeProjection::Sinusoidal {
                a,
                e2,
                lon0,
                false_easting,
                false_northing,
            } => {
                let (sin_lat, cos_lat) = lat.sin_cos();
                let dlon = adjust_lon(lon - lon0);
                let x = a * dlon * cos_lat / (1. - e2 * sin_lat * sin_lat).sqrt();
                let y = meridional_arc(a, e2, lat);
                Ok((x + false_easting, y + false_northing))
            }
            NativeProjection::Orthographic {
                radius,
                lat0,
                lon0,
                false_easting,
                false_northing,
            } => {
                let (sin_lat, cos_lat) = lat.sin_cos();
                let (sin_lat0, cos_lat0) = lat0.sin_cos();
                let (sin_dlon, cos_dlon) = adjust_lon(lon - lon0).sin_cos();

                let cos_c = sin_lat0 * sin_lat + cos_lat0 * cos_lat * cos_dlon;
                if cos_c < -EPS {
                    return Err(DomainError::FarSide);
                }
                let x = radius * cos_lat * sin_dlon;
                let y = radius * (cos_lat0 * sin_lat - sin_lat0 * cos_lat * cos_dlon);
                Ok((x + false_easting, y + false_northing))
            }
        }
    }

    pub fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64), DomainError> {
        match *self {
            NativeProjection::Sinusoidal {
                a,
                e2,
                lon0,
                false_easting,
                false_northing,
            } => {
                let (x, y) = (x - false_easting, y - false_northing);
                let lat = inverse_meridional_arc(a, e2, y)?;
                let (sin_lat, cos_lat) = lat.sin_cos();
                if cos_lat.abs() < EPS {
                    // Longitude is undefined at the poles.
                    return Ok((lon0, lat));
                }
                let dlon = x * (1. - e2 * sin_lat * sin_lat).sqrt() / (a * cos_lat);
                if dlon.abs() > PI + EPS {
                    return Err(DomainError::OffDisc);
                }
                Ok((adjust_lon(lon0 + dlon), lat))
            }
            NativeProjection::Orthographic {
                radius,
                lat0,
                lon0,
                false_easting,
                false_northing,
            } => {
                let (x, y) = (x - false_easting, y - false_northing);
                let rho = x.hypot(y);
                if rho < EPS * radius {
                    return Ok((lon0, lat0));
                }
                let ratio = rho / radius;
                if ratio > 1. + EPS {
                    return Err(DomainError::OffDisc);
                }
                let (sin_c, cos_c) = ratio.min(1.).asin().sin_cos();
                let (sin_lat0, cos_lat0) = lat0.sin_cos();

                let lat = (cos_c * sin_lat0 + y * sin_c * cos_lat0 / rho)
                    .max(-1.)
                    .min(1.)
                    .asin();
                let lon = lon0 + (x * sin_c).atan2(rho * cos_lat0 * cos_c - y * sin_lat0 * sin_c);
                Ok((adjust_lon(lon), lat))
            }
        }
    }
}

/// Wrap a longitude difference into `[-pi, pi]`.
fn adjust_lon(lon: f64) -> f64 {
    if lon.abs() <= PI {
        return lon;
    }
    let wrapped = (lon + PI).rem_euclid(2. * PI) - PI;
    if wrapped == -PI && lon > 0. {
        PI
    } else {
        wrapped
    }
}

/// Distance along the meridian from the equator to `lat`.
fn meridional_arc(a: f64, e2: f64, lat: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    a * ((1. - e2 / 4. - 3. * e4 / 64. - 5. * e6 / 256.) * lat
        - (3. * e2 / 8. + 3. * e4 / 32. + 45. * e6 / 1024.) * (2. * lat).sin()
        + (15. * e4 / 256. + 45. * e6 / 1024.) * (4. * lat).sin()
        - (35. * e6 / 3072.) * (6. * lat).sin())
}

/// Latitude whose meridional arc is `m`, by Newton
/// iteration.
fn inverse_meridional_arc(a: f64, e2: f64, m: f64) -> Result<f64, DomainError> {
    let quarter = meridional_arc(a, e2, FRAC_PI_2);
    if m.abs() > quarter * (1. + EPS) {
        return Err(DomainError::OffDisc);
    }
    let mut lat = (m / quarter * FRAC_PI_2).max(-FRAC_PI_2).min(FRAC_PI_2);
    for _ in 0..MAX_ITER {
        let sin_lat = lat.sin();
        let w = 1. - e2 * sin_lat * sin_lat;
        let slope = a * (1. - e2) / (w * w.sqrt());
        let step = (meridional_arc(a, e2, lat) - m) / slope;
        lat = (lat - step).max(-FRAC_PI_2).min(FRAC_PI_2);
        if step.abs() < 1e-14 {
            return Ok(lat);
        }
    }
    Err(DomainError::NoConvergence)
}
