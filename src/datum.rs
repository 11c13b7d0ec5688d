//! Geodetic datums: a reference ellipsoid and its proj4
//! description.
use serde_derive::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Terms of a proj4 string that describe the datum rather
/// than the projection.
pub(crate) const DATUM_KEYS: &[&str] = &[
    "datum", "ellps", "a", "b", "R", "rf", "f", "towgs84", "nadgrids",
];

/// A reference ellipsoid, named after its datum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Datum {
    name: String,
    spheroid_name: String,
    /// Semi-major axis (metres).
    semi_major_axis: f64,
    /// Semi-minor axis (metres).
    semi_minor_axis: f64,
    /// proj4 fragment selecting this datum.
    proj4: String,
}

#[derive(Clone, Copy)]
enum Shape {
    InverseFlattening(f64),
    SemiMinor(f64),
}

/// A named ellipsoid, as known to proj4 `+ellps`.
#[derive(Clone, Copy)]
struct Ellipsoid {
    key: &'static str,
    description: &'static str,
    a: f64,
    shape: Shape,
}

impl Ellipsoid {
    fn semi_minor_axis(&self) -> f64 {
        match self.shape {
            Shape::InverseFlattening(rf) => self.a * (1. - 1. / rf),
            Shape::SemiMinor(b) => b,
        }
    }
}

const fn rf(key: &'static str, description: &'static str, a: f64, rf: f64) -> Ellipsoid {
    Ellipsoid {
        key,
        description,
        a,
        shape: Shape::InverseFlattening(rf),
    }
}

const fn ab(key: &'static str, description: &'static str, a: f64, b: f64) -> Ellipsoid {
    Ellipsoid {
        key,
        description,
        a,
        shape: Shape::SemiMinor(b),
    }
}

const WGS84_ELLIPSOID: Ellipsoid = rf("WGS84", "WGS 84", 6378137.0, 298.257223563);

const ELLIPSOIDS: &[Ellipsoid] = &[
    WGS84_ELLIPSOID,
    rf("WGS72", "WGS 72", 6378135.0, 298.26),
    rf("WGS66", "WGS 66", 6378145.0, 298.25),
    rf("WGS60", "WGS 60", 6378165.0, 298.3),
    rf("GRS80", "GRS 1980", 6378137.0, 298.257222101),
    rf("GRS67", "GRS 67", 6378160.0, 298.2471674270),
    rf("MERIT", "MERIT 1983", 6378137.0, 298.257),
    rf("SGS85", "Soviet Geodetic System 85", 6378136.0, 298.257),
    rf("IAU76", "IAU 1976", 6378140.0, 298.257),
    rf("APL4.9", "Appl. Physics. 1965", 6378137.0, 298.25),
    rf("NWL9D", "Naval Weapons Lab., 1965", 6378145.0, 298.25),
    ab("airy", "Airy 1830", 6377563.396, 6356256.910),
    ab("mod_airy", "Modified Airy", 6377340.189, 6356034.446),
    rf("andrae", "Andrae 1876", 6377104.43, 300.0),
    rf("aust_SA", "Australian Natl & S. Amer. 1969", 6378160.0, 298.25),
    rf("bessel", "Bessel 1841", 6377397.155, 299.1528128),
    rf("bess_nam", "Bessel 1841 (Namibia)", 6377483.865, 299.1528128),
    ab("clrk66", "Clarke 1866", 6378206.4, 6356583.8),
    rf("clrk80", "Clarke 1880 mod.", 6378249.145, 293.4663),
    rf("clrk80ign", "Clarke 1880 (IGN)", 6378249.2, 293.4660212936269),
    rf("CPM", "Comm. des Poids et Mesures 1799", 6375738.7, 334.29),
    rf("delmbr", "Delambre 1810 (Belgium)", 6376428.0, 311.5),
    rf("engelis", "Engelis 1985", 6378136.05, 298.2566),
    rf("evrst30", "Everest 1830", 6377276.345, 300.8017),
    rf("evrst48", "Everest 1948", 6377304.063, 300.8017),
    rf("evrst56", "Everest 1956", 6377301.243, 300.8017),
    rf("evrst69", "Everest 1969", 6377295.664, 300.8017),
    rf("evrstSS", "Everest (Sabah & Sarawak)", 6377298.556, 300.8017),
    rf("fschr60", "Fischer (Mercury Datum) 1960", 6378166.0, 298.3),
    rf("fschr60m", "Modified Fischer 1960", 6378155.0, 298.3),
    rf("fschr68", "Fischer 1968", 6378150.0, 298.3),
    rf("helmert", "Helmert 1906", 6378200.0, 298.3),
    rf("hough", "Hough", 6378270.0, 297.0),
    rf("intl", "International 1924", 6378388.0, 297.0),
    rf("krass", "Krassovsky, 1942", 6378245.0, 298.3),
    rf("kaula", "Kaula 1961", 6378163.0, 298.24),
    rf("lerch", "Lerch 1979", 6378139.0, 298.257),
    rf("mprts", "Maupertius 1738", 6397300.0, 191.0),
    ab("new_intl", "New International 1967", 6378157.5, 6356772.2),
    ab("plessis", "Plessis 1817 (France)", 6376523.0, 6355863.0),
    ab("SEasia", "Southeast Asia", 6378155.0, 6356773.3205),
    ab("walbeck", "Walbeck", 6376896.0, 6355834.8467),
    ab("sphere", "Normal Sphere (r=6370997)", 6370997.0, 6370997.0),
];

/// proj4 `+datum` names: key, ellipsoid, datum name.
const DATUMS: &[(&str, &str, &str)] = &[
    ("WGS84", "WGS84", "WGS_1984"),
    ("NAD83", "GRS80", "North_American_Datum_1983"),
    ("NAD27", "clrk66", "North_American_Datum_1927"),
    ("GGRS87", "GRS80", "Greek_Geodetic_Reference_System_1987"),
    ("potsdam", "bessel", "Deutsches_Hauptdreiecksnetz"),
    ("carthage", "clrk80ign", "Carthage"),
    ("hermannskogel", "bessel", "Hermannskogel"),
    ("ire65", "mod_airy", "TM65"),
    ("nzgd49", "intl", "New_Zealand_Geodetic_Datum_1949"),
    ("OSGB36", "airy", "OSGB_1936"),
];

/// Datum names implied by a bare `+ellps`.
const ELLIPSOID_DATUMS: &[(&str, &str)] = &[
    ("WGS84", "WGS_1984"),
    ("WGS72", "WGS_1972"),
    ("GRS80", "North_American_Datum_1983"),
    ("clrk66", "North_American_Datum_1927"),
];

fn find_ellipsoid(key: &str) -> Result<&'static Ellipsoid> {
    ELLIPSOIDS
        .iter()
        .find(|e| e.key == key)
        .ok_or_else(|| Error::Argument(format!("unknown ellipsoid \"{}\"", key)))
}

impl Datum {
    /// Datums known by name: `WGS84`, `WGS72`, `NAD83` and
    /// `NAD27`.
    pub fn well_known(name: &str) -> Result<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "WGS84" | "WGS_1984" => Ok(Datum::wgs84()),
            "WGS72" | "WGS_1972" => Datum::on_ellipsoid("WGS_1972", "WGS72", "+ellps=WGS72"),
            "NAD83" | "NORTH_AMERICAN_DATUM_1983" => {
                Datum::on_ellipsoid("North_American_Datum_1983", "GRS80", "+ellps=GRS80")
            }
            "NAD27" | "NORTH_AMERICAN_DATUM_1927" => {
                Datum::on_ellipsoid("North_American_Datum_1927", "clrk66", "+ellps=clrk66")
            }
            _ => Err(Error::Argument(format!(
                "unknown datum \"{}\": expected one of WGS84, WGS72, NAD83, NAD27",
                name
            ))),
        }
    }

    pub fn wgs84() -> Self {
        Datum::with_ellipsoid("WGS_1984", &WGS84_ELLIPSOID, "+datum=WGS84")
    }

    fn with_ellipsoid(name: &str, ellps: &Ellipsoid, proj4: &str) -> Self {
        Datum {
            name: name.into(),
            spheroid_name: ellps.description.into(),
            semi_major_axis: ellps.a,
            semi_minor_axis: ellps.semi_minor_axis(),
            proj4: proj4.into(),
        }
    }

    fn on_ellipsoid(name: &str, ellps: &str, proj4: &str) -> Result<Self> {
        Ok(Datum::with_ellipsoid(name, find_ellipsoid(ellps)?, proj4))
    }

    /// A custom datum from its ellipsoid axes.
    pub fn from_axes(name: &str, semi_major_axis: f64, semi_minor_axis: f64) -> Result<Self> {
        check_axes(semi_major_axis, semi_minor_axis)?;
        Ok(Datum {
            name: name.into(),
            spheroid_name: name.into(),
            semi_major_axis,
            semi_minor_axis,
            proj4: format!("+a={} +b={}", semi_major_axis, semi_minor_axis),
        })
    }

    /// Recover a datum from the datum-related terms of a
    /// proj4 string (`+datum`, `+ellps`, `+a`, `+b`, `+R`,
    /// `+rf`, `+f`, `+towgs84`, `+nadgrids`). Other terms
    /// are skipped. Returns `None` if no such term is
    /// present.
    ///
    /// The terms are kept verbatim as the datum's proj4
    /// fragment; the axes are derived from them.
    pub fn from_proj4_terms<'a, I>(terms: I) -> Result<Option<Self>>
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let mut fragment = vec![];
        let (mut datum, mut ellps) = (None, None);
        let (mut a, mut b, mut flattening) = (None, None, None);

        for (key, value) in terms {
            if !DATUM_KEYS.contains(&key) {
                continue;
            }
            fragment.push(match value {
                Some(v) => format!("+{}={}", key, v),
                None => format!("+{}", key),
            });

            let value = value.unwrap_or("");
            match key {
                "datum" => datum = Some(value),
                "ellps" => ellps = Some(value),
                "a" => a = Some(parse_axis(key, value)?),
                "R" => {
                    let r = parse_axis(key, value)?;
                    a = Some(r);
                    b = Some(r);
                }
                "b" => b = Some(parse_axis(key, value)?),
                "rf" => flattening = Some(1. / parse_axis(key, value)?),
                "f" => flattening = Some(parse_axis(key, value)?),
                _ => {}
            }
        }
        if fragment.is_empty() {
            return Ok(None);
        }

        // A named datum wins over a bare ellipsoid.
        let (name, base) = match (datum, ellps) {
            (Some(key), _) => {
                let &(_, ellps_key, name) = DATUMS
                    .iter()
                    .find(|(k, _, _)| *k == key)
                    .ok_or_else(|| Error::Argument(format!("unknown datum \"{}\"", key)))?;
                (name.to_string(), Some(find_ellipsoid(ellps_key)?))
            }
            (None, Some(key)) => {
                let name = ELLIPSOID_DATUMS
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, name)| name.to_string())
                    .unwrap_or_else(|| format!("unknown datum on {}", key));
                (name, Some(find_ellipsoid(key)?))
            }
            (None, None) if a.is_some() => ("unnamed".to_string(), None),
            // Only shift terms: proj4 falls back to WGS84.
            (None, None) => ("unnamed".to_string(), Some(&WGS84_ELLIPSOID)),
        };

        let semi_major = a.or(base.map(|e| e.a)).unwrap_or(WGS84_ELLIPSOID.a);
        let semi_minor = match (b, flattening, base) {
            (Some(b), _, _) => b,
            (None, Some(f), _) => semi_major * (1. - f),
            (None, None, Some(e)) if a.is_none() => e.semi_minor_axis(),
            (None, None, Some(e)) => semi_major * e.semi_minor_axis() / e.a,
            (None, None, None) => semi_major,
        };
        check_axes(semi_major, semi_minor)?;

        Ok(Some(Datum {
            name,
            spheroid_name: base
                .map(|e| e.description.to_string())
                .unwrap_or_else(|| "unnamed".into()),
            semi_major_axis: semi_major,
            semi_minor_axis: semi_minor,
            proj4: fragment.join(" "),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spheroid_name(&self) -> &str {
        &self.spheroid_name
    }

    pub fn semi_major_axis(&self) -> f64 {
        self.semi_major_axis
    }

    pub fn semi_minor_axis(&self) -> f64 {
        self.semi_minor_axis
    }

    pub fn inverse_flattening(&self) -> f64 {
        let a = self.semi_major_axis;
        let b = self.semi_minor_axis;
        if a == b {
            0.
        } else {
            a / (a - b)
        }
    }

    /// Square of the first eccentricity.
    pub fn eccentricity_squared(&self) -> f64 {
        let ratio = self.semi_minor_axis / self.semi_major_axis;
        1. - ratio * ratio
    }

    pub fn proj4_str(&self) -> &str {
        &self.proj4
    }
}

impl Default for Datum {
    fn default() -> Self {
        Datum::wgs84()
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Datum {} (spheroid: {}, a: {}, b: {})",
            self.name, self.spheroid_name, self.semi_major_axis, self.semi_minor_axis
        )
    }
}

fn check_axes(a: f64, b: f64) -> Result<()> {
    if !(a.is_finite() && b.is_finite() && a > 0. && b > 0.) || b > a {
        return Err(Error::Argument(format!(
            "invalid ellipsoid axes: a = {}, b = {}",
            a, b
        )));
    }
    Ok(())
}

fn parse_axis(key: &str, value: &str) -> Result<f64> {
    value
        .parse()
        .map_err(|_| Error::Argument(format!("invalid value for +{}: \"{}\"", key, value)))
}
