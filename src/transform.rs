//! Affine transforms with a maintained inverse, and the
//! pixel convention that shifts them.
use nalgebra::{Matrix3, Vector2};
use serde_derive::{Deserialize, Serialize};

use crate::geometry::{Loc, PixelTransform};
use crate::{Error, Result};

/// Interpretation of an integer pixel coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelConvention {
    /// Pixel `(0, 0)` is a point sample at the origin of
    /// the transform.
    PixelAsPoint,
    /// Pixel `(0, 0)` is the center of the unit cell whose
    /// top-left corner is the origin of the transform.
    PixelAsArea,
}

impl Default for PixelConvention {
    fn default() -> Self {
        PixelConvention::PixelAsPoint
    }
}

impl PixelConvention {
    /// Shift applied on the pixel side of a transform.
    pub fn shift(self) -> PixelTransform {
        match self {
            PixelConvention::PixelAsPoint => Matrix3::identity(),
            PixelConvention::PixelAsArea => Matrix3::new_translation(&Vector2::new(0.5, 0.5)),
        }
    }

    /// Name as used by the `AREA_OR_POINT` metadata item.
    pub fn as_str(self) -> &'static str {
        match self {
            PixelConvention::PixelAsPoint => "Point",
            PixelConvention::PixelAsArea => "Area",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "point" => Some(PixelConvention::PixelAsPoint),
            "area" => Some(PixelConvention::PixelAsArea),
            _ => None,
        }
    }
}

/// An invertible affine transform. The inverse is computed
/// once on construction and travels with the matrix, so
/// the pair is never out of sync.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineTransform {
    forward: PixelTransform,
    inverse: PixelTransform,
}

impl AffineTransform {
    /// Validates that `t` is affine (bottom row `(0, 0, 1)`)
    /// and invertible.
    pub fn new(t: PixelTransform) -> Result<Self> {
        if t.iter().any(|v| !v.is_finite()) {
            return Err(Error::Argument("transform has non-finite entries".into()));
        }
        if t[(2, 0)] != 0. || t[(2, 1)] != 0. || t[(2, 2)] != 1. {
            return Err(Error::Argument(
                "transform is not affine: bottom row must be (0, 0, 1)".into(),
            ));
        }
        if t.determinant() == 0. {
            return Err(Error::Argument("transform is singular".into()));
        }

        let inverse = t
            .try_inverse()
            .filter(|inv| inv.iter().all(|v| v.is_finite()))
            .ok_or_else(|| Error::Argument("transform is singular".into()))?;

        Ok(AffineTransform { forward: t, inverse })
    }

    pub fn identity() -> Self {
        AffineTransform {
            forward: Matrix3::identity(),
            inverse: Matrix3::identity(),
        }
    }

    pub fn matrix(&self) -> &PixelTransform {
        &self.forward
    }

    pub fn inverse_matrix(&self) -> &PixelTransform {
        &self.inverse
    }

    /// Compose with a pixel convention: `self ∘ shift`. The
    /// inverse of the result is derived from the composed
    /// matrix, not from the inverses of the parts.
    pub fn shifted(&self, convention: PixelConvention) -> Result<Self> {
        match convention {
            PixelConvention::PixelAsPoint => Ok(*self),
            PixelConvention::PixelAsArea => AffineTransform::new(self.forward * convention.shift()),
        }
    }

    pub fn apply(&self, p: &Loc) -> Loc {
        self.forward.transform_point(p)
    }

    pub fn apply_inverse(&self, q: &Loc) -> Loc {
        self.inverse.transform_point(q)
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        AffineTransform::identity()
    }
}
