//! Raster shape descriptors and sample element types.
use serde_derive::{Deserialize, Serialize};

use crate::{Error, Result};

/// How the planes of a raster combine into pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelKind {
    Scalar,
    GrayAlpha,
    Rgb,
    Rgba,
}

impl PixelKind {
    /// Number of channels in one pixel of this kind.
    pub fn channels(self) -> usize {
        match self {
            PixelKind::Scalar => 1,
            PixelKind::GrayAlpha => 2,
            PixelKind::Rgb => 3,
            PixelKind::Rgba => 4,
        }
    }
}

/// Element type of a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

/// Shape metadata of a persisted raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterFormat {
    pub cols: usize,
    pub rows: usize,
    pub planes: usize,
    pub element_type: ElementType,
    pub pixel_kind: PixelKind,
}

impl RasterFormat {
    pub fn new(
        cols: usize,
        rows: usize,
        planes: usize,
        element_type: ElementType,
        pixel_kind: PixelKind,
    ) -> Result<Self> {
        if cols == 0 || rows == 0 || planes == 0 {
            return Err(Error::Argument(format!(
                "raster format must be non-empty: {}x{}x{}",
                cols, rows, planes
            )));
        }
        Ok(RasterFormat {
            cols,
            rows,
            planes,
            element_type,
            pixel_kind,
        })
    }

    /// Single-plane scalar raster of samples `T`.
    pub fn scalar<T: Sample>(cols: usize, rows: usize) -> Result<Self> {
        RasterFormat::new(cols, rows, 1, T::ELEMENT_TYPE, PixelKind::Scalar)
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }
}

/// Element types that can cross the store boundary. Stores
/// hold `f32` samples; integer targets are rounded to the
/// nearest value and saturated, and NaN maps to zero.
pub trait Sample: Copy + Default + Send + Sync + 'static {
    const ELEMENT_TYPE: ElementType;

    fn to_f32(self) -> f32;
    fn from_f32(v: f32) -> Self;
}

macro_rules! int_sample {
    ($t:ty, $e:ident) => {
        impl Sample for $t {
            const ELEMENT_TYPE: ElementType = ElementType::$e;

            #[inline]
            fn to_f32(self) -> f32 {
                self as f32
            }
            #[inline]
            fn from_f32(v: f32) -> Self {
                v.round() as $t
            }
        }
    };
}

int_sample!(u8, U8);
int_sample!(u16, U16);
int_sample!(u32, U32);
int_sample!(i8, I8);
int_sample!(i16, I16);
int_sample!(i32, I32);

impl Sample for f32 {
    const ELEMENT_TYPE: ElementType = ElementType::F32;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

impl Sample for f64 {
    const ELEMENT_TYPE: ElementType = ElementType::F64;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
    #[inline]
    fn from_f32(v: f32) -> Self {
        v as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_validation() {
        assert!(RasterFormat::new(0, 1, 1, ElementType::U8, PixelKind::Scalar).is_err());
        assert!(RasterFormat::new(1, 1, 0, ElementType::U8, PixelKind::Scalar).is_err());
        let fmt = RasterFormat::scalar::<u16>(3, 2).unwrap();
        assert_eq!(fmt.element_type, ElementType::U16);
        assert_eq!(fmt.dims(), (3, 2));
    }

    #[test]
    fn integer_conversion_rounds_and_saturates() {
        assert_eq!(u8::from_f32(12.6), 13);
        assert_eq!(u8::from_f32(300.), 255);
        assert_eq!(u8::from_f32(-4.), 0);
        assert_eq!(i16::from_f32(-2.5), -3);
        assert_eq!(u16::from_f32(f32::NAN), 0);
        assert_eq!(i32::from_f32(7.), 7);
        assert_eq!(200u8.to_f32(), 200.);
    }

    #[test]
    fn channel_counts() {
        assert_eq!(PixelKind::Scalar.channels(), 1);
        assert_eq!(PixelKind::Rgba.channels(), 4);
    }
}
