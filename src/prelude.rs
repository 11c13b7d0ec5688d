pub use crate::{Error, Result};

pub use crate::geometry::*;
pub use crate::transform::*;

pub use crate::datum::Datum;
pub use crate::georef::*;
pub use crate::projection::{ProjContext, Projection};

pub use crate::blocks::*;
pub use crate::channels::ChannelLabelTable;
pub use crate::format::*;

#[cfg(feature = "gdal")]
pub use crate::codec::gdal::GdalCodec;
pub use crate::codec::memory::MemoryCodec;
pub use crate::codec::{BlockCodec, Layout, StoreHeader};
pub use crate::io::*;
pub use crate::resource::*;
