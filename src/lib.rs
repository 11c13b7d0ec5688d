//! Georeferencing and windowed, block-oriented raster I/O.
//!
//! The crate has two halves that meet in the [`io`]
//! helpers:
//!
//! - [`GeoReference`][georef::GeoReference] maps pixel
//! coordinates to an affine "projected" space and from
//! there to geographic (lon, lat) coordinates through a
//! [`proj4rs`] projection context.
//!
//! - [`TiledBlockResource`][resource::TiledBlockResource]
//! reads and writes block-aligned windows of a raster
//! persisted by an external codec backend (see [`codec`]),
//! canonicalizing channel order and converting element
//! types at the store boundary.

pub mod error;
pub use error::{Error, Result};

pub mod geometry;
pub mod transform;

pub mod datum;
pub mod projection;
pub mod georef;

pub mod format;
pub mod channels;
pub mod blocks;

pub mod codec;
pub mod resource;
pub mod io;

pub mod prelude;
