//! Mapping between plane indices and the channel names a
//! store uses for them.
//!
//! Stores do not preserve the order channels were written
//! in; some report them sorted by name. For 3 and 4 plane
//! rasters labelled `R`, `G`, `B` (and `A`) the plane
//! order is restored to `R, G, B[, A]`. Any other naming
//! keeps the order the store reports.
use crate::format::PixelKind;
use crate::{Error, Result};

const RGB: [&str; 3] = ["R", "G", "B"];
const RGBA: [&str; 4] = ["R", "G", "B", "A"];

/// Ordered plane index to channel name table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelLabelTable {
    labels: Vec<String>,
}

impl ChannelLabelTable {
    /// Labels used when writing `planes` planes of pixels of
    /// kind `kind`: `R, G, B[, A]` for color pixels, and
    /// `Channel<n>` otherwise.
    pub fn for_pixel_kind(kind: PixelKind, planes: usize) -> Result<Self> {
        let names: &[&str] = match kind {
            PixelKind::Rgb => &RGB,
            PixelKind::Rgba => &RGBA,
            _ => &[],
        };
        if !names.is_empty() && names.len() != planes {
            return Err(Error::Argument(format!(
                "{:?} pixels have {} channels, not {}",
                kind,
                names.len(),
                planes
            )));
        }

        let labels = (0..planes)
            .map(|i| match names.get(i) {
                Some(name) => name.to_string(),
                None => format!("Channel{}", i),
            })
            .collect();
        Ok(ChannelLabelTable { labels })
    }

    /// Canonical plane order for channel names as reported
    /// by a store.
    pub fn from_store<S: AsRef<str>>(reported: &[S]) -> Self {
        let reported: Vec<&str> = reported.iter().map(AsRef::as_ref).collect();
        let has_all = |names: &[&str]| names.iter().all(|n| reported.contains(n));

        let labels = match reported.len() {
            3 if has_all(&RGB) => RGB.iter().map(|s| s.to_string()).collect(),
            4 if has_all(&RGBA) => RGBA.iter().map(|s| s.to_string()).collect(),
            _ => reported.iter().map(|s| s.to_string()).collect(),
        };
        ChannelLabelTable { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, plane: usize) -> Option<&str> {
        self.labels.get(plane).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}
