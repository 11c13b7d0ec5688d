use rayon::prelude::*;

use super::BlockGeometry;
use crate::geometry::{RasterDims, RasterWindow};

impl BlockGeometry {
    /// Parallel version of [`BlockGeometry::windows`]. Each
    /// task typically binds its own resource to the same
    /// path, as resources are not shared across threads.
    ///
    /// This function is only available with the "use-rayon" feature.
    pub fn par_windows(
        &self,
        dim: RasterDims,
    ) -> impl IndexedParallelIterator<Item = RasterWindow> {
        let (count, func) = self.iter_mapper(dim);
        (0..count).into_par_iter().map(func)
    }
}
