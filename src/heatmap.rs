//! Sizing of the heatmap grid.
//!
//! The engine's spatial grid is a quad tree; each level doubles the
//! resolution on both axes. Rather than picking a level ourselves we hand the
//! engine a maximum permissible cell error and let it choose the coarsest
//! level satisfying it.

use crate::geo::Rectangle;

/// How the engine should pick the heatmap grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridResolution {
    /// An explicit quad-tree level, passed through untouched.
    Level(u32),
    /// Maximum cell side in degrees; the engine picks the coarsest level within it.
    MaxCellError(f64),
}

impl GridResolution {
    /// Resolve the grid for a heatmap over `region` targeting at most `limit` cells.
    ///
    /// An explicit `grid_level` wins and `limit` is ignored.
    pub fn choose(limit: u32, region: &Rectangle, grid_level: Option<u32>) -> Self {
        match grid_level {
            Some(level) => GridResolution::Level(level),
            None => GridResolution::MaxCellError(max_cell_error(limit, region)),
        }
    }
}

/// Cell side in degrees that approximates `limit` cells over `region` as an upper bound.
///
/// The `* 2` biases the error upward by one quad-tree level so the engine
/// settles on the coarser of the two candidate levels; in practice that lands
/// between `limit / 4` and `limit` cells.
pub fn max_cell_error(limit: u32, region: &Rectangle) -> f64 {
    // side of an equivalent square, in degrees and in cells
    let degrees_side_len = (region.width() + region.height()) / 2.0;
    let cells_side_len = f64::from(limit.max(1)).sqrt();
    degrees_side_len / cells_side_len * 2.0
}
