#![forbid(unsafe_code)]

//! Layout managers for ftk containers.
//!
//! # Role in ftk
//! `ftk-layout` computes child bounds from per-child constraints and the
//! children's natural sizes. It does not touch the component tree: callers
//! hand in [`LayoutItem`]s and apply the returned rectangles themselves.
//!
//! # Primary responsibilities
//! - **GridBagConstraints**: grid position, span, weights, anchor, fill,
//!   insets, and padding of one child; serializable so constraint tables
//!   can be loaded from files.
//! - **GridBagLayout**: the grid solver, container minimum/preferred sizes,
//!   arrangement, and inspection of the last arranged grid.

pub mod constraints;
pub mod gridbag;

use std::fmt;

pub use constraints::{Anchor, Fill, GridBagConstraints, RELATIVE, REMAINDER};
pub use gridbag::{GridBagLayout, LayoutChild, LayoutInfo, LayoutItem, MAX_GRID_SIZE, SizeKind};

/// Failures of layout computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// Constraints place a child beyond [`MAX_GRID_SIZE`] columns or rows.
    GridTooLarge { requested: usize, max: usize },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GridTooLarge { requested, max } => {
                write!(f, "grid of {requested} cells exceeds the maximum of {max}")
            }
        }
    }
}

impl std::error::Error for LayoutError {}
