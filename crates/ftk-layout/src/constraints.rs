#![forbid(unsafe_code)]

//! Per-component placement constraints for [`crate::GridBagLayout`].
//!
//! # Example
//!
//! ```
//! use ftk_layout::{Fill, GridBagConstraints, REMAINDER};
//!
//! // Last cell of a row, stretching horizontally.
//! let c = GridBagConstraints::new()
//!     .span(REMAINDER, 1)
//!     .weight(1.0, 0.0)
//!     .fill(Fill::Horizontal);
//! assert_eq!(c.gridwidth, REMAINDER);
//! ```

use ftk_core::geometry::Insets;
use serde::{Deserialize, Serialize};

/// Grid position: place the component right after (or below) the previous
/// one.
pub const RELATIVE: i32 = -1;

/// Grid span: the component is the last one in its row (or column).
pub const REMAINDER: i32 = 0;

/// Where a component sits inside a cell larger than the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    #[default]
    Center,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Anchor {
    /// Share of the free space placed before the component, in halves:
    /// 0 (start), 1 (centred), or 2 (end), for x and y.
    const fn gravity(self) -> (i32, i32) {
        match self {
            Self::Center => (1, 1),
            Self::North => (1, 0),
            Self::NorthEast => (2, 0),
            Self::East => (2, 1),
            Self::SouthEast => (2, 2),
            Self::South => (1, 2),
            Self::SouthWest => (0, 2),
            Self::West => (0, 1),
            Self::NorthWest => (0, 0),
        }
    }

    /// Offset of a component that leaves `free_x`/`free_y` pixels unused.
    pub(crate) fn offset(self, free_x: i32, free_y: i32) -> (i32, i32) {
        let (gx, gy) = self.gravity();
        let pick = |g: i32, free: i32| match g {
            0 => 0,
            1 => free / 2,
            _ => free,
        };
        (pick(gx, free_x), pick(gy, free_y))
    }
}

/// Which axes a component stretches along to fill its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fill {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

impl Fill {
    #[must_use]
    pub const fn horizontal(self) -> bool {
        matches!(self, Self::Horizontal | Self::Both)
    }

    #[must_use]
    pub const fn vertical(self) -> bool {
        matches!(self, Self::Vertical | Self::Both)
    }
}

/// Placement of one component.
///
/// Negative `gridx`/`gridy` ([`RELATIVE`]) place the component relative to
/// the previous one; a zero span ([`REMAINDER`]) makes it the last in its
/// row or column. Weights decide who absorbs extra space; `ipadx`/`ipady`
/// grow the component's own minimum size and `insets` pad the cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridBagConstraints {
    pub gridx: i32,
    pub gridy: i32,
    pub gridwidth: i32,
    pub gridheight: i32,
    pub weightx: f64,
    pub weighty: f64,
    pub anchor: Anchor,
    pub fill: Fill,
    pub insets: Insets,
    pub ipadx: i32,
    pub ipady: i32,
}

impl Default for GridBagConstraints {
    fn default() -> Self {
        Self {
            gridx: RELATIVE,
            gridy: RELATIVE,
            gridwidth: 1,
            gridheight: 1,
            weightx: 0.0,
            weighty: 0.0,
            anchor: Anchor::Center,
            fill: Fill::None,
            insets: Insets::default(),
            ipadx: 0,
            ipady: 0,
        }
    }
}

impl GridBagConstraints {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute cell position.
    #[must_use]
    pub fn at(mut self, gridx: i32, gridy: i32) -> Self {
        self.gridx = gridx;
        self.gridy = gridy;
        self
    }

    #[must_use]
    pub fn span(mut self, gridwidth: i32, gridheight: i32) -> Self {
        self.gridwidth = gridwidth;
        self.gridheight = gridheight;
        self
    }

    #[must_use]
    pub fn weight(mut self, weightx: f64, weighty: f64) -> Self {
        self.weightx = weightx;
        self.weighty = weighty;
        self
    }

    #[must_use]
    pub fn anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    #[must_use]
    pub fn fill(mut self, fill: Fill) -> Self {
        self.fill = fill;
        self
    }

    #[must_use]
    pub fn insets(mut self, insets: Insets) -> Self {
        self.insets = insets;
        self
    }

    #[must_use]
    pub fn ipad(mut self, ipadx: i32, ipady: i32) -> Self {
        self.ipadx = ipadx;
        self.ipady = ipady;
        self
    }
}
