#![forbid(unsafe_code)]

//! Grid-bag layout: components in a grid of variable-size rows and columns.
//!
//! # Design
//!
//! Solving runs three passes over the visible children:
//!
//! 1. Find the grid extents, resolving relative positions with clamped
//!    spans, and cache each child's natural (minimum or preferred) size.
//! 2. Resolve relative positions and remainder spans against the final
//!    extents into absolute cells.
//! 3. Visit cells by increasing span and distribute each child's weight and
//!    pixel demand over the columns and rows it spans, in proportion to the
//!    weights already there; any remainder goes to the last spanned
//!    column or row.
//!
//! [`GridBagLayout::arrange`] then stretches or shrinks the columns and rows
//! by weight to fit the container, centres the grid, and places each child
//! inside its cell according to its fill, anchor, insets, and padding.
//!
//! ## Invariants
//!
//! 1. Column widths and row heights are never negative after `arrange`.
//! 2. The grid never exceeds [`MAX_GRID_SIZE`] columns or rows; a larger
//!    request is a [`LayoutError::GridTooLarge`], not a truncation.
//! 3. Children whose cell leaves no area get an empty rectangle at the
//!    origin.
//!
//! # Example
//!
//! ```
//! use ftk_core::component::ComponentId;
//! use ftk_core::geometry::{Insets, Rect, Size};
//! use ftk_layout::{GridBagConstraints, GridBagLayout, LayoutChild, REMAINDER};
//!
//! let (a, b) = (ComponentId::new(1), ComponentId::new(2));
//! let mut layout = GridBagLayout::new();
//! layout.set_constraints(b, GridBagConstraints::new().span(REMAINDER, 1));
//! let children = [
//!     LayoutChild::new(a, Size::new(10, 10)),
//!     LayoutChild::new(b, Size::new(20, 10)),
//! ];
//! let placed = layout
//!     .arrange(Size::new(30, 10), Insets::default(), &children)
//!     .unwrap();
//! assert_eq!(placed[1], (b, Rect::new(10, 0, 20, 10)));
//! ```

use ftk_core::component::ComponentId;
use ftk_core::geometry::{Insets, Point, Rect, Size};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::LayoutError;
use crate::constraints::GridBagConstraints;

/// Largest number of columns or rows a grid may have.
pub const MAX_GRID_SIZE: usize = 512;

/// Which natural size of the children to lay out with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeKind {
    Minimum,
    Preferred,
}

/// What the solver needs to know about a child.
pub trait LayoutItem {
    fn id(&self) -> ComponentId;

    fn is_visible(&self) -> bool {
        true
    }

    fn minimum_size(&self) -> Size;

    fn preferred_size(&self) -> Size;
}

/// Plain [`LayoutItem`] with fixed sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutChild {
    pub id: ComponentId,
    pub visible: bool,
    pub minimum: Size,
    pub preferred: Size,
}

impl LayoutChild {
    /// Visible child whose minimum and preferred sizes are both `size`.
    #[must_use]
    pub const fn new(id: ComponentId, size: Size) -> Self {
        Self {
            id,
            visible: true,
            minimum: size,
            preferred: size,
        }
    }

    #[must_use]
    pub const fn with_minimum(mut self, minimum: Size) -> Self {
        self.minimum = minimum;
        self
    }

    #[must_use]
    pub const fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}

impl LayoutItem for LayoutChild {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn minimum_size(&self) -> Size {
        self.minimum
    }

    fn preferred_size(&self) -> Size {
        self.preferred
    }
}

/// Solved grid: extents, per-column/row sizes and weights, and the origin
/// of the top-left cell once arranged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutInfo {
    pub origin: Point,
    pub column_widths: Vec<i32>,
    pub row_heights: Vec<i32>,
    pub column_weights: Vec<f64>,
    pub row_weights: Vec<f64>,
}

impl LayoutInfo {
    #[must_use]
    pub fn columns(&self) -> usize {
        self.column_widths.len()
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.row_heights.len()
    }

    /// Size of the grid plus the container insets.
    #[must_use]
    pub fn total_size(&self, insets: Insets) -> Size {
        Size::new(
            self.column_widths.iter().sum::<i32>() + insets.horizontal(),
            self.row_heights.iter().sum::<i32>() + insets.vertical(),
        )
    }
}

/// A visible child resolved to absolute cells.
#[derive(Debug, Clone, Copy)]
struct Cell {
    id: ComponentId,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    natural: Size,
    constraints: GridBagConstraints,
}

// ═════════════════════════════════════════════════════════════════════════
// Placement tracking
// ═════════════════════════════════════════════════════════════════════════

/// Resolved cell span, before the extents are known.
#[derive(Debug, Clone, Copy)]
struct Span {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
}

/// Frontier of occupied cells, used to resolve relative positions.
struct Cursor {
    /// Per row: first free column.
    x_max: Vec<usize>,
    /// Per column: first free row.
    y_max: Vec<usize>,
    cur_row: Option<usize>,
    cur_col: Option<usize>,
}

fn bounded(value: i64) -> Result<usize, LayoutError> {
    match usize::try_from(value) {
        Ok(v) if v <= MAX_GRID_SIZE => Ok(v),
        _ => Err(LayoutError::GridTooLarge {
            requested: usize::try_from(value).unwrap_or(usize::MAX),
            max: MAX_GRID_SIZE,
        }),
    }
}

impl Cursor {
    fn new() -> Self {
        Self {
            x_max: vec![0; MAX_GRID_SIZE],
            y_max: vec![0; MAX_GRID_SIZE],
            cur_row: None,
            cur_col: None,
        }
    }

    fn frontier(line: &[usize], start: i64, len: i64) -> Result<i64, LayoutError> {
        let (start, end) = (bounded(start)?, bounded(start + len)?);
        Ok(line[start..end].iter().copied().max().unwrap_or(0) as i64)
    }

    /// Resolve `c` to a span. With `extents` (pass 2), remainder spans are
    /// stretched to the grid edge; without (pass 1) they count as one cell.
    fn place(
        &mut self,
        c: &GridBagConstraints,
        extents: Option<(usize, usize)>,
    ) -> Result<Span, LayoutError> {
        let (mut x, mut y) = (i64::from(c.gridx), i64::from(c.gridy));
        let (mut w, mut h) = (i64::from(c.gridwidth), i64::from(c.gridheight));
        if extents.is_none() {
            w = w.max(1);
            h = h.max(1);
        }
        let stretch = |span: i64, start: i64, extent: usize| (span + extent as i64 - start).max(1);

        if x < 0 && y < 0 {
            if let Some(row) = self.cur_row {
                y = row as i64;
            } else if let Some(col) = self.cur_col {
                x = col as i64;
            } else {
                y = 0;
            }
        }
        if x < 0 {
            if let Some((_, rows)) = extents
                && h <= 0
            {
                h = stretch(h, y, rows);
            }
            let px = Self::frontier(&self.x_max, y, h)?;
            x = (px - x - 1).max(0);
        } else if y < 0 {
            if let Some((cols, _)) = extents
                && w <= 0
            {
                w = stretch(w, x, cols);
            }
            let py = Self::frontier(&self.y_max, x, w)?;
            y = (py - y - 1).max(0);
        }
        if let Some((cols, rows)) = extents {
            if w <= 0 {
                w = stretch(w, x, cols);
            }
            if h <= 0 {
                h = stretch(h, y, rows);
            }
        }

        let (x0, y0) = (bounded(x)?, bounded(y)?);
        let (px, py) = (bounded(x + w)?, bounded(y + h)?);
        self.y_max[x0..px].fill(py);
        self.x_max[y0..py].fill(px);

        if c.gridheight == 0 && c.gridwidth == 0 {
            self.cur_row = None;
            self.cur_col = None;
        }
        if c.gridheight == 0 && self.cur_row.is_none() {
            self.cur_col = Some(px);
        } else if c.gridwidth == 0 && self.cur_col.is_none() {
            self.cur_row = Some(py);
        }
        Ok(Span {
            x: x0,
            y: y0,
            width: px - x0,
            height: py - y0,
        })
    }
}

/// Spread `weight` and `pixels` of one child over `weights[range]` and
/// `sizes[range]`: only the part not already covered is added, in
/// proportion to the existing weights, remainder to the last slot.
fn distribute(weights: &mut [f64], sizes: &mut [i32], start: usize, span: usize, weight: f64, pixels: i32) {
    let end = start + span;
    let last = end - 1;

    let mut diff = weight - weights[start..end].iter().sum::<f64>();
    if diff > 0.0 {
        let mut total: f64 = weights[start..end].iter().sum();
        for k in start..end {
            if total <= 0.0 {
                break;
            }
            let wt = weights[k];
            let d = (wt * diff) / total;
            weights[k] += d;
            diff -= d;
            total -= wt;
        }
        weights[last] += diff;
    }

    let mut missing = pixels - sizes[start..end].iter().sum::<i32>();
    if missing > 0 {
        let mut total: f64 = weights[start..end].iter().sum();
        for k in start..end {
            if total <= 0.0 {
                break;
            }
            let wt = weights[k];
            let d = ((wt * f64::from(missing)) / total) as i32;
            sizes[k] += d;
            missing -= d;
            total -= wt;
        }
        sizes[last] += missing;
    }
}

/// Grow or shrink `sizes` by `diff` pixels in proportion to `weights`,
/// flooring at zero. Returns the pixels actually applied.
fn stretch_by_weight(sizes: &mut [i32], weights: &[f64], diff: i32) -> i32 {
    let total: f64 = weights.iter().sum();
    if diff == 0 || total <= 0.0 {
        return 0;
    }
    let mut applied = 0;
    for (size, wt) in sizes.iter_mut().zip(weights) {
        let d = ((f64::from(diff) * wt) / total) as i32;
        *size += d;
        applied += d;
        if *size < 0 {
            applied -= *size;
            *size = 0;
        }
    }
    applied
}

// ═════════════════════════════════════════════════════════════════════════
// Layout manager
// ═════════════════════════════════════════════════════════════════════════

/// Grid-bag layout manager for one container.
#[derive(Debug, Clone, Default)]
pub struct GridBagLayout {
    constraints: FxHashMap<ComponentId, GridBagConstraints>,
    defaults: GridBagConstraints,
    column_widths: Vec<i32>,
    row_heights: Vec<i32>,
    column_weights: Vec<f64>,
    row_weights: Vec<f64>,
    /// Grid of the last [`Self::arrange`].
    arranged: Option<LayoutInfo>,
}

impl GridBagLayout {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Constraints used for children without their own.
    #[must_use]
    pub fn with_default_constraints(mut self, defaults: GridBagConstraints) -> Self {
        self.defaults = defaults;
        self
    }

    /// Minimum column widths; also forces at least this many columns.
    #[must_use]
    pub fn with_column_widths(mut self, widths: impl IntoIterator<Item = i32>) -> Self {
        self.column_widths = widths.into_iter().collect();
        self
    }

    /// Minimum row heights; also forces at least this many rows.
    #[must_use]
    pub fn with_row_heights(mut self, heights: impl IntoIterator<Item = i32>) -> Self {
        self.row_heights = heights.into_iter().collect();
        self
    }

    /// Base column weights, before children contribute theirs.
    #[must_use]
    pub fn with_column_weights(mut self, weights: impl IntoIterator<Item = f64>) -> Self {
        self.column_weights = weights.into_iter().collect();
        self
    }

    /// Base row weights, before children contribute theirs.
    #[must_use]
    pub fn with_row_weights(mut self, weights: impl IntoIterator<Item = f64>) -> Self {
        self.row_weights = weights.into_iter().collect();
        self
    }

    pub fn set_constraints(&mut self, component: ComponentId, constraints: GridBagConstraints) {
        self.constraints.insert(component, constraints);
    }

    /// Constraints in effect for `component`.
    #[must_use]
    pub fn constraints(&self, component: ComponentId) -> GridBagConstraints {
        self.constraints
            .get(&component)
            .copied()
            .unwrap_or(self.defaults)
    }

    /// Forget a component's constraints.
    pub fn remove_component(&mut self, component: ComponentId) -> Option<GridBagConstraints> {
        self.constraints.remove(&component)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Solving
    // ─────────────────────────────────────────────────────────────────────

    fn solve<C: LayoutItem>(
        &self,
        children: &[C],
        kind: SizeKind,
    ) -> Result<(LayoutInfo, Vec<Cell>), LayoutError> {
        let visible: Vec<(&C, GridBagConstraints)> = children
            .iter()
            .filter(|c| c.is_visible())
            .map(|c| (c, self.constraints(c.id())))
            .collect();

        // Pass 1: extents.
        let mut cursor = Cursor::new();
        let (mut columns, mut rows) = (0, 0);
        let mut natural = Vec::with_capacity(visible.len());
        for (child, c) in &visible {
            let span = cursor.place(c, None)?;
            columns = columns.max(span.x + span.width);
            rows = rows.max(span.y + span.height);
            natural.push(match kind {
                SizeKind::Minimum => child.minimum_size(),
                SizeKind::Preferred => child.preferred_size(),
            });
        }
        columns = bounded(columns.max(self.column_widths.len()) as i64)?;
        rows = bounded(rows.max(self.row_heights.len()) as i64)?;

        // Pass 2: absolute cells.
        let mut cursor = Cursor::new();
        let mut cells = Vec::with_capacity(visible.len());
        for ((child, c), natural) in visible.iter().zip(natural) {
            let span = cursor.place(c, Some((columns, rows)))?;
            cells.push(Cell {
                id: child.id(),
                x: span.x,
                y: span.y,
                width: span.width,
                height: span.height,
                natural,
                constraints: *c,
            });
        }
        // A remainder span may reach past extents grown only by pass 2.
        for cell in &cells {
            columns = columns.max(cell.x + cell.width);
            rows = rows.max(cell.y + cell.height);
        }

        let mut info = LayoutInfo {
            origin: Point::default(),
            column_widths: vec![0; columns],
            row_heights: vec![0; rows],
            column_weights: vec![0.0; columns],
            row_weights: vec![0.0; rows],
        };
        let copy_prefix = |dst: &mut [i32], src: &[i32]| {
            let n = src.len().min(dst.len());
            dst[..n].copy_from_slice(&src[..n]);
        };
        copy_prefix(&mut info.column_widths, &self.column_widths);
        copy_prefix(&mut info.row_heights, &self.row_heights);
        let n = self.column_weights.len().min(columns);
        info.column_weights[..n].copy_from_slice(&self.column_weights[..n]);
        let n = self.row_weights.len().min(rows);
        info.row_weights[..n].copy_from_slice(&self.row_weights[..n]);

        // Pass 3: narrow spans first, so wide spans only add what is missing.
        let mut size = 1;
        loop {
            let mut next = usize::MAX;
            for cell in &cells {
                let c = &cell.constraints;
                if cell.width == size {
                    distribute(
                        &mut info.column_weights,
                        &mut info.column_widths,
                        cell.x,
                        cell.width,
                        c.weightx,
                        cell.natural.width + c.ipadx + c.insets.horizontal(),
                    );
                } else if cell.width > size {
                    next = next.min(cell.width);
                }
                if cell.height == size {
                    distribute(
                        &mut info.row_weights,
                        &mut info.row_heights,
                        cell.y,
                        cell.height,
                        c.weighty,
                        cell.natural.height + c.ipady + c.insets.vertical(),
                    );
                } else if cell.height > size {
                    next = next.min(cell.height);
                }
            }
            if next == usize::MAX {
                break;
            }
            size = next;
        }

        trace!(columns, rows, ?kind, children = cells.len(), "grid solved");
        Ok((info, cells))
    }

    /// Solve the grid for `children` at their minimum or preferred sizes.
    pub fn layout_info<C: LayoutItem>(
        &self,
        children: &[C],
        kind: SizeKind,
    ) -> Result<LayoutInfo, LayoutError> {
        self.solve(children, kind).map(|(info, _)| info)
    }

    /// Smallest container size that fits every child at its minimum size.
    pub fn minimum_layout_size<C: LayoutItem>(
        &self,
        insets: Insets,
        children: &[C],
    ) -> Result<Size, LayoutError> {
        Ok(self.layout_info(children, SizeKind::Minimum)?.total_size(insets))
    }

    /// Container size that gives every child its preferred size.
    pub fn preferred_layout_size<C: LayoutItem>(
        &self,
        insets: Insets,
        children: &[C],
    ) -> Result<Size, LayoutError> {
        Ok(self.layout_info(children, SizeKind::Preferred)?.total_size(insets))
    }

    /// Compute the bounds of every visible child in a container of `size`.
    ///
    /// Uses preferred sizes, or minimum sizes when the container is smaller
    /// than the preferred grid. The grid is remembered for
    /// [`Self::layout_dimensions`], [`Self::layout_origin`] and friends.
    pub fn arrange<C: LayoutItem>(
        &mut self,
        size: Size,
        insets: Insets,
        children: &[C],
    ) -> Result<Vec<(ComponentId, Rect)>, LayoutError> {
        if children.is_empty() && self.column_widths.is_empty() && self.row_heights.is_empty() {
            return Ok(Vec::new());
        }

        let (mut info, mut cells) = self.solve(children, SizeKind::Preferred)?;
        let mut wanted = info.total_size(insets);
        if size.width < wanted.width || size.height < wanted.height {
            debug!(
                width = size.width,
                height = size.height,
                preferred_width = wanted.width,
                preferred_height = wanted.height,
                "container below preferred size; using minimum sizes"
            );
            (info, cells) = self.solve(children, SizeKind::Minimum)?;
            wanted = info.total_size(insets);
        }

        let applied_w = stretch_by_weight(
            &mut info.column_widths,
            &info.column_weights,
            size.width - wanted.width,
        );
        let applied_h = stretch_by_weight(
            &mut info.row_heights,
            &info.row_weights,
            size.height - wanted.height,
        );
        let diff_w = size.width - (wanted.width + applied_w);
        let diff_h = size.height - (wanted.height + applied_h);
        // Centred even when the container is below the minimum grid, so the
        // origin goes negative and the grid overhangs both edges equally.
        info.origin = Point::new(diff_w / 2 + insets.left, diff_h / 2 + insets.top);

        let placed = cells
            .iter()
            .map(|cell| (cell.id, Self::place_in_cell(&info, cell)))
            .collect();
        debug!(
            columns = info.columns(),
            rows = info.rows(),
            origin_x = info.origin.x,
            origin_y = info.origin.y,
            "grid arranged"
        );
        self.arranged = Some(info);
        Ok(placed)
    }

    fn place_in_cell(info: &LayoutInfo, cell: &Cell) -> Rect {
        let c = &cell.constraints;
        let x = info.origin.x + info.column_widths[..cell.x].iter().sum::<i32>();
        let y = info.origin.y + info.row_heights[..cell.y].iter().sum::<i32>();
        let width: i32 = info.column_widths[cell.x..cell.x + cell.width].iter().sum();
        let height: i32 = info.row_heights[cell.y..cell.y + cell.height].iter().sum();

        let mut r = Rect::new(
            x + c.insets.left,
            y + c.insets.top,
            width - c.insets.horizontal(),
            height - c.insets.vertical(),
        );
        let (want_w, want_h) = (cell.natural.width + c.ipadx, cell.natural.height + c.ipady);
        let mut free_x = 0;
        if !c.fill.horizontal() && r.width > want_w {
            free_x = r.width - want_w;
            r.width = want_w;
        }
        let mut free_y = 0;
        if !c.fill.vertical() && r.height > want_h {
            free_y = r.height - want_h;
            r.height = want_h;
        }
        let (dx, dy) = c.anchor.offset(free_x, free_y);
        r.x += dx;
        r.y += dy;

        if r.is_empty() { Rect::default() } else { r }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inspection of the last arrangement
    // ─────────────────────────────────────────────────────────────────────

    /// Top-left corner of the grid, or the origin before any arrangement.
    #[must_use]
    pub fn layout_origin(&self) -> Point {
        self.arranged.as_ref().map_or_else(Point::default, |i| i.origin)
    }

    /// Column widths and row heights.
    #[must_use]
    pub fn layout_dimensions(&self) -> (Vec<i32>, Vec<i32>) {
        self.arranged.as_ref().map_or_else(
            || (Vec::new(), Vec::new()),
            |i| (i.column_widths.clone(), i.row_heights.clone()),
        )
    }

    /// Column and row weights.
    #[must_use]
    pub fn layout_weights(&self) -> (Vec<f64>, Vec<f64>) {
        self.arranged.as_ref().map_or_else(
            || (Vec::new(), Vec::new()),
            |i| (i.column_weights.clone(), i.row_weights.clone()),
        )
    }

    /// Cell (column, row) containing the point. Points left of or above the
    /// grid map to 0; points right of or below it map to the column or row
    /// count.
    #[must_use]
    pub fn location(&self, x: i32, y: i32) -> Point {
        let Some(info) = &self.arranged else {
            return Point::default();
        };
        let index = |start: i32, sizes: &[i32], p: i32| {
            let mut edge = start;
            for (i, s) in sizes.iter().enumerate() {
                edge += s;
                if edge > p {
                    return i;
                }
            }
            sizes.len()
        };
        Point::new(
            index(info.origin.x, &info.column_widths, x) as i32,
            index(info.origin.y, &info.row_heights, y) as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{Anchor, Fill, REMAINDER};

    fn id(n: u64) -> ComponentId {
        ComponentId::new(n)
    }

    fn child(n: u64, w: i32, h: i32) -> LayoutChild {
        LayoutChild::new(id(n), Size::new(w, h))
    }

    fn bounds(placed: &[(ComponentId, Rect)], n: u64) -> Rect {
        placed
            .iter()
            .find(|(c, _)| *c == id(n))
            .map(|(_, r)| *r)
            .unwrap()
    }

    #[test]
    fn relative_children_fill_a_row() {
        let layout = GridBagLayout::new();
        let kids = [child(1, 10, 5), child(2, 20, 8), child(3, 5, 5)];
        let info = layout.layout_info(&kids, SizeKind::Preferred).unwrap();
        assert_eq!(info.column_widths, vec![10, 20, 5]);
        assert_eq!(info.row_heights, vec![8]);
    }

    #[test]
    fn remainder_starts_next_row() {
        let mut layout = GridBagLayout::new();
        layout.set_constraints(id(2), GridBagConstraints::new().span(REMAINDER, 1));
        let kids = [child(1, 10, 5), child(2, 10, 5), child(3, 30, 5)];
        let info = layout.layout_info(&kids, SizeKind::Preferred).unwrap();
        assert_eq!(info.rows(), 2);
        assert_eq!(info.columns(), 2);
        // Child 3 sits alone at the start of row 1, widening column 0.
        assert_eq!(info.column_widths, vec![30, 10]);
    }

    #[test]
    fn spanning_child_only_adds_missing_pixels() {
        let mut layout = GridBagLayout::new();
        layout.set_constraints(id(1), GridBagConstraints::new().at(0, 0));
        layout.set_constraints(id(2), GridBagConstraints::new().at(1, 0));
        layout.set_constraints(id(3), GridBagConstraints::new().at(0, 1).span(2, 1));
        let kids = [child(1, 10, 5), child(2, 10, 5), child(3, 25, 5)];
        let info = layout.layout_info(&kids, SizeKind::Preferred).unwrap();
        // No weights: the 5 missing pixels go to the last spanned column.
        assert_eq!(info.column_widths, vec![10, 15]);
    }

    #[test]
    fn weights_distribute_extra_space_and_center_otherwise() {
        let mut layout = GridBagLayout::new();
        layout.set_constraints(id(1), GridBagConstraints::new().weight(1.0, 0.0).fill(Fill::Both));
        layout.set_constraints(id(2), GridBagConstraints::new().weight(3.0, 0.0).fill(Fill::Both));
        let kids = [child(1, 10, 10), child(2, 10, 10)];
        let placed = layout
            .arrange(Size::new(60, 20), Insets::default(), &kids)
            .unwrap();
        // 40 extra pixels split 1:3; no vertical weight, so centred.
        assert_eq!(bounds(&placed, 1), Rect::new(0, 5, 20, 10));
        assert_eq!(bounds(&placed, 2), Rect::new(20, 5, 40, 10));
        assert_eq!(layout.layout_dimensions(), (vec![20, 40], vec![10]));
        assert_eq!(layout.layout_origin(), Point::new(0, 5));
    }

    #[test]
    fn falls_back_to_minimum_sizes() {
        let mut layout = GridBagLayout::new();
        let kids = [
            child(1, 50, 10).with_minimum(Size::new(10, 10)),
            child(2, 50, 10).with_minimum(Size::new(20, 10)),
        ];
        let placed = layout
            .arrange(Size::new(40, 10), Insets::default(), &kids)
            .unwrap();
        assert_eq!(layout.layout_dimensions().0, vec![10, 20]);
        assert_eq!(bounds(&placed, 1), Rect::new(5, 0, 10, 10));
        assert_eq!(bounds(&placed, 2), Rect::new(15, 0, 20, 10));
    }

    #[test]
    fn undersized_container_centres_with_negative_origin() {
        let mut layout = GridBagLayout::new();
        let kids = [child(1, 100, 10)];
        let placed = layout
            .arrange(Size::new(60, 10), Insets::default(), &kids)
            .unwrap();
        assert_eq!(layout.layout_origin(), Point::new(-20, 0));
        assert_eq!(bounds(&placed, 1), Rect::new(-20, 0, 100, 10));
    }

    #[test]
    fn anchor_fill_insets_and_padding() {
        let mut layout = GridBagLayout::new().with_column_widths([40]).with_row_heights([30]);
        layout.set_constraints(
            id(1),
            GridBagConstraints::new()
                .anchor(Anchor::SouthEast)
                .insets(Insets::new(1, 2, 3, 4))
                .ipad(2, 2),
        );
        let placed = layout
            .arrange(Size::new(40, 30), Insets::default(), &[child(1, 10, 10)])
            .unwrap();
        // Cell interior: x 2..36, y 1..27; component 12x12 at the far corner.
        assert_eq!(bounds(&placed, 1), Rect::new(24, 15, 12, 12));
    }

    #[test]
    fn container_insets_shift_grid() {
        let mut layout = GridBagLayout::new();
        let insets = Insets::new(2, 3, 4, 5);
        assert_eq!(
            layout.preferred_layout_size(insets, &[child(1, 10, 10)]).unwrap(),
            Size::new(18, 16)
        );
        let placed = layout.arrange(Size::new(18, 16), insets, &[child(1, 10, 10)]).unwrap();
        assert_eq!(bounds(&placed, 1), Rect::new(3, 2, 10, 10));
    }

    #[test]
    fn cells_without_area_collapse() {
        let mut layout = GridBagLayout::new();
        layout.set_constraints(id(1), GridBagConstraints::new().insets(Insets::uniform(10)));
        let placed = layout
            .arrange(Size::new(5, 5), Insets::default(), &[child(1, 0, 0)])
            .unwrap();
        assert_eq!(bounds(&placed, 1), Rect::default());
    }

    #[test]
    fn hidden_children_take_no_cells() {
        let layout = GridBagLayout::new();
        let kids = [child(1, 10, 10), child(2, 99, 99).with_visible(false), child(3, 10, 10)];
        let info = layout.layout_info(&kids, SizeKind::Preferred).unwrap();
        assert_eq!(info.column_widths, vec![10, 10]);
    }

    #[test]
    fn grid_too_large_is_an_error() {
        let mut layout = GridBagLayout::new();
        layout.set_constraints(id(1), GridBagConstraints::new().at(600, 0));
        let err = layout
            .layout_info(&[child(1, 1, 1)], SizeKind::Minimum)
            .unwrap_err();
        assert_eq!(
            err,
            LayoutError::GridTooLarge {
                requested: 600,
                max: MAX_GRID_SIZE
            }
        );
    }

    #[test]
    fn location_clamps_outside_points() {
        let mut layout = GridBagLayout::new();
        assert_eq!(layout.location(5, 5), Point::default());
        let kids = [child(1, 10, 10), child(2, 10, 10)];
        layout.arrange(Size::new(20, 10), Insets::default(), &kids).unwrap();
        assert_eq!(layout.location(-3, -3), Point::new(0, 0));
        assert_eq!(layout.location(12, 3), Point::new(1, 0));
        assert_eq!(layout.location(25, 30), Point::new(2, 1));
    }

    #[test]
    fn empty_container_is_left_alone() {
        let mut layout = GridBagLayout::new();
        let none: [LayoutChild; 0] = [];
        assert!(layout.arrange(Size::new(10, 10), Insets::default(), &none).unwrap().is_empty());
        assert_eq!(layout.layout_dimensions(), (Vec::new(), Vec::new()));
    }
}
