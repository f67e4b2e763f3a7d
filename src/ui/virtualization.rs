/// VirtualizationEngine - computes which rows and columns to render
///
/// Given scroll offsets and viewport size it produces contiguous render
/// ranges, widened by an overscan margin. Frozen columns are never
/// virtualized; they are always part of the window.
///
/// Cost model:
/// - scrolling walks from the previous anchor, so the work is proportional
///   to the distance scrolled (uniform row heights are O(1))
/// - axis totals are cached, so clamping a scroll never sums the axis
/// - structural changes (row count, column set, viewport size) only
///   recompute the current window
use std::ops::Range;

use ratatui::layout::Rect;
use tracing::{debug, trace};

/// Row/column overscan defaults
pub const DEFAULT_OVERSCAN_ROWS: usize = 5;
pub const DEFAULT_OVERSCAN_COLUMNS: usize = 2;
pub const DEFAULT_ROW_HEIGHT: u32 = 36;
pub const DEFAULT_HEADER_HEIGHT: u32 = 40;

#[derive(Debug, Clone, PartialEq)]
pub enum RowHeights {
    Uniform(u32),
    Variable(Vec<u32>),
}

/// Sizes along one axis, with a movable anchor (index + its start offset)
#[derive(Debug, Clone)]
struct Axis {
    sizes: AxisSizes,
    anchor_index: usize,
    anchor_offset: u64,
    /// Sum of all sizes, kept in step with `sizes`
    total: u64,
    /// Items stepped over by the last locate/measure (diagnostics)
    last_steps: usize,
}

#[derive(Debug, Clone)]
enum AxisSizes {
    Uniform { size: u32, count: usize },
    Variable(Vec<u32>),
}

impl Axis {
    fn uniform(size: u32, count: usize) -> Self {
        Self {
            sizes: AxisSizes::Uniform {
                size: size.max(1),
                count,
            },
            anchor_index: 0,
            anchor_offset: 0,
            total: size.max(1) as u64 * count as u64,
            last_steps: 0,
        }
    }

    fn variable(sizes: Vec<u32>) -> Self {
        let total: u64 = sizes.iter().map(|s| clamp_size(*s)).sum();
        Self {
            sizes: AxisSizes::Variable(sizes),
            anchor_index: 0,
            anchor_offset: 0,
            total,
            last_steps: 0,
        }
    }

    fn count(&self) -> usize {
        match &self.sizes {
            AxisSizes::Uniform { count, .. } => *count,
            AxisSizes::Variable(v) => v.len(),
        }
    }

    fn size_of(&self, index: usize) -> u64 {
        match &self.sizes {
            AxisSizes::Uniform { size, .. } => *size as u64,
            AxisSizes::Variable(v) => v.get(index).copied().map(clamp_size).unwrap_or(1),
        }
    }

    /// Grow or shrink to `count` items; new items get `fill`
    fn resize(&mut self, count: usize, fill: u32) {
        match &mut self.sizes {
            AxisSizes::Uniform { size, count: current } => {
                *current = count;
                self.total = *size as u64 * count as u64;
            }
            AxisSizes::Variable(v) => {
                let old = v.len();
                if count < old {
                    let removed: u64 = v[count..].iter().map(|s| clamp_size(*s)).sum();
                    self.total -= removed;
                } else {
                    self.total += (count - old) as u64 * clamp_size(fill);
                }
                v.resize(count, fill);
                if self.anchor_index >= count {
                    self.anchor_index = 0;
                    self.anchor_offset = 0;
                }
            }
        }
    }

    /// Start offset of `index`, walking from the anchor without moving it
    fn offset_of(&self, index: usize) -> u64 {
        match &self.sizes {
            AxisSizes::Uniform { size, .. } => index as u64 * *size as u64,
            AxisSizes::Variable(_) => {
                let mut offset = self.anchor_offset;
                if index >= self.anchor_index {
                    for i in self.anchor_index..index {
                        offset += self.size_of(i);
                    }
                } else {
                    for i in index..self.anchor_index {
                        offset -= self.size_of(i);
                    }
                }
                offset
            }
        }
    }

    /// Index of the item containing `offset`; moves the anchor there
    fn locate(&mut self, offset: u64) -> usize {
        let count = self.count();
        if count == 0 {
            self.last_steps = 0;
            return 0;
        }
        match self.sizes {
            AxisSizes::Uniform { size, .. } => {
                self.last_steps = 1;
                ((offset / size as u64) as usize).min(count - 1)
            }
            AxisSizes::Variable(_) => {
                let mut steps = 0;
                let mut index = self.anchor_index.min(count - 1);
                let mut start = if index == self.anchor_index {
                    self.anchor_offset
                } else {
                    self.offset_of(index)
                };
                while offset < start && index > 0 {
                    index -= 1;
                    start -= self.size_of(index);
                    steps += 1;
                }
                while index + 1 < count && offset >= start + self.size_of(index) {
                    start += self.size_of(index);
                    index += 1;
                    steps += 1;
                }
                self.anchor_index = index;
                self.anchor_offset = start;
                self.last_steps = steps;
                index
            }
        }
    }

    /// Half-open range of items intersecting [offset, offset + extent)
    fn span(&mut self, offset: u64, extent: u64) -> Range<usize> {
        let count = self.count();
        if count == 0 || extent == 0 {
            return 0..0;
        }
        let first = self.locate(offset);
        let end_offset = offset + extent;
        match self.sizes {
            AxisSizes::Uniform { size, .. } => {
                let last = end_offset.div_ceil(size as u64) as usize;
                first..last.min(count).max(first + 1)
            }
            AxisSizes::Variable(_) => {
                let mut index = first;
                let mut cursor = self.anchor_offset;
                while index < count && cursor < end_offset {
                    cursor += self.size_of(index);
                    index += 1;
                    self.last_steps += 1;
                }
                first..index.max(first + 1)
            }
        }
    }

    fn total(&self) -> u64 {
        self.total
    }
}

fn clamp_size(size: u32) -> u64 {
    size.max(1) as u64
}

/// Result of a window computation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderWindow {
    /// Row indices to render (overscan included)
    pub rows: Range<usize>,
    /// Range into the scrollable (non-frozen) columns
    pub columns: Range<usize>,
    /// Layout indices of frozen columns, always rendered
    pub frozen_columns: Vec<usize>,
    /// Layout indices of the rendered scrollable columns
    pub scrollable_columns: Vec<usize>,
}

impl RenderWindow {
    /// All layout column indices to render, frozen first
    pub fn column_indices(&self) -> Vec<usize> {
        self.frozen_columns
            .iter()
            .chain(self.scrollable_columns.iter())
            .copied()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollState {
    pub top: u32,
    pub left: u32,
}

pub struct VirtualizationEngine {
    rows: Axis,
    columns: Axis,
    frozen: Vec<usize>,
    scrollable: Vec<usize>,
    frozen_width: u64,
    column_widths: Vec<u16>,
    viewport_width: u32,
    viewport_height: u32,
    header_height: u32,
    scroll: ScrollState,
    overscan_rows: usize,
    overscan_columns: usize,
    window: RenderWindow,
}

impl VirtualizationEngine {
    pub fn new(row_count: usize, row_height: u32) -> Self {
        Self {
            rows: Axis::uniform(row_height, row_count),
            columns: Axis::variable(Vec::new()),
            frozen: Vec::new(),
            scrollable: Vec::new(),
            frozen_width: 0,
            column_widths: Vec::new(),
            viewport_width: 0,
            viewport_height: 0,
            header_height: DEFAULT_HEADER_HEIGHT,
            scroll: ScrollState { top: 0, left: 0 },
            overscan_rows: DEFAULT_OVERSCAN_ROWS,
            overscan_columns: DEFAULT_OVERSCAN_COLUMNS,
            window: RenderWindow::default(),
        }
    }

    pub fn with_overscan(mut self, rows: usize, columns: usize) -> Self {
        self.overscan_rows = rows;
        self.overscan_columns = columns;
        self.recompute();
        self
    }

    pub fn with_header_height(mut self, height: u32) -> Self {
        self.header_height = height;
        self.recompute();
        self
    }

    // ----- structural changes -----

    pub fn set_row_heights(&mut self, heights: RowHeights, row_count: usize) {
        self.rows = match heights {
            RowHeights::Uniform(h) => Axis::uniform(h, row_count),
            RowHeights::Variable(mut v) => {
                v.resize(row_count, DEFAULT_ROW_HEIGHT);
                Axis::variable(v)
            }
        };
        debug!(target: "viewport", "Row metrics changed: {} rows", row_count);
        self.recompute();
    }

    pub fn set_row_count(&mut self, row_count: usize) {
        self.rows.resize(row_count, DEFAULT_ROW_HEIGHT);
        self.scroll.top = (self.scroll.top as u64).min(self.max_scroll_top()) as u32;
        self.recompute();
    }

    /// Set column widths and frozen flags in layout order
    pub fn set_columns(&mut self, widths: &[u16], frozen: &[bool]) {
        self.frozen.clear();
        self.scrollable.clear();
        let mut scroll_widths = Vec::with_capacity(widths.len());
        let mut frozen_width = 0u64;
        for (idx, width) in widths.iter().enumerate() {
            if frozen.get(idx).copied().unwrap_or(false) {
                self.frozen.push(idx);
                frozen_width += *width as u64;
            } else {
                self.scrollable.push(idx);
                scroll_widths.push(*width as u32);
            }
        }
        self.frozen_width = frozen_width;
        self.column_widths = widths.to_vec();
        self.columns = Axis::variable(scroll_widths);
        debug!(target: "viewport", "Columns changed: {} frozen, {} scrollable",
            self.frozen.len(), self.scrollable.len());
        self.recompute();
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width != self.viewport_width || height != self.viewport_height {
            self.viewport_width = width;
            self.viewport_height = height;
            self.recompute();
        }
    }

    // ----- scrolling -----

    pub fn scroll_to(&mut self, top: u32, left: u32) -> &RenderWindow {
        let top = (top as u64).min(self.max_scroll_top()) as u32;
        let left = (left as u64).min(self.max_scroll_left()) as u32;
        if top != self.scroll.top || left != self.scroll.left {
            self.scroll = ScrollState { top, left };
            self.recompute();
        }
        &self.window
    }

    pub fn scroll_by(&mut self, delta_top: i64, delta_left: i64) -> &RenderWindow {
        let top = (self.scroll.top as i64 + delta_top).max(0) as u32;
        let left = (self.scroll.left as i64 + delta_left).max(0) as u32;
        self.scroll_to(top, left)
    }

    /// Scroll the minimum amount needed for `row` to be fully visible
    pub fn ensure_row_visible(&mut self, row: usize) -> &RenderWindow {
        if row >= self.rows.count() {
            return &self.window;
        }
        let start = self.rows.offset_of(row);
        let end = start + self.rows.size_of(row);
        let body = self.body_height();
        let top = self.scroll.top as u64;
        let new_top = if start < top {
            start
        } else if end > top + body {
            end.saturating_sub(body)
        } else {
            top
        };
        self.scroll_to(new_top as u32, self.scroll.left)
    }

    // ----- queries -----

    pub fn window(&self) -> &RenderWindow {
        &self.window
    }

    pub fn scroll(&self) -> ScrollState {
        self.scroll
    }

    pub fn row_count(&self) -> usize {
        self.rows.count()
    }

    pub fn total_height(&self) -> u64 {
        self.rows.total()
    }

    pub fn total_width(&self) -> u64 {
        self.frozen_width + self.columns.total()
    }

    /// Items walked during the last recompute (rows)
    pub fn last_row_steps(&self) -> usize {
        self.rows.last_steps
    }

    /// Bounding box of a cell in viewport coordinates, if it is on screen
    pub fn cell_rect(&self, row: usize, layout_column: usize) -> Option<Rect> {
        if row >= self.rows.count() || layout_column >= self.column_widths.len() {
            return None;
        }
        let y = self.header_height as i64 + self.rows.offset_of(row) as i64
            - self.scroll.top as i64;
        let height = self.rows.size_of(row) as i64;

        let x = if let Some(pos) = self.frozen.iter().position(|&c| c == layout_column) {
            self.frozen[..pos]
                .iter()
                .map(|&c| self.column_widths[c] as i64)
                .sum::<i64>()
        } else {
            let pos = self.scrollable.iter().position(|&c| c == layout_column)?;
            self.frozen_width as i64 + self.columns.offset_of(pos) as i64
                - self.scroll.left as i64
        };
        let width = self.column_widths[layout_column] as i64;

        if y + height <= 0
            || y >= self.viewport_height as i64
            || x + width <= 0
            || x >= self.viewport_width as i64
        {
            return None;
        }
        Some(Rect::new(
            x.clamp(0, u16::MAX as i64) as u16,
            y.clamp(0, u16::MAX as i64) as u16,
            width.clamp(0, u16::MAX as i64) as u16,
            height.clamp(0, u16::MAX as i64) as u16,
        ))
    }

    fn body_height(&self) -> u64 {
        self.viewport_height.saturating_sub(self.header_height) as u64
    }

    fn max_scroll_top(&self) -> u64 {
        self.rows.total().saturating_sub(self.body_height())
    }

    fn max_scroll_left(&self) -> u64 {
        let scroll_viewport = (self.viewport_width as u64).saturating_sub(self.frozen_width);
        self.columns.total().saturating_sub(scroll_viewport)
    }

    fn recompute(&mut self) {
        let body = self.body_height();
        let visible_rows = self.rows.span(self.scroll.top as u64, body);
        let rows = if visible_rows.is_empty() {
            0..0
        } else {
            visible_rows.start.saturating_sub(self.overscan_rows)
                ..(visible_rows.end + self.overscan_rows).min(self.rows.count())
        };

        let scroll_viewport = (self.viewport_width as u64).saturating_sub(self.frozen_width);
        let visible_cols = self.columns.span(self.scroll.left as u64, scroll_viewport);
        let columns = if visible_cols.is_empty() {
            0..0
        } else {
            visible_cols.start.saturating_sub(self.overscan_columns)
                ..(visible_cols.end + self.overscan_columns).min(self.columns.count())
        };

        let scrollable_columns = self.scrollable[columns.clone()].to_vec();
        trace!(target: "viewport", "Window rows {:?} cols {:?} (walked {} rows)",
            rows, columns, self.rows.last_steps);

        self.window = RenderWindow {
            rows,
            columns,
            frozen_columns: self.frozen.clone(),
            scrollable_columns,
        };
    }
}
