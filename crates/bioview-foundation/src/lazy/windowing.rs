//! Windowing calculator: which indices intersect the viewport.
//!
//! Every row has the same estimated size, so the math is closed-form and
//! independent of how many records are cached. A calculator instance is
//! immutable; a change of total count, lane count, or item estimate builds a
//! new one (with a new [`epoch`](WindowingCalculator::epoch)) and the caller
//! threads the scroll offset through explicitly.
//!
//! Two coordinate spaces are involved. Item geometry lives in content space,
//! `row * estimate_item_size`. The host's scroll offset lives in scroll space,
//! whose extent is capped at [`MAX_SCROLL_EXTENT`]. Below the cap the two are
//! identical; above it the scroll range maps linearly onto the content range,
//! so the last scroll position still shows the last row.

use std::sync::atomic::{AtomicU64, Ordering};

use super::viewport::{ViewportHandler, ViewportRange};

/// Largest scrollable extent handed to the host, in pixels.
///
/// Browsers and most native toolkits degrade (or refuse to lay out) beyond
/// roughly 2^25 px. Only the reported extent is capped; index math is not.
/// See [`WindowingCalculator::content_offset`] for how offsets are mapped.
pub const MAX_SCROLL_EXTENT: f64 = 33_554_428.0;

/// Row height used when nothing better is configured.
pub const DEFAULT_ITEM_SIZE_ESTIMATE: f64 = 48.0;

/// Rows rendered beyond each viewport edge by default.
pub const DEFAULT_OVERSCAN: usize = 5;

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Geometry inputs for one calculator instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowConfig {
    /// Main-axis size of one row (table row height or card height).
    pub estimate_item_size: f64,
    /// Items per row; 1 for a plain list.
    pub lane_count: usize,
    /// Extra rows rendered above and below the viewport.
    pub overscan: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            estimate_item_size: DEFAULT_ITEM_SIZE_ESTIMATE,
            lane_count: 1,
            overscan: DEFAULT_OVERSCAN,
        }
    }
}

impl WindowConfig {
    fn sanitized(self) -> Self {
        let estimate_item_size =
            if self.estimate_item_size.is_finite() && self.estimate_item_size >= 1.0 {
                self.estimate_item_size
            } else {
                log::warn!(
                    "item size estimate {} is unusable, falling back to {}",
                    self.estimate_item_size,
                    DEFAULT_ITEM_SIZE_ESTIMATE
                );
                DEFAULT_ITEM_SIZE_ESTIMATE
            };
        Self {
            estimate_item_size,
            lane_count: self.lane_count.max(1),
            overscan: self.overscan,
        }
    }
}

/// One rendered slot. Derived per tick, never persisted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VirtualItem {
    pub index: usize,
    /// Main-axis pixel offset of the item's row.
    pub start: f64,
    pub size: f64,
    pub lane: usize,
}

impl VirtualItem {
    pub fn end(&self) -> f64 {
        self.start + self.size
    }
}

/// Output of one [`WindowingCalculator::compute`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct Window {
    epoch: u64,
    items: Vec<VirtualItem>,
    total_extent: f64,
    content_offset: f64,
    range: Option<ViewportRange>,
}

impl Window {
    /// Epoch of the calculator that produced this window.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Items in ascending index order.
    pub fn items(&self) -> &[VirtualItem] {
        &self.items
    }

    /// Scrollable extent to report to the host (capped).
    pub fn total_extent(&self) -> f64 {
        self.total_extent
    }

    /// Content-space offset at the viewport's leading edge. An item is drawn
    /// at `item.start - content_offset` relative to the viewport.
    pub fn content_offset(&self) -> f64 {
        self.content_offset
    }

    /// Bounds of [`items`](Self::items); `None` when nothing is rendered.
    pub fn range(&self) -> Option<ViewportRange> {
        self.range
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Immutable windowing math for one `(total_count, config)` pair.
#[derive(Clone, Debug)]
pub struct WindowingCalculator {
    epoch: u64,
    total_count: usize,
    config: WindowConfig,
    initial_offset: f64,
}

impl WindowingCalculator {
    /// Builds a calculator. `initial_offset` is the scroll offset the host
    /// should show first; pass the captured offset when rebuilding for a
    /// re-layout, or the scrollbar silently jumps to the top.
    pub fn new(total_count: usize, config: WindowConfig, initial_offset: f64) -> Self {
        let config = config.sanitized();
        let mut calculator = Self {
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            total_count,
            config,
            initial_offset: 0.0,
        };
        calculator.initial_offset = calculator.clamp_offset(initial_offset);
        calculator
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn config(&self) -> WindowConfig {
        self.config
    }

    pub fn lane_count(&self) -> usize {
        self.config.lane_count
    }

    pub fn estimate_item_size(&self) -> f64 {
        self.config.estimate_item_size
    }

    pub fn initial_offset(&self) -> f64 {
        self.initial_offset
    }

    pub fn row_count(&self) -> usize {
        self.total_count.div_ceil(self.config.lane_count)
    }

    /// Uncapped main-axis size of all rows.
    pub fn content_extent(&self) -> f64 {
        self.row_count() as f64 * self.config.estimate_item_size
    }

    /// Extent reported to the host's scrollbar.
    pub fn scroll_extent(&self) -> f64 {
        self.content_extent().min(MAX_SCROLL_EXTENT)
    }

    /// Largest offset at which the viewport is still filled.
    pub fn max_scroll_offset(&self, viewport_size: f64) -> f64 {
        (self.scroll_extent() - viewport_size.max(0.0)).max(0.0)
    }

    /// Content-space counterpart of [`max_scroll_offset`](Self::max_scroll_offset).
    pub fn max_content_offset(&self, viewport_size: f64) -> f64 {
        (self.content_extent() - viewport_size.max(0.0)).max(0.0)
    }

    /// Scroll and content ranges when they differ, `None` below the cap.
    fn scaled_ranges(&self, viewport_size: f64) -> Option<(f64, f64)> {
        let scroll_range = self.max_scroll_offset(viewport_size);
        let content_range = self.max_content_offset(viewport_size);
        (scroll_range > 0.0 && content_range > scroll_range)
            .then_some((scroll_range, content_range))
    }

    /// Maps a host scroll offset to the content offset it shows.
    pub fn content_offset(&self, scroll_offset: f64, viewport_size: f64) -> f64 {
        let offset = if scroll_offset.is_finite() {
            scroll_offset.max(0.0)
        } else {
            0.0
        };
        match self.scaled_ranges(viewport_size) {
            Some((scroll_range, content_range)) => {
                offset.min(scroll_range) / scroll_range * content_range
            }
            None => offset,
        }
    }

    /// Inverse of [`content_offset`](Self::content_offset).
    pub fn scroll_offset_for(&self, content_offset: f64, viewport_size: f64) -> f64 {
        let offset = if content_offset.is_finite() {
            content_offset.max(0.0)
        } else {
            0.0
        };
        match self.scaled_ranges(viewport_size) {
            Some((scroll_range, content_range)) => {
                offset.min(content_range) / content_range * scroll_range
            }
            None => offset,
        }
    }

    /// Row containing the content-space pixel `offset`.
    pub fn row_for_offset(&self, offset: f64) -> usize {
        let offset = if offset.is_finite() { offset.max(0.0) } else { 0.0 };
        (offset / self.config.estimate_item_size).floor() as usize
    }

    /// First absolute index on the row containing `offset`.
    pub fn index_for_offset(&self, offset: f64) -> usize {
        self.row_for_offset(offset) * self.config.lane_count
    }

    /// Content-space start of the row holding `index`.
    pub fn offset_for_index(&self, index: usize) -> f64 {
        (index / self.config.lane_count) as f64 * self.config.estimate_item_size
    }

    /// Geometry of `index`, or `None` past the end.
    pub fn item(&self, index: usize) -> Option<VirtualItem> {
        (index < self.total_count).then(|| VirtualItem {
            index,
            start: self.offset_for_index(index),
            size: self.config.estimate_item_size,
            lane: index % self.config.lane_count,
        })
    }

    fn clamp_offset(&self, offset: f64) -> f64 {
        if !offset.is_finite() {
            return 0.0;
        }
        offset.clamp(0.0, self.scroll_extent())
    }

    /// Items intersecting the viewport at host offset `scroll_offset`, plus
    /// `overscan` rows on each side.
    pub fn compute(&self, scroll_offset: f64, viewport_size: f64) -> Window {
        if self.total_count == 0 {
            return Window {
                epoch: self.epoch,
                items: Vec::new(),
                total_extent: 0.0,
                content_offset: 0.0,
                range: None,
            };
        }

        let estimate = self.config.estimate_item_size;
        let lanes = self.config.lane_count;
        let viewport = ViewportHandler::new(viewport_size, estimate).effective_size();
        let content_offset = self.content_offset(scroll_offset, viewport);
        let last_row_index = self.row_count() - 1;

        let first_row = self.row_for_offset(content_offset).min(last_row_index);
        let visible_end = content_offset + viewport;
        let last_row = if viewport > 0.0 {
            ((visible_end / estimate).ceil() as usize)
                .saturating_sub(1)
                .clamp(first_row, last_row_index)
        } else {
            first_row
        };

        let start_row = first_row.saturating_sub(self.config.overscan);
        let end_row = last_row
            .saturating_add(self.config.overscan)
            .min(last_row_index);

        let first_index = start_row * lanes;
        let last_index = ((end_row + 1) * lanes).min(self.total_count) - 1;

        let items = (first_index..=last_index)
            .map(|index| VirtualItem {
                index,
                start: (index / lanes) as f64 * estimate,
                size: estimate,
                lane: index % lanes,
            })
            .collect();

        Window {
            epoch: self.epoch,
            items,
            total_extent: self.scroll_extent(),
            content_offset,
            range: Some(ViewportRange::new(first_index, last_index)),
        }
    }
}

/// One-shot form of the calculator for callers that hold no state.
pub fn compute_window(
    total_count: usize,
    scroll_offset: f64,
    viewport_size: f64,
    estimate_item_size: f64,
    lane_count: usize,
    overscan: usize,
) -> Window {
    WindowingCalculator::new(
        total_count,
        WindowConfig {
            estimate_item_size,
            lane_count,
            overscan,
        },
        scroll_offset,
    )
    .compute(scroll_offset, viewport_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(window: &Window) -> Vec<usize> {
        window.items().iter().map(|item| item.index).collect()
    }

    #[test]
    fn empty_result_set_renders_nothing() {
        let window = compute_window(0, 0.0, 600.0, 40.0, 1, 5);
        assert!(window.is_empty());
        assert_eq!(window.total_extent(), 0.0);
        assert_eq!(window.range(), None);
    }

    #[test]
    fn list_at_top_covers_viewport_plus_overscan() {
        // 600 / 40 = 15 visible rows (0..=14), plus 5 overscan below.
        let window = compute_window(1000, 0.0, 600.0, 40.0, 1, 5);
        assert_eq!(window.range(), Some(ViewportRange::new(0, 19)));
        assert_eq!(window.items().len(), 20);
        assert_eq!(window.total_extent(), 40_000.0);
    }

    #[test]
    fn scrolled_list_adds_overscan_on_both_sides() {
        // offset 4000 -> row 100; rows 100..=114 visible.
        let window = compute_window(1000, 4000.0, 600.0, 40.0, 1, 5);
        assert_eq!(window.range(), Some(ViewportRange::new(95, 119)));
        let first = window.items()[0];
        assert_eq!(first.start, 95.0 * 40.0);
        assert_eq!(first.lane, 0);
    }

    #[test]
    fn partial_row_at_viewport_bottom_is_included() {
        // offset 20 shows half of row 0 and half of row 15.
        let window = compute_window(1000, 20.0, 600.0, 40.0, 1, 0);
        assert_eq!(window.range(), Some(ViewportRange::new(0, 15)));
    }

    #[test]
    fn grid_assigns_lanes_and_shares_row_offsets() {
        let window = compute_window(10, 0.0, 1000.0, 200.0, 4, 0);
        assert_eq!(indices(&window), (0..10).collect::<Vec<_>>());
        let item = window.items()[6];
        assert_eq!(item.lane, 2);
        assert_eq!(item.start, 200.0);
        // 10 items over 4 lanes = 3 rows.
        assert_eq!(window.total_extent(), 600.0);
    }

    #[test]
    fn grid_row_for_offset_is_row_times_lanes() {
        let calculator = WindowingCalculator::new(
            1000,
            WindowConfig {
                estimate_item_size: 250.0,
                lane_count: 4,
                overscan: 0,
            },
            0.0,
        );
        assert_eq!(calculator.index_for_offset(1010.0), 16);
        assert_eq!(calculator.offset_for_index(17), 1000.0);
        assert_eq!(calculator.item(1000), None);
    }

    #[test]
    fn range_never_passes_total_count() {
        let window = compute_window(23, 10_000.0, 600.0, 40.0, 1, 5);
        let range = window.range().expect("non-empty");
        assert_eq!(range.last_index, 22);
        assert!(range.first_index <= 22);
    }

    #[test]
    fn huge_result_set_caps_only_the_extent() {
        let calculator = WindowingCalculator::new(5_000_000, WindowConfig::default(), 0.0);
        assert_eq!(calculator.content_extent(), 5_000_000.0 * 48.0);
        assert_eq!(calculator.scroll_extent(), MAX_SCROLL_EXTENT);
        assert_eq!(calculator.offset_for_index(400_000), 48.0 * 400_000.0);

        let top = calculator.compute(0.0, 480.0);
        assert_eq!(top.total_extent(), MAX_SCROLL_EXTENT);
        assert_eq!(top.content_offset(), 0.0);
        assert_eq!(top.range().map(|r| r.first_index), Some(0));
    }

    #[test]
    fn last_scroll_position_shows_the_last_row_past_the_cap() {
        let calculator = WindowingCalculator::new(
            1_000_000,
            WindowConfig {
                estimate_item_size: 36.0,
                lane_count: 1,
                overscan: 0,
            },
            0.0,
        );
        let max = calculator.max_scroll_offset(720.0);
        let window = calculator.compute(max, 720.0);
        let range = window.range().expect("non-empty");
        assert_eq!(range.last_index, 999_999);
        assert!((window.content_offset() - calculator.max_content_offset(720.0)).abs() < 1e-3);
    }

    #[test]
    fn offsets_below_the_cap_are_not_rescaled() {
        let calculator = WindowingCalculator::new(1000, WindowConfig::default(), 0.0);
        assert_eq!(calculator.content_offset(1234.0, 600.0), 1234.0);
        assert_eq!(calculator.scroll_offset_for(1234.0, 600.0), 1234.0);
    }

    #[test]
    fn content_and_scroll_offsets_round_trip_past_the_cap() {
        let calculator = WindowingCalculator::new(2_000_000, WindowConfig::default(), 0.0);
        let content = calculator.offset_for_index(1_500_000);
        let scroll = calculator.scroll_offset_for(content, 600.0);
        assert!(scroll < calculator.max_scroll_offset(600.0));
        assert!((calculator.content_offset(scroll, 600.0) - content).abs() < 1e-3);
        let window = calculator.compute(scroll, 600.0);
        assert!(window.range().is_some_and(|r| r.contains(1_500_000)));
    }

    #[test]
    fn each_rebuild_gets_a_fresh_epoch() {
        let a = WindowingCalculator::new(10, WindowConfig::default(), 0.0);
        let b = WindowingCalculator::new(10, WindowConfig::default(), 0.0);
        assert_ne!(a.epoch(), b.epoch());
        assert_eq!(a.compute(0.0, 100.0).epoch(), a.epoch());
    }

    #[test]
    fn degenerate_config_is_sanitized() {
        let calculator = WindowingCalculator::new(
            10,
            WindowConfig {
                estimate_item_size: 0.0,
                lane_count: 0,
                overscan: 0,
            },
            -30.0,
        );
        assert_eq!(calculator.lane_count(), 1);
        assert_eq!(calculator.estimate_item_size(), DEFAULT_ITEM_SIZE_ESTIMATE);
        assert_eq!(calculator.initial_offset(), 0.0);
    }

    #[test]
    fn initial_offset_is_kept_within_extent() {
        let calculator = WindowingCalculator::new(100, WindowConfig::default(), 1234.0);
        assert_eq!(calculator.initial_offset(), 1234.0);
        let short = WindowingCalculator::new(2, WindowConfig::default(), 1234.0);
        assert_eq!(short.initial_offset(), 96.0);
    }
}
