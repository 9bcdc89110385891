//! Keeping the user's place across re-layouts and programmatic navigation.

use super::windowing::WindowingCalculator;

/// Where to place a target row when scrolling to it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Align {
    /// Row's leading edge at the viewport's leading edge.
    Start,
    /// Row centred in the viewport.
    Center,
    /// Row's trailing edge at the viewport's trailing edge.
    End,
    /// Scroll only if the row is not fully visible, and only as far as needed.
    #[default]
    Auto,
}

/// The host's scrollable element.
pub trait ScrollContainer {
    fn scroll_offset(&self) -> f64;
    fn set_scroll_offset(&mut self, offset: f64);
    fn viewport_size(&self) -> f64;
}

/// One-shot scroll instruction; `should_scroll` is cleared once acted upon.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScrollState {
    pub target_index: usize,
    pub should_scroll: bool,
    pub align: Align,
}

/// Captures and restores scroll offsets around structural changes, and
/// resolves index targets to offsets.
#[derive(Debug, Default)]
pub struct ScrollPositionPreserver {
    scroll_state: ScrollState,
    captured: Option<f64>,
}

impl ScrollPositionPreserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the container's current offset ahead of a re-layout.
    pub fn capture_offset<C: ScrollContainer + ?Sized>(&mut self, container: &C) -> f64 {
        let offset = container.scroll_offset();
        self.captured = Some(offset);
        offset
    }

    /// Offset captured by the last [`capture_offset`](Self::capture_offset)
    /// that has not been restored yet.
    pub fn captured(&self) -> Option<f64> {
        self.captured
    }

    /// Writes `offset` back to the container and forgets the capture.
    pub fn restore_offset<C: ScrollContainer + ?Sized>(&mut self, container: &mut C, offset: f64) {
        self.captured = None;
        if container.scroll_offset() != offset {
            container.set_scroll_offset(offset);
        }
    }

    /// Host scroll offset that shows `index` with `align`, clamped to the
    /// scrollable range. `current_offset` is a host scroll offset too.
    ///
    /// Returns `None` for [`Align::Auto`] when the row is already fully
    /// visible, and when `index` is past the end.
    pub fn offset_for_index(
        calculator: &WindowingCalculator,
        index: usize,
        align: Align,
        current_offset: f64,
        viewport_size: f64,
    ) -> Option<f64> {
        let item = calculator.item(index)?;
        let viewport = viewport_size.max(0.0);
        let current_offset = calculator.content_offset(current_offset, viewport);
        let target = match align {
            Align::Start => item.start,
            Align::End => item.end() - viewport,
            Align::Center => item.start + item.size / 2.0 - viewport / 2.0,
            Align::Auto => {
                let view_end = current_offset + viewport;
                if item.start >= current_offset && item.end() <= view_end {
                    return None;
                } else if item.start < current_offset || item.size > viewport {
                    item.start
                } else {
                    item.end() - viewport
                }
            }
        };
        let target = target.clamp(0.0, calculator.max_content_offset(viewport));
        Some(calculator.scroll_offset_for(target, viewport))
    }

    /// Scrolls `container` so `index` is shown with `align`. Returns the new
    /// offset, or `None` if nothing moved.
    pub fn scroll_to_index<C: ScrollContainer + ?Sized>(
        &self,
        container: &mut C,
        calculator: &WindowingCalculator,
        index: usize,
        align: Align,
    ) -> Option<f64> {
        let current = container.scroll_offset();
        let target = Self::offset_for_index(
            calculator,
            index,
            align,
            current,
            container.viewport_size(),
        )?;
        if target == current {
            return None;
        }
        container.set_scroll_offset(target);
        Some(target)
    }

    /// Queues a scroll to `index` for the next [`apply_pending`](Self::apply_pending).
    pub fn request_scroll(&mut self, index: usize, align: Align) {
        self.scroll_state = ScrollState {
            target_index: index,
            should_scroll: true,
            align,
        };
    }

    pub fn scroll_state(&self) -> ScrollState {
        self.scroll_state
    }

    /// Acts on a queued scroll exactly once. The flag is cleared before the
    /// scroll is issued, so unrelated re-renders never re-scroll.
    pub fn apply_pending<C: ScrollContainer + ?Sized>(
        &mut self,
        container: &mut C,
        calculator: &WindowingCalculator,
    ) -> Option<f64> {
        if !self.scroll_state.should_scroll {
            return None;
        }
        self.scroll_state.should_scroll = false;
        let ScrollState {
            target_index,
            align,
            ..
        } = self.scroll_state;
        self.scroll_to_index(container, calculator, target_index, align)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy::windowing::WindowConfig;

    struct Container {
        offset: f64,
        viewport: f64,
        writes: usize,
    }

    impl Container {
        fn new(offset: f64, viewport: f64) -> Self {
            Self {
                offset,
                viewport,
                writes: 0,
            }
        }
    }

    impl ScrollContainer for Container {
        fn scroll_offset(&self) -> f64 {
            self.offset
        }

        fn set_scroll_offset(&mut self, offset: f64) {
            self.offset = offset;
            self.writes += 1;
        }

        fn viewport_size(&self) -> f64 {
            self.viewport
        }
    }

    fn list(total: usize, lanes: usize, size: f64) -> WindowingCalculator {
        WindowingCalculator::new(
            total,
            WindowConfig {
                estimate_item_size: size,
                lane_count: lanes,
                overscan: 0,
            },
            0.0,
        )
    }

    #[test]
    fn capture_then_restore_after_lane_change_keeps_offset() {
        let mut preserver = ScrollPositionPreserver::new();
        let mut container = Container::new(1234.0, 600.0);

        let captured = preserver.capture_offset(&container);
        // A lane change rebuilds the calculator; some hosts reset the offset.
        let rebuilt = list(1000, 3, 240.0);
        container.set_scroll_offset(0.0);
        preserver.restore_offset(&mut container, captured);

        assert_eq!(container.scroll_offset(), 1234.0);
        assert_eq!(rebuilt.initial_offset(), 0.0);
        assert_eq!(preserver.captured(), None);
    }

    #[test]
    fn restore_is_a_no_op_when_offset_survived() {
        let mut preserver = ScrollPositionPreserver::new();
        let mut container = Container::new(500.0, 600.0);
        let captured = preserver.capture_offset(&container);
        preserver.restore_offset(&mut container, captured);
        assert_eq!(container.writes, 0);
    }

    #[test]
    fn start_center_end_targets() {
        let calculator = list(1000, 1, 40.0);
        let at = |align| ScrollPositionPreserver::offset_for_index(&calculator, 100, align, 0.0, 600.0);
        assert_eq!(at(Align::Start), Some(4000.0));
        assert_eq!(at(Align::End), Some(4040.0 - 600.0));
        assert_eq!(at(Align::Center), Some(4020.0 - 300.0));
    }

    #[test]
    fn grid_targets_use_the_row_of_the_index() {
        let calculator = list(1000, 4, 250.0);
        let offset =
            ScrollPositionPreserver::offset_for_index(&calculator, 43, Align::Start, 0.0, 600.0);
        assert_eq!(offset, Some(2500.0));
    }

    #[test]
    fn auto_only_scrolls_when_needed_and_only_as_far_as_needed() {
        let calculator = list(1000, 1, 40.0);
        // Rows 10..25 fully visible at offset 400 with a 600px viewport.
        assert_eq!(
            ScrollPositionPreserver::offset_for_index(&calculator, 12, Align::Auto, 400.0, 600.0),
            None
        );
        // Row 25 starts at 1000 == view end: bring its far edge in.
        assert_eq!(
            ScrollPositionPreserver::offset_for_index(&calculator, 25, Align::Auto, 400.0, 600.0),
            Some(1040.0 - 600.0)
        );
        // Row 5 is above: align its start.
        assert_eq!(
            ScrollPositionPreserver::offset_for_index(&calculator, 5, Align::Auto, 400.0, 600.0),
            Some(200.0)
        );
    }

    #[test]
    fn targets_are_clamped_to_scroll_range() {
        let calculator = list(20, 1, 40.0);
        assert_eq!(
            ScrollPositionPreserver::offset_for_index(&calculator, 19, Align::Start, 0.0, 600.0),
            Some(200.0)
        );
        assert_eq!(
            ScrollPositionPreserver::offset_for_index(&calculator, 0, Align::End, 0.0, 600.0),
            Some(0.0)
        );
        assert_eq!(
            ScrollPositionPreserver::offset_for_index(&calculator, 20, Align::Start, 0.0, 600.0),
            None
        );
    }

    #[test]
    fn targets_past_the_capped_extent_stay_reachable() {
        let calculator = list(1_000_000, 1, 36.0);
        let max = calculator.max_scroll_offset(720.0);

        let last = ScrollPositionPreserver::offset_for_index(
            &calculator,
            999_999,
            Align::Auto,
            0.0,
            720.0,
        );
        assert!(last.is_some_and(|offset| (offset - max).abs() < 1e-3));

        // Already on screen at the bottom of the scroll range.
        assert_eq!(
            ScrollPositionPreserver::offset_for_index(&calculator, 999_990, Align::Auto, max, 720.0),
            None
        );

        let start = ScrollPositionPreserver::offset_for_index(
            &calculator,
            950_000,
            Align::Start,
            0.0,
            720.0,
        );
        let shown = start.map(|offset| calculator.content_offset(offset, 720.0));
        assert!(shown.is_some_and(|offset| (offset - 950_000.0 * 36.0).abs() < 1e-3));
    }

    #[test]
    fn pending_scroll_is_one_shot() {
        let calculator = list(1000, 1, 40.0);
        let mut preserver = ScrollPositionPreserver::new();
        let mut container = Container::new(0.0, 600.0);

        preserver.request_scroll(100, Align::Start);
        assert!(preserver.scroll_state().should_scroll);
        assert_eq!(preserver.apply_pending(&mut container, &calculator), Some(4000.0));
        assert!(!preserver.scroll_state().should_scroll);

        container.set_scroll_offset(0.0);
        assert_eq!(preserver.apply_pending(&mut container, &calculator), None);
        assert_eq!(container.scroll_offset(), 0.0);
    }
}
