//! The assembled engine behind one results pane.
//!
//! [`ResultsView`] wires the pieces together the way a host drives them:
//!
//! - scroll / resize → [`WindowingCalculator`] → visible range →
//!   [`ChunkLoader`] (async) → [`IndexCache`](super::IndexCache) → next
//!   [`frame`](ResultsView::frame);
//! - filter change → cache cleared, version bumped, calculator reset to the
//!   new total, chunk 0 re-primed;
//! - lane-count or view-mode change → offset captured, calculator rebuilt
//!   with it, offset restored.

use std::rc::Rc;

use bioview_core::RuntimeHandle;

use super::chunk_loader::{ChunkConfig, ChunkLoader, RequestedChunks};
use super::index_cache::RenderKey;
use super::layout_mode::{LayoutConfig, ViewMode};
use super::navigation::{IndexScroller, NavigationController};
use super::scroll_position::{Align, ScrollContainer, ScrollPositionPreserver};
use super::viewport::ViewportRange;
use super::windowing::{VirtualItem, WindowConfig, WindowingCalculator};
use crate::query::{FilterParams, QueryService, Record};

/// What the pane should show besides the slots themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// The first page of the current result set has not arrived.
    Loading,
    /// The result set is known to be empty; show the empty state.
    Empty,
    Ready,
}

/// One rendered slot. `record` is `None` while its chunk is loading.
#[derive(Clone, Debug, PartialEq)]
pub struct Slot<R> {
    pub item: VirtualItem,
    pub key: RenderKey,
    pub record: Option<R>,
}

/// Output of one render pass.
#[derive(Clone, Debug)]
pub struct Frame<R> {
    pub phase: Phase,
    pub slots: Vec<Slot<R>>,
    pub total_extent: f64,
    pub scroll_offset: f64,
    /// Content-space offset shown at the viewport's leading edge; slot `i` is
    /// drawn at `slots[i].item.start - content_offset`.
    pub content_offset: f64,
    /// Epoch of the calculator that laid this frame out.
    pub epoch: u64,
    /// Chunks this pass asked the loader for.
    pub requested: RequestedChunks,
}

pub struct ResultsView<R: Record, C: ScrollContainer> {
    loader: ChunkLoader<R>,
    container: Option<C>,
    layout: LayoutConfig,
    mode: ViewMode,
    width: f64,
    calculator: WindowingCalculator,
    preserver: ScrollPositionPreserver,
    navigator: NavigationController,
    last_range: Option<ViewportRange>,
    has_result_set: bool,
}

impl<R: Record, C: ScrollContainer> ResultsView<R, C> {
    pub fn new(
        runtime: RuntimeHandle,
        service: Rc<dyn QueryService<R>>,
        chunk_config: ChunkConfig,
        layout: LayoutConfig,
    ) -> Self {
        let mode = ViewMode::default();
        let calculator = WindowingCalculator::new(0, layout.window_config(mode, 0.0), 0.0);
        Self {
            loader: ChunkLoader::new(runtime, service, chunk_config),
            container: None,
            layout,
            mode,
            width: 0.0,
            calculator,
            preserver: ScrollPositionPreserver::new(),
            navigator: NavigationController::new(0),
            last_range: None,
            has_result_set: false,
        }
    }

    pub fn loader(&self) -> &ChunkLoader<R> {
        &self.loader
    }

    pub fn calculator(&self) -> &WindowingCalculator {
        &self.calculator
    }

    pub fn view_mode(&self) -> ViewMode {
        self.mode
    }

    pub fn container(&self) -> Option<&C> {
        self.container.as_ref()
    }

    pub fn container_mut(&mut self) -> Option<&mut C> {
        self.container.as_mut()
    }

    /// Attaches the host's scroll container, sized to `width`.
    pub fn mount(&mut self, mut container: C, width: f64) {
        self.width = width;
        let config = self.layout.window_config(self.mode, width);
        if config != self.calculator.config() {
            self.calculator =
                WindowingCalculator::new(self.calculator.total_count(), config, 0.0);
        }
        let initial = self.calculator.initial_offset();
        self.preserver.restore_offset(&mut container, initial);
        self.container = Some(container);
        self.last_range = None;
    }

    pub fn unmount(&mut self) -> Option<C> {
        self.last_range = None;
        self.container.take()
    }

    pub fn phase(&self) -> Phase {
        match self.loader.total() {
            None => Phase::Loading,
            Some(0) => Phase::Empty,
            Some(_) => Phase::Ready,
        }
    }

    /// Switches to the result set described by `filter`. Returns `false` if
    /// it is already the current one.
    pub fn set_filter(&mut self, filter: FilterParams) -> bool {
        if self.has_result_set && self.loader.filter() == filter {
            return false;
        }
        self.reload(filter);
        true
    }

    /// Re-establishes the current result set from scratch.
    pub fn refresh(&mut self) {
        let filter = self.loader.filter();
        self.reload(filter);
    }

    fn reload(&mut self, filter: FilterParams) {
        self.has_result_set = true;
        self.loader.reset(filter);
        self.navigator = NavigationController::new(0);
        self.calculator = WindowingCalculator::new(0, self.calculator.config(), 0.0);
        self.last_range = None;
        if let Some(container) = self.container.as_mut() {
            self.preserver.restore_offset(container, 0.0);
        }
    }

    /// Host reports a scroll. Returns the chunks requested as a result.
    pub fn on_scroll(&mut self) -> RequestedChunks {
        self.sync_total();
        let Some(container) = self.container.as_ref() else {
            return RequestedChunks::new();
        };
        let window = self
            .calculator
            .compute(container.scroll_offset(), container.viewport_size());
        self.request_range(window.range())
    }

    /// Host reports a new width (the viewport size is read from the container).
    pub fn on_resize(&mut self, width: f64) -> RequestedChunks {
        self.width = width;
        let config = self.layout.window_config(self.mode, width);
        if config != self.calculator.config() {
            self.relayout(config);
        }
        self.on_scroll()
    }

    /// Switches between table rows and grid cards, keeping the scroll offset.
    pub fn set_view_mode(&mut self, mode: ViewMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        let config = self.layout.window_config(mode, self.width);
        self.relayout(config);
    }

    /// Rebuilds the calculator for reasons other than user scrolling.
    fn relayout(&mut self, config: WindowConfig) {
        self.rebuild(self.calculator.total_count(), config);
    }

    fn rebuild(&mut self, total: usize, config: WindowConfig) {
        let captured = match self.container.as_ref() {
            Some(container) => self.preserver.capture_offset(container),
            None => self.calculator.initial_offset(),
        };
        log::debug!(
            "rebuilding window: total {} -> {total}, lanes {} -> {}, item {} -> {}, keeping offset {captured}",
            self.calculator.total_count(),
            self.calculator.lane_count(),
            config.lane_count,
            self.calculator.estimate_item_size(),
            config.estimate_item_size,
        );
        self.calculator = WindowingCalculator::new(total, config, captured);
        let restored = self.calculator.initial_offset();
        if let Some(container) = self.container.as_mut() {
            self.preserver.restore_offset(container, restored);
        }
        self.last_range = None;
    }

    /// Adopts the loader's total if it moved since the last pass.
    fn sync_total(&mut self) {
        let total = self.loader.total().unwrap_or(0);
        if total != self.calculator.total_count() {
            self.rebuild(total, self.calculator.config());
            self.navigator.set_total_count(total);
        }
    }

    fn request_range(&mut self, range: Option<ViewportRange>) -> RequestedChunks {
        let Some(range) = range else {
            return RequestedChunks::new();
        };
        self.last_range = Some(range);
        self.loader.on_visible_range_change(range)
    }

    /// Render pass: applies a pending programmatic scroll, computes the
    /// window, feeds the visible range to the loader, and resolves each slot
    /// against the cache.
    pub fn frame(&mut self) -> Frame<R> {
        self.sync_total();
        let phase = self.phase();
        let epoch = self.calculator.epoch();

        let Some(container) = self.container.as_mut() else {
            let initial = self.calculator.initial_offset();
            return Frame {
                phase,
                slots: Vec::new(),
                total_extent: self.calculator.scroll_extent(),
                scroll_offset: initial,
                content_offset: self.calculator.content_offset(initial, 0.0),
                epoch,
                requested: RequestedChunks::new(),
            };
        };

        self.preserver.apply_pending(container, &self.calculator);
        let scroll_offset = container.scroll_offset();
        let window = self.calculator.compute(scroll_offset, container.viewport_size());
        let requested = self.request_range(window.range());

        let slots = self.loader.with_cache(|cache| {
            window
                .items()
                .iter()
                .map(|item| Slot {
                    item: *item,
                    key: cache.render_key(item.index),
                    record: cache.get(item.index).cloned(),
                })
                .collect()
        });

        Frame {
            phase,
            slots,
            total_extent: window.total_extent(),
            scroll_offset,
            content_offset: window.content_offset(),
            epoch,
            requested,
        }
    }

    /// Last range handed to the loader.
    pub fn visible_range(&self) -> Option<ViewportRange> {
        self.last_range
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.navigator.selected_index()
    }

    /// Opens `index` in the detail view.
    pub fn select(&mut self, index: usize) -> bool {
        self.sync_total();
        self.navigator.select(index)
    }

    pub fn next(&mut self) -> Option<usize> {
        self.step(true)
    }

    pub fn previous(&mut self) -> Option<usize> {
        self.step(false)
    }

    fn step(&mut self, forward: bool) -> Option<usize> {
        self.sync_total();
        let scroller = match self.container {
            Some(_) => Some(&mut self.preserver as &mut dyn IndexScroller),
            None => None,
        };
        if forward {
            self.navigator.handle_next(scroller)
        } else {
            self.navigator.handle_previous(scroller)
        }
    }

    /// Closes the detail view and scrolls back to the item it showed.
    pub fn close_detail(&mut self) -> Option<usize> {
        let index = self.navigator.clear_selection()?;
        if self.container.is_some() {
            self.preserver.request_scroll_to(index, Align::Auto);
        }
        Some(index)
    }

    /// Programmatic jump, applied on the next frame.
    pub fn scroll_to_index(&mut self, index: usize, align: Align) {
        self.preserver.request_scroll(index, align);
    }

    pub fn selected_record(&self) -> Option<R> {
        self.loader.get(self.navigator.selected_index()?)
    }

    /// Value of the caller-configured identity field of the selected record,
    /// if its chunk is loaded.
    pub fn selected_identity(&self, field: &str) -> Option<String> {
        let index = self.navigator.selected_index()?;
        self.loader.with_cache(|cache| {
            cache
                .get(index)
                .and_then(|record| record.field_value(field))
                .map(|value| value.into_owned())
        })
    }
}
