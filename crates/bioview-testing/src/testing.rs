use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use bioview_core::{DefaultScheduler, Runtime, RuntimeHandle};
use bioview_foundation::lazy::{
    ChunkConfig, Frame, LayoutConfig, RequestedChunks, ResultsView, ScrollContainer,
};
use bioview_foundation::query::{FilterParams, QueryService, Record};

use crate::service::InMemoryQueryService;

/// Scroll container with a fixed viewport that records every offset write.
#[derive(Clone, Debug, PartialEq)]
pub struct TestScrollContainer {
    pub offset: f64,
    pub viewport: f64,
    pub writes: Vec<f64>,
}

impl TestScrollContainer {
    pub fn new(viewport: f64) -> Self {
        Self {
            offset: 0.0,
            viewport,
            writes: Vec::new(),
        }
    }
}

impl ScrollContainer for TestScrollContainer {
    fn scroll_offset(&self) -> f64 {
        self.offset
    }

    fn set_scroll_offset(&mut self, offset: f64) {
        self.offset = offset;
        self.writes.push(offset);
    }

    fn viewport_size(&self) -> f64 {
        self.viewport
    }
}

/// `n` occurrence-like records: `id`, `country`, `basisOfRecord`, `media`.
pub fn synthetic_occurrences(n: usize) -> Vec<BTreeMap<String, String>> {
    const COUNTRIES: [&str; 4] = ["NO", "SE", "DK", "FI"];
    (0..n)
        .map(|i| {
            BTreeMap::from([
                ("id".to_string(), format!("occ-{i}")),
                ("country".to_string(), COUNTRIES[i % COUNTRIES.len()].to_string()),
                (
                    "basisOfRecord".to_string(),
                    if i % 10 == 0 { "PRESERVED_SPECIMEN" } else { "HUMAN_OBSERVATION" }
                        .to_string(),
                ),
                ("media".to_string(), format!("https://media.example/{i}.jpg")),
            ])
        })
        .collect()
}

/// Headless harness around a mounted [`ResultsView`].
///
/// Owns the runtime the loader spawns on, so dropping the rule drops every
/// pending fetch. Scrolling goes through the container, exactly as a host
/// would do it, and [`pump`](Self::pump) stands in for the frame loop.
pub struct ResultsTestRule<R: Record> {
    runtime: Runtime,
    service: Rc<InMemoryQueryService<R>>,
    view: ResultsView<R, TestScrollContainer>,
}

impl<R: Record> ResultsTestRule<R> {
    pub fn new(
        service: InMemoryQueryService<R>,
        chunk_config: ChunkConfig,
        layout: LayoutConfig,
        viewport: f64,
        width: f64,
    ) -> Self {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let service = service.into_shared();
        let mut view = ResultsView::new(
            runtime.handle(),
            Rc::clone(&service) as Rc<dyn QueryService<R>>,
            chunk_config,
            layout,
        );
        view.mount(TestScrollContainer::new(viewport), width);
        Self {
            runtime,
            service,
            view,
        }
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn service(&self) -> &InMemoryQueryService<R> {
        &self.service
    }

    pub fn view(&self) -> &ResultsView<R, TestScrollContainer> {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ResultsView<R, TestScrollContainer> {
        &mut self.view
    }

    /// Current container offset; `NaN` once the container is unmounted.
    pub fn scroll_offset(&self) -> f64 {
        self.view
            .container()
            .map(ScrollContainer::scroll_offset)
            .unwrap_or(f64::NAN)
    }

    pub fn set_filter(&mut self, filter: FilterParams) -> bool {
        self.view.set_filter(filter)
    }

    /// Moves the container to `offset` and reports the scroll.
    pub fn scroll_to(&mut self, offset: f64) -> RequestedChunks {
        if let Some(container) = self.view.container_mut() {
            container.offset = offset;
        }
        self.view.on_scroll()
    }

    /// Runs every settled fetch and other queued UI work.
    pub fn drain(&self) {
        self.runtime.handle().drain_ui();
    }

    /// Drains queued work, then renders a frame.
    pub fn pump(&mut self) -> Frame<R> {
        self.drain();
        self.view.frame()
    }
}
