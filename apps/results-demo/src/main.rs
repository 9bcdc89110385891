mod synthetic;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use bioview_core::{Runtime, RuntimeScheduler};
use bioview_foundation::prelude::*;
use bioview_foundation::Frame;

use synthetic::{Occurrence, SyntheticService};

const DEFAULT_ROWS: usize = 1_000_000;
const LATENCY_FRAMES: u64 = 3;
const VIEWPORT: f64 = 720.0;
const FRAME_INTERVAL: Duration = Duration::from_millis(4);
const SETTLE_FRAMES: usize = 60;

/// Raises a flag the frame loop polls; stands in for a window's redraw request.
#[derive(Default)]
struct FrameRequests {
    requested: AtomicBool,
    count: AtomicUsize,
}

impl RuntimeScheduler for FrameRequests {
    fn schedule_frame(&self) {
        self.requested.store(true, Ordering::Release);
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

struct Pane {
    offset: f64,
    viewport: f64,
}

impl ScrollContainer for Pane {
    fn scroll_offset(&self) -> f64 {
        self.offset
    }

    fn set_scroll_offset(&mut self, offset: f64) {
        self.offset = offset;
    }

    fn viewport_size(&self) -> f64 {
        self.viewport
    }
}

struct Demo {
    runtime: Runtime,
    frames: Arc<FrameRequests>,
    service: Rc<SyntheticService>,
    view: ResultsView<Occurrence, Pane>,
}

impl Demo {
    fn new(rows: usize) -> anyhow::Result<Self> {
        let frames = Arc::new(FrameRequests::default());
        let runtime = Runtime::new(frames.clone());
        let service = SyntheticService::new(rows, LATENCY_FRAMES, runtime.handle().dispatcher())
            .context("starting the synthetic search worker")?;
        let service = Rc::new(service);
        let mut view = ResultsView::new(
            runtime.handle(),
            service.clone() as Rc<dyn QueryService<Occurrence>>,
            ChunkConfig {
                fields: Some(vec!["key".into(), "scientificName".into(), "country".into()]),
                ..ChunkConfig::default()
            },
            LayoutConfig::default(),
        );
        view.mount(
            Pane {
                offset: 0.0,
                viewport: VIEWPORT,
            },
            1280.0,
        );
        Ok(Self {
            runtime,
            frames,
            service,
            view,
        })
    }

    /// One turn of the host's frame loop. Worker results arrive between turns.
    fn frame(&mut self) -> Frame<Occurrence> {
        thread::sleep(FRAME_INTERVAL);
        self.service.tick();
        if self.frames.requested.swap(false, Ordering::AcqRel) {
            self.runtime.handle().drain_ui();
        }
        self.view.frame()
    }

    /// Runs frames until nothing is in transit or `limit` frames have passed.
    fn settle(&mut self, limit: usize) -> Frame<Occurrence> {
        let mut frame = self.frame();
        for _ in 0..limit {
            if self.service.in_transit() == 0 && !self.runtime.handle().has_pending_ui() {
                break;
            }
            frame = self.frame();
        }
        frame
    }

    fn scroll(&mut self, offset: f64) {
        if let Some(pane) = self.view.container_mut() {
            pane.offset = offset;
        }
        let requested = self.view.on_scroll();
        if !requested.is_empty() {
            log::info!("scroll to {offset:.0}px requested chunks {requested:?}");
        }
    }

    fn offset(&self) -> f64 {
        self.view.container().map_or(0.0, |pane| pane.offset)
    }
}

fn report(label: &str, frame: &Frame<Occurrence>, demo: &Demo) {
    let loaded = frame.slots.iter().filter(|slot| slot.record.is_some()).count();
    let first = frame.slots.first().map(|slot| slot.item.index);
    let last = frame.slots.last().map(|slot| slot.item.index);
    let stats = demo.view.loader().stats();
    println!(
        "{label:<28} phase={:?} slots={} loaded={loaded} range={first:?}..={last:?} \
         offset={:.0} extent={:.0} requests={} stale={}",
        frame.phase,
        frame.slots.len(),
        demo.offset(),
        frame.total_extent,
        stats.requests,
        stats.stale_drops,
    );
}

fn rows_from_args() -> anyhow::Result<usize> {
    match std::env::args().nth(1) {
        None => Ok(DEFAULT_ROWS),
        Some(arg) => {
            let rows: usize = arg
                .parse()
                .with_context(|| format!("row count must be a number, got {arg:?}"))?;
            if rows == 0 {
                bail!("row count must be positive");
            }
            Ok(rows)
        }
    }
}

fn main() -> anyhow::Result<()> {
    #[cfg(feature = "logging")]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let rows = rows_from_args()?;
    println!("=== bioview results pane, {rows} synthetic occurrences ===");

    let mut demo = Demo::new(rows)?;
    let redraws = Rc::new(RefCell::new(0usize));
    {
        let redraws = Rc::clone(&redraws);
        demo.view
            .loader()
            .add_invalidate_callback(Rc::new(move || *redraws.borrow_mut() += 1));
    }

    demo.view.set_filter(FilterParams::new());
    let frame = demo.frame();
    report("filter set", &frame, &demo);
    let frame = demo.settle(SETTLE_FRAMES);
    report("first chunk loaded", &frame, &demo);

    // Drag-scroll a few screens, then jump to the middle of the result set.
    for step in 1..=5 {
        demo.scroll(step as f64 * VIEWPORT);
        demo.frame();
    }
    let frame = demo.settle(SETTLE_FRAMES);
    report("after drag", &frame, &demo);

    demo.view.scroll_to_index(rows / 2, Align::Start);
    let frame = demo.settle(SETTLE_FRAMES);
    report("jumped to middle", &frame, &demo);

    demo.view.set_view_mode(ViewMode::Grid);
    let frame = demo.settle(SETTLE_FRAMES);
    report("grid, 1280px", &frame, &demo);
    demo.view.on_resize(900.0);
    let frame = demo.settle(SETTLE_FRAMES);
    report("grid, 900px", &frame, &demo);

    let first_visible = frame
        .slots
        .first()
        .map(|slot| slot.item.index)
        .context("grid frame rendered no slots")?;
    demo.view.select(first_visible);
    for _ in 0..3 {
        demo.view.next();
        demo.settle(SETTLE_FRAMES);
    }
    println!(
        "selected {:?} ({:?})",
        demo.view.selected_index(),
        demo.view.selected_identity("scientificName")
    );
    demo.view.close_detail();

    // Replace the result set while fetches for the old one are in transit.
    demo.scroll(demo.offset() + 40.0 * VIEWPORT);
    demo.view.set_filter(FilterParams::new().with("country", "NO"));
    let frame = demo.settle(SETTLE_FRAMES);
    report("filtered to NO", &frame, &demo);

    let buckets: Rc<RefCell<Option<Vec<AggregateBucket>>>> = Rc::new(RefCell::new(None));
    {
        let buckets = Rc::clone(&buckets);
        let future = demo.service.aggregate("country", &FilterParams::new(), 10);
        demo.runtime.handle().spawn_ui(async move {
            match future.await {
                Ok(result) => *buckets.borrow_mut() = Some(result),
                Err(err) => log::error!("aggregation failed: {err}"),
            }
        });
    }
    demo.frame();
    for bucket in buckets.borrow().iter().flatten() {
        println!(
            "  {:<4} {:>9}  {}",
            bucket.value,
            bucket.count,
            bucket.sample_media_url.as_deref().unwrap_or("-")
        );
    }

    println!(
        "{} service requests, {} scheduled frames, {} invalidations",
        demo.service.request_count(),
        demo.frames.count.load(Ordering::Relaxed),
        redraws.borrow()
    );
    Ok(())
}
