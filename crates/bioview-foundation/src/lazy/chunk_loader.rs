//! Chunked loading of records for the visible index range.
//!
//! The visible range is mapped to fixed-size, offset-aligned chunks. Each
//! chunk that is neither cached nor already in flight becomes one
//! [`QueryService::search`] call, spawned on the UI runtime. Completions run
//! on the UI thread and write a whole chunk into the [`IndexCache`] at once.
//!
//! Every request is stamped with the cache generation current at issue time.
//! A response that arrives after a filter change (or total-count drift) was
//! issued for a superseded generation and is dropped instead of written.

use std::cell::RefCell;
use std::rc::Rc;

use bioview_core::collections::map::HashMap;
use bioview_core::{QueryError, RuntimeHandle};
use smallvec::SmallVec;
use web_time::Instant;

use super::index_cache::{IndexCache, RenderKey};
use super::viewport::ViewportRange;
use crate::query::{FilterParams, QueryService, SearchPage, SearchRequest};

/// Records fetched per query-service call.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Chunk indices requested by one visibility pass. Rarely more than two.
pub type RequestedChunks = SmallVec<[usize; 4]>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Fixed for the lifetime of one result set.
    pub chunk_size: usize,
    /// Field projection forwarded to the query service.
    pub fields: Option<Vec<String>>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            fields: None,
        }
    }
}

/// Counters for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Query-service calls issued.
    pub requests: usize,
    /// Responses written into the cache.
    pub writes: usize,
    /// Responses dropped because their generation was superseded.
    pub stale_drops: usize,
    /// Responses that failed.
    pub failures: usize,
    /// Visibility passes skipped because the chunk pair did not change.
    pub skipped_passes: usize,
}

struct LoaderState<R> {
    cache: IndexCache<R>,
    /// Chunk start index -> generation it was requested under.
    in_flight: HashMap<usize, u64>,
    last_requested: Option<(usize, usize)>,
    filter: FilterParams,
    /// Filtered total as last reported by the service.
    total: Option<usize>,
    stats: LoaderStats,
    invalidate_callbacks: Vec<(u64, Rc<dyn Fn()>)>,
    next_callback_id: u64,
}

impl<R> LoaderState<R> {
    fn new(filter: FilterParams) -> Self {
        Self {
            cache: IndexCache::new(),
            in_flight: HashMap::default(),
            last_requested: None,
            filter,
            total: None,
            stats: LoaderStats::default(),
            invalidate_callbacks: Vec::new(),
            next_callback_id: 1,
        }
    }

    /// Starts a new generation: empty cache, nothing in flight.
    fn invalidate(&mut self) {
        self.cache.clear();
        self.in_flight.clear();
        self.last_requested = None;
    }

    fn callbacks(&self) -> Vec<Rc<dyn Fn()>> {
        self.invalidate_callbacks
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect()
    }

    /// Applies a settled fetch. Returns whether the cache changed.
    fn settle(
        &mut self,
        start: usize,
        chunk_size: usize,
        generation: u64,
        result: Result<SearchPage<R>, QueryError>,
    ) -> bool {
        if self.in_flight.get(&start) == Some(&generation) {
            self.in_flight.remove(&start);
        }

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                self.stats.failures += 1;
                log::warn!(
                    "chunk at offset {start} failed, will retry when visible again: {err}"
                );
                return false;
            }
        };

        if generation != self.cache.generation() {
            self.stats.stale_drops += 1;
            log::debug!(
                "dropping chunk at offset {start}: generation {generation} superseded by {}",
                self.cache.generation()
            );
            return false;
        }

        if let Some(known) = self.total {
            if known != page.total {
                log::info!(
                    "result set total changed from {known} to {}, invalidating cache",
                    page.total
                );
                self.invalidate();
            }
        }
        self.total = Some(page.total);

        let mut results = page.results;
        if results.len() > chunk_size {
            log::warn!(
                "query service returned {} rows for a {chunk_size}-row chunk, truncating",
                results.len()
            );
            results.truncate(chunk_size);
        }
        self.cache.set_many(start, results);
        self.stats.writes += 1;
        true
    }
}

/// Loads chunks for visible ranges and owns the [`IndexCache`].
///
/// Cloning yields another handle to the same loader.
pub struct ChunkLoader<R: 'static> {
    state: Rc<RefCell<LoaderState<R>>>,
    service: Rc<dyn QueryService<R>>,
    runtime: RuntimeHandle,
    config: Rc<ChunkConfig>,
}

impl<R: 'static> Clone for ChunkLoader<R> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            service: Rc::clone(&self.service),
            runtime: self.runtime.clone(),
            config: Rc::clone(&self.config),
        }
    }
}

impl<R: 'static> ChunkLoader<R> {
    pub fn new(
        runtime: RuntimeHandle,
        service: Rc<dyn QueryService<R>>,
        config: ChunkConfig,
    ) -> Self {
        let config = ChunkConfig {
            chunk_size: config.chunk_size.max(1),
            ..config
        };
        Self {
            state: Rc::new(RefCell::new(LoaderState::new(FilterParams::default()))),
            service,
            runtime,
            config: Rc::new(config),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    /// Establishes a new result set: empties the in-flight set and the cache,
    /// bumps the version, and requests chunk 0 right away so the first screen
    /// does not wait for a scroll event.
    pub fn reset(&self, filter: FilterParams) {
        {
            let mut state = self.state.borrow_mut();
            log::debug!(
                "new result set {:016x}, dropping {} cached rows and {} in-flight chunks",
                filter.fingerprint(),
                state.cache.len(),
                state.in_flight.len()
            );
            state.invalidate();
            state.filter = filter;
            state.total = None;
        }
        self.notify();
        self.request_chunk(0);
    }

    /// Requests the chunks covering `range` that are neither cached nor in
    /// flight. A pass whose `(first_chunk, last_chunk)` pair equals the previous
    /// one is skipped outright. Returns the chunk indices actually requested.
    pub fn on_visible_range_change(&self, range: ViewportRange) -> RequestedChunks {
        let chunk_size = self.config.chunk_size;
        let (first_chunk, last_chunk) = range.chunk_span(chunk_size);
        {
            let mut state = self.state.borrow_mut();
            if state.last_requested == Some((first_chunk, last_chunk)) {
                state.stats.skipped_passes += 1;
                log::trace!("chunks {first_chunk}..={last_chunk} unchanged, skipping");
                return RequestedChunks::new();
            }
            state.last_requested = Some((first_chunk, last_chunk));
        }

        (first_chunk..=last_chunk)
            .filter(|&chunk| self.request_chunk(chunk))
            .collect()
    }

    /// Issues the fetch for `chunk` if needed. Returns whether a request went out.
    fn request_chunk(&self, chunk: usize) -> bool {
        let chunk_size = self.config.chunk_size;
        let start = chunk * chunk_size;

        let (request, generation) = {
            let mut state = self.state.borrow_mut();
            if let Some(total) = state.total {
                if start >= total {
                    log::trace!("chunk {chunk} starts past total {total}, not requesting");
                    return false;
                }
            }
            let generation = state.cache.generation();
            if state.in_flight.get(&start) == Some(&generation) {
                return false;
            }
            let expected = state
                .total
                .map_or(chunk_size, |total| chunk_size.min(total - start));
            if state.cache.contains_range(start..start + expected) {
                return false;
            }
            state.in_flight.insert(start, generation);
            state.stats.requests += 1;
            let request = SearchRequest {
                limit: chunk_size,
                offset: start,
                filter: state.filter.clone(),
                fields: self.config.fields.clone(),
            };
            (request, generation)
        };

        log::debug!("requesting chunk {chunk} (offset {start}, generation {generation})");
        let future = self.service.search(request);
        let weak = Rc::downgrade(&self.state);
        let started = Instant::now();

        let spawned = self.runtime.spawn_ui(async move {
            let result = future.await;
            let Some(state) = weak.upgrade() else {
                return;
            };
            let changed = state
                .borrow_mut()
                .settle(start, chunk_size, generation, result);
            log::debug!(
                "chunk {chunk} settled after {:?} (written: {changed})",
                started.elapsed()
            );
            if changed {
                let callbacks = state.borrow().callbacks();
                for callback in callbacks {
                    callback();
                }
            }
        });

        if spawned.is_none() {
            log::warn!("runtime is gone, chunk {chunk} will not be fetched");
            let mut state = self.state.borrow_mut();
            state.in_flight.remove(&start);
            state.stats.requests -= 1;
            return false;
        }
        true
    }

    fn notify(&self) {
        let callbacks = self.state.borrow().callbacks();
        for callback in callbacks {
            callback();
        }
    }

    /// Registers a callback run after every cache mutation (reset, chunk
    /// write). Hosts use it to schedule a frame.
    pub fn add_invalidate_callback(&self, callback: Rc<dyn Fn()>) -> u64 {
        let mut state = self.state.borrow_mut();
        let id = state.next_callback_id;
        state.next_callback_id += 1;
        state.invalidate_callbacks.push((id, callback));
        id
    }

    pub fn remove_invalidate_callback(&self, id: u64) {
        self.state
            .borrow_mut()
            .invalidate_callbacks
            .retain(|(callback_id, _)| *callback_id != id);
    }

    /// Read-only access to the cache.
    pub fn with_cache<T>(&self, f: impl FnOnce(&IndexCache<R>) -> T) -> T {
        f(&self.state.borrow().cache)
    }

    pub fn get(&self, index: usize) -> Option<R>
    where
        R: Clone,
    {
        self.state.borrow().cache.get(index).cloned()
    }

    pub fn render_key(&self, index: usize) -> RenderKey {
        self.state.borrow().cache.render_key(index)
    }

    pub fn version(&self) -> u64 {
        self.state.borrow().cache.version()
    }

    pub fn generation(&self) -> u64 {
        self.state.borrow().cache.generation()
    }

    /// Filtered total from the latest response of the current result set.
    pub fn total(&self) -> Option<usize> {
        self.state.borrow().total
    }

    pub fn filter(&self) -> FilterParams {
        self.state.borrow().filter.clone()
    }

    pub fn is_in_flight(&self, chunk: usize) -> bool {
        let state = self.state.borrow();
        let generation = state.cache.generation();
        state.in_flight.get(&(chunk * self.config.chunk_size)) == Some(&generation)
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.borrow().in_flight.len()
    }

    pub fn stats(&self) -> LoaderStats {
        self.state.borrow().stats
    }
}
