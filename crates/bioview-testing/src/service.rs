//! In-memory stand-ins for the search and aggregation services.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::task::Poll;

use bioview_core::collections::map::HashMap;
use bioview_core::QueryError;
use bioview_foundation::query::{
    AggregateBucket, AggregateFuture, AggregationService, FilterParams, QueryFuture,
    QueryService, Record, SearchPage, SearchRequest,
};

type Outcome<R> = Result<SearchPage<R>, QueryError>;
type Settlement<R> = Rc<RefCell<Option<Outcome<R>>>>;

/// How [`InMemoryQueryService`] answers a search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseMode {
    /// The returned future is ready on first poll.
    #[default]
    Immediate,
    /// The future stays pending until the test calls
    /// [`resolve`](InMemoryQueryService::resolve) or
    /// [`fail`](InMemoryQueryService::fail).
    Deferred,
}

struct PendingResponse<R> {
    request: SearchRequest,
    settlement: Settlement<R>,
    settled: bool,
}

/// Query service over a `Vec` of records.
///
/// Filter conditions match records whose [`Record::field_value`] equals the
/// condition value; a [`SortSpec`] orders by that field's string value. Every
/// request is logged so tests can assert on exactly what went over the wire.
pub struct InMemoryQueryService<R: Record> {
    rows: RefCell<Vec<R>>,
    mode: Cell<ResponseMode>,
    requests: RefCell<Vec<SearchRequest>>,
    pending: RefCell<Vec<PendingResponse<R>>>,
    injected_failures: RefCell<VecDeque<QueryError>>,
    media_field: Option<String>,
}

impl<R: Record> InMemoryQueryService<R> {
    pub fn new(rows: Vec<R>) -> Self {
        Self {
            rows: RefCell::new(rows),
            mode: Cell::new(ResponseMode::Immediate),
            requests: RefCell::new(Vec::new()),
            pending: RefCell::new(Vec::new()),
            injected_failures: RefCell::new(VecDeque::new()),
            media_field: None,
        }
    }

    /// Service whose responses are released by hand.
    pub fn deferred(rows: Vec<R>) -> Self {
        let service = Self::new(rows);
        service.mode.set(ResponseMode::Deferred);
        service
    }

    /// Field whose value is reported as an aggregate bucket's sample media.
    pub fn with_media_field(mut self, field: impl Into<String>) -> Self {
        self.media_field = Some(field.into());
        self
    }

    pub fn into_shared(self) -> Rc<Self> {
        Rc::new(self)
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode.get()
    }

    pub fn set_mode(&self, mode: ResponseMode) {
        self.mode.set(mode);
    }

    /// Replaces the backing data. Responses computed afterwards (including
    /// deferred ones not yet resolved) see the new rows.
    pub fn set_rows(&self, rows: Vec<R>) {
        *self.rows.borrow_mut() = rows;
    }

    /// Makes the next search fail with `error`, regardless of mode.
    pub fn fail_next(&self, error: QueryError) {
        self.injected_failures.borrow_mut().push_back(error);
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    /// Offsets of every request in issue order.
    pub fn request_offsets(&self) -> Vec<usize> {
        self.requests.borrow().iter().map(|r| r.offset).collect()
    }

    pub fn clear_requests(&self) {
        self.requests.borrow_mut().clear();
    }

    /// Deferred responses not yet resolved or failed.
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().iter().filter(|p| !p.settled).count()
    }

    /// Offset of each unresolved deferred request, oldest first.
    pub fn pending_offsets(&self) -> Vec<usize> {
        self.pending
            .borrow()
            .iter()
            .filter(|p| !p.settled)
            .map(|p| p.request.offset)
            .collect()
    }

    /// Answers the `nth` deferred request (in issue order) from the current
    /// rows. Returns `false` if there is no such request or it already settled.
    pub fn resolve(&self, nth: usize) -> bool {
        let request = match self.pending.borrow().get(nth) {
            Some(p) if !p.settled => p.request.clone(),
            _ => return false,
        };
        let outcome = Ok(self.page_for(&request));
        self.settle(nth, outcome)
    }

    /// Answers the oldest unresolved deferred request at `offset`.
    pub fn resolve_offset(&self, offset: usize) -> bool {
        let nth = self
            .pending
            .borrow()
            .iter()
            .position(|p| !p.settled && p.request.offset == offset);
        nth.is_some_and(|nth| self.resolve(nth))
    }

    /// Answers every unresolved deferred request. Returns how many settled.
    pub fn resolve_all(&self) -> usize {
        let count = self.pending.borrow().len();
        (0..count).filter(|&nth| self.resolve(nth)).count()
    }

    /// Fails the `nth` deferred request with `error`.
    pub fn fail(&self, nth: usize, error: QueryError) -> bool {
        self.settle(nth, Err(error))
    }

    fn settle(&self, nth: usize, outcome: Outcome<R>) -> bool {
        let mut pending = self.pending.borrow_mut();
        let Some(response) = pending.get_mut(nth) else {
            return false;
        };
        if response.settled {
            return false;
        }
        response.settled = true;
        *response.settlement.borrow_mut() = Some(outcome);
        true
    }

    /// Rows matching `filter`, in its sort order.
    pub fn matching(&self, filter: &FilterParams) -> Vec<R> {
        let mut rows: Vec<R> = self
            .rows
            .borrow()
            .iter()
            .filter(|row| {
                filter
                    .conditions()
                    .all(|(field, value)| row.field_value(field).as_deref() == Some(value))
            })
            .cloned()
            .collect();
        if let Some(sort) = filter.sort() {
            rows.sort_by(|a, b| {
                let ordering = a.field_value(&sort.field).cmp(&b.field_value(&sort.field));
                if sort.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        rows
    }

    fn page_for(&self, request: &SearchRequest) -> SearchPage<R> {
        let rows = self.matching(&request.filter);
        let total = rows.len();
        let results = rows
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        SearchPage { total, results }
    }
}

impl<R: Record> QueryService<R> for InMemoryQueryService<R> {
    fn search(&self, request: SearchRequest) -> QueryFuture<R> {
        log::trace!(
            "in-memory search offset={} limit={}",
            request.offset,
            request.limit
        );
        self.requests.borrow_mut().push(request.clone());

        if let Some(error) = self.injected_failures.borrow_mut().pop_front() {
            return Box::pin(std::future::ready(Err(error)));
        }

        match self.mode.get() {
            ResponseMode::Immediate => {
                let page = self.page_for(&request);
                Box::pin(std::future::ready(Ok(page)))
            }
            ResponseMode::Deferred => {
                let settlement: Settlement<R> = Rc::new(RefCell::new(None));
                self.pending.borrow_mut().push(PendingResponse {
                    request,
                    settlement: Rc::clone(&settlement),
                    settled: false,
                });
                Box::pin(std::future::poll_fn(move |_| {
                    match settlement.borrow_mut().take() {
                        Some(outcome) => Poll::Ready(outcome),
                        None => Poll::Pending,
                    }
                }))
            }
        }
    }
}

impl<R: Record> AggregationService for InMemoryQueryService<R> {
    fn aggregate(&self, field: &str, filter: &FilterParams, limit: usize) -> AggregateFuture {
        let mut buckets: HashMap<String, AggregateBucket> = HashMap::default();
        for row in self.matching(filter) {
            let Some(value) = row.field_value(field) else {
                continue;
            };
            let media = self
                .media_field
                .as_deref()
                .and_then(|media| row.field_value(media))
                .map(|url| url.into_owned());
            let bucket = buckets
                .entry(value.to_string())
                .or_insert_with(|| AggregateBucket {
                    value: value.into_owned(),
                    count: 0,
                    sample_media_url: None,
                });
            bucket.count += 1;
            if bucket.sample_media_url.is_none() {
                bucket.sample_media_url = media;
            }
        }

        let mut buckets: Vec<AggregateBucket> = buckets.into_values().collect();
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        buckets.truncate(limit);
        Box::pin(std::future::ready(Ok(buckets)))
    }
}
