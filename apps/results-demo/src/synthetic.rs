//! A search backend that fabricates occurrences on demand. Each response is
//! held for a configurable number of frames, then built on a worker thread and
//! handed back to the UI thread through the runtime's dispatcher.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Poll, Waker};
use std::thread;

use bioview_core::{QueryError, UiDispatcher};
use bioview_foundation::query::{
    AggregateBucket, AggregateFuture, AggregationService, FilterParams, QueryFuture,
    QueryService, Record, SearchPage, SearchRequest,
};

const COUNTRIES: [&str; 5] = ["NO", "SE", "DK", "FI", "IS"];
const GENERA: [&str; 6] = ["Parus", "Picea", "Salmo", "Vulpes", "Betula", "Lynx"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Occurrence {
    pub key: u64,
    pub scientific_name: String,
    pub country: &'static str,
    pub media_url: Option<String>,
}

impl Occurrence {
    fn synthesize(key: u64) -> Self {
        let genus = GENERA[(key % GENERA.len() as u64) as usize];
        Self {
            key,
            scientific_name: format!("{genus} sp. {}", key % 97),
            country: COUNTRIES[(key % COUNTRIES.len() as u64) as usize],
            media_url: (key % 3 == 0).then(|| format!("https://media.example/{key}.jpg")),
        }
    }
}

impl Record for Occurrence {
    fn field_value(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "key" => Some(Cow::Owned(self.key.to_string())),
            "scientificName" => Some(Cow::Borrowed(&self.scientific_name)),
            "country" => Some(Cow::Borrowed(self.country)),
            "media" => self.media_url.as_deref().map(Cow::Borrowed),
            _ => None,
        }
    }
}

type Outcome = Result<SearchPage<Occurrence>, QueryError>;

#[derive(Default)]
struct Delivery {
    outcome: Option<Outcome>,
    waker: Option<Waker>,
}

type Settlement = Arc<Mutex<Delivery>>;

fn lock(settlement: &Settlement) -> MutexGuard<'_, Delivery> {
    settlement.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stores `outcome` and wakes the future waiting on it. Runs on the UI thread.
fn deliver(settlement: &Settlement, outcome: Outcome) {
    let waker = {
        let mut delivery = lock(settlement);
        delivery.outcome = Some(outcome);
        delivery.waker.take()
    };
    if let Some(waker) = waker {
        waker.wake();
    }
}

struct Job {
    request: SearchRequest,
    settlement: Settlement,
}

struct Scheduled {
    due_frame: u64,
    job: Job,
}

fn country_index(filter: &FilterParams) -> Result<Option<usize>, ()> {
    let mut country = None;
    for (field, value) in filter.conditions() {
        match field {
            "country" => {
                country = Some(COUNTRIES.iter().position(|c| *c == value).ok_or(())?);
            }
            _ => return Err(()),
        }
    }
    Ok(country)
}

/// Size of the filtered result set.
fn filtered_total(total: usize, filter: &FilterParams) -> usize {
    match country_index(filter) {
        Ok(None) => total,
        Ok(Some(country)) => (total + COUNTRIES.len() - 1 - country) / COUNTRIES.len(),
        Err(()) => 0,
    }
}

/// Key of the `position`-th record of the filtered result set.
fn key_at(filter: &FilterParams, position: usize) -> u64 {
    match country_index(filter) {
        Ok(Some(country)) => (position * COUNTRIES.len() + country) as u64,
        _ => position as u64,
    }
}

fn page(total: usize, request: &SearchRequest) -> SearchPage<Occurrence> {
    let total = filtered_total(total, &request.filter);
    let end = request.offset.saturating_add(request.limit).min(total);
    let results = (request.offset.min(end)..end)
        .map(|position| Occurrence::synthesize(key_at(&request.filter, position)))
        .collect();
    SearchPage { total, results }
}

/// Builds pages off the UI thread until the service is dropped.
fn spawn_worker(
    total: usize,
    dispatcher: UiDispatcher,
    in_worker: Arc<AtomicUsize>,
) -> io::Result<mpsc::Sender<Job>> {
    let (tx, rx) = mpsc::channel::<Job>();
    thread::Builder::new()
        .name("synthetic-search".into())
        .spawn(move || {
            for job in rx {
                let outcome = Ok(page(total, &job.request));
                let in_worker = Arc::clone(&in_worker);
                dispatcher.post(move || {
                    in_worker.fetch_sub(1, Ordering::SeqCst);
                    deliver(&job.settlement, outcome);
                });
            }
            log::debug!("synthetic search worker stopped");
        })?;
    Ok(tx)
}

/// Backs `total` occurrences without storing any of them. A `country` filter
/// narrows to every fifth key; any other condition matches nothing.
pub struct SyntheticService {
    total: usize,
    latency_frames: u64,
    frame: Cell<u64>,
    scheduled: RefCell<VecDeque<Scheduled>>,
    worker: mpsc::Sender<Job>,
    in_worker: Arc<AtomicUsize>,
    requests: Cell<usize>,
}

impl SyntheticService {
    pub fn new(total: usize, latency_frames: u64, dispatcher: UiDispatcher) -> io::Result<Self> {
        let in_worker = Arc::new(AtomicUsize::new(0));
        let worker = spawn_worker(total, dispatcher, Arc::clone(&in_worker))?;
        Ok(Self {
            total,
            latency_frames,
            frame: Cell::new(0),
            scheduled: RefCell::new(VecDeque::new()),
            worker,
            in_worker,
            requests: Cell::new(0),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.get()
    }

    /// Requests not yet handed back to the UI thread.
    pub fn in_transit(&self) -> usize {
        self.scheduled.borrow().len() + self.in_worker.load(Ordering::SeqCst)
    }

    /// Advances one frame and sends every due request to the worker.
    pub fn tick(&self) -> usize {
        let frame = self.frame.get() + 1;
        self.frame.set(frame);
        let mut scheduled = self.scheduled.borrow_mut();
        let mut dispatched = 0;
        while scheduled.front().is_some_and(|s| s.due_frame <= frame) {
            let Some(Scheduled { job, .. }) = scheduled.pop_front() else {
                break;
            };
            self.in_worker.fetch_add(1, Ordering::SeqCst);
            if let Err(mpsc::SendError(job)) = self.worker.send(job) {
                self.in_worker.fetch_sub(1, Ordering::SeqCst);
                deliver(
                    &job.settlement,
                    Err(QueryError::transport("search worker stopped")),
                );
            }
            dispatched += 1;
        }
        dispatched
    }
}

impl QueryService<Occurrence> for SyntheticService {
    fn search(&self, request: SearchRequest) -> QueryFuture<Occurrence> {
        self.requests.set(self.requests.get() + 1);
        let settlement: Settlement = Arc::new(Mutex::new(Delivery::default()));
        self.scheduled.borrow_mut().push_back(Scheduled {
            due_frame: self.frame.get() + self.latency_frames,
            job: Job {
                request,
                settlement: Arc::clone(&settlement),
            },
        });
        Box::pin(std::future::poll_fn(move |cx| {
            let mut delivery = lock(&settlement);
            match delivery.outcome.take() {
                Some(outcome) => Poll::Ready(outcome),
                None => {
                    delivery.waker = Some(cx.waker().clone());
                    Poll::Pending
                }
            }
        }))
    }
}

impl AggregationService for SyntheticService {
    fn aggregate(&self, field: &str, filter: &FilterParams, limit: usize) -> AggregateFuture {
        if field != "country" {
            let error = QueryError::service(400, format!("cannot aggregate on {field}"));
            return Box::pin(std::future::ready(Err(error)));
        }
        let mut buckets: Vec<AggregateBucket> = COUNTRIES
            .iter()
            .enumerate()
            .map(|(index, country)| {
                let narrowed = filter.clone().with("country", *country);
                let count = if filter.get("country").is_some_and(|c| c != *country) {
                    0
                } else {
                    filtered_total(self.total, &narrowed) as u64
                };
                AggregateBucket {
                    value: country.to_string(),
                    count,
                    sample_media_url: (0..15u64)
                        .step_by(3)
                        .find(|key| *key as usize % COUNTRIES.len() == index)
                        .map(|key| format!("https://media.example/{key}.jpg")),
                }
            })
            .filter(|bucket| bucket.count > 0)
            .collect();
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        buckets.truncate(limit);
        Box::pin(std::future::ready(Ok(buckets)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioview_core::{DefaultScheduler, Runtime};
    use std::rc::Rc;
    use std::time::Duration;

    fn request(offset: usize, limit: usize, filter: FilterParams) -> SearchRequest {
        SearchRequest {
            limit,
            offset,
            filter,
            fields: None,
        }
    }

    #[test]
    fn pages_come_back_through_the_dispatcher_after_the_latency() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let handle = runtime.handle();
        let service = SyntheticService::new(1000, 2, handle.dispatcher()).expect("worker");

        let received: Rc<RefCell<Option<Outcome>>> = Rc::new(RefCell::new(None));
        let future = service.search(request(990, 20, FilterParams::new()));
        {
            let received = Rc::clone(&received);
            handle.spawn_ui(async move {
                *received.borrow_mut() = Some(future.await);
            });
        }

        assert_eq!(service.tick(), 0);
        handle.drain_ui();
        assert!(received.borrow().is_none());
        assert_eq!(service.in_transit(), 1);

        assert_eq!(service.tick(), 1);
        for _ in 0..500 {
            handle.drain_ui();
            if received.borrow().is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        let page = received.borrow_mut().take().expect("settled").expect("page");
        assert_eq!(page.total, 1000);
        assert_eq!(page.results.len(), 10);
        assert_eq!(page.results[0].key, 990);
        assert_eq!(service.in_transit(), 0);
        assert!(!handle.has_pending_ui());
    }

    #[test]
    fn country_filter_narrows_to_every_fifth_key() {
        let filter = FilterParams::new().with("country", "SE");
        let page = page(12, &request(0, 10, filter));
        assert_eq!(page.total, 3);
        let keys: Vec<u64> = page.results.iter().map(|o| o.key).collect();
        assert_eq!(keys, vec![1, 6, 11]);
        assert!(page.results.iter().all(|o| o.country == "SE"));
        assert_eq!(page.total, filtered_total(12, &FilterParams::new().with("country", "SE")));
        assert_eq!(filtered_total(12, &FilterParams::new().with("basis", "x")), 0);
    }
}
