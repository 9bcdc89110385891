//! Boundary to the external result-producing services.
//!
//! The engine never filters, sorts, or aggregates. It hands a [`SearchRequest`]
//! (offset/limit plus the opaque [`FilterParams`]) to a [`QueryService`] and
//! stores whatever comes back, keyed by absolute index.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;

use bioview_core::collections::hasher;
use bioview_core::QueryError;

/// Sort order requested from the query service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

impl SortSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Filter and sort parameters that define one result set.
///
/// Two equal `FilterParams` must yield the same records in the same order.
/// Conditions are kept in a `BTreeMap` so equality and the fingerprint do not
/// depend on insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FilterParams {
    conditions: BTreeMap<String, String>,
    sort: Option<SortSpec>,
}

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    pub fn sorted_by(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.conditions.get(field).map(String::as_str)
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.conditions
            .iter()
            .map(|(field, value)| (field.as_str(), value.as_str()))
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.sort.is_none()
    }

    /// Short stable hash, used to correlate log lines for one result set.
    pub fn fingerprint(&self) -> u64 {
        let mut state = hasher::new();
        self.hash(&mut state);
        state.finish()
    }
}

/// One page request sent to the query service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
    pub limit: usize,
    pub offset: usize,
    pub filter: FilterParams,
    /// Projection; `None` asks for every field.
    pub fields: Option<Vec<String>>,
}

/// One page of results.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchPage<R> {
    /// Size of the whole filtered result set, not of this page.
    pub total: usize,
    pub results: Vec<R>,
}

pub type QueryFuture<R> = Pin<Box<dyn Future<Output = Result<SearchPage<R>, QueryError>>>>;

/// Paginated search over an externally filtered result set.
///
/// Implementations must be idempotent for identical requests and return rows
/// in the declared sort order. The returned future is polled on the UI thread
/// and may hold non-`Send` state.
pub trait QueryService<R> {
    fn search(&self, request: SearchRequest) -> QueryFuture<R>;
}

/// One group produced by the aggregation service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateBucket {
    pub value: String,
    pub count: u64,
    pub sample_media_url: Option<String>,
}

pub type AggregateFuture = Pin<Box<dyn Future<Output = Result<Vec<AggregateBucket>, QueryError>>>>;

/// Group-by counts over a filtered result set.
pub trait AggregationService {
    fn aggregate(&self, field: &str, filter: &FilterParams, limit: usize) -> AggregateFuture;
}

/// Records are opaque to the engine. The only thing it ever asks of one is the
/// value of a caller-named identity field, and only on a consumer's behalf.
pub trait Record: Clone + 'static {
    fn field_value(&self, _name: &str) -> Option<Cow<'_, str>> {
        None
    }
}

impl Record for String {}

impl Record for BTreeMap<String, String> {
    fn field_value(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|value| Cow::Borrowed(value.as_str()))
    }
}
