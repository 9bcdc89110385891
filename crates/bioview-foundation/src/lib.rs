//! Windowed rendering and chunked caching for result sets that may hold
//! millions of records while only a few dozen are on screen.
//!
//! - [`lazy`] decides which absolute indices are visible, loads their records
//!   in fixed-size chunks, and keeps scroll position stable across re-layouts.
//! - [`query`] is the boundary to the external search and aggregation services.

pub mod lazy;
pub mod query;

pub use lazy::*;
pub use query::*;

pub mod prelude {
    pub use crate::lazy::{
        Align, ChunkConfig, ChunkLoader, IndexCache, LayoutConfig, NavigationController, Phase,
        RenderKey, ResultsView, ScrollContainer, ScrollPositionPreserver, ViewMode, ViewportRange,
        VirtualItem, Window, WindowConfig, WindowingCalculator,
    };
    pub use crate::query::{
        AggregateBucket, AggregationService, FilterParams, QueryService, Record, SearchPage,
        SearchRequest, SortSpec,
    };
    pub use bioview_core::QueryError;
}
