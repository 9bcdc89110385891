//! Windowed rendering and chunked loading for large result sets.
//!
//! The calculator decides which absolute indices are on screen, the chunk
//! loader makes sure the aligned chunks covering them are fetched once, and
//! the index cache serves rows to whichever slot asks for them. Scroll
//! preservation and navigation sit on top; [`ResultsView`] assembles the lot.

mod chunk_loader;
mod index_cache;
mod layout_mode;
mod navigation;
mod results_view;
mod scroll_position;
mod viewport;
mod windowing;

pub use chunk_loader::{ChunkConfig, ChunkLoader, LoaderStats, RequestedChunks, DEFAULT_CHUNK_SIZE};
pub use index_cache::{IndexCache, RenderKey};
pub use layout_mode::{LayoutConfig, ViewMode};
pub use navigation::{IndexScroller, NavigationController};
pub use results_view::{Frame, Phase, ResultsView, Slot};
pub use scroll_position::{Align, ScrollContainer, ScrollPositionPreserver, ScrollState};
pub use viewport::{ViewportHandler, ViewportRange};
pub use windowing::{
    compute_window, VirtualItem, Window, WindowConfig, WindowingCalculator,
    DEFAULT_ITEM_SIZE_ESTIMATE, DEFAULT_OVERSCAN, MAX_SCROLL_EXTENT,
};
