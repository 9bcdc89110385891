//! Viewport sizing and the rendered index range.

/// Inclusive bounds of the rendered items (overscan included).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewportRange {
    pub first_index: usize,
    pub last_index: usize,
}

impl ViewportRange {
    pub fn new(first_index: usize, last_index: usize) -> Self {
        debug_assert!(first_index <= last_index, "inverted viewport range");
        Self {
            first_index,
            last_index,
        }
    }

    /// Number of indices covered. Never zero.
    pub fn count(&self) -> usize {
        self.last_index - self.first_index + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.first_index..=self.last_index).contains(&index)
    }

    /// `(first_chunk, last_chunk)` covering this range.
    pub fn chunk_span(&self, chunk_size: usize) -> (usize, usize) {
        let chunk_size = chunk_size.max(1);
        (
            self.first_index / chunk_size,
            self.last_index / chunk_size,
        )
    }
}

/// Maximum viewport size accepted as real before treating it as unbounded.
const MAX_REASONABLE_VIEWPORT: f64 = 100_000.0;

/// Rows assumed visible when the viewport is unbounded.
const INFINITE_VIEWPORT_ITEM_COUNT: f64 = 20.0;

/// Validates the host-reported viewport size.
///
/// A container that is not height-constrained reports an infinite (or absurd)
/// size, which would make every row "visible" and fetch the whole result set.
#[derive(Clone, Copy, Debug)]
pub struct ViewportHandler {
    effective_size: f64,
    is_unbounded: bool,
}

impl ViewportHandler {
    pub fn new(viewport_size: f64, estimate_item_size: f64) -> Self {
        let is_unbounded = !viewport_size.is_finite() || viewport_size > MAX_REASONABLE_VIEWPORT;

        let effective_size = if is_unbounded {
            let fallback = estimate_item_size.max(1.0) * INFINITE_VIEWPORT_ITEM_COUNT;
            log::warn!(
                "unbounded viewport ({viewport_size}), windowing as if {fallback}px tall; \
                 the scroll container needs a fixed height"
            );
            fallback
        } else {
            viewport_size.max(0.0)
        };

        Self {
            effective_size,
            is_unbounded,
        }
    }

    #[inline]
    pub fn effective_size(&self) -> f64 {
        self.effective_size
    }

    #[inline]
    pub fn is_unbounded(&self) -> bool {
        self.is_unbounded
    }
}
