//! Absolute-index record cache with a generation signal.
//!
//! The map itself is not observable, so every mutation bumps [`version`]
//! and renderers key their slots by [`RenderKey`] `(index, version)`. After a
//! clear, a slot at the same index gets a new key even though the storage is
//! reused, so a row from the previous filter can never be shown under the new
//! one.
//!
//! [`version`]: IndexCache::version

use std::ops::Range;

use bioview_core::collections::map::HashMap;

/// Render identity of one slot. Changes whenever the cache is mutated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderKey {
    pub index: usize,
    pub version: u64,
}

#[derive(Debug)]
pub struct IndexCache<R> {
    entries: HashMap<usize, R>,
    /// Bumped by every clear and every chunk write.
    version: u64,
    /// Bumped by clears only; identifies the result set the entries belong to.
    generation: u64,
}

impl<R> Default for IndexCache<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> IndexCache<R> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::default(),
            version: 0,
            generation: 0,
        }
    }

    pub fn get(&self, index: usize) -> Option<&R> {
        self.entries.get(&index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains_key(&index)
    }

    /// Whether every index in `range` is cached.
    pub fn contains_range(&self, range: Range<usize>) -> bool {
        range.into_iter().all(|index| self.entries.contains_key(&index))
    }

    /// Writes one chunk's records at `offset..offset + records.len()` and
    /// bumps the version once.
    pub fn set_many(&mut self, offset: usize, records: Vec<R>) {
        self.entries.reserve(records.len());
        for (i, record) in records.into_iter().enumerate() {
            self.entries.insert(offset + i, record);
        }
        self.version += 1;
    }

    /// Drops every entry and starts a new generation.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.version += 1;
        self.generation += 1;
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn render_key(&self, index: usize) -> RenderKey {
        RenderKey {
            index,
            version: self.version,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
