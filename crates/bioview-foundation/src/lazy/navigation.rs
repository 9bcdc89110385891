//! Previous/next stepping across the whole result set.
//!
//! The controller only moves the selection and asks for a scroll. It never
//! fetches: once the scroll lands, the target's chunk becomes visible and the
//! chunk loader fills it on the next visibility pass.

use super::scroll_position::{Align, ScrollPositionPreserver};

/// Capability to bring an absolute index into view.
pub trait IndexScroller {
    fn request_scroll_to(&mut self, index: usize, align: Align);
}

impl IndexScroller for ScrollPositionPreserver {
    fn request_scroll_to(&mut self, index: usize, align: Align) {
        self.request_scroll(index, align);
    }
}

#[derive(Clone, Debug, Default)]
pub struct NavigationController {
    selected: Option<usize>,
    total_count: usize,
}

impl NavigationController {
    pub fn new(total_count: usize) -> Self {
        Self {
            selected: None,
            total_count,
        }
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    /// Adopts a new total; a selection past the end is dropped.
    pub fn set_total_count(&mut self, total_count: usize) {
        self.total_count = total_count;
        if self.selected.is_some_and(|index| index >= total_count) {
            self.selected = None;
        }
    }

    /// Selects `index`. Returns `false` (and leaves the selection alone) when
    /// `index` is out of range.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.total_count {
            return false;
        }
        self.selected = Some(index);
        true
    }

    pub fn clear_selection(&mut self) -> Option<usize> {
        self.selected.take()
    }

    pub fn can_go_next(&self) -> bool {
        self.selected
            .is_some_and(|index| index + 1 < self.total_count)
    }

    pub fn can_go_previous(&self) -> bool {
        self.selected.is_some_and(|index| index > 0)
    }

    /// Steps to the next index and asks `scroller` to bring it into view.
    ///
    /// No-op without a selection, at the last index, or without a scroller
    /// (the container is not mounted yet).
    pub fn handle_next(&mut self, scroller: Option<&mut dyn IndexScroller>) -> Option<usize> {
        let scroller = scroller?;
        if !self.can_go_next() {
            return None;
        }
        let next = self.selected? + 1;
        self.selected = Some(next);
        // Auto alignment brings the row's far edge inside the viewport.
        scroller.request_scroll_to(next, Align::Auto);
        Some(next)
    }

    /// Mirror of [`handle_next`](Self::handle_next).
    pub fn handle_previous(&mut self, scroller: Option<&mut dyn IndexScroller>) -> Option<usize> {
        let scroller = scroller?;
        if !self.can_go_previous() {
            return None;
        }
        let previous = self.selected? - 1;
        self.selected = Some(previous);
        scroller.request_scroll_to(previous, Align::Auto);
        Some(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        requests: Vec<(usize, Align)>,
    }

    impl IndexScroller for Recorder {
        fn request_scroll_to(&mut self, index: usize, align: Align) {
            self.requests.push((index, align));
        }
    }

    #[test]
    fn next_at_last_index_is_a_no_op() {
        let mut nav = NavigationController::new(5);
        let mut recorder = Recorder::default();
        nav.select(4);
        assert!(!nav.can_go_next());
        assert_eq!(nav.handle_next(Some(&mut recorder)), None);
        assert_eq!(nav.selected_index(), Some(4));
        assert!(recorder.requests.is_empty());
    }

    #[test]
    fn previous_at_first_index_is_a_no_op() {
        let mut nav = NavigationController::new(5);
        let mut recorder = Recorder::default();
        nav.select(0);
        assert_eq!(nav.handle_previous(Some(&mut recorder)), None);
        assert_eq!(nav.selected_index(), Some(0));
        assert!(recorder.requests.is_empty());
    }

    #[test]
    fn stepping_requests_auto_scroll_to_the_new_index() {
        let mut nav = NavigationController::new(1_000_000);
        let mut recorder = Recorder::default();
        nav.select(499);

        assert_eq!(nav.handle_next(Some(&mut recorder)), Some(500));
        assert_eq!(nav.handle_previous(Some(&mut recorder)), Some(499));
        assert_eq!(
            recorder.requests,
            vec![(500, Align::Auto), (499, Align::Auto)]
        );
    }

    #[test]
    fn no_selection_or_no_scroller_means_no_step() {
        let mut nav = NavigationController::new(5);
        let mut recorder = Recorder::default();
        assert_eq!(nav.handle_next(Some(&mut recorder)), None);

        nav.select(2);
        assert_eq!(nav.handle_next(None), None);
        assert_eq!(nav.handle_previous(None), None);
        assert_eq!(nav.selected_index(), Some(2));
    }

    #[test]
    fn shrinking_total_drops_out_of_range_selection() {
        let mut nav = NavigationController::new(1000);
        nav.select(700);
        nav.set_total_count(5);
        assert_eq!(nav.selected_index(), None);
        assert!(!nav.select(5));
        assert!(nav.select(4));
    }

    #[test]
    fn preserver_is_a_scroller() {
        let mut nav = NavigationController::new(10);
        let mut preserver = ScrollPositionPreserver::new();
        nav.select(3);
        nav.handle_next(Some(&mut preserver));
        let state = preserver.scroll_state();
        assert!(state.should_scroll);
        assert_eq!(state.target_index, 4);
    }
}
