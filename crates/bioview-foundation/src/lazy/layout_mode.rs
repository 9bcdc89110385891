//! Table and grid presentation geometry.

use super::windowing::{WindowConfig, DEFAULT_OVERSCAN};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ViewMode {
    /// One record per row.
    #[default]
    Table,
    /// Media cards in as many columns as the width allows.
    Grid,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutConfig {
    pub table_row_height: f64,
    pub card_height: f64,
    pub min_card_width: f64,
    /// Upper bound on grid columns regardless of width.
    pub max_lanes: usize,
    pub overscan: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            table_row_height: 36.0,
            card_height: 280.0,
            min_card_width: 220.0,
            max_lanes: 12,
            overscan: DEFAULT_OVERSCAN,
        }
    }
}

impl LayoutConfig {
    /// Grid columns that fit `width`; at least one.
    pub fn lanes_for_width(&self, width: f64) -> usize {
        if !width.is_finite() || width <= 0.0 || self.min_card_width <= 0.0 {
            return 1;
        }
        ((width / self.min_card_width).floor() as usize).clamp(1, self.max_lanes.max(1))
    }

    pub fn window_config(&self, mode: ViewMode, width: f64) -> WindowConfig {
        match mode {
            ViewMode::Table => WindowConfig {
                estimate_item_size: self.table_row_height,
                lane_count: 1,
                overscan: self.overscan,
            },
            ViewMode::Grid => WindowConfig {
                estimate_item_size: self.card_height,
                lane_count: self.lanes_for_width(width),
                // Cards are tall; a couple of rows is plenty.
                overscan: self.overscan.min(2),
            },
        }
    }
}
