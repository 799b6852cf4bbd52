use serde::Serialize;

use super::{MaterialRecord, MaterialTable};

/// Read-only visibility over a [`MaterialTable`]. Holds no rows of its own, so
/// every query reflects the table as it is right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterView {
    hide_completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TableStats {
    pub total: usize,
    pub completed: usize,
    pub completion_percent: f64,
    pub visible: usize,
    pub hidden: usize,
}

impl FilterView {
    pub fn new(hide_completed: bool) -> Self {
        Self { hide_completed }
    }

    pub fn hide_completed(&self) -> bool {
        self.hide_completed
    }

    pub fn set_hide_completed(&mut self, hide: bool) -> bool {
        let changed = self.hide_completed != hide;
        self.hide_completed = hide;
        changed
    }

    pub fn accepts(&self, record: &MaterialRecord) -> bool {
        !self.hide_completed || !record.is_completed()
    }

    /// Table row indices that pass the filter, in table order. The iterator can
    /// be cloned to restart it.
    pub fn visible_rows<'a>(
        &self,
        table: &'a MaterialTable,
    ) -> impl Iterator<Item = usize> + Clone + 'a {
        let view = *self;
        table
            .records()
            .iter()
            .enumerate()
            .filter(move |(_, record)| view.accepts(record))
            .map(|(row, _)| row)
    }

    pub fn is_visible(&self, table: &MaterialTable, row: usize) -> bool {
        table.record(row).is_some_and(|record| self.accepts(record))
    }

    pub fn visible_count(&self, table: &MaterialTable) -> usize {
        self.visible_rows(table).count()
    }

    pub fn hidden_count(&self, table: &MaterialTable) -> usize {
        self.total_count(table) - self.visible_count(table)
    }

    pub fn total_count(&self, table: &MaterialTable) -> usize {
        table.len()
    }

    pub fn stats(&self, table: &MaterialTable) -> TableStats {
        let total = table.len();
        let completed = table
            .records()
            .iter()
            .filter(|record| record.is_completed())
            .count();
        let visible = self.visible_count(table);
        let completion_percent = if total == 0 {
            0.0
        } else {
            completed as f64 * 100.0 / total as f64
        };
        TableStats {
            total,
            completed,
            completion_percent,
            visible,
            hidden: total - visible,
        }
    }
}
