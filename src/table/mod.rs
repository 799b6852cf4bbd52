use std::ops::Range;

use bitflags::bitflags;
use crossbeam_channel::{unbounded, Receiver, Sender};
use indexmap::IndexSet;
use strum::{Display, EnumIter, EnumString};

use crate::error::EditError;
use crate::quantity::{format_quantity, StackGeometry, Unit};

pub mod filter;
pub mod projection;
mod record;
pub mod sort;

pub use filter::{FilterView, TableStats};
pub use projection::{ProjectionOutcome, DEFAULT_MAX_MULTIPLIER};
pub use record::{MaterialRecord, MaterialRow};
pub use sort::{HeaderActivation, SortOrder, SortSpec};

pub const STATUS_COMPLETE: &str = "complete";
pub const STATUS_INCOMPLETE: &str = "incomplete";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Column {
    Name,
    Total,
    Missing,
    Available,
    Status,
    QuickComplete,
}

impl Column {
    pub const COUNT: usize = 6;

    pub fn index(self) -> usize {
        match self {
            Column::Name => 0,
            Column::Total => 1,
            Column::Missing => 2,
            Column::Available => 3,
            Column::Status => 4,
            Column::QuickComplete => 5,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Column::Name),
            1 => Some(Column::Total),
            2 => Some(Column::Missing),
            3 => Some(Column::Available),
            4 => Some(Column::Status),
            5 => Some(Column::QuickComplete),
            _ => None,
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            Column::Name => "Item",
            Column::Total => "Total",
            Column::Missing => "Missing",
            Column::Available => "Available",
            Column::Status => "Status",
            Column::QuickComplete => "Done",
        }
    }

    pub fn flag(self) -> ColumnSet {
        match self {
            Column::Name => ColumnSet::NAME,
            Column::Total => ColumnSet::TOTAL,
            Column::Missing => ColumnSet::MISSING,
            Column::Available => ColumnSet::AVAILABLE,
            Column::Status => ColumnSet::STATUS,
            Column::QuickComplete => ColumnSet::QUICK_COMPLETE,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColumnSet: u8 {
        const NAME = 1 << 0;
        const TOTAL = 1 << 1;
        const MISSING = 1 << 2;
        const AVAILABLE = 1 << 3;
        const STATUS = 1 << 4;
        const QUICK_COMPLETE = 1 << 5;

        const QUANTITIES = Self::TOTAL.bits() | Self::MISSING.bits() | Self::AVAILABLE.bits();
        const DERIVED = Self::MISSING.bits() | Self::STATUS.bits() | Self::QUICK_COMPLETE.bits();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableChange {
    /// Every record was replaced.
    Reset { rows: usize },
    RowsChanged {
        rows: Range<usize>,
        columns: ColumnSet,
    },
    /// Same records, new order.
    Reordered,
    /// Rendering changed without any value changing.
    DisplayChanged { columns: ColumnSet },
}

impl TableChange {
    pub fn touches(&self, columns: ColumnSet) -> bool {
        match self {
            TableChange::Reset { .. } => true,
            TableChange::RowsChanged { columns: changed, .. }
            | TableChange::DisplayChanged { columns: changed } => changed.intersects(columns),
            TableChange::Reordered => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTone {
    Completed,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleHint {
    pub row: RowTone,
    /// Set only for the status column, which is emphasised on top of the row tone.
    pub emphasis: Option<RowTone>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayOptions {
    pub unit: Unit,
    pub geometry: StackGeometry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub row: usize,
    pub name: String,
    pub available: u64,
    pub missing: u64,
    pub changed: bool,
}

#[derive(Debug)]
pub struct MaterialTable {
    records: Vec<MaterialRecord>,
    display: DisplayOptions,
    quick_complete_locked: bool,
    multiplier: u32,
    max_multiplier: u32,
    sort: Option<SortSpec>,
    revision: u64,
    saved_revision: u64,
    listeners: Vec<Sender<TableChange>>,
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self::new(DisplayOptions::default(), DEFAULT_MAX_MULTIPLIER)
    }
}

impl MaterialTable {
    pub fn new(display: DisplayOptions, max_multiplier: u32) -> Self {
        Self {
            records: Vec::new(),
            display,
            quick_complete_locked: false,
            multiplier: 1,
            max_multiplier: max_multiplier.max(1),
            sort: None,
            revision: 0,
            saved_revision: 0,
            listeners: Vec::new(),
        }
    }

    /// Replaces every record. Duplicate and blank names are dropped, first
    /// occurrence wins; sheets read from disk have already set those rows
    /// aside. Returns the number of records kept.
    pub fn load<I>(&mut self, rows: I) -> usize
    where
        I: IntoIterator<Item = MaterialRow>,
    {
        let mut seen = IndexSet::new();
        let mut records = Vec::new();
        for row in rows {
            let name = row.name.trim();
            if name.is_empty() {
                tracing::warn!("skipping material row without a name");
                continue;
            }
            if !seen.insert(name.to_owned()) {
                tracing::warn!(name, "skipping duplicate material row");
                continue;
            }
            let row = MaterialRow {
                name: name.to_owned(),
                ..row
            };
            records.push(MaterialRecord::from_row(row));
        }

        self.records = records;
        self.multiplier = 1;
        self.sort = None;
        self.revision += 1;
        self.saved_revision = self.revision;
        let rows = self.records.len();
        tracing::debug!(rows, "material table loaded");
        self.emit(TableChange::Reset { rows });
        rows
    }

    pub fn clear(&mut self) {
        self.load(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MaterialRecord] {
        &self.records
    }

    pub fn record(&self, row: usize) -> Option<&MaterialRecord> {
        self.records.get(row)
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.records.iter().position(|record| record.name() == name)
    }

    pub fn display_options(&self) -> DisplayOptions {
        self.display
    }

    pub fn display_unit(&self) -> Unit {
        self.display.unit
    }

    pub fn set_display_unit(&mut self, unit: Unit) -> bool {
        if self.display.unit == unit {
            return false;
        }
        self.display.unit = unit;
        self.emit(TableChange::DisplayChanged {
            columns: ColumnSet::QUANTITIES,
        });
        true
    }

    pub fn set_geometry(&mut self, geometry: StackGeometry) {
        if self.display.geometry == geometry {
            return;
        }
        self.display.geometry = geometry;
        self.emit(TableChange::DisplayChanged {
            columns: ColumnSet::QUANTITIES,
        });
    }

    pub fn is_quick_complete_locked(&self) -> bool {
        self.quick_complete_locked
    }

    pub fn set_quick_complete_locked(&mut self, locked: bool) -> bool {
        if self.quick_complete_locked == locked {
            return false;
        }
        self.quick_complete_locked = locked;
        self.emit(TableChange::DisplayChanged {
            columns: ColumnSet::QUICK_COMPLETE,
        });
        true
    }

    pub fn display_value(&self, row: usize, column: Column) -> Option<String> {
        let record = self.records.get(row)?;
        let DisplayOptions { unit, geometry } = self.display;
        let quantity = |value: u64| format_quantity(clamp_i64(value), unit, geometry);
        let text = match column {
            Column::Name => record.name().to_owned(),
            Column::Total => quantity(record.total()),
            Column::Missing => quantity(record.missing()),
            Column::Available => quantity(record.available()),
            Column::Status => status_label(record).to_owned(),
            Column::QuickComplete => String::new(),
        };
        Some(text)
    }

    /// Text an editor should start from. Only the available column is
    /// editable; every other column hands back its display text.
    pub fn edit_value(&self, row: usize, column: Column) -> Option<String> {
        match column {
            Column::Available => self
                .records
                .get(row)
                .map(|record| record.available().to_string()),
            other => self.display_value(row, other),
        }
    }

    pub fn is_editable(&self, column: Column) -> bool {
        column == Column::Available
    }

    pub fn is_checkable(&self, column: Column) -> bool {
        column == Column::QuickComplete && !self.quick_complete_locked
    }

    pub fn check_state(&self, row: usize) -> Option<bool> {
        self.records.get(row).map(MaterialRecord::is_completed)
    }

    pub fn style_hint(&self, row: usize, column: Column) -> Option<StyleHint> {
        let record = self.records.get(row)?;
        let tone = if record.is_completed() {
            RowTone::Completed
        } else {
            RowTone::Pending
        };
        Some(StyleHint {
            row: tone,
            emphasis: (column == Column::Status).then_some(tone),
        })
    }

    pub fn set_available(&mut self, row: usize, value: i64) -> Result<EditOutcome, EditError> {
        let len = self.records.len();
        if row >= len {
            return Err(EditError::RowOutOfRange { row, len });
        }
        let available = u64::try_from(value).map_err(|_| EditError::Negative { value })?;
        Ok(self.apply_available(row, available))
    }

    pub fn set_available_input(&mut self, row: usize, input: &str) -> Result<EditOutcome, EditError> {
        let value = input
            .trim()
            .parse::<i64>()
            .map_err(|_| EditError::NotANumber {
                input: input.to_owned(),
            })?;
        self.set_available(row, value)
    }

    pub fn toggle_quick_complete(
        &mut self,
        row: usize,
        checked: bool,
    ) -> Result<EditOutcome, EditError> {
        if self.quick_complete_locked {
            return Err(EditError::Locked);
        }
        let record = self.records.get(row).ok_or(EditError::RowOutOfRange {
            row,
            len: self.records.len(),
        })?;
        let available = if checked { record.total() } else { 0 };
        Ok(self.apply_available(row, available))
    }

    fn apply_available(&mut self, row: usize, available: u64) -> EditOutcome {
        let record = &mut self.records[row];
        let changed = record.available() != available;
        if changed {
            record.set_available(available);
        }
        let outcome = EditOutcome {
            row,
            name: record.name().to_owned(),
            available: record.available(),
            missing: record.missing(),
            changed,
        };
        if changed {
            self.revision += 1;
            tracing::debug!(
                name = %outcome.name,
                available = outcome.available,
                missing = outcome.missing,
                "available amount updated"
            );
            self.emit(TableChange::RowsChanged {
                rows: row..row + 1,
                columns: ColumnSet::all(),
            });
        }
        outcome
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    /// Records that the table content as of `revision` reached disk.
    pub fn mark_saved(&mut self, revision: u64) {
        if revision > self.saved_revision && revision <= self.revision {
            self.saved_revision = revision;
        }
    }

    pub fn subscribe(&mut self) -> Receiver<TableChange> {
        let (tx, rx) = unbounded();
        self.listeners.push(tx);
        rx
    }

    pub(crate) fn records_mut(&mut self) -> &mut Vec<MaterialRecord> {
        &mut self.records
    }

    pub(crate) fn emit(&mut self, change: TableChange) {
        self.listeners
            .retain(|listener| listener.send(change.clone()).is_ok());
    }
}

pub fn status_label(record: &MaterialRecord) -> &'static str {
    if record.is_completed() {
        STATUS_COMPLETE
    } else {
        STATUS_INCOMPLETE
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
