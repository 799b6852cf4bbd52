use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::{Column, MaterialRecord, MaterialTable, TableChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn flipped(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: Column,
    pub order: SortOrder,
}

/// What activating a column header should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderActivation {
    Sort(SortSpec),
    /// The quick-complete header toggles the lock instead of sorting.
    ToggleLock,
}

impl SortSpec {
    pub fn new(column: Column, order: SortOrder) -> Self {
        Self { column, order }
    }

    /// Re-activating the sorted column flips its order; a new column starts
    /// descending.
    pub fn activate(previous: Option<SortSpec>, column: Column) -> HeaderActivation {
        if column == Column::QuickComplete {
            return HeaderActivation::ToggleLock;
        }
        let order = match previous {
            Some(spec) if spec.column == column => spec.order.flipped(),
            _ => SortOrder::Descending,
        };
        HeaderActivation::Sort(SortSpec { column, order })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Text(String),
    Number(u64),
    /// `(0 when completed else 1, missing)`
    Status(u8, u64),
}

impl MaterialTable {
    /// Reorders records in place. Ties keep their previous relative order.
    ///
    /// Keys come from the typed record fields, so every column yields one
    /// key kind and the sort cannot fail. Unreadable cells were already
    /// coerced to 0 when the sheet was read.
    pub fn sort(&mut self, column: Column, order: SortOrder) {
        let keys = self
            .records()
            .iter()
            .map(|record| sort_key(record, column))
            .collect();
        reorder(self.records_mut(), keys, order);
        self.sort = Some(SortSpec::new(column, order));
        self.emit(TableChange::Reordered);
    }

    pub fn sort_spec(&self) -> Option<SortSpec> {
        self.sort
    }

    /// Sorts again by the active spec, if any.
    pub fn reapply_sort(&mut self) {
        if let Some(spec) = self.sort {
            self.sort(spec.column, spec.order);
        }
    }
}

fn sort_key(record: &MaterialRecord, column: Column) -> SortKey {
    match column {
        Column::Name => SortKey::Text(record.name().to_owned()),
        Column::Total => SortKey::Number(record.total()),
        Column::Missing => SortKey::Number(record.missing()),
        Column::Available => SortKey::Number(record.available()),
        Column::Status | Column::QuickComplete => {
            SortKey::Status(u8::from(!record.is_completed()), record.missing())
        }
    }
}

fn reorder<K: Ord>(records: &mut Vec<MaterialRecord>, keys: Vec<K>, order: SortOrder) {
    let mut paired: Vec<(K, MaterialRecord)> = keys.into_iter().zip(records.drain(..)).collect();
    paired.sort_by(|a, b| order.apply(a.0.cmp(&b.0)));
    records.extend(paired.into_iter().map(|(_, record)| record));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::coerce_count;
    use crate::table::tests::table_with;

    fn names(table: &MaterialTable) -> Vec<&str> {
        table.records().iter().map(MaterialRecord::name).collect()
    }

    #[test]
    fn name_sort_descending_reverses_ascending() {
        let mut table = table_with(&[("Stone", 1, 0), ("Dirt", 1, 0), ("Oak", 1, 0)]);
        table.sort(Column::Name, SortOrder::Ascending);
        let ascending: Vec<String> = names(&table).into_iter().map(String::from).collect();
        assert_eq!(ascending, ["Dirt", "Oak", "Stone"]);

        table.sort(Column::Name, SortOrder::Descending);
        let mut descending: Vec<String> = names(&table).into_iter().map(String::from).collect();
        descending.reverse();
        assert_eq!(ascending, descending);
    }

    #[test]
    fn numeric_columns_sort_by_value_not_text() {
        let mut table = table_with(&[("A", 100, 0), ("B", 9, 0), ("C", 20, 0)]);
        table.sort(Column::Total, SortOrder::Ascending);
        assert_eq!(names(&table), ["B", "C", "A"]);

        table.sort(Column::Available, SortOrder::Descending);
        assert_eq!(
            table.sort_spec(),
            Some(SortSpec::new(Column::Available, SortOrder::Descending))
        );
    }

    #[test]
    fn ties_keep_previous_order() {
        let mut table = table_with(&[("A", 5, 0), ("B", 5, 0), ("C", 1, 0), ("D", 5, 0)]);
        table.sort(Column::Total, SortOrder::Descending);
        assert_eq!(names(&table), ["A", "B", "D", "C"]);
        table.sort(Column::Total, SortOrder::Ascending);
        assert_eq!(names(&table), ["C", "A", "B", "D"]);
    }

    #[test]
    fn status_sort_groups_completed_rows() {
        let mut table = table_with(&[
            ("Todo-big", 50, 0),
            ("Done-a", 5, 5),
            ("Todo-small", 3, 1),
            ("Done-b", 8, 10),
        ]);
        table.sort(Column::Status, SortOrder::Ascending);
        assert_eq!(names(&table), ["Done-a", "Done-b", "Todo-small", "Todo-big"]);

        table.sort(Column::Status, SortOrder::Descending);
        assert_eq!(names(&table), ["Todo-big", "Todo-small", "Done-a", "Done-b"]);
    }

    #[test]
    fn quick_complete_sorts_like_status() {
        let rows = [("X", 50, 0), ("Y", 5, 5), ("Z", 3, 1)];
        let mut by_status = table_with(&rows);
        let mut by_quick = table_with(&rows);
        by_status.sort(Column::Status, SortOrder::Ascending);
        by_quick.sort(Column::QuickComplete, SortOrder::Ascending);
        assert_eq!(names(&by_status), names(&by_quick));
    }

    #[test]
    fn name_is_rediscoverable_after_sort() {
        let mut table = table_with(&[("Stone", 1, 0), ("Dirt", 9, 0)]);
        let before = table.position_of("Stone");
        table.sort(Column::Total, SortOrder::Descending);
        assert_eq!(before, Some(0));
        assert_eq!(table.position_of("Stone"), Some(1));
    }

    #[test]
    fn unreadable_counts_sort_as_zero() {
        let mut table = table_with(&[
            ("A", coerce_count("lots"), 0),
            ("B", coerce_count("12.9"), 0),
            ("C", coerce_count("3"), 0),
        ]);
        table.sort(Column::Total, SortOrder::Ascending);
        assert_eq!(names(&table), ["A", "C", "B"]);
    }

    #[test]
    fn header_activation_toggles_and_starts_descending() {
        let first = SortSpec::activate(None, Column::Total);
        assert_eq!(
            first,
            HeaderActivation::Sort(SortSpec::new(Column::Total, SortOrder::Descending))
        );
        let previous = SortSpec::new(Column::Total, SortOrder::Descending);
        assert_eq!(
            SortSpec::activate(Some(previous), Column::Total),
            HeaderActivation::Sort(SortSpec::new(Column::Total, SortOrder::Ascending))
        );
        assert_eq!(
            SortSpec::activate(Some(previous), Column::Name),
            HeaderActivation::Sort(SortSpec::new(Column::Name, SortOrder::Descending))
        );
        assert_eq!(
            SortSpec::activate(Some(previous), Column::QuickComplete),
            HeaderActivation::ToggleLock
        );
    }
}
