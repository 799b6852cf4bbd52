use indexmap::IndexMap;

use super::{ColumnSet, MaterialTable, TableChange};
use crate::error::ProjectionError;

/// Upper bound on the projection count unless configured otherwise.
pub const DEFAULT_MAX_MULTIPLIER: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionOutcome {
    Unchanged,
    Rescaled { multiplier: u32, rows: usize },
}

impl MaterialTable {
    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn max_multiplier(&self) -> u32 {
        self.max_multiplier
    }

    /// Rescales every total from its base total. Either every row is updated
    /// or, on error, none is.
    pub fn set_multiplier(&mut self, count: u32) -> Result<ProjectionOutcome, ProjectionError> {
        if count == 0 || count > self.max_multiplier {
            return Err(ProjectionError::OutOfRange {
                count,
                max: self.max_multiplier,
            });
        }
        if count == self.multiplier {
            return Ok(ProjectionOutcome::Unchanged);
        }

        let mut scaled = IndexMap::with_capacity(self.records.len());
        for record in &self.records {
            let total = record.base_total().checked_mul(u64::from(count)).ok_or_else(|| {
                ProjectionError::Overflow {
                    name: record.name().to_owned(),
                    count,
                }
            })?;
            scaled.insert(record.name().to_owned(), total);
        }

        for record in self.records.iter_mut() {
            if let Some(total) = scaled.get(record.name()) {
                record.set_total(*total);
            }
        }
        self.multiplier = count;

        let rows = self.records.len();
        tracing::info!(multiplier = count, rows, "rescaled material totals");
        self.emit(TableChange::RowsChanged {
            rows: 0..rows,
            columns: ColumnSet::TOTAL | ColumnSet::DERIVED,
        });
        self.reapply_sort();
        Ok(ProjectionOutcome::Rescaled {
            multiplier: count,
            rows,
        })
    }
}
