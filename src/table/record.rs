use serde::Serialize;

/// Validated input row, as produced by the sheet loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialRow {
    pub name: String,
    pub total: u64,
    pub available: u64,
}

impl MaterialRow {
    pub fn new(name: impl Into<String>, total: u64, available: u64) -> Self {
        Self {
            name: name.into(),
            total,
            available,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialRecord {
    name: String,
    base_total: u64,
    total: u64,
    available: u64,
}

impl MaterialRecord {
    pub(crate) fn from_row(row: MaterialRow) -> Self {
        Self {
            name: row.name,
            base_total: row.total,
            total: row.total,
            available: row.available,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_total(&self) -> u64 {
        self.base_total
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn available(&self) -> u64 {
        self.available
    }

    pub fn missing(&self) -> u64 {
        self.total.saturating_sub(self.available)
    }

    pub fn is_completed(&self) -> bool {
        self.missing() == 0
    }

    /// Missing amount measured against the unscaled requirement.
    pub fn base_missing(&self) -> u64 {
        self.base_total.saturating_sub(self.available)
    }

    pub(crate) fn set_available(&mut self, available: u64) {
        self.available = available;
    }

    pub(crate) fn set_total(&mut self, total: u64) {
        self.total = total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_never_goes_negative() {
        let mut record = MaterialRecord::from_row(MaterialRow::new("Stone", 10, 35));
        assert_eq!(record.missing(), 0);
        assert!(record.is_completed());

        record.set_available(4);
        assert_eq!(record.missing(), 6);
        assert!(!record.is_completed());
    }

    #[test]
    fn zero_requirement_counts_as_completed() {
        let record = MaterialRecord::from_row(MaterialRow::new("Air", 0, 0));
        assert!(record.is_completed());
    }
}
