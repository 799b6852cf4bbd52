use std::path::PathBuf;
use std::time::{Duration, Instant};

use time::OffsetDateTime;

use crate::config::{AutoSaveConfig, CommitPolicy};
use crate::storage::SheetHandle;
use crate::table::MaterialTable;

#[derive(Debug, Clone, PartialEq)]
pub enum AutoSaveStatus {
    /// Manual policy with nothing waiting.
    Disabled,
    Idle {
        last_saved_at: Option<OffsetDateTime>,
    },
    Pending {
        since: OffsetDateTime,
    },
    Error {
        message: String,
        occurred_at: OffsetDateTime,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutoSaveEvent {
    Saved {
        path: PathBuf,
        rows: usize,
        timestamp: OffsetDateTime,
    },
    Error {
        path: PathBuf,
        message: String,
    },
}

/// Decides when a dirty table is written back to its sheet.
#[derive(Debug)]
pub struct AutoSaveRuntime {
    policy: CommitPolicy,
    debounce: Duration,
    pending: Option<PendingCommit>,
    last_saved_at: Option<OffsetDateTime>,
    last_error: Option<AutoSaveFailure>,
}

#[derive(Debug, Clone, Copy)]
struct PendingCommit {
    since: Instant,
    since_wall: OffsetDateTime,
}

#[derive(Debug, Clone)]
struct AutoSaveFailure {
    message: String,
    occurred_at: OffsetDateTime,
}

impl AutoSaveRuntime {
    pub fn new(config: &AutoSaveConfig) -> Self {
        Self {
            policy: config.policy,
            debounce: config.debounce,
            pending: None,
            last_saved_at: None,
            last_error: None,
        }
    }

    pub fn policy(&self) -> CommitPolicy {
        self.policy
    }

    pub fn status(&self) -> AutoSaveStatus {
        if let Some(failure) = &self.last_error {
            return AutoSaveStatus::Error {
                message: failure.message.clone(),
                occurred_at: failure.occurred_at,
            };
        }
        if let Some(pending) = self.pending {
            return AutoSaveStatus::Pending {
                since: pending.since_wall,
            };
        }
        if self.policy == CommitPolicy::Manual {
            return AutoSaveStatus::Disabled;
        }
        AutoSaveStatus::Idle {
            last_saved_at: self.last_saved_at,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Starts the debounce window unless one is already open.
    pub fn note_change(&mut self) {
        if self.pending.is_none() {
            self.pending = Some(PendingCommit::now());
        }
    }

    /// Forgets pending work, e.g. after the table was reloaded from disk.
    pub fn reset(&mut self) {
        self.pending = None;
        self.last_error = None;
    }

    pub fn poll(&mut self, table: &mut MaterialTable, sheet: &SheetHandle) -> Option<AutoSaveEvent> {
        self.flush_internal(table, sheet, FlushKind::Scheduled)
    }

    pub fn flush_now(
        &mut self,
        table: &mut MaterialTable,
        sheet: &SheetHandle,
    ) -> Option<AutoSaveEvent> {
        self.flush_internal(table, sheet, FlushKind::Immediate)
    }

    fn flush_internal(
        &mut self,
        table: &mut MaterialTable,
        sheet: &SheetHandle,
        mode: FlushKind,
    ) -> Option<AutoSaveEvent> {
        if !table.is_dirty() {
            self.pending = None;
            return None;
        }
        let pending = *self.pending.get_or_insert_with(PendingCommit::now);

        if mode == FlushKind::Scheduled {
            let ready = match self.policy {
                CommitPolicy::Immediate => true,
                CommitPolicy::Debounced => pending.since.elapsed() >= self.debounce,
                CommitPolicy::Manual => false,
            };
            if !ready {
                return None;
            }
        }

        let timestamp = OffsetDateTime::now_utc();
        match sheet.save(table) {
            Ok(report) => {
                table.mark_saved(report.revision);
                if !table.is_dirty() {
                    self.pending = None;
                }
                self.last_saved_at = Some(timestamp);
                self.last_error = None;
                tracing::debug!(policy = %self.policy, ?mode, "commit completed");
                Some(AutoSaveEvent::Saved {
                    path: report.path,
                    rows: report.rows,
                    timestamp,
                })
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!(%err, "sheet save failed");
                self.last_error = Some(AutoSaveFailure {
                    message: message.clone(),
                    occurred_at: timestamp,
                });
                Some(AutoSaveEvent::Error {
                    path: sheet.path().to_path_buf(),
                    message,
                })
            }
        }
    }
}

impl PendingCommit {
    fn now() -> Self {
        Self {
            since: Instant::now(),
            since_wall: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FlushKind {
    Scheduled,
    Immediate,
}
