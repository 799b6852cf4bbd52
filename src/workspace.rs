//! One open materials sheet plus everything a front end needs around it: the
//! visibility filter, the commit scheduler, persisted preferences and user
//! facing notices.

use std::path::Path;

use crossbeam_channel::Receiver;
use strum::Display;

use crate::config::{AppConfig, PreferenceStore, Preferences};
use crate::error::{EditError, PersistError, ProjectionError};
use crate::journaling::{AutoSaveEvent, AutoSaveRuntime, AutoSaveStatus};
use crate::quantity::Unit;
use crate::storage::{self, SheetHandle};
use crate::table::{
    Column, EditOutcome, FilterView, HeaderActivation, MaterialTable, ProjectionOutcome,
    SortOrder, SortSpec, TableChange, TableStats,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

type NoticeSink = Box<dyn FnMut(&Notice)>;

pub struct Workspace {
    config: AppConfig,
    table: MaterialTable,
    filter: FilterView,
    sheet: Option<SheetHandle>,
    scheduler: AutoSaveRuntime,
    preferences: Preferences,
    store: Box<dyn PreferenceStore>,
    sinks: Vec<NoticeSink>,
    reported_failure: Option<String>,
}

impl Workspace {
    pub fn new(config: AppConfig, store: Box<dyn PreferenceStore>) -> Self {
        let preferences = store.load().unwrap_or_else(|err| {
            tracing::warn!(?err, "failed to read preferences, using defaults");
            Preferences::default()
        });
        let mut display = config.display.options();
        if let Some(unit) = preferences.unit {
            display.unit = unit;
        }
        let table = MaterialTable::new(display, config.projection.max_multiplier);
        let filter = FilterView::new(preferences.hide_completed);
        let scheduler = AutoSaveRuntime::new(&config.auto_save);
        Self {
            config,
            table,
            filter,
            sheet: None,
            scheduler,
            preferences,
            store,
            sinks: Vec::new(),
            reported_failure: None,
        }
    }

    pub fn on_notice<F>(&mut self, sink: F)
    where
        F: FnMut(&Notice) + 'static,
    {
        self.sinks.push(Box::new(sink));
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn table(&self) -> &MaterialTable {
        &self.table
    }

    pub fn subscribe(&mut self) -> Receiver<TableChange> {
        self.table.subscribe()
    }

    pub fn filter(&self) -> FilterView {
        self.filter
    }

    pub fn sheet(&self) -> Option<&SheetHandle> {
        self.sheet.as_ref()
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn stats(&self) -> TableStats {
        self.filter.stats(&self.table)
    }

    pub fn autosave_status(&self) -> AutoSaveStatus {
        self.scheduler.status()
    }

    pub fn is_dirty(&self) -> bool {
        self.table.is_dirty()
    }

    /// Loads a sheet, replacing whatever was open. Pending edits to the current
    /// sheet are written first; if that fails nothing is replaced.
    ///
    /// A sheet that cannot be read leaves an empty table behind and nothing
    /// bound for saving.
    pub fn open(&mut self, path: &Path) -> Result<usize, PersistError> {
        if self.table.is_dirty() {
            self.flush();
            if self.table.is_dirty() {
                let err = PersistError::Unsaved;
                tracing::warn!(path = %path.display(), "not replacing sheet with unsaved changes");
                self.notify(NoticeLevel::Error, format!("Not reloading: {err}"));
                return Err(err);
            }
        }
        self.scheduler.reset();
        self.reported_failure = None;
        match storage::load(path, &self.config.storage) {
            Ok(loaded) => {
                let rows = self.table.load(loaded.rows);
                let carried = loaded.sheet.carried_rows();
                tracing::info!(path = %path.display(), rows, carried, "sheet opened");
                self.sheet = Some(loaded.sheet);
                self.preferences.last_sheet = Some(path.to_path_buf());
                self.persist_preferences();
                self.notify(
                    NoticeLevel::Info,
                    format!("Loaded {rows} materials from {}", path.display()),
                );
                if carried > 0 {
                    self.notify(
                        NoticeLevel::Warning,
                        format!(
                            "{carried} row(s) with a blank or duplicate name are kept in the file but not shown"
                        ),
                    );
                }
                Ok(rows)
            }
            Err(err) => {
                tracing::error!(%err, "failed to open sheet");
                self.table.clear();
                self.sheet = None;
                self.notify(NoticeLevel::Error, format!("Could not open sheet: {err}"));
                Err(err)
            }
        }
    }

    pub fn reload(&mut self) -> Result<usize, PersistError> {
        let path = self
            .sheet
            .as_ref()
            .map(|sheet| sheet.path().to_path_buf())
            .ok_or(PersistError::NoSheet)?;
        self.open(&path)
    }

    pub fn set_available(&mut self, row: usize, value: i64) -> Result<EditOutcome, EditError> {
        let outcome = self.table.set_available(row, value)?;
        self.after_edit(&outcome);
        Ok(outcome)
    }

    pub fn set_available_input(&mut self, row: usize, input: &str) -> Result<EditOutcome, EditError> {
        let outcome = self.table.set_available_input(row, input)?;
        self.after_edit(&outcome);
        Ok(outcome)
    }

    pub fn toggle_quick_complete(
        &mut self,
        row: usize,
        checked: bool,
    ) -> Result<EditOutcome, EditError> {
        let outcome = self.table.toggle_quick_complete(row, checked)?;
        self.after_edit(&outcome);
        Ok(outcome)
    }

    pub fn set_available_by_name(
        &mut self,
        name: &str,
        input: &str,
    ) -> Result<EditOutcome, EditError> {
        let row = self.row_named(name)?;
        self.set_available_input(row, input)
    }

    pub fn toggle_quick_complete_by_name(
        &mut self,
        name: &str,
        checked: bool,
    ) -> Result<EditOutcome, EditError> {
        let row = self.row_named(name)?;
        self.toggle_quick_complete(row, checked)
    }

    pub fn set_multiplier(&mut self, count: u32) -> Result<ProjectionOutcome, ProjectionError> {
        let outcome = self.table.set_multiplier(count)?;
        if let ProjectionOutcome::Rescaled { multiplier, .. } = outcome {
            self.notify(
                NoticeLevel::Info,
                format!("Projecting totals for {multiplier} build(s)"),
            );
        }
        self.commit();
        Ok(outcome)
    }

    pub fn sort(&mut self, column: Column, order: SortOrder) {
        self.table.sort(column, order);
        self.commit();
    }

    /// Header activation: sorts, flipping the order on a repeat, or toggles
    /// the quick-complete lock for that column.
    pub fn activate_column(&mut self, column: Column) -> HeaderActivation {
        let activation = SortSpec::activate(self.table.sort_spec(), column);
        match activation {
            HeaderActivation::Sort(spec) => self.sort(spec.column, spec.order),
            HeaderActivation::ToggleLock => {
                self.toggle_quick_complete_lock();
            }
        }
        activation
    }

    pub fn set_hide_completed(&mut self, hide: bool) {
        if !self.filter.set_hide_completed(hide) {
            return;
        }
        self.preferences.hide_completed = hide;
        self.persist_preferences();
        let message = if hide {
            "Hiding completed materials"
        } else {
            "Showing all materials"
        };
        self.notify(NoticeLevel::Info, message);
    }

    pub fn toggle_hide_completed(&mut self) {
        self.set_hide_completed(!self.filter.hide_completed());
    }

    pub fn set_display_unit(&mut self, unit: Unit) {
        if !self.table.set_display_unit(unit) {
            return;
        }
        self.preferences.unit = Some(unit);
        self.persist_preferences();
        self.notify(NoticeLevel::Info, format!("Quantities shown as {unit}s"));
    }

    pub fn cycle_display_unit(&mut self) {
        let next = self.table.display_unit().cycle();
        self.set_display_unit(next);
    }

    /// Returns the new lock state.
    pub fn toggle_quick_complete_lock(&mut self) -> bool {
        let locked = !self.table.is_quick_complete_locked();
        self.table.set_quick_complete_locked(locked);
        let message = if locked {
            "Quick-complete locked"
        } else {
            "Quick-complete unlocked"
        };
        self.notify(NoticeLevel::Info, message);
        locked
    }

    /// Writes pending changes now, whatever the commit policy.
    pub fn save_now(&mut self) -> Option<AutoSaveEvent> {
        if self.sheet.is_none() {
            self.notify(NoticeLevel::Warning, PersistError::NoSheet.to_string());
            return None;
        }
        if !self.table.is_dirty() {
            self.notify(NoticeLevel::Info, "Nothing to save");
            return None;
        }
        let sheet = self.sheet.as_ref()?;
        let event = self.scheduler.flush_now(&mut self.table, sheet);
        if let Some(event) = &event {
            self.report(event, true);
        }
        event
    }

    /// Flushes without notices about a clean table; used before exit.
    pub fn flush(&mut self) -> Option<AutoSaveEvent> {
        let sheet = self.sheet.as_ref()?;
        let event = self.scheduler.flush_now(&mut self.table, sheet)?;
        self.report(&event, true);
        Some(event)
    }

    /// Drives time-based commits.
    pub fn tick(&mut self) -> Option<AutoSaveEvent> {
        self.commit()
    }

    fn row_named(&self, name: &str) -> Result<usize, EditError> {
        self.table
            .position_of(name.trim())
            .ok_or_else(|| EditError::UnknownName {
                name: name.to_owned(),
            })
    }

    fn after_edit(&mut self, outcome: &EditOutcome) {
        if outcome.changed {
            self.scheduler.note_change();
        }
        self.commit();
    }

    fn commit(&mut self) -> Option<AutoSaveEvent> {
        let sheet = self.sheet.as_ref()?;
        let event = self.scheduler.poll(&mut self.table, sheet)?;
        self.report(&event, false);
        Some(event)
    }

    fn report(&mut self, event: &AutoSaveEvent, explicit: bool) {
        match event {
            AutoSaveEvent::Saved { path, rows, .. } => {
                self.reported_failure = None;
                self.notify(
                    NoticeLevel::Info,
                    format!("Saved {rows} materials to {}", path.display()),
                );
            }
            AutoSaveEvent::Error { message, .. } => {
                // Scheduled retries of the same failure stay quiet.
                if !explicit && self.reported_failure.as_deref() == Some(message.as_str()) {
                    return;
                }
                self.reported_failure = Some(message.clone());
                self.notify(NoticeLevel::Error, format!("Save failed: {message}"));
            }
        }
    }

    fn persist_preferences(&mut self) {
        if let Err(err) = self.store.store(&self.preferences) {
            tracing::warn!(?err, "failed to write preferences");
            self.notify(
                NoticeLevel::Warning,
                format!("Preferences not saved: {err:#}"),
            );
        }
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice::new(level, message);
        tracing::debug!(level = %notice.level, message = %notice.message, "notice");
        for sink in self.sinks.iter_mut() {
            sink(&notice);
        }
    }
}
