use std::io::Stdout;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::TableState;
use ratatui::Terminal;

use crate::journaling::AutoSaveEvent;
use crate::table::{Column, TableChange};
use crate::ui;
use crate::workspace::{Notice, NoticeLevel, Workspace};

pub mod state;

pub use state::{AppState, EditOverlay};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    EditAvailable,
    QuickComplete,
    ToggleLock,
    ToggleHideCompleted,
    CycleUnit,
    IncreaseMultiplier,
    DecreaseMultiplier,
    ActivateColumn(Column),
    Save,
    Reload,
}

pub struct App {
    workspace: Workspace,
    state: AppState,
    table_state: TableState,
    notices: Receiver<Notice>,
    changes: Receiver<TableChange>,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(mut workspace: Workspace) -> Self {
        let (tx, notices) = unbounded();
        workspace.on_notice(move |notice| {
            let _ = tx.send(notice.clone());
        });
        let changes = workspace.subscribe();
        let mut state = AppState::new(&workspace);
        if let Some(sheet) = workspace.sheet() {
            state.set_status_text(
                NoticeLevel::Info,
                format!(
                    "Loaded {} materials from {}",
                    workspace.table().len(),
                    sheet.path().display()
                ),
            );
        }
        Self {
            workspace,
            state,
            table_state: TableState::default(),
            notices,
            changes,
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        if let Some(AutoSaveEvent::Error { message, .. }) = self.workspace.flush() {
            anyhow::bail!("unsaved changes could not be written: {message}");
        }
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            self.drain_updates();
            terminal
                .draw(|frame| {
                    self.table_state
                        .select(self.state.selected_visible_index(&self.workspace));
                    ui::draw_app(frame, &self.workspace, &self.state, &mut self.table_state);
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    /// Pulls notices and table changes produced since the last frame.
    fn drain_updates(&mut self) {
        for notice in self.notices.try_iter() {
            self.state.set_status_message(notice);
        }
        let reshaped = self.changes.try_iter().fold(false, |reshaped, change| {
            reshaped
                || matches!(
                    change,
                    TableChange::Reset { .. } | TableChange::Reordered | TableChange::RowsChanged { .. }
                )
        });
        if reshaped {
            self.state.sync_selection(&self.workspace);
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if self.handle_overlay_key(key) {
            return;
        }

        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        let action = match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Save)
            }
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Reload)
            }
            _ if !plain => None,
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Char('e') | KeyCode::Enter => Some(Action::EditAvailable),
            KeyCode::Char(' ') => Some(Action::QuickComplete),
            KeyCode::Char('L') => Some(Action::ToggleLock),
            KeyCode::Char('h') => Some(Action::ToggleHideCompleted),
            KeyCode::Char('u') => Some(Action::CycleUnit),
            KeyCode::Char('+') | KeyCode::Char('=') => Some(Action::IncreaseMultiplier),
            KeyCode::Char('-') => Some(Action::DecreaseMultiplier),
            KeyCode::Char(digit @ '1'..='6') => digit
                .to_digit(10)
                .and_then(|n| Column::from_index(n as usize - 1))
                .map(Action::ActivateColumn),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => {
                self.workspace.flush();
                self.should_quit = true;
            }
            Action::SelectNext => self.state.move_selection(&self.workspace, 1),
            Action::SelectPrevious => self.state.move_selection(&self.workspace, -1),
            Action::EditAvailable => {
                if !self.state.open_editor(&self.workspace) {
                    self.state
                        .set_status_text(NoticeLevel::Info, "Nothing selected to edit");
                }
            }
            Action::QuickComplete => self.handle_quick_complete(),
            Action::ToggleLock => {
                self.workspace.toggle_quick_complete_lock();
            }
            Action::ToggleHideCompleted => {
                self.workspace.toggle_hide_completed();
                self.state.sync_selection(&self.workspace);
            }
            Action::CycleUnit => self.workspace.cycle_display_unit(),
            Action::IncreaseMultiplier => self.shift_multiplier(1),
            Action::DecreaseMultiplier => self.shift_multiplier(-1),
            Action::ActivateColumn(column) => {
                self.workspace.activate_column(column);
            }
            Action::Save => {
                self.workspace.save_now();
            }
            Action::Reload => {
                if let Err(err) = self.workspace.reload() {
                    tracing::error!(%err, "reload failed");
                }
            }
        }
    }

    fn handle_quick_complete(&mut self) {
        let Some(row) = self.state.selected_row(&self.workspace) else {
            return;
        };
        let completed = self.workspace.table().check_state(row).unwrap_or(false);
        if let Err(err) = self.workspace.toggle_quick_complete(row, !completed) {
            self.state
                .set_status_text(NoticeLevel::Warning, err.to_string());
        }
    }

    fn shift_multiplier(&mut self, delta: i64) {
        let current = i64::from(self.workspace.table().multiplier());
        let Ok(next) = u32::try_from(current + delta) else {
            return;
        };
        if let Err(err) = self.workspace.set_multiplier(next) {
            self.state
                .set_status_text(NoticeLevel::Warning, err.to_string());
        }
    }

    fn on_tick(&mut self) {
        self.workspace.tick();
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        let Some(overlay) = self.state.overlay_mut() else {
            return false;
        };
        match key.code {
            KeyCode::Esc => {
                self.state.close_overlay();
                self.state.set_status_text(NoticeLevel::Info, "Edit canceled");
            }
            KeyCode::Enter => self.submit_edit(),
            KeyCode::Backspace => overlay.pop_char(),
            KeyCode::Char(ch)
                if !key.modifiers.intersects(
                    KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                ) =>
            {
                overlay.push_char(ch);
            }
            _ => {}
        }
        true
    }

    fn submit_edit(&mut self) {
        let Some(overlay) = self.state.overlay.clone() else {
            return;
        };
        let Some(row) = self.workspace.table().position_of(&overlay.name) else {
            self.state.close_overlay();
            return;
        };
        match self.workspace.set_available_input(row, &overlay.input) {
            Ok(outcome) => {
                self.state.close_overlay();
                if !outcome.changed {
                    self.state
                        .set_status_text(NoticeLevel::Info, format!("{} unchanged", outcome.name));
                }
            }
            Err(err) => {
                if let Some(overlay) = self.state.overlay_mut() {
                    overlay.error = Some(err.to_string());
                }
            }
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("restoring screen state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, CommitPolicy, MemoryPreferences};
    use crate::table::MaterialRecord;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn app(dir: &TempDir) -> anyhow::Result<(App, PathBuf)> {
        let path = dir.path().join("list.csv");
        fs::write(
            &path,
            "Item,Total,Missing,Available\nStone,128,128,0\nDirt,64,0,64\n",
        )?;
        let mut config = AppConfig::default();
        config.auto_save.policy = CommitPolicy::Debounced;
        config.auto_save.debounce = Duration::from_secs(3600);
        let mut workspace = Workspace::new(config, Box::new(MemoryPreferences::default()));
        workspace.open(&path)?;
        Ok((App::new(workspace), path))
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
        app.drain_updates();
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    fn available(app: &App, name: &str) -> Option<u64> {
        let table = app.workspace.table();
        table
            .position_of(name)
            .and_then(|row| table.record(row))
            .map(MaterialRecord::available)
    }

    #[test]
    fn edit_overlay_updates_selected_material() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let (mut app, _) = app(&dir)?;
        press(&mut app, KeyCode::Char('e'));
        assert!(app.state.overlay.is_some());
        press(&mut app, KeyCode::Backspace);
        type_text(&mut app, "40");
        press(&mut app, KeyCode::Enter);
        assert!(app.state.overlay.is_none());
        assert_eq!(available(&app, "Stone"), Some(40));
        Ok(())
    }

    #[test]
    fn bad_input_keeps_overlay_open() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let (mut app, _) = app(&dir)?;
        press(&mut app, KeyCode::Enter);
        type_text(&mut app, "x");
        press(&mut app, KeyCode::Enter);
        let overlay = app.state.overlay.as_ref().expect("still open");
        assert!(overlay.error.as_deref().is_some_and(|e| e.contains("not a whole number")));
        assert_eq!(available(&app, "Stone"), Some(0));
        Ok(())
    }

    #[test]
    fn space_toggles_and_lock_blocks() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let (mut app, _) = app(&dir)?;
        press(&mut app, KeyCode::Char(' '));
        assert_eq!(available(&app, "Stone"), Some(128));
        press(&mut app, KeyCode::Char(' '));
        assert_eq!(available(&app, "Stone"), Some(0));

        press(&mut app, KeyCode::Char('L'));
        press(&mut app, KeyCode::Char(' '));
        assert_eq!(available(&app, "Stone"), Some(0));
        let message = app.state.status_message.as_ref().expect("status");
        assert_eq!(message.level, NoticeLevel::Warning);
        Ok(())
    }

    #[test]
    fn multiplier_keys_stay_in_range() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let (mut app, _) = app(&dir)?;
        press(&mut app, KeyCode::Char('-'));
        assert_eq!(app.workspace.table().multiplier(), 1);
        press(&mut app, KeyCode::Char('+'));
        press(&mut app, KeyCode::Char('+'));
        assert_eq!(app.workspace.table().multiplier(), 3);
        Ok(())
    }

    #[test]
    fn column_keys_sort_and_keep_selection() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let (mut app, _) = app(&dir)?;
        assert_eq!(app.state.selected_name(), Some("Stone"));
        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char('2'));
        let first = app.workspace.table().record(0).map(MaterialRecord::name);
        assert_eq!(first, Some("Dirt"));
        assert_eq!(app.state.selected_name(), Some("Stone"));
        assert_eq!(app.state.selected_visible_index(&app.workspace), Some(1));
        Ok(())
    }

    #[test]
    fn quit_flushes_pending_changes() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let (mut app, path) = app(&dir)?;
        press(&mut app, KeyCode::Char(' '));
        assert!(app.workspace.is_dirty());
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
        assert!(!app.workspace.is_dirty());
        assert!(fs::read_to_string(path)?.contains("Stone,128,0,128"));
        Ok(())
    }
}
