use crate::table::MaterialRecord;
use crate::workspace::{Notice, NoticeLevel, Workspace};

const MAX_INPUT_LEN: usize = 20;

/// UI-only state. Everything about the materials themselves lives in the
/// [`Workspace`].
#[derive(Debug, Default)]
pub struct AppState {
    selected_name: Option<String>,
    /// Visible position of the selection, used to land on a neighbour when
    /// the selected material disappears from view.
    selected_hint: usize,
    pub status_message: Option<Notice>,
    pub overlay: Option<EditOverlay>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOverlay {
    pub name: String,
    pub input: String,
    pub error: Option<String>,
}

impl EditOverlay {
    fn new(record: &MaterialRecord) -> Self {
        Self {
            name: record.name().to_owned(),
            input: record.available().to_string(),
            error: None,
        }
    }

    pub fn push_char(&mut self, ch: char) {
        if self.input.chars().count() < MAX_INPUT_LEN && !ch.is_control() {
            self.input.push(ch);
            self.error = None;
        }
    }

    pub fn pop_char(&mut self) {
        self.input.pop();
        self.error = None;
    }
}

impl AppState {
    pub fn new(workspace: &Workspace) -> Self {
        let mut state = Self::default();
        state.sync_selection(workspace);
        state
    }

    pub fn selected_name(&self) -> Option<&str> {
        self.selected_name.as_deref()
    }

    /// Table row of the selection, if it is currently visible.
    pub fn selected_row(&self, workspace: &Workspace) -> Option<usize> {
        let name = self.selected_name.as_deref()?;
        let row = workspace.table().position_of(name)?;
        workspace
            .filter()
            .is_visible(workspace.table(), row)
            .then_some(row)
    }

    /// Index of the selection among visible rows, for the table widget.
    pub fn selected_visible_index(&self, workspace: &Workspace) -> Option<usize> {
        let row = self.selected_row(workspace)?;
        workspace
            .filter()
            .visible_rows(workspace.table())
            .position(|visible| visible == row)
    }

    pub fn move_selection(&mut self, workspace: &Workspace, delta: isize) {
        let visible: Vec<usize> = workspace.filter().visible_rows(workspace.table()).collect();
        if visible.is_empty() {
            self.selected_name = None;
            self.selected_hint = 0;
            return;
        }
        let current = self
            .selected_visible_index(workspace)
            .unwrap_or(self.selected_hint.min(visible.len() - 1));
        let target = current
            .saturating_add_signed(delta)
            .min(visible.len() - 1);
        self.select_visible(workspace, &visible, target);
    }

    /// Keeps the selection on the same material after reorders, and moves it
    /// to the nearest visible neighbour when that material is filtered out.
    pub fn sync_selection(&mut self, workspace: &Workspace) {
        if let Some(index) = self.selected_visible_index(workspace) {
            self.selected_hint = index;
            return;
        }
        let visible: Vec<usize> = workspace.filter().visible_rows(workspace.table()).collect();
        if visible.is_empty() {
            self.selected_name = None;
            self.selected_hint = 0;
            return;
        }
        let target = self.selected_hint.min(visible.len() - 1);
        self.select_visible(workspace, &visible, target);
    }

    fn select_visible(&mut self, workspace: &Workspace, visible: &[usize], index: usize) {
        self.selected_name = visible
            .get(index)
            .and_then(|row| workspace.table().record(*row))
            .map(|record| record.name().to_owned());
        self.selected_hint = index;
    }

    pub fn open_editor(&mut self, workspace: &Workspace) -> bool {
        let Some(record) = self
            .selected_row(workspace)
            .and_then(|row| workspace.table().record(row))
        else {
            return false;
        };
        self.overlay = Some(EditOverlay::new(record));
        true
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn overlay_mut(&mut self) -> Option<&mut EditOverlay> {
        self.overlay.as_mut()
    }

    pub fn set_status_message(&mut self, notice: Notice) {
        self.status_message = Some(notice);
    }

    pub fn set_status_text<S: Into<String>>(&mut self, level: NoticeLevel, message: S) {
        self.status_message = Some(Notice {
            level,
            message: message.into(),
        });
    }
}
