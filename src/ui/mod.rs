use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};
use ratatui::Frame;
use strum::IntoEnumIterator;
use time::{macros::format_description, OffsetDateTime};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::state::{AppState, EditOverlay};
use crate::journaling::AutoSaveStatus;
use crate::table::{Column, MaterialTable, RowTone, SortOrder, StyleHint};
use crate::workspace::{NoticeLevel, Workspace};

const NAME_WIDTH: u16 = 28;

pub fn draw_app(
    frame: &mut Frame,
    workspace: &Workspace,
    state: &AppState,
    table_state: &mut TableState,
) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(5)])
        .split(frame.size());

    let table = workspace.table();
    let rows: Vec<Row> = workspace
        .filter()
        .visible_rows(table)
        .map(|row| build_row(table, row))
        .collect();

    let header = Row::new(Column::iter().map(|column| header_cell(table, column)))
        .style(Style::default().add_modifier(Modifier::BOLD))
        .bottom_margin(1);

    let widths = [
        Constraint::Length(NAME_WIDTH),
        Constraint::Min(10),
        Constraint::Min(10),
        Constraint::Min(10),
        Constraint::Length(12),
        Constraint::Length(8),
    ];

    let title = workspace
        .sheet()
        .and_then(|sheet| sheet.path().file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "No sheet".to_string());
    let dirty = if workspace.is_dirty() { " *" } else { "" };

    let widget = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {title}{dirty} ")),
        )
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");
    frame.render_stateful_widget(widget, vertical[0], table_state);

    let status = Paragraph::new(build_status_line(workspace, state))
        .block(Block::default().borders(Borders::TOP))
        .wrap(Wrap { trim: true });
    frame.render_widget(status, vertical[1]);

    if let Some(overlay) = &state.overlay {
        render_overlay(frame, table, overlay);
    }
}

fn header_cell(table: &MaterialTable, column: Column) -> Cell<'static> {
    let mut label = format!("{} {}", column.index() + 1, column.header());
    if column == Column::QuickComplete && table.is_quick_complete_locked() {
        label.push_str(" [L]");
    }
    if let Some(spec) = table.sort_spec().filter(|spec| spec.column == column) {
        label.push_str(match spec.order {
            SortOrder::Ascending => " ▲",
            SortOrder::Descending => " ▼",
        });
    }
    Cell::from(label)
}

fn build_row(table: &MaterialTable, row: usize) -> Row<'static> {
    let cells = Column::iter().map(|column| {
        let text = match column {
            Column::QuickComplete => {
                let mark = match table.check_state(row) {
                    Some(true) => "[x]",
                    _ => "[ ]",
                };
                mark.to_string()
            }
            Column::Name => truncate_to_width(
                &table.display_value(row, column).unwrap_or_default(),
                usize::from(NAME_WIDTH),
            ),
            other => table.display_value(row, other).unwrap_or_default(),
        };
        let style = table
            .style_hint(row, column)
            .map(|hint| cell_style(hint, column, table.is_checkable(column)))
            .unwrap_or_default();
        Cell::from(text).style(style)
    });
    Row::new(cells.collect::<Vec<_>>())
}

fn cell_style(hint: StyleHint, column: Column, checkable: bool) -> Style {
    let mut style = match hint.row {
        RowTone::Completed => Style::default().fg(Color::Green),
        RowTone::Pending => Style::default(),
    };
    if let Some(tone) = hint.emphasis {
        style = match tone {
            RowTone::Completed => style.fg(Color::Green),
            RowTone::Pending => style.fg(Color::Red),
        }
        .add_modifier(Modifier::BOLD);
    }
    if column == Column::QuickComplete && !checkable {
        style = style.fg(Color::DarkGray);
    }
    style
}

fn build_status_line(workspace: &Workspace, state: &AppState) -> Text<'static> {
    let table = workspace.table();
    let stats = workspace.stats();

    let mut spans = vec![
        Span::raw(format!(
            "Done: {}/{} ({:.0}%)",
            stats.completed, stats.total, stats.completion_percent
        )),
        Span::raw(" | Unit: "),
        Span::styled(
            table.display_unit().to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | Builds: "),
        Span::styled(
            format!("x{}", table.multiplier()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ];

    if workspace.filter().hide_completed() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            format!("{} hidden", stats.hidden),
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        ));
    }

    match workspace.autosave_status() {
        AutoSaveStatus::Disabled => {
            spans.push(Span::raw(" | Save: manual"));
        }
        AutoSaveStatus::Idle { last_saved_at } => {
            spans.push(Span::raw(" | Save: saved"));
            if let Some(ts) = last_saved_at {
                spans.push(Span::raw(" "));
                spans.push(Span::styled(
                    format_time_short(ts),
                    Style::default().fg(Color::Gray),
                ));
            }
        }
        AutoSaveStatus::Pending { since } => {
            spans.push(Span::raw(" | Save: "));
            spans.push(Span::styled(
                "pending",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::raw(" since "));
            spans.push(Span::styled(
                format_time_short(since),
                Style::default().fg(Color::Gray),
            ));
        }
        AutoSaveStatus::Error { message, .. } => {
            spans.push(Span::raw(" | Save: "));
            spans.push(Span::styled(
                format!("error ({message})"),
                Style::default().fg(Color::Red),
            ));
        }
    }

    let mut lines = Vec::with_capacity(3);
    lines.push(Line::from(spans));

    if let Some(notice) = &state.status_message {
        let color = match notice.level {
            NoticeLevel::Info => Color::Cyan,
            NoticeLevel::Warning => Color::Yellow,
            NoticeLevel::Error => Color::Red,
        };
        lines.push(Line::from(Span::styled(
            notice.message.clone(),
            Style::default().fg(color),
        )));
    } else {
        lines.push(Line::default());
    }

    lines.push(Line::from(vec![
        Span::styled(
            "Keys: ",
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            "j/k move • e edit • space done • L lock • h hide • u unit • +/- builds • 1-6 sort • Ctrl-s save • Ctrl-r reload • q quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]));

    Text::from(lines)
}

fn render_overlay(frame: &mut Frame, table: &MaterialTable, overlay: &EditOverlay) {
    let area = centered_rect(50, 30, frame.size());
    frame.render_widget(Clear, area);

    let mut lines = Vec::new();
    if let Some(record) = table
        .position_of(&overlay.name)
        .and_then(|row| table.record(row))
    {
        lines.push(Line::from(Span::styled(
            format!("Total {}  •  missing {}", record.total(), record.missing()),
            Style::default().fg(Color::Gray),
        )));
    }
    lines.push(Line::from(vec![
        Span::raw("Available: "),
        Span::styled(
            overlay.input.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled("▌", Style::default().fg(Color::Cyan)),
    ]));
    if let Some(error) = &overlay.error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    }
    lines.push(Line::from(Span::styled(
        "Enter to apply • Esc to cancel",
        Style::default().fg(Color::DarkGray),
    )));

    let popup = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", overlay.name)),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(popup, area);
}

fn format_time_short(dt: OffsetDateTime) -> String {
    dt.format(&format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

/// Cuts `text` to at most `max` display columns, ending with `…` when cut.
fn truncate_to_width(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let budget = max.saturating_sub(1);
    let mut used = 0;
    let mut out = String::new();
    for ch in text.chars() {
        let width = ch.width().unwrap_or(0);
        if used + width > budget {
            break;
        }
        used += width;
        out.push(ch);
    }
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, MemoryPreferences};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn truncation_respects_display_width() {
        assert_eq!(truncate_to_width("Stone", 10), "Stone");
        assert_eq!(truncate_to_width("Polished Andesite", 9), "Polished…");
        assert_eq!(truncate_to_width("石石石石", 5), "石石…");
        assert!(truncate_to_width("石石石石", 5).width() <= 5);
    }

    #[test]
    fn centered_rect_stays_inside_area() {
        let area = Rect::new(0, 0, 100, 40);
        let inner = centered_rect(50, 30, area);
        assert_eq!(inner.width, 50);
        assert_eq!(inner.height, 12);
        assert!(inner.x >= area.x && inner.right() <= area.right());
    }

    #[test]
    fn draws_visible_rows_and_status() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("list.csv");
        fs::write(
            &path,
            "Item,Total,Missing,Available\nStone,128,64,64\nDirt,5,0,5\n",
        )?;
        let mut workspace = Workspace::new(
            AppConfig::default(),
            Box::new(MemoryPreferences::default()),
        );
        workspace.open(&path)?;
        workspace.set_hide_completed(true);
        let state = AppState::new(&workspace);
        let mut table_state = TableState::default();
        table_state.select(state.selected_visible_index(&workspace));

        let mut terminal = Terminal::new(TestBackend::new(120, 12))?;
        terminal.draw(|frame| draw_app(frame, &workspace, &state, &mut table_state))?;

        let buffer = terminal.backend().buffer();
        let screen: String = buffer.content().iter().map(|cell| cell.symbol()).collect();
        assert!(screen.contains("Stone"));
        assert!(!screen.contains("Dirt"));
        assert!(screen.contains("1 hidden"));
        assert!(screen.contains("Done: 1/2"));
        Ok(())
    }
}
