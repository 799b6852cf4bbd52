use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use crate::app::App;
use crate::config::{AppConfig, FilePreferences, MemoryPreferences, PreferenceStore};
use crate::journaling::AutoSaveEvent;
use crate::quantity::Unit;
use crate::storage;
use crate::table::{status_label, Column, SortOrder, TableStats};
use crate::workspace::Workspace;

const LISTED_COLUMNS: [Column; 5] = [
    Column::Name,
    Column::Total,
    Column::Missing,
    Column::Available,
    Column::Status,
];

#[derive(Args, Debug, Clone, Default)]
pub struct TuiArgs {
    /// Sheet to open (defaults to the last one used, or the only CSV here)
    #[arg()]
    pub path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    pub path: PathBuf,
    /// Display unit: item, stack or container
    #[arg(long)]
    pub unit: Option<Unit>,
    /// Number of builds to project totals for
    #[arg(long, default_value_t = 1)]
    pub multiplier: u32,
    /// Column to sort by: name, total, missing, available, status
    #[arg(long)]
    pub sort: Option<Column>,
    /// Sort descending instead of ascending
    #[arg(long)]
    pub desc: bool,
    /// Leave out materials that are fully collected
    #[arg(long)]
    pub hide_completed: bool,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SetArgs {
    pub path: PathBuf,
    /// Material name as it appears in the sheet
    pub name: String,
    /// New available amount
    #[arg(allow_hyphen_values = true)]
    pub value: String,
}

#[derive(Args, Debug, Clone)]
pub struct CompleteArgs {
    pub path: PathBuf,
    pub name: String,
    /// Mark the material as not collected at all
    #[arg(long)]
    pub undo: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    pub path: PathBuf,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DiscoverArgs {
    /// Directory to scan (defaults to the current directory)
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// Padded columns for a terminal.
    Aligned,
    /// Tab separated rows for pipes.
    Tabs,
}

#[derive(Serialize)]
struct ListedMaterial<'a> {
    name: &'a str,
    total: u64,
    missing: u64,
    available: u64,
    status: &'static str,
}

#[derive(Serialize)]
struct ListOutput<'a> {
    multiplier: u32,
    unit: Unit,
    materials: Vec<ListedMaterial<'a>>,
    stats: TableStats,
}

pub fn run_tui(config: AppConfig, store: FilePreferences, args: TuiArgs) -> Result<()> {
    let preferences = store.load()?;
    let cwd = std::env::current_dir().context("resolving current directory")?;
    let path = resolve_sheet(args.path, preferences.last_sheet.as_deref(), &cwd)?;

    let mut workspace = Workspace::new(config, Box::new(store));
    workspace
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut app = App::new(workspace);
    app.run()
}

/// Picks the sheet for the TUI: an explicit path, then the last sheet used if
/// it still exists, then the only CSV in `dir`.
fn resolve_sheet(explicit: Option<PathBuf>, last: Option<&Path>, dir: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Some(last) = last.filter(|path| path.is_file()) {
        return Ok(last.to_path_buf());
    }
    let mut candidates = storage::discover_sheets(dir)?;
    match candidates.len() {
        0 => bail!("no sheet given and no CSV files in {}", dir.display()),
        1 => Ok(candidates.remove(0)),
        _ => {
            let mut message = String::from("several sheets found, pass one of:");
            for candidate in &candidates {
                let _ = write!(&mut message, "\n  {}", candidate.display());
            }
            bail!(message)
        }
    }
}

/// Workspace for a single command. Preferences stay in memory so that flags
/// do not change the next interactive session.
fn open_workspace(config: AppConfig, path: &Path) -> Result<Workspace> {
    let mut workspace = Workspace::new(config, Box::new(MemoryPreferences::default()));
    workspace
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(workspace)
}

fn persist(workspace: &mut Workspace) -> Result<()> {
    match workspace.flush() {
        Some(AutoSaveEvent::Error { path, message }) => {
            bail!("saving {}: {message}", path.display())
        }
        _ => Ok(()),
    }
}

pub fn list_sheet(config: AppConfig, args: ListArgs) -> Result<()> {
    let mut workspace = open_workspace(config, &args.path)?;
    prepare_listing(&mut workspace, &args)?;
    let output = if args.json {
        render_json(&workspace)?
    } else {
        let layout = if atty::is(atty::Stream::Stdout) {
            Layout::Aligned
        } else {
            Layout::Tabs
        };
        render_table(&workspace, layout)
    };
    print!("{output}");
    Ok(())
}

fn prepare_listing(workspace: &mut Workspace, args: &ListArgs) -> Result<()> {
    if let Some(unit) = args.unit {
        workspace.set_display_unit(unit);
    }
    workspace
        .set_multiplier(args.multiplier)
        .context("applying multiplier")?;
    if let Some(column) = args.sort {
        let order = if args.desc {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        workspace.sort(column, order);
    }
    workspace.set_hide_completed(args.hide_completed);
    Ok(())
}

fn render_json(workspace: &Workspace) -> Result<String> {
    let table = workspace.table();
    let filter = workspace.filter();
    let materials = filter
        .visible_rows(table)
        .filter_map(|row| table.record(row))
        .map(|record| ListedMaterial {
            name: record.name(),
            total: record.total(),
            missing: record.missing(),
            available: record.available(),
            status: status_label(record),
        })
        .collect();
    let output = ListOutput {
        multiplier: table.multiplier(),
        unit: table.display_unit(),
        materials,
        stats: workspace.stats(),
    };
    let mut json = serde_json::to_string_pretty(&output).context("serializing listing")?;
    json.push('\n');
    Ok(json)
}

fn render_table(workspace: &Workspace, layout: Layout) -> String {
    let table = workspace.table();
    let rows: Vec<Vec<String>> = workspace
        .filter()
        .visible_rows(table)
        .map(|row| {
            LISTED_COLUMNS
                .iter()
                .map(|column| table.display_value(row, *column).unwrap_or_default())
                .collect()
        })
        .collect();
    let headers: Vec<String> = LISTED_COLUMNS
        .iter()
        .map(|column| column.header().to_string())
        .collect();

    let mut out = String::new();
    match layout {
        Layout::Tabs => {
            for line in std::iter::once(&headers).chain(rows.iter()) {
                let _ = writeln!(&mut out, "{}", line.join("\t"));
            }
        }
        Layout::Aligned => {
            let mut widths: Vec<usize> = headers.iter().map(|h| h.width()).collect();
            for row in &rows {
                for (width, cell) in widths.iter_mut().zip(row) {
                    *width = (*width).max(cell.width());
                }
            }
            for line in std::iter::once(&headers).chain(rows.iter()) {
                let mut rendered = String::new();
                for (index, (cell, width)) in line.iter().zip(&widths).enumerate() {
                    if index > 0 {
                        rendered.push_str("  ");
                    }
                    rendered.push_str(cell);
                    rendered.push_str(&" ".repeat(width.saturating_sub(cell.width())));
                }
                let _ = writeln!(&mut out, "{}", rendered.trim_end());
            }
            let _ = writeln!(&mut out, "{}", summary_line(&workspace.stats()));
        }
    }
    out
}

fn summary_line(stats: &TableStats) -> String {
    let mut line = format!(
        "{} of {} complete ({:.0}%)",
        stats.completed, stats.total, stats.completion_percent
    );
    if stats.hidden > 0 {
        let _ = write!(&mut line, ", {} hidden", stats.hidden);
    }
    line
}

pub fn set_available(config: AppConfig, args: SetArgs) -> Result<()> {
    let mut workspace = open_workspace(config, &args.path)?;
    let outcome = workspace
        .set_available_by_name(&args.name, &args.value)
        .with_context(|| format!("updating `{}`", args.name))?;
    persist(&mut workspace)?;
    if outcome.changed {
        println!(
            "{}: available {}, missing {}",
            outcome.name, outcome.available, outcome.missing
        );
    } else {
        println!("{}: unchanged", outcome.name);
    }
    Ok(())
}

pub fn complete(config: AppConfig, args: CompleteArgs) -> Result<()> {
    let mut workspace = open_workspace(config, &args.path)?;
    let outcome = workspace
        .toggle_quick_complete_by_name(&args.name, !args.undo)
        .with_context(|| format!("updating `{}`", args.name))?;
    persist(&mut workspace)?;
    let state = if args.undo { "not collected" } else { "complete" };
    println!("{}: {state} (missing {})", outcome.name, outcome.missing);
    Ok(())
}

pub fn stats(config: AppConfig, args: StatsArgs) -> Result<()> {
    let workspace = open_workspace(config, &args.path)?;
    let stats = workspace.stats();
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("serializing stats")?
        );
    } else {
        println!("Materials:  {}", stats.total);
        println!(
            "Completed:  {} ({:.1}%)",
            stats.completed, stats.completion_percent
        );
        println!("Remaining:  {}", stats.total - stats.completed);
    }
    Ok(())
}

pub fn discover(args: DiscoverArgs) -> Result<()> {
    let dir = match args.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let sheets = storage::discover_sheets(&dir)?;
    if sheets.is_empty() {
        println!("No sheets found in {}", dir.display());
    }
    for sheet in sheets {
        println!("{}", sheet.display());
    }
    Ok(())
}
