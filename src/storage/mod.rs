use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{ByteRecord, ReaderBuilder, WriterBuilder};
use indexmap::IndexSet;

use crate::config::StorageOptions;
use crate::error::PersistError;
use crate::table::{MaterialRow, MaterialTable};

pub const REQUIRED_COLUMNS: usize = 4;
pub const CANONICAL_HEADERS: [&str; REQUIRED_COLUMNS] = ["Item", "Total", "Missing", "Available"];
const SHEET_EXTENSION: &str = "csv";
const TMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Tab,
    Comma,
}

impl Delimiter {
    pub fn byte(self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
        }
    }
}

/// An open sheet: where it lives and how it was laid out on disk.
#[derive(Debug, Clone)]
pub struct SheetHandle {
    path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
    delimiter: Delimiter,
    headers: Arc<[String; REQUIRED_COLUMNS]>,
    /// Rows with a blank or repeated name. The table never sees them; saves
    /// write them back as read so they are not lost from the file.
    carried: Arc<[RawRow]>,
}

type RawRow = [String; REQUIRED_COLUMNS];

#[derive(Debug)]
pub struct LoadedSheet {
    pub sheet: SheetHandle,
    pub rows: Vec<MaterialRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
    pub rows: usize,
    pub revision: u64,
}

impl SheetHandle {
    /// Handle for a sheet that has not been read from disk yet; saves use the
    /// canonical header and comma separators.
    pub fn new(path: impl Into<PathBuf>, options: &StorageOptions) -> Self {
        Self {
            path: Arc::new(path.into()),
            options: Arc::new(options.clone()),
            delimiter: Delimiter::Comma,
            headers: Arc::new(CANONICAL_HEADERS.map(String::from)),
            carried: Arc::from(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    pub fn headers(&self) -> &[String] {
        self.headers.as_slice()
    }

    /// Number of rows kept aside at load because of a blank or duplicate name.
    pub fn carried_rows(&self) -> usize {
        self.carried.len()
    }

    pub fn backup_path(&self) -> PathBuf {
        with_suffix(&self.path, &self.options.backup_suffix)
    }

    /// Writes the table, keeping the previous file as a single backup.
    ///
    /// The new contents land in a temporary sibling first, so a failure
    /// before the final rename leaves the original file alone.
    pub fn save(&self, table: &MaterialTable) -> Result<SaveReport, PersistError> {
        let path = self.path.as_path();
        let bytes = self.render(table)?;

        let tmp_path = with_suffix(path, TMP_SUFFIX);
        fs::write(&tmp_path, &bytes).map_err(|err| PersistError::io(&tmp_path, err))?;

        let backup = match self.rotate_backup() {
            Ok(backup) => backup,
            Err(err) => {
                discard_tmp(&tmp_path);
                return Err(err);
            }
        };
        if let Err(err) = fs::rename(&tmp_path, path) {
            discard_tmp(&tmp_path);
            return Err(PersistError::io(path, err));
        }

        tracing::info!(
            path = %path.display(),
            rows = table.len(),
            revision = table.revision(),
            "sheet saved"
        );
        Ok(SaveReport {
            path: path.to_path_buf(),
            backup,
            rows: table.len(),
            revision: table.revision(),
        })
    }

    fn render(&self, table: &MaterialTable) -> Result<Vec<u8>, PersistError> {
        let path = self.path.as_path();
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter.byte())
            .from_writer(Vec::new());
        writer
            .write_record(self.headers.iter())
            .map_err(|err| PersistError::parse(path, err))?;
        // Totals are written unscaled: the build multiplier is a view over the
        // sheet and never changes what is stored.
        for record in table.records() {
            let total = record.base_total().to_string();
            let missing = record.base_missing().to_string();
            let available = record.available().to_string();
            writer
                .write_record([record.name(), total.as_str(), missing.as_str(), available.as_str()])
                .map_err(|err| PersistError::parse(path, err))?;
        }
        for raw in self.carried.iter() {
            writer
                .write_record(raw.iter())
                .map_err(|err| PersistError::parse(path, err))?;
        }
        writer
            .into_inner()
            .map_err(|err| PersistError::io(path, err.into_error()))
    }

    fn rotate_backup(&self) -> Result<Option<PathBuf>, PersistError> {
        let path = self.path.as_path();
        if !path.exists() {
            return Ok(None);
        }
        let backup = self.backup_path();
        match fs::remove_file(&backup) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(PersistError::io(&backup, err)),
        }
        fs::rename(path, &backup).map_err(|err| PersistError::io(path, err))?;
        tracing::debug!(backup = %backup.display(), "rotated sheet backup");
        Ok(Some(backup))
    }
}

/// Reads a sheet. Tab separators are tried first; a file that collapses into
/// a single tab column is read again with commas.
///
/// Cells must be UTF-8. A sheet in another encoding is refused rather than
/// decoded lossily, since the next save would overwrite it.
pub fn load(path: &Path, options: &StorageOptions) -> Result<LoadedSheet, PersistError> {
    let raw = fs::read(path).map_err(|err| PersistError::io(path, err))?;

    let mut delimiter = Delimiter::Tab;
    let mut parsed = parse(&raw, delimiter).map_err(|err| PersistError::parse(path, err))?;
    if parsed.0.len() == 1 {
        delimiter = Delimiter::Comma;
        parsed = parse(&raw, delimiter).map_err(|err| PersistError::parse(path, err))?;
    }
    let (header, records) = parsed;
    if header.len() < REQUIRED_COLUMNS {
        return Err(PersistError::Format {
            path: path.to_path_buf(),
            columns: header.len(),
        });
    }

    let mut headers = decode_fields(path, &header)?;
    headers[0] = headers[0].trim_start_matches('\u{feff}').to_owned();

    let mut seen = IndexSet::new();
    let mut rows = Vec::with_capacity(records.len());
    let mut carried = Vec::new();
    for record in &records {
        let fields = decode_fields(path, record)?;
        let name = fields[0].trim();
        if name.is_empty() || !seen.insert(name.to_owned()) {
            tracing::warn!(
                name,
                line = record.position().map(|pos| pos.line()),
                "keeping material row out of the table"
            );
            carried.push(fields);
            continue;
        }
        rows.push(MaterialRow::new(
            name,
            coerce_count(&fields[1]),
            coerce_count(&fields[3]),
        ));
    }

    tracing::info!(
        path = %path.display(),
        ?delimiter,
        rows = rows.len(),
        carried = carried.len(),
        "sheet loaded"
    );
    Ok(LoadedSheet {
        sheet: SheetHandle {
            path: Arc::new(path.to_path_buf()),
            options: Arc::new(options.clone()),
            delimiter,
            headers: Arc::new(headers),
            carried: Arc::from(carried),
        },
        rows,
    })
}

/// Lists `*.csv` files directly inside `dir`, sorted by path.
pub fn discover_sheets(dir: &Path) -> Result<Vec<PathBuf>, PersistError> {
    let entries = fs::read_dir(dir).map_err(|err| PersistError::io(dir, err))?;
    let mut sheets = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(?err, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_sheet = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SHEET_EXTENSION));
        if is_sheet {
            sheets.push(path);
        }
    }
    sheets.sort();
    Ok(sheets)
}

/// Clamps a cell to a non-negative count. Decimals truncate; anything
/// unreadable becomes 0.
pub fn coerce_count(raw: &str) -> u64 {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<u64>() {
        return value;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => value.trunc() as u64,
        _ => 0,
    }
}

fn parse(raw: &[u8], delimiter: Delimiter) -> Result<(ByteRecord, Vec<ByteRecord>), csv::Error> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter.byte())
        .has_headers(true)
        .flexible(true)
        .from_reader(raw);
    let header = reader.byte_headers()?.clone();
    let records = reader.byte_records().collect::<Result<Vec<_>, _>>()?;
    Ok((header, records))
}

/// First four cells of a record; short records are padded with empty cells.
fn decode_fields(path: &Path, record: &ByteRecord) -> Result<RawRow, PersistError> {
    let mut fields = RawRow::default();
    for (idx, slot) in fields.iter_mut().enumerate() {
        let Some(raw) = record.get(idx) else {
            break;
        };
        *slot = std::str::from_utf8(raw)
            .map_err(|_| PersistError::Encoding {
                path: path.to_path_buf(),
                line: record.position().map_or(0, |pos| pos.line()),
            })?
            .to_owned();
    }
    Ok(fields)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn discard_tmp(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::warn!(?err, path = %path.display(), "failed to remove temporary sheet");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn options() -> StorageOptions {
        StorageOptions::default()
    }

    fn write_sheet(dir: &TempDir, name: &str, body: &str) -> anyhow::Result<PathBuf> {
        let path = dir.path().join(name);
        fs::write(&path, body)?;
        Ok(path)
    }

    fn loaded_table(sheet: &LoadedSheet) -> MaterialTable {
        let mut table = MaterialTable::default();
        table.load(sheet.rows.clone());
        table
    }

    #[test]
    fn reads_tab_separated_sheets() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = write_sheet(
            &dir,
            "tab.csv",
            "Item\tTotal\tMissing\tAvailable\nStone\t128\t128\t0\nOak Log\t12\t2\t10\n",
        )?;
        let loaded = load(&path, &options())?;
        assert_eq!(loaded.sheet.delimiter(), Delimiter::Tab);
        assert_eq!(
            loaded.rows,
            vec![
                MaterialRow::new("Stone", 128, 0),
                MaterialRow::new("Oak Log", 12, 10),
            ]
        );
        Ok(())
    }

    #[test]
    fn falls_back_to_commas_and_ignores_header_text() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = write_sheet(
            &dir,
            "comma.csv",
            "Material,Need,Left,Have,Extra\nGlass,64,999,16,x\n",
        )?;
        let loaded = load(&path, &options())?;
        assert_eq!(loaded.sheet.delimiter(), Delimiter::Comma);
        assert_eq!(loaded.sheet.headers(), ["Material", "Need", "Left", "Have"]);
        assert_eq!(loaded.rows, vec![MaterialRow::new("Glass", 64, 16)]);
        Ok(())
    }

    #[test]
    fn rejects_sheets_with_fewer_than_four_columns() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = write_sheet(&dir, "narrow.csv", "Item,Total,Missing\nStone,1,1\n")?;
        assert_matches!(
            load(&path, &options()),
            Err(PersistError::Format { columns: 3, .. })
        );

        let empty = write_sheet(&dir, "empty.csv", "")?;
        assert_matches!(load(&empty, &options()), Err(PersistError::Format { .. }));

        let missing = dir.path().join("absent.csv");
        assert_matches!(load(&missing, &options()), Err(PersistError::Io { .. }));
        Ok(())
    }

    #[test]
    fn refuses_sheets_that_are_not_utf8() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("latin1.csv");
        let body = b"Item,Total,Missing,Available\nStone,5,5,0\n\"Caf\xE9 Stone\",10,10,0\n";
        fs::write(&path, body)?;

        assert_matches!(
            load(&path, &options()),
            Err(PersistError::Encoding { line: 3, .. })
        );
        assert_eq!(fs::read(&path)?, body);
        Ok(())
    }

    #[test]
    fn blank_and_duplicate_names_survive_saves() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = write_sheet(
            &dir,
            "list.csv",
            "Item,Total,Missing,Available\nStone,10,10,0\nStone,5,5,0\n,3,3,0\nOak,4,4,0\n",
        )?;
        let loaded = load(&path, &options())?;
        assert_eq!(loaded.sheet.carried_rows(), 2);
        assert_eq!(
            loaded.rows,
            vec![MaterialRow::new("Stone", 10, 0), MaterialRow::new("Oak", 4, 0)]
        );

        let mut table = loaded_table(&loaded);
        table.set_available(1, 1)?;
        loaded.sheet.save(&table)?;
        table.set_available(1, 2)?;
        loaded.sheet.save(&table)?;

        insta::assert_snapshot!(fs::read_to_string(&path)?.trim_end(), @r#"
        Item,Total,Missing,Available
        Stone,10,10,0
        Oak,4,2,2
        Stone,5,5,0
        ,3,3,0
        "#);
        let reloaded = load(&path, &options())?;
        assert_eq!(reloaded.sheet.carried_rows(), 2);
        Ok(())
    }

    #[test]
    fn invalid_counts_clamp_to_zero() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = write_sheet(
            &dir,
            "messy.csv",
            "Item,Total,Missing,Available\nA,lots,0,-4\nB,12.9,0,3.0\nC\n",
        )?;
        let loaded = load(&path, &options())?;
        assert_eq!(
            loaded.rows,
            vec![
                MaterialRow::new("A", 0, 0),
                MaterialRow::new("B", 12, 3),
                MaterialRow::new("C", 0, 0),
            ]
        );
        Ok(())
    }

    #[test]
    fn coerce_count_cases() {
        assert_eq!(coerce_count(" 42 "), 42);
        assert_eq!(coerce_count("-1"), 0);
        assert_eq!(coerce_count("7.99"), 7);
        assert_eq!(coerce_count("NaN"), 0);
        assert_eq!(coerce_count(""), 0);
    }

    #[test]
    fn save_writes_base_totals_in_canonical_order() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = write_sheet(
            &dir,
            "list.csv",
            "Item,Total,Missing,Available,Status\nStone,128,128,0,\n\"Sand, red\",10,10,0,\n",
        )?;
        let loaded = load(&path, &options())?;
        let mut table = loaded_table(&loaded);
        table.set_available(0, 64)?;
        table.set_multiplier(2)?;

        loaded.sheet.save(&table)?;
        let written = fs::read_to_string(&path)?;
        insta::assert_snapshot!(written.trim_end(), @r#"
        Item,Total,Missing,Available
        Stone,128,64,64
        "Sand, red",10,10,0
        "#);
        Ok(())
    }

    #[test]
    fn save_rotates_a_single_backup() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let original = "Item\tTotal\tMissing\tAvailable\nStone\t10\t10\t0\n";
        let path = write_sheet(&dir, "list.csv", original)?;
        let loaded = load(&path, &options())?;
        let mut table = loaded_table(&loaded);

        table.set_available(0, 4)?;
        let report = loaded.sheet.save(&table)?;
        let backup = report.backup.expect("backup created");
        assert_eq!(backup, dir.path().join("list.csv.bak"));
        assert_eq!(fs::read_to_string(&backup)?, original);
        let first_save = fs::read_to_string(&path)?;
        assert!(first_save.contains("Stone\t10\t6\t4"), "tab layout kept: {first_save}");

        table.set_available(0, 9)?;
        loaded.sheet.save(&table)?;
        assert_eq!(fs::read_to_string(&backup)?, first_save);
        assert!(!with_suffix(&path, TMP_SUFFIX).exists());

        let reloaded = load(&path, &options())?;
        assert_eq!(reloaded.rows, vec![MaterialRow::new("Stone", 10, 9)]);
        Ok(())
    }

    #[test]
    fn save_into_missing_directory_fails_without_side_effects() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let sheet = SheetHandle::new(dir.path().join("gone").join("list.csv"), &options());
        let mut table = MaterialTable::default();
        table.load(vec![MaterialRow::new("Stone", 1, 0)]);
        assert_matches!(sheet.save(&table), Err(PersistError::Io { .. }));
        Ok(())
    }

    #[test]
    fn custom_backup_suffix_is_used() {
        let mut options = options();
        options.backup_suffix = ".old".into();
        let sheet = SheetHandle::new("/tmp/list.csv", &options);
        assert_eq!(sheet.backup_path(), PathBuf::from("/tmp/list.csv.old"));
    }

    #[test]
    fn discovers_csv_files_case_insensitively() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write_sheet(&dir, "b.CSV", "")?;
        write_sheet(&dir, "a.csv", "")?;
        write_sheet(&dir, "notes.txt", "")?;
        fs::create_dir(dir.path().join("folder.csv"))?;
        let found = discover_sheets(dir.path())?;
        let names: Vec<_> = found
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .collect();
        assert_eq!(names, ["a.csv", "b.CSV"]);
        Ok(())
    }
}
