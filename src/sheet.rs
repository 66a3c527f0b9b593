//! Spreadsheet backend. The batch reads candidate rows once and writes
//! each scanned row back as a single row-range update.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait SheetBackend: Send {
    /// Header row; empty for an empty sheet
    fn headers(&self) -> &[String];

    /// Data rows below the header, in sheet order
    fn read_rows(&self) -> Result<Vec<Vec<String>>>;

    /// Lay the sheet out under `headers` unless it already starts with
    /// them. Existing cells move with their column name; the cell at
    /// `url_column` of the old layout fills the first column.
    fn ensure_headers(&mut self, headers: &[String], url_column: usize) -> Result<()>;

    /// Overwrite data row `row_index` (0-based, below the header)
    fn write_row(&mut self, row_index: usize, values: &[String]) -> Result<()>;
}

/// A CSV file as a sheet. Every write rewrites the whole file through a
/// temp file and rename.
#[derive(Debug)]
pub struct CsvSheet {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvSheet {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Sheet not found: {}", path.display());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open sheet {}", path.display()))?;

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result.with_context(|| format!("Failed to parse sheet {}", path.display()))?;
            records.push(record.iter().map(|c| c.to_string()).collect::<Vec<_>>());
        }

        let mut records = records.into_iter();
        let headers = records.next().unwrap_or_default();
        let rows: Vec<Vec<String>> = records.collect();
        debug!("Loaded sheet {} with {} rows", path.display(), rows.len());

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "sheet.csv".to_string());
        let temp_path = self.path.with_file_name(format!(".{}.tmp", file_name));

        {
            let file = File::create(&temp_path)
                .with_context(|| format!("Failed to create {}", temp_path.display()))?;
            let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
            writer.write_record(&self.headers)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            let file = writer
                .into_inner()
                .map_err(|e| anyhow::anyhow!("Failed to flush {}: {}", temp_path.display(), e))?;
            file.sync_all()?;
        }

        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl SheetBackend for CsvSheet {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn read_rows(&self) -> Result<Vec<Vec<String>>> {
        Ok(self.rows.clone())
    }

    fn ensure_headers(&mut self, headers: &[String], url_column: usize) -> Result<()> {
        if self.headers.starts_with(headers) {
            return Ok(());
        }
        let (new_headers, rows) = remap_columns(&self.headers, &self.rows, headers, url_column);
        debug!(
            "Rewriting header of {} ({} -> {} columns)",
            self.path.display(),
            self.headers.len(),
            new_headers.len()
        );
        self.headers = new_headers;
        self.rows = rows;
        self.save()
    }

    fn write_row(&mut self, row_index: usize, values: &[String]) -> Result<()> {
        if row_index >= self.rows.len() {
            self.rows.resize(row_index + 1, Vec::new());
        }
        let row = &mut self.rows[row_index];
        if row.len() < values.len() {
            row.resize(values.len(), String::new());
        }
        row[..values.len()].clone_from_slice(values);
        self.save()
    }
}

/// Lay `rows` out under `headers`, moving cells by header name. The
/// first new column is filled from old column `url_column` whatever its
/// name. Old columns `headers` does not name are kept after it.
fn remap_columns(
    old_headers: &[String],
    rows: &[Vec<String>],
    headers: &[String],
    url_column: usize,
) -> (Vec<String>, Vec<Vec<String>>) {
    let mut new_headers = headers.to_vec();
    new_headers.extend(
        old_headers
            .iter()
            .filter(|h| !h.trim().is_empty() && column_index(headers, h.trim()).is_none())
            .cloned(),
    );

    let mut sources: Vec<Option<usize>> = new_headers
        .iter()
        .map(|h| column_index(old_headers, h.trim()))
        .collect();
    if let Some(first) = sources.first_mut() {
        *first = Some(url_column);
    }
    let rows = rows
        .iter()
        .map(|row| {
            sources
                .iter()
                .map(|src| src.and_then(|i| row.get(i)).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    (new_headers, rows)
}

/// Index of a header, compared case-insensitively
pub fn column_index(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}
