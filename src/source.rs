//! Data sources: loading language-partitioned tables.
//!
//! The bundled [`JsonWorkbookSource`] reads every `*.json` workbook in a
//! directory. A workbook maps language codes (sheets) to either an array of
//! row objects or a `{"columns": [...], "rows": [[...]]}` grid:
//!
//! ```json
//! { "es": [ {"texto": "hola", "seguidores": 1500} ],
//!   "en": { "columns": ["texto"], "rows": [["hello"]] } }
//! ```
//!
//! Sheets with the same language are concatenated across workbooks in file
//! order. A sheet named `all` is ignored.

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::table::{Cell, LanguageTable};

/// Sheet holding every language combined; skipped to avoid double counting.
const COMBINED_SHEET: &str = "all";

/// Errors raised while loading tables.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("data directory not found: {0}")]
    NotFound(PathBuf),
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid workbook {path}: {reason}")]
    InvalidWorkbook { path: PathBuf, reason: String },
}

/// Supplier of language tables.
pub trait DataSource {
    fn load(&self) -> Result<BTreeMap<String, LanguageTable>, SourceError>;
}

fn invalid(path: &Path, reason: impl Into<String>) -> SourceError {
    SourceError::InvalidWorkbook {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn parse_sheet(language: &str, sheet: &Value, path: &Path) -> Result<LanguageTable, SourceError> {
    match sheet {
        Value::Array(records) => {
            let mut table = LanguageTable::new(language, Vec::new());
            for (idx, record) in records.iter().enumerate() {
                let obj = record.as_object().ok_or_else(|| {
                    invalid(path, format!("sheet '{}' row {} is not an object", language, idx))
                })?;
                let mut cells = vec![Cell::Null; table.columns().len()];
                let mut seen = HashSet::new();
                for (column, value) in obj {
                    let col = table.add_column(column.clone());
                    if col >= cells.len() {
                        cells.resize(col + 1, Cell::Null);
                    }
                    if !seen.insert(col) {
                        debug!(
                            file = %path.display(),
                            sheet = language,
                            row = idx,
                            column = %column,
                            "duplicate column after normalization, keeping last value"
                        );
                    }
                    cells[col] = Cell::from_json(value);
                }
                table.push_row(cells);
            }
            Ok(table)
        }
        Value::Object(grid) => {
            let columns = grid
                .get("columns")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid(path, format!("sheet '{}' has no 'columns' list", language)))?
                .iter()
                .map(|c| match c {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            let rows = grid
                .get("rows")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid(path, format!("sheet '{}' has no 'rows' list", language)))?;

            let mut table = LanguageTable::new(language, columns);
            for (idx, row) in rows.iter().enumerate() {
                let values = row.as_array().ok_or_else(|| {
                    invalid(path, format!("sheet '{}' row {} is not a list", language, idx))
                })?;
                table.push_row(values.iter().map(Cell::from_json).collect());
            }
            Ok(table)
        }
        _ => Err(invalid(
            path,
            format!("sheet '{}' must be a list of rows or a grid object", language),
        )),
    }
}

/// Parse one workbook into per-language tables.
pub fn parse_workbook(
    content: &str,
    path: &Path,
) -> Result<BTreeMap<String, LanguageTable>, SourceError> {
    let doc: Value = serde_json::from_str(content).map_err(|source| SourceError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let sheets = doc
        .as_object()
        .ok_or_else(|| invalid(path, "workbook must map language codes to sheets"))?;

    let mut tables: BTreeMap<String, LanguageTable> = BTreeMap::new();
    for (name, sheet) in sheets {
        let language = name.trim().to_lowercase();
        if language == COMBINED_SHEET {
            debug!(file = %path.display(), "skipping combined sheet");
            continue;
        }
        let table = parse_sheet(&language, sheet, path)?;
        // Sheets differing only in case share a language.
        match tables.get_mut(&language) {
            Some(existing) => existing.extend_from(&table),
            None => {
                tables.insert(language, table);
            }
        }
    }
    Ok(tables)
}

/// Reads JSON workbooks from a directory.
pub struct JsonWorkbookSource {
    dir: PathBuf,
    languages: Vec<String>,
}

impl JsonWorkbookSource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            languages: Vec::new(),
        }
    }

    /// Only keep these languages (all when empty).
    pub fn languages(mut self, languages: &[String]) -> Self {
        self.languages = languages.iter().map(|l| l.trim().to_lowercase()).collect();
        self
    }

    fn wants(&self, language: &str) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|l| l == language)
    }

    fn workbooks(&self) -> Result<Vec<PathBuf>, SourceError> {
        if !self.dir.is_dir() {
            return Err(SourceError::NotFound(self.dir.clone()));
        }
        let mut files: Vec<PathBuf> = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        files.sort();
        Ok(files)
    }
}

impl DataSource for JsonWorkbookSource {
    fn load(&self) -> Result<BTreeMap<String, LanguageTable>, SourceError> {
        let mut tables: BTreeMap<String, LanguageTable> = BTreeMap::new();

        for path in self.workbooks()? {
            let content = fs::read_to_string(&path).map_err(|source| SourceError::Io {
                path: path.clone(),
                source,
            })?;
            for (language, table) in parse_workbook(&content, &path)? {
                if !self.wants(&language) {
                    continue;
                }
                debug!(file = %path.display(), language = %language, rows = table.len(), "read sheet");
                match tables.get_mut(&language) {
                    Some(existing) => existing.extend_from(&table),
                    None => {
                        tables.insert(language, table);
                    }
                }
            }
        }

        for (language, table) in &tables {
            info!(language = %language, rows = table.len(), columns = table.columns().len(), "loaded table");
        }
        Ok(tables)
    }
}
