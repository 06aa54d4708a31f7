//! Loading and structural validation of pattern definition files.
//!
//! Every `*.json` file directly inside the patterns directory is read. A file
//! holds one pattern document or an array of them. Invalid documents are
//! rejected individually; they never stop other patterns from loading.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{PatternDefinition, RawValue};

/// Why a pattern document was rejected.
#[derive(Error, Debug)]
pub enum PatternValidationError {
    #[error("error reading file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON format: {0}")]
    Json(#[from] serde_json::Error),
    #[error("pattern document must be a JSON object")]
    NotAnObject,
    #[error("missing 'name' field")]
    MissingName,
    #[error("'name' must be a non-empty string")]
    InvalidName,
    #[error("missing 'pattern' field")]
    MissingPattern,
    #[error("'pattern' field must be an object")]
    PatternNotObject,
    #[error("field '{column}' must be a list, got {found}")]
    NotAList { column: String, found: &'static str },
    #[error("field '{column}' contains unsupported value {value}")]
    UnsupportedValue { column: String, value: String },
    #[error("duplicate pattern name '{0}'")]
    DuplicateName(String),
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Validate one JSON document and turn it into a definition.
pub fn parse_document(doc: &Value) -> Result<PatternDefinition, PatternValidationError> {
    let obj = doc.as_object().ok_or(PatternValidationError::NotAnObject)?;

    let name = match obj.get("name") {
        None => return Err(PatternValidationError::MissingName),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(_) => return Err(PatternValidationError::InvalidName),
    };

    let columns = match obj.get("pattern") {
        None => return Err(PatternValidationError::MissingPattern),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(PatternValidationError::PatternNotObject),
    };

    let mut def = PatternDefinition::new(name);
    for (column, values) in columns {
        let list = values.as_array().ok_or_else(|| PatternValidationError::NotAList {
            column: column.clone(),
            found: json_type_name(values),
        })?;

        let raw = list
            .iter()
            .map(|v| match v {
                Value::Bool(b) => Ok(RawValue::Bool(*b)),
                Value::Number(n) => n.as_f64().map(RawValue::Number).ok_or_else(|| {
                    PatternValidationError::UnsupportedValue {
                        column: column.clone(),
                        value: n.to_string(),
                    }
                }),
                Value::String(s) => Ok(RawValue::Text(s.clone())),
                other => Err(PatternValidationError::UnsupportedValue {
                    column: column.clone(),
                    value: other.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        def.insert(column.clone(), raw);
    }

    Ok(def)
}

/// Parse file content holding one document or an array of documents.
pub fn parse_content(content: &str) -> Vec<Result<PatternDefinition, PatternValidationError>> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(docs)) => docs.iter().map(parse_document).collect(),
        Ok(doc) => vec![parse_document(&doc)],
        Err(e) => vec![Err(e.into())],
    }
}

/// A pattern that failed validation.
#[derive(Debug)]
pub struct RejectedPattern {
    pub file: String,
    /// Position inside an array file; `None` for single-document files.
    pub index: Option<usize>,
    pub error: PatternValidationError,
}

/// Outcome of loading a set of pattern files.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub patterns: BTreeMap<String, PatternDefinition>,
    pub rejected: Vec<RejectedPattern>,
    pub files: usize,
}

impl LoadReport {
    pub fn accepted(&self) -> usize {
        self.patterns.len()
    }

    pub fn has_rejections(&self) -> bool {
        !self.rejected.is_empty()
    }

    /// Fold the documents of one file into the report.
    pub fn add_file(&mut self, file: &str, content: &str) {
        self.files += 1;
        let results = parse_content(content);
        let is_array = results.len() != 1 || content.trim_start().starts_with('[');

        for (idx, result) in results.into_iter().enumerate() {
            let index = is_array.then_some(idx);
            let result = result.and_then(|def| {
                if self.patterns.contains_key(&def.name) {
                    Err(PatternValidationError::DuplicateName(def.name))
                } else {
                    Ok(def)
                }
            });

            match result {
                Ok(def) => {
                    info!(file, pattern = %def.name, columns = def.column_names().len(), "loaded pattern");
                    self.patterns.insert(def.name.clone(), def);
                }
                Err(error) => {
                    warn!(file, index = ?index, error = %error, "rejected pattern");
                    self.rejected.push(RejectedPattern {
                        file: file.to_string(),
                        index,
                        error,
                    });
                }
            }
        }
    }

    fn add_unreadable(&mut self, file: &str, error: std::io::Error) {
        self.files += 1;
        warn!(file, error = %error, "could not read pattern file");
        self.rejected.push(RejectedPattern {
            file: file.to_string(),
            index: None,
            error: error.into(),
        });
    }
}

/// Supplier of pattern definitions.
pub trait PatternSource {
    fn load(&self) -> anyhow::Result<LoadReport>;
}

/// Loads `*.json` pattern files from a directory.
pub struct PatternDirSource {
    dir: PathBuf,
    excluded: GlobSet,
}

impl PatternDirSource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            excluded: GlobSet::empty(),
        }
    }

    /// Skip files whose name or relative path matches any of `globs`.
    pub fn exclude(mut self, globs: &[String]) -> anyhow::Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in globs {
            let glob = Glob::new(pattern)
                .map_err(|e| anyhow::anyhow!("invalid exclude pattern {:?}: {}", pattern, e))?;
            builder.add(glob);
        }
        self.excluded = builder.build()?;
        Ok(self)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.dir).unwrap_or(path);
        self.excluded.is_match(relative)
            || path
                .file_name()
                .map(|n| self.excluded.is_match(Path::new(n)))
                .unwrap_or(false)
    }

    /// Pattern files in sorted order.
    pub fn files(&self) -> anyhow::Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            anyhow::bail!("patterns directory not found: {}", self.dir.display());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if self.is_excluded(path) {
                debug!(file = %path.display(), "excluded pattern file");
                continue;
            }
            files.push(path.to_path_buf());
        }
        files.sort();
        Ok(files)
    }
}

impl PatternSource for PatternDirSource {
    fn load(&self) -> anyhow::Result<LoadReport> {
        let mut report = LoadReport::default();

        for path in self.files()? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            match fs::read_to_string(&path) {
                Ok(content) => report.add_file(&name, &content),
                Err(e) => report.add_unreadable(&name, e),
            }
        }

        info!(
            files = report.files,
            valid = report.accepted(),
            invalid = report.rejected.len(),
            "pattern loading finished"
        );
        Ok(report)
    }
}
