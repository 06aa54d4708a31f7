//! JSON-lines result sink.
//!
//! Each batch lands in `<root>/<pattern>_<timestamp>/<language>_results.jsonl`:
//!
//! - line 1: the serialized pattern definition
//! - line 2: the column headers
//! - line 3+: one JSON array per matching row
//!
//! Existing artifacts are never overwritten. The first time a pattern claims a
//! destination directory in a sink's lifetime, a numeric suffix is appended if
//! the directory already exists or another pattern holds it.

use anyhow::Context;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::table::Cell;
use crate::view::{sanitize_segment, ResultSink, SinkBatch};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("refusing to overwrite existing file {0}")]
    WouldOverwrite(PathBuf),
    #[error("no free destination for {0} after {1} attempts")]
    Exhausted(PathBuf, usize),
}

const MAX_VERSIONS: usize = 10_000;

/// Writes batches as JSON-lines files under a root directory.
pub struct JsonLinesSink {
    root: PathBuf,
    /// (pattern, suggested destination) -> directory actually claimed for it.
    claimed: HashMap<(String, PathBuf), PathBuf>,
    /// Directories handed out so far, across all patterns.
    taken: HashSet<PathBuf>,
}

impl JsonLinesSink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            claimed: HashMap::new(),
            taken: HashSet::new(),
        }
    }

    /// Claim a fresh directory for `pattern` at `destination`, adding `_N` if taken.
    ///
    /// Distinct names can sanitize to the same destination, so claims are
    /// keyed by pattern as well.
    fn claim(&mut self, pattern: &str, destination: &Path) -> anyhow::Result<PathBuf> {
        let key = (pattern.to_string(), destination.to_path_buf());
        if let Some(dir) = self.claimed.get(&key) {
            return Ok(dir.clone());
        }

        let base = self.root.join(destination);
        let mut candidate = base.clone();
        let mut version = 0;
        while candidate.exists() || self.taken.contains(&candidate) {
            version += 1;
            if version > MAX_VERSIONS {
                return Err(SinkError::Exhausted(base, MAX_VERSIONS).into());
            }
            let mut name = base.as_os_str().to_owned();
            name.push(format!("_{}", version));
            candidate = PathBuf::from(name);
        }

        fs::create_dir_all(&candidate)
            .with_context(|| format!("creating {}", candidate.display()))?;
        if candidate != base {
            debug!(pattern, path = %candidate.display(), "destination taken, using suffix");
        }
        self.taken.insert(candidate.clone());
        self.claimed.insert(key, candidate.clone());
        Ok(candidate)
    }
}

fn cell_to_json(cell: &Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Bool(b) => Value::Bool(*b),
        Cell::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Cell::Date(_) | Cell::Text(_) => Value::String(cell.to_string()),
    }
}

impl ResultSink for JsonLinesSink {
    fn write(&mut self, batch: &SinkBatch) -> anyhow::Result<PathBuf> {
        let dir = self.claim(&batch.pattern, &batch.destination)?;
        let path = dir.join(format!("{}_results.jsonl", sanitize_segment(&batch.language)));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    anyhow::Error::from(SinkError::WouldOverwrite(path.clone()))
                }
                _ => anyhow::Error::new(e).context(format!("creating {}", path.display())),
            })?;
        let mut out = BufWriter::new(file);

        writeln!(out, "{}", batch.definition)?;
        writeln!(out, "{}", serde_json::to_string(&batch.headers)?)?;
        for row in &batch.rows {
            let values: Vec<Value> = row.iter().map(cell_to_json).collect();
            writeln!(out, "{}", serde_json::to_string(&values)?)?;
        }
        out.flush()?;

        info!(
            pattern = %batch.pattern,
            language = %batch.language,
            rows = batch.rows.len(),
            path = %path.display(),
            "saved results"
        );
        Ok(path)
    }
}
