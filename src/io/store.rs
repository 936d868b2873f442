//! On-disk calibration store.
//!
//! Each run lives in its own directory:
//!
//! ```text
//! <root>/<waveplate_name>/<run_id>/sweep.csv   angle,power rows in acquisition order
//! <root>/<waveplate_name>/<run_id>/fit.json    written by `io::export`
//! ```
//!
//! Appends are read-modify-write: the whole record is read, the new sample is
//! added, and the full record is written to a temp file that is renamed over
//! the old one. A crash at any point leaves either the previous or the new
//! complete record on disk. The cost is O(n²) I/O over a sweep, which is fine
//! for n ≤ 360. One writer per run is assumed.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::domain::{CalibrationRun, RunKey, SweepSample};
use crate::error::{AppError, ErrorKind};

pub const DEFAULT_DATA_DIR: &str = "calibration";
pub const SWEEP_FILE: &str = "sweep.csv";
pub const FIT_FILE: &str = "fit.json";

const SWEEP_HEADER: [&str; 2] = ["angle", "power"];

/// One persisted CSV row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SweepRow {
    angle: i32,
    power: f64,
}

/// Persistence for sweep samples, addressed by `RunKey`.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    root: PathBuf,
}

impl CalibrationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, key: &RunKey) -> PathBuf {
        self.root.join(&key.waveplate_name).join(&key.run_id)
    }

    pub fn sweep_path(&self, key: &RunKey) -> PathBuf {
        self.run_dir(key).join(SWEEP_FILE)
    }

    pub fn fit_path(&self, key: &RunKey) -> PathBuf {
        self.run_dir(key).join(FIT_FILE)
    }

    /// Create the run directory if needed. Safe to call repeatedly.
    pub fn ensure_run_dir(&self, key: &RunKey) -> Result<PathBuf, AppError> {
        let dir = self.run_dir(key);
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::storage(format!("Failed to create run directory '{}': {e}", dir.display()))
        })?;
        Ok(dir)
    }

    /// Whether a sweep record exists for `key`.
    pub fn exists(&self, key: &RunKey) -> bool {
        self.sweep_path(key).is_file()
    }

    /// Append one sample to its run, creating the record on first use.
    ///
    /// Duplicate angles are accepted and kept in order.
    pub fn append(&self, sample: &SweepSample) -> Result<(), AppError> {
        let key = RunKey::new(sample.waveplate_name.clone(), sample.run_id.clone())?;
        self.ensure_run_dir(&key)?;

        let path = self.sweep_path(&key);
        let mut rows = if path.is_file() { read_rows(&path)? } else { Vec::new() };
        rows.push(SweepRow {
            angle: sample.angle,
            power: sample.power,
        });
        write_rows_atomic(&path, &rows)?;

        trace!(run = %key, angle = sample.angle, power = sample.power, rows = rows.len(), "sample appended");
        Ok(())
    }

    /// Load every sample of a run in append order.
    pub fn load(&self, key: &RunKey) -> Result<Vec<SweepSample>, AppError> {
        let path = self.sweep_path(key);
        if !path.is_file() {
            return Err(not_found(key, &path));
        }
        let rows = read_rows(&path)?;
        Ok(rows
            .into_iter()
            .map(|r| SweepSample::new(key, r.angle, r.power))
            .collect())
    }

    pub fn load_run(&self, key: &RunKey) -> Result<CalibrationRun, AppError> {
        Ok(CalibrationRun {
            key: key.clone(),
            samples: self.load(key)?,
        })
    }

    /// Run ids with a sweep record for `waveplate_name`, sorted ascending.
    ///
    /// Timestamp-derived ids therefore come out oldest first.
    pub fn list_runs(&self, waveplate_name: &str) -> Result<Vec<String>, AppError> {
        let dir = self.root.join(waveplate_name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir)
            .map_err(|e| AppError::storage(format!("Failed to list '{}': {e}", dir.display())))?;

        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AppError::storage(format!("Failed to list '{}': {e}", dir.display())))?;
            if !entry.path().join(SWEEP_FILE).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                runs.push(name.to_string());
            }
        }
        runs.sort();
        Ok(runs)
    }

    /// Most recent run (by id order) for `waveplate_name`.
    pub fn latest_run(&self, waveplate_name: &str) -> Result<RunKey, AppError> {
        let runs = self.list_runs(waveplate_name)?;
        match runs.last() {
            Some(run_id) => RunKey::new(waveplate_name, run_id.clone()),
            None => Err(AppError::new(
                ErrorKind::StoreNotFound,
                format!(
                    "No calibration runs for '{waveplate_name}' under '{}'.",
                    self.root.display()
                ),
            )),
        }
    }
}

fn not_found(key: &RunKey, path: &Path) -> AppError {
    AppError::new(
        ErrorKind::StoreNotFound,
        format!("No sweep data for run {key} (expected '{}').", path.display()),
    )
}

fn read_rows(path: &Path) -> Result<Vec<SweepRow>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| AppError::storage(format!("Failed to open sweep CSV '{}': {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| AppError::storage(format!("Failed to read headers of '{}': {e}", path.display())))?
        .clone();
    if headers.iter().ne(SWEEP_HEADER.iter().copied()) {
        return Err(AppError::storage(format!(
            "Unexpected header in '{}': expected 'angle,power', found '{}'.",
            path.display(),
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }

    let mut rows = Vec::new();
    for (idx, result) in reader.deserialize::<SweepRow>().enumerate() {
        // +2: 1-based lines, plus the header line.
        let line = idx + 2;
        let row = result.map_err(|e| {
            AppError::storage(format!("Malformed row at {}:{line}: {e}", path.display()))
        })?;
        rows.push(row);
    }
    Ok(rows)
}

fn write_rows_atomic(path: &Path, rows: &[SweepRow]) -> Result<(), AppError> {
    let tmp = path.with_extension("csv.tmp");
    let file = File::create(&tmp)
        .map_err(|e| AppError::storage(format!("Failed to create '{}': {e}", tmp.display())))?;

    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::storage(format!("Failed to write sweep row: {e}")))?;
    }
    let file = writer
        .into_inner()
        .map_err(|e| AppError::storage(format!("Failed to flush '{}': {e}", tmp.display())))?;
    file.sync_all()
        .map_err(|e| AppError::storage(format!("Failed to sync '{}': {e}", tmp.display())))?;

    fs::rename(&tmp, path).map_err(|e| {
        AppError::storage(format!(
            "Failed to move '{}' over '{}': {e}",
            tmp.display(),
            path.display()
        ))
    })
}
