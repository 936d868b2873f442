//! Read/write fit record JSON files.
//!
//! The fit record is the hand-off to downstream reporting/plotting:
//! - `waveplate_type`: 0 = half-wave, 1 = quarter-wave
//! - `fit_offset`, `fit_amplitude`, `fit_phase`: decimal strings rounded to a
//!   fixed number of significant digits (2 by default), so consumers doing
//!   further numeric work only get that much precision
//! - run metadata and both residual sums for diagnostics
//!
//! Records sit next to the sweep they were fitted from (`<run dir>/fit.json`).

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{FitResult, ModelKind, RunKey, WaveplateParams};
use crate::error::{AppError, ErrorKind};
use crate::io::store::CalibrationStore;
use crate::math::format_significant;

/// Significant digits used when nothing else is configured.
pub const DEFAULT_EXPORT_DIGITS: usize = 2;

/// A saved fit result (JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRecord {
    pub waveplate_type: u8,
    pub fit_offset: String,
    pub fit_amplitude: String,
    pub fit_phase: String,
    pub waveplate: String,
    pub run_id: String,
    pub model: String,
    pub hwp_sse: f64,
    pub qwp_sse: f64,
    pub created_at: DateTime<Local>,
}

impl FitRecord {
    pub fn from_result(key: &RunKey, result: &FitResult, digits: usize) -> Self {
        Self {
            waveplate_type: result.model.tag(),
            fit_offset: format_significant(result.params.offset, digits),
            fit_amplitude: format_significant(result.params.amplitude, digits),
            fit_phase: format_significant(result.params.phase, digits),
            waveplate: key.waveplate_name.clone(),
            run_id: key.run_id.clone(),
            model: result.model.display_name().to_string(),
            hwp_sse: result.half_wave_sse,
            qwp_sse: result.quarter_wave_sse,
            created_at: Local::now(),
        }
    }

    pub fn model_kind(&self) -> Result<ModelKind, AppError> {
        ModelKind::from_tag(self.waveplate_type).ok_or_else(|| {
            AppError::storage(format!("Unknown waveplate_type {} in fit record.", self.waveplate_type))
        })
    }

    /// Parameters as stored (already rounded).
    pub fn params(&self) -> Result<WaveplateParams, AppError> {
        Ok(WaveplateParams::new(
            parse_field("fit_offset", &self.fit_offset)?,
            parse_field("fit_amplitude", &self.fit_amplitude)?,
            parse_field("fit_phase", &self.fit_phase)?,
        ))
    }
}

fn parse_field(name: &str, value: &str) -> Result<f64, AppError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| AppError::storage(format!("Invalid {name} '{value}' in fit record: {e}")))
}

/// Write the fit record for a run that has sweep data.
///
/// Fails with `StoreNotFound` (and writes nothing) if the run has no sweep record.
pub fn export(
    store: &CalibrationStore,
    key: &RunKey,
    result: &FitResult,
    digits: usize,
) -> Result<PathBuf, AppError> {
    if !store.exists(key) {
        return Err(AppError::new(
            ErrorKind::StoreNotFound,
            format!("Cannot export fit for run {key}: no sweep data stored."),
        ));
    }

    let record = FitRecord::from_result(key, result, digits);
    let path = store.fit_path(key);
    write_fit_json(&path, &record)?;

    info!(
        run = %key,
        model = %record.model,
        offset = %record.fit_offset,
        amplitude = %record.fit_amplitude,
        phase = %record.fit_phase,
        path = %path.display(),
        "fit record exported"
    );
    Ok(path)
}

/// Write a fit record JSON file via temp file + rename.
pub fn write_fit_json(path: &Path, record: &FitRecord) -> Result<(), AppError> {
    let tmp = path.with_extension("json.tmp");
    let file = File::create(&tmp)
        .map_err(|e| AppError::storage(format!("Failed to create fit JSON '{}': {e}", tmp.display())))?;

    serde_json::to_writer_pretty(&file, record)
        .map_err(|e| AppError::storage(format!("Failed to write fit JSON: {e}")))?;
    file.sync_all()
        .map_err(|e| AppError::storage(format!("Failed to sync fit JSON: {e}")))?;

    fs::rename(&tmp, path)
        .map_err(|e| AppError::storage(format!("Failed to move fit JSON into '{}': {e}", path.display())))
}

/// Read a fit record JSON file.
pub fn read_fit_record(path: &Path) -> Result<FitRecord, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::storage(format!("Failed to open fit JSON '{}': {e}", path.display())))?;
    let record: FitRecord = serde_json::from_reader(file)
        .map_err(|e| AppError::storage(format!("Invalid fit JSON '{}': {e}", path.display())))?;
    Ok(record)
}

/// The stored fit record of a run, if one has been exported.
pub fn load_fit_record(store: &CalibrationStore, key: &RunKey) -> Result<Option<FitRecord>, AppError> {
    let path = store.fit_path(key);
    if !path.is_file() {
        return Ok(None);
    }
    read_fit_record(&path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SweepSample;

    fn result() -> FitResult {
        FitResult {
            model: ModelKind::QuarterWave,
            params: WaveplateParams::new(0.5012, -0.29871, 190.4),
            half_wave_sse: 3.5,
            quarter_wave_sse: 1e-9,
        }
    }

    #[test]
    fn export_writes_rounded_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path());
        let key = RunKey::new("QWP-7", "20250101_000000").unwrap();
        store.append(&SweepSample::new(&key, 0, 1.0)).unwrap();

        let path = export(&store, &key, &result(), DEFAULT_EXPORT_DIGITS).unwrap();
        let record = read_fit_record(&path).unwrap();

        assert_eq!(record.waveplate_type, 1);
        assert_eq!(record.fit_offset, "0.50");
        assert_eq!(record.fit_amplitude, "-0.30");
        assert_eq!(record.fit_phase, "190");
        assert_eq!(record.model_kind().unwrap(), ModelKind::QuarterWave);
        assert_eq!(record.params().unwrap(), WaveplateParams::new(0.5, -0.3, 190.0));

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["waveplate_type"], 1);
        assert_eq!(raw["fit_offset"], "0.50");
    }

    #[test]
    fn export_without_sweep_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path());
        let key = RunKey::new("HWP", "missing").unwrap();

        let err = export(&store, &key, &result(), 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreNotFound);
        assert!(!store.run_dir(&key).exists());
        assert_eq!(load_fit_record(&store, &key).unwrap(), None);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let key = RunKey::new("HWP", "r").unwrap();
        let mut record = FitRecord::from_result(&key, &result(), 2);
        record.waveplate_type = 9;
        assert_eq!(record.model_kind().unwrap_err().kind(), ErrorKind::Storage);
    }
}
