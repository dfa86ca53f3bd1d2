//! Persisted run results and checkpoints.
//!
//! Result documents have the shape
//! `{"hof": [...], "log": [...], "args": {...}, "time_s": f, "gen": n}` where
//! `gen` is present only in periodic saves. Writes go to a `_tmp` sibling first
//! and are renamed over the target, so a crash never truncates a good file.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::compute::evolution::Individual;

use super::RunConfig;

/// Current niching checkpoint layout.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Result and checkpoint I/O errors.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Checkpoint version {found} is not supported (expected {CHECKPOINT_VERSION})")]
    UnsupportedVersion { found: u32 },
}

/// One hall-of-fame entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HofEntry {
    pub genotype: String,
    pub fitness: Vec<f64>,
}

/// Statistics of one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "gen")]
    pub generation: usize,
    pub nevals: usize,
    pub avg: Vec<f64>,
    pub stddev: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Result document of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub hof: Vec<HofEntry>,
    pub log: Vec<LogRecord>,
    pub args: RunConfig,
    pub time_s: f64,
    /// Generation of a periodic save; absent in final results.
    #[serde(rename = "gen", default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<usize>,
}

impl RunResult {
    /// Hall-of-fame entries from evaluated individuals, best first.
    pub fn hof_entries<'a>(individuals: impl IntoIterator<Item = &'a Individual>) -> Vec<HofEntry> {
        individuals
            .into_iter()
            .filter_map(|i| {
                i.fitness.as_ref().map(|f| HofEntry {
                    genotype: i.genotype.clone(),
                    fitness: f.clone(),
                })
            })
            .collect()
    }

    /// Write the result document atomically.
    pub fn save(&self, path: &Path) -> Result<(), RecordError> {
        write_json_atomic(path, self)
    }

    /// Read a result document.
    pub fn load(path: &Path) -> Result<Self, RecordError> {
        read_json(path)
    }
}

/// Resumable state of a niching run after a completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    /// Last completed generation.
    pub generation: usize,
    pub population: Vec<Individual>,
    pub archive: Vec<Individual>,
    pub hall_of_fame: Vec<Individual>,
    pub logbook: Vec<LogRecord>,
    pub config: RunConfig,
    pub time_elapsed: f64,
}

impl Checkpoint {
    /// Write the checkpoint atomically.
    pub fn save(&self, path: &Path) -> Result<(), RecordError> {
        write_json_atomic(path, self)
    }

    /// Load a checkpoint; `Ok(None)` when no file exists.
    pub fn load(path: &Path) -> Result<Option<Self>, RecordError> {
        if !path.exists() {
            return Ok(None);
        }
        let checkpoint: Self = read_json(path)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(RecordError::UnsupportedVersion {
                found: checkpoint.version,
            });
        }
        Ok(Some(checkpoint))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push("_tmp");
    path.with_file_name(name)
}

/// Serialize `value` to `path` through a temporary file and a rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), RecordError> {
    let tmp = temp_path(path);
    let json = serde_json::to_string_pretty(value)?;
    let io_error = |source| RecordError::Io {
        path: tmp.clone(),
        source,
    };
    let mut file = File::create(&tmp).map_err(io_error)?;
    file.write_all(json.as_bytes()).map_err(io_error)?;
    file.sync_all().map_err(io_error)?;
    drop(file);

    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        RecordError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Read and parse a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, RecordError> {
    let text = fs::read_to_string(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// Genotypes of every hall-of-fame entry whose first fitness component reaches
/// `threshold`, across all result documents in `dir`. Files that are not result
/// documents are skipped. Duplicates are dropped, first occurrence kept.
pub fn harvest_best_genotypes(dir: &Path, threshold: f64) -> Result<Vec<String>, RecordError> {
    let entries = fs::read_dir(dir).map_err(|source| RecordError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut genotypes: Vec<String> = Vec::new();
    for file in files {
        let result = match RunResult::load(&file) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Skipping {}: {e}", file.display());
                continue;
            }
        };
        for entry in result.hof {
            let good = entry.fitness.first().is_some_and(|&f| f >= threshold);
            if good && !genotypes.contains(&entry.genotype) {
                genotypes.push(entry.genotype);
            }
        }
    }
    Ok(genotypes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(generation: usize) -> LogRecord {
        LogRecord {
            generation,
            nevals: 10,
            avg: vec![-3.5],
            stddev: vec![1.25],
            min: vec![-6.0],
            max: vec![-1.0],
            strength: (generation > 0).then_some(1.1),
            temperature: None,
        }
    }

    fn result(hof: &[(&str, f64)]) -> RunResult {
        RunResult {
            hof: hof
                .iter()
                .map(|&(g, f)| HofEntry {
                    genotype: g.to_string(),
                    fitness: vec![f],
                })
                .collect(),
            log: vec![record(0), record(1)],
            args: RunConfig::default(),
            time_s: 1.5,
            generation: None,
        }
    }

    #[test]
    fn test_result_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        let original = result(&[("1,1", -2.0), ("0.5,0", -0.25)]);
        original.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("\"gen\": null"));
        assert!(!text.contains("temperature"));
        assert!(!dir.path().join("run.json_tmp").exists());

        let loaded = RunResult::load(&path).unwrap();
        assert_eq!(loaded.hof, original.hof);
        assert_eq!(loaded.log.len(), original.log.len());
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_partial_save_carries_generation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        let partial = RunResult {
            generation: Some(5),
            ..result(&[])
        };
        partial.save(&path).unwrap();
        let value: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(value["gen"], 5);
        assert_eq!(value["args"]["popsize"], 50);
    }

    #[test]
    fn test_checkpoint_missing_and_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run_state.json");
        assert!(Checkpoint::load(&path).unwrap().is_none());

        let mut checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION,
            generation: 3,
            population: vec![Individual::with_fitness("1,2", vec![-5.0])],
            archive: Vec::new(),
            hall_of_fame: Vec::new(),
            logbook: vec![record(0)],
            config: RunConfig::default(),
            time_elapsed: 0.25,
        };
        checkpoint.save(&path).unwrap();
        assert_eq!(Checkpoint::load(&path).unwrap(), Some(checkpoint.clone()));

        checkpoint.version = 99;
        checkpoint.save(&path).unwrap();
        assert!(matches!(
            Checkpoint::load(&path),
            Err(RecordError::UnsupportedVersion { found: 99 })
        ));
    }

    #[test]
    fn test_unwritable_target() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("run.json");
        assert!(matches!(
            result(&[]).save(&path),
            Err(RecordError::Io { .. })
        ));
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        assert!(matches!(
            result(&[]).save(&path),
            Err(RecordError::Io { .. })
        ));
        assert!(!dir.path().join("occupied_tmp").exists());
        assert!(path.join("keep").exists());
    }

    #[test]
    fn test_log_records_use_gen_key() {
        let value = serde_json::to_value(result(&[])).unwrap();
        assert_eq!(value["log"][1]["gen"], 1);
        assert!(value.get("gen").is_none());

        let parsed: LogRecord = serde_json::from_value(value["log"][1].clone()).unwrap();
        assert_eq!(parsed.generation, 1);
    }

    #[test]
    fn test_harvest() {
        let dir = tempdir().unwrap();
        result(&[("a", 3.0), ("b", 0.5)])
            .save(&dir.path().join("r1.json"))
            .unwrap();
        result(&[("a", 2.0), ("c", 1.0)])
            .save(&dir.path().join("r2.json"))
            .unwrap();
        fs::write(dir.path().join("notes.json"), "[1, 2]").unwrap();
        fs::write(dir.path().join("readme.txt"), "ignored").unwrap();

        let best = harvest_best_genotypes(dir.path(), 1.0).unwrap();
        assert_eq!(best, vec!["a".to_string(), "c".to_string()]);
    }
}
