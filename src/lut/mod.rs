//! LUT store: mode registry, cached table loading, atomic weight saves,
//! and timestamped backup rotation.
//!
//! Weight files follow the `lookUpTable_<mode>_<n>.csv` naming convention;
//! an optional `modes.conf` beside them overrides per-mode spin costs
//! (`<mode> <cost>` per line, `#` comments).

pub mod csv;
pub mod distribution;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::OptimizerError;
use crate::model::LookupTable;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeSpec {
    pub mode: String,
    pub filename: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    pub filename: String,
    pub timestamp: String,
    pub path: String,
}

/// Loads, caches, and persists per-mode lookup tables.
pub struct Loader {
    base_dir: PathBuf,
    modes: RwLock<HashMap<String, ModeSpec>>,
    tables: RwLock<HashMap<String, Arc<LookupTable>>>,
}

impl Loader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            modes: RwLock::new(HashMap::new()),
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Scan `base_dir` for weight files and build the mode registry.
    pub fn discover(base_dir: impl Into<PathBuf>) -> Result<Self, OptimizerError> {
        let loader = Self::new(base_dir);
        let costs = loader.read_mode_costs();

        for entry in std::fs::read_dir(&loader.base_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(mode) = mode_from_filename(&name) else {
                continue;
            };
            let cost = costs.get(&mode).copied().unwrap_or(1.0);
            debug!(%mode, filename = %name, cost, "discovered mode");
            loader.register_mode(ModeSpec {
                mode,
                filename: name,
                cost,
            });
        }

        Ok(loader)
    }

    fn read_mode_costs(&self) -> HashMap<String, f64> {
        let mut costs = HashMap::new();
        let Ok(data) = std::fs::read_to_string(self.base_dir.join("modes.conf")) else {
            return costs;
        };
        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            if let (Some(mode), Some(cost)) = (parts.next(), parts.next()) {
                if let Ok(cost) = cost.parse::<f64>() {
                    costs.insert(mode.to_string(), cost);
                }
            }
        }
        costs
    }

    pub fn register_mode(&self, spec: ModeSpec) {
        self.modes.write().insert(spec.mode.clone(), spec);
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn modes(&self) -> Vec<ModeSpec> {
        let mut specs: Vec<ModeSpec> = self.modes.read().values().cloned().collect();
        specs.sort_by(|a, b| a.mode.cmp(&b.mode));
        specs
    }

    pub fn mode_spec(&self, mode: &str) -> Result<ModeSpec, OptimizerError> {
        self.modes
            .read()
            .get(mode)
            .cloned()
            .ok_or_else(|| OptimizerError::ModeNotFound(mode.to_string()))
    }

    /// Filename -> mode map for the file watcher.
    pub fn watched_files(&self) -> HashMap<String, String> {
        self.modes
            .read()
            .values()
            .map(|s| (s.filename.clone(), s.mode.clone()))
            .collect()
    }

    /// Cached table fetch; parses the CSV on first access.
    pub fn get_mode(&self, mode: &str) -> Result<Arc<LookupTable>, OptimizerError> {
        if let Some(table) = self.tables.read().get(mode) {
            return Ok(table.clone());
        }
        self.reload(mode)
    }

    /// Drop the cached table and re-read it from disk.
    pub fn reload(&self, mode: &str) -> Result<Arc<LookupTable>, OptimizerError> {
        let spec = self.mode_spec(mode)?;
        let path = self.base_dir.join(&spec.filename);
        let data = std::fs::read_to_string(&path)?;
        let outcomes = csv::parse_table_csv(&data)?;
        let table = Arc::new(LookupTable::new(spec.mode.clone(), spec.cost, outcomes));

        self.tables.write().insert(mode.to_string(), table.clone());
        info!(mode, outcomes = table.outcomes.len(), rtp = table.rtp(), "table loaded");
        Ok(table)
    }

    /// Overwrite a mode's weights atomically (temp file + rename).
    pub fn save_weights(&self, mode: &str, weights: &[u64]) -> Result<(), OptimizerError> {
        let spec = self.mode_spec(mode)?;
        let table = self.get_mode(mode)?;

        if weights.len() != table.outcomes.len() {
            return Err(OptimizerError::InvalidRequest(format!(
                "weights: expected {} entries, got {}",
                table.outcomes.len(),
                weights.len()
            )));
        }

        let mut updated = (*table).clone();
        for (outcome, &w) in updated.outcomes.iter_mut().zip(weights) {
            outcome.weight = w;
        }

        let path = self.base_dir.join(&spec.filename);
        let tmp = self.base_dir.join(format!("{}.tmp", spec.filename));
        std::fs::write(&tmp, csv::render_table_csv(&updated.outcomes))?;
        std::fs::rename(&tmp, &path)?;

        self.tables
            .write()
            .insert(mode.to_string(), Arc::new(updated));
        info!(mode, "weights saved");
        Ok(())
    }

    /// Copy the current file to `<name>.<timestamp>.bak`, then save.
    /// Returns the backup path.
    pub fn save_weights_with_backup(
        &self,
        mode: &str,
        weights: &[u64],
    ) -> Result<String, OptimizerError> {
        let spec = self.mode_spec(mode)?;
        let path = self.base_dir.join(&spec.filename);

        let timestamp = Utc::now().format("%Y%m%d%H%M%S");
        let backup_name = format!("{}.{}.bak", spec.filename, timestamp);
        let backup_path = self.base_dir.join(&backup_name);
        std::fs::copy(&path, &backup_path)?;

        self.save_weights(mode, weights)?;
        info!(mode, backup = %backup_name, "backup created");
        Ok(backup_path.to_string_lossy().to_string())
    }

    /// Backups for a mode, newest first.
    pub fn list_backups(&self, mode: &str) -> Result<Vec<BackupInfo>, OptimizerError> {
        let spec = self.mode_spec(mode)?;
        let prefix = format!("{}.", spec.filename);

        let mut backups = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(&prefix) || !name.ends_with(".bak") {
                continue;
            }
            let timestamp = name
                .trim_end_matches(".bak")
                .rsplit('.')
                .next()
                .unwrap_or("")
                .to_string();
            backups.push(BackupInfo {
                path: entry.path().to_string_lossy().to_string(),
                filename: name,
                timestamp,
            });
        }

        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }

    /// Read a backup file's weight column. Relative paths resolve against the
    /// base directory.
    pub fn read_backup_weights(&self, backup_file: &str) -> Result<Vec<u64>, OptimizerError> {
        let path = PathBuf::from(backup_file);
        let path = if path.is_absolute() {
            path
        } else {
            self.base_dir.join(path)
        };
        let data = std::fs::read_to_string(path)?;
        csv::parse_weights_csv(&data)
    }
}

fn mode_from_filename(name: &str) -> Option<String> {
    let stem = name.strip_suffix(".csv")?;
    let rest = stem.strip_prefix("lookUpTable_")?;
    // `lookUpTable_<mode>_<n>` with a numeric trailing segment.
    let (mode, index) = rest.rsplit_once('_')?;
    if mode.is_empty() || index.parse::<u32>().is_err() {
        return None;
    }
    Some(mode.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Outcome;

    fn seed_dir(rows: &str) -> (tempfile::TempDir, Loader) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lookUpTable_base_0.csv"), rows).unwrap();
        let loader = Loader::discover(dir.path()).unwrap();
        (dir, loader)
    }

    #[test]
    fn discovers_modes_from_filenames() {
        let (_dir, loader) = seed_dir("0,1,0\n1,1,200\n");
        let modes = loader.modes();
        assert_eq!(modes.len(), 1);
        assert_eq!(modes[0].mode, "base");
        assert_eq!(modes[0].cost, 1.0);
    }

    #[test]
    fn mode_costs_come_from_conf() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lookUpTable_bonus_0.csv"), "0,1,100\n").unwrap();
        std::fs::write(dir.path().join("modes.conf"), "# costs\nbonus 100\n").unwrap();

        let loader = Loader::discover(dir.path()).unwrap();
        assert_eq!(loader.mode_spec("bonus").unwrap().cost, 100.0);
    }

    #[test]
    fn unknown_mode_is_not_found() {
        let (_dir, loader) = seed_dir("0,1,0\n");
        assert!(matches!(
            loader.get_mode("nope"),
            Err(OptimizerError::ModeNotFound(_))
        ));
    }

    #[test]
    fn get_mode_caches_and_reload_rereads() {
        let (dir, loader) = seed_dir("0,1,0\n1,1,200\n");
        let first = loader.get_mode("base").unwrap();
        assert_eq!(first.outcomes.len(), 2);

        std::fs::write(
            dir.path().join("lookUpTable_base_0.csv"),
            "0,1,0\n1,1,200\n2,1,500\n",
        )
        .unwrap();

        // Cached copy is untouched until an explicit reload.
        assert_eq!(loader.get_mode("base").unwrap().outcomes.len(), 2);
        assert_eq!(loader.reload("base").unwrap().outcomes.len(), 3);
    }

    #[test]
    fn save_rejects_length_mismatch() {
        let (_dir, loader) = seed_dir("0,1,0\n1,1,200\n");
        assert!(matches!(
            loader.save_weights("base", &[1, 2, 3]),
            Err(OptimizerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn save_updates_file_and_cache() {
        let (dir, loader) = seed_dir("0,1,0\n1,1,200\n");
        loader.save_weights("base", &[7, 9]).unwrap();

        let reloaded = loader.get_mode("base").unwrap();
        assert_eq!(reloaded.outcomes[0].weight, 7);
        assert_eq!(reloaded.outcomes[1].weight, 9);

        let on_disk =
            std::fs::read_to_string(dir.path().join("lookUpTable_base_0.csv")).unwrap();
        assert!(on_disk.contains("0,7,0"));
        assert!(on_disk.contains("1,9,200"));
    }

    #[test]
    fn backup_save_and_listing_roundtrip() {
        let (_dir, loader) = seed_dir("0,1,0\n1,1,200\n");
        let backup_path = loader.save_weights_with_backup("base", &[3, 4]).unwrap();
        assert!(backup_path.ends_with(".bak"));

        let backups = loader.list_backups("base").unwrap();
        assert_eq!(backups.len(), 1);
        assert!(!backups[0].timestamp.is_empty());

        // The backup preserves the pre-save weights.
        let weights = loader.read_backup_weights(&backups[0].filename).unwrap();
        assert_eq!(weights, vec![1, 1]);
    }

    #[test]
    fn filename_convention() {
        assert_eq!(mode_from_filename("lookUpTable_base_0.csv").unwrap(), "base");
        assert_eq!(
            mode_from_filename("lookUpTable_free_spins_2.csv").unwrap(),
            "free_spins"
        );
        assert!(mode_from_filename("lookUpTable_base_0.csv.bak").is_none());
        assert!(mode_from_filename("weights.csv").is_none());
        assert!(mode_from_filename("lookUpTable_base_x.csv").is_none());
    }

    #[test]
    fn table_parses_into_outcomes() {
        let (_dir, loader) = seed_dir("5,10,250\n");
        let table = loader.get_mode("base").unwrap();
        assert_eq!(table.outcomes[0], Outcome::new(5, 250, 10));
    }
}
