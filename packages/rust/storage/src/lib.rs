//! JSON file storage for one analysis run.
//!
//! A run directory holds four documents:
//! - `bands.json`: term lists per severity band
//! - `results.json`: the accumulated term → sentences map
//! - `run.json`: the [`RunManifest`] used to resume interrupted runs
//! - `report.json`: the final three-bucket report
//!
//! Every write goes to a hidden temp file in the same directory and is then
//! renamed over the target, so a crash never leaves a half-written file.
//!
//! **Access rules:**
//! - the pipeline writes via [`RunStore::open`]
//! - report inspection reads via [`RunStore::open_readonly`]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use riskclause_shared::{
    AccumulatedResult, BandPartitions, FinalReport, Result, RiskClauseError, RunManifest,
};

pub const BANDS_FILE: &str = "bands.json";
pub const RESULTS_FILE: &str = "results.json";
pub const MANIFEST_FILE: &str = "run.json";
pub const REPORT_FILE: &str = "report.json";

/// Handle to a run directory.
#[derive(Debug, Clone)]
pub struct RunStore {
    dir: PathBuf,
    readonly: bool,
}

impl RunStore {
    /// Open (creating if needed) the run directory at `dir` in read-write mode.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| RiskClauseError::io(dir, e))?;
        debug!(path = %dir.display(), "run directory opened");
        Ok(Self {
            dir: dir.to_path_buf(),
            readonly: false,
        })
    }

    /// Open an existing run directory for reading only.
    pub fn open_readonly(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(RiskClauseError::Storage(format!(
                "run directory not found: {}",
                dir.display()
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            readonly: true,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a file inside the run directory.
    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(RiskClauseError::Storage(
                "run directory is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Typed documents
    // -----------------------------------------------------------------------

    pub fn read_bands(&self) -> Result<Option<BandPartitions>> {
        self.read(BANDS_FILE)
    }

    pub fn write_bands(&self, bands: &BandPartitions) -> Result<()> {
        self.write(BANDS_FILE, bands)
    }

    pub fn read_results(&self) -> Result<Option<AccumulatedResult>> {
        self.read(RESULTS_FILE)
    }

    pub fn write_results(&self, results: &AccumulatedResult) -> Result<()> {
        self.write(RESULTS_FILE, results)
    }

    pub fn read_manifest(&self) -> Result<Option<RunManifest>> {
        self.read(MANIFEST_FILE)
    }

    pub fn write_manifest(&self, manifest: &RunManifest) -> Result<()> {
        self.write(MANIFEST_FILE, manifest)
    }

    pub fn read_report(&self) -> Result<Option<FinalReport>> {
        self.read(REPORT_FILE)
    }

    pub fn write_report(&self, report: &FinalReport) -> Result<()> {
        self.write(REPORT_FILE, report)
    }

    /// Remove the resumable state (`results.json`, `run.json`, `report.json`).
    pub fn clear(&self) -> Result<()> {
        self.check_writable()?;
        for file in [RESULTS_FILE, MANIFEST_FILE, REPORT_FILE] {
            let path = self.path(file);
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(file, "removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(RiskClauseError::io(&path, e)),
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Raw JSON access
    // -----------------------------------------------------------------------

    fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>> {
        let path = self.path(file);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RiskClauseError::io(&path, e)),
        };

        let value = serde_json::from_str(&content)
            .map_err(|e| RiskClauseError::Storage(format!("invalid {file}: {e}")))?;
        Ok(Some(value))
    }

    fn write<T: Serialize>(&self, file: &str, data: &T) -> Result<()> {
        self.check_writable()?;
        write_json_atomic(&self.path(file), data)
    }
}

/// Write pretty-printed JSON to `path` via a sibling `.{name}.tmp` and a rename.
///
/// The temp file is synced before the rename so the new contents are on disk
/// once the target name points at them.
pub fn write_json_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| RiskClauseError::Storage(format!("JSON serialization failed: {e}")))?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RiskClauseError::Storage(format!("not a file path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{name}.tmp"));

    let mut file = File::create(&temp).map_err(|e| RiskClauseError::io(&temp, e))?;
    file.write_all(json.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| RiskClauseError::io(&temp, e))?;
    drop(file);
    std::fs::rename(&temp, path).map_err(|e| RiskClauseError::io(path, e))?;

    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskclause_shared::CanonicalTermSet;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("rc-store-test-{}", uuid::Uuid::now_v7()))
    }

    fn leftover_temp_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn open_creates_directory() {
        let tmp = temp_dir();
        let store = RunStore::open(&tmp.join("nested/run")).expect("open");
        assert!(store.dir().is_dir());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_documents_read_as_none() {
        let tmp = temp_dir();
        let store = RunStore::open(&tmp).unwrap();
        assert!(store.read_bands().unwrap().is_none());
        assert!(store.read_results().unwrap().is_none());
        assert!(store.read_manifest().unwrap().is_none());
        assert!(store.read_report().unwrap().is_none());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn results_roundtrip_without_temp_files() {
        let tmp = temp_dir();
        let store = RunStore::open(&tmp).unwrap();

        let terms = CanonicalTermSet::new(["T1", "T2"]);
        let mut results = AccumulatedResult::from_terms(&terms);
        results.append("T1", ["clause a".to_string()]);
        store.write_results(&results).unwrap();
        results.append("T1", ["clause b".to_string()]);
        store.write_results(&results).unwrap();

        let loaded = store.read_results().unwrap().unwrap();
        assert_eq!(loaded, results);
        assert_eq!(loaded.get("T1").unwrap(), ["clause a", "clause b"]);
        assert!(leftover_temp_files(&tmp).is_empty());

        let raw = std::fs::read_to_string(store.path(RESULTS_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["T2"], serde_json::json!([]));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn atomic_write_replaces_stale_temp_and_longer_target() {
        let tmp = temp_dir();
        std::fs::create_dir_all(&tmp).unwrap();
        let target = tmp.join("report.json");

        // Leftovers from an interrupted write: a long temp file and a long target.
        let junk = "x".repeat(4096);
        std::fs::write(tmp.join(".report.json.tmp"), &junk).unwrap();
        std::fs::write(&target, &junk).unwrap();

        let report = FinalReport {
            high: vec!["h".into()],
            medium: vec![],
            low: vec![],
        };
        write_json_atomic(&target, &report).unwrap();

        let raw = std::fs::read_to_string(&target).unwrap();
        let loaded: FinalReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(loaded, report);
        assert!(leftover_temp_files(&tmp).is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn manifest_and_report_roundtrip() {
        let tmp = temp_dir();
        let store = RunStore::open(&tmp).unwrap();

        let mut manifest = RunManifest::new("contract.pdf", "abc123", "f00d", "llama3-70b-8192");
        manifest.mark_completed(2);
        manifest.mark_completed(1);
        store.write_manifest(&manifest).unwrap();

        let loaded = store.read_manifest().unwrap().unwrap();
        assert_eq!(loaded.id, manifest.id);
        assert_eq!(loaded.pages_completed, vec![1, 2]);

        let report = FinalReport {
            high: vec!["clause c".into()],
            medium: vec![],
            low: vec!["clause a".into(), "clause b".into()],
        };
        store.write_report(&report).unwrap();
        assert_eq!(store.read_report().unwrap().unwrap(), report);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn corrupt_document_is_storage_error() {
        let tmp = temp_dir();
        let store = RunStore::open(&tmp).unwrap();
        std::fs::write(store.path(MANIFEST_FILE), "{ not json").unwrap();

        let err = store.read_manifest().unwrap_err();
        assert!(matches!(err, RiskClauseError::Storage(_)));
        assert!(err.to_string().contains("run.json"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn clear_removes_resumable_state_only() {
        let tmp = temp_dir();
        let store = RunStore::open(&tmp).unwrap();
        store.write_bands(&BandPartitions::default()).unwrap();
        store.write_results(&AccumulatedResult::default()).unwrap();
        store.write_report(&FinalReport::default()).unwrap();

        store.clear().unwrap();
        assert!(store.read_bands().unwrap().is_some());
        assert!(store.read_results().unwrap().is_none());
        assert!(store.read_report().unwrap().is_none());

        // Clearing twice is fine.
        store.clear().unwrap();
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn readonly_rejects_writes() {
        let tmp = temp_dir();
        RunStore::open(&tmp)
            .unwrap()
            .write_report(&FinalReport::default())
            .unwrap();

        let ro = RunStore::open_readonly(&tmp).unwrap();
        assert!(ro.read_report().unwrap().is_some());
        let err = ro.write_report(&FinalReport::default()).unwrap_err();
        assert!(err.to_string().contains("read-only"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn readonly_requires_existing_directory() {
        let err = RunStore::open_readonly(&temp_dir()).unwrap_err();
        assert!(matches!(err, RiskClauseError::Storage(_)));
    }
}
