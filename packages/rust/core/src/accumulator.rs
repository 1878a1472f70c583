//! Merge accumulator: folds page classifications into the run's results.
//!
//! Results and the run manifest are persisted after every merged page, so an
//! interrupted run resumes from the last merged page when the same document
//! is analyzed again into the same run directory.

use tracing::{info, warn};

use riskclause_shared::{
    AccumulatedResult, CanonicalTermSet, PageClassification, Result, RunManifest,
};
use riskclause_storage::RunStore;

/// Identity of the document and risk table a run belongs to.
#[derive(Debug, Clone)]
pub struct RunIdentity<'a> {
    pub document_name: &'a str,
    pub document_sha256: &'a str,
    /// Fingerprint of the band partitions the run classifies against.
    pub table_fingerprint: &'a str,
    pub model: &'a str,
}

impl RunIdentity<'_> {
    fn matches(&self, manifest: &RunManifest) -> bool {
        manifest.document_sha256 == self.document_sha256
            && manifest.table_fingerprint == self.table_fingerprint
    }
}

/// Running term → sentences collection backed by a [`RunStore`].
#[derive(Debug)]
pub struct MergeAccumulator {
    store: RunStore,
    terms: CanonicalTermSet,
    results: AccumulatedResult,
    manifest: RunManifest,
    resumed: bool,
}

impl MergeAccumulator {
    /// Resume the run stored in `store` if it belongs to the same document
    /// and risk table, otherwise start over from the term skeleton.
    ///
    /// Pages merged under a different table are never reused: their
    /// classifications know nothing of terms added since, and may hold terms
    /// the table no longer has.
    ///
    /// With `fresh` set, any stored state is discarded.
    pub fn open(
        store: RunStore,
        terms: CanonicalTermSet,
        identity: RunIdentity<'_>,
        fresh: bool,
    ) -> Result<Self> {
        let previous = if fresh { None } else { store.read_manifest()? };

        match previous {
            Some(manifest) if identity.matches(&manifest) => {
                let results = store
                    .read_results()?
                    .unwrap_or_else(|| AccumulatedResult::from_terms(&terms));

                info!(
                    run_id = %manifest.id,
                    pages_completed = manifest.pages_completed.len(),
                    "resuming run"
                );
                Ok(Self {
                    store,
                    terms,
                    results,
                    manifest,
                    resumed: true,
                })
            }
            other => {
                match other {
                    Some(m) if m.document_sha256 != identity.document_sha256 => {
                        info!("run directory holds a different document, starting over");
                    }
                    Some(_) => info!("risk table changed since the run started, starting over"),
                    None => {}
                }
                store.clear()?;

                let results = AccumulatedResult::from_terms(&terms);
                let manifest = RunManifest::new(
                    identity.document_name,
                    identity.document_sha256,
                    identity.table_fingerprint,
                    identity.model,
                );
                store.write_results(&results)?;
                store.write_manifest(&manifest)?;

                info!(run_id = %manifest.id, terms = terms.len(), "new run");
                Ok(Self {
                    store,
                    terms,
                    results,
                    manifest,
                    resumed: false,
                })
            }
        }
    }

    /// Whether stored state from an earlier run was picked up.
    pub fn resumed(&self) -> bool {
        self.resumed
    }

    pub fn is_completed(&self, page: u32) -> bool {
        self.manifest.is_completed(page)
    }

    pub fn results(&self) -> &AccumulatedResult {
        &self.results
    }

    pub fn manifest(&self) -> &RunManifest {
        &self.manifest
    }

    /// Record the document's page count in the manifest.
    pub fn set_page_count(&mut self, count: usize) -> Result<()> {
        self.manifest.page_count = count;
        self.store.write_manifest(&self.manifest)
    }

    /// Append one page's classification and persist.
    ///
    /// Terms outside the canonical set are dropped. Sentences are appended in
    /// order, never deduplicated. Returns the number of sentences added.
    pub fn merge_page(&mut self, page: u32, classification: PageClassification) -> Result<usize> {
        let mut added = 0;
        for (term, sentences) in classification {
            if !self.terms.contains(&term) {
                warn!(page, term = %term, "dropping term outside the risk table");
                continue;
            }
            added += self.results.append(&term, sentences);
        }

        self.store.write_results(&self.results)?;
        self.manifest.mark_completed(page);
        self.store.write_manifest(&self.manifest)?;

        info!(page, added, "page merged");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("rc-acc-test-{}", uuid::Uuid::now_v7()))
    }

    fn identity(sha: &str) -> RunIdentity<'_> {
        table_identity(sha, "table-a")
    }

    fn table_identity<'a>(sha: &'a str, fingerprint: &'a str) -> RunIdentity<'a> {
        RunIdentity {
            document_name: "contract.pdf",
            document_sha256: sha,
            table_fingerprint: fingerprint,
            model: "test-model",
        }
    }

    fn page(entries: &[(&str, &[&str])]) -> PageClassification {
        entries
            .iter()
            .map(|(t, s)| (t.to_string(), s.iter().map(|x| x.to_string()).collect()))
            .collect()
    }

    #[test]
    fn new_run_seeds_skeleton() {
        let tmp = temp_dir();
        let store = RunStore::open(&tmp).unwrap();
        let terms = CanonicalTermSet::new(["T1", "T2"]);

        let acc = MergeAccumulator::open(store.clone(), terms, identity("sha-a"), false).unwrap();
        assert!(!acc.resumed());

        let stored = store.read_results().unwrap().unwrap();
        assert_eq!(stored.get("T1").unwrap().len(), 0);
        assert_eq!(stored.get("T2").unwrap().len(), 0);
        assert!(store.read_manifest().unwrap().is_some());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn merges_append_in_page_order() {
        let tmp = temp_dir();
        let store = RunStore::open(&tmp).unwrap();
        let terms = CanonicalTermSet::new(["T1", "T2"]);
        let mut acc =
            MergeAccumulator::open(store.clone(), terms, identity("sha-a"), false).unwrap();

        acc.merge_page(1, page(&[("T1", &["clause a"])])).unwrap();
        acc.merge_page(2, page(&[("T1", &["clause b", "clause a"]), ("T2", &["clause c"])]))
            .unwrap();

        assert_eq!(
            acc.results().get("T1").unwrap(),
            ["clause a", "clause b", "clause a"]
        );
        assert_eq!(acc.results().get("T2").unwrap(), ["clause c"]);

        // Persisted after every page.
        assert_eq!(store.read_results().unwrap().unwrap(), *acc.results());
        assert_eq!(
            store.read_manifest().unwrap().unwrap().pages_completed,
            vec![1, 2]
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn unknown_terms_are_dropped() {
        let tmp = temp_dir();
        let store = RunStore::open(&tmp).unwrap();
        let mut acc = MergeAccumulator::open(
            store,
            CanonicalTermSet::new(["T1"]),
            identity("sha-a"),
            false,
        )
        .unwrap();

        let added = acc
            .merge_page(1, page(&[("T1", &["kept"]), ("Bogus", &["dropped"])]))
            .unwrap();
        assert_eq!(added, 1);
        assert!(acc.results().get("Bogus").is_none());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn same_document_resumes() {
        let tmp = temp_dir();
        let store = RunStore::open(&tmp).unwrap();
        let terms = CanonicalTermSet::new(["T1"]);

        let mut first =
            MergeAccumulator::open(store.clone(), terms.clone(), identity("sha-a"), false)
                .unwrap();
        first.merge_page(1, page(&[("T1", &["clause a"])])).unwrap();
        let run_id = first.manifest().id.clone();
        drop(first);

        let second = MergeAccumulator::open(store, terms, identity("sha-a"), false).unwrap();
        assert!(second.resumed());
        assert!(second.is_completed(1));
        assert!(!second.is_completed(2));
        assert_eq!(second.manifest().id, run_id);
        assert_eq!(second.results().get("T1").unwrap(), ["clause a"]);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn different_document_or_fresh_starts_over() {
        let tmp = temp_dir();
        let store = RunStore::open(&tmp).unwrap();
        let terms = CanonicalTermSet::new(["T1"]);

        let mut first =
            MergeAccumulator::open(store.clone(), terms.clone(), identity("sha-a"), false)
                .unwrap();
        first.merge_page(1, page(&[("T1", &["clause a"])])).unwrap();

        let other =
            MergeAccumulator::open(store.clone(), terms.clone(), identity("sha-b"), false)
                .unwrap();
        assert!(!other.resumed());
        assert!(other.results().get("T1").unwrap().is_empty());

        let mut again =
            MergeAccumulator::open(store.clone(), terms.clone(), identity("sha-b"), false)
                .unwrap();
        again.merge_page(1, page(&[("T1", &["clause x"])])).unwrap();

        let fresh = MergeAccumulator::open(store, terms, identity("sha-b"), true).unwrap();
        assert!(!fresh.resumed());
        assert!(!fresh.is_completed(1));
        assert!(fresh.results().get("T1").unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn changed_risk_table_starts_over() {
        let tmp = temp_dir();
        let store = RunStore::open(&tmp).unwrap();

        let mut first = MergeAccumulator::open(
            store.clone(),
            CanonicalTermSet::new(["T1", "T2"]),
            table_identity("sha-a", "table-a"),
            false,
        )
        .unwrap();
        first.merge_page(1, page(&[("T2", &["old"])])).unwrap();
        drop(first);

        let second = MergeAccumulator::open(
            store.clone(),
            CanonicalTermSet::new(["T1", "T3"]),
            table_identity("sha-a", "table-b"),
            false,
        )
        .unwrap();
        assert!(!second.resumed());
        assert!(!second.is_completed(1));
        assert_eq!(second.results().terms().collect::<Vec<_>>(), vec!["T1", "T3"]);
        assert!(second.results().get("T2").is_none());

        let stored = store.read_results().unwrap().unwrap();
        assert!(stored.get("T2").is_none());
        assert_eq!(
            store.read_manifest().unwrap().unwrap().table_fingerprint,
            "table-b"
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
