//! Final aggregation of accumulated sentences into severity buckets.

use tracing::{debug, info, instrument};

use riskclause_shared::{
    AccumulatedResult, Band, BandPartitions, FinalReport, Result, RiskClauseError,
};
use riskclause_storage::RunStore;

/// Bucket every accumulated sentence by its term's band.
///
/// Buckets keep table order of terms, then merge order of sentences. Terms
/// that are in no band contribute nothing.
pub fn aggregate(results: &AccumulatedResult, bands: &BandPartitions) -> FinalReport {
    let mut report = FinalReport::default();

    for band in [Band::High, Band::Medium, Band::Low] {
        for term in bands.bucket(band) {
            if let Some(sentences) = results.get(term) {
                report.bucket_mut(band).extend(sentences.iter().cloned());
            }
        }
    }

    for term in results.terms() {
        if bands.band_of(term).is_none() {
            debug!(term, "term has no band, dropped from report");
        }
    }

    report
}

/// Aggregate the stored run without writing anything.
pub fn aggregate_run(store: &RunStore) -> Result<FinalReport> {
    let bands = store
        .read_bands()?
        .ok_or_else(|| RiskClauseError::Storage("run has no bands.json".into()))?;
    let results = store
        .read_results()?
        .ok_or_else(|| RiskClauseError::Storage("run has no results.json".into()))?;
    Ok(aggregate(&results, &bands))
}

/// Aggregate the stored run and write `report.json`.
#[instrument(skip_all, fields(dir = %store.dir().display()))]
pub fn finalize(store: &RunStore) -> Result<FinalReport> {
    let report = aggregate_run(store)?;
    store.write_report(&report)?;
    info!(
        high = report.high.len(),
        medium = report.medium.len(),
        low = report.low.len(),
        "report written"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskclause_shared::CanonicalTermSet;

    fn bands() -> BandPartitions {
        BandPartitions {
            all_items: vec!["T1".into(), "T2".into(), "T3".into()],
            high: vec!["T2".into()],
            medium: vec![],
            low: vec!["T3".into(), "T1".into()],
        }
    }

    fn results(entries: &[(&str, &[&str])]) -> AccumulatedResult {
        let mut results = AccumulatedResult::default();
        for (term, sentences) in entries {
            results.append(term, sentences.iter().map(|s| s.to_string()));
        }
        results
    }

    #[test]
    fn buckets_by_band() {
        let results = results(&[
            ("T1", &["clause a", "clause b"]),
            ("T2", &["clause c"]),
            ("T3", &[]),
        ]);
        let report = aggregate(&results, &bands());

        assert_eq!(report.high, vec!["clause c"]);
        assert!(report.medium.is_empty());
        assert_eq!(report.low, vec!["clause a", "clause b"]);
    }

    #[test]
    fn bucket_follows_table_order_of_terms() {
        let results = results(&[("T1", &["from t1"]), ("T3", &["from t3"])]);
        let report = aggregate(&results, &bands());
        assert_eq!(report.low, vec!["from t3", "from t1"]);
    }

    #[test]
    fn unbanded_terms_are_dropped() {
        let results = results(&[("T1", &["clause a"]), ("Orphan", &["lost"])]);
        let report = aggregate(&results, &bands());
        assert_eq!(report.len(), 1);
        assert!(!report.low.contains(&"lost".to_string()));
    }

    #[test]
    fn aggregation_is_idempotent() {
        let results = results(&[("T1", &["a"]), ("T2", &["b"])]);
        let first = aggregate(&results, &bands());
        let second = aggregate(&results, &bands());
        assert_eq!(first, second);
    }

    #[test]
    fn empty_results_give_empty_report() {
        let terms = CanonicalTermSet::new(["T1", "T2"]);
        let report = aggregate(&AccumulatedResult::from_terms(&terms), &bands());
        assert!(report.is_empty());
    }

    #[test]
    fn finalize_writes_report() {
        let tmp = std::env::temp_dir().join(format!("rc-agg-test-{}", uuid::Uuid::now_v7()));
        let store = RunStore::open(&tmp).unwrap();

        let err = finalize(&store).unwrap_err();
        assert!(matches!(err, RiskClauseError::Storage(_)));

        store.write_bands(&bands()).unwrap();
        store
            .write_results(&results(&[("T2", &["clause c"])]))
            .unwrap();

        let report = finalize(&store).unwrap();
        assert_eq!(store.read_report().unwrap().unwrap(), report);
        assert_eq!(report.high, vec!["clause c"]);

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
