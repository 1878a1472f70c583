//! End-to-end `analyze` pipeline: risk table + PDF → classified pages → report.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use riskclause_classifier::{Classifier, CompletionService};
use riskclause_riskmodel::{RiskModel, build_risk_model};
use riskclause_shared::{BandPartitions, FinalReport, PageText, Result};
use riskclause_storage::RunStore;

use crate::accumulator::{MergeAccumulator, RunIdentity};
use crate::aggregator::finalize;

/// Configuration for the `analyze` pipeline.
#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    /// Display name of the document (usually its file name).
    pub document_name: String,
    /// Path to the risk table.
    pub risk_table: PathBuf,
    /// Run directory for bands, results, manifest, and report.
    pub work_dir: PathBuf,
    /// Discard stored state instead of resuming.
    pub fresh: bool,
}

/// Result of the `analyze` pipeline.
#[derive(Debug)]
pub struct AnalyzeResult {
    pub work_dir: PathBuf,
    pub report: FinalReport,
    /// Pages in the document.
    pub pages_total: usize,
    /// Pages classified and merged in this invocation.
    pub pages_classified: usize,
    /// Pages already merged by an earlier, interrupted invocation.
    pub pages_resumed: usize,
    /// Pages whose classification failed and were skipped.
    pub pages_failed: usize,
    /// Sentences merged in this invocation.
    pub sentences_added: usize,
    /// Whether stored state was resumed.
    pub resumed: bool,
    pub elapsed: Duration,
}

/// What happened to one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Merged { sentences: usize },
    AlreadyMerged,
    Failed,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a page has been handled.
    fn page_done(&self, page: u32, total: usize, outcome: PageOutcome);
    /// Called when the pipeline completes.
    fn done(&self, result: &AnalyzeResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_done(&self, _page: u32, _total: usize, _outcome: PageOutcome) {}
    fn done(&self, _result: &AnalyzeResult) {}
}

/// Hex SHA-256 of the document bytes, used to match a run to its document.
pub fn document_sha256(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hex SHA-256 over the band partitions, used to match a run to its risk table.
///
/// Any change to the term list or to a term's band gives a new fingerprint.
pub fn table_fingerprint(bands: &BandPartitions) -> String {
    let mut hasher = Sha256::new();
    for (label, terms) in [
        ("all", &bands.all_items),
        ("high", &bands.high),
        ("medium", &bands.medium),
        ("low", &bands.low),
    ] {
        hasher.update(label.as_bytes());
        hasher.update(b"\x1e");
        for term in terms {
            hasher.update(term.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\x1d");
    }
    format!("{:x}", hasher.finalize())
}

/// Run the full `analyze` pipeline over PDF bytes.
///
/// 1. Build the risk model from the table
/// 2. Open and segment the document
/// 3. Classify and merge each page
/// 4. Aggregate into the final report
///
/// Risk table and document errors abort before any page is classified.
#[instrument(skip_all, fields(document = %config.document_name))]
pub async fn analyze_document<S: CompletionService>(
    config: &AnalyzeConfig,
    document: &[u8],
    classifier: &Classifier<S>,
    progress: &dyn ProgressReporter,
) -> Result<AnalyzeResult> {
    progress.phase("Building risk model");
    let model = build_risk_model(&config.risk_table)?;

    progress.phase("Opening document");
    let pages = riskclause_segmenter::segment(document)?;
    let sha = document_sha256(document);

    analyze_pages(config, &model, &sha, pages, classifier, progress).await
}

/// Classify, merge, and aggregate an already segmented document.
#[instrument(skip_all, fields(document = %config.document_name, pages = pages.len()))]
pub async fn analyze_pages<S, P>(
    config: &AnalyzeConfig,
    model: &RiskModel,
    document_sha256: &str,
    pages: P,
    classifier: &Classifier<S>,
    progress: &dyn ProgressReporter,
) -> Result<AnalyzeResult>
where
    S: CompletionService,
    P: ExactSizeIterator<Item = PageText>,
{
    let start = Instant::now();
    let total = pages.len();

    // --- Phase 1: Run directory ---
    progress.phase("Preparing run directory");
    let store = RunStore::open(&config.work_dir)?;
    let terms = model.canonical_terms();
    let bands = model.partitions();
    let fingerprint = table_fingerprint(&bands);

    let mut accumulator = MergeAccumulator::open(
        store.clone(),
        terms.clone(),
        RunIdentity {
            document_name: &config.document_name,
            document_sha256,
            table_fingerprint: &fingerprint,
            model: &classifier.config().model,
        },
        config.fresh,
    )?;
    store.write_bands(&bands)?;
    accumulator.set_page_count(total)?;
    let resumed = accumulator.resumed();

    // --- Phase 2: Classify & merge ---
    progress.phase("Classifying pages");
    let interval = classifier.config().page_interval;
    let mut requested = false;
    let (mut classified, mut already, mut failed, mut sentences_added) = (0, 0, 0, 0);

    for page in pages {
        if accumulator.is_completed(page.index) {
            already += 1;
            progress.page_done(page.index, total, PageOutcome::AlreadyMerged);
            continue;
        }

        if !page.is_blank() {
            if requested && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            requested = true;
        }

        let outcome = match classifier.classify_page(&page, &terms).await {
            Ok(classification) => {
                let added = accumulator.merge_page(page.index, classification)?;
                classified += 1;
                sentences_added += added;
                PageOutcome::Merged { sentences: added }
            }
            Err(e) if e.is_page_local() => {
                warn!(page = page.index, error = %e, "classification failed, skipping page");
                failed += 1;
                PageOutcome::Failed
            }
            Err(e) => return Err(e),
        };
        progress.page_done(page.index, total, outcome);
    }

    // --- Phase 3: Aggregate ---
    progress.phase("Aggregating report");
    let report = finalize(&store)?;

    let result = AnalyzeResult {
        work_dir: config.work_dir.clone(),
        report,
        pages_total: total,
        pages_classified: classified,
        pages_resumed: already,
        pages_failed: failed,
        sentences_added,
        resumed,
        elapsed: start.elapsed(),
    };

    info!(
        pages = total,
        classified,
        resumed_pages = already,
        failed,
        sentences_total = accumulator.results().sentence_count(),
        high = result.report.high.len(),
        medium = result.report.medium.len(),
        low = result.report.low.len(),
        elapsed_ms = result.elapsed.as_millis() as u64,
        "analysis complete"
    );

    progress.done(&result);
    Ok(result)
}
