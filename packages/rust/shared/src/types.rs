//! Core domain types for riskclause runs.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for the run manifest format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Band / RiskTerm
// ---------------------------------------------------------------------------

/// Severity band derived from a term's risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Low,
    Medium,
    High,
}

impl Band {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One scored row of the risk table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTerm {
    /// Unique term key (the `Contractual Terms` column).
    pub term: String,
    pub financial_impact: f64,
    pub probability: f64,
    /// `financial_impact * probability`.
    pub severity_score: f64,
    pub band: Band,
}

// ---------------------------------------------------------------------------
// CanonicalTermSet
// ---------------------------------------------------------------------------

/// The closed vocabulary a classification response must conform to.
///
/// Keeps table order; duplicate keys collapse onto their first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalTermSet {
    terms: Vec<String>,
    index: HashSet<String>,
}

impl CanonicalTermSet {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for term in terms {
            let term = term.into();
            if set.index.insert(term.clone()) {
                set.terms.push(term);
            }
        }
        set
    }

    pub fn contains(&self, term: &str) -> bool {
        self.index.contains(term)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The canonical term payload: every key mapped to an empty placeholder.
    pub fn skeleton(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .terms
            .iter()
            .map(|t| (t.clone(), serde_json::Value::Array(Vec::new())))
            .collect();
        serde_json::Value::Object(map)
    }
}

// ---------------------------------------------------------------------------
// BandPartitions
// ---------------------------------------------------------------------------

/// Term lists per severity band, as persisted in `bands.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandPartitions {
    /// Every term, in table order.
    pub all_items: Vec<String>,
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
}

impl BandPartitions {
    /// Band a term is listed under, checked high → medium → low.
    pub fn band_of(&self, term: &str) -> Option<Band> {
        let listed = |list: &[String]| list.iter().any(|t| t == term);
        if listed(&self.high) {
            Some(Band::High)
        } else if listed(&self.medium) {
            Some(Band::Medium)
        } else if listed(&self.low) {
            Some(Band::Low)
        } else {
            None
        }
    }

    pub fn bucket(&self, band: Band) -> &[String] {
        match band {
            Band::Low => &self.low,
            Band::Medium => &self.medium,
            Band::High => &self.high,
        }
    }
}

// ---------------------------------------------------------------------------
// PageText
// ---------------------------------------------------------------------------

/// Plain text of one page of the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number.
    pub index: u32,
    pub content: String,
}

impl PageText {
    pub fn new(index: u32, content: impl Into<String>) -> Self {
        Self {
            index,
            content: content.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Classification results
// ---------------------------------------------------------------------------

/// One page's parsed classification: term → extracted sentences.
pub type PageClassification = BTreeMap<String, Vec<String>>;

/// Running term → sentences collection for one document.
///
/// Every entry is a sequence: the first contribution creates it, later
/// contributions append. Nothing is ever removed or deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccumulatedResult(BTreeMap<String, Vec<String>>);

impl AccumulatedResult {
    /// Seed with every canonical term mapped to an empty sequence.
    pub fn from_terms(terms: &CanonicalTermSet) -> Self {
        Self(terms.iter().map(|t| (t.to_string(), Vec::new())).collect())
    }

    /// Append sentences under `term`; returns how many were added.
    pub fn append<I>(&mut self, term: &str, sentences: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let entry = self.0.entry(term.to_string()).or_default();
        let before = entry.len();
        entry.extend(sentences);
        entry.len() - before
    }

    pub fn get(&self, term: &str) -> Option<&[String]> {
        self.0.get(term).map(Vec::as_slice)
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn sentence_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

/// The three-bucket end result of a run, as written to `report.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReport {
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
}

impl FinalReport {
    pub fn bucket_mut(&mut self, band: Band) -> &mut Vec<String> {
        match band {
            Band::Low => &mut self.low,
            Band::Medium => &mut self.medium,
            Band::High => &mut self.high,
        }
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// RunManifest
// ---------------------------------------------------------------------------

/// The `run.json` structure stored at the root of each run directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    pub id: RunId,
    /// File name of the analyzed document.
    pub document_name: String,
    /// SHA-256 of the document bytes; a resumed run must match it.
    pub document_sha256: String,
    /// Fingerprint of the risk table's band partitions; a resumed run must
    /// match it. Manifests written without one never resume.
    #[serde(default)]
    pub table_fingerprint: String,
    /// Pages in the document, once segmentation has counted them.
    #[serde(default)]
    pub page_count: usize,
    /// Pages whose classification has been merged into `results.json`.
    #[serde(default)]
    pub pages_completed: Vec<u32>,
    /// Model used for classification.
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunManifest {
    pub fn new(
        document_name: &str,
        document_sha256: &str,
        table_fingerprint: &str,
        model: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            id: RunId::new(),
            document_name: document_name.to_string(),
            document_sha256: document_sha256.to_string(),
            table_fingerprint: table_fingerprint.to_string(),
            page_count: 0,
            pages_completed: Vec::new(),
            model: model.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self, page: u32) -> bool {
        self.pages_completed.contains(&page)
    }

    pub fn mark_completed(&mut self, page: u32) {
        if !self.is_completed(page) {
            self.pages_completed.push(page);
            self.pages_completed.sort_unstable();
        }
        self.updated_at = Utc::now();
    }
}
