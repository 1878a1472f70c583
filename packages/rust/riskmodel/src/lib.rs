//! Risk model construction from a scored reference table.
//!
//! Each row of the risk table names a contractual term with its financial
//! impact and probability of occurrence. The product of the two is the
//! term's severity score, which places it in exactly one [`Band`]. The
//! resulting term list is the closed vocabulary handed to the classifier,
//! and the band partitions drive the final report.

mod table;

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, instrument};

use riskclause_shared::{Band, BandPartitions, CanonicalTermSet, Result, RiskClauseError, RiskTerm};

pub use table::{
    IMPACT_COLUMN, PROBABILITY_COLUMN, RiskRow, TERM_COLUMN, TableFormat, load_rows,
};

/// Highest score that still counts as low severity.
pub const LOW_CEILING: f64 = 25.0;

/// Highest score that still counts as medium severity.
pub const MEDIUM_CEILING: f64 = 75.0;

/// Band for a severity score: `<= 25` low, `<= 75` medium, above that high.
pub fn band_for_score(score: f64) -> Band {
    if score <= LOW_CEILING {
        Band::Low
    } else if score <= MEDIUM_CEILING {
        Band::Medium
    } else {
        Band::High
    }
}

// ---------------------------------------------------------------------------
// RiskModel
// ---------------------------------------------------------------------------

/// Immutable, scored term set built from one risk table.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskModel {
    terms: Vec<RiskTerm>,
}

impl RiskModel {
    /// Score and band every row. Fails on an empty table or a repeated term.
    pub fn from_rows(rows: Vec<RiskRow>) -> Result<Self> {
        if rows.is_empty() {
            return Err(RiskClauseError::data("risk table has no rows"));
        }

        let mut seen = HashSet::new();
        let mut terms = Vec::with_capacity(rows.len());

        for row in rows {
            if !seen.insert(row.term.clone()) {
                return Err(RiskClauseError::data(format!(
                    "duplicate term in risk table: '{}'",
                    row.term
                )));
            }

            let severity_score = row.financial_impact * row.probability;
            terms.push(RiskTerm {
                band: band_for_score(severity_score),
                term: row.term,
                financial_impact: row.financial_impact,
                probability: row.probability,
                severity_score,
            });
        }

        Ok(Self { terms })
    }

    pub fn terms(&self) -> &[RiskTerm] {
        &self.terms
    }

    /// Term keys in table order.
    pub fn canonical_terms(&self) -> CanonicalTermSet {
        CanonicalTermSet::new(self.terms.iter().map(|t| t.term.clone()))
    }

    /// The all-terms list plus one list per band.
    pub fn partitions(&self) -> BandPartitions {
        let in_band = |band: Band| -> Vec<String> {
            self.terms
                .iter()
                .filter(|t| t.band == band)
                .map(|t| t.term.clone())
                .collect()
        };

        BandPartitions {
            all_items: self.terms.iter().map(|t| t.term.clone()).collect(),
            high: in_band(Band::High),
            medium: in_band(Band::Medium),
            low: in_band(Band::Low),
        }
    }
}

/// Load the risk table at `path` and build the model.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn build_risk_model(path: &Path) -> Result<RiskModel> {
    let rows = load_rows(path)?;
    let model = RiskModel::from_rows(rows)?;

    let partitions = model.partitions();
    info!(
        terms = model.terms.len(),
        high = partitions.high.len(),
        medium = partitions.medium.len(),
        low = partitions.low.len(),
        "risk model built"
    );

    Ok(model)
}
