//! Risk table loading.
//!
//! Reads the scored reference table from CSV or a spreadsheet workbook and
//! returns one [`RiskRow`] per data row. Header matching is exact after
//! trimming; the first worksheet is used for workbooks.

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};

use riskclause_shared::{Result, RiskClauseError};

/// Column holding the term identifier.
pub const TERM_COLUMN: &str = "Contractual Terms";

/// Column holding the financial impact.
pub const IMPACT_COLUMN: &str = "Financial Impact";

/// Column holding the probability of occurrence.
pub const PROBABILITY_COLUMN: &str = "Probability of happening";

/// One raw data row of the risk table.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskRow {
    pub term: String,
    pub financial_impact: f64,
    pub probability: f64,
}

/// Supported risk table formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Workbook,
}

impl TableFormat {
    /// Detect the format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "xlsm" | "xls" | "ods" => Ok(Self::Workbook),
            _ => Err(RiskClauseError::data(format!(
                "unsupported risk table format '{}': expected .csv, .xlsx, .xls or .ods",
                path.display()
            ))),
        }
    }
}

/// Load every data row from the risk table at `path`.
pub fn load_rows(path: &Path) -> Result<Vec<RiskRow>> {
    let format = TableFormat::from_path(path)?;

    if !path.is_file() {
        return Err(RiskClauseError::data(format!(
            "risk table not found: {}",
            path.display()
        )));
    }

    let rows = match format {
        TableFormat::Csv => read_csv(path)?,
        TableFormat::Workbook => read_workbook(path)?,
    };

    if rows.is_empty() {
        return Err(RiskClauseError::data(format!(
            "risk table is empty: {}",
            path.display()
        )));
    }

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Cell abstraction
// ---------------------------------------------------------------------------

/// A cell value as read from either backend.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::Empty
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => Self::Empty,
            Data::Float(f) => Self::Number(*f),
            Data::Int(i) => Self::Number(*i as f64),
            Data::String(s) => Self::from_text(s),
            other => Self::from_text(&other.to_string()),
        }
    }
}

/// Indexes of the three required columns within a header row.
#[derive(Debug, Clone, Copy)]
struct Columns {
    term: usize,
    impact: usize,
    probability: usize,
}

impl Columns {
    fn locate(headers: &[String]) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| {
                    RiskClauseError::data(format!("missing expected column: '{name}'"))
                })
        };

        Ok(Self {
            term: find(TERM_COLUMN)?,
            impact: find(IMPACT_COLUMN)?,
            probability: find(PROBABILITY_COLUMN)?,
        })
    }
}

/// Turn one row of cells into a [`RiskRow`]. `line` is the 1-based table row.
fn build_row(cells: &[Cell], columns: Columns, line: usize) -> Result<RiskRow> {
    let cell = |idx: usize| cells.get(idx).unwrap_or(&Cell::Empty);

    let term = match cell(columns.term) {
        Cell::Text(s) => s.clone(),
        Cell::Number(n) => n.to_string(),
        Cell::Empty => {
            return Err(RiskClauseError::data(format!(
                "row {line}: missing value for '{TERM_COLUMN}'"
            )));
        }
    };

    Ok(RiskRow {
        financial_impact: number(cell(columns.impact), IMPACT_COLUMN, line)?,
        probability: number(cell(columns.probability), PROBABILITY_COLUMN, line)?,
        term,
    })
}

fn number(cell: &Cell, column: &str, line: usize) -> Result<f64> {
    let value = match cell {
        Cell::Number(n) => *n,
        Cell::Text(s) => s.parse::<f64>().map_err(|_| {
            RiskClauseError::malformed(format!(
                "row {line}: '{column}' is not numeric: '{s}'"
            ))
        })?,
        Cell::Empty => {
            return Err(RiskClauseError::data(format!(
                "row {line}: missing value for '{column}'"
            )));
        }
    };

    if !value.is_finite() {
        return Err(RiskClauseError::malformed(format!(
            "row {line}: '{column}' is not a finite number"
        )));
    }

    Ok(value)
}

/// Rows where every cell is empty are trailing padding, not data.
fn is_blank_row(cells: &[Cell]) -> bool {
    cells.iter().all(|c| *c == Cell::Empty)
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

fn read_csv(path: &Path) -> Result<Vec<RiskRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| RiskClauseError::data(format!("{}: {e}", path.display())))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| RiskClauseError::data(format!("{}: {e}", path.display())))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.is_empty() {
        return Err(RiskClauseError::data(format!(
            "risk table is empty: {}",
            path.display()
        )));
    }

    let columns = Columns::locate(&headers)?;
    let mut rows = Vec::new();

    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            RiskClauseError::data(format!("{}: row {}: {e}", path.display(), i + 1))
        })?;
        let cells: Vec<Cell> = record.iter().map(Cell::from_text).collect();
        if is_blank_row(&cells) {
            continue;
        }
        rows.push(build_row(&cells, columns, i + 1)?);
    }

    Ok(rows)
}

fn read_workbook(path: &Path) -> Result<Vec<RiskRow>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| RiskClauseError::data(format!("{}: {e}", path.display())))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| {
            RiskClauseError::data(format!("risk table has no worksheets: {}", path.display()))
        })?
        .map_err(|e| RiskClauseError::data(format!("{}: {e}", path.display())))?;

    let mut iter = range.rows();
    let Some(header_row) = iter.next() else {
        return Err(RiskClauseError::data(format!(
            "risk table is empty: {}",
            path.display()
        )));
    };

    let headers: Vec<String> = header_row.iter().map(|d| d.to_string()).collect();
    let columns = Columns::locate(&headers)?;
    let mut rows = Vec::new();

    for (i, row) in iter.enumerate() {
        let cells: Vec<Cell> = row.iter().map(Cell::from_data).collect();
        if is_blank_row(&cells) {
            continue;
        }
        rows.push(build_row(&cells, columns, i + 1)?);
    }

    Ok(rows)
}
