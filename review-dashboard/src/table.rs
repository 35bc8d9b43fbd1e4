//! Review records and their plain-text rendering

use crate::platform::QueryResult;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;

pub const PRODUCT_COLUMN: &str = "PRODUCT";
pub const STATUS_COLUMN: &str = "STATUS";
pub const SCORE_COLUMN: &str = "SENTIMENT_SCORE";

/// Rendering used for null cells in text output
const NULL_TEXT: &str = "None";

/// Errors turning a query result into review records
#[derive(Error, Debug, PartialEq)]
pub enum TableError {
    #[error("Result is missing required column {0}")]
    MissingColumn(&'static str),

    #[error("Row {row}: sentiment score {value:?} is not a number")]
    InvalidScore { row: usize, value: String },
}

/// One scored review
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRecord {
    pub product: Option<String>,
    pub status: Option<String>,
    pub sentiment_score: Option<f64>,
    /// Every column of the source row, in table column order
    pub values: Vec<Option<String>>,
}

/// Review rows plus the column names they came with
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewTable {
    pub columns: Vec<String>,
    pub records: Vec<ReviewRecord>,
}

/// Text rendering that may have dropped trailing rows
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTable {
    pub text: String,
    pub omitted_rows: usize,
}

impl ReviewTable {
    /// Validate required columns and parse scores
    pub fn from_query(result: QueryResult) -> Result<Self, TableError> {
        let product = result
            .column_index(PRODUCT_COLUMN)
            .ok_or(TableError::MissingColumn(PRODUCT_COLUMN))?;
        let status = result
            .column_index(STATUS_COLUMN)
            .ok_or(TableError::MissingColumn(STATUS_COLUMN))?;
        let score = result
            .column_index(SCORE_COLUMN)
            .ok_or(TableError::MissingColumn(SCORE_COLUMN))?;

        let mut records = Vec::with_capacity(result.rows.len());
        for (row, values) in result.rows.into_iter().enumerate() {
            let sentiment_score = match values.get(score).and_then(|v| v.as_deref()) {
                None => None,
                Some(raw) => Some(raw.trim().parse::<f64>().map_err(|_| {
                    TableError::InvalidScore {
                        row,
                        value: raw.to_string(),
                    }
                })?),
            };

            records.push(ReviewRecord {
                product: values.get(product).cloned().flatten(),
                status: values.get(status).cloned().flatten(),
                sentiment_score,
                values,
            });
        }

        Ok(Self {
            columns: result.columns,
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Full fixed-width rendering with a leading row index
    pub fn to_text(&self) -> String {
        render_text(&self.columns, &self.records)
    }

    /// Rendering bounded to `max_chars`; drops whole trailing rows on overflow
    pub fn to_text_within(&self, max_chars: usize) -> RenderedTable {
        let full = self.to_text();
        if full.chars().count() <= max_chars || self.records.is_empty() {
            return RenderedTable {
                text: full,
                omitted_rows: 0,
            };
        }

        let (mut text, rows) = render_lines(&self.columns, &self.records);
        // Sized for the worst case so the marker always fits
        let marker_budget = omitted_marker(rows.len()).chars().count() + 1;
        let mut used = text.chars().count() + marker_budget;
        let mut kept = 0;

        for row in &rows {
            let cost = row.chars().count() + 1;
            if used + cost > max_chars {
                break;
            }
            text.push('\n');
            text.push_str(row);
            used += cost;
            kept += 1;
        }

        let omitted_rows = rows.len() - kept;
        text.push('\n');
        text.push_str(&omitted_marker(omitted_rows));
        RenderedTable { text, omitted_rows }
    }
}

fn omitted_marker(rows: usize) -> String {
    format!("... [{} more rows omitted]", rows)
}

/// Render rows as an aligned text grid: index column left-aligned, values
/// right-aligned, two spaces between columns.
pub fn render_text(columns: &[String], records: &[ReviewRecord]) -> String {
    if records.is_empty() {
        return format!("Empty table\nColumns: [{}]\nIndex: []", columns.join(", "));
    }

    let (mut out, rows) = render_lines(columns, records);
    for row in rows {
        out.push('\n');
        out.push_str(&row);
    }
    out
}

/// Header line plus exactly one line per record
fn render_lines(columns: &[String], records: &[ReviewRecord]) -> (String, Vec<String>) {
    let index_width = records.len().saturating_sub(1).to_string().len();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            records
                .iter()
                .map(|r| cell_text(r, i).chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut header = " ".repeat(index_width);
    for (name, width) in columns.iter().zip(&widths) {
        header.push_str(&format!("  {:>width$}", name, width = width));
    }

    let rows = records
        .iter()
        .enumerate()
        .map(|(row, record)| {
            let mut line = format!("{:<width$}", row, width = index_width);
            for (i, width) in widths.iter().enumerate() {
                let cell = cell_text(record, i);
                line.push_str(&format!("  {:>width$}", &*cell, width = width));
            }
            line
        })
        .collect();

    (header, rows)
}

/// Cell value with line breaks escaped so a record never spans lines
fn cell_text(record: &ReviewRecord, column: usize) -> Cow<'_, str> {
    let text = record
        .values
        .get(column)
        .and_then(|v| v.as_deref())
        .unwrap_or(NULL_TEXT);

    if text.contains(['\n', '\r']) {
        Cow::Owned(text.replace('\r', "\\r").replace('\n', "\\n"))
    } else {
        Cow::Borrowed(text)
    }
}
