use crate::cell::CellValue;
use crate::error::ChartResult;
use crate::workbook::{Sheet, Workbook};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::path::Path;

/// Message carried by [`SummaryOutcome::InsufficientData`].
pub const INSUFFICIENT_DATA: &str = "Insufficient data for analysis";

/// Descriptive statistics of one column.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSummary {
    pub header: String,

    /// Values that are neither absent nor an empty string
    pub total_values: usize,

    /// How many of those read as a number
    pub numeric_values: usize,

    /// Distinct raw values; `10` and `"10"` count twice
    pub unique_values: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
}

/// Statistics for every named column of a sheet.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSummary {
    pub sheet_name: String,

    /// Data rows, blank ones included
    pub total_rows: usize,

    /// Width of the raw header row
    pub total_columns: usize,

    pub column_stats: Vec<ColumnSummary>,
}

/// Outcome of summarizing a sheet.
///
/// A sheet without data rows is not an error: it yields
/// `InsufficientData`, which serializes as `{"error": "..."}`.
#[derive(Clone, Debug, PartialEq)]
pub enum SummaryOutcome {
    Summary(SheetSummary),
    InsufficientData,
}

impl SummaryOutcome {
    pub fn summary(&self) -> Option<&SheetSummary> {
        match self {
            SummaryOutcome::Summary(s) => Some(s),
            SummaryOutcome::InsufficientData => None,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, SummaryOutcome::InsufficientData)
    }
}

impl Serialize for SummaryOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SummaryOutcome::Summary(summary) => summary.serialize(serializer),
            SummaryOutcome::InsufficientData => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", INSUFFICIENT_DATA)?;
                map.end()
            }
        }
    }
}

fn summarize_column(header: String, values: Vec<&CellValue>) -> ColumnSummary {
    let unique_values = values
        .iter()
        .map(|v| v.distinct_key())
        .collect::<HashSet<_>>()
        .len();
    let numbers: Vec<f64> = values.iter().filter_map(|v| v.to_number()).collect();

    let mut summary = ColumnSummary {
        header,
        total_values: values.len(),
        numeric_values: numbers.len(),
        unique_values,
        min: None,
        max: None,
        sum: None,
        avg: None,
    };

    if !numbers.is_empty() {
        let sum: f64 = numbers.iter().sum();
        summary.min = numbers.iter().copied().reduce(f64::min);
        summary.max = numbers.iter().copied().reduce(f64::max);
        summary.sum = Some(sum);
        summary.avg = Some(sum / numbers.len() as f64);
    }

    summary
}

/// Computes per-column statistics for a sheet.
///
/// Columns are visited in header-row order; columns whose header is falsy
/// (empty, `0`, `false`) are skipped. For each column, the non-blank cells of every data row are
/// counted, distinct raw values are counted, and min/max/sum/avg are
/// computed over the cells that read as numbers (left out when there are
/// none).
///
/// # Returns
/// * `SummaryOutcome::InsufficientData` if the sheet has fewer than 2 rows
pub fn summarize(sheet: &Sheet) -> SummaryOutcome {
    if sheet.total_rows() < 2 {
        return SummaryOutcome::InsufficientData;
    }

    let header_row = sheet.header_row();
    let column_stats = header_row
        .iter()
        .enumerate()
        .filter(|(_, header)| header.is_truthy())
        .map(|(index, header)| {
            let values = sheet
                .data_rows()
                .iter()
                .map(|row| Sheet::cell(row, index))
                .filter(|cell| !cell.is_blank())
                .collect();
            summarize_column(header.to_string(), values)
        })
        .collect();

    SummaryOutcome::Summary(SheetSummary {
        sheet_name: sheet.name().to_string(),
        total_rows: sheet.data_rows().len(),
        total_columns: header_row.len(),
        column_stats,
    })
}

/// Opens a workbook and summarizes one of its sheets.
///
/// # Errors
/// * `ChartError::Parse` if the workbook cannot be read
/// * `ChartError::SheetNotFound` if the sheet does not exist
pub fn summarize_sheet(path: impl AsRef<Path>, sheet_name: &str) -> ChartResult<SummaryOutcome> {
    let workbook = Workbook::open(path)?;
    Ok(summarize(workbook.sheet(sheet_name)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn n(v: f64) -> CellValue {
        CellValue::Number(v)
    }

    #[test]
    fn mixed_column_statistics() {
        let sheet = Sheet::new(
            "S",
            vec![
                vec![t("Amount")],
                vec![n(10.0)],
                vec![t("abc")],
                vec![n(20.0)],
                vec![t("")],
            ],
        );
        let outcome = summarize(&sheet);
        let column = &outcome.summary().unwrap().column_stats[0];

        assert_eq!(column.total_values, 3);
        assert_eq!(column.numeric_values, 2);
        assert_eq!(column.unique_values, 3);
        assert_eq!(column.min, Some(10.0));
        assert_eq!(column.max, Some(20.0));
        assert_eq!(column.sum, Some(30.0));
        assert_eq!(column.avg, Some(15.0));
    }

    #[test]
    fn text_only_column_has_no_numeric_stats() {
        let sheet = Sheet::new(
            "S",
            vec![vec![t("Name"), CellValue::Empty, t("Tag")], vec![t("a"), n(1.0), t("x")], vec![t("a"), n(2.0)]],
        );
        let summary = summarize(&sheet).summary().cloned().unwrap();

        assert_eq!(summary.total_rows, 2);
        assert_eq!(summary.total_columns, 3);
        // the column without a header is skipped
        let headers: Vec<&str> = summary.column_stats.iter().map(|c| c.header.as_str()).collect();
        assert_eq!(headers, vec!["Name", "Tag"]);

        let name = &summary.column_stats[0];
        assert_eq!(name.unique_values, 1);
        assert_eq!(name.min, None);

        let json = serde_json::to_value(name).unwrap();
        assert!(json.get("min").is_none());
        assert_eq!(json["totalValues"], 2);

        assert_eq!(summary.column_stats[1].total_values, 1);
    }

    #[test]
    fn header_only_sheet_is_insufficient() {
        let sheet = Sheet::new("S", vec![vec![t("A"), t("B")]]);
        let outcome = summarize(&sheet);
        assert!(outcome.is_insufficient());
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({ "error": INSUFFICIENT_DATA })
        );
        assert!(summarize(&Sheet::new("Empty", Vec::new())).is_insufficient());
    }

    #[test]
    fn numbers_and_their_text_are_distinct() {
        let sheet = Sheet::new("S", vec![vec![t("v")], vec![n(10.0)], vec![t("10")], vec![n(10.0)]]);
        let column = summarize(&sheet).summary().unwrap().column_stats[0].clone();
        assert_eq!(column.unique_values, 2);
        assert_eq!(column.numeric_values, 3);
        assert_eq!(column.sum, Some(30.0));
    }

    #[test]
    fn falsy_headers_are_skipped() {
        let sheet = Sheet::new(
            "S",
            vec![
                vec![n(0.0), t(""), CellValue::Bool(false), t("kept")],
                vec![n(1.0), n(2.0), n(3.0), n(4.0)],
            ],
        );
        let outcome = summarize(&sheet);
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.total_columns, 4);
        assert_eq!(summary.column_stats.len(), 1);
        assert_eq!(summary.column_stats[0].header, "kept");
    }
}
