use crate::cell::CellValue;
use crate::colors::generate_colors;
use crate::error::{ChartError, ChartResult};
use crate::workbook::{Sheet, SheetData, Workbook};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Rows read per extraction when the caller gives no limit.
pub const DEFAULT_ROW_LIMIT: usize = 1000;

/// One data series of a 2D chart, shaped for a chart.js dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// `"<y axis> vs <x axis>"`
    pub label: String,
    pub data: Vec<f64>,
    pub background_color: Vec<String>,
    pub border_color: Vec<String>,
}

/// Labels plus series for bar, line, pie, scatter and doughnut charts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartData2D {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

/// A point of a 3D chart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub label: String,
}

/// Chart payload as stored with a chart definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartData {
    Flat(ChartData2D),
    Spatial(Vec<Point3D>),
}

impl ChartData2D {
    /// Number of retained points.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Resolves the positional index of an axis in the raw header row.
fn axis_index(sheet: &Sheet, axis: &str) -> ChartResult<usize> {
    sheet
        .column_index(axis)
        .ok_or_else(|| ChartError::ColumnNotFound(axis.to_string()))
}

fn require_rows(sheet: &Sheet) -> ChartResult<()> {
    if sheet.total_rows() < 2 {
        return Err(ChartError::InsufficientRows(sheet.name().to_string()));
    }
    Ok(())
}

/// The first `limit` data rows, blank ones included.
fn limited_rows(sheet: &Sheet, limit: Option<usize>) -> &[Vec<CellValue>] {
    let rows = sheet.data_rows();
    &rows[..rows.len().min(limit.unwrap_or(DEFAULT_ROW_LIMIT))]
}

/// Builds a single-series 2D chart from two columns of a sheet.
///
/// The row limit is applied before filtering. A row is kept when its X
/// cell is present and its Y cell is neither absent nor an empty string.
/// Each kept row contributes its X cell as label and its Y cell, read as a
/// number (0 when not numeric), as value. Colors are assigned by position
/// among the kept rows.
///
/// # Arguments
/// * `sheet` - Sheet to read from
/// * `x_axis` - Header of the label column
/// * `y_axis` - Header of the value column
/// * `limit` - Maximum number of data rows to read, `None` for 1000
///
/// # Errors
/// * `ChartError::InsufficientRows` when the sheet has no data row
/// * `ChartError::ColumnNotFound` naming the first axis missing from the header row
pub fn extract_series(
    sheet: &Sheet,
    x_axis: &str,
    y_axis: &str,
    limit: Option<usize>,
) -> ChartResult<ChartData2D> {
    require_rows(sheet)?;
    let x_index = axis_index(sheet, x_axis)?;
    let y_index = axis_index(sheet, y_axis)?;

    let mut labels = Vec::new();
    let mut data = Vec::new();
    for row in limited_rows(sheet, limit) {
        let x = Sheet::cell(row, x_index);
        let y = Sheet::cell(row, y_index);
        if x.is_empty() || y.is_blank() {
            continue;
        }
        labels.push(x.to_string());
        data.push(y.coerce_number());
    }

    let colors = generate_colors(labels.len());
    let (background_color, border_color): (Vec<String>, Vec<String>) = (0..labels.len())
        .map(|i| {
            let pair = &colors[i % colors.len()];
            (pair.background.clone(), pair.border.clone())
        })
        .unzip();

    log::debug!(
        "extracted {} point(s) of {} vs {} from sheet {}",
        labels.len(),
        y_axis,
        x_axis,
        sheet.name()
    );

    Ok(ChartData2D {
        labels,
        datasets: vec![Dataset {
            label: format!("{} vs {}", y_axis, x_axis),
            data,
            background_color,
            border_color,
        }],
    })
}

/// Builds the point cloud of a 3D chart.
///
/// Rows are skipped only when the X or Y cell is absent; unlike
/// [`extract_series`] an empty-string Y is kept (and reads as 0). Without a
/// Z axis, `z` is the row's position within the limited slice of data rows,
/// counted before filtering. An empty `z_axis` counts as no Z axis.
///
/// # Errors
/// * `ChartError::InsufficientRows` when the sheet has no data row
/// * `ChartError::ColumnNotFound` naming the first axis missing from the header row
pub fn extract_3d_series(
    sheet: &Sheet,
    x_axis: &str,
    y_axis: &str,
    z_axis: Option<&str>,
    limit: Option<usize>,
) -> ChartResult<Vec<Point3D>> {
    require_rows(sheet)?;
    let x_index = axis_index(sheet, x_axis)?;
    let y_index = axis_index(sheet, y_axis)?;
    let z_index = match z_axis.filter(|z| !z.is_empty()) {
        Some(z) => Some(axis_index(sheet, z)?),
        None => None,
    };

    let points: Vec<Point3D> = limited_rows(sheet, limit)
        .iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let x = Sheet::cell(row, x_index);
            let y = Sheet::cell(row, y_index);
            if x.is_empty() || y.is_empty() {
                return None;
            }
            let z = match z_index {
                Some(z) => Sheet::cell(row, z).coerce_number(),
                None => index as f64,
            };
            Some(Point3D {
                x: x.coerce_number(),
                y: y.coerce_number(),
                z,
                label: x.to_string(),
            })
        })
        .collect();

    log::debug!(
        "extracted {} 3D point(s) from sheet {}",
        points.len(),
        sheet.name()
    );
    Ok(points)
}

/// Checks chart inputs against a parsed sheet before extracting.
///
/// # Arguments
/// * `sheet` - Parsed sheet, `None` when the sheet is missing or has no rows
/// * `x_axis`, `y_axis` - Requested axis columns
///
/// # Errors
/// * `ChartError::Validation` with a user-facing message naming the problem
pub fn validate_axes(sheet: Option<&SheetData>, x_axis: &str, y_axis: &str) -> ChartResult<()> {
    let sheet = sheet.ok_or_else(|| ChartError::Validation("Invalid sheet data".to_string()))?;

    for axis in [x_axis, y_axis] {
        if !sheet.headers.iter().any(|h| h == axis) {
            return Err(ChartError::Validation(format!(
                "Column \"{}\" not found in sheet",
                axis
            )));
        }
    }

    if sheet.data.is_empty() {
        return Err(ChartError::Validation(
            "No data rows found in sheet".to_string(),
        ));
    }

    Ok(())
}

/// Opens a workbook and extracts a 2D series from one of its sheets.
///
/// # Errors
/// * `ChartError::Parse`, `ChartError::SheetNotFound` or any error of
///   [`extract_series`]
pub fn extract_chart_data(
    path: impl AsRef<Path>,
    sheet_name: &str,
    x_axis: &str,
    y_axis: &str,
    limit: Option<usize>,
) -> ChartResult<ChartData2D> {
    let workbook = Workbook::open(path)?;
    extract_series(workbook.sheet(sheet_name)?, x_axis, y_axis, limit)
}

/// Opens a workbook and extracts 3D points from one of its sheets.
pub fn extract_3d_chart_data(
    path: impl AsRef<Path>,
    sheet_name: &str,
    x_axis: &str,
    y_axis: &str,
    z_axis: Option<&str>,
    limit: Option<usize>,
) -> ChartResult<Vec<Point3D>> {
    let workbook = Workbook::open(path)?;
    extract_3d_series(workbook.sheet(sheet_name)?, x_axis, y_axis, z_axis, limit)
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

    fn revenue() -> Sheet {
        Sheet::new(
            "Sales",
            vec![
                vec![t("Month"), t("Revenue")],
                vec![t("Jan"), n(100.0)],
                vec![t("Feb"), n(200.0)],
                vec![t(""), t("")],
            ],
        )
    }

    #[test]
    fn empty_row_is_dropped_from_2d_series() {
        let chart = extract_series(&revenue(), "Month", "Revenue", None).unwrap();
        assert_eq!(chart.labels, vec!["Jan", "Feb"]);
        assert_eq!(chart.datasets[0].data, vec![100.0, 200.0]);
        assert_eq!(chart.datasets[0].label, "Revenue vs Month");
        assert_eq!(chart.datasets[0].background_color.len(), 2);
        assert_eq!(chart.datasets[0].border_color.len(), 2);
    }

    #[test]
    fn unknown_axis_is_named() {
        let err = extract_series(&revenue(), "Region", "Revenue", None).unwrap_err();
        assert_eq!(err, ChartError::ColumnNotFound("Region".to_string()));

        let err = extract_series(&revenue(), "Month", "Profit", None).unwrap_err();
        assert_eq!(err, ChartError::ColumnNotFound("Profit".to_string()));
    }

    #[test]
    fn non_numeric_values_read_as_zero() {
        let sheet = Sheet::new(
            "S",
            vec![
                vec![t("k"), t("v")],
                vec![t("a"), t("oops")],
                vec![n(2.0), t(" 7 ")],
                vec![CellValue::Empty, n(5.0)],
                vec![t("c"), CellValue::Empty],
            ],
        );
        let chart = extract_series(&sheet, "k", "v", None).unwrap();
        assert_eq!(chart.labels, vec!["a", "2"]);
        assert_eq!(chart.datasets[0].data, vec![0.0, 7.0]);
    }

    #[test]
    fn limit_applies_before_filtering() {
        let sheet = Sheet::new(
            "S",
            vec![
                vec![t("k"), t("v")],
                vec![t("a"), t("")],
                vec![t("b"), n(1.0)],
                vec![t("c"), n(2.0)],
            ],
        );
        let chart = extract_series(&sheet, "k", "v", Some(2)).unwrap();
        assert_eq!(chart.labels, vec!["b"]);
    }

    #[test]
    fn colors_follow_retained_positions() {
        let sheet = Sheet::new(
            "S",
            vec![
                vec![t("k"), t("v")],
                vec![t("a"), t("")],
                vec![t("b"), n(1.0)],
            ],
        );
        let chart = extract_series(&sheet, "k", "v", None).unwrap();
        let first = &generate_colors(1)[0];
        assert_eq!(chart.datasets[0].background_color, vec![first.background.clone()]);
        assert_eq!(chart.datasets[0].border_color, vec![first.border.clone()]);
    }

    #[test]
    fn header_only_sheet_cannot_be_charted() {
        let sheet = Sheet::new("Only", vec![vec![t("k"), t("v")]]);
        assert_eq!(
            extract_series(&sheet, "k", "v", None).unwrap_err(),
            ChartError::InsufficientRows("Only".to_string())
        );
        assert!(extract_3d_series(&sheet, "k", "v", None, None).is_err());
    }

    #[test]
    fn three_d_keeps_empty_string_y() {
        let points = extract_3d_series(&revenue(), "Month", "Revenue", None, None).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[2].y, 0.0);
        assert_eq!(points[2].label, "");
    }

    #[test]
    fn three_d_default_z_is_slice_position() {
        let sheet = Sheet::new(
            "S",
            vec![
                vec![t("x"), t("y")],
                vec![n(1.0), n(10.0)],
                vec![CellValue::Empty, n(20.0)],
                vec![n(3.0), n(30.0)],
            ],
        );
        let points = extract_3d_series(&sheet, "x", "y", None, None).unwrap();
        let z: Vec<f64> = points.iter().map(|p| p.z).collect();
        assert_eq!(z, vec![0.0, 2.0]);
    }

    #[test]
    fn three_d_reads_named_z_column() {
        let sheet = Sheet::new(
            "S",
            vec![
                vec![t("x"), t("y"), t("depth")],
                vec![n(1.0), n(10.0), n(-4.0)],
                vec![t("a"), n(20.0), t("deep")],
            ],
        );
        let points = extract_3d_series(&sheet, "x", "y", Some("depth"), None).unwrap();
        assert_eq!(
            points,
            vec![
                Point3D { x: 1.0, y: 10.0, z: -4.0, label: "1".into() },
                Point3D { x: 0.0, y: 20.0, z: 0.0, label: "a".into() },
            ]
        );

        let err = extract_3d_series(&sheet, "x", "y", Some("height"), None).unwrap_err();
        assert_eq!(err, ChartError::ColumnNotFound("height".to_string()));

        let blank_z = extract_3d_series(&sheet, "x", "y", Some(""), None).unwrap();
        assert_eq!(blank_z[1].z, 1.0);
    }

    #[test]
    fn validation_reports_each_failure() {
        let data = revenue().to_sheet_data();
        assert!(validate_axes(Some(&data), "Month", "Revenue").is_ok());
        assert_eq!(
            validate_axes(None, "Month", "Revenue").unwrap_err(),
            ChartError::Validation("Invalid sheet data".into())
        );
        assert_eq!(
            validate_axes(Some(&data), "Month", "Cost").unwrap_err(),
            ChartError::Validation("Column \"Cost\" not found in sheet".into())
        );

        let empty = Sheet::new("E", vec![vec![t("Month"), t("Revenue")], vec![t(""), t("")]])
            .to_sheet_data();
        assert_eq!(
            validate_axes(Some(&empty), "Month", "Revenue").unwrap_err(),
            ChartError::Validation("No data rows found in sheet".into())
        );
    }

    #[test]
    fn chart_data_round_trips_untagged() {
        let flat = ChartData::Flat(extract_series(&revenue(), "Month", "Revenue", None).unwrap());
        let json = serde_json::to_value(&flat).unwrap();
        assert!(json["datasets"][0]["backgroundColor"].is_array());
        assert_eq!(serde_json::from_value::<ChartData>(json).unwrap(), flat);

        let spatial = ChartData::Spatial(vec![Point3D { x: 1.0, y: 2.0, z: 0.0, label: "1".into() }]);
        let json = serde_json::to_value(&spatial).unwrap();
        assert_eq!(json[0]["label"], "1");
        assert_eq!(serde_json::from_value::<ChartData>(json).unwrap(), spatial);
    }
}
