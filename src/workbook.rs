use crate::cell::CellValue;
use crate::error::{ChartError, ChartResult};
use calamine::{Reader, open_workbook_auto};
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;

/// One named table of a workbook, kept exactly as read.
///
/// The first row is the header row whatever it contains. Rows are stored
/// unfiltered so that positional lookups and row limits see the same
/// indices as the source file; the filtered views are derived on demand.
#[derive(Clone, Debug, PartialEq)]
pub struct Sheet {
    name: String,
    rows: Vec<Vec<CellValue>>,
}

/// Parsed view of a sheet as handed to clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetData {
    /// Header names with empty entries dropped
    pub headers: Vec<String>,

    /// Data rows that have at least one non-blank cell; cell positions are
    /// those of the raw header row, not of `headers`
    pub data: Vec<Vec<CellValue>>,

    /// Number of data rows before blank rows were dropped
    pub row_count: usize,
}

/// Result of parsing a whole workbook.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedWorkbook {
    /// Parsed sheets keyed by name, in workbook order. Sheets without any
    /// row are left out.
    pub sheets: IndexMap<String, SheetData>,

    /// Every sheet name in workbook order, empty sheets included
    pub sheet_names: Vec<String>,

    /// Sum of `row_count` over all parsed sheets
    pub total_row_count: usize,

    /// Header names per parsed sheet
    pub columns: IndexMap<String, Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Sheet {
            name: name.into(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows including the header row.
    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn header_row(&self) -> &[CellValue] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Header names in column order, without empty headers.
    pub fn headers(&self) -> Vec<String> {
        self.header_row()
            .iter()
            .filter(|cell| !cell.is_blank())
            .map(CellValue::to_string)
            .collect()
    }

    /// All rows after the header row, blank rows included.
    pub fn data_rows(&self) -> &[Vec<CellValue>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    /// Data rows holding at least one non-blank cell.
    pub fn non_blank_rows(&self) -> Vec<Vec<CellValue>> {
        self.data_rows()
            .iter()
            .filter(|row| row.iter().any(|cell| !cell.is_blank()))
            .cloned()
            .collect()
    }

    /// Position of the first raw header cell whose text is `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header_row()
            .iter()
            .position(|cell| !cell.is_empty() && cell.to_string() == name)
    }

    /// Cell at `column` of a data row, `Empty` when the row is shorter.
    pub fn cell<'a>(row: &'a [CellValue], column: usize) -> &'a CellValue {
        const EMPTY: &CellValue = &CellValue::Empty;
        row.get(column).unwrap_or(EMPTY)
    }

    pub fn to_sheet_data(&self) -> SheetData {
        SheetData {
            headers: self.headers(),
            data: self.non_blank_rows(),
            row_count: self.data_rows().len(),
        }
    }
}

/// An opened workbook: its sheets, in workbook order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    /// Opens a spreadsheet file and reads every sheet into memory.
    ///
    /// The format is picked from the file extension (xlsx, xlsm, xlsb,
    /// xls or ods).
    ///
    /// # Errors
    /// * `ChartError::Parse` if the file cannot be opened or is not a
    ///   spreadsheet calamine understands
    pub fn open(path: impl AsRef<Path>) -> ChartResult<Self> {
        let path = path.as_ref();
        log::debug!("opening workbook {}", path.display());

        let mut workbook =
            open_workbook_auto(path).map_err(|e| ChartError::Parse(e.to_string()))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| ChartError::Parse(format!("sheet \"{}\": {}", name, e)))?;

            // calamine pads every row to the range width; keep rows ragged
            let rows = range
                .rows()
                .map(|row| {
                    let mut cells: Vec<CellValue> = row.iter().map(CellValue::from_data).collect();
                    while cells.last().is_some_and(CellValue::is_empty) {
                        cells.pop();
                    }
                    cells
                })
                .collect();

            sheets.push(Sheet::new(name, rows));
        }

        log::debug!("read {} sheet(s) from {}", sheets.len(), path.display());
        Ok(Workbook { sheets })
    }

    pub fn from_sheets(sheets: Vec<Sheet>) -> Self {
        Workbook { sheets }
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Looks a sheet up by exact name.
    ///
    /// # Errors
    /// * `ChartError::SheetNotFound` naming the requested sheet
    pub fn sheet(&self, name: &str) -> ChartResult<&Sheet> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ChartError::SheetNotFound(name.to_string()))
    }

    pub fn parse(&self) -> ParsedWorkbook {
        let mut sheets = IndexMap::new();
        let mut columns = IndexMap::new();
        let mut total_row_count = 0;

        for sheet in self.sheets.iter().filter(|s| s.total_rows() > 0) {
            let data = sheet.to_sheet_data();
            total_row_count += data.row_count;
            columns.insert(sheet.name.clone(), data.headers.clone());
            sheets.insert(sheet.name.clone(), data);
        }

        ParsedWorkbook {
            sheets,
            sheet_names: self.sheet_names(),
            total_row_count,
            columns,
        }
    }
}

/// Opens a workbook and returns headers and rows for every sheet.
///
/// # Arguments
/// * `path` - Path of an xlsx/xls (or other calamine supported) file
///
/// # Returns
/// * `ChartResult<ParsedWorkbook>` - Parsed sheets or a parse error
///
/// # Examples
/// ```no_run
/// use sheetchart::workbook::parse_workbook;
///
/// match parse_workbook("sales.xlsx") {
///     Ok(parsed) => println!("{} rows in {:?}", parsed.total_row_count, parsed.sheet_names),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn parse_workbook(path: impl AsRef<Path>) -> ChartResult<ParsedWorkbook> {
    Ok(Workbook::open(path)?.parse())
}
