use thiserror::Error;

pub type ChartResult<T> = Result<T, ChartError>;

/// Failures raised while reading a workbook or turning a sheet into chart data.
///
/// Every variant that concerns a named sheet or column carries that name so
/// callers can report it back to the user verbatim.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChartError {
    #[error("failed to process spreadsheet: {0}")]
    Parse(String),

    #[error("Sheet \"{0}\" not found")]
    SheetNotFound(String),

    #[error("Column \"{0}\" not found in sheet")]
    ColumnNotFound(String),

    #[error("Sheet \"{0}\" must have at least a header row and one data row")]
    InsufficientRows(String),

    #[error("{0}")]
    Validation(String),
}
