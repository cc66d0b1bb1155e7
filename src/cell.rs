use calamine::Data;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single spreadsheet cell value.
///
/// Serializes untagged so a data row becomes a plain JSON array:
/// `Empty` is `null`, numbers and booleans are native JSON values and
/// text is a string.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// No value at all (a blank cell or a position past the end of a row)
    #[default]
    Empty,
    Number(f64),
    Bool(bool),
    Text(String),
}

/// Hashable identity of a cell value, used for distinct counting.
///
/// Numbers and text never compare equal, so `10` and `"10"` stay distinct.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DistinctKey {
    Empty,
    Number(u64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    /// Converts a cell read by calamine.
    ///
    /// Date-times become their Excel serial number; error cells keep their
    /// display text (for example `#DIV/0!`).
    pub fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Empty,
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::String(s) => CellValue::Text(s.clone()),
            Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(e) => CellValue::Text(e.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// True for an absent value or an empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// False for the values a browser treats as falsy in a condition:
    /// absent, `""`, `0`, `NaN` and `false`.
    pub fn is_truthy(&self) -> bool {
        match self {
            CellValue::Empty => false,
            CellValue::Number(n) => *n != 0.0 && !n.is_nan(),
            CellValue::Bool(b) => *b,
            CellValue::Text(s) => !s.is_empty(),
        }
    }

    /// Numeric reading of the value, `None` when it does not parse.
    ///
    /// Text is read the way a browser's `Number()` reads it: surrounding
    /// whitespace is ignored, an all-whitespace string is zero, and hex,
    /// octal and binary literals are accepted.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            CellValue::Empty => None,
            CellValue::Number(n) if n.is_nan() => None,
            CellValue::Number(n) => Some(*n),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Text(s) => parse_number(s),
        }
    }

    /// Numeric value for chart series: anything unparseable counts as 0.
    pub fn coerce_number(&self) -> f64 {
        self.to_number().unwrap_or(0.0)
    }

    pub fn distinct_key(&self) -> DistinctKey {
        match self {
            CellValue::Empty => DistinctKey::Empty,
            // -0 and 0 are the same value
            CellValue::Number(n) if *n == 0.0 => DistinctKey::Number(0f64.to_bits()),
            CellValue::Number(n) => DistinctKey::Number(n.to_bits()),
            CellValue::Bool(b) => DistinctKey::Bool(*b),
            CellValue::Text(s) => DistinctKey::Text(s.clone()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{}", format_number(*n)),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

/// Formats a number the way it shows up in chart labels.
///
/// Magnitudes from `1e21` up and below `1e-6` switch to exponent form with
/// an explicit exponent sign, as `String(n)` does in a browser.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        let formatted = format!("{:e}", n);
        match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => formatted,
        }
    } else {
        n.to_string()
    }
}

/// Parses text into a number, `None` when the text is not numeric.
///
/// # Examples
/// ```
/// use sheetchart::cell::parse_number;
///
/// assert_eq!(parse_number(" 42 "), Some(42.0));
/// assert_eq!(parse_number("0x1A"), Some(26.0));
/// assert_eq!(parse_number(""), Some(0.0));
/// assert_eq!(parse_number("abc"), None);
/// ```
pub fn parse_number(text: &str) -> Option<f64> {
    let s = text.trim();
    if s.is_empty() {
        return Some(0.0);
    }

    match s {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = s.strip_prefix(prefix) {
            if digits.is_empty() {
                return None;
            }
            return digits
                .chars()
                .try_fold(0f64, |acc, c| c.to_digit(radix).map(|d| acc * radix as f64 + d as f64));
        }
    }

    // std accepts "inf" and "nan", which are not numeric literals here
    let literal = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if !literal || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    s.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_coercion_follows_number_literal_rules() {
        assert_eq!(parse_number("10"), Some(10.0));
        assert_eq!(parse_number("-2.5e2"), Some(-250.0));
        assert_eq!(parse_number(".5"), Some(0.5));
        assert_eq!(parse_number("   "), Some(0.0));
        assert_eq!(parse_number("0b101"), Some(5.0));
        assert_eq!(parse_number("-Infinity"), Some(f64::NEG_INFINITY));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("12px"), None);
        assert_eq!(parse_number("1e"), None);
        assert_eq!(parse_number("0x"), None);
        assert_eq!(parse_number("-0x10"), None);
    }

    #[test]
    fn coerce_defaults_to_zero() {
        assert_eq!(CellValue::Text("abc".into()).coerce_number(), 0.0);
        assert_eq!(CellValue::Empty.coerce_number(), 0.0);
        assert_eq!(CellValue::Bool(true).coerce_number(), 1.0);
        assert_eq!(CellValue::Number(7.25).coerce_number(), 7.25);
    }

    #[test]
    fn blank_covers_empty_text_only() {
        assert!(CellValue::Empty.is_blank());
        assert!(CellValue::Text(String::new()).is_blank());
        assert!(!CellValue::Text(" ".into()).is_blank());
        assert!(!CellValue::Number(0.0).is_blank());
        assert!(!CellValue::Bool(false).is_blank());
    }

    #[test]
    fn labels_use_plain_number_formatting() {
        assert_eq!(CellValue::Number(100.0).to_string(), "100");
        assert_eq!(CellValue::Number(1.5).to_string(), "1.5");
        assert_eq!(CellValue::Number(-0.0).to_string(), "0");
        assert_eq!(CellValue::Bool(true).to_string(), "true");
        assert_eq!(CellValue::Text("Jan".into()).to_string(), "Jan");
    }

    #[test]
    fn extreme_magnitudes_use_exponent_form() {
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(-2.5e30), "-2.5e+30");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(0.000001), "0.000001");
    }

    #[test]
    fn truthiness_matches_browser_conditions() {
        assert!(!CellValue::Empty.is_truthy());
        assert!(!CellValue::Text(String::new()).is_truthy());
        assert!(!CellValue::Number(0.0).is_truthy());
        assert!(!CellValue::Number(f64::NAN).is_truthy());
        assert!(!CellValue::Bool(false).is_truthy());
        assert!(CellValue::Text("0".into()).is_truthy());
        assert!(CellValue::Number(-1.0).is_truthy());
    }

    #[test]
    fn distinct_keys_separate_numbers_from_text() {
        assert_ne!(
            CellValue::Number(10.0).distinct_key(),
            CellValue::Text("10".into()).distinct_key()
        );
        assert_eq!(
            CellValue::Number(0.0).distinct_key(),
            CellValue::Number(-0.0).distinct_key()
        );
    }

    #[test]
    fn serializes_as_plain_json_values() {
        let row = vec![
            CellValue::Text("Jan".into()),
            CellValue::Number(100.0),
            CellValue::Empty,
            CellValue::Bool(false),
        ];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"["Jan",100.0,null,false]"#);

        let back: Vec<CellValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}
