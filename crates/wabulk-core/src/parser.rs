//! Phone list import from spreadsheets

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use wabulk_common::{Error, PhoneNumber};

/// Header names recognised as the phone column, matched as substrings
const PHONE_COLUMN_KEYWORDS: &[&str] = &[
    "телефон",
    "phone",
    "номер",
    "number",
    "мобильный",
    "mobile",
    "тел",
    "tel",
    "phone_number",
    "phonenumber",
    "номер_телефона",
];

pub const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "ods"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to open spreadsheet: {0}")]
    Unreadable(String),

    #[error("no sheets found in spreadsheet")]
    NoSheets,

    #[error("spreadsheet is empty")]
    Empty,

    #[error("column '{0}' not found in file header")]
    ColumnNotFound(String),

    #[error("no phone column found in file header. Expected columns: 'Телефон', 'Phone', 'Номер', etc")]
    NoPhoneColumn,

    #[error("no valid phone numbers found in file")]
    NoValidNumbers,
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Validation(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidRow {
    pub row: usize,
    pub raw_value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateRow {
    pub row: usize,
    pub phone_number: PhoneNumber,
    pub first_seen_row: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStatistics {
    pub total_rows: usize,
    pub data_rows: usize,
    pub valid: usize,
    pub invalid: usize,
    pub duplicates: usize,
    pub empty_rows: usize,
}

/// Outcome of reading a phone list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedPhones {
    pub column: String,
    pub phones: Vec<PhoneNumber>,
    pub invalid: Vec<InvalidRow>,
    pub duplicates: Vec<DuplicateRow>,
    pub statistics: ParseStatistics,
    pub warnings: Vec<String>,
}

/// Source of recipient numbers for campaign creation
pub trait PhoneFileParser: Send + Sync {
    /// Extract unique valid numbers from an uploaded file. `preferred_column`
    /// names the header to use before falling back to the keyword search.
    fn parse(
        &self,
        filename: &str,
        data: &[u8],
        preferred_column: Option<&str>,
    ) -> Result<ParsedPhones, ParseError>;

    fn is_supported(&self, filename: &str) -> bool;
}

/// Reads the first sheet of an xlsx, xls or ods workbook
#[derive(Debug, Clone, Default)]
pub struct SpreadsheetPhoneParser;

impl SpreadsheetPhoneParser {
    pub fn new() -> Self {
        Self
    }
}

impl PhoneFileParser for SpreadsheetPhoneParser {
    fn parse(
        &self,
        filename: &str,
        data: &[u8],
        preferred_column: Option<&str>,
    ) -> Result<ParsedPhones, ParseError> {
        if !self.is_supported(filename) {
            return Err(ParseError::UnsupportedFormat(filename.to_string()));
        }

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(data.to_vec()))
            .map_err(|e| ParseError::Unreadable(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(ParseError::NoSheets)?
            .map_err(|e| ParseError::Unreadable(e.to_string()))?;

        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();

        debug!(filename, rows = rows.len(), "Spreadsheet loaded");
        parse_rows(&rows, preferred_column)
    }

    fn is_supported(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|supported| ext.eq_ignore_ascii_case(supported))
            })
            .unwrap_or(false)
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        // Numbers typed into a sheet arrive as floats
        Data::Float(f) if f.fract() == 0.0 => format!("{:.0}", f),
        other => other.to_string(),
    }
}

fn find_phone_column(header: &[String], preferred: Option<&str>) -> Option<usize> {
    if let Some(preferred) = preferred {
        if let Some(idx) = header
            .iter()
            .position(|h| h.trim().to_lowercase() == preferred.trim().to_lowercase())
        {
            return Some(idx);
        }
    }

    header.iter().position(|h| {
        let h = h.trim().to_lowercase();
        PHONE_COLUMN_KEYWORDS.iter().any(|keyword| h.contains(keyword))
    })
}

/// Extract phone numbers from rows whose first row is the header
pub fn parse_rows(
    rows: &[Vec<String>],
    preferred_column: Option<&str>,
) -> Result<ParsedPhones, ParseError> {
    let preferred_column = preferred_column.filter(|c| !c.trim().is_empty());
    let header = rows.first().ok_or(ParseError::Empty)?;

    let column = match find_phone_column(header, preferred_column) {
        Some(idx) => idx,
        None => {
            return Err(match preferred_column {
                Some(name) => ParseError::ColumnNotFound(name.to_string()),
                None => ParseError::NoPhoneColumn,
            })
        }
    };
    let column_name = header[column].trim().to_string();

    let mut warnings = Vec::new();
    if let Some(name) = preferred_column {
        if column_name.to_lowercase() != name.trim().to_lowercase() {
            warnings.push(format!(
                "Requested column '{}' not found, using '{}' instead",
                name, column_name
            ));
        }
    }

    let mut stats = ParseStatistics {
        total_rows: rows.len(),
        data_rows: rows.len() - 1,
        ..ParseStatistics::default()
    };
    let mut phones = Vec::new();
    let mut invalid = Vec::new();
    let mut duplicates = Vec::new();
    let mut seen: HashMap<PhoneNumber, usize> = HashMap::new();

    for (idx, row) in rows.iter().enumerate().skip(1) {
        // Spreadsheet rows are 1-based
        let row_number = idx + 1;
        let raw = row.get(column).map(|v| v.trim()).unwrap_or_default();

        if raw.is_empty() {
            stats.empty_rows += 1;
            continue;
        }

        let phone = match PhoneNumber::parse(raw) {
            Ok(phone) => phone,
            Err(e) => {
                invalid.push(InvalidRow {
                    row: row_number,
                    raw_value: raw.to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if let Some(first_seen_row) = seen.get(&phone) {
            duplicates.push(DuplicateRow {
                row: row_number,
                phone_number: phone,
                first_seen_row: *first_seen_row,
            });
            continue;
        }

        seen.insert(phone.clone(), row_number);
        phones.push(phone);
    }

    stats.valid = phones.len();
    stats.invalid = invalid.len();
    stats.duplicates = duplicates.len();

    if stats.invalid > 0 {
        warnings.push(format!("Found {} invalid phone numbers", stats.invalid));
    }
    if stats.duplicates > 0 {
        warnings.push(format!("Found {} duplicate phone numbers", stats.duplicates));
    }
    if stats.empty_rows > 0 {
        warnings.push(format!("Skipped {} empty rows", stats.empty_rows));
    }

    if phones.is_empty() {
        return Err(ParseError::NoValidNumbers);
    }

    Ok(ParsedPhones {
        column: column_name,
        phones,
        invalid,
        duplicates,
        statistics: stats,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_parse_rows_with_keyword_header() {
        let rows = rows(&[
            &["Имя", "Телефон"],
            &["Anna", "+7 999 000 11 22"],
            &["Boris", "79990001133"],
            &["Clara", "8999"],
            &["Dmitry", ""],
            &["Anna again", "7 (999) 000-11-22"],
        ]);

        let parsed = parse_rows(&rows, None).unwrap();

        assert_eq!(parsed.column, "Телефон");
        assert_eq!(
            parsed.phones,
            vec![
                PhoneNumber::parse("79990001122").unwrap(),
                PhoneNumber::parse("79990001133").unwrap(),
            ]
        );
        assert_eq!(parsed.statistics.invalid, 1);
        assert_eq!(parsed.statistics.duplicates, 1);
        assert_eq!(parsed.statistics.empty_rows, 1);
        assert_eq!(parsed.invalid[0].row, 4);
        assert_eq!(parsed.duplicates[0].first_seen_row, 2);
        assert_eq!(parsed.warnings.len(), 3);
    }

    #[test]
    fn test_preferred_column_wins() {
        let rows = rows(&[
            &["phone", "backup"],
            &["79990000001", "79990000002"],
        ]);

        let parsed = parse_rows(&rows, Some("Backup")).unwrap();
        assert_eq!(parsed.phones, vec![PhoneNumber::parse("79990000002").unwrap()]);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_missing_preferred_column_falls_back_with_warning() {
        let rows = rows(&[&["Mobile"], &["79990000001"]]);

        let parsed = parse_rows(&rows, Some("contacts")).unwrap();
        assert_eq!(parsed.column, "Mobile");
        assert_eq!(
            parsed.warnings,
            vec!["Requested column 'contacts' not found, using 'Mobile' instead".to_string()]
        );
    }

    #[test]
    fn test_header_errors() {
        assert_eq!(parse_rows(&[], None), Err(ParseError::Empty));

        let no_phone = rows(&[&["name", "city"], &["a", "b"]]);
        assert_eq!(parse_rows(&no_phone, None), Err(ParseError::NoPhoneColumn));
        assert_eq!(
            parse_rows(&no_phone, Some("contact")),
            Err(ParseError::ColumnNotFound("contact".to_string()))
        );
    }

    #[test]
    fn test_no_valid_numbers() {
        let rows = rows(&[&["phone"], &["89990001122"], &[""]]);
        assert_eq!(parse_rows(&rows, None), Err(ParseError::NoValidNumbers));
    }

    #[test]
    fn test_supported_extensions() {
        let parser = SpreadsheetPhoneParser::new();
        assert!(parser.is_supported("contacts.xlsx"));
        assert!(parser.is_supported("CONTACTS.XLS"));
        assert!(parser.is_supported("list.ods"));
        assert!(!parser.is_supported("list.csv"));
        assert!(!parser.is_supported("noext"));

        assert_eq!(
            parser.parse("list.csv", b"phone\n7999", None),
            Err(ParseError::UnsupportedFormat("list.csv".to_string()))
        );
    }

    #[test]
    fn test_garbage_workbook_is_unreadable() {
        let parser = SpreadsheetPhoneParser::new();
        let err = parser.parse("list.xlsx", b"not a zip", None).unwrap_err();
        assert!(matches!(err, ParseError::Unreadable(_)));
    }

    #[test]
    fn test_float_cells_render_without_fraction() {
        assert_eq!(cell_text(&Data::Float(79990001122.0)), "79990001122");
        assert_eq!(cell_text(&Data::String("+7 999".into())), "+7 999");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
