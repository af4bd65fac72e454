//! CSV export and import of the phonebook.
//!
//! Export writes a spreadsheet-friendly file: UTF-8 BOM, a `sep=;` preamble,
//! every value quoted, and number-like columns prefixed with a space so they
//! stay text. Import accepts that file back, or any delimited file whose
//! header names the columns.

use phonebook_directory::{DirectoryRecord, ImportRecord, PersonField};

use crate::error::ApiError;

/// Maximum data rows per import.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

/// UTF-8 BOM bytes.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Export columns, in order.
pub const EXPORT_COLUMNS: [&str; 7] = [
    "uid",
    "cn",
    "mail",
    "telephoneNumber",
    "mobile",
    "title",
    "departmentNumber",
];

const NUMERIC_COLUMNS: [&str; 3] = ["telephoneNumber", "mobile", "departmentNumber"];

/// Strip UTF-8 BOM from the beginning of data if present.
fn strip_utf8_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(UTF8_BOM).unwrap_or(data)
}

fn export_value<'a>(record: &'a DirectoryRecord, column: &str) -> Option<&'a str> {
    match column {
        "uid" => record.uid.as_deref(),
        "cn" => Some(record.common_name.as_str()),
        "mail" => record.mail.as_deref(),
        "telephoneNumber" => record.telephone_number.as_deref(),
        "mobile" => record.mobile.as_deref(),
        "title" => record.title.as_deref(),
        "departmentNumber" => record.department_number.as_deref(),
        _ => None,
    }
}

/// Render records as the export file.
pub fn export_csv(records: &[DirectoryRecord]) -> Result<Vec<u8>, ApiError> {
    let mut buffer = Vec::with_capacity(64 + records.len() * 96);
    buffer.extend_from_slice(UTF8_BOM);
    buffer.extend_from_slice(b"sep=;\r\n");

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::CRLF)
        .from_writer(buffer);

    let write_error = |e: csv::Error| ApiError::Internal(format!("CSV export failed: {e}"));
    writer.write_record(EXPORT_COLUMNS).map_err(write_error)?;

    for record in records {
        let row = EXPORT_COLUMNS.iter().map(|column| {
            let value = export_value(record, column).unwrap_or("");
            if !value.is_empty() && NUMERIC_COLUMNS.contains(column) {
                format!(" {value}")
            } else {
                value.to_string()
            }
        });
        writer.write_record(row).map_err(write_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV export failed: {}", e.error())))
}

/// Where a header column lands in an [`ImportRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    CommonName,
    Field(PersonField),
    Ignored,
}

impl Column {
    fn from_header(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("cn") || name.eq_ignore_ascii_case("commonName") {
            return Column::CommonName;
        }
        PersonField::ALL
            .iter()
            .find(|field| field.attribute().eq_ignore_ascii_case(name))
            .map_or(Column::Ignored, |field| Column::Field(*field))
    }
}

/// Split off an optional `sep=X` preamble line. Defaults to `,`.
fn detect_delimiter(data: &[u8]) -> Result<(u8, &[u8]), ApiError> {
    let first_line_end = data.iter().position(|b| *b == b'\n').unwrap_or(data.len());
    let first_line = &data[..first_line_end];

    if first_line.len() >= 4 && first_line[..4].eq_ignore_ascii_case(b"sep=") {
        let delimiter = match first_line.get(4) {
            Some(b) if b.is_ascii() && *b != b'\r' && *b != b'"' => *b,
            _ => {
                return Err(ApiError::InvalidCsv(
                    "sep= line must name a single ASCII delimiter".to_string(),
                ))
            }
        };
        let rest = data.get(first_line_end + 1..).unwrap_or_default();
        return Ok((delimiter, rest));
    }
    Ok((b',', data))
}

/// Parse an uploaded file into import records, in file order.
///
/// Rows without a `cn` are kept; reconciliation reports them as errors.
pub fn parse_import_csv(data: &[u8], max_rows: usize) -> Result<Vec<ImportRecord>, ApiError> {
    let data = strip_utf8_bom(data);
    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::InvalidCsv("file is empty".to_string()));
    }
    let (delimiter, body) = detect_delimiter(data)?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(body);

    let columns: Vec<Column> = reader
        .headers()
        .map_err(|e| ApiError::InvalidCsv(format!("unreadable header: {e}")))?
        .iter()
        .map(Column::from_header)
        .collect();
    if columns.is_empty() {
        return Err(ApiError::InvalidCsv("header row is missing".to_string()));
    }

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|e| ApiError::InvalidCsv(format!("row {}: {e}", index + 2)))?;
        if row.iter().all(|value| value.trim().is_empty()) {
            continue;
        }
        if records.len() == max_rows {
            return Err(ApiError::TooManyRows(format!(
                "file has more than {max_rows} data rows"
            )));
        }

        let mut record = ImportRecord::default();
        // Short rows leave the trailing columns unset.
        for (column, value) in columns.iter().zip(row.iter()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match column {
                Column::CommonName => record.common_name = Some(value.to_string()),
                Column::Field(field) => record = record.with(*field, value),
                Column::Ignored => {}
            }
        }
        records.push(record);
    }

    tracing::debug!(rows = records.len(), delimiter = %char::from(delimiter), "CSV parsed");
    Ok(records)
}
