//! CSV and XLSX normalization.
//!
//! Both formats are re-emitted as CSV text: the header row followed by
//! data rows, no index column. XLSX reads the first worksheet.

use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use tracing::debug;

use crate::error::ExtractError;

/// Normalize CSV bytes.
pub fn extract_csv(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractError::corrupt("csv", e))?;
        rows.push(record.iter().map(|f| f.trim().to_string()).collect::<Vec<_>>());
    }

    write_csv("csv", &rows)
}

/// Normalize the first worksheet of an XLSX workbook.
pub fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ExtractError::corrupt("xlsx", e))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ExtractError::corrupt("xlsx", "workbook has no worksheets"))?
        .map_err(|e| ExtractError::corrupt("xlsx", e))?;

    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .filter(|row: &Vec<String>| row.iter().any(|c| !c.is_empty()))
        .collect();

    write_csv("xlsx", &rows)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn write_csv(file_type: &str, rows: &[Vec<String>]) -> Result<String, ExtractError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| ExtractError::corrupt(file_type, e))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExtractError::corrupt(file_type, e))?;
    debug!(file_type, rows = rows.len(), "Normalized tabular payload");
    Ok(String::from_utf8(bytes)?)
}
