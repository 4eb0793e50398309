use crate::view::{self, View, ViewData};
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to build xlsx: {0}")]
    Xlsx(#[from] XlsxError),
}

/// File formats a view can be downloaded as
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(format!("unsupported export format: {}", other)),
        }
    }
}

/// Serialize a view's aggregate table in the requested format
///
/// # Arguments
///
/// * `data` - The computed aggregate of the view
/// * `view` - The view, used to name the worksheet
/// * `format` - CSV or XLSX
///
/// # Returns
///
/// The file contents ready to be sent as a download
///
/// # Examples
///
/// ```ignore
/// let bytes = export(&data, View::Totals, ExportFormat::Csv)?;
/// ```
pub fn export(data: &ViewData, view: View, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Csv => Ok(to_csv(data).into_bytes()),
        ExportFormat::Xlsx => to_xlsx(data, view),
    }
}

/// Convert a view's aggregate to CSV
///
/// The first line holds the column headers. Fields containing commas,
/// quotes or newlines are quoted with inner quotes doubled.
///
/// # Arguments
///
/// * `data` - The computed aggregate of the view
///
/// # Returns
///
/// The CSV text, one line per table row
///
/// # Examples
///
/// ```ignore
/// let csv = to_csv(&data);
/// assert!(csv.starts_with("Sensor,Suma"));
/// ```
pub fn to_csv(data: &ViewData) -> String {
    let (headers, rows) = view::tabulate(data);
    let mut csv_content = String::new();

    push_csv_row(&mut csv_content, &headers);
    for row in &rows {
        push_csv_row(&mut csv_content, row);
    }

    csv_content
}

fn push_csv_row(out: &mut String, fields: &[String]) {
    for (i, value) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if value.contains(',') || value.contains('"') || value.contains('\n') {
            let escaped = value.replace('"', "\"\"");
            out.push_str(&format!("\"{}\"", escaped));
        } else {
            out.push_str(value);
        }
    }
    out.push('\n');
}

/// Convert a view's aggregate to a single-sheet XLSX workbook
///
/// Numeric fields are written as numbers, labels as text and empty fields
/// are left blank.
///
/// # Arguments
///
/// * `data` - The computed aggregate of the view
/// * `view` - The view whose slug names the worksheet
///
/// # Returns
///
/// The workbook bytes, or an error if rust_xlsxwriter rejects a cell
///
/// # Examples
///
/// ```ignore
/// let bytes = to_xlsx(&data, View::YearlySums)?;
/// ```
pub fn to_xlsx(data: &ViewData, view: View) -> Result<Vec<u8>, ExportError> {
    let (headers, rows) = view::tabulate(data);

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name(view.slug())?;

    for (c, header) in headers.iter().enumerate() {
        worksheet.write_string(0, c as u16, header.as_str())?;
    }

    for (r, row) in rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (c, value) in row.iter().enumerate() {
            let c = c as u16;
            match value.parse::<f64>() {
                Ok(number) if number.is_finite() => {
                    worksheet.write_number(r, c, number)?;
                }
                _ if value.is_empty() => {}
                _ => {
                    worksheet.write_string(r, c, value.as_str())?;
                }
            }
        }
    }

    workbook.push_worksheet(worksheet);
    Ok(workbook.save_to_buffer()?)
}
