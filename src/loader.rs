use crate::reading::{PerSensor, Reading, ReadingTable, Sensor, TIMESTAMP_COLUMN};
use calamine::{Data, Reader, Xlsx, XlsxError, open_workbook_from_rs};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use polars::prelude::PolarsError;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Sheet holding the raw readings.
pub const ORIGINAL_SHEET: &str = "Original";
/// Sheet holding the readings with gaps filled in.
pub const COMPLETED_SHEET: &str = "Completado_Filas";
/// Sheets offered by the sheet selector, in menu order.
pub const EXPECTED_SHEETS: [&str; 2] = [ORIGINAL_SHEET, COMPLETED_SHEET];

/// Errors raised while turning a spreadsheet into a reading table
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read workbook: {0}")]
    Workbook(#[from] XlsxError),
    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("sheet '{0}' not found in workbook")]
    SheetNotFound(String),
    #[error("sheet '{sheet}' has no '{column}' column", column = TIMESTAMP_COLUMN)]
    MissingTimestampColumn { sheet: String },
    #[error("could not build the reading table: {0}")]
    Frame(#[from] PolarsError),
}

/// An uploaded spreadsheet kept in memory
///
/// The raw bytes are shared so that every interaction can reopen any sheet
/// without touching the upload again.
#[derive(Clone, Debug)]
pub struct Workbook {
    pub file_name: String,
    bytes: Arc<Vec<u8>>,
}

impl Workbook {
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Workbook {
            file_name: file_name.into(),
            bytes: Arc::new(bytes),
        }
    }

    /// Read a workbook from disk
    ///
    /// # Examples
    /// ```no_run
    /// use sensor_dashboard::loader::Workbook;
    ///
    /// match Workbook::open("sensores.xlsx") {
    ///     Ok(workbook) => println!("{} bytes loaded", workbook.size()),
    ///     Err(e) => eprintln!("Error loading workbook: {}", e),
    /// }
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Workbook::from_bytes(file_name, bytes))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Whether both handles refer to the same upload
    pub fn same_upload(&self, other: &Workbook) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    fn reader(&self) -> Result<Xlsx<Cursor<&[u8]>>, LoadError> {
        Ok(open_workbook_from_rs(Cursor::new(self.bytes.as_slice()))?)
    }

    pub fn sheet_names(&self) -> Result<Vec<String>, LoadError> {
        Ok(self.reader()?.sheet_names())
    }

    /// Load one sheet into a reading table
    ///
    /// The first row is the header row. The `Fecha` column is parsed with
    /// invalid values coerced to missing, and the year and year-month
    /// columns are derived from it.
    ///
    /// # Arguments
    /// * `sheet` - Name of the worksheet to read
    ///
    /// # Returns
    /// * `Result<ReadingTable, LoadError>` - The readings and their data frame,
    ///   or [`LoadError::MissingTimestampColumn`] when the sheet has no `Fecha`
    ///
    /// # Examples
    /// ```no_run
    /// use sensor_dashboard::loader::{ORIGINAL_SHEET, Workbook};
    ///
    /// let workbook = Workbook::open("sensores.xlsx").unwrap();
    /// match workbook.load_sheet(ORIGINAL_SHEET) {
    ///     Ok(table) => println!("{} rows", table.len()),
    ///     Err(e) => eprintln!("Error reading sheet: {}", e),
    /// }
    /// ```
    pub fn load_sheet(&self, sheet: &str) -> Result<ReadingTable, LoadError> {
        let mut workbook = self.reader()?;
        if !workbook.sheet_names().iter().any(|name| name == sheet) {
            return Err(LoadError::SheetNotFound(sheet.to_string()));
        }

        let range = workbook.worksheet_range(sheet)?;
        let mut rows = range.rows();

        let header: Vec<String> = match rows.next() {
            Some(cells) => cells.iter().map(|c| c.to_string().trim().to_string()).collect(),
            None => Vec::new(),
        };

        let timestamp_idx = header
            .iter()
            .position(|name| name == TIMESTAMP_COLUMN)
            .ok_or_else(|| LoadError::MissingTimestampColumn {
                sheet: sheet.to_string(),
            })?;

        let sensor_idx = PerSensor::from_fn(|sensor| {
            let idx = header.iter().position(|name| name == sensor.label());
            if idx.is_none() {
                log::warn!("sheet '{}' has no {} column", sheet, sensor);
            }
            idx
        });

        let mut readings = Vec::with_capacity(range.height().saturating_sub(1));
        let mut undated = 0usize;
        for row in rows {
            let timestamp = row.get(timestamp_idx).and_then(cell_to_datetime);
            if timestamp.is_none() {
                undated += 1;
            }
            let values = sensor_idx.map(|_, idx| idx.and_then(|i| row.get(i)).and_then(cell_to_f64));
            readings.push(Reading::new(timestamp, values));
        }

        log::info!(
            "loaded sheet '{}' from {}: {} rows ({} without a valid date)",
            sheet,
            self.file_name,
            readings.len(),
            undated
        );

        Ok(ReadingTable::new(sheet, readings)?)
    }
}

/// Excel serial dates count days from this epoch (with the 1900 leap bug
/// already folded in for dates after February 1900).
fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    let millis = (serial * 86_400_000.0).round() as i64;
    excel_epoch().checked_add_signed(Duration::milliseconds(millis))
}

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Parse a textual timestamp, returning `None` for anything unrecognised
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    // Fractional seconds are dropped before matching
    let base = text.split('.').next().unwrap_or(text);
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(base, fmt) {
            return Some(ts);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn cell_to_datetime(cell: &Data) -> Option<NaiveDateTime> {
    match cell {
        Data::DateTime(dt) => dt.as_datetime(),
        Data::DateTimeIso(text) | Data::String(text) => parse_timestamp(text),
        Data::Float(serial) => serial_to_datetime(*serial),
        Data::Int(serial) => serial_to_datetime(*serial as f64),
        _ => None,
    }
}

fn cell_to_f64(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) if f.is_finite() => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(text) => text.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook as XlsxWorkbook, Worksheet};

    /// Build an xlsx file in memory: one sheet per `(name, header, rows)`.
    pub(crate) fn xlsx_bytes(sheets: &[(&str, &[&str], Vec<Vec<Cell>>)]) -> Vec<u8> {
        let mut workbook = XlsxWorkbook::new();
        for (name, header, rows) in sheets {
            let mut worksheet = Worksheet::new();
            worksheet.set_name(*name).unwrap();
            for (c, title) in header.iter().enumerate() {
                worksheet.write_string(0, c as u16, *title).unwrap();
            }
            for (r, row) in rows.iter().enumerate() {
                for (c, cell) in row.iter().enumerate() {
                    let (r, c) = ((r + 1) as u32, c as u16);
                    match cell {
                        Cell::Text(s) => {
                            worksheet.write_string(r, c, *s).unwrap();
                        }
                        Cell::Num(n) => {
                            worksheet.write_number(r, c, *n).unwrap();
                        }
                        Cell::Date(y, m, d) => {
                            let date = ExcelDateTime::from_ymd(*y, *m, *d).unwrap();
                            let format = Format::new().set_num_format("yyyy-mm-dd");
                            worksheet
                                .write_datetime_with_format(r, c, &date, &format)
                                .unwrap();
                        }
                        Cell::Blank => {}
                    }
                }
            }
            workbook.push_worksheet(worksheet);
        }
        workbook.save_to_buffer().unwrap()
    }

    #[derive(Clone, Copy, Debug)]
    pub(crate) enum Cell {
        Text(&'static str),
        Num(f64),
        /// A native date cell (year, month, day) with a date number format
        Date(u16, u8, u8),
        Blank,
    }

    pub(crate) const HEADER: &[&str] = &["Fecha", "P42", "P43", "P55"];

    fn sample_rows() -> Vec<Vec<Cell>> {
        use Cell::*;
        vec![
            vec![Text("2021-01-15 10:00:00"), Num(1.0), Num(2.0), Num(3.0)],
            vec![Text("2021-02-01"), Num(4.0), Blank, Num(6.0)],
            vec![Text("no es fecha"), Num(7.0), Num(8.0), Num(9.0)],
            // 2022-03-01 as an Excel serial number
            vec![Num(44621.0), Text("10.5"), Text("n/a"), Num(12.0)],
        ]
    }

    #[test]
    fn loads_sheet_and_coerces_invalid_dates() {
        let bytes = xlsx_bytes(&[(ORIGINAL_SHEET, HEADER, sample_rows())]);
        let workbook = Workbook::from_bytes("test.xlsx", bytes);
        let table = workbook.load_sheet(ORIGINAL_SHEET).unwrap();

        assert_eq!(table.sheet, ORIGINAL_SHEET);
        assert_eq!(table.len(), 4);
        assert_eq!(table.readings[0].year_month.as_deref(), Some("2021-01"));
        assert_eq!(table.readings[1].value(Sensor::P43), None);
        assert_eq!(table.readings[2].timestamp, None);
        assert_eq!(table.readings[2].value(Sensor::P42), Some(7.0));
        assert_eq!(table.readings[3].year_month.as_deref(), Some("2022-03"));
        assert_eq!(table.readings[3].value(Sensor::P42), Some(10.5));
        assert_eq!(table.readings[3].value(Sensor::P43), None);
    }

    #[test]
    fn reads_native_excel_date_cells() {
        let rows = vec![
            vec![Cell::Date(2019, 12, 31), Cell::Num(1.0), Cell::Num(2.0), Cell::Num(3.0)],
            vec![Cell::Date(2020, 1, 2), Cell::Num(4.0), Cell::Num(5.0), Cell::Num(6.0)],
        ];
        let bytes = xlsx_bytes(&[(ORIGINAL_SHEET, HEADER, rows)]);

        let mut xlsx: Xlsx<Cursor<&[u8]>> =
            open_workbook_from_rs(Cursor::new(bytes.as_slice())).unwrap();
        let range = xlsx.worksheet_range(ORIGINAL_SHEET).unwrap();
        assert!(matches!(range.get((1, 0)), Some(Data::DateTime(_))));

        let table = Workbook::from_bytes("fechas.xlsx", bytes)
            .load_sheet(ORIGINAL_SHEET)
            .unwrap();
        assert_eq!(
            table.readings[0].timestamp,
            NaiveDate::from_ymd_opt(2019, 12, 31).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
        assert_eq!(table.readings[0].year, Some(2019));
        assert_eq!(table.readings[0].year_month.as_deref(), Some("2019-12"));
        assert_eq!(table.readings[1].year, Some(2020));
        assert_eq!(table.readings[1].year_month.as_deref(), Some("2020-01"));
        assert_eq!(table.dated().count(), 2);
    }

    #[test]
    fn sheet_loads_share_the_upload_bytes() {
        let workbook = Workbook::from_bytes(
            "t.xlsx",
            xlsx_bytes(&[(ORIGINAL_SHEET, HEADER, sample_rows())]),
        );
        let copy = workbook.clone();
        workbook.load_sheet(ORIGINAL_SHEET).unwrap();
        assert!(workbook.same_upload(&copy));
        assert_eq!(Arc::strong_count(&workbook.bytes), 2);
    }

    #[test]
    fn missing_fecha_column_is_reported() {
        let header: &[&str] = &["Hora", "P42", "P43", "P55"];
        let bytes = xlsx_bytes(&[(
            ORIGINAL_SHEET,
            header,
            vec![vec![Cell::Text("x"), Cell::Num(1.0), Cell::Num(1.0), Cell::Num(1.0)]],
        )]);
        let workbook = Workbook::from_bytes("test.xlsx", bytes);
        match workbook.load_sheet(ORIGINAL_SHEET) {
            Err(LoadError::MissingTimestampColumn { sheet }) => assert_eq!(sheet, ORIGINAL_SHEET),
            other => panic!("expected missing Fecha, got {:?}", other),
        }
    }

    #[test]
    fn unknown_sheet_is_reported() {
        let bytes = xlsx_bytes(&[(ORIGINAL_SHEET, HEADER, sample_rows())]);
        let workbook = Workbook::from_bytes("test.xlsx", bytes);
        assert!(matches!(
            workbook.load_sheet(COMPLETED_SHEET),
            Err(LoadError::SheetNotFound(_))
        ));
        assert_eq!(workbook.sheet_names().unwrap(), vec![ORIGINAL_SHEET.to_string()]);
    }

    #[test]
    fn missing_sensor_column_reads_as_empty_series() {
        let header: &[&str] = &["Fecha", "P42"];
        let bytes = xlsx_bytes(&[(
            ORIGINAL_SHEET,
            header,
            vec![vec![Cell::Text("2020-05-05"), Cell::Num(3.0)]],
        )]);
        let table = Workbook::from_bytes("t.xlsx", bytes)
            .load_sheet(ORIGINAL_SHEET)
            .unwrap();
        assert_eq!(table.readings[0].value(Sensor::P42), Some(3.0));
        assert_eq!(table.readings[0].value(Sensor::P55), None);
    }

    #[test]
    fn garbage_bytes_are_a_workbook_error() {
        let workbook = Workbook::from_bytes("bad.xlsx", b"not a spreadsheet".to_vec());
        assert!(matches!(
            workbook.load_sheet(ORIGINAL_SHEET),
            Err(LoadError::Workbook(_))
        ));
    }

    #[test]
    fn opens_workbook_from_disk() {
        let bytes = xlsx_bytes(&[(COMPLETED_SHEET, HEADER, sample_rows())]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensores.xlsx");
        std::fs::write(&path, bytes).unwrap();

        let workbook = Workbook::open(&path).unwrap();
        assert_eq!(workbook.file_name, "sensores.xlsx");
        assert_eq!(workbook.load_sheet(COMPLETED_SHEET).unwrap().len(), 4);
    }

    #[test]
    fn parses_common_timestamp_shapes() {
        assert!(parse_timestamp("2021-06-30T23:59:59").is_some());
        assert!(parse_timestamp("2021-06-30 23:59:59.250").is_some());
        assert!(parse_timestamp("30/06/2021").is_some());
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("junio").is_none());
    }

    #[test]
    fn serial_dates_use_excel_epoch() {
        let ts = serial_to_datetime(44621.5).unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M").to_string(), "2022-03-01 12:00");
        assert!(serial_to_datetime(-3.0).is_none());
    }
}
