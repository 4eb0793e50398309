/*!
# Sensor Dashboard

A browser-based dashboard for the readings of three field sensors (P42, P43,
P55), built in Rust.

## Overview

A user uploads an Excel workbook holding two sheets of the same series: the
raw readings (`Original`) and a gap-filled copy (`Completado_Filas`). The
dashboard shows one of seven aggregate views of the selected sheet and can
ask a text-generation service for a written conclusion about the sheet or a
comparison of both sheets.

## Architecture

### Data Layer
- **reading**: Sensor identifiers and the in-memory reading table
- **loader**: Workbook parsing with calamine (`Fecha` plus sensor columns)
- **aggregate**: Totals, yearly and monthly groupings, extrema, histograms

### Presentation Layer
- **view**: The seven views, their aggregates and rendered panels
- **graph**: SVG line, bar and pie charts drawn with plotters
- **format**: Thousands-separated number formatting
- **downloader**: CSV and XLSX export of a view's table

### Summaries
- **prompt**: Prompt text built from sheet summaries
- **llm**: Text-generation client (Gemini `generateContent`)
- **summary**: Conclusion and comparison requests

### Web Layer (feature `web`)
- **session**: Per-browser workbook and sheet cache behind a cookie
- **app**: axum routing, upload handling and page rendering

## REST API Endpoints

- `GET /` - Dashboard page (`hoja`, `vista` query parameters)
- `POST /upload` - Multipart workbook upload (field `archivo`)
- `POST /conclusion`, `POST /comparacion` - AI requests
- `GET /api/views/{view}` - Aggregate of a view as JSON
- `GET /export/{view}?format=csv|xlsx` - Aggregate download
- `GET /health` - Liveness check
*/

pub mod aggregate;
pub mod config;
pub mod downloader;
pub mod format;
pub mod graph;
pub mod llm;
pub mod loader;
pub mod prompt;
pub mod reading;
pub mod summary;
pub mod view;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod session;

pub use config::DashboardConfig;
pub use loader::{LoadError, Workbook};
pub use reading::{PerSensor, Reading, ReadingTable, Sensor};
pub use view::{View, ViewData};

/// Initialize logging from `RUST_LOG`, defaulting to `info`
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
