//! AI-written conclusions for the current sheet and for the sheet comparison.

use crate::aggregate::summarize;
use crate::llm::{LlmError, TextGenerator};
use crate::loader::{COMPLETED_SHEET, LoadError, ORIGINAL_SHEET, Workbook};
use crate::prompt::{self, PromptError};
use crate::reading::ReadingTable;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Why a conclusion could not be produced
///
/// None of these end the session; they are shown inline next to the button
/// that triggered the request.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("text generation is not configured (missing API key)")]
    NotConfigured,
    #[error("error reading sheet '{sheet}': {source}")]
    Sheet {
        sheet: String,
        #[source]
        source: LoadError,
    },
    #[error("could not aggregate the sheet: {0}")]
    Aggregate(#[from] PolarsError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("text generation failed: {0}")]
    Generation(#[from] LlmError),
}

/// Ask for a general conclusion about one loaded sheet
pub async fn sheet_conclusion(
    generator: Option<&dyn TextGenerator>,
    table: &ReadingTable,
) -> Result<String, SummaryError> {
    let generator = generator.ok_or(SummaryError::NotConfigured)?;
    let prompt = prompt::conclusion_prompt(&summarize(table)?)?;
    log::info!("generating conclusion for sheet '{}'", table.sheet);
    Ok(generator.generate(&prompt).await?)
}

/// Load both expected sheets independently and ask for a comparison
pub async fn sheet_comparison(
    generator: Option<&dyn TextGenerator>,
    workbook: &Workbook,
) -> Result<String, SummaryError> {
    let generator = generator.ok_or(SummaryError::NotConfigured)?;

    let load = |sheet: &str| {
        workbook
            .load_sheet(sheet)
            .map_err(|source| SummaryError::Sheet {
                sheet: sheet.to_string(),
                source,
            })
    };
    let original = load(ORIGINAL_SHEET)?;
    let completed = load(COMPLETED_SHEET)?;

    let prompt = prompt::comparison_prompt(&summarize(&original)?, &summarize(&completed)?)?;
    log::info!("generating sheet comparison for {}", workbook.file_name);
    Ok(generator.generate(&prompt).await?)
}
