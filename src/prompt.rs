//! Prompt texts sent to the text generator.
//!
//! The wording is Spanish, as the operators read it; numbers are written with
//! thousands separators and two decimals, dates as `YYYY-MM-DD`.

use crate::aggregate::SheetSummary;
use crate::format::format_thousands;
use crate::loader::{COMPLETED_SHEET, ORIGINAL_SHEET};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PromptError {
    #[error("sheet '{0}' has no valid dates")]
    NoDatedRows(String),
}

fn date_range(summary: &SheetSummary) -> Result<(NaiveDate, NaiveDate), PromptError> {
    match (summary.first_date, summary.last_date) {
        (Some(first), Some(last)) => Ok((first, last)),
        _ => Err(PromptError::NoDatedRows(summary.sheet.clone())),
    }
}

fn ymd(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn mean_text(mean: Option<f64>) -> String {
    mean.map(format_thousands).unwrap_or_else(|| "nan".to_string())
}

/// Prompt asking for a general conclusion about one sheet
pub fn conclusion_prompt(summary: &SheetSummary) -> Result<String, PromptError> {
    let (first, last) = date_range(summary)?;
    Ok(format!(
        "Tengo datos de sensores con las siguientes sumas totales:
P42: {p42}
P43: {p43}
P55: {p55}

El rango de fechas va desde {first} hasta {last}.

También hay datos de máximos y mínimos para cada sensor.

Por favor, genera una conclusión general que resuma las tendencias, valores relevantes y posibles observaciones útiles para un análisis rápido.
",
        p42 = format_thousands(summary.sums.p42),
        p43 = format_thousands(summary.sums.p43),
        p55 = format_thousands(summary.sums.p55),
        first = ymd(first),
        last = ymd(last),
    ))
}

/// Markdown block describing one sheet inside the comparison prompt
pub fn sheet_summary_block(summary: &SheetSummary) -> Result<String, PromptError> {
    let (first, last) = date_range(summary)?;
    Ok(format!(
        "📄 **{sheet}**
- Fechas: desde {first} hasta {last}
- Suma P42: {s42}
- Suma P43: {s43}
- Suma P55: {s55}
- Promedio P42: {m42}
- Promedio P43: {m43}
- Promedio P55: {m55}
",
        sheet = summary.sheet,
        first = ymd(first),
        last = ymd(last),
        s42 = format_thousands(summary.sums.p42),
        s43 = format_thousands(summary.sums.p43),
        s55 = format_thousands(summary.sums.p55),
        m42 = mean_text(summary.means.p42),
        m43 = mean_text(summary.means.p43),
        m55 = mean_text(summary.means.p55),
    ))
}

/// Prompt asking for a comparative conclusion of the raw and completed sheets
pub fn comparison_prompt(
    original: &SheetSummary,
    completed: &SheetSummary,
) -> Result<String, PromptError> {
    let original_block = sheet_summary_block(original)?;
    let completed_block = sheet_summary_block(completed)?;
    Ok(format!(
        "Tengo dos hojas de un archivo Excel con datos históricos de sensores del volcán Antisana: una hoja llamada \"{orig}\" y otra llamada \"{comp}\".

La hoja \"{orig}\" contiene los datos base, mientras que la hoja \"{comp}\" incluye datos completados o corregidos para mejorar el registro.

A continuación, te presento un resumen estadístico de cada hoja:

{original_block}
{completed_block}
El objetivo es utilizar los datos de la hoja \"{comp}\" para mejorar el sistema de mantenimiento preventivo de los sensores del Antisana y evitar posibles desastres derivados de fallos o datos incompletos.

Por favor, genera una conclusión general comparativa que incluya:

- Principales diferencias y tendencias entre ambas hojas.
- Identificación de mejoras significativas en la calidad o consistencia de los datos.
- Potenciales problemas o áreas donde aún se puede mejorar el sistema.
- Recomendaciones prácticas para optimizar el mantenimiento y garantizar la fiabilidad de los sensores basándote en los datos.
- Cómo estas mejoras podrían ayudar a prevenir fallos o desastres futuros.

Responde de forma clara, precisa y orientada a la acción.
",
        orig = ORIGINAL_SHEET,
        comp = COMPLETED_SHEET,
    ))
}
