//! The seven dashboard views.
//!
//! Every view is one aggregate computation ([`compute`]) followed by one
//! render call ([`render`]); nothing is shared or cached between views.

use crate::aggregate::{self, Histogram, MonthlyRow, SensorExtrema, YearlyRow};
use crate::format::{format_thousands, format_value};
use crate::graph::{
    self, ChartError, ChartOptions, LineSeriesData, RenderedChart, sensor_color,
};
use crate::reading::{PerSensor, ReadingTable, Sensor};
use polars::prelude::PolarsResult;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Presentation modes offered by the section menu
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Totals,
    YearlySums,
    MonthlyTrend,
    MonthlyMeans,
    Extrema,
    Distribution,
    Proportion,
}

impl View {
    /// All views, in menu order
    pub const ALL: [View; 7] = [
        View::Totals,
        View::YearlySums,
        View::MonthlyTrend,
        View::MonthlyMeans,
        View::Extrema,
        View::Distribution,
        View::Proportion,
    ];

    /// Identifier used in URLs and on the command line
    pub fn slug(self) -> &'static str {
        match self {
            View::Totals => "totales",
            View::YearlySums => "anuales",
            View::MonthlyTrend => "mensual",
            View::MonthlyMeans => "promedios",
            View::Extrema => "extremos",
            View::Distribution => "distribucion",
            View::Proportion => "proporcion",
        }
    }

    /// Menu label
    pub fn label(self) -> &'static str {
        match self {
            View::Totals => "Métricas Totales",
            View::YearlySums => "Gráficos Anuales",
            View::MonthlyTrend => "Gráfico Combinado por Mes",
            View::MonthlyMeans => "Promedios Mensuales",
            View::Extrema => "Máximos y Mínimos",
            View::Distribution => "Distribución",
            View::Proportion => "Proporción Total",
        }
    }

    pub fn heading(self) -> &'static str {
        match self {
            View::Totals => "📍 Métricas Totales",
            View::YearlySums => "📆 Suma por Año",
            View::MonthlyTrend => "📊 Tendencia mensual combinada",
            View::MonthlyMeans => "📉 Promedio mensual por sensor",
            View::Extrema => "📈 Máximos y mínimos por sensor",
            View::Distribution => "📊 Distribución de valores por sensor",
            View::Proportion => "📌 Porcentaje que representa cada sensor del total",
        }
    }

    /// Caption shown under the view
    pub fn info(self) -> &'static str {
        match self {
            View::Totals => {
                "📌 Esta sección muestra la suma total de cada sensor durante todo el período de tiempo."
            }
            View::YearlySums => {
                "📌 Estas gráficas muestran cómo varía la suma de cada sensor por año. Ideal para detectar tendencias generales."
            }
            View::MonthlyTrend => {
                "📌 Este gráfico permite visualizar la evolución mensual de los tres sensores simultáneamente. Los ceros han sido ocultos para evitar distorsiones."
            }
            View::MonthlyMeans => {
                "📌 Este gráfico muestra el promedio mensual por sensor. Útil para comparar comportamientos a lo largo del tiempo."
            }
            View::Extrema => {
                "📌 Aquí puedes ver cuándo se registraron los valores más altos y más bajos de cada sensor."
            }
            View::Distribution => {
                "📌 Histogramas que muestran la frecuencia de valores medidos por cada sensor."
            }
            View::Proportion => {
                "📌 Este gráfico muestra cuánto contribuye cada sensor al total general del periodo."
            }
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        View::ALL
            .into_iter()
            .find(|v| v.slug().eq_ignore_ascii_case(s) || v.label() == s)
            .ok_or_else(|| format!("unknown view: {}", s))
    }
}

/// The aggregate table behind a view
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewData {
    Totals { totals: PerSensor<f64> },
    YearlySums { rows: Vec<YearlyRow> },
    MonthlyTrend { rows: Vec<MonthlyRow<Option<f64>>> },
    MonthlyMeans { rows: Vec<MonthlyRow<Option<f64>>> },
    Extrema { sensors: Vec<SensorExtrema> },
    Distribution { histograms: Vec<Histogram> },
    Proportion { shares: Option<PerSensor<f64>> },
}

/// Run the single aggregation a view needs
///
/// # Arguments
///
/// * `table` - The rows of the selected sheet
/// * `view` - Which of the seven views to aggregate for
///
/// # Returns
///
/// The view's aggregate table, or the error of the underlying frame query
///
/// # Examples
///
/// ```ignore
/// let data = view::compute(&table, View::YearlySums)?;
/// ```
pub fn compute(table: &ReadingTable, view: View) -> PolarsResult<ViewData> {
    Ok(match view {
        View::Totals => ViewData::Totals {
            totals: aggregate::totals(table)?,
        },
        View::YearlySums => ViewData::YearlySums {
            rows: aggregate::yearly_sums(table)?,
        },
        View::MonthlyTrend => ViewData::MonthlyTrend {
            rows: aggregate::monthly_trend(table)?,
        },
        View::MonthlyMeans => ViewData::MonthlyMeans {
            rows: aggregate::monthly_means(table)?,
        },
        View::Extrema => ViewData::Extrema {
            sensors: aggregate::extrema(table)?,
        },
        View::Distribution => ViewData::Distribution {
            histograms: Sensor::ALL
                .into_iter()
                .map(|sensor| aggregate::histogram(table, sensor))
                .collect(),
        },
        View::Proportion => ViewData::Proportion {
            shares: aggregate::proportions(table)?,
        },
    })
}

/// A headline number
#[derive(Clone, Debug, Serialize)]
pub struct Metric {
    pub label: String,
    pub value: String,
}

/// Max/min card of one sensor
#[derive(Clone, Debug, Serialize)]
pub struct ExtremaCard {
    pub sensor: String,
    pub max: String,
    pub max_month: String,
    pub min: String,
    pub min_month: String,
}

/// Everything the page needs to show one view
#[derive(Clone, Debug, Serialize)]
pub struct ViewPanel {
    pub view: View,
    pub heading: String,
    pub info: String,
    pub metrics: Vec<Metric>,
    pub charts: Vec<RenderedChart>,
    pub extrema: Vec<ExtremaCard>,
    /// Shown when the view has nothing to draw
    pub notice: Option<String>,
}

impl ViewPanel {
    fn new(view: View) -> Self {
        ViewPanel {
            view,
            heading: view.heading().to_string(),
            info: view.info().to_string(),
            metrics: Vec::new(),
            charts: Vec::new(),
            extrema: Vec::new(),
            notice: None,
        }
    }
}

const NO_DATE: &str = "sin fecha";

/// Turn a computed aggregate into metric cards and charts
///
/// # Arguments
///
/// * `data` - Output of [`compute`]
/// * `options` - Chart size and marker settings
///
/// # Returns
///
/// The panel shown in the main column, with charts rendered to SVG
///
/// # Examples
///
/// ```ignore
/// let panel = view::render(&data, &ChartOptions::default())?;
/// assert_eq!(panel.view, View::Totals);
/// ```
pub fn render(data: &ViewData, options: &ChartOptions) -> Result<ViewPanel, ChartError> {
    let panel = match data {
        ViewData::Totals { totals } => {
            let mut panel = ViewPanel::new(View::Totals);
            panel.metrics = totals
                .iter()
                .map(|(sensor, sum)| Metric {
                    label: format!("Suma de {}", sensor),
                    value: format!("{} mil", format_thousands(*sum)),
                })
                .collect();
            panel
        }
        ViewData::YearlySums { rows } => {
            let mut panel = ViewPanel::new(View::YearlySums);
            let labels: Vec<String> = rows.iter().map(|r| r.year.to_string()).collect();
            let icons = ["🔵", "🟠", "🔴"];
            for (sensor, icon) in Sensor::ALL.into_iter().zip(icons) {
                let series = LineSeriesData {
                    name: sensor.label().to_string(),
                    color: sensor_color(sensor),
                    points: rows.iter().map(|r| Some(*r.sums.get(sensor))).collect(),
                };
                panel.charts.push(graph::line_chart(
                    &format!("{} Suma de {} por Año", icon, sensor),
                    "Año",
                    sensor.label(),
                    &labels,
                    &[series],
                    false,
                    options,
                )?);
            }
            panel
        }
        ViewData::MonthlyTrend { rows } => {
            let mut panel = ViewPanel::new(View::MonthlyTrend);
            panel.charts.push(monthly_chart(
                "Suma mensual de sensores (líneas se cortan con 0s)",
                "value",
                rows,
                false,
                options,
            )?);
            panel
        }
        ViewData::MonthlyMeans { rows } => {
            let mut panel = ViewPanel::new(View::MonthlyMeans);
            panel.charts.push(monthly_chart(
                "Promedio mensual de cada sensor",
                "Promedio",
                rows,
                true,
                options,
            )?);
            panel
        }
        ViewData::Extrema { sensors } => {
            let mut panel = ViewPanel::new(View::Extrema);
            panel.extrema = sensors
                .iter()
                .map(|ex| ExtremaCard {
                    sensor: ex.sensor.label().to_string(),
                    max: format_thousands(ex.max),
                    max_month: ex.max_month.clone().unwrap_or_else(|| NO_DATE.to_string()),
                    min: format_thousands(ex.min),
                    min_month: ex.min_month.clone().unwrap_or_else(|| NO_DATE.to_string()),
                })
                .collect();
            if panel.extrema.is_empty() {
                panel.notice = Some("No hay valores numéricos en los sensores.".to_string());
            }
            panel
        }
        ViewData::Distribution { histograms } => {
            let mut panel = ViewPanel::new(View::Distribution);
            for hist in histograms {
                panel.charts.push(graph::histogram_chart(
                    &format!("Distribución {}", hist.sensor),
                    hist,
                    options,
                )?);
            }
            panel
        }
        ViewData::Proportion { shares } => {
            let mut panel = ViewPanel::new(View::Proportion);
            match shares {
                Some(shares) => {
                    let slices: Vec<(String, f64)> = shares
                        .iter()
                        .map(|(sensor, share)| (sensor.label().to_string(), *share))
                        .collect();
                    panel.charts.push(graph::pie_chart(
                        "Proporción del total por sensor",
                        &slices,
                        options,
                    )?);
                }
                None => {
                    panel.notice =
                        Some("El total de los sensores es cero; no hay proporciones.".to_string());
                }
            }
            panel
        }
    };
    Ok(panel)
}

fn monthly_chart(
    title: &str,
    y_desc: &str,
    rows: &[MonthlyRow<Option<f64>>],
    markers: bool,
    options: &ChartOptions,
) -> Result<RenderedChart, ChartError> {
    let labels: Vec<String> = rows.iter().map(|r| r.month.clone()).collect();
    let series: Vec<LineSeriesData> = Sensor::ALL
        .into_iter()
        .map(|sensor| LineSeriesData {
            name: sensor.label().to_string(),
            color: sensor_color(sensor),
            points: rows.iter().map(|r| *r.values.get(sensor)).collect(),
        })
        .collect();
    graph::line_chart(title, "AñoMes", y_desc, &labels, &series, markers, options)
}

/// Column headers and rows of a view's aggregate, used by exports and the
/// text report
pub fn tabulate(data: &ViewData) -> (Vec<String>, Vec<Vec<String>>) {
    let sensor_headers = || Sensor::ALL.iter().map(|s| s.label().to_string());
    let opt = |v: Option<f64>| v.map(format_value).unwrap_or_default();

    match data {
        ViewData::Totals { totals } => (
            vec!["Sensor".to_string(), "Suma".to_string()],
            totals
                .iter()
                .map(|(s, v)| vec![s.label().to_string(), format_value(*v)])
                .collect(),
        ),
        ViewData::YearlySums { rows } => (
            std::iter::once("Año".to_string()).chain(sensor_headers()).collect(),
            rows.iter()
                .map(|r| {
                    std::iter::once(r.year.to_string())
                        .chain(r.sums.iter().map(|(_, v)| format_value(*v)))
                        .collect()
                })
                .collect(),
        ),
        ViewData::MonthlyTrend { rows } | ViewData::MonthlyMeans { rows } => (
            std::iter::once("AñoMes".to_string()).chain(sensor_headers()).collect(),
            rows.iter()
                .map(|r| {
                    std::iter::once(r.month.clone())
                        .chain(r.values.iter().map(|(_, v)| opt(*v)))
                        .collect()
                })
                .collect(),
        ),
        ViewData::Extrema { sensors } => (
            ["Sensor", "Máx", "Mes máx", "Mín", "Mes mín"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            sensors
                .iter()
                .map(|ex| {
                    vec![
                        ex.sensor.label().to_string(),
                        format_value(ex.max),
                        ex.max_month.clone().unwrap_or_default(),
                        format_value(ex.min),
                        ex.min_month.clone().unwrap_or_default(),
                    ]
                })
                .collect(),
        ),
        ViewData::Distribution { histograms } => (
            ["Sensor", "Desde", "Hasta", "Frecuencia"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            histograms
                .iter()
                .flat_map(|h| {
                    h.bins.iter().map(move |b| {
                        vec![
                            h.sensor.label().to_string(),
                            format_value(b.start),
                            format_value(b.end),
                            b.count.to_string(),
                        ]
                    })
                })
                .collect(),
        ),
        ViewData::Proportion { shares } => (
            vec!["Sensor".to_string(), "Proporción".to_string()],
            shares
                .iter()
                .flat_map(|s| s.iter().map(|(sensor, v)| (sensor, *v)).collect::<Vec<_>>())
                .map(|(sensor, v)| vec![sensor.label().to_string(), format_value(v)])
                .collect(),
        ),
    }
}

/// Render a view's aggregate as a Markdown section
pub fn to_markdown(data: &ViewData, view: View) -> String {
    let (headers, rows) = tabulate(data);
    let mut out = format!("## {}\n\n", view.heading());
    out.push_str(&format!("| {} |\n", headers.join(" | ")));
    out.push_str(&format!("|{}\n", "---|".repeat(headers.len())));
    for row in rows {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    out.push('\n');
    out.push_str(view.info());
    out.push('\n');
    out
}
