use crate::aggregate::Histogram;
use crate::reading::Sensor;
use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use serde::Serialize;
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("chart rendering failed: {0}")]
    Render(String),
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for ChartError {
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        ChartError::Render(err.to_string())
    }
}

/// Size of every rendered chart
///
/// Charts are emitted as SVG documents so they can be inlined straight into
/// the dashboard page.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChartOptions {
    /// Width of the chart in pixels
    pub width: u32,

    /// Height of the chart in pixels
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 420,
        }
    }
}

/// A chart ready to be embedded in the page
#[derive(Clone, Debug, Serialize)]
pub struct RenderedChart {
    pub title: String,
    pub svg: String,
}

/// Line colour of each sensor (blue, orange, red)
pub fn sensor_color(sensor: Sensor) -> RGBColor {
    match sensor {
        Sensor::P42 => RGBColor(31, 119, 180),
        Sensor::P43 => RGBColor(255, 127, 14),
        Sensor::P55 => RGBColor(214, 39, 40),
    }
}

/// Qualitative pastel palette used for the pie slices
const PIE_PALETTE: [RGBColor; 3] = [
    RGBColor(102, 194, 165),
    RGBColor(252, 141, 98),
    RGBColor(141, 160, 203),
];

/// One named line over a shared categorical x axis
///
/// `None` points break the line.
#[derive(Clone, Debug)]
pub struct LineSeriesData {
    pub name: String,
    pub color: RGBColor,
    pub points: Vec<Option<f64>>,
}

/// Draws one or more line series over categorical x labels (years or
/// year-month buckets).
///
/// Missing points split a series into separate runs. With `markers` every
/// point is also drawn as a small circle.
pub fn line_chart(
    title: &str,
    x_desc: &str,
    y_desc: &str,
    x_labels: &[String],
    series: &[LineSeriesData],
    markers: bool,
    options: &ChartOptions,
) -> Result<RenderedChart, ChartError> {
    let n = x_labels.len().max(1) as f64;
    let (y_min, y_max) = padded_bounds(
        series
            .iter()
            .flat_map(|s| s.points.iter().flatten().copied()),
    );

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 22).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(-0.5..n - 0.5, y_min..y_max)?;

        let label_at = |x: &f64| {
            let idx = x.round();
            if (x - idx).abs() > 1e-6 || idx < 0.0 {
                return String::new();
            }
            x_labels.get(idx as usize).cloned().unwrap_or_default()
        };

        chart
            .configure_mesh()
            .x_labels(x_labels.len().clamp(1, 12))
            .x_label_formatter(&label_at)
            .x_desc(x_desc)
            .y_desc(y_desc)
            .draw()?;

        for line in series {
            let color = line.color;
            let mut labelled = false;
            for run in runs(&line.points) {
                let anno = chart.draw_series(LineSeries::new(run.clone(), color.stroke_width(2)))?;
                if !labelled {
                    anno.label(line.name.as_str()).legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                    });
                    labelled = true;
                }
                if markers {
                    chart.draw_series(
                        run.iter()
                            .map(|&(x, y)| Circle::new((x, y), 3, color.filled())),
                    )?;
                }
            }
        }

        if series.len() > 1 {
            chart
                .configure_series_labels()
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()?;
        }

        root.present()?;
    }

    Ok(RenderedChart {
        title: title.to_string(),
        svg,
    })
}

/// Split a series at missing points into contiguous `(x, y)` runs
fn runs(points: &[Option<f64>]) -> Vec<Vec<(f64, f64)>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for (i, point) in points.iter().enumerate() {
        match point {
            Some(y) => current.push((i as f64, *y)),
            None if !current.is_empty() => out.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn padded_bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.5 };
    (lo - pad, hi + pad)
}

/// Draws the bins of a histogram as adjacent bars
pub fn histogram_chart(
    title: &str,
    histogram: &Histogram,
    options: &ChartOptions,
) -> Result<RenderedChart, ChartError> {
    let x_min = histogram.bins.first().map_or(0.0, |b| b.start);
    let x_max = histogram.bins.last().map_or(1.0, |b| b.end);
    let max_count = histogram.bins.iter().map(|b| b.count).max().unwrap_or(0).max(1);
    let color = sensor_color(histogram.sensor);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 22).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(x_min..x_max, 0.0..max_count as f64 * 1.1)?;

        chart
            .configure_mesh()
            .x_desc(histogram.sensor.label())
            .y_desc("count")
            .draw()?;

        chart.draw_series(histogram.bins.iter().map(|b| {
            Rectangle::new([(b.start, 0.0), (b.end, b.count as f64)], color.mix(0.7).filled())
        }))?;

        root.present()?;
    }

    Ok(RenderedChart {
        title: title.to_string(),
        svg,
    })
}

/// Draws a pie of `(label, share)` slices
///
/// Shares are normalised over the positive entries; non-positive entries
/// have no slice.
pub fn pie_chart(
    title: &str,
    slices: &[(String, f64)],
    options: &ChartOptions,
) -> Result<RenderedChart, ChartError> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;
        let area = root.titled(title, ("sans-serif", 22).into_font())?;
        draw_pie(&area, slices)?;
        root.present()?;
    }

    Ok(RenderedChart {
        title: title.to_string(),
        svg,
    })
}

fn draw_pie<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    slices: &[(String, f64)],
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let (w, h) = area.dim_in_pixel();
    let center = (w as f64 / 2.0, h as f64 / 2.0);
    let radius = (w.min(h) as f64 / 2.0 - 20.0).max(10.0);
    let total: f64 = slices.iter().map(|(_, v)| v.max(0.0)).sum();
    if total <= 0.0 {
        return Ok(());
    }

    let point = |angle: f64, r: f64| {
        (
            (center.0 + r * angle.cos()).round() as i32,
            (center.1 + r * angle.sin()).round() as i32,
        )
    };

    // Start at twelve o'clock and go clockwise
    let mut start = -PI / 2.0;
    for (i, (label, value)) in slices.iter().enumerate() {
        if *value <= 0.0 {
            continue;
        }
        let share = value / total;
        let sweep = share * 2.0 * PI;
        let steps = ((sweep / (PI / 90.0)).ceil() as usize).max(2);

        let mut outline = Vec::with_capacity(steps + 2);
        outline.push(point(0.0, 0.0));
        for s in 0..=steps {
            outline.push(point(start + sweep * s as f64 / steps as f64, radius));
        }
        let color = PIE_PALETTE[i % PIE_PALETTE.len()];
        area.draw(&Polygon::new(outline, color.filled()))?;

        let mid = start + sweep / 2.0;
        area.draw(&Text::new(
            format!("{} {:.1}%", label, share * 100.0),
            point(mid, radius * 0.6),
            ("sans-serif", 15).into_font(),
        ))?;

        start += sweep;
    }
    Ok(())
}
