//! Group-by aggregations behind every dashboard view.
//!
//! Sums, means and extrema are polars lazy queries over the table's data
//! frame, grouped by `Año` or `AñoMes`. All functions recompute from the
//! full table; nothing is cached between calls.

use crate::reading::{PerSensor, ReadingTable, Sensor, YEAR_COLUMN, YEAR_MONTH_COLUMN};
use chrono::NaiveDate;
use polars::prelude::{DataFrame, Expr, IntoLazy, PolarsResult, SortMultipleOptions, col};
use serde::Serialize;

/// Number of bins used by every histogram, regardless of input size.
pub const HISTOGRAM_BINS: usize = 20;

/// Sums of one calendar year
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct YearlyRow {
    pub year: i32,
    pub sums: PerSensor<f64>,
}

/// One value per sensor for a year-month bucket
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlyRow<T> {
    pub month: String,
    pub values: PerSensor<T>,
}

/// Largest and smallest reading of a sensor and the month each first occurs in
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SensorExtrema {
    pub sensor: Sensor,
    pub max: f64,
    pub max_month: Option<String>,
    pub min: f64,
    pub min_month: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Equal-width value distribution of one sensor
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Histogram {
    pub sensor: Sensor,
    pub bins: Vec<HistogramBin>,
}

impl Histogram {
    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }
}

/// Statistics handed to the text generator for one sheet
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SheetSummary {
    pub sheet: String,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub sums: PerSensor<f64>,
    pub means: PerSensor<Option<f64>>,
}

/// One aggregate expression per sensor column, keeping the column names
fn sensor_exprs(agg: fn(Expr) -> Expr) -> Vec<Expr> {
    Sensor::ALL
        .into_iter()
        .map(|sensor| agg(col(sensor.label())))
        .collect()
}

fn f64_column(frame: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    Ok(frame
        .column(name)?
        .as_materialized_series()
        .f64()?
        .into_iter()
        .collect())
}

fn sensor_columns(frame: &DataFrame) -> PolarsResult<PerSensor<Vec<Option<f64>>>> {
    Ok(PerSensor {
        p42: f64_column(frame, Sensor::P42.label())?,
        p43: f64_column(frame, Sensor::P43.label())?,
        p55: f64_column(frame, Sensor::P55.label())?,
    })
}

/// Whole-table aggregate of every sensor (one output row)
fn sensor_scalars(table: &ReadingTable, agg: fn(Expr) -> Expr) -> PolarsResult<PerSensor<Option<f64>>> {
    let out = table
        .frame()
        .clone()
        .lazy()
        .select(sensor_exprs(agg))
        .collect()?;
    Ok(sensor_columns(&out)?.map(|_, values| values.first().copied().flatten()))
}

/// Rows with a non-null `key`, grouped by it in ascending order
fn grouped(table: &ReadingTable, key: &str, agg: fn(Expr) -> Expr) -> PolarsResult<DataFrame> {
    table
        .frame()
        .clone()
        .lazy()
        .filter(col(key).is_not_null())
        .group_by([col(key)])
        .agg(sensor_exprs(agg))
        .sort_by_exprs([col(key)], SortMultipleOptions::default())
        .collect()
}

/// Total of every sensor over the whole period. Missing values are skipped.
pub fn totals(table: &ReadingTable) -> PolarsResult<PerSensor<f64>> {
    Ok(sensor_scalars(table, Expr::sum)?.map(|_, sum| sum.unwrap_or(0.0)))
}

/// Mean of every sensor, `None` when a sensor has no values at all.
pub fn means(table: &ReadingTable) -> PolarsResult<PerSensor<Option<f64>>> {
    sensor_scalars(table, Expr::mean)
}

/// Sums grouped by calendar year, ascending. Undated rows are excluded.
pub fn yearly_sums(table: &ReadingTable) -> PolarsResult<Vec<YearlyRow>> {
    let out = grouped(table, YEAR_COLUMN, Expr::sum)?;
    let years = out.column(YEAR_COLUMN)?.as_materialized_series().i32()?;
    let sums = sensor_columns(&out)?;

    Ok(years
        .into_iter()
        .enumerate()
        .filter_map(|(i, year)| {
            Some(YearlyRow {
                year: year?,
                sums: sums.map(|_, column| column.get(i).copied().flatten().unwrap_or(0.0)),
            })
        })
        .collect())
}

/// One aggregate per sensor for every year-month bucket, ascending
fn monthly_rows(table: &ReadingTable, agg: fn(Expr) -> Expr) -> PolarsResult<Vec<MonthlyRow<Option<f64>>>> {
    let out = grouped(table, YEAR_MONTH_COLUMN, agg)?;
    let months = out.column(YEAR_MONTH_COLUMN)?.as_materialized_series().str()?;
    let values = sensor_columns(&out)?;

    Ok(months
        .into_iter()
        .enumerate()
        .filter_map(|(i, month)| {
            Some(MonthlyRow {
                month: month?.to_string(),
                values: values.map(|_, column| column.get(i).copied().flatten()),
            })
        })
        .collect())
}

/// Sums grouped by year-month, ascending.
pub fn monthly_sums(table: &ReadingTable) -> PolarsResult<Vec<MonthlyRow<f64>>> {
    Ok(monthly_rows(table, Expr::sum)?
        .into_iter()
        .map(|row| MonthlyRow {
            values: row.values.map(|_, sum| sum.unwrap_or(0.0)),
            month: row.month,
        })
        .collect())
}

/// Monthly sums with zero totals blanked out so trend lines break there
/// instead of dropping to the axis.
pub fn monthly_trend(table: &ReadingTable) -> PolarsResult<Vec<MonthlyRow<Option<f64>>>> {
    Ok(monthly_sums(table)?
        .into_iter()
        .map(|row| MonthlyRow {
            values: row.values.map(|_, sum| (*sum != 0.0).then_some(*sum)),
            month: row.month,
        })
        .collect())
}

/// Means grouped by year-month, ascending. A bucket with no values for a
/// sensor has no mean.
pub fn monthly_means(table: &ReadingTable) -> PolarsResult<Vec<MonthlyRow<Option<f64>>>> {
    monthly_rows(table, Expr::mean)
}

/// `AñoMes` of the first dated row matching `predicate`
fn first_month_where(predicate: Expr) -> Expr {
    col(YEAR_MONTH_COLUMN).filter(predicate).drop_nulls().first()
}

fn scalar_f64(frame: &DataFrame, name: &str) -> PolarsResult<Option<f64>> {
    Ok(frame.column(name)?.as_materialized_series().f64()?.get(0))
}

fn scalar_str(frame: &DataFrame, name: &str) -> PolarsResult<Option<String>> {
    Ok(frame
        .column(name)?
        .as_materialized_series()
        .str()?
        .get(0)
        .map(str::to_string))
}

/// Max and min of every sensor that has at least one value
///
/// The month reported next to each extreme is the month of the first dated
/// row holding that exact value; it is `None` only when every such row is
/// undated.
pub fn extrema(table: &ReadingTable) -> PolarsResult<Vec<SensorExtrema>> {
    let mut exprs = Vec::with_capacity(Sensor::ALL.len() * 4);
    for sensor in Sensor::ALL {
        let name = sensor.label();
        exprs.push(col(name).max().alias(format!("{name}_max")));
        exprs.push(first_month_where(col(name).eq(col(name).max())).alias(format!("{name}_max_month")));
        exprs.push(col(name).min().alias(format!("{name}_min")));
        exprs.push(first_month_where(col(name).eq(col(name).min())).alias(format!("{name}_min_month")));
    }
    let out = table.frame().clone().lazy().select(exprs).collect()?;

    let mut result = Vec::new();
    for sensor in Sensor::ALL {
        let name = sensor.label();
        let (Some(max), Some(min)) = (
            scalar_f64(&out, &format!("{name}_max"))?,
            scalar_f64(&out, &format!("{name}_min"))?,
        ) else {
            continue;
        };
        result.push(SensorExtrema {
            sensor,
            max,
            max_month: scalar_str(&out, &format!("{name}_max_month"))?,
            min,
            min_month: scalar_str(&out, &format!("{name}_min_month"))?,
        });
    }
    Ok(result)
}

/// Distribution of one sensor over [`HISTOGRAM_BINS`] equal-width bins
///
/// Bins span `[min, max]`; the last bin is closed on the right. A constant
/// series is centred in a unit-wide span and an empty one spans `[0, 1]`.
pub fn histogram(table: &ReadingTable, sensor: Sensor) -> Histogram {
    let values: Vec<f64> = table.values(sensor).collect();
    let (lo, hi) = match (
        values.iter().copied().reduce(f64::min),
        values.iter().copied().reduce(f64::max),
    ) {
        (Some(lo), Some(hi)) if hi > lo => (lo, hi),
        (Some(v), Some(_)) => (v - 0.5, v + 0.5),
        _ => (0.0, 1.0),
    };

    let width = (hi - lo) / HISTOGRAM_BINS as f64;
    let mut bins: Vec<HistogramBin> = (0..HISTOGRAM_BINS)
        .map(|i| HistogramBin {
            start: lo + width * i as f64,
            end: if i + 1 == HISTOGRAM_BINS {
                hi
            } else {
                lo + width * (i + 1) as f64
            },
            count: 0,
        })
        .collect();

    for v in values {
        let idx = (((v - lo) / width).floor() as usize).min(HISTOGRAM_BINS - 1);
        bins[idx].count += 1;
    }

    Histogram { sensor, bins }
}

/// Share of each sensor in the total of the positive sensor sums
///
/// A sensor whose sum is zero or negative gets a share of zero, the same
/// way the pie chart leaves it out. `None` when no sensor sum is positive.
pub fn proportions(table: &ReadingTable) -> PolarsResult<Option<PerSensor<f64>>> {
    let positive = totals(table)?.map(|_, sum| sum.max(0.0));
    let grand: f64 = positive.iter().map(|(_, v)| *v).sum();
    if grand <= 0.0 || !grand.is_finite() {
        return Ok(None);
    }
    Ok(Some(positive.map(|_, v| v / grand)))
}

/// Date range and per-sensor sums and means of a sheet
pub fn summarize(table: &ReadingTable) -> PolarsResult<SheetSummary> {
    let dates = table
        .dated()
        .filter_map(|r| r.timestamp.map(|ts| ts.date()));
    let (first_date, last_date) = dates.fold((None, None), |(first, last), d| {
        (
            Some(first.map_or(d, |f: NaiveDate| f.min(d))),
            Some(last.map_or(d, |l: NaiveDate| l.max(d))),
        )
    });

    Ok(SheetSummary {
        sheet: table.sheet.clone(),
        first_date,
        last_date,
        sums: totals(table)?,
        means: means(table)?,
    })
}
