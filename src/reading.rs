use chrono::{Datelike, NaiveDateTime};
use polars::prelude::{DataFrame, IntoColumn, NamedFrom, PolarsResult, Series};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Header of the timestamp column every usable sheet must carry.
pub const TIMESTAMP_COLUMN: &str = "Fecha";
/// Derived calendar year column.
pub const YEAR_COLUMN: &str = "Año";
/// Derived year-month bucket column (`YYYY-MM`).
pub const YEAR_MONTH_COLUMN: &str = "AñoMes";

/// Sensor channels recorded in each reading
///
/// The channels are opaque numeric series; only their labels matter to the
/// dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sensor {
    P42,
    P43,
    P55,
}

impl Sensor {
    /// All channels, in the order they are displayed
    pub const ALL: [Sensor; 3] = [Sensor::P42, Sensor::P43, Sensor::P55];

    /// Column header used by the spreadsheet for this channel
    pub fn label(self) -> &'static str {
        match self {
            Sensor::P42 => "P42",
            Sensor::P43 => "P43",
            Sensor::P55 => "P55",
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Sensor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sensor::ALL
            .into_iter()
            .find(|sensor| sensor.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown sensor: {}", s))
    }
}

/// One value per sensor channel
///
/// Serialised as an object keyed by the channel labels, e.g.
/// `{"P42": 1.0, "P43": 2.0, "P55": 3.0}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerSensor<T> {
    #[serde(rename = "P42")]
    pub p42: T,
    #[serde(rename = "P43")]
    pub p43: T,
    #[serde(rename = "P55")]
    pub p55: T,
}

impl<T> PerSensor<T> {
    pub fn from_fn(mut f: impl FnMut(Sensor) -> T) -> Self {
        PerSensor {
            p42: f(Sensor::P42),
            p43: f(Sensor::P43),
            p55: f(Sensor::P55),
        }
    }

    pub fn get(&self, sensor: Sensor) -> &T {
        match sensor {
            Sensor::P42 => &self.p42,
            Sensor::P43 => &self.p43,
            Sensor::P55 => &self.p55,
        }
    }

    pub fn get_mut(&mut self, sensor: Sensor) -> &mut T {
        match sensor {
            Sensor::P42 => &mut self.p42,
            Sensor::P43 => &mut self.p43,
            Sensor::P55 => &mut self.p55,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Sensor, &T) -> U) -> PerSensor<U> {
        PerSensor::from_fn(|sensor| f(sensor, self.get(sensor)))
    }

    /// Iterate `(sensor, value)` pairs in display order
    pub fn iter(&self) -> impl Iterator<Item = (Sensor, &T)> + '_ {
        Sensor::ALL.into_iter().map(move |sensor| (sensor, self.get(sensor)))
    }
}

/// A single timestamped observation
///
/// `year` and `year_month` are derived from `timestamp` when the row is
/// loaded and are `None` whenever the timestamp is missing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: Option<NaiveDateTime>,
    pub year: Option<i32>,
    /// Year-month bucket label (`YYYY-MM`)
    pub year_month: Option<String>,
    pub values: PerSensor<Option<f64>>,
}

impl Reading {
    pub fn new(timestamp: Option<NaiveDateTime>, values: PerSensor<Option<f64>>) -> Self {
        Reading {
            timestamp,
            year: timestamp.map(|ts| ts.year()),
            year_month: timestamp.map(|ts| year_month_label(&ts)),
            values,
        }
    }

    pub fn value(&self, sensor: Sensor) -> Option<f64> {
        *self.values.get(sensor)
    }
}

/// Format a timestamp as its monthly bucket label
pub fn year_month_label(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m").to_string()
}

/// All readings of one sheet, in file order
///
/// The table is built once per upload and never mutated afterwards. Next to
/// the rows it keeps a data frame with the columns `Fecha`, `Año`, `AñoMes`,
/// `P42`, `P43` and `P55`, which the aggregations group over.
#[derive(Clone, Debug)]
pub struct ReadingTable {
    pub sheet: String,
    pub readings: Vec<Reading>,
    frame: DataFrame,
}

impl ReadingTable {
    pub fn new(sheet: impl Into<String>, readings: Vec<Reading>) -> PolarsResult<Self> {
        let frame = reading_frame(&readings)?;
        Ok(ReadingTable {
            sheet: sheet.into(),
            readings,
            frame,
        })
    }

    /// Columnar view of the readings; missing values are nulls
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Non-missing values of one channel, in row order
    pub fn values(&self, sensor: Sensor) -> impl Iterator<Item = f64> + '_ {
        self.readings.iter().filter_map(move |r| r.value(sensor))
    }

    /// Rows whose timestamp parsed to a valid date
    pub fn dated(&self) -> impl Iterator<Item = &Reading> + '_ {
        self.readings.iter().filter(|r| r.timestamp.is_some())
    }
}

fn reading_frame(readings: &[Reading]) -> PolarsResult<DataFrame> {
    let timestamps: Vec<Option<NaiveDateTime>> = readings.iter().map(|r| r.timestamp).collect();
    let years: Vec<Option<i32>> = readings.iter().map(|r| r.year).collect();
    let months: Vec<Option<String>> = readings.iter().map(|r| r.year_month.clone()).collect();

    let mut columns = vec![
        Series::new(TIMESTAMP_COLUMN.into(), timestamps).into_column(),
        Series::new(YEAR_COLUMN.into(), years).into_column(),
        Series::new(YEAR_MONTH_COLUMN.into(), months).into_column(),
    ];
    for sensor in Sensor::ALL {
        let values: Vec<Option<f64>> = readings.iter().map(|r| r.value(sensor)).collect();
        columns.push(Series::new(sensor.label().into(), values).into_column());
    }
    DataFrame::new(columns)
}
