//! # Counter table loading
//!
//! Parses date-indexed CSV exports of hourly counter readings (the bicycle
//! counter format: a timestamp column followed by one numeric column per
//! counter) into an in-memory table, and resamples them to daily totals.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use log::{debug, warn};

/// Calendar date, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Timestamp in the `MM/DD/YYYY hh:mm:ss AM` counter export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub date: Date,
    pub hour: u8,
}

impl FromStr for Timestamp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let date_part = parts.next().context("missing date part")?;
        let time_part = parts.next().context("missing time part")?;
        let meridiem = parts.next().context("missing AM/PM part")?;
        if parts.next().is_some() {
            bail!("trailing content in timestamp '{s}'");
        }

        let mut date_fields = date_part.split('/');
        let month: u8 = next_field(&mut date_fields, "month")?;
        let day: u8 = next_field(&mut date_fields, "day")?;
        let year: u16 = next_field(&mut date_fields, "year")?;
        if !(1..=12).contains(&month) {
            bail!("month {month} in '{date_part}' is out of range");
        }
        if day < 1 || day > days_in_month(year, month) {
            bail!("day {day} in '{date_part}' is out of range for the month");
        }

        let mut time_fields = time_part.split(':');
        let clock_hour: u8 = next_field(&mut time_fields, "hour")?;
        let minute: u8 = next_field(&mut time_fields, "minute")?;
        let second: u8 = next_field(&mut time_fields, "second")?;
        if time_fields.next().is_some() {
            bail!("trailing content in time '{time_part}'");
        }
        if !(1..=12).contains(&clock_hour) {
            bail!("clock hour {clock_hour} is out of range");
        }
        if minute > 59 || second > 59 {
            bail!("time '{time_part}' is out of range");
        }

        let hour = match meridiem {
            "AM" => clock_hour % 12,
            "PM" => clock_hour % 12 + 12,
            other => bail!("expected AM or PM, got '{other}'"),
        };

        Ok(Timestamp {
            date: Date { year, month, day },
            hour,
        })
    }
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

fn next_field<'a, T: FromStr>(
    fields: &mut impl Iterator<Item = &'a str>,
    name: &str,
) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = fields
        .next()
        .with_context(|| format!("missing {name} field"))?;
    raw.parse::<T>()
        .with_context(|| format!("'{raw}' is not a valid {name}"))
}

/// Date-indexed table of hourly counter readings.
///
/// Missing or unparseable cells are kept as `None` so downstream resampling
/// can decide how to treat them; they are never dropped silently.
#[derive(Debug, Clone)]
pub struct CounterTable {
    labels: Vec<String>,
    rows: Vec<(Timestamp, Vec<Option<f64>>)>,
}

/// Daily aggregation of a [`CounterTable`].
#[derive(Debug, Clone)]
pub struct DailyTable {
    pub labels: Vec<String>,
    pub rows: Vec<(Date, Vec<Option<f64>>)>,
}

impl CounterTable {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = csv::Reader::from_path(path)
            .with_context(|| format!("opening counter CSV {}", path.display()))?;
        Self::from_csv(reader)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::from_csv(csv::Reader::from_reader(reader))
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let headers = reader.headers().context("reading CSV headers")?;
        if headers.len() < 2 {
            bail!(
                "counter CSV needs a timestamp column plus at least one counter, got {} columns",
                headers.len()
            );
        }
        let labels: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();

        let mut rows = Vec::new();
        let mut missing_cells = 0usize;

        for (row_no, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("CSV row {row_no}"))?;
            let raw_ts = record.get(0).unwrap_or("");
            let timestamp: Timestamp = raw_ts
                .parse()
                .with_context(|| format!("CSV row {row_no}: bad timestamp"))?;

            let mut cells = Vec::with_capacity(labels.len());
            for col in 0..labels.len() {
                let raw = record.get(col + 1).unwrap_or("").trim();
                if raw.is_empty() {
                    missing_cells += 1;
                    cells.push(None);
                    continue;
                }
                match raw.parse::<f64>() {
                    Ok(v) => cells.push(Some(v)),
                    Err(_) => {
                        warn!(
                            "row {row_no}, column '{}': '{raw}' is not numeric, treating as missing",
                            labels[col]
                        );
                        missing_cells += 1;
                        cells.push(None);
                    }
                }
            }
            rows.push((timestamp, cells));
        }

        debug!(
            "loaded counter table: {} rows, {} columns, {} missing cells",
            rows.len(),
            labels.len(),
            missing_cells
        );

        Ok(CounterTable { labels, rows })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[(Timestamp, Vec<Option<f64>>)] {
        &self.rows
    }

    /// Series for one counter column, looked up by label.
    pub fn column(&self, label: &str) -> Result<Vec<(Timestamp, Option<f64>)>> {
        let idx = self
            .labels
            .iter()
            .position(|l| l == label)
            .with_context(|| format!("no column labelled '{label}'"))?;
        Ok(self.rows.iter().map(|(ts, cells)| (*ts, cells[idx])).collect())
    }

    /// Resamples hourly readings to per-day totals for each column.
    ///
    /// A day sums whatever readings are present; a day where a column has no
    /// readings at all yields `None` for that column.
    pub fn daily_totals(&self) -> DailyTable {
        let mut days: Vec<Date> = Vec::new();
        let mut totals: Vec<Vec<Option<f64>>> = Vec::new();

        for (ts, cells) in &self.rows {
            let slot = match days.last() {
                Some(last) if *last == ts.date => totals.len() - 1,
                _ => match days.iter().position(|d| *d == ts.date) {
                    Some(i) => i,
                    None => {
                        days.push(ts.date);
                        totals.push(vec![None; self.labels.len()]);
                        totals.len() - 1
                    }
                },
            };
            for (col, cell) in cells.iter().enumerate() {
                if let Some(v) = cell {
                    let entry = &mut totals[slot][col];
                    *entry = Some(entry.unwrap_or(0.0) + v);
                }
            }
        }

        let mut rows: Vec<(Date, Vec<Option<f64>>)> =
            days.into_iter().zip(totals).collect();
        rows.sort_by_key(|(date, _)| *date);

        DailyTable {
            labels: self.labels.clone(),
            rows,
        }
    }
}

impl DailyTable {
    /// Row-wise sum across all counter columns.
    ///
    /// A day is `None` only when every column is missing for that day.
    pub fn combined(&self) -> Vec<(Date, Option<f64>)> {
        self.rows
            .iter()
            .map(|(date, cells)| {
                let present: Vec<f64> = cells.iter().flatten().copied().collect();
                let total = if present.is_empty() {
                    None
                } else {
                    Some(present.iter().sum())
                };
                (*date, total)
            })
            .collect()
    }
}
