//! What-If Forecaster Module
//!
//! Projects a dated metric forward under an optional growth scenario.
//! Granularity is chosen from data density, seasonality from granularity;
//! a seasonal model that cannot be fit falls back to a plain linear trend.
//! The output frame is tagged so a consumer can merge it with history.

use crate::error::{LodestarError, Result};
use crate::stats::{self, HoltWinters};
use crate::tabular;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Above this many dated observations the series is treated as daily.
const DAILY_THRESHOLD: usize = 60;

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Granularity {
    Daily,
    Monthly,
}

#[derive(Debug)]
pub struct ForecastOutput {
    /// Future rows only: the date column, the projected metric, and a
    /// `Type` column fixed to "Forecast".
    pub frame: DataFrame,
    /// Human-readable name of the model that produced the projection.
    pub model: String,
}

pub fn generate_forecast(
    df: &DataFrame,
    x_col: &str,
    y_col: &str,
    periods: usize,
    growth_factor: f64,
) -> Result<ForecastOutput> {
    if periods == 0 {
        return Err(LodestarError::Parse(
            "forecast horizon must be at least one period".to_string(),
        ));
    }
    let date_series = df
        .column(x_col)
        .map_err(|_| LodestarError::Parse(format!("column '{}' not found", x_col)))?;
    let value_series = df
        .column(y_col)
        .map_err(|_| LodestarError::Parse(format!("column '{}' not found", y_col)))?;

    let dates = tabular::date_values(date_series)?;
    let values = tabular::numeric_values(value_series)?;
    let mut observed: Vec<(NaiveDate, f64)> = dates
        .into_iter()
        .zip(values)
        .filter_map(|(d, v)| match (d, v) {
            (Some(d), Some(v)) if v.is_finite() => Some((d, v)),
            _ => None,
        })
        .collect();
    if observed.is_empty() {
        return Err(LodestarError::Parse(format!(
            "Invalid date column: no parseable dates in '{}'",
            x_col
        )));
    }
    observed.sort_by_key(|(d, _)| *d);

    let (granularity, season) = if observed.len() > DAILY_THRESHOLD {
        (Granularity::Daily, 7)
    } else {
        (Granularity::Monthly, 12)
    };
    let grid = match granularity {
        Granularity::Daily => daily_buckets(&observed),
        Granularity::Monthly => monthly_buckets(&observed),
    };
    let series: Vec<f64> = grid.iter().map(|(_, v)| *v).collect();
    let last_grid_date = grid
        .last()
        .map(|(d, _)| *d)
        .ok_or_else(|| LodestarError::Stats("empty aggregation grid".to_string()))?;

    let (mut forecast, mut model_label) = if series.len() >= 2 * season {
        match HoltWinters::fit(&series, season) {
            Ok(model) => {
                let kind = match granularity {
                    Granularity::Daily => "weekly",
                    Granularity::Monthly => "yearly",
                };
                (model.forecast(periods), format!("Holt-Winters ({} seasonality)", kind))
            }
            Err(e) => {
                debug!("seasonal fit failed ({}); falling back to linear trend", e);
                linear_forecast(&series, periods)?
            }
        }
    } else {
        linear_forecast(&series, periods)?
    };

    if growth_factor != 0.0 {
        let ramp = linspace(1.0, 1.0 + growth_factor, periods);
        for (value, multiplier) in forecast.iter_mut().zip(ramp) {
            *value *= multiplier;
        }
        model_label = format!(
            "{} with {:+.0}% growth scenario",
            model_label,
            growth_factor * 100.0
        );
    }

    let future = future_dates(last_grid_date, periods, granularity);
    let frame = DataFrame::new(vec![
        date_column(x_col, &future)?,
        Series::new(y_col, forecast),
        Series::new("Type", vec!["Forecast"; periods]),
    ])?;

    Ok(ForecastOutput {
        frame,
        model: model_label,
    })
}

fn linear_forecast(series: &[f64], periods: usize) -> Result<(Vec<f64>, String)> {
    let trend = stats::fit_linear_trend(series).ok_or_else(|| {
        LodestarError::Stats(
            "not enough usable points for a trend line (need at least 2)".to_string(),
        )
    })?;
    let n = series.len();
    let values = (0..periods)
        .map(|i| trend.predict((n + i) as f64))
        .collect();
    Ok((values, "Linear Regression".to_string()))
}

/// Evenly spaced values from `start` to `end` inclusive.
pub(crate) fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..count)
            .map(|i| start + (end - start) * i as f64 / (count - 1) as f64)
            .collect(),
    }
}

/// Sum duplicate days and fill calendar gaps with zero.
pub(crate) fn daily_buckets(observed: &[(NaiveDate, f64)]) -> Vec<(NaiveDate, f64)> {
    let mut sums: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (d, v) in observed {
        *sums.entry(*d).or_insert(0.0) += v;
    }
    let (first, last) = match (sums.keys().next(), sums.keys().next_back()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return Vec::new(),
    };
    let mut out = Vec::new();
    let mut day = first;
    loop {
        out.push((day, sums.get(&day).copied().unwrap_or(0.0)));
        if day == last {
            break;
        }
        day += chrono::Duration::days(1);
    }
    out
}

/// Sum values into calendar months (stamped at month end) and fill missing
/// months with zero.
pub(crate) fn monthly_buckets(observed: &[(NaiveDate, f64)]) -> Vec<(NaiveDate, f64)> {
    let mut sums: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for (d, v) in observed {
        *sums.entry((d.year(), d.month())).or_insert(0.0) += v;
    }
    let (first, last) = match (sums.keys().next(), sums.keys().next_back()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return Vec::new(),
    };
    let mut out = Vec::new();
    let (mut year, mut month) = first;
    loop {
        let value = sums.get(&(year, month)).copied().unwrap_or(0.0);
        if let Some(stamp) = month_end(year, month) {
            out.push((stamp, value));
        }
        if (year, month) == last {
            break;
        }
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    out
}

pub(crate) fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1).map(|d| d - chrono::Duration::days(1))
}

fn future_dates(last: NaiveDate, periods: usize, granularity: Granularity) -> Vec<NaiveDate> {
    match granularity {
        Granularity::Daily => (1..=periods as i64)
            .map(|i| last + chrono::Duration::days(i))
            .collect(),
        Granularity::Monthly => {
            let mut out = Vec::new();
            let mut year = last.year();
            let mut month = last.month();
            for _ in 0..periods {
                month += 1;
                if month > 12 {
                    month = 1;
                    year += 1;
                }
                if let Some(stamp) = month_end(year, month) {
                    out.push(stamp);
                }
            }
            out
        }
    }
}

fn date_column(name: &str, dates: &[NaiveDate]) -> Result<Series> {
    let days: Vec<i32> = dates
        .iter()
        .map(|d| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
        .collect();
    Ok(Series::new(name, days).cast(&DataType::Date)?)
}
