/// Daily meter and weather file parsers.
///
/// Input format: comma-delimited text with a header row. Column matching is
/// exact (case- and spelling-sensitive) — there is no fuzzy header
/// normalization, by design. Lines starting with '#' are comments; blank
/// lines are skipped. Rows whose required fields are missing or unparseable
/// are dropped, matching the pipeline's no-interpolation policy.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::model::{MeterReading, WeatherReading, COL_DAILY_MEAN_POWER};

const COL_METER_ID: &str = "meter_id";
const COL_DATE: &str = "date";

/// Parses a meter readings file.
///
/// Required columns: `meter_id`, `date` (YYYY-MM-DD), `daily_mean_power`.
/// Every other column is carried as an extra engineered feature; non-numeric
/// extra values drop the row.
pub fn parse_meter_csv(text: &str) -> Result<Vec<MeterReading>, String> {
    let (headers, data_lines) = split_header(text)?;
    let col_map = column_map(&headers);

    let meter_idx = *col_map
        .get(COL_METER_ID)
        .ok_or("Missing meter_id column")?;
    let date_idx = *col_map.get(COL_DATE).ok_or("Missing date column")?;
    let power_idx = *col_map
        .get(COL_DAILY_MEAN_POWER)
        .ok_or("Missing daily_mean_power column")?;

    let extra_columns: Vec<(String, usize)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| {
            ![COL_METER_ID, COL_DATE, COL_DAILY_MEAN_POWER].contains(&h.as_str())
        })
        .map(|(idx, h)| (h.clone(), idx))
        .collect();

    let mut readings = Vec::new();
    for line in data_lines {
        let fields: Vec<&str> = line.split(',').collect();

        let Some(meter_id) = field(&fields, meter_idx) else {
            continue;
        };
        let Some(date) = field(&fields, date_idx)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        else {
            continue;
        };
        let Some(daily_mean_power) =
            field(&fields, power_idx).and_then(|s| s.parse::<f64>().ok())
        else {
            continue;
        };

        let mut extra = BTreeMap::new();
        let mut complete = true;
        for (name, idx) in &extra_columns {
            match field(&fields, *idx).and_then(|s| s.parse::<f64>().ok()) {
                Some(value) => {
                    extra.insert(name.clone(), value);
                }
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            continue;
        }

        readings.push(MeterReading {
            meter_id: meter_id.to_string(),
            date,
            daily_mean_power,
            extra,
        });
    }

    Ok(readings)
}

/// Parses a weather file: a `date` column plus one numeric column per
/// weather feature. One record per date.
pub fn parse_weather_csv(text: &str) -> Result<Vec<WeatherReading>, String> {
    let (headers, data_lines) = split_header(text)?;
    let col_map = column_map(&headers);

    let date_idx = *col_map.get(COL_DATE).ok_or("Missing date column")?;
    let feature_columns: Vec<(String, usize)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.as_str() != COL_DATE)
        .map(|(idx, h)| (h.clone(), idx))
        .collect();

    let mut readings = Vec::new();
    for line in data_lines {
        let fields: Vec<&str> = line.split(',').collect();

        let Some(date) = field(&fields, date_idx)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        else {
            continue;
        };

        let mut features = BTreeMap::new();
        let mut complete = true;
        for (name, idx) in &feature_columns {
            match field(&fields, *idx).and_then(|s| s.parse::<f64>().ok()) {
                Some(value) => {
                    features.insert(name.clone(), value);
                }
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            continue;
        }

        readings.push(WeatherReading { date, features });
    }

    Ok(readings)
}

/// Splits a file into trimmed header names and data lines, skipping comment
/// and blank lines.
fn split_header(text: &str) -> Result<(Vec<String>, Vec<&str>), String> {
    let mut lines = text
        .lines()
        .filter(|line| !line.trim().starts_with('#') && !line.trim().is_empty());

    let header_line = lines.next().ok_or("No header line found")?;
    let headers: Vec<String> = header_line
        .split(',')
        .map(|h| h.trim().to_string())
        .collect();

    Ok((headers, lines.collect()))
}

fn column_map(headers: &[String]) -> HashMap<&str, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, h)| (h.as_str(), idx))
        .collect()
}

fn field<'a>(fields: &'a [&str], idx: usize) -> Option<&'a str> {
    fields
        .get(idx)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}
