use std::{fs::File, io::Read, path::Path};

use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult};

/// Column roles and timestamp parsing rules of the raw CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvLayout {
    /// Column holding the observation timestamp.
    pub timestamp_column: String,
    /// Column holding the target (energy, Wh).
    pub target_column: String,
    /// `chrono` formats tried in order.
    pub timestamp_formats: Vec<String>,
}

impl Default for CsvLayout {
    fn default() -> Self {
        Self {
            timestamp_column: "date".into(),
            target_column: "Appliances".into(),
            timestamp_formats: vec!["%Y-%m-%d %H:%M:%S".into(), "%Y-%m-%dT%H:%M:%S".into()],
        }
    }
}

/// One timestamped row of sensor readings.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    /// Observation time.
    pub timestamp: NaiveDateTime,
    /// Readings aligned with [`RawFrame::columns`]; `None` marks a missing cell.
    pub readings: Vec<Option<f64>>,
    /// Target value; `None` when the cell is empty.
    pub target: Option<f64>,
}

/// Raw observations in chronological order plus their reading columns.
#[derive(Debug, Clone, Default)]
pub struct RawFrame {
    columns: Vec<String>,
    observations: Vec<RawObservation>,
    skipped_columns: Vec<String>,
}

impl RawFrame {
    /// Builds a frame from already parsed observations, sorting them by time.
    pub fn new(columns: Vec<String>, mut observations: Vec<RawObservation>) -> ForecastResult<Self> {
        for (idx, observation) in observations.iter().enumerate() {
            if observation.readings.len() != columns.len() {
                return Err(ForecastError::MalformedRow {
                    row: idx + 1,
                    reason: format!(
                        "{} readings for {} columns",
                        observation.readings.len(),
                        columns.len()
                    ),
                });
            }
        }
        observations.sort_by_key(|observation| observation.timestamp);
        Ok(Self {
            columns,
            observations,
            skipped_columns: Vec::new(),
        })
    }

    /// Reads a CSV file with a header row.
    pub fn from_path(path: impl AsRef<Path>, layout: &CsvLayout) -> ForecastResult<Self> {
        Self::from_reader(File::open(path.as_ref())?, layout)
    }

    /// Reads CSV data with a header row.
    ///
    /// Columns other than the timestamp and target are kept only when every
    /// non-empty cell parses as a number; the rest are reported as skipped.
    pub fn from_reader<R: Read>(reader: R, layout: &CsvLayout) -> ForecastResult<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);
        let headers = reader.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| ForecastError::MissingColumn(name.to_string()))
        };
        let timestamp_idx = position(&layout.timestamp_column)?;
        let target_idx = position(&layout.target_column)?;

        let records = reader.records().collect::<Result<Vec<StringRecord>, _>>()?;

        let mut reading_indices = Vec::new();
        let mut columns = Vec::new();
        let mut skipped_columns = Vec::new();
        for (idx, header) in headers.iter().enumerate() {
            if idx == timestamp_idx || idx == target_idx {
                continue;
            }
            let numeric = records
                .iter()
                .all(|record| parse_cell(record.get(idx).unwrap_or("")).is_ok());
            if numeric {
                reading_indices.push(idx);
                columns.push(header.to_string());
            } else {
                skipped_columns.push(header.to_string());
            }
        }

        let mut observations = Vec::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            let row = row + 1;
            let raw_timestamp = record.get(timestamp_idx).unwrap_or("");
            let timestamp = parse_timestamp(raw_timestamp, &layout.timestamp_formats).ok_or_else(
                || ForecastError::MalformedRow {
                    row,
                    reason: format!("unparsable timestamp `{raw_timestamp}`"),
                },
            )?;
            let target = parse_cell(record.get(target_idx).unwrap_or("")).map_err(|raw| {
                ForecastError::MalformedRow {
                    row,
                    reason: format!("target `{}` is not numeric: `{raw}`", layout.target_column),
                }
            })?;
            let readings = reading_indices
                .iter()
                .map(|&idx| parse_cell(record.get(idx).unwrap_or("")).unwrap_or(None))
                .collect();
            observations.push(RawObservation {
                timestamp,
                readings,
                target,
            });
        }

        let mut frame = Self::new(columns, observations)?;
        frame.skipped_columns = skipped_columns;
        Ok(frame)
    }

    /// Reading column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Observations in chronological order.
    #[must_use]
    pub fn observations(&self) -> &[RawObservation] {
        &self.observations
    }

    /// Non-numeric columns left out while reading.
    #[must_use]
    pub fn skipped_columns(&self) -> &[String] {
        &self.skipped_columns
    }

    /// Position of a reading column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether the frame has no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Empty or non-finite cells are missing; other unparsable text is an error.
fn parse_cell(raw: &str) -> Result<Option<f64>, String> {
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        Ok(_) => Ok(None),
        Err(_) => Err(raw.to_string()),
    }
}

fn parse_timestamp(raw: &str, formats: &[String]) -> Option<NaiveDateTime> {
    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const SAMPLE: &str = "\
date,Appliances,lights,T_out,RH_out,station
2016-01-11 17:20:00,50,30,6.2,92,north
2016-01-11 17:00:00,60,30,6.6,92,north
2016-01-11 17:10:00,,40,,92,south
";

    #[test]
    fn reads_sorts_and_skips_text_columns() {
        let frame = RawFrame::from_reader(SAMPLE.as_bytes(), &CsvLayout::default()).unwrap();
        assert_eq!(frame.columns(), ["lights", "T_out", "RH_out"]);
        assert_eq!(frame.skipped_columns(), ["station"]);
        assert_eq!(frame.len(), 3);
        let minutes: Vec<u32> = frame
            .observations()
            .iter()
            .map(|observation| observation.timestamp.minute())
            .collect();
        assert_eq!(minutes, vec![0, 10, 20]);
        let middle = &frame.observations()[1];
        assert_eq!(middle.target, None);
        assert_eq!(middle.readings, vec![Some(40.0), None, Some(92.0)]);
    }

    #[test]
    fn missing_target_column_is_a_shape_error() {
        let layout = CsvLayout {
            target_column: "Energy".into(),
            ..CsvLayout::default()
        };
        let err = RawFrame::from_reader(SAMPLE.as_bytes(), &layout).unwrap_err();
        assert!(matches!(err, ForecastError::MissingColumn(ref name) if name == "Energy"));
    }

    #[test]
    fn bad_timestamp_names_the_row() {
        let data = "date,Appliances,T_out\nyesterday,10,1.0\n";
        let err = RawFrame::from_reader(data.as_bytes(), &CsvLayout::default()).unwrap_err();
        assert!(matches!(err, ForecastError::MalformedRow { row: 1, .. }));
    }
}
