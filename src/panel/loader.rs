//! CSV ingestion for raw country-year tables.

use super::Panel;
use crate::error::{PronosticarError, Result};
use std::io::Read;
use std::path::Path;

/// Reads a raw (entity, year) CSV into a [`Panel`].
///
/// Every column other than the entity and year columns is treated as
/// numeric. Thousands separators are stripped before parsing; values that
/// still fail to parse are recorded as missing (NaN), never silently
/// zeroed.
///
/// # Examples
///
/// ```no_run
/// use pronosticar::panel::PanelReader;
///
/// let panel = PanelReader::new()
///     .load("data/global-data.csv")
///     .expect("readable CSV");
/// println!("{} rows", panel.n_rows());
/// ```
#[derive(Debug, Clone)]
pub struct PanelReader {
    entity_col: String,
    year_col: String,
}

impl Default for PanelReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelReader {
    /// Creates a reader with the conventional `Entity`/`Year` column names.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entity_col: "Entity".to_string(),
            year_col: "Year".to_string(),
        }
    }

    /// Overrides the entity column name.
    #[must_use]
    pub fn with_entity_column(mut self, name: &str) -> Self {
        self.entity_col = name.to_string();
        self
    }

    /// Overrides the year column name.
    #[must_use]
    pub fn with_year_column(mut self, name: &str) -> Self {
        self.year_col = name.to_string();
        self
    }

    /// Loads a panel from a CSV file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, the header lacks the
    /// entity/year columns, a year fails to parse, or the resulting panel
    /// violates the (entity, year) uniqueness invariant.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Panel> {
        let reader = csv::Reader::from_path(path.as_ref())?;
        self.read(reader)
    }

    /// Loads a panel from any reader producing CSV text.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`PanelReader::load`].
    pub fn load_from_reader<R: Read>(&self, rdr: R) -> Result<Panel> {
        self.read(csv::Reader::from_reader(rdr))
    }

    fn read<R: Read>(&self, mut reader: csv::Reader<R>) -> Result<Panel> {
        let headers = reader.headers()?.clone();

        let entity_idx = headers
            .iter()
            .position(|h| h == self.entity_col)
            .ok_or_else(|| PronosticarError::missing_column(&self.entity_col))?;
        let year_idx = headers
            .iter()
            .position(|h| h == self.year_col)
            .ok_or_else(|| PronosticarError::missing_column(&self.year_col))?;

        let numeric_cols: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != entity_idx && *i != year_idx)
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut entities = Vec::new();
        let mut years = Vec::new();
        let mut columns: Vec<(String, Vec<f32>)> = numeric_cols
            .iter()
            .map(|(_, name)| (name.clone(), Vec::new()))
            .collect();

        let mut line = 1u64;
        for record in reader.records() {
            let record = record?;
            line += 1;

            let entity = record.get(entity_idx).unwrap_or("").trim();
            if entity.is_empty() {
                return Err(PronosticarError::CsvParse {
                    line,
                    message: format!("empty '{}' value", self.entity_col),
                });
            }

            let year_raw = record.get(year_idx).unwrap_or("").trim();
            let year: i32 = year_raw.parse().map_err(|_| PronosticarError::CsvParse {
                line,
                message: format!("'{year_raw}' is not a valid year"),
            })?;

            entities.push(entity.to_string());
            years.push(year);

            for (slot, (idx, _)) in columns.iter_mut().zip(numeric_cols.iter()) {
                let raw = record.get(*idx).unwrap_or("");
                slot.1.push(parse_numeric(raw));
            }
        }

        if entities.is_empty() {
            return Err(PronosticarError::empty_table("panel_load"));
        }

        let panel = Panel::new(entities, years, columns)?;
        log::info!(
            "loaded panel: {} rows, {} numeric columns",
            panel.n_rows(),
            panel.column_names().len()
        );
        Ok(panel)
    }
}

/// Strips formatting artifacts and coerces to f32; NaN marks missing.
fn parse_numeric(raw: &str) -> f32 {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return f32::NAN;
    }
    cleaned.parse().unwrap_or(f32::NAN)
}
