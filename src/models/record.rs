//! Input rows and the typed records normalized from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One raw input row: column name to free-form cell text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow(pub BTreeMap<String, String>);

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for constructing rows in code.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// First non-blank value among columns whose normalized name is in `aliases`.
    ///
    /// Column names are compared lowercase with `_`, `-` and spaces removed,
    /// so `UTCDateTime`, `utc_datetime` and `UTC DateTime` all match `utcdatetime`.
    pub fn lookup(&self, aliases: &[&str]) -> Option<&str> {
        for alias in aliases {
            for (column, value) in &self.0 {
                if normalize_column(column) == *alias {
                    let trimmed = value.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed);
                    }
                }
            }
        }
        None
    }

    /// Build a row from a JSON object, rendering scalar cells as text.
    ///
    /// `null` cells are dropped; nested arrays and objects are kept as JSON text.
    pub fn from_json_object(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        object
            .iter()
            .filter_map(|(column, value)| {
                let text = match value {
                    serde_json::Value::Null => return None,
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((column.clone(), text))
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn normalize_column(column: &str) -> String {
    column
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// A single observation for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub local_timestamp: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub country: Option<String>,
    pub cell_type: String,
}

impl LocationRecord {
    /// Both coordinates, when the row carried a usable location.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn has_location(&self) -> bool {
        self.coordinates().is_some()
    }
}
