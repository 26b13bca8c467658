use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::{ObservationDate, SourceId};

/// Value of an optional extra column (volume, open, metric name, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One dated record inside a [`RawSeries`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: ObservationDate,
    pub value: f64,
    /// Extra columns in the order the fetcher produced them.
    pub extras: Vec<(String, FieldValue)>,
}

impl SeriesPoint {
    pub fn new(date: ObservationDate, value: f64) -> Self {
        Self {
            date,
            value,
            extras: Vec::new(),
        }
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.extras.push((name.into(), value.into()));
        self
    }
}

/// Result of one successful fetch for one symbol. An empty series means "no data in range".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawSeries {
    pub symbol: String,
    pub source: SourceId,
    pub points: Vec<SeriesPoint>,
}

impl RawSeries {
    pub fn new(symbol: impl Into<String>, source: SourceId, points: Vec<SeriesPoint>) -> Self {
        Self {
            symbol: symbol.into(),
            source,
            points,
        }
    }

    pub fn empty(symbol: impl Into<String>, source: SourceId) -> Self {
        Self::new(symbol, source, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}
