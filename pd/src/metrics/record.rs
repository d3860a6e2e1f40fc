//! EventRecord - labels, named values and a timestamp

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How consumers should interpret the values of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Values only ever go up for the lifetime of the producer
    #[default]
    Cumulative,
    /// Point-in-time sample
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cumulative => "cumulative",
            Self::Gauge => "gauge",
        }
    }
}

/// A single named value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetricValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{:.3}", v),
            Self::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

impl From<i32> for MetricValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// One unit of telemetry
///
/// Labels and values keep insertion order so the textual form is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    timestamp: DateTime<Utc>,
    kind: MetricKind,
    labels: Vec<(String, String)>,
    metrics: Vec<(String, MetricValue)>,
}

impl EventRecord {
    /// Create an empty record stamped with the current time
    pub fn new(kind: MetricKind) -> Self {
        Self::at(Utc::now(), kind)
    }

    /// Create an empty record with an explicit timestamp
    pub fn at(timestamp: DateTime<Utc>, kind: MetricKind) -> Self {
        Self {
            timestamp,
            kind,
            labels: Vec::new(),
            metrics: Vec::new(),
        }
    }

    /// Add (or replace) a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.labels.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.labels.push((key, value)),
        }
        self
    }

    /// Add (or replace) a named value
    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.metrics.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.metrics.push((name, value)),
        }
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn labels(&self) -> &[(String, String)] {
        &self.labels
    }

    pub fn metrics(&self) -> &[(String, MetricValue)] {
        &self.metrics
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Stable textual form: `<unix-secs> labels=<k=v,...> <name>=<value> ...`
impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.timestamp.timestamp())?;
        if !self.labels.is_empty() {
            f.write_str(" labels=")?;
            for (i, (k, v)) in self.labels.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}={}", k, v)?;
            }
        }
        for (name, value) in &self.metrics {
            write!(f, " {}={}", name, value)?;
        }
        Ok(())
    }
}
