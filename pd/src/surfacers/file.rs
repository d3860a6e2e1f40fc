//! File surfacer - persists records to a JSONL file
//!
//! Each record becomes one JSON line. The file is opened when the surfacer is
//! built, so a bad path fails prober initialization instead of the first write.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SurfacerDef;
use crate::logger::Logger;
use crate::metrics::EventRecord;

use super::{Surfacer, SurfacerError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileOptions {
    path: PathBuf,
    #[serde(default)]
    append: bool,
}

/// Surfacer that writes JSON lines
pub struct FileSurfacer {
    name: String,
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    logger: Logger,
}

impl FileSurfacer {
    /// Build from a config definition (`options.path`, optional `options.append`)
    pub fn from_def(def: &SurfacerDef, logger: Logger) -> Result<Self, SurfacerError> {
        let opts: FileOptions =
            serde_yaml::from_value(def.options.clone()).map_err(|e| SurfacerError::InvalidOptions {
                name: def.name().to_string(),
                reason: e.to_string(),
            })?;
        Self::open(def.name(), &opts.path, opts.append, logger)
    }

    /// Open (or create) `path`; truncates unless `append` is set
    pub fn open(name: &str, path: &Path, append: bool, logger: Logger) -> Result<Self, SurfacerError> {
        debug!(%name, ?path, append, "FileSurfacer::open: called");
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = if append {
            OpenOptions::new().create(true).append(true).open(path)?
        } else {
            File::create(path)?
        };

        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
            logger,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, record: &EventRecord) -> Result<(), SurfacerError> {
        let json = serde_json::to_string(record)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SurfacerError::Write("file writer lock poisoned".to_string()))?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl Surfacer for FileSurfacer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, _lifetime: &CancellationToken, record: Arc<EventRecord>) -> Result<(), SurfacerError> {
        self.write_line(&record).inspect_err(|e| {
            self.logger
                .debug(format!("failed to write record to {}: {}", self.path.display(), e));
        })
    }
}

/// Read back records written by a [`FileSurfacer`]; unparsable lines are skipped
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<EventRecord>, SurfacerError> {
    let path = path.as_ref();
    debug!(?path, "read_records: reading file");

    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line, error = %e, "read_records: failed to parse line"),
        }
    }

    debug!(count = records.len(), "read_records: loaded records");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::FailureCounter;
    use crate::metrics::MetricKind;
    use tempfile::tempdir;

    fn logger() -> Logger {
        Logger::new("surfacer.file", &FailureCounter::new()).unwrap()
    }

    fn def_for(path: &Path) -> SurfacerDef {
        let mut def = SurfacerDef::new("file");
        def.options = serde_yaml::from_str(&format!("path: {}", path.display())).unwrap();
        def
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("metrics.jsonl");
        let surfacer = FileSurfacer::from_def(&def_for(&path), logger()).unwrap();
        let token = CancellationToken::new();

        let first = EventRecord::new(MetricKind::Cumulative)
            .with_label("probe", "p1")
            .with_metric("total", 3);
        let second = EventRecord::new(MetricKind::Gauge).with_metric("host", "box");
        surfacer.write(&token, Arc::new(first.clone())).await.unwrap();
        surfacer.write(&token, Arc::new(second.clone())).await.unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records, vec![first, second]);
    }

    #[test]
    fn test_creates_parent_directories() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("dir").join("metrics.jsonl");
        let surfacer = FileSurfacer::from_def(&def_for(&path), logger()).unwrap();
        assert!(surfacer.path().exists());
    }

    #[test]
    fn test_missing_path_option() {
        let err = FileSurfacer::from_def(&SurfacerDef::new("file"), logger()).err().unwrap();
        assert!(matches!(err, SurfacerError::InvalidOptions { .. }));
    }

    #[tokio::test]
    async fn test_append_keeps_existing_lines() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("metrics.jsonl");
        let token = CancellationToken::new();
        let record = Arc::new(EventRecord::new(MetricKind::Gauge).with_metric("value", 1));

        let first = FileSurfacer::open("file", &path, false, logger()).unwrap();
        first.write(&token, record.clone()).await.unwrap();
        drop(first);

        let second = FileSurfacer::open("file", &path, true, logger()).unwrap();
        second.write(&token, record).await.unwrap();

        assert_eq!(read_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_read_records_skips_garbage() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("metrics.jsonl");
        let good = serde_json::to_string(&EventRecord::new(MetricKind::Gauge).with_metric("v", 1)).unwrap();
        fs::write(&path, format!("{}\nnot json\n\n", good)).unwrap();

        assert_eq!(read_records(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_read_records_missing_file() {
        let temp = tempdir().unwrap();
        assert!(read_records(temp.path().join("none.jsonl")).unwrap().is_empty());
    }
}
