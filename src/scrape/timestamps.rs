//! Block timestamp side-file.
//!
//! Every scrape run owns one [`TimestampCollector`]; the collector is the only writer
//! of `ts.txt` for the duration of the run.

use std::path::{Path, PathBuf};

use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::Mutex,
};

use crate::{
    errors::{IndexError, Result},
    types::Timestamp,
};

pub struct TimestampCollector {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl TimestampCollector {
    /// Opens the side-file for appending, creating it if needed
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| IndexError::io(&path, e))?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, timestamp: Timestamp) -> Result<()> {
        let line = format!("{timestamp}\n");
        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| IndexError::io(&self.path, e))
    }

    pub async fn flush(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .flush()
            .await
            .map_err(|e| IndexError::io(&self.path, e))
    }
}

/// Reads the side-file, sorted by block and deduplicated. A missing file reads as empty.
pub async fn read_timestamps(path: &Path) -> Result<Vec<Timestamp>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(IndexError::io(path, e)),
    };

    let mut timestamps = contents
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<Timestamp>()
                .map_err(|e| IndexError::corrupt_file(path, e.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    timestamps.sort();
    timestamps.dedup_by_key(|ts| ts.block_number);
    Ok(timestamps)
}
