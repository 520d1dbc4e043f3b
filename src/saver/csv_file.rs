//! CSV destination: one `timestamp,value,label` row per record

use super::RecordWriter;
use crate::{
    error::{AppError, Result},
    models::Record,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Appends records to a CSV file kept open for the process lifetime
///
/// Each row goes straight to the file with no user-space buffer in between.
/// A record whose write or flush fails is dropped; it never reaches the file
/// on a later flush.
pub struct CsvRecordWriter {
    file: File,
    path: PathBuf,
}

impl CsvRecordWriter {
    /// Open `path` in append mode, creating it if missing
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AppError::io(format!("cannot open {}: {}", path.display(), e)))?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Encode one record as a CSV line, quoting fields where needed
pub fn encode_row(record: &Record) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(record.to_row())?;
    writer
        .into_inner()
        .map_err(|e| AppError::persistence(format!("CSV encode error: {}", e)))
}

#[async_trait]
impl RecordWriter for CsvRecordWriter {
    async fn write(&mut self, record: &Record) -> Result<()> {
        let line = encode_row(record)?;
        self.file
            .write_all(&line)
            .await
            .map_err(|e| AppError::persistence(format!("write to {} failed: {}", self.path.display(), e)))
    }

    async fn flush(&mut self) -> Result<()> {
        self.file
            .flush()
            .await
            .map_err(|e| AppError::persistence(format!("flush of {} failed: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(value: f64, label: &str) -> Record {
        Record::new(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(), value, label)
    }

    #[test]
    fn test_encode_row() {
        let line = encode_row(&record(12.3, "8.8.8.8")).unwrap();
        assert_eq!(String::from_utf8(line).unwrap(), "2024-01-02T03:04:05.000Z,12.3000,8.8.8.8\n");
    }

    #[test]
    fn test_encode_row_quotes_commas() {
        let line = encode_row(&record(1.0, "http://a,b/upload.php")).unwrap();
        assert!(String::from_utf8(line).unwrap().ends_with(",\"http://a,b/upload.php\"\n"));
    }

    #[tokio::test]
    async fn test_append_mode_keeps_existing_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ping.csv");
        std::fs::write(&path, "existing,0.0000,x\n").unwrap();

        let mut writer = CsvRecordWriter::open(&path).await.unwrap();
        writer.write(&record(2.5, "1.1.1.1")).await.unwrap();
        writer.flush().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "existing,0.0000,x\n2024-01-02T03:04:05.000Z,2.5000,1.1.1.1\n");
    }

    #[tokio::test]
    async fn test_flush_makes_row_visible() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("download.csv");
        let mut writer = CsvRecordWriter::open(&path).await.unwrap();

        writer.write(&record(93.1, "http://srv/upload.php")).await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
        assert_eq!(writer.path(), path.as_path());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_full_device_fails_every_record() {
        let mut writer = CsvRecordWriter::open("/dev/full").await.unwrap();

        for value in [1.0, 2.0] {
            let result = match writer.write(&record(value, "1.1.1.1")).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            };
            assert_eq!(result.err().map(|e| e.category()), Some("PERSIST"));
        }
    }

    #[tokio::test]
    async fn test_open_in_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let result = CsvRecordWriter::open(dir.path().join("missing").join("ping.csv")).await;
        assert_eq!(result.err().map(|e| e.category()), Some("IO"));
    }
}
