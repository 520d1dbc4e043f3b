//! Persistence fan-out
//!
//! Each metric stream registers once and gets its own delivery channel and
//! writer task. The channel holds a single record, so a slow destination
//! pushes back on its producer instead of buffering without bound. Dropping
//! the sender closes the stream: the writer drains what is left and exits.

pub mod csv_file;

pub use csv_file::CsvRecordWriter;

use crate::{error::Result, logging::Logger, models::Record};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Send side of a stream's delivery channel
pub type RecordSender = mpsc::Sender<Record>;

/// Destination of one metric stream
#[async_trait]
pub trait RecordWriter: Send {
    async fn write(&mut self, record: &Record) -> Result<()>;

    async fn flush(&mut self) -> Result<()>;
}

/// Counters reported by a writer task when its stream closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub written: u64,
    pub failed: u64,
}

struct StreamHandle {
    name: String,
    task: JoinHandle<StreamStats>,
}

/// Owns one writer task per registered stream
pub struct Saver {
    streams: Vec<StreamHandle>,
    logger: Logger,
}

impl Saver {
    pub fn new(logger: Logger) -> Self {
        Self {
            streams: Vec::new(),
            logger,
        }
    }

    /// Spawn a writer task for `writer` and return the stream's sender
    pub fn register_stream(&mut self, name: impl Into<String>, writer: Box<dyn RecordWriter>) -> RecordSender {
        let name = name.into();
        let (tx, rx) = mpsc::channel(1);
        let logger = self.logger.named(format!("saver:{}", name));

        let task = tokio::spawn(write_stream(writer, rx, logger));
        self.streams.push(StreamHandle { name, task });

        tx
    }

    /// Number of registered streams
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Wait for every writer task to drain and exit
    ///
    /// Only completes once every sender returned by
    /// [`register_stream`](Self::register_stream) has been dropped.
    pub async fn shutdown(self) -> Vec<(String, StreamStats)> {
        let mut results = Vec::with_capacity(self.streams.len());
        for stream in self.streams {
            match stream.task.await {
                Ok(stats) => {
                    self.logger
                        .debug("Stream closed")
                        .field("stream", &stream.name)
                        .field("written", stats.written)
                        .field("failed", stats.failed)
                        .log()
                        .await;
                    results.push((stream.name, stats));
                }
                Err(e) => {
                    self.logger
                        .error("Writer task aborted")
                        .field("stream", &stream.name)
                        .field("error", e.to_string())
                        .log()
                        .await;
                    results.push((stream.name, StreamStats::default()));
                }
            }
        }
        results
    }
}

async fn write_stream(
    mut writer: Box<dyn RecordWriter>,
    mut rx: mpsc::Receiver<Record>,
    logger: Logger,
) -> StreamStats {
    let mut stats = StreamStats::default();

    while let Some(record) = rx.recv().await {
        logger
            .debug("writing line")
            .field("timestamp", record.timestamp)
            .field("value", record.value)
            .field("label", &record.label)
            .log()
            .await;

        let result = match writer.write(&record).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => stats.written += 1,
            Err(e) => {
                stats.failed += 1;
                logger.error("Failed to persist record").error_info(&e).log().await;
            }
        }
    }

    stats
}
