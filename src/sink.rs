// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Output Sink
//!
//! This module provides the append-capable record sink that message bodies
//! are persisted to. Each record is one newline-terminated line of text.
//! The sink keeps a running count of non-empty records so the process can
//! report how many usable lines it handed to the downstream reader.

use std::{io, path::Path};
use tokio::{
    fs::OpenOptions,
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
};
use tracing::debug;

/// A buffered, newline-delimited text sink.
///
/// Closing is idempotent and the non-empty record count stays readable
/// after close. Writing to a closed sink is an error.
pub struct RecordSink {
    writer: Option<BufWriter<Box<dyn AsyncWrite + Send + Unpin>>>,
    records: u64,
}

impl RecordSink {
    /// Opens the file at `path` for appending, creating it if needed.
    ///
    /// # Parameters
    /// * `path` - The output file to append records to
    ///
    /// # Returns
    /// * `io::Result<RecordSink>` - The open sink, or the underlying error
    pub async fn append(path: &Path) -> io::Result<RecordSink> {
        debug!(path = %path.display(), "opening output sink");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(RecordSink::from_writer(Box::new(file)))
    }

    /// Wraps an arbitrary write target as a sink.
    pub fn from_writer(writer: Box<dyn AsyncWrite + Send + Unpin>) -> RecordSink {
        RecordSink {
            writer: Some(BufWriter::new(writer)),
            records: 0,
        }
    }

    /// Appends one newline-terminated record.
    ///
    /// Records that are blank after trailing-whitespace trim are written but
    /// not counted.
    ///
    /// # Parameters
    /// * `text` - The record body, without the trailing newline
    pub async fn write_record(&mut self, text: &str) -> io::Result<()> {
        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "output sink is closed",
                ))
            }
        };

        writer.write_all(text.as_bytes()).await?;
        writer.write_all(b"\n").await?;

        if !text.trim_end().is_empty() {
            self.records += 1;
        }
        Ok(())
    }

    /// The number of non-empty records written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Whether the sink has been closed.
    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Flushes and shuts the writer down. Calling `close` again is a no-op.
    pub async fn close(&mut self) -> io::Result<()> {
        let mut writer = match self.writer.take() {
            Some(writer) => writer,
            None => return Ok(()),
        };
        writer.flush().await?;
        writer.shutdown().await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::memory_sink;
    use std::path::PathBuf;

    #[tokio::test]
    async fn writes_newline_terminated_records() {
        let (mut sink, buffer) = memory_sink();
        sink.write_record("a").await.unwrap();
        sink.write_record("bb").await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(buffer.contents(), "a\nbb\n");
        assert_eq!(sink.records(), 2);
    }

    #[tokio::test]
    async fn blank_records_are_written_but_not_counted() {
        let (mut sink, buffer) = memory_sink();
        sink.write_record("").await.unwrap();
        sink.write_record("  ").await.unwrap();
        sink.write_record("payload").await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(buffer.contents(), "\n  \npayload\n");
        assert_eq!(sink.records(), 1);
    }

    #[tokio::test]
    async fn write_after_close_is_rejected() {
        let (mut sink, _buffer) = memory_sink();
        sink.close().await.unwrap();

        let err = sink.write_record("late").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
        assert_eq!(sink.records(), 0);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut sink, _buffer) = memory_sink();
        sink.write_record("once").await.unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();

        assert!(sink.is_closed());
        assert_eq!(sink.records(), 1);
    }

    #[tokio::test]
    async fn reopening_a_file_appends_to_it() {
        let path = PathBuf::from(std::env::temp_dir())
            .join(format!("drain-sink-{}.txt", uuid::Uuid::new_v4()));

        let mut sink = super::RecordSink::append(&path).await.unwrap();
        sink.write_record("one").await.unwrap();
        sink.close().await.unwrap();

        let mut sink = super::RecordSink::append(&path).await.unwrap();
        sink.write_record("two").await.unwrap();
        sink.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "one\ntwo\n");
        let _ = std::fs::remove_file(&path);
    }
}
