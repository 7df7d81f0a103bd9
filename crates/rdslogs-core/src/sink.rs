// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destinations for fetched log data.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::publisher::PublishSink;

/// Receives log data in fetch order.
///
/// `write` is called once per non-empty chunk and must not block indefinitely.
#[async_trait]
pub trait Sink: Send {
    async fn write(&mut self, chunk: &str) -> Result<()>;

    /// Flushes anything still buffered. Called once when the driver exits.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes chunks verbatim to an async writer, stdout in production.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl WriterSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Sink for WriterSink<W> {
    async fn write(&mut self, chunk: &str) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.writer.write_all(chunk.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// The sinks the binary can select at startup.
pub enum OutputSink {
    Stdout(WriterSink<tokio::io::Stdout>),
    Publish(PublishSink),
}

#[async_trait]
impl Sink for OutputSink {
    async fn write(&mut self, chunk: &str) -> Result<()> {
        match self {
            OutputSink::Stdout(sink) => sink.write(chunk).await,
            OutputSink::Publish(sink) => sink.write(chunk).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            OutputSink::Stdout(sink) => sink.close().await,
            OutputSink::Publish(sink) => sink.close().await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writer_sink_writes_verbatim() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write("first line\n").await.unwrap();
        sink.write("").await.unwrap();
        sink.write("second line\nthird").await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(
            String::from_utf8(sink.into_inner()).unwrap(),
            "first line\nsecond line\nthird"
        );
    }
}
