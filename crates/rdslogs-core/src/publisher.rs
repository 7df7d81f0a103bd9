// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parse-and-publish sink.
//!
//! ```text
//!   Sink::write(chunk)
//!       │  split into lines
//!       v
//!   ┌─────────────┐
//!   │   Channel   │ (mpsc, bounded)
//!   └──────┬──────┘
//!          v
//!   ┌─────────────┐
//!   │   Parser    │ (line -> fields, sampling)
//!   └──────┬──────┘
//!          v
//!   ┌─────────────┐
//!   │  HTTP POST  │ (batched JSON, retried on 5xx/network)
//!   └─────────────┘
//! ```
//!
//! The tail driver only sees the channel; parsing and shipping run on a background
//! task so fetching continues while earlier chunks are published.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{LogsError, Result};
use crate::sink::Sink;

/// Lines buffered between the tail driver and the parser. A page holds up to
/// 10k lines, so several pages fit while the publisher catches up.
pub const LINE_CHANNEL_SIZE: usize = 100_000;
const FLUSH_RETRY_COUNT: usize = 3;
const FLUSH_RETRY_DELAY: Duration = Duration::from_millis(200);
const STATUS_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
const API_KEY_HEADER: &str = "x-api-key";
const QUERY_FIELD: &str = "query";

/// Turns one raw log line into a set of fields.
pub trait LineParser: Send + 'static {
    /// `None` drops the line.
    fn parse(&self, line: &str) -> Option<Map<String, Value>>;
}

/// Publishes each line unparsed under a `message` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawLineParser;

impl LineParser for RawLineParser {
    fn parse(&self, line: &str) -> Option<Map<String, Value>> {
        let mut fields = Map::new();
        fields.insert("message".to_string(), Value::String(line.to_string()));
        Some(fields)
    }
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub intake_url: String,
    pub api_key: String,
    /// Publish one line out of every `sample_rate`.
    pub sample_rate: u32,
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Added to every event; parsed fields win on conflict.
    pub extra_fields: Map<String, Value>,
    /// Replace the parsed `query` field with its hex SHA-256 digest.
    pub scrub_query: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Event {
    data: Map<String, Value>,
    samplerate: u32,
}

/// [`Sink`] that parses lines and ships them to an HTTP intake.
pub struct PublishSink {
    lines_tx: Option<mpsc::Sender<String>>,
    task: Option<JoinHandle<()>>,
}

impl PublishSink {
    /// Spawns the publishing task. Must be called from within a tokio runtime.
    pub fn start<P: LineParser>(config: PublisherConfig, client: reqwest::Client, parser: P) -> Self {
        let (lines_tx, lines_rx) = mpsc::channel(LINE_CHANNEL_SIZE);
        let publisher = Publisher {
            intake: Intake {
                client,
                url: config.intake_url.clone(),
                api_key: config.api_key.clone(),
            },
            parser,
            batch: Vec::with_capacity(config.batch_size),
            seen: 0,
            events_sent: 0,
            last_update: Instant::now(),
            config,
        };
        let task = tokio::spawn(publisher.run(lines_rx));
        Self {
            lines_tx: Some(lines_tx),
            task: Some(task),
        }
    }
}

#[async_trait]
impl Sink for PublishSink {
    async fn write(&mut self, chunk: &str) -> Result<()> {
        let Some(lines_tx) = self.lines_tx.as_ref() else {
            return Err(LogsError::Sink("publisher already closed".to_string()));
        };
        for line in chunk.split('\n').filter(|l| !l.is_empty()) {
            lines_tx
                .send(line.to_string())
                .await
                .map_err(|_| LogsError::Sink("publisher task stopped".to_string()))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the sender lets the task drain the channel and flush.
        self.lines_tx.take();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| LogsError::Sink(format!("publisher task failed: {e}")))?;
        }
        Ok(())
    }
}

struct Publisher<P> {
    intake: Intake,
    parser: P,
    config: PublisherConfig,
    batch: Vec<Event>,
    seen: u64,
    events_sent: u64,
    last_update: Instant,
}

impl<P: LineParser> Publisher<P> {
    async fn run(mut self, mut lines_rx: mpsc::Receiver<String>) {
        let mut flush_interval = tokio::time::interval(self.config.flush_interval);
        flush_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                line = lines_rx.recv() => match line {
                    Some(line) => self.process(&line).await,
                    None => {
                        debug!("Line channel closed, flushing remaining events");
                        self.flush().await;
                        break;
                    }
                },
                _ = flush_interval.tick() => self.flush().await,
            }
        }
    }

    async fn process(&mut self, line: &str) {
        self.seen += 1;
        let rate = u64::from(self.config.sample_rate.max(1));
        if (self.seen - 1) % rate != 0 {
            return;
        }
        let Some(mut fields) = self.parser.parse(line) else {
            return;
        };
        if self.config.scrub_query {
            scrub_query(&mut fields);
        }

        let mut data = self.config.extra_fields.clone();
        data.extend(fields);
        self.batch.push(Event {
            data,
            samplerate: self.config.sample_rate.max(1),
        });

        if self.last_update.elapsed() >= STATUS_UPDATE_INTERVAL {
            info!(
                events_since_last_update = self.events_sent,
                lines_seen = self.seen,
                "status update"
            );
            self.events_sent = 0;
            self.last_update = Instant::now();
        }

        if self.batch.len() >= self.config.batch_size {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.batch);
        let count = batch.len() as u64;
        if self.intake.ship(&batch).await {
            self.events_sent += count;
        }
    }
}

struct Intake {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl Intake {
    /// Posts one batch, retrying transient failures. Returns whether it was
    /// accepted.
    async fn ship(&self, batch: &[Event]) -> bool {
        for attempt in 1..=FLUSH_RETRY_COUNT {
            let result = self
                .client
                .post(&self.url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(batch)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    debug!(events = batch.len(), "Published events");
                    return true;
                }
                Ok(response) if is_permanent(response.status()) => {
                    let status = response.status();
                    error!(
                        "{}: Failed to publish events, dropping batch: {:?}",
                        status,
                        response.text().await.unwrap_or_default()
                    );
                    return false;
                }
                Ok(response) => {
                    debug!(attempt, status = response.status().as_u16(), "Publish failed, retrying");
                }
                Err(e) => {
                    debug!(attempt, "Publish request failed, retrying: {e}");
                }
            }
            if attempt < FLUSH_RETRY_COUNT {
                sleep(retry_delay(attempt)).await;
            }
        }
        error!(
            "Failed to publish {} events after {} attempts, dropping batch",
            batch.len(),
            FLUSH_RETRY_COUNT
        );
        false
    }
}

/// Linear backoff between publish attempts.
fn retry_delay(attempt: usize) -> Duration {
    FLUSH_RETRY_DELAY * u32::try_from(attempt).unwrap_or(u32::MAX)
}

/// 4xx responses other than throttling will not succeed on retry.
fn is_permanent(status: StatusCode) -> bool {
    status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS
}

/// Replaces the `query` field with the hex SHA-256 of its contents. Non-string
/// values are hashed in their JSON form.
fn scrub_query(fields: &mut Map<String, Value>) {
    let Some(query) = fields.get_mut(QUERY_FIELD) else {
        return;
    };
    let mut hasher = Sha256::new();
    match &*query {
        Value::String(text) => hasher.update(text.as_bytes()),
        other => hasher.update(other.to_string().as_bytes()),
    }
    *query = Value::String(hex::encode(hasher.finalize()));
}
