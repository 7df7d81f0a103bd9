// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tail driver: turns the paginated, throttled, eventually-consistent remote API
//! into a continuous stream of log data.
//!
//! ```text
//!   SEED ──> FETCH ──> CLASSIFY ──> ROTATE-CHECK ──> ADVANCE ──> FETCH
//!              ^          │  │                          │
//!              │          │  └── fatal ──> ABORT         v
//!              └──────────┴── throttled / missing ─── BACKOFF
//! ```
//!
//! Every suspension point races the cancellation token, and the token is checked
//! again before each fetch. A fetch already in flight is allowed to finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{LogsError, RemoteError, Result};
use crate::position::{resolve_next_marker, StreamPosition, ROLLOVER_MARKER};
use crate::remote::{FetchResult, LogSource};
use crate::segment::SegmentLister;
use crate::sink::Sink;

/// How the tailed log moves on to new segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    /// The tailed segment keeps its name forever.
    None,
    /// Segments are named by date; a newer segment supersedes the tailed one.
    TimeKeyed,
    /// Segments rotate when they reach a size limit, possibly beneath the reader.
    SizeKeyed,
}

/// Settings of the tail driver. The durations and thresholds are empirical.
#[derive(Debug, Clone)]
pub struct TailConfig {
    pub instance_id: String,
    /// Segment name or prefix to select the tailed segment from.
    pub segment_prefix: String,
    /// Lines requested per fetch once a marker is known.
    pub page_lines: u64,
    /// Pause after the remote rate limits a fetch.
    pub rate_limit_backoff: Duration,
    /// Pause after draining everything currently available.
    pub idle_delay: Duration,
    /// Pause while a segment is missing or mid-rotation.
    pub rotation_retry_delay: Duration,
    /// Bytes skipped past a range the remote refuses to return.
    pub binary_skip_bytes: u64,
    /// Minutes past the hour during which an empty rollover is retried.
    pub rollover_grace_minutes: u32,
    pub rotation: RotationPolicy,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            instance_id: String::new(),
            segment_prefix: String::new(),
            page_lines: 10_000,
            rate_limit_backoff: Duration::from_secs(5),
            idle_delay: Duration::from_secs(5),
            rotation_retry_delay: Duration::from_secs(1),
            binary_skip_bytes: 1000,
            rollover_grace_minutes: 5,
            rotation: RotationPolicy::None,
        }
    }
}

/// What the poll cycle does after the rotation check.
enum Rotation {
    /// Nothing rotated; commit the resolved marker.
    Steady,
    /// Start over at FETCH with this position.
    Restart(StreamPosition),
    /// A rotation is in flight; wait and fetch the same position again.
    Wait,
}

/// Polls one segment at a time and forwards its data to a [`Sink`].
pub struct TailDriver<S, K, C = SystemClock> {
    source: Arc<S>,
    lister: SegmentLister<S>,
    sink: K,
    clock: C,
    config: TailConfig,
    cancel_token: CancellationToken,
}

impl<S: LogSource, K: Sink> TailDriver<S, K, SystemClock> {
    pub fn new(
        source: Arc<S>,
        sink: K,
        config: TailConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        Self::with_clock(source, sink, SystemClock, config, cancel_token)
    }
}

impl<S: LogSource, K: Sink, C: Clock> TailDriver<S, K, C> {
    pub fn with_clock(
        source: Arc<S>,
        sink: K,
        clock: C,
        config: TailConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        let lister = SegmentLister::new(Arc::clone(&source), config.instance_id.clone());
        Self {
            source,
            lister,
            sink,
            clock,
            config,
            cancel_token,
        }
    }

    /// Tails until cancelled or a fatal error occurs, then closes the sink.
    ///
    /// Cancellation is reported as [`LogsError::Cancelled`].
    pub async fn run(mut self) -> Result<()> {
        let outcome = self.tail().await;
        if let Err(e) = self.sink.close().await {
            warn!("Failed to close sink: {e}");
        }
        outcome
    }

    async fn tail(&mut self) -> Result<()> {
        let latest = self.lister.latest(&self.config.segment_prefix).await?;
        info!(segment = %latest.name, "Tailing log segment");
        let mut position = StreamPosition::new(latest.name);

        loop {
            if self.cancel_token.is_cancelled() {
                return Err(LogsError::Cancelled);
            }

            let result = match self.fetch(&position).await {
                Ok(result) => result,
                Err(RemoteError::RateLimited(msg)) => {
                    info!(
                        "Rate limit hit; sleeping for {} seconds: {msg}",
                        self.config.rate_limit_backoff.as_secs_f64()
                    );
                    self.pause(self.config.rate_limit_backoff).await?;
                    continue;
                }
                Err(RemoteError::InaccessibleBinaryRange(msg)) => {
                    let skipped = position.advance(self.config.binary_skip_bytes)?;
                    warn!(
                        marker = position.marker().unwrap_or_default(),
                        skipped_to = %skipped,
                        "Binary data in log range, skipping {} bytes: {msg}",
                        self.config.binary_skip_bytes
                    );
                    position.commit(Some(skipped));
                    continue;
                }
                Err(RemoteError::SegmentNotFound(msg)) => {
                    debug!(segment = position.segment(), "Segment not found, waiting for rotation: {msg}");
                    self.pause(self.config.rotation_retry_delay).await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if result.has_data() {
                self.sink.write(result.data()).await?;
            }

            let next_marker = resolve_next_marker(
                position.marker(),
                Some(&result),
                self.clock.minute_of_hour(),
                self.config.rollover_grace_minutes,
            )?;
            let drained =
                !result.more_pending || next_marker.as_deref() == Some(ROLLOVER_MARKER);

            match self.check_rotation(&position, &result, drained).await? {
                Rotation::Steady => {}
                Rotation::Restart(next) => {
                    position = next;
                    continue;
                }
                Rotation::Wait => {
                    self.pause(self.config.rotation_retry_delay).await?;
                    continue;
                }
            }

            debug!(
                prev_marker = position.marker().unwrap_or_default(),
                new_marker = next_marker.as_deref().unwrap_or_default(),
                file = position.segment(),
                "Got new marker"
            );
            position.commit(next_marker);

            if drained {
                self.pause(self.config.idle_delay).await?;
            }
        }
    }

    /// Fetches a page at the stored marker, or probes the last line when there is
    /// none yet so history is not back-filled.
    async fn fetch(&self, position: &StreamPosition) -> std::result::Result<FetchResult, RemoteError> {
        let (marker, max_lines) = match position.marker() {
            Some(marker) if !marker.is_empty() => (Some(marker), self.config.page_lines),
            _ => (None, 1),
        };
        self.source
            .fetch_portion(
                &self.config.instance_id,
                position.segment(),
                marker,
                Some(max_lines),
            )
            .await
    }

    async fn check_rotation(
        &self,
        position: &StreamPosition,
        result: &FetchResult,
        drained: bool,
    ) -> Result<Rotation> {
        match self.config.rotation {
            RotationPolicy::None => Ok(Rotation::Steady),
            RotationPolicy::TimeKeyed => {
                if !drained {
                    return Ok(Rotation::Steady);
                }
                let newest = self.lister.latest(&self.config.segment_prefix).await?;
                if newest.name != position.segment() {
                    info!(
                        old_file = position.segment(),
                        new_file = %newest.name,
                        "Found newer file"
                    );
                    return Ok(Rotation::Restart(StreamPosition::new(newest.name)));
                }
                Ok(Rotation::Steady)
            }
            RotationPolicy::SizeKeyed => {
                let echoed = result.has_data()
                    && result.marker.is_some()
                    && result.marker.as_deref() == position.marker();
                let exhausted = !result.more_pending && !result.has_data();
                if !echoed && !exhausted {
                    return Ok(Rotation::Steady);
                }

                let newest = self.lister.latest(&self.config.segment_prefix).await?;
                if newest.name != position.segment() {
                    info!(
                        file = position.segment(),
                        newest = %newest.name,
                        "Segment rotation in progress, retrying"
                    );
                    return Ok(Rotation::Wait);
                }
                match position.offset() {
                    Some(offset) if offset > newest.size_bytes => {
                        info!(
                            file = position.segment(),
                            offset,
                            size = newest.size_bytes,
                            "Offset beyond segment size, segment was rotated; restarting from its beginning"
                        );
                        Ok(Rotation::Restart(StreamPosition::with_marker(
                            position.segment(),
                            ROLLOVER_MARKER,
                        )))
                    }
                    _ => Ok(Rotation::Steady),
                }
            }
        }
    }

    /// Sleeps for `duration` unless cancelled first.
    async fn pause(&self, duration: Duration) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            return Err(LogsError::Cancelled);
        }
        tokio::select! {
            _ = sleep(duration) => Ok(()),
            _ = self.cancel_token.cancelled() => Err(LogsError::Cancelled),
        }
    }
}
