// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bulk download of finite log segments to local files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{LogsError, RemoteError, Result};
use crate::position::ROLLOVER_MARKER;
use crate::remote::LogSource;
use crate::segment::LogSegmentDescriptor;

/// A segment written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedSegment {
    pub segment: String,
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// Pages segments from the start of their first bucket until the remote reports
/// nothing more pending.
pub struct DownloadDriver<S> {
    source: Arc<S>,
    instance_id: String,
    download_dir: PathBuf,
    rate_limit_backoff: Duration,
    cancel_token: CancellationToken,
}

impl<S: LogSource> DownloadDriver<S> {
    pub fn new(
        source: Arc<S>,
        instance_id: impl Into<String>,
        download_dir: impl Into<PathBuf>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            source,
            instance_id: instance_id.into(),
            download_dir: download_dir.into(),
            rate_limit_backoff: Duration::from_secs(5),
            cancel_token,
        }
    }

    #[must_use]
    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    /// Downloads `segments` one after the other.
    pub async fn download_all(
        &self,
        segments: &[LogSegmentDescriptor],
    ) -> Result<Vec<DownloadedSegment>> {
        let mut downloaded = Vec::with_capacity(segments.len());
        for segment in segments {
            downloaded.push(self.download_segment(segment).await?);
        }
        Ok(downloaded)
    }

    /// Downloads one segment into `<download_dir>/<base name>`.
    ///
    /// On cancellation the partial file is left in place.
    pub async fn download_segment(
        &self,
        segment: &LogSegmentDescriptor,
    ) -> Result<DownloadedSegment> {
        fs::create_dir_all(&self.download_dir).await?;
        let path = self.download_dir.join(segment.base_name());
        info!(
            segment = %segment.name,
            path = %path.display(),
            "Downloading log segment"
        );
        let mut file = File::create(&path).await?;

        let mut marker = ROLLOVER_MARKER.to_string();
        let mut bytes_written = 0u64;
        loop {
            if self.cancel_token.is_cancelled() {
                return Err(LogsError::Cancelled);
            }

            let result = match self
                .source
                .fetch_portion(&self.instance_id, &segment.name, Some(&marker), None)
                .await
            {
                Ok(result) => result,
                Err(RemoteError::RateLimited(msg)) => {
                    info!(
                        "Rate limit hit; sleeping for {} seconds: {msg}",
                        self.rate_limit_backoff.as_secs_f64()
                    );
                    self.pause(self.rate_limit_backoff).await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if result.has_data() {
                file.write_all(result.data().as_bytes()).await?;
                file.flush().await?;
                bytes_written += result.data().len() as u64;
            }

            if !result.more_pending {
                break;
            }
            match result.marker {
                Some(next) => {
                    debug!(prev_marker = %marker, new_marker = %next, "Got new marker");
                    marker = next;
                }
                None => {
                    warn!(
                        segment = %segment.name,
                        "More data pending but no continuation marker, stopping download"
                    );
                    break;
                }
            }
        }

        info!(segment = %segment.name, bytes_written, "Finished downloading log segment");
        Ok(DownloadedSegment {
            segment: segment.name.clone(),
            path,
            bytes_written,
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    async fn pause(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = sleep(duration) => Ok(()),
            _ = self.cancel_token.cancelled() => Err(LogsError::Cancelled),
        }
    }
}
