// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log segment listing and selection.
//!
//! The remote source returns segment listings in bounded pages. [`SegmentLister`]
//! merges every page into one list and can keep that list for the lifetime of the
//! lister, so a bulk download does not pay for repeated full scans. Rotation checks
//! in the tail driver always ask for a fresh listing.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{LogsError, RemoteError, Result};
use crate::remote::LogSource;

/// A log segment as reported by the remote listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSegmentDescriptor {
    pub name: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    /// Milliseconds since the Unix epoch.
    pub last_written: i64,
}

impl LogSegmentDescriptor {
    pub fn new(name: impl Into<String>, size_bytes: u64, last_written: i64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            last_written,
        }
    }

    pub fn last_written_time(&self) -> SystemTime {
        let millis = u64::try_from(self.last_written).unwrap_or_default();
        UNIX_EPOCH + Duration::from_millis(millis)
    }

    /// Final path component of the segment name, used for local file names.
    pub fn base_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

// Rotation renames segments but keeps their content, so the name is ignored.
impl PartialEq for LogSegmentDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.last_written == other.last_written && self.size_bytes == other.size_bytes
    }
}

impl Eq for LogSegmentDescriptor {}

impl fmt::Display for LogSegmentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<35} (last written: {} ms, size: {})",
            self.name, self.last_written, self.size_bytes
        )
    }
}

/// Keeps the segments whose name equals or starts with `prefix`.
///
/// An empty prefix keeps everything. Fails with [`LogsError::NoMatchingSegment`],
/// carrying the whole listing, when nothing matches.
pub fn select_by_prefix(
    segments: &[LogSegmentDescriptor],
    prefix: &str,
) -> Result<Vec<LogSegmentDescriptor>> {
    let matching: Vec<_> = segments
        .iter()
        .filter(|s| s.name.starts_with(prefix))
        .cloned()
        .collect();
    if matching.is_empty() {
        return Err(LogsError::NoMatchingSegment {
            prefix: prefix.to_string(),
            available: segments.to_vec(),
        });
    }
    Ok(matching)
}

/// Returns the most recently written segment.
///
/// Ties keep listing order, so the last listed of several equally recent segments
/// wins.
pub fn select_latest(segments: &[LogSegmentDescriptor]) -> Result<LogSegmentDescriptor> {
    let mut sorted = segments.to_vec();
    sorted.sort_by_key(|s| s.last_written);
    sorted.pop().ok_or(LogsError::NoSegmentsAvailable)
}

/// Lists the segments of one instance, merging paginated responses.
pub struct SegmentLister<S> {
    source: Arc<S>,
    instance_id: String,
    cache: RwLock<Option<Arc<Vec<LogSegmentDescriptor>>>>,
}

impl<S: LogSource> SegmentLister<S> {
    pub fn new(source: Arc<S>, instance_id: impl Into<String>) -> Self {
        Self {
            source,
            instance_id: instance_id.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Fetches every page from the remote and replaces the cached listing.
    pub async fn list_segments(&self) -> std::result::Result<Arc<Vec<LogSegmentDescriptor>>, RemoteError> {
        let mut segments = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let page = self
                .source
                .list_segments(&self.instance_id, token.as_deref())
                .await?;
            pages += 1;
            segments.extend(page.segments);
            match page.next_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        debug!(
            instance = %self.instance_id,
            pages,
            segments = segments.len(),
            "Listed log segments"
        );

        let segments = Arc::new(segments);
        *self.cache.write().await = Some(Arc::clone(&segments));
        Ok(segments)
    }

    /// Returns the cached listing, listing the remote only when nothing is cached.
    pub async fn cached_segments(&self) -> std::result::Result<Arc<Vec<LogSegmentDescriptor>>, RemoteError> {
        if let Some(segments) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(segments));
        }
        self.list_segments().await
    }

    /// Drops the cached listing.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Fresh listing filtered by `prefix`.
    pub async fn matching(&self, prefix: &str) -> Result<Vec<LogSegmentDescriptor>> {
        let segments = self.list_segments().await?;
        select_by_prefix(&segments, prefix)
    }

    /// Most recently written segment among a fresh listing filtered by `prefix`.
    pub async fn latest(&self, prefix: &str) -> Result<LogSegmentDescriptor> {
        let matching = self.matching(prefix).await?;
        select_latest(&matching)
    }
}
