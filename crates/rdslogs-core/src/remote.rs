// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The remote log API consumed by the drivers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::segment::LogSegmentDescriptor;

/// One page of a segment listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentPage {
    #[serde(default)]
    pub segments: Vec<LogSegmentDescriptor>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// The outcome of a single bounded fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub more_pending: bool,
}

impl FetchResult {
    /// Data of the chunk, treating an absent chunk as empty.
    pub fn data(&self) -> &str {
        self.data.as_deref().unwrap_or_default()
    }

    pub fn has_data(&self) -> bool {
        !self.data().is_empty()
    }
}

/// Paginated, rate-limited access to the log segments of remote instances.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Identifiers of every instance visible to the caller.
    async fn list_instances(&self) -> Result<Vec<String>, RemoteError>;

    /// One page of the segment listing, continuing from `token` when given.
    async fn list_segments(
        &self,
        instance_id: &str,
        token: Option<&str>,
    ) -> Result<SegmentPage, RemoteError>;

    /// Fetches a portion of `segment` starting at `marker`.
    ///
    /// Without a marker the source returns the most recent `max_lines` lines.
    async fn fetch_portion(
        &self,
        instance_id: &str,
        segment: &str,
        marker: Option<&str>,
        max_lines: Option<u64>,
    ) -> Result<FetchResult, RemoteError>;
}
