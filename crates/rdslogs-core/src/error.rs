// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::segment::LogSegmentDescriptor;

/// Result type for tailing and download operations.
pub type Result<T> = std::result::Result<T, LogsError>;

/// Categorised failures reported by a remote log source.
///
/// The drivers match on the variant, never on the message, to decide whether a
/// failure is absorbed locally or terminates the loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("rate limited by remote: {0}")]
    RateLimited(String),

    #[error("log range contains binary data: {0}")]
    InaccessibleBinaryRange(String),

    #[error("log segment not found: {0}")]
    SegmentNotFound(String),

    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("remote rejected request ({status}, {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },
}

/// Errors returned by the tail and download drivers.
#[derive(Debug, thiserror::Error)]
pub enum LogsError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("malformed marker '{0}': expected <hour>:<offset>")]
    MalformedMarker(String),

    #[error("No log file with the prefix '{prefix}' found. Available log files:{}", list_segments(.available))]
    NoMatchingSegment {
        prefix: String,
        available: Vec<LogSegmentDescriptor>,
    },

    #[error("No log files found")]
    NoSegmentsAvailable,

    #[error("The list of instances is empty. Check the endpoint and authentication?")]
    NoInstances,

    #[error("Instance identifier {instance} not found in list of instances:{}", list_names(.available))]
    UnknownInstance {
        instance: String,
        available: Vec<String>,
    },

    #[error("No instance identifier specified. Available instances:{}", list_names(.available))]
    MissingInstance { available: Vec<String> },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sink failed: {0}")]
    Sink(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signal triggered exit")]
    Cancelled,
}

impl LogsError {
    /// True when the error only reports cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LogsError::Cancelled)
    }
}

fn list_segments(segments: &[LogSegmentDescriptor]) -> String {
    segments.iter().map(|s| format!("\n\t{s}")).collect()
}

fn list_names(names: &[String]) -> String {
    names.iter().map(|n| format!("\n\t{n}")).collect()
}
