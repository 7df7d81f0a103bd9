// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tailing and bulk download of append-only log files served through a
//! paginated, rate-limited remote API.
//!
//! [`tail::TailDriver`] follows the newest segment and survives throttling,
//! binary ranges, hourly rollover and segment rotation. [`download::DownloadDriver`]
//! pages finite segments to local files.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod clock;
pub mod config;
pub mod download;
pub mod error;
pub mod http;
pub mod instance;
pub mod position;
pub mod publisher;
pub mod remote;
pub mod segment;
pub mod sink;
pub mod tail;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Config, DbType, Output};
pub use download::{DownloadDriver, DownloadedSegment};
pub use error::{LogsError, RemoteError, Result};
pub use http::{get_client, HttpLogSource};
pub use instance::validate_instance;
pub use position::{resolve_next_marker, StreamPosition, ROLLOVER_MARKER};
pub use publisher::{LineParser, PublishSink, PublisherConfig, RawLineParser};
pub use remote::{FetchResult, LogSource, SegmentPage};
pub use segment::{LogSegmentDescriptor, SegmentLister};
pub use sink::{OutputSink, Sink, WriterSink};
pub use tail::{RotationPolicy, TailConfig, TailDriver};
