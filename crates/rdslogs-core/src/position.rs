// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stream positions and continuation marker arithmetic.
//!
//! Markers are opaque to the remote API but, mid-segment, always take the shape
//! `<hour>:<offset>`: an hourly bucket and a byte offset inside it. The remote
//! reports the sentinel `"0"` at the end of a bucket.

use tracing::warn;

use crate::error::{LogsError, Result};
use crate::remote::FetchResult;

/// Marker reported when the remote reaches the end of an hourly bucket. Also the
/// marker that starts a segment from the beginning.
pub const ROLLOVER_MARKER: &str = "0";

/// Parses a `<hour>:<offset>` marker.
pub fn parse_marker(marker: &str) -> Result<(u64, u64)> {
    let malformed = || LogsError::MalformedMarker(marker.to_string());
    let mut parts = marker.split(':');
    let (Some(hour), Some(offset), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };
    let hour = hour.parse::<u64>().map_err(|_| malformed())?;
    let offset = offset.parse::<u64>().map_err(|_| malformed())?;
    Ok((hour, offset))
}

/// Returns `marker` moved `delta` bytes further into its hourly bucket.
pub fn advance_marker(marker: &str, delta: u64) -> Result<String> {
    let (hour, offset) = parse_marker(marker)?;
    let offset = offset
        .checked_add(delta)
        .ok_or_else(|| LogsError::MalformedMarker(marker.to_string()))?;
    Ok(format!("{hour}:{offset}"))
}

/// True for the markers that name no position inside a bucket.
pub fn is_unpositioned(marker: &str) -> bool {
    marker.is_empty() || marker == ROLLOVER_MARKER
}

/// The segment being tailed and the marker to fetch from next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPosition {
    segment: String,
    marker: Option<String>,
}

impl StreamPosition {
    /// A fresh position with no marker; the first fetch only probes the tail.
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            marker: None,
        }
    }

    pub fn with_marker(segment: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            marker: Some(marker.into()),
        }
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    /// Candidate marker `delta` bytes past the current one. Does not move the
    /// position.
    pub fn advance(&self, delta: u64) -> Result<String> {
        advance_marker(self.marker.as_deref().unwrap_or_default(), delta)
    }

    /// Byte offset of the current marker, if it points inside a bucket.
    pub fn offset(&self) -> Option<u64> {
        let marker = self.marker.as_deref()?;
        if is_unpositioned(marker) {
            return None;
        }
        parse_marker(marker).ok().map(|(_, offset)| offset)
    }

    pub(crate) fn commit(&mut self, marker: Option<String>) {
        self.marker = marker;
    }
}

/// Decides which marker to fetch from after a successful fetch.
///
/// The remote is trusted mid-segment. When it reports the rollover sentinel but
/// still returned data, the bucket is not finished and the marker is computed
/// from the data length. When it reports the sentinel without data, the previous
/// marker is retried during the first `grace_minutes` of the hour, since fresh
/// buckets briefly report emptiness before the previous one has drained.
pub fn resolve_next_marker(
    previous: Option<&str>,
    response: Option<&FetchResult>,
    minute_of_hour: u32,
    grace_minutes: u32,
) -> Result<Option<String>> {
    let Some(response) = response else {
        warn!("No fetch response to take a marker from, keeping previous marker");
        return Ok(previous.map(str::to_string));
    };
    let Some(marker) = response.marker.as_deref() else {
        warn!("Fetch response carried no marker, keeping previous marker");
        return Ok(previous.map(str::to_string));
    };

    if marker != ROLLOVER_MARKER {
        return Ok(Some(marker.to_string()));
    }

    if response.has_data() {
        return match previous {
            Some(previous) if !is_unpositioned(previous) => {
                let delta = response.data().len() as u64;
                advance_marker(previous, delta).map(Some)
            }
            // Nothing to advance from; restart the bucket.
            _ => Ok(Some(ROLLOVER_MARKER.to_string())),
        };
    }

    if minute_of_hour > grace_minutes {
        Ok(Some(marker.to_string()))
    } else {
        Ok(previous.map(str::to_string))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tracing_test::traced_test;

    const GRACE: u32 = 5;

    fn response(marker: &str, data: Option<&str>) -> FetchResult {
        FetchResult {
            data: data.map(str::to_string),
            marker: Some(marker.to_string()),
            more_pending: false,
        }
    }

    #[test]
    fn test_advance_marker() {
        assert_eq!(advance_marker("12:1234", 60).unwrap(), "12:1294");
        assert_eq!(advance_marker("0:0", 0).unwrap(), "0:0");
    }

    #[test]
    fn test_advance_marker_rejects_malformed() {
        for marker in ["", "0", "12", "12:34:56", "a:1", "1:b", "-1:5", "1:"] {
            assert!(
                matches!(advance_marker(marker, 1), Err(LogsError::MalformedMarker(m)) if m == marker),
                "marker '{marker}' should be rejected"
            );
        }
    }

    #[test]
    fn test_position_advance_is_pure() {
        let position = StreamPosition::with_marker("slow.log", "3:500");
        assert_eq!(position.advance(1000).unwrap(), "3:1500");
        assert_eq!(position.marker(), Some("3:500"));
    }

    #[test]
    fn test_position_without_marker_cannot_advance() {
        let position = StreamPosition::new("slow.log");
        assert!(matches!(
            position.advance(1000),
            Err(LogsError::MalformedMarker(_))
        ));
    }

    #[test]
    fn test_position_offset() {
        assert_eq!(StreamPosition::with_marker("a", "3:500").offset(), Some(500));
        assert_eq!(StreamPosition::with_marker("a", "0").offset(), None);
        assert_eq!(StreamPosition::new("a").offset(), None);
    }

    #[test]
    fn test_next_marker_trusts_remote_mid_segment() {
        let next = resolve_next_marker(Some("12:1234"), Some(&response("12:2345", None)), 12, GRACE);
        assert_eq!(next.unwrap().as_deref(), Some("12:2345"));
    }

    #[test]
    fn test_next_marker_unchanged_remote_marker() {
        let next = resolve_next_marker(Some("12:1234"), Some(&response("12:1234", None)), 12, GRACE);
        assert_eq!(next.unwrap().as_deref(), Some("12:1234"));
    }

    #[test]
    fn test_next_marker_rollover_without_data_after_grace() {
        let next = resolve_next_marker(Some("12:1234"), Some(&response("0", None)), 12, GRACE);
        assert_eq!(next.unwrap().as_deref(), Some("0"));
    }

    #[test]
    fn test_next_marker_rollover_without_data_within_grace() {
        let next = resolve_next_marker(Some("12:1234"), Some(&response("0", None)), 3, GRACE);
        assert_eq!(next.unwrap().as_deref(), Some("12:1234"));

        let at_boundary =
            resolve_next_marker(Some("12:1234"), Some(&response("0", Some(""))), 5, GRACE);
        assert_eq!(at_boundary.unwrap().as_deref(), Some("12:1234"));
    }

    #[test]
    fn test_next_marker_rollover_with_data() {
        let data = "this is a slow query log entry, really.";
        for minute in [3, 12] {
            let next =
                resolve_next_marker(Some("12:1234"), Some(&response("0", Some(data))), minute, GRACE);
            assert_eq!(next.unwrap().as_deref(), Some("12:1273"));
        }
    }

    #[test]
    fn test_next_marker_rollover_with_data_and_no_previous() {
        let next = resolve_next_marker(None, Some(&response("0", Some("line\n"))), 30, GRACE);
        assert_eq!(next.unwrap().as_deref(), Some("0"));
    }

    #[test]
    fn test_next_marker_rollover_with_data_and_malformed_previous() {
        let next = resolve_next_marker(Some("garbage"), Some(&response("0", Some("x"))), 30, GRACE);
        assert!(matches!(next, Err(LogsError::MalformedMarker(_))));
    }

    #[test]
    #[traced_test]
    fn test_next_marker_absent_response() {
        let next = resolve_next_marker(Some("12:1234"), None, 30, GRACE);
        assert_eq!(next.unwrap().as_deref(), Some("12:1234"));
        assert!(logs_contain("No fetch response"));

        let no_marker = FetchResult {
            data: Some("data".to_string()),
            marker: None,
            more_pending: true,
        };
        let next = resolve_next_marker(Some("12:1234"), Some(&no_marker), 30, GRACE);
        assert_eq!(next.unwrap().as_deref(), Some("12:1234"));
        assert!(logs_contain("carried no marker"));
    }

    proptest! {
        #[test]
        fn prop_advance_adds_to_offset(hour in 0u64..100_000, offset in 0u64..u32::MAX as u64, delta in 0u64..u32::MAX as u64) {
            let advanced = advance_marker(&format!("{hour}:{offset}"), delta).unwrap();
            prop_assert_eq!(advanced, format!("{}:{}", hour, offset + delta));
        }

        #[test]
        fn prop_markers_without_one_colon_fail(marker in "[0-9]{0,6}(:[0-9]{1,6}){2,3}|[0-9]{0,6}") {
            prop_assert!(advance_marker(&marker, 1).is_err());
        }
    }
}
