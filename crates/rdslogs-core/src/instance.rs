// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::debug;

use crate::error::{LogsError, Result};
use crate::remote::LogSource;

/// Checks that `instance_id` names an instance the source can see.
///
/// Without an instance identifier the available instances are returned in the
/// error so the caller can pick one.
pub async fn validate_instance<S: LogSource + ?Sized>(
    source: &S,
    instance_id: Option<&str>,
) -> Result<String> {
    let instances = source.list_instances().await?;
    if instances.is_empty() {
        return Err(LogsError::NoInstances);
    }

    let Some(instance_id) = instance_id.filter(|id| !id.is_empty()) else {
        return Err(LogsError::MissingInstance {
            available: instances,
        });
    };

    if instances.iter().any(|i| i == instance_id) {
        debug!(instance = instance_id, "Validated instance");
        Ok(instance_id.to_string())
    } else {
        Err(LogsError::UnknownInstance {
            instance: instance_id.to_string(),
            available: instances,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::remote::{FetchResult, SegmentPage};
    use async_trait::async_trait;

    struct Instances(Vec<&'static str>);

    #[async_trait]
    impl LogSource for Instances {
        async fn list_instances(&self) -> std::result::Result<Vec<String>, RemoteError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }

        async fn list_segments(
            &self,
            _instance_id: &str,
            _token: Option<&str>,
        ) -> std::result::Result<SegmentPage, RemoteError> {
            Ok(SegmentPage::default())
        }

        async fn fetch_portion(
            &self,
            _instance_id: &str,
            _segment: &str,
            _marker: Option<&str>,
            _max_lines: Option<u64>,
        ) -> std::result::Result<FetchResult, RemoteError> {
            Ok(FetchResult::default())
        }
    }

    #[tokio::test]
    async fn test_known_instance() {
        let source = Instances(vec!["db-1", "db-2"]);
        assert_eq!(validate_instance(&source, Some("db-2")).await.unwrap(), "db-2");
    }

    #[tokio::test]
    async fn test_unknown_instance() {
        let source = Instances(vec!["db-1"]);
        let error = validate_instance(&source, Some("db-9")).await.unwrap_err();
        assert!(matches!(
            error,
            LogsError::UnknownInstance { ref instance, ref available }
                if instance == "db-9" && available == &vec!["db-1".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_missing_instance_lists_choices() {
        let source = Instances(vec!["db-1", "db-2"]);
        let error = validate_instance(&source, None).await.unwrap_err();
        assert!(matches!(error, LogsError::MissingInstance { ref available } if available.len() == 2));

        let error = validate_instance(&source, Some("")).await.unwrap_err();
        assert!(matches!(error, LogsError::MissingInstance { .. }));
    }

    #[tokio::test]
    async fn test_no_instances() {
        let source = Instances(vec![]);
        let error = validate_instance(&source, Some("db-1")).await.unwrap_err();
        assert!(matches!(error, LogsError::NoInstances));
    }
}
