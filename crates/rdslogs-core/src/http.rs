// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON/HTTP implementation of [`LogSource`].
//!
//! Talks to a log gateway that fronts the managed database service:
//!
//! ```text
//!   GET /instances                                   -> {"instances": [..]}
//!   GET /instances/{id}/logs?marker=..               -> {"segments": [..], "next_token": ..}
//!   GET /instances/{id}/logs/portion?file=..&marker=..&lines=..
//!                                                    -> {"data": .., "marker": .., "more_pending": ..}
//! ```
//!
//! Failures carry `{"code": .., "message": ..}` bodies and are classified by code
//! and status into [`RemoteError`] categories.

use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error};

use crate::error::RemoteError;
use crate::remote::{FetchResult, LogSource, SegmentPage};

const THROTTLING_CODE: &str = "Throttling";
const BINARY_DATA_CODE: &str = "BinaryData";
const LOG_FILE_NOT_FOUND_CODE: &str = "LogFileNotFound";

#[derive(Debug, Deserialize)]
struct InstancesResponse {
    #[serde(default)]
    instances: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Builds the HTTP client, falling back to a client without proxy when the proxy
/// setting cannot be used.
#[must_use]
pub fn get_client(timeout: Duration, https_proxy: Option<&str>) -> reqwest::Client {
    match build_client(timeout, https_proxy) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(timeout, None) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    timeout: Duration,
    https_proxy: Option<&str>,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));
    if let Some(proxy) = https_proxy {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}

/// [`LogSource`] backed by the log gateway HTTP API.
#[derive(Debug, Clone)]
pub struct HttpLogSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLogSource {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("GET {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(classify(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("invalid response from {url}: {e}")))
    }
}

async fn classify(response: Response) -> RemoteError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let ErrorBody { code, message } = serde_json::from_str(&body).unwrap_or_else(|_| ErrorBody {
        code: String::new(),
        message: body,
    });
    debug!(status = status.as_u16(), code = %code, "Remote request failed");

    match code.as_str() {
        THROTTLING_CODE => RemoteError::RateLimited(message),
        BINARY_DATA_CODE => RemoteError::InaccessibleBinaryRange(message),
        LOG_FILE_NOT_FOUND_CODE => RemoteError::SegmentNotFound(message),
        _ if status == StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited(message),
        _ => RemoteError::Rejected {
            status: status.as_u16(),
            code,
            message,
        },
    }
}

#[async_trait]
impl LogSource for HttpLogSource {
    async fn list_instances(&self) -> Result<Vec<String>, RemoteError> {
        let response: InstancesResponse = self.get("/instances", &[]).await?;
        Ok(response.instances)
    }

    async fn list_segments(
        &self,
        instance_id: &str,
        token: Option<&str>,
    ) -> Result<SegmentPage, RemoteError> {
        let mut query = Vec::new();
        if let Some(token) = token {
            query.push(("marker", token.to_string()));
        }
        self.get(&format!("/instances/{instance_id}/logs"), &query)
            .await
    }

    async fn fetch_portion(
        &self,
        instance_id: &str,
        segment: &str,
        marker: Option<&str>,
        max_lines: Option<u64>,
    ) -> Result<FetchResult, RemoteError> {
        let mut query = vec![("file", segment.to_string())];
        if let Some(marker) = marker {
            query.push(("marker", marker.to_string()));
        }
        if let Some(lines) = max_lines {
            query.push(("lines", lines.to_string()));
        }
        self.get(&format!("/instances/{instance_id}/logs/portion"), &query)
            .await
    }
}
