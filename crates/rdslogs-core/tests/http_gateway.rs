//! Drives the drivers through the HTTP gateway client against a mock gateway.

use mockito::{Matcher, Server};
use rdslogs_core::download::DownloadDriver;
use rdslogs_core::error::{LogsError, RemoteError};
use rdslogs_core::http::{get_client, HttpLogSource};
use rdslogs_core::instance::validate_instance;
use rdslogs_core::segment::SegmentLister;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn source(server: &Server) -> Arc<HttpLogSource> {
    Arc::new(HttpLogSource::new(
        get_client(Duration::from_secs(5), None),
        server.url(),
    ))
}

#[tokio::test]
async fn test_download_over_gateway() {
    let mut server = Server::new_async().await;
    let instances = server
        .mock("GET", "/instances")
        .with_status(200)
        .with_body(r#"{"instances": ["db-1"]}"#)
        .create_async()
        .await;
    let listing = server
        .mock("GET", "/instances/db-1/logs")
        .with_status(200)
        .with_body(
            r#"{"segments": [
                {"name": "error/mysql-error.log", "size": 11, "last_written": 1000},
                {"name": "slowquery/mysql-slowquery.log", "size": 3, "last_written": 2000}
            ]}"#,
        )
        .create_async()
        .await;
    let first = server
        .mock("GET", "/instances/db-1/logs/portion")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("file".into(), "error/mysql-error.log".into()),
            Matcher::UrlEncoded("marker".into(), "0".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"data": "first\n", "marker": "3:6", "more_pending": true}"#)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/instances/db-1/logs/portion")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("file".into(), "error/mysql-error.log".into()),
            Matcher::UrlEncoded("marker".into(), "3:6".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"data": "last\n", "marker": "3:11", "more_pending": false}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = source(&server);
    let instance_id = validate_instance(source.as_ref(), Some("db-1")).await.unwrap();
    let segments = SegmentLister::new(Arc::clone(&source), instance_id.clone())
        .matching("error/")
        .await
        .unwrap();
    let downloaded = DownloadDriver::new(source, instance_id, dir.path(), CancellationToken::new())
        .download_all(&segments)
        .await
        .unwrap();

    assert_eq!(downloaded.len(), 1);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("mysql-error.log")).unwrap(),
        "first\nlast\n"
    );
    instances.assert_async().await;
    listing.assert_async().await;
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_download_surfaces_missing_segment() {
    let mut server = Server::new_async().await;
    let _portion = server
        .mock("GET", "/instances/db-1/logs/portion")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"code": "LogFileNotFound", "message": "no such file"}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let driver = DownloadDriver::new(source(&server), "db-1", dir.path(), CancellationToken::new());
    let segment = rdslogs_core::segment::LogSegmentDescriptor::new("gone.log", 1, 1);

    let error = driver.download_segment(&segment).await.unwrap_err();
    assert!(matches!(
        error,
        LogsError::Remote(RemoteError::SegmentNotFound(ref message)) if message == "no such file"
    ));
}

#[tokio::test]
async fn test_unknown_instance_lists_available() {
    let mut server = Server::new_async().await;
    let _instances = server
        .mock("GET", "/instances")
        .with_status(200)
        .with_body(r#"{"instances": ["db-1", "db-2"]}"#)
        .create_async()
        .await;

    let error = validate_instance(source(&server).as_ref(), Some("db-3"))
        .await
        .unwrap_err();
    assert!(matches!(error, LogsError::UnknownInstance { .. }));
    let message = error.to_string();
    assert!(message.contains("db-3"));
    assert!(message.contains("db-1") && message.contains("db-2"));
}
