// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process::ExitCode, sync::Arc};

use serde_json::{Map, Value};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use rdslogs_core::{
    config::{Config, Output},
    download::DownloadDriver,
    error::{LogsError, Result},
    http::{get_client, HttpLogSource},
    instance::validate_instance,
    publisher::{PublishSink, PublisherConfig, RawLineParser},
    segment::SegmentLister,
    sink::{OutputSink, WriterSink},
    tail::TailDriver,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);
const PUBLISH_BATCH_SIZE: usize = 500;
const PUBLISH_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
pub async fn main() -> ExitCode {
    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading rdslogs configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    match download_requested(env::args().skip(1)) {
        Ok(true) => config.download = true,
        Ok(false) => {}
        Err(e) => {
            eprintln!("Failed to parse the command line: {e}");
            return ExitCode::FAILURE;
        }
    }

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", config.log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let cancel_token = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel_token.clone()));

    match run(config, cancel_token).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(LogsError::Cancelled) => {
            info!("Shutting down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether download mode was requested. Any other argument is rejected.
fn download_requested(args: impl IntoIterator<Item = String>) -> Result<bool> {
    let mut download = false;
    let mut unexpected = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--download" | "-d" => download = true,
            _ => unexpected.push(arg),
        }
    }
    if !unexpected.is_empty() {
        return Err(LogsError::InvalidConfig(format!(
            "unexpected extra arguments: {}",
            unexpected.join(" ")
        )));
    }
    Ok(download)
}

async fn run(config: Config, cancel_token: CancellationToken) -> Result<()> {
    let client = get_client(HTTP_TIMEOUT, config.https_proxy.as_deref());
    let source = Arc::new(HttpLogSource::new(client.clone(), config.endpoint.clone()));

    let instance_id = validate_instance(source.as_ref(), config.instance_id.as_deref()).await?;

    if config.download {
        let lister = SegmentLister::new(Arc::clone(&source), instance_id.clone());
        let segments = lister.matching(&config.log_file).await?;
        info!(count = segments.len(), "Downloading log segments");
        let driver = DownloadDriver::new(source, instance_id, config.download_dir.clone(), cancel_token)
            .with_rate_limit_backoff(config.backoff);
        let downloaded = driver.download_all(&segments).await?;
        info!(count = downloaded.len(), "Download complete");
        return Ok(());
    }

    let sink = match config.output {
        Output::Stdout => OutputSink::Stdout(WriterSink::stdout()),
        Output::Publish => {
            let mut extra_fields = Map::new();
            extra_fields.insert("instance".to_string(), Value::String(instance_id.clone()));
            let publisher_config = PublisherConfig {
                intake_url: config.intake_url.clone().unwrap_or_default(),
                api_key: config.api_key.clone().unwrap_or_default(),
                sample_rate: config.sample_rate,
                batch_size: PUBLISH_BATCH_SIZE,
                flush_interval: PUBLISH_FLUSH_INTERVAL,
                extra_fields,
                scrub_query: config.scrub_query,
            };
            OutputSink::Publish(PublishSink::start(publisher_config, client, RawLineParser))
        }
    };

    let tail_config = config.tail_config(&instance_id);
    TailDriver::new(source, sink, tail_config, cancel_token)
        .run()
        .await
}

/// Cancels `cancel_token` on SIGINT or SIGTERM, then forces the exit if the
/// drivers have not stopped within the grace period.
async fn shutdown_on_signal(cancel_token: CancellationToken) {
    wait_for_signal().await;
    info!("Received shutdown signal, stopping");
    cancel_token.cancel();

    sleep(SHUTDOWN_GRACE_PERIOD).await;
    error!(
        "Shutdown did not complete within {} seconds, exiting",
        SHUTDOWN_GRACE_PERIOD.as_secs()
    );
    std::process::exit(1);
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            error!("Failed to listen for SIGTERM: {e}");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C signal: {e}");
                std::future::pending::<()>().await;
            }
            return;
        }
    };
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to listen for Ctrl-C signal: {e}");
                terminate.recv().await;
            }
        }
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C signal: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_download_flag() {
        assert!(!download_requested(args(&[])).unwrap());
        assert!(download_requested(args(&["--download"])).unwrap());
        assert!(download_requested(args(&["-d"])).unwrap());
    }

    #[test]
    fn test_unexpected_arguments_are_rejected() {
        let error = download_requested(args(&["-d", "--tail", "extra"])).unwrap_err();
        assert!(matches!(error, LogsError::InvalidConfig(ref msg) if msg.contains("--tail extra")));
    }
}
