//! End-to-end runs of the application with mock network components

mod common;

use common::{LiteralResolver, MockProvider};
use net_monitor::{
    app::{App, Components},
    logging::Logger,
    ping::{reply_channel, Pinger},
    Config, MetricKind,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    for kind in MetricKind::ALL {
        let settings = config.metric_mut(kind);
        settings.interval_seconds = 1;
        settings.output = dir.join(format!("{}.csv", kind));
    }
    config.refresh_interval_seconds = 0;
    config.ping_timeout_ms = 500;
    config
}

fn components(provider: MockProvider, with_ping: bool) -> Components {
    let ping = with_ping.then(|| {
        let (tx, rx) = reply_channel();
        (Arc::new(common::EchoPinger::new(tx)) as Arc<dyn Pinger>, rx)
    });
    Components {
        provider: Arc::new(provider),
        resolver: Arc::new(LiteralResolver),
        ping,
    }
}

fn app(config: Config, components: Components) -> App {
    App::with_components(config, components, Logger::quiet())
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(false).from_path(path).unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[tokio::test]
async fn disabled_download_creates_no_file_and_no_loop() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.download.enabled = false;
    config.additional_ping_hosts = vec!["198.51.100.7".to_string()];

    let report = app(config, components(MockProvider::new(&["192.0.2.10"]), true))
        .run_until(tokio::time::sleep(Duration::from_millis(2500)))
        .await
        .unwrap();

    assert!(!dir.path().join("download.csv").exists());
    assert!(report.metric(MetricKind::Download).is_none());
    assert_eq!(report.metrics.len(), 2);
    assert!(!report.session_id.is_empty());

    let ping = report.metric(MetricKind::Ping).unwrap();
    assert!(ping.records >= 2);
    let rows = read_rows(&dir.path().join("ping.csv"));
    assert_eq!(rows.len() as u64, ping.records);
    for row in &rows {
        assert_eq!(row.len(), 3);
        assert!(row[0].ends_with('Z'));
        assert!(row[2] == "192.0.2.10" || row[2] == "198.51.100.7");
    }

    let upload = read_rows(&dir.path().join("upload.csv"));
    assert_eq!(upload.len() as u64, report.metric(MetricKind::Upload).unwrap().records);
    assert!(upload.iter().all(|row| row[1] == "11.2500"));
}

#[tokio::test]
async fn existing_output_is_appended_to() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.ping.enabled = false;
    config.upload.enabled = false;
    std::fs::write(dir.path().join("download.csv"), "2020-01-01T00:00:00.000Z,1.0000,old\n").unwrap();

    let report = app(config, components(MockProvider::new(&["192.0.2.10"]), false))
        .run_until(tokio::time::sleep(Duration::from_millis(1500)))
        .await
        .unwrap();

    let rows = read_rows(&dir.path().join("download.csv"));
    assert_eq!(rows[0][2], "old");
    assert_eq!(rows.len() as u64, 1 + report.metric(MetricKind::Download).unwrap().records);
}

#[tokio::test]
async fn unwritable_output_disables_only_that_metric() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.ping.output = dir.path().join("missing").join("ping.csv");

    let report = app(config, components(MockProvider::new(&["192.0.2.10"]), true))
        .run_until(std::future::ready(()))
        .await
        .unwrap();

    let running: Vec<MetricKind> = report.metrics.iter().map(|m| m.kind).collect();
    assert_eq!(running, vec![MetricKind::Download, MetricKind::Upload]);
}

#[tokio::test]
async fn missing_icmp_transport_disables_ping() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());

    let report = app(config, components(MockProvider::new(&["192.0.2.10"]), false))
        .run_until(std::future::ready(()))
        .await
        .unwrap();

    assert!(report.metric(MetricKind::Ping).is_none());
    assert_eq!(report.streams.len(), 2);
}

#[tokio::test]
async fn no_metric_left_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.download.enabled = false;
    config.upload.enabled = false;

    let err = app(config, components(MockProvider::new(&["192.0.2.10"]), false))
        .run_until(std::future::ready(()))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "CONFIG");
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn initial_selection_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());

    let err = app(config, components(MockProvider::scripted(vec![None]), true))
        .run_until(std::future::ready(()))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "DISCOVERY");
}

#[tokio::test]
async fn unresolvable_ping_host_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path());
    config.additional_ping_hosts = vec!["nowhere.invalid".to_string()];

    let err = app(config, components(MockProvider::new(&["192.0.2.10"]), true))
        .run_until(std::future::ready(()))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "DNS");
}
