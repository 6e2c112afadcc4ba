//! Integration tests for acquisition over real HTTP.
//!
//! These tests run the blocking fetcher against a local `wiremock` server:
//! - Fallback from a 404 source to the next one
//! - Exhaustion when no source has the archive
//! - End-to-end install with an unreachable first source
//! - DLC discovery through the metadata client
//!
//! The blocking reqwest client must not be built or dropped on an async
//! worker, so each test body runs inside `spawn_blocking`.
//!
//! Run with: `cargo test --test acquisition_integration`

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use reverig::acquire::{FetchProgress, FetcherConfig, Unavailable};
use reverig::dlc::StoreMetadataClient;
use reverig::{
    AcquisitionState, AcquisitionStatus, Acquirer, AcquirerConfig, ArchiveFetcher, FetchOutcome,
    FixedLocator, HttpFetcher, Installer, PluginApi, SourceList, StateStore, SteamLocator,
};

// ============================================================================
// Helper Functions
// ============================================================================

/// Build a zip archive in memory.
fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn quick_fetcher() -> HttpFetcher {
    HttpFetcher::new(FetcherConfig {
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(10),
        ..Default::default()
    })
    .unwrap()
}

fn acquirer_for(steam: &Path, downloads: &Path, sources: Vec<String>) -> Acquirer {
    let locator: Arc<dyn SteamLocator> = Arc::new(FixedLocator::new(steam));
    Acquirer::new(
        AcquirerConfig::default()
            .with_sources(SourceList::new(sources))
            .with_download_dir(downloads),
        Arc::new(StateStore::new()),
        Arc::new(quick_fetcher()),
        Installer::new(locator),
    )
}

/// Poll until the acquisition reaches a terminal status.
fn wait_terminal(acquirer: &Acquirer, app_id: u32) -> AcquisitionState {
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let state = acquirer.status(app_id);
        if state.status.is_terminal() {
            return state;
        }
        assert!(
            Instant::now() < deadline,
            "acquisition stuck in {}",
            state.status
        );
        thread::sleep(Duration::from_millis(10));
    }
}

async fn serve_zip(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/zip")
                .set_body_bytes(body),
        )
        .mount(server)
        .await;
}

async fn serve_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

// ============================================================================
// Fetcher Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_fetcher_streams_body_with_progress() {
    let server = MockServer::start().await;
    let body = vec![7u8; 200 * 1024];
    serve_zip(&server, "/file.zip", body.clone()).await;
    let url = format!("{}/file.zip", server.uri());

    tokio::task::spawn_blocking(move || {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("nested").join("file.zip");
        let mut events = Vec::new();

        let outcome =
            quick_fetcher().fetch(&url, &dest, &CancellationToken::new(), &mut |e| events.push(e));

        assert_eq!(
            outcome,
            FetchOutcome::Downloaded {
                bytes_read: body.len() as u64,
                total_bytes: body.len() as u64,
            }
        );
        assert_eq!(fs::read(&dest).unwrap(), body);
        assert_eq!(
            events.first(),
            Some(&FetchProgress::Started {
                total_bytes: body.len() as u64
            })
        );

        let mut last = 0;
        for event in &events[1..] {
            if let FetchProgress::Advanced { bytes_read } = event {
                assert!(*bytes_read > last);
                last = *bytes_read;
            }
        }
        assert_eq!(last, body.len() as u64);
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fetcher_does_not_create_file_on_error_status() {
    let server = MockServer::start().await;
    serve_status(&server, "/missing.zip", 404).await;
    serve_status(&server, "/broken.zip", 503).await;
    let base = server.uri();

    tokio::task::spawn_blocking(move || {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out.zip");
        let fetcher = quick_fetcher();
        let token = CancellationToken::new();

        let missing = fetcher.fetch(&format!("{}/missing.zip", base), &dest, &token, &mut |_| {});
        assert_eq!(missing, FetchOutcome::Unavailable(Unavailable::NotFound));

        let broken = fetcher.fetch(&format!("{}/broken.zip", base), &dest, &token, &mut |_| {});
        assert_eq!(broken, FetchOutcome::Unavailable(Unavailable::Status(503)));

        assert!(!dest.exists());
    })
    .await
    .unwrap();
}

// ============================================================================
// Acquisition Tests
// ============================================================================

/// Source 1 answers 404, source 2 serves the archive.
#[tokio::test(flavor = "multi_thread")]
async fn test_fallback_to_second_source() {
    let server = MockServer::start().await;
    serve_status(&server, "/a/440", 404).await;
    serve_zip(
        &server,
        "/b/440",
        zip_bytes(&[("440.lua", "addappid(440)\n")]),
    )
    .await;
    let sources = vec![
        format!("{}/a/{{id}}", server.uri()),
        format!("{}/b/{{id}}", server.uri()),
    ];
    let expected_source = format!("{}/b/440", server.uri());

    tokio::task::spawn_blocking(move || {
        let temp = TempDir::new().unwrap();
        let steam = temp.path().join("steam");
        let acquirer = acquirer_for(&steam, &temp.path().join("dl"), sources);

        acquirer.start(440).unwrap();
        let state = wait_terminal(&acquirer, 440);

        assert_eq!(state.status, AcquisitionStatus::Done);
        assert_eq!(state.current_source, expected_source);
        assert!(state.total_bytes > 0);
        assert_eq!(state.bytes_read, state.total_bytes);
        assert_eq!(
            fs::read_to_string(steam.join("config/stplug-in/440.lua")).unwrap(),
            "addappid(440)\n"
        );
        acquirer.shutdown();
    })
    .await
    .unwrap();
}

/// Every source fails; nothing is installed.
#[tokio::test(flavor = "multi_thread")]
async fn test_all_sources_fail() {
    let server = MockServer::start().await;
    serve_status(&server, "/a/570", 404).await;
    serve_status(&server, "/b/570", 500).await;
    let sources = vec![
        format!("{}/a/{{id}}", server.uri()),
        format!("{}/b/{{id}}", server.uri()),
        "http://127.0.0.1:9/{id}".to_string(),
    ];

    tokio::task::spawn_blocking(move || {
        let temp = TempDir::new().unwrap();
        let steam = temp.path().join("steam");
        let acquirer = acquirer_for(&steam, &temp.path().join("dl"), sources);

        acquirer.start(570).unwrap();
        let state = wait_terminal(&acquirer, 570);

        assert_eq!(state.status, AcquisitionStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("Not available on any source"));
        assert!(!steam.join("config/stplug-in/570.lua").exists());
        acquirer.shutdown();
    })
    .await
    .unwrap();
}

/// Unreachable first source, archive with a directive line and a manifest.
#[tokio::test(flavor = "multi_thread")]
async fn test_end_to_end_install() {
    let server = MockServer::start().await;
    serve_zip(
        &server,
        "/repo/440.zip",
        zip_bytes(&[
            ("depots/441_9001.manifest", "manifest-bytes"),
            ("440.lua", "addappid(440)\nsetManifestid(123)\n"),
        ]),
    )
    .await;
    let sources = vec![
        "http://127.0.0.1:9/{id}.zip".to_string(),
        format!("{}/repo/{{id}}.zip", server.uri()),
    ];

    tokio::task::spawn_blocking(move || {
        let temp = TempDir::new().unwrap();
        let steam = temp.path().join("steam");
        let acquirer = acquirer_for(&steam, &temp.path().join("dl"), sources);

        acquirer.start(440).unwrap();
        let state = wait_terminal(&acquirer, 440);

        assert_eq!(state.status, AcquisitionStatus::Done);
        assert_eq!(state.success, Some(true));
        let installed = steam.join("config/stplug-in/440.lua");
        assert_eq!(
            state.installed_path.as_deref(),
            Some(installed.display().to_string().as_str())
        );
        let script = fs::read_to_string(&installed).unwrap();
        assert!(script.contains("--setManifestid(123)"));
        assert_eq!(
            fs::read_to_string(steam.join("depotcache/441_9001.manifest")).unwrap(),
            "manifest-bytes"
        );
        acquirer.shutdown();
    })
    .await
    .unwrap();
}

/// A served file that is not a zip fails without trying later sources.
#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_archive_fails_processing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a/10"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b/10"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[("10.lua", "")])))
        .expect(0)
        .mount(&server)
        .await;
    let sources = vec![
        format!("{}/a/{{id}}", server.uri()),
        format!("{}/b/{{id}}", server.uri()),
    ];

    tokio::task::spawn_blocking(move || {
        let temp = TempDir::new().unwrap();
        let acquirer = acquirer_for(&temp.path().join("steam"), &temp.path().join("dl"), sources);

        acquirer.start(10).unwrap();
        let state = wait_terminal(&acquirer, 10);

        assert_eq!(state.status, AcquisitionStatus::Failed);
        assert!(state
            .error
            .as_deref()
            .unwrap_or_default()
            .starts_with("Processing failed:"));
        acquirer.shutdown();
    })
    .await
    .unwrap();

    server.verify().await;
}

// ============================================================================
// Plugin API Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_plugin_api_discovery_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/appdetails"))
        .and(query_param("appids", "440"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "440": { "success": true, "data": { "dlc": [441, 442] } }
        })))
        .mount(&server)
        .await;
    let template = format!("{}/api/appdetails?appids={{id}}", server.uri());

    tokio::task::spawn_blocking(move || {
        let temp = TempDir::new().unwrap();
        let steam = temp.path().join("steam");
        let locator: Arc<dyn SteamLocator> = Arc::new(FixedLocator::new(&steam));
        let fetcher = quick_fetcher();
        let metadata = StoreMetadataClient::new(fetcher.client().clone()).with_url_template(template);
        let acquirer = Acquirer::new(
            AcquirerConfig::default().with_sources(SourceList::new(Vec::<String>::new())),
            Arc::new(StateStore::new()),
            Arc::new(fetcher),
            Installer::new(Arc::clone(&locator)),
        );
        let api = PluginApi::new(acquirer, locator, Arc::new(metadata));

        let first = api.add_discovered_entries("440");
        assert_eq!(first["message"], "Added 2 DLCs");
        let second = api.add_discovered_entries("440");
        assert_eq!(second["message"], "Added 0 DLCs");

        assert_eq!(
            fs::read_to_string(steam.join("config/stplug-in/Steamtools.lua")).unwrap(),
            "addEntry(441, 1)\naddEntry(442, 1)\n"
        );
        api.shutdown();
    })
    .await
    .unwrap();
}
