//! Single-source archive fetching.
//!
//! A fetch attempt never fails outward: every problem is folded into a
//! [`FetchOutcome`] so the orchestrator can decide whether to move on to the
//! next source.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_LENGTH, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 8;

/// Default wait in seconds for response headers and for each body read.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;

/// Default whole-request timeout in seconds (5 minutes).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Identifying user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("reverig/", env!("CARGO_PKG_VERSION"));

/// Maximum redirect hops followed per request.
const MAX_REDIRECTS: usize = 10;

/// Buffer size for reading/writing during downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Progress events emitted while a source is being fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchProgress {
    /// The source answered 200; streaming begins.
    Started { total_bytes: u64 },
    /// Cumulative bytes written so far.
    Advanced { bytes_read: u64 },
}

/// Why a source could not provide the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// The source answered 404.
    NotFound,
    /// The source answered some other non-200 status.
    Status(u16),
    /// Connection, timeout, DNS or body read failure.
    Transport(String),
    /// The local destination could not be written.
    Write(String),
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Status(code) => write!(f, "unexpected status {}", code),
            Self::Transport(reason) => write!(f, "transport error: {}", reason),
            Self::Write(reason) => write!(f, "write error: {}", reason),
        }
    }
}

/// Result of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The archive was written to the destination.
    Downloaded { bytes_read: u64, total_bytes: u64 },
    /// Try the next source.
    Unavailable(Unavailable),
    /// The cancellation token fired.
    Cancelled,
}

/// Fetches one URL into one destination file.
///
/// Implementations must create or truncate `dest` only once the source has
/// answered 200, and must report progress monotonically.
pub trait ArchiveFetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(FetchProgress),
    ) -> FetchOutcome;
}

/// Failed to construct the HTTP client.
#[derive(Debug, Error)]
#[error("failed to create HTTP client: {0}")]
pub struct FetcherBuildError(#[from] reqwest::Error);

/// HTTP settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub connect_timeout: Duration,
    /// Idle limit: how long a silent source is waited on before moving on.
    pub read_timeout: Duration,
    /// Cap on one whole attempt, including the body.
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Blocking HTTP fetcher backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    /// Create a fetcher with the given settings.
    pub fn new(config: FetcherConfig) -> Result<Self, FetcherBuildError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        if let Ok(agent) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, agent);
        }

        let client = Client::builder()
            .default_headers(headers)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .connect_timeout(config.connect_timeout)
            // The blocking client applies this to the header wait and to each
            // body read; the whole-attempt cap is enforced in `stream_body`.
            .timeout(config.read_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a fetcher with default settings.
    pub fn with_defaults() -> Result<Self, FetcherBuildError> {
        Self::new(FetcherConfig::default())
    }

    /// The underlying client, for other calls that share the connection pool.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The settings this fetcher was built with.
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Stream the body into `dest`, removing the file unless it completes.
    fn stream_body(
        &self,
        response: &mut reqwest::blocking::Response,
        dest: &Path,
        total_bytes: u64,
        deadline: Instant,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(FetchProgress),
    ) -> FetchOutcome {
        if let Some(parent) = dest.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return FetchOutcome::Unavailable(Unavailable::Write(format!(
                    "{}: {}",
                    parent.display(),
                    e
                )));
            }
        }
        let file = match File::create(dest) {
            Ok(file) => file,
            Err(e) => {
                return FetchOutcome::Unavailable(Unavailable::Write(format!(
                    "{}: {}",
                    dest.display(),
                    e
                )))
            }
        };

        on_progress(FetchProgress::Started { total_bytes });

        let outcome =
            self.write_body(response, file, dest, total_bytes, deadline, cancel, on_progress);
        if !matches!(outcome, FetchOutcome::Downloaded { .. }) {
            remove_archive(dest);
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn write_body(
        &self,
        response: &mut reqwest::blocking::Response,
        file: File,
        dest: &Path,
        total_bytes: u64,
        deadline: Instant,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(FetchProgress),
    ) -> FetchOutcome {
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut bytes_read = 0u64;

        loop {
            if cancel.is_cancelled() {
                return FetchOutcome::Cancelled;
            }
            if Instant::now() >= deadline {
                return FetchOutcome::Unavailable(Unavailable::Transport(format!(
                    "timed out after {}s",
                    self.config.request_timeout.as_secs()
                )));
            }

            let n = match response.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return FetchOutcome::Unavailable(Unavailable::Transport(format!(
                        "read error: {}",
                        e
                    )))
                }
            };

            if let Err(e) = writer.write_all(&buffer[..n]) {
                return FetchOutcome::Unavailable(Unavailable::Write(format!(
                    "{}: {}",
                    dest.display(),
                    e
                )));
            }

            bytes_read += n as u64;
            on_progress(FetchProgress::Advanced { bytes_read });
        }

        if let Err(e) = writer.flush() {
            return FetchOutcome::Unavailable(Unavailable::Write(format!(
                "{}: {}",
                dest.display(),
                e
            )));
        }

        FetchOutcome::Downloaded {
            bytes_read,
            total_bytes: total_bytes.max(bytes_read),
        }
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(FetchProgress),
    ) -> FetchOutcome {
        if cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        let deadline = Instant::now() + self.config.request_timeout;
        let mut response = match self.client.get(url).send() {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    "timed out waiting for a response".to_string()
                } else {
                    e.to_string()
                };
                debug!(url, reason = %reason, "source unreachable");
                return FetchOutcome::Unavailable(Unavailable::Transport(reason));
            }
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                debug!(url, "source returned 404");
                return FetchOutcome::Unavailable(Unavailable::NotFound);
            }
            other => {
                debug!(url, status = other.as_u16(), "source returned unexpected status");
                return FetchOutcome::Unavailable(Unavailable::Status(other.as_u16()));
            }
        }

        let total_bytes = content_length(response.headers());
        self.stream_body(&mut response, dest, total_bytes, deadline, cancel, on_progress)
    }
}

/// Delete the file at `path`; a missing file is not an error.
pub(super) fn remove_archive(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "archive removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove archive"),
    }
}

/// Parse the `Content-Length` header, defaulting to 0 (unknown).
fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::{TcpListener, TcpStream};
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::thread;
    use tempfile::TempDir;

    /// Accept one connection, consume the request head, then hand the
    /// stream to `respond`.
    fn one_shot_server(respond: impl FnOnce(TcpStream) + Send + 'static) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 {
                if line == "\r\n" {
                    break;
                }
                line.clear();
            }
            respond(stream);
        });
        format!("http://{}/1.zip", addr)
    }

    /// Run a fetch on its own thread and wait at most `limit` for it.
    fn fetch_within(
        fetcher: HttpFetcher,
        url: String,
        dest: PathBuf,
        limit: Duration,
    ) -> (FetchOutcome, bool) {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut started = false;
            let outcome = fetcher.fetch(&url, &dest, &CancellationToken::new(), &mut |event| {
                if let FetchProgress::Started { .. } = event {
                    started = true;
                }
            });
            let _ = tx.send((outcome, started));
        });
        rx.recv_timeout(limit).expect("fetch did not return in time")
    }

    fn short_read_timeout() -> HttpFetcher {
        HttpFetcher::new(FetcherConfig {
            read_timeout: Duration::from_secs(1),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_fetcher_config_default() {
        let config = FetcherConfig::default();
        assert_eq!(config.connect_timeout.as_secs(), DEFAULT_CONNECT_TIMEOUT_SECS);
        assert_eq!(config.read_timeout.as_secs(), DEFAULT_READ_TIMEOUT_SECS);
        assert_eq!(config.request_timeout.as_secs(), DEFAULT_REQUEST_TIMEOUT_SECS);
        assert!(config.user_agent.starts_with("reverig/"));
    }

    #[test]
    fn test_content_length_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), 0);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1234"));
        assert_eq!(content_length(&headers), 1234);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("garbage"));
        assert_eq!(content_length(&headers), 0);
    }

    #[test]
    fn test_unavailable_display() {
        assert_eq!(Unavailable::NotFound.to_string(), "not found");
        assert_eq!(Unavailable::Status(503).to_string(), "unexpected status 503");
        assert!(Unavailable::Transport("reset".into())
            .to_string()
            .contains("reset"));
    }

    #[test]
    fn test_cancelled_before_request() {
        let fetcher = HttpFetcher::with_defaults().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("1.zip");

        let outcome = fetcher.fetch("http://127.0.0.1:9/1.zip", &dest, &token, &mut |_| {});
        assert_eq!(outcome, FetchOutcome::Cancelled);
        assert!(!dest.exists());
    }

    #[test]
    fn test_unreachable_source_is_unavailable() {
        let fetcher = HttpFetcher::new(FetcherConfig {
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("1.zip");

        // Port 9 (discard) is closed on test hosts; the connect is refused.
        let outcome = fetcher.fetch(
            "http://127.0.0.1:9/1.zip",
            &dest,
            &CancellationToken::new(),
            &mut |_| {},
        );
        assert!(matches!(
            outcome,
            FetchOutcome::Unavailable(Unavailable::Transport(_))
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_truncated_body_removes_partial_file() {
        let url = one_shot_server(|mut stream| {
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\nhello world")
                .unwrap();
            stream.flush().unwrap();
        });
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("1.zip");

        let (outcome, started) = fetch_within(
            HttpFetcher::with_defaults().unwrap(),
            url,
            dest.clone(),
            Duration::from_secs(20),
        );

        assert!(started);
        assert!(matches!(
            outcome,
            FetchOutcome::Unavailable(Unavailable::Transport(_))
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_silent_source_gives_up_after_read_timeout() {
        let (release, held) = mpsc::channel::<()>();
        let url = one_shot_server(move |_stream| {
            let _ = held.recv_timeout(Duration::from_secs(30));
        });
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("1.zip");

        let (outcome, started) =
            fetch_within(short_read_timeout(), url, dest.clone(), Duration::from_secs(10));
        drop(release);

        assert!(!started);
        assert!(matches!(
            outcome,
            FetchOutcome::Unavailable(Unavailable::Transport(_))
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_stalled_body_gives_up_and_removes_file() {
        let (release, held) = mpsc::channel::<()>();
        let url = one_shot_server(move |mut stream| {
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\nPK")
                .unwrap();
            stream.flush().unwrap();
            let _ = held.recv_timeout(Duration::from_secs(30));
        });
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("1.zip");

        let (outcome, started) =
            fetch_within(short_read_timeout(), url, dest.clone(), Duration::from_secs(10));
        drop(release);

        assert!(started);
        assert!(matches!(outcome, FetchOutcome::Unavailable(_)));
        assert!(!dest.exists());
    }
}
