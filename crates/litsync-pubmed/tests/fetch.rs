//! Download behaviour against an in-process HTTP server
//!
//! Each test starts its own axum server on 127.0.0.1:0 on the shared
//! runtime and drives the blocking `Fetcher` from the test thread.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::header::{CONTENT_RANGE, RANGE};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;

use litsync_core::{ProgressContext, SHARED_RUNTIME};
use litsync_pubmed::{Config, FetchError, Fetcher, RemoteFile};

static NEVER: AtomicBool = AtomicBool::new(false);
static CANCELLED: AtomicBool = AtomicBool::new(true);

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    /// Honours `Range: bytes=N-`
    Ranged,
    /// Always answers 200 with the whole file
    IgnoreRange,
    /// First GET returns only half of the file
    TruncateOnce,
    /// HEAD unsupported (405)
    NoHead,
    /// Answers 206 with the whole file even when no range was asked for
    AlwaysPartial,
    /// Every request answers with this status
    Status(StatusCode),
}

struct Remote {
    files: HashMap<String, Vec<u8>>,
    mode: Mode,
    gets: AtomicUsize,
    ranges: Mutex<Vec<Option<String>>>,
}

impl Remote {
    fn new(mode: Mode, files: &[(&str, Vec<u8>)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(name, body)| (name.to_string(), body.clone()))
                .collect(),
            mode,
            gets: AtomicUsize::new(0),
            ranges: Mutex::new(Vec::new()),
        }
    }

    fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

async fn listing(State(remote): State<Arc<Remote>>) -> Html<String> {
    let mut names: Vec<_> = remote.files.keys().cloned().collect();
    names.push("missing.xml.gz".to_string());
    names.sort();
    let rows: String = names
        .iter()
        .map(|n| format!("<a href=\"{n}\">{n}</a>   2026-01-01 00:00   1K\n"))
        .collect();
    Html(format!("<html><body><pre>\n{rows}</pre></body></html>"))
}

async fn serve(
    State(remote): State<Arc<Remote>>,
    UrlPath(name): UrlPath<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    if let Mode::Status(code) = remote.mode {
        if method == Method::GET {
            remote.gets.fetch_add(1, Ordering::SeqCst);
        }
        return code.into_response();
    }
    let Some(body) = remote.files.get(&name) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if method == Method::HEAD {
        if remote.mode == Mode::NoHead {
            return StatusCode::METHOD_NOT_ALLOWED.into_response();
        }
        return body.clone().into_response();
    }

    let n = remote.gets.fetch_add(1, Ordering::SeqCst);
    let range = headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    remote.ranges.lock().unwrap().push(range.clone());

    let len = body.len();
    match remote.mode {
        Mode::IgnoreRange => return body.clone().into_response(),
        Mode::TruncateOnce if n == 0 => return body[..len / 2].to_vec().into_response(),
        _ => {}
    }

    let start = range
        .as_deref()
        .and_then(|r| r.strip_prefix("bytes="))
        .and_then(|r| r.strip_suffix('-'))
        .and_then(|s| s.parse::<usize>().ok());
    let Some(start) = start else {
        if remote.mode == Mode::AlwaysPartial {
            return (
                StatusCode::PARTIAL_CONTENT,
                [(CONTENT_RANGE, format!("bytes 0-{}/{len}", len - 1))],
                body.clone(),
            )
                .into_response();
        }
        return body.clone().into_response();
    };
    if start >= len {
        return (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(CONTENT_RANGE, format!("bytes */{len}"))],
        )
            .into_response();
    }
    (
        StatusCode::PARTIAL_CONTENT,
        [(CONTENT_RANGE, format!("bytes {start}-{}/{len}", len - 1))],
        body[start..].to_vec(),
    )
        .into_response()
}

/// Start a server, returning its base URL
fn start(remote: Remote) -> (String, Arc<Remote>) {
    let remote = Arc::new(remote);
    let app = Router::new()
        .route("/", get(listing))
        .route("/{name}", get(serve))
        .with_state(remote.clone());
    let listener = SHARED_RUNTIME
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();
    SHARED_RUNTIME.spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{addr}/"), remote)
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn fetcher(base_url: &str) -> Fetcher {
    let config = Config {
        base_url: base_url.to_string(),
        max_attempts: 3,
        backoff_base: Duration::ZERO,
        pause_between_files: Duration::ZERO,
        ..Default::default()
    };
    Fetcher::new(&config, Arc::new(ProgressContext::hidden())).with_cancel_flag(&NEVER)
}

const NAME: &str = "pubmed26n0001.xml.gz";

#[test]
fn fresh_download() {
    let body = payload(300_000);
    let (url, remote) = start(Remote::new(Mode::Ranged, &[(NAME, body.clone())]));
    let dir = tempfile::tempdir().unwrap();

    let path = fetcher(&url)
        .fetch(&RemoteFile::new(NAME), dir.path(), 3)
        .unwrap();

    assert_eq!(fs::read(path).unwrap(), body);
    assert_eq!(*remote.ranges.lock().unwrap(), [None]);
}

#[test]
fn resumes_from_bytes_on_disk() {
    let body = payload(300_000);
    let (url, remote) = start(Remote::new(Mode::Ranged, &[(NAME, body.clone())]));
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(NAME), &body[..1000]).unwrap();

    let path = fetcher(&url)
        .fetch(&RemoteFile::new(NAME), dir.path(), 3)
        .unwrap();

    assert_eq!(fs::read(path).unwrap(), body);
    assert_eq!(
        *remote.ranges.lock().unwrap(),
        [Some("bytes=1000-".to_string())]
    );
}

#[test]
fn complete_file_is_not_downloaded_again() {
    let body = payload(50_000);
    let (url, remote) = start(Remote::new(Mode::Ranged, &[(NAME, body.clone())]));
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(NAME), &body).unwrap();

    fetcher(&url)
        .fetch(&RemoteFile::new(NAME), dir.path(), 3)
        .unwrap();

    assert_eq!(remote.gets(), 0);
}

#[test]
fn ignored_range_restarts_from_zero() {
    let body = payload(80_000);
    let (url, _remote) = start(Remote::new(Mode::IgnoreRange, &[(NAME, body.clone())]));
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(NAME), b"stale prefix").unwrap();

    let path = fetcher(&url)
        .fetch(&RemoteFile::new(NAME), dir.path(), 3)
        .unwrap();

    assert_eq!(fs::read(path).unwrap(), body);
}

#[test]
fn short_body_is_retried_with_range() {
    let body = payload(100_000);
    let (url, remote) = start(Remote::new(Mode::TruncateOnce, &[(NAME, body.clone())]));
    let dir = tempfile::tempdir().unwrap();

    let path = fetcher(&url)
        .fetch(&RemoteFile::new(NAME), dir.path(), 3)
        .unwrap();

    assert_eq!(fs::read(path).unwrap(), body);
    assert_eq!(
        *remote.ranges.lock().unwrap(),
        [None, Some("bytes=50000-".to_string())]
    );
}

#[test]
fn unsatisfiable_range_on_complete_file() {
    let body = payload(20_000);
    let (url, remote) = start(Remote::new(Mode::NoHead, &[(NAME, body.clone())]));
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(NAME), &body).unwrap();

    let path = fetcher(&url)
        .fetch(&RemoteFile::new(NAME), dir.path(), 3)
        .unwrap();

    assert_eq!(fs::read(path).unwrap(), body);
    assert_eq!(remote.gets(), 1);
}

#[test]
fn size_from_get_when_head_unsupported() {
    let body = payload(40_000);
    let (url, _remote) = start(Remote::new(Mode::NoHead, &[(NAME, body.clone())]));
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(NAME), &body[..10]).unwrap();

    let path = fetcher(&url)
        .fetch(&RemoteFile::new(NAME), dir.path(), 3)
        .unwrap();

    assert_eq!(fs::read(path).unwrap(), body);
}

#[test]
fn server_errors_exhaust_attempts() {
    let (url, remote) = start(Remote::new(
        Mode::Status(StatusCode::SERVICE_UNAVAILABLE),
        &[],
    ));
    let dir = tempfile::tempdir().unwrap();

    let err = fetcher(&url)
        .fetch(&RemoteFile::new(NAME), dir.path(), 3)
        .unwrap_err();

    assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
    assert_eq!(remote.gets(), 3);
}

#[test]
fn not_found_is_permanent() {
    let (url, remote) = start(Remote::new(Mode::Status(StatusCode::NOT_FOUND), &[]));
    let dir = tempfile::tempdir().unwrap();

    let err = fetcher(&url)
        .fetch(&RemoteFile::new(NAME), dir.path(), 3)
        .unwrap_err();

    assert!(matches!(err, FetchError::Stream(_)));
    assert_eq!(remote.gets(), 1);
}

#[test]
fn cancellation_keeps_partial_file() {
    let body = payload(10_000);
    let (url, remote) = start(Remote::new(Mode::Ranged, &[(NAME, body.clone())]));
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(NAME), &body[..100]).unwrap();

    let err = fetcher(&url)
        .with_cancel_flag(&CANCELLED)
        .fetch(&RemoteFile::new(NAME), dir.path(), 3)
        .unwrap_err();

    assert!(matches!(err, FetchError::Interrupted));
    assert_eq!(fs::read(dir.path().join(NAME)).unwrap(), &body[..100]);
    assert_eq!(remote.gets(), 0);
}

#[test]
fn sync_all_counts_failures_and_continues() {
    let a = payload(5_000);
    let b = payload(7_000);
    let (url, _remote) = start(Remote::new(
        Mode::Ranged,
        &[("a.xml.gz", a.clone()), ("b.xml.gz", b.clone())],
    ));
    let dir = tempfile::tempdir().unwrap();

    let summary = fetcher(&url).sync_all(dir.path(), None);

    assert_eq!(summary.listed, 3);
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].0, "missing.xml.gz");
    assert_eq!(fs::read(dir.path().join("a.xml.gz")).unwrap(), a);
    assert_eq!(fs::read(dir.path().join("b.xml.gz")).unwrap(), b);
}

#[test]
fn sync_all_respects_limit() {
    let (url, _remote) = start(Remote::new(
        Mode::Ranged,
        &[("a.xml.gz", payload(100)), ("b.xml.gz", payload(100))],
    ));
    let dir = tempfile::tempdir().unwrap();

    let summary = fetcher(&url).sync_all(dir.path(), Some(1));

    assert_eq!(summary.listed, 3);
    assert_eq!(summary.attempted, 1);
    assert!(dir.path().join("a.xml.gz").exists());
    assert!(!dir.path().join("b.xml.gz").exists());
}

#[test]
fn sync_all_zero_limit_means_all() {
    let (url, _remote) = start(Remote::new(
        Mode::Ranged,
        &[("a.xml.gz", payload(100)), ("b.xml.gz", payload(100))],
    ));
    let dir = tempfile::tempdir().unwrap();

    let summary = fetcher(&url).sync_all(dir.path(), Some(0));

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 2);
    assert!(dir.path().join("b.xml.gz").exists());
}

#[test]
fn partial_reply_to_fresh_download_creates_file() {
    let body = payload(50_000);
    let (url, remote) = start(Remote::new(Mode::AlwaysPartial, &[(NAME, body.clone())]));
    let dir = tempfile::tempdir().unwrap();

    let path = fetcher(&url)
        .fetch(&RemoteFile::new(NAME), dir.path(), 3)
        .unwrap();

    assert_eq!(fs::read(path).unwrap(), body);
    assert_eq!(remote.gets(), 1);
}

#[test]
fn listing_failure_yields_empty_sync() {
    let (url, _remote) = start(Remote::new(
        Mode::Status(StatusCode::INTERNAL_SERVER_ERROR),
        &[],
    ));
    let dir = tempfile::tempdir().unwrap();

    let summary = fetcher(&format!("{url}listing/")).sync_all(dir.path(), None);

    assert_eq!(summary.listed, 0);
    assert_eq!(summary.attempted, 0);
}

/// Real NCBI baseline; run with `--ignored`
#[test]
#[ignore]
fn ncbi_listing_smoke() {
    let fetcher = Fetcher::new(&Config::default(), Arc::new(ProgressContext::hidden()));
    let files = fetcher.list_remote_files();
    assert!(files.len() > 1000, "got {} archives", files.len());
    assert!(files.iter().all(|f| f.name.ends_with(".xml.gz")));
}
