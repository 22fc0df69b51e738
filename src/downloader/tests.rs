use super::*;
use crate::config::DownloadConfig;
use crate::types::PostId;
use crate::utils::partial_path;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BODY: &[u8] = b"\x89PNG fake image bytes";

fn test_config(output_dir: &Path, ignore_existing: bool) -> Config {
    Config {
        download: DownloadConfig {
            output_dir: output_dir.to_path_buf(),
            ignore_existing,
            max_concurrent_downloads: 2,
            ..DownloadConfig::default()
        },
        retry: RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Config::default()
    }
}

fn descriptor(server: &MockServer, id: u64, name: &str) -> MediaDescriptor {
    MediaDescriptor {
        id: PostId(id),
        username: "alice".into(),
        url: format!("{}/media/{name}", server.uri()),
        filename: name.into(),
        extension: "png".into(),
    }
}

async fn mount_ok(server: &MockServer, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/media/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .mount(server)
        .await;
}

/// Serve `body` one byte at a time with `pause` between bytes, optionally
/// going silent after `stall_after` bytes. Returns the media URL.
async fn trickle_server(body: &'static [u8], pause: Duration, stall_after: Option<usize>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    body.len()
                );
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for (sent, byte) in body.iter().enumerate() {
                    if stall_after == Some(sent) {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                    tokio::time::sleep(pause).await;
                    if socket.write_all(&[*byte]).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    format!("http://{addr}/media/slow.mp4")
}

fn slow_descriptor(url: String) -> MediaDescriptor {
    MediaDescriptor {
        id: PostId(9),
        username: "alice".into(),
        url,
        filename: "slow.mp4".into(),
        extension: "mp4".into(),
    }
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

#[tokio::test]
async fn writes_to_templated_destination() {
    let server = MockServer::start().await;
    mount_ok(&server, "a.png").await;
    let dir = TempDir::new().unwrap();
    let downloader = MediaDownloader::new(&test_config(dir.path(), false)).unwrap();

    let outcome = downloader.download(&descriptor(&server, 42, "a.png")).await;

    let expected = dir.path().join("alice").join("42-a.png");
    assert_eq!(
        outcome,
        DownloadOutcome::Written {
            path: expected.clone(),
            bytes: BODY.len() as u64,
            attempts: 1,
        }
    );
    assert_eq!(std::fs::read(&expected).unwrap(), BODY);
    assert!(!partial_path(&expected).exists());
}

#[tokio::test]
async fn four_server_errors_then_success_is_written() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(4)
        .mount(&server)
        .await;
    mount_ok(&server, "a.png").await;
    let dir = TempDir::new().unwrap();
    let downloader = MediaDownloader::new(&test_config(dir.path(), false)).unwrap();

    let outcome = downloader.download(&descriptor(&server, 1, "a.png")).await;

    match outcome {
        DownloadOutcome::Written { attempts, .. } => assert_eq!(attempts, 5),
        other => panic!("expected written, got {other:?}"),
    }
    assert_eq!(request_count(&server).await, 5);
}

#[tokio::test]
async fn persistent_server_errors_fail_after_five_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(6)
        .mount(&server)
        .await;
    mount_ok(&server, "a.png").await;
    let dir = TempDir::new().unwrap();
    let downloader = MediaDownloader::new(&test_config(dir.path(), false)).unwrap();

    let outcome = downloader.download(&descriptor(&server, 1, "a.png")).await;

    match &outcome {
        DownloadOutcome::FailedAfterRetries { attempts, reason, .. } => {
            assert_eq!(*attempts, 5);
            assert!(reason.contains("500"), "{reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(request_count(&server).await, 5);
    assert!(!outcome.path().exists());
    assert!(!partial_path(outcome.path()).exists());
}

#[tokio::test]
async fn not_found_is_permanent_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let downloader = MediaDownloader::new(&test_config(dir.path(), false)).unwrap();

    let outcome = downloader.download(&descriptor(&server, 1, "gone.png")).await;

    assert!(
        matches!(outcome, DownloadOutcome::SkippedPermanentError { ref reason, .. } if reason.contains("404")),
        "{outcome:?}"
    );
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn second_run_with_ignore_existing_skips_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let downloader = MediaDownloader::new(&test_config(dir.path(), true)).unwrap();
    let media = descriptor(&server, 7, "a.png");

    let first = downloader.download(&media).await;
    assert!(matches!(first, DownloadOutcome::Written { .. }), "{first:?}");
    let content_after_first = std::fs::read(first.path()).unwrap();

    let second = downloader.download(&media).await;
    assert_eq!(
        second,
        DownloadOutcome::SkippedExisting {
            path: first.path().clone()
        }
    );
    assert_eq!(std::fs::read(second.path()).unwrap(), content_after_first);
}

#[tokio::test]
async fn existing_file_is_replaced_by_default() {
    let server = MockServer::start().await;
    mount_ok(&server, "a.png").await;
    let dir = TempDir::new().unwrap();
    let downloader = MediaDownloader::new(&test_config(dir.path(), false)).unwrap();
    let media = descriptor(&server, 7, "a.png");

    let destination = downloader.destination(&media);
    std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
    std::fs::write(&destination, b"stale").unwrap();

    let outcome = downloader.download(&media).await;

    assert!(matches!(outcome, DownloadOutcome::Written { .. }), "{outcome:?}");
    assert_eq!(std::fs::read(&destination).unwrap(), BODY);
}

#[tokio::test]
async fn failed_transfer_keeps_previous_file_intact() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let downloader = MediaDownloader::new(&test_config(dir.path(), false)).unwrap();
    let media = descriptor(&server, 7, "a.png");

    let destination = downloader.destination(&media);
    std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
    std::fs::write(&destination, b"previous").unwrap();

    let outcome = downloader.download(&media).await;

    assert!(matches!(outcome, DownloadOutcome::FailedAfterRetries { .. }));
    assert_eq!(std::fs::read(&destination).unwrap(), b"previous");
}

#[tokio::test]
async fn unreachable_host_is_transient() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), false);
    config.retry.max_attempts = 2;
    let downloader = MediaDownloader::new(&config).unwrap();

    // Bind and drop a listener to get a port nobody is serving
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let media = MediaDescriptor {
        id: PostId(3),
        username: "alice".into(),
        url: format!("http://127.0.0.1:{port}/media/x.png"),
        filename: "x.png".into(),
        extension: "png".into(),
    };

    let outcome = downloader.download(&media).await;
    assert!(
        matches!(outcome, DownloadOutcome::FailedAfterRetries { attempts: 2, .. }),
        "{outcome:?}"
    );
}

#[test]
fn bad_template_fails_construction() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), false);
    config.download.filename_template = "{username}/{nope}".into();

    assert!(matches!(
        MediaDownloader::new(&config),
        Err(Error::Config { .. })
    ));
}

#[tokio::test]
async fn download_all_reports_every_outcome() {
    let server = MockServer::start().await;
    mount_ok(&server, "a.png").await;
    mount_ok(&server, "b.png").await;
    Mock::given(method("GET"))
        .and(path("/media/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let downloader = MediaDownloader::new(&test_config(dir.path(), false)).unwrap();
    let (tx, mut rx) = broadcast::channel(16);

    let summary = downloader
        .download_all(
            vec![
                descriptor(&server, 1, "a.png"),
                descriptor(&server, 2, "b.png"),
                descriptor(&server, 3, "missing.png"),
            ],
            &CancellationToken::new(),
            Some(&tx),
        )
        .await;

    assert_eq!(summary.written, 2);
    assert_eq!(summary.skipped_permanent, 1);
    assert_eq!(summary.total(), 3);

    let mut finished = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, Event::MediaFinished { .. }) {
            finished += 1;
        }
    }
    assert_eq!(finished, 3);
}

#[tokio::test]
async fn duplicate_destinations_are_fetched_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let downloader = MediaDownloader::new(&test_config(dir.path(), false)).unwrap();

    let summary = downloader
        .download_all(
            vec![descriptor(&server, 1, "a.png"), descriptor(&server, 1, "a.png")],
            &CancellationToken::new(),
            None,
        )
        .await;

    assert_eq!(summary.written, 1);
    assert_eq!(summary.skipped_existing, 1);
}

#[tokio::test]
async fn cancelled_run_attempts_nothing() {
    let server = MockServer::start().await;
    mount_ok(&server, "a.png").await;
    let dir = TempDir::new().unwrap();
    let downloader = MediaDownloader::new(&test_config(dir.path(), false)).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = downloader
        .download_all(
            vec![descriptor(&server, 1, "a.png"), descriptor(&server, 2, "a.png")],
            &cancel,
            None,
        )
        .await;

    assert_eq!(summary.not_attempted, 2);
    assert_eq!(summary.written, 0);
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn slow_steady_transfer_outlasting_idle_timeout_is_written() {
    const SLOW_BODY: &[u8] = b"twelve bytes";
    let url = trickle_server(SLOW_BODY, Duration::from_millis(50), None).await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), false);
    config.download.idle_timeout = Duration::from_millis(300);
    let downloader = MediaDownloader::new(&config).unwrap();

    let outcome = downloader.download(&slow_descriptor(url)).await;

    match &outcome {
        DownloadOutcome::Written { bytes, attempts, .. } => {
            assert_eq!(*bytes, SLOW_BODY.len() as u64);
            assert_eq!(*attempts, 1);
        }
        other => panic!("expected written, got {other:?}"),
    }
    assert_eq!(std::fs::read(outcome.path()).unwrap(), SLOW_BODY);
}

#[tokio::test]
async fn stalled_transfer_is_retried_then_fails() {
    let url = trickle_server(b"never finishes", Duration::from_millis(1), Some(4)).await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), false);
    config.download.idle_timeout = Duration::from_millis(200);
    config.retry.max_attempts = 2;
    let downloader = MediaDownloader::new(&config).unwrap();

    let outcome = downloader.download(&slow_descriptor(url)).await;

    match &outcome {
        DownloadOutcome::FailedAfterRetries { attempts, reason, .. } => {
            assert_eq!(*attempts, 2);
            assert!(reason.contains("stalled"), "{reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!outcome.path().exists());
    assert!(!partial_path(outcome.path()).exists());
}

#[tokio::test]
async fn empty_token_value_never_targets_the_output_root() {
    let server = MockServer::start().await;
    mount_ok(&server, "noext").await;
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), true);
    config.download.filename_template = "{extension}".into();
    let downloader = MediaDownloader::new(&config).unwrap();
    let media = MediaDescriptor {
        extension: String::new(),
        ..descriptor(&server, 5, "noext")
    };

    assert_eq!(downloader.destination(&media), dir.path().join("_"));

    let outcome = downloader.download(&media).await;

    assert!(matches!(outcome, DownloadOutcome::Written { .. }), "{outcome:?}");
    assert_eq!(std::fs::read(dir.path().join("_")).unwrap(), BODY);
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn duplicate_of_failed_copy_reports_the_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let downloader = MediaDownloader::new(&test_config(dir.path(), false)).unwrap();
    let (tx, mut rx) = broadcast::channel(16);

    let summary = downloader
        .download_all(
            vec![
                descriptor(&server, 1, "gone.png"),
                descriptor(&server, 1, "gone.png"),
            ],
            &CancellationToken::new(),
            Some(&tx),
        )
        .await;

    assert_eq!(summary.skipped_permanent, 2);
    assert_eq!(summary.skipped_existing, 0);

    let mut finished = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Event::MediaFinished { outcome, .. } = event {
            finished.push(outcome);
        }
    }
    assert_eq!(finished.len(), 2);
    assert!(
        finished
            .iter()
            .all(|o| matches!(o, DownloadOutcome::SkippedPermanentError { .. })),
        "{finished:?}"
    );
}

#[tokio::test]
async fn cancelled_duplicates_are_not_attempted() {
    let server = MockServer::start().await;
    mount_ok(&server, "a.png").await;
    let dir = TempDir::new().unwrap();
    let downloader = MediaDownloader::new(&test_config(dir.path(), false)).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = downloader
        .download_all(
            vec![descriptor(&server, 1, "a.png"), descriptor(&server, 1, "a.png")],
            &cancel,
            None,
        )
        .await;

    assert_eq!(summary.not_attempted, 2);
    assert_eq!(summary.skipped_existing, 0);
}
