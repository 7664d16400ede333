use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;
use warnlist::config::{DomainSource, SourceConfig};
use warnlist::engine::{FileFormat, IndexSource, SourceLoader};
use warnlist::error::SourceError;

/// Serves one canned HTTP response per connection.
async fn serve(status_line: &'static str, body: &'static str) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    Url::parse(&format!("http://{}/list.txt", addr)).unwrap()
}

fn loader_for(url: Url, format: FileFormat) -> SourceLoader {
    let mut config = SourceConfig::new(DomainSource::Url(url), format);
    config.fetch_timeout = Duration::from_secs(5);
    SourceLoader::new(config).unwrap()
}

#[tokio::test]
async fn test_url_textlist_loads() {
    let url = serve("200 OK", "# remote list\ntotally.cool\nexample.org\n").await;
    let loader = loader_for(url, FileFormat::TextList);

    let index = loader.load().await.unwrap();
    assert_eq!(index.len(), 2);
    assert!(index.contains("example.org"));
    assert!(index.contains("totally.cool"));
    assert!(!index.contains("other.org"));
}

#[tokio::test]
async fn test_url_hostfile_loads() {
    let url = serve("200 OK", "0.0.0.0 ads.example.com\n::1 localhost\n").await;
    let loader = loader_for(url, FileFormat::Hostfile);

    let index = loader.load().await.unwrap();
    assert!(index.contains("ads.example.com"));
    assert!(index.contains("localhost"));
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let url = serve("404 Not Found", "missing").await;
    let loader = loader_for(url, FileFormat::TextList);

    let err = loader.load().await.unwrap_err();
    match err {
        SourceError::Status { status, .. } => assert_eq!(status.as_u16(), 404),
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_host_is_an_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("http://{}/list.txt", addr)).unwrap();
    let loader = loader_for(url, FileFormat::TextList);

    let err = loader.load().await.unwrap_err();
    assert!(matches!(err, SourceError::Http { .. }), "got {:?}", err);
}
