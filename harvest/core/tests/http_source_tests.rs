//! HTTP Source Integration Tests
//!
//! Runs [`HttpListingSource`] against a loopback server speaking just
//! enough HTTP/1.1: one request per connection, `Connection: close`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;

use harvest_core::{
    BackendSettings, BatchRequest, Controller, HarvestConfig, HarvestError, HttpListingSource,
    ListingSource, PaginationSettings, SearchQuery, SessionState, StreamFrame,
};

// =============================================================================
// Loopback server
// =============================================================================

/// Response chunks written in order, with a flush between each
type Reply = Vec<String>;

/// Serve every connection with `handler(request_line)`; returns the base
/// URL and the request lines seen so far
async fn serve<F>(handler: F) -> (String, Arc<Mutex<Vec<String>>>)
where
    F: Fn(&str) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let log = Arc::clone(&seen);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let handler = Arc::clone(&handler);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                handle(stream, handler.as_ref(), &log).await;
            });
        }
    });

    (format!("http://{addr}"), seen)
}

async fn handle<F>(mut stream: TcpStream, handler: &F, log: &Mutex<Vec<String>>)
where
    F: Fn(&str) -> Reply,
{
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&head).to_string();
    let request_line = head.lines().next().unwrap_or_default().to_string();
    log.lock().unwrap().push(request_line.clone());

    for chunk in handler(&request_line) {
        if stream.write_all(chunk.as_bytes()).await.is_err() {
            return;
        }
        let _ = stream.flush().await;
    }
    let _ = stream.shutdown().await;
}

/// Serve one event stream that sends `chunk` and then stays open without
/// writing. The returned receiver fires once the client closes the socket.
async fn serve_idle_stream(chunk: &'static str) -> (String, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0u8; 1024];
        let mut head = Vec::new();
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }

        let reply = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\n\r\n{chunk}"
        );
        if stream.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
        let _ = stream.flush().await;

        // Idle until the client goes away
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = closed_tx.send(());
    });

    (format!("http://{addr}"), closed_rx)
}

fn json_response(status: &str, body: &str) -> Reply {
    vec![format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )]
}

fn event_stream(chunks: &[&str]) -> Reply {
    let mut reply = vec![
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n"
            .to_string(),
    ];
    reply.extend(chunks.iter().map(|c| (*c).to_string()));
    reply
}

/// Value of query parameter `name` in a request line
fn param(request_line: &str, name: &str) -> Option<usize> {
    let query = request_line.split_whitespace().nth(1)?.split('?').nth(1)?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix(&format!("{name}=")))
        .and_then(|v| v.parse().ok())
}

fn listings_json(range: std::ops::Range<usize>) -> String {
    let items: Vec<String> = range
        .map(|i| {
            format!(
                r#"{{"url":"https://x/{i}","title":"Flat {i}","price":"₹{i} L","relevanceScore":"7.5"}}"#
            )
        })
        .collect();
    format!(r#"{{"items":[{}],"totalCount":null}}"#, items.join(","))
}

// =============================================================================
// Batch endpoint
// =============================================================================

#[tokio::test]
async fn test_fetch_batch_sends_parameters() {
    let (base_url, seen) = serve(|_| json_response("200 OK", &listings_json(0..3))).await;
    let source = HttpListingSource::new(base_url).unwrap();

    let request = BatchRequest::new(
        SearchQuery::new("kothrud")
            .with_property_type("apartment")
            .with_message_type("rent"),
        900,
        900,
    );
    let batch = source.fetch_batch(&request).await.unwrap();

    assert_eq!(batch.items.len(), 3);
    assert_eq!(batch.items[2].title, "Flat 2");
    assert_eq!(batch.items[0].relevance_score, Some(7.5));

    let line = seen.lock().unwrap()[0].clone();
    assert!(line.starts_with("GET /api/properties?"), "{line}");
    assert!(line.contains("offset=900"));
    assert!(line.contains("limit=900"));
    assert!(line.contains("query=kothrud"));
    assert!(line.contains("propertyType=apartment"));
    assert!(line.contains("messageType=rent"));
}

#[tokio::test]
async fn test_fetch_batch_http_error() {
    let (base_url, _) = serve(|_| json_response("502 Bad Gateway", r#"{"detail":"upstream down"}"#)).await;
    let source = HttpListingSource::new(base_url).unwrap();

    let err = source
        .fetch_batch(&BatchRequest::new(SearchQuery::new("x"), 0, 10))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        HarvestError::Http {
            status: 502,
            body: r#"{"detail":"upstream down"}"#.to_string(),
        }
    );
}

#[tokio::test]
async fn test_fetch_batch_malformed_body() {
    let (base_url, _) = serve(|_| json_response("200 OK", "<html>oops</html>")).await;
    let source = HttpListingSource::new(base_url).unwrap();

    let err = source
        .fetch_batch(&BatchRequest::new(SearchQuery::new("x"), 0, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Parse(_)), "{err:?}");
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind and drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = HttpListingSource::new(format!("http://{addr}")).unwrap();
    let err = source
        .fetch_batch(&BatchRequest::new(SearchQuery::new("x"), 0, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Transport(_)), "{err:?}");
}

// =============================================================================
// Event stream
// =============================================================================

#[tokio::test]
async fn test_event_stream_frames() {
    let (base_url, seen) = serve(|_| {
        event_stream(&[
            ": keep-alive\n\n",
            "event: property\ndata: {\"url\":\"https://x/1\",\"title\":\"A\"}\n\n",
            // One event split across two writes
            "event: property\ndata: {\"url\":\"https://x/2\",\"title\":\"B\",\"price\":\"\u{20b9}",
            "2 Cr\"}\n\n",
            "event: complete\ndata: {\"count\":2}\n\n",
        ])
    })
    .await;
    let source = HttpListingSource::new(base_url).unwrap();

    let mut rx = source.open_stream("https://portal.example/q").await.unwrap();
    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame.unwrap());
    }

    assert_eq!(frames.len(), 3);
    assert!(matches!(&frames[0], StreamFrame::Property(d) if d.contains("https://x/1")));
    assert!(matches!(&frames[1], StreamFrame::Property(d) if d.contains("₹2 Cr")));
    assert_eq!(frames[2], StreamFrame::Complete(r#"{"count":2}"#.to_string()));

    let line = seen.lock().unwrap()[0].clone();
    assert!(line.starts_with("GET /api/scrape/stream?url="), "{line}");
}

#[tokio::test]
async fn test_event_stream_error_event() {
    let (base_url, _) = serve(|_| event_stream(&["event: error\ndata: Rate limited\n\n"])).await;
    let source = HttpListingSource::new(base_url).unwrap();

    let mut rx = source.open_stream("t").await.unwrap();
    let first = rx.recv().await.unwrap().unwrap();
    assert_eq!(first, StreamFrame::Error("Rate limited".to_string()));
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_dropping_receiver_closes_idle_connection() {
    let (base_url, closed) =
        serve_idle_stream("event: property\ndata: {\"url\":\"a\",\"title\":\"A\"}\n\n").await;
    let source = HttpListingSource::new(base_url).unwrap();

    let mut rx = source.open_stream("t").await.unwrap();
    let first = rx.recv().await.unwrap().unwrap();
    assert!(matches!(first, StreamFrame::Property(_)));
    drop(rx);

    timeout(Duration::from_secs(5), closed)
        .await
        .expect("connection still open after the receiver was dropped")
        .unwrap();
}

// =============================================================================
// Controller over HTTP
// =============================================================================

#[tokio::test]
async fn test_controller_paginates_over_http() {
    let (base_url, seen) = serve(|line| {
        let offset = param(line, "offset").unwrap_or(0);
        let end = (offset + 10).min(25);
        json_response("200 OK", &listings_json(offset.min(end)..end))
    })
    .await;

    let config = HarvestConfig::default()
        .with_backend(BackendSettings {
            base_url,
            ..BackendSettings::default()
        })
        .with_pagination(PaginationSettings {
            page_size: 5,
            remote_batch_size: 10,
            trigger_page_within_batch: 2,
        });
    let source = Arc::new(HttpListingSource::from_config(&config.backend).unwrap());
    let mut controller = Controller::new(source, &config);

    controller.search(SearchQuery::new("hinjewadi"));
    controller.wait_idle().await;
    assert_eq!(controller.items().len(), 10);

    // Walk every page; each trigger page pulls the next batch
    for _ in 0..5 {
        controller.next();
        controller.wait_idle().await;
    }

    assert_eq!(controller.items().len(), 25);
    assert!(!controller.more_available());
    assert_eq!(controller.state(), SessionState::Results { count: 25 });
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_controller_stream_over_http_closed_early() {
    let (base_url, _) = serve(|_| {
        event_stream(&[
            "event: property\ndata: {\"url\":\"a\",\"title\":\"A\"}\n\n",
            "event: property\ndata: {\"url\":\"b\",\"title\":\"B\"}\n\n",
            "event: property\ndata: {\"url\":\"c\",\"title\":\"C\"}\n\n",
        ])
    })
    .await;

    let config = HarvestConfig::default().with_backend(BackendSettings {
        base_url,
        ..BackendSettings::default()
    });
    let source = Arc::new(HttpListingSource::from_config(&config.backend).unwrap());
    let mut controller = Controller::new(source, &config);

    controller.open_stream("https://portal.example/q");
    controller.wait_idle().await;

    assert_eq!(controller.items().len(), 3);
    assert_eq!(
        controller.state(),
        SessionState::Failed(HarvestError::StreamClosedUnexpectedly)
    );
}

#[tokio::test]
async fn test_controller_reset_closes_idle_stream() {
    let (base_url, closed) =
        serve_idle_stream("event: property\ndata: {\"url\":\"a\",\"title\":\"A\"}\n\n").await;
    let config = HarvestConfig::default().with_backend(BackendSettings {
        base_url,
        ..BackendSettings::default()
    });
    let source = Arc::new(HttpListingSource::from_config(&config.backend).unwrap());
    let mut controller = Controller::new(source, &config);

    controller.open_stream("https://portal.example/q");
    while controller.items().is_empty() {
        controller.next_update().await;
    }
    assert!(controller.is_busy());

    controller.reset();
    assert!(!controller.is_busy());
    timeout(Duration::from_secs(5), closed)
        .await
        .expect("connection still open after reset")
        .unwrap();
}
