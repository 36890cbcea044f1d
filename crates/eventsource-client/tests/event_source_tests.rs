//! End-to-end behaviour of `EventSource` against scripted and real servers.

mod common;

use std::time::{Duration, Instant};

use common::{
    ChannelHandler, Observed, Script, ScriptedTransport, assert_quiet, init_tracing, next, raw,
    sse_response,
};
use eventsource_client::{ConnectionState, EventSource, EventSourceError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

const URI: &str = "http://localhost:8080/es";
const FAST: Duration = Duration::from_millis(10);

fn scripted(
    scripts: Vec<Script>,
    delay: Duration,
) -> (
    EventSource,
    std::sync::Arc<ScriptedTransport>,
    tokio::sync::mpsc::UnboundedReceiver<Observed>,
) {
    init_tracing();
    let transport = ScriptedTransport::new(scripts);
    let (handler, rx) = ChannelHandler::new();
    let source = EventSource::builder(URI)
        .reconnect_delay(delay)
        .transport(transport.clone())
        .build(handler)
        .unwrap();
    (source, transport, rx)
}

#[tokio::test]
async fn test_receives_events_after_preamble() {
    let (source, transport, mut rx) = scripted(
        vec![Script::Hold(sse_response(&[
            "data: hello",
            "data: world",
            "",
            ": comment",
            "id: 1",
            "event: custom",
            "data: x",
            "",
        ]))],
        FAST,
    );
    assert_eq!(source.state(), ConnectionState::Idle);

    source.connect().unwrap().established().await.unwrap();

    assert_eq!(next(&mut rx).await, Observed::Connect);
    assert_eq!(
        next(&mut rx).await,
        Observed::message("message", "hello\nworld", None, URI)
    );
    assert_eq!(
        next(&mut rx).await,
        Observed::message("custom", "x", Some("1"), URI)
    );
    assert!(source.is_connected());
    assert_eq!(source.last_event_id().as_deref(), Some("1"));
    assert_eq!(source.origin(), URI);

    let request = &transport.requests()[0];
    assert!(request.starts_with("GET /es HTTP/1.1\r\n"));
    assert!(request.contains("Accept: text/event-stream\r\n"));
    assert!(request.contains("Host: localhost:8080\r\n"));
    assert!(request.contains("Origin: http://localhost\r\n"));
    assert!(!request.contains("Last-Event-ID"));

    source.close();
    assert_eq!(next(&mut rx).await, Observed::Closed(false));
    assert_eq!(source.state(), ConnectionState::Closed);
    source.join().await;
}

#[tokio::test]
async fn test_reconnects_once_server_is_available() {
    let (source, transport, mut rx) = scripted(
        vec![Script::Refuse, Script::Hold(sse_response(&["data: up", ""]))],
        FAST,
    );

    let err = source.connect().unwrap().established().await.unwrap_err();
    assert!(matches!(err, EventSourceError::ConnectFailed { .. }));

    match next(&mut rx).await {
        Observed::Error(message) => assert!(message.starts_with("Failed to connect to http://localhost:8080/es")),
        other => panic!("expected connect error, got {other:?}"),
    }
    assert_eq!(next(&mut rx).await, Observed::Connect);
    assert_eq!(next(&mut rx).await, Observed::message("message", "up", None, URI));
    assert_eq!(transport.connects(), 2);

    source.close();
}

#[tokio::test]
async fn test_close_cancels_pending_reconnect() {
    let (source, transport, mut rx) = scripted(vec![Script::Refuse], Duration::from_millis(100));

    source.connect().unwrap();
    assert!(matches!(next(&mut rx).await, Observed::Error(_)));

    // Give the connection task time to arm the timer
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(source.state(), ConnectionState::ReconnectScheduled);

    source.close();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(transport.connects(), 1);
    assert_eq!(source.state(), ConnectionState::Closed);
    assert_quiet(&mut rx, Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_last_event_id_is_sent_on_reconnect() {
    let (source, transport, mut rx) = scripted(
        vec![
            Script::Lines(sse_response(&["id: 7", "data: a", ""])),
            Script::Hold(sse_response(&["data: b", ""])),
        ],
        FAST,
    );

    source.connect().unwrap();
    assert_eq!(next(&mut rx).await, Observed::Connect);
    assert_eq!(next(&mut rx).await, Observed::message("message", "a", Some("7"), URI));
    assert_eq!(next(&mut rx).await, Observed::Closed(true));
    assert_eq!(next(&mut rx).await, Observed::Connect);
    // The id carries over into the new connection
    assert_eq!(next(&mut rx).await, Observed::message("message", "b", Some("7"), URI));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].contains("Last-Event-ID"));
    assert!(requests[1].contains("Last-Event-ID: 7\r\n"));

    source.close();
}

#[tokio::test]
async fn test_retry_field_updates_reconnect_delay() {
    let (source, _transport, mut rx) = scripted(
        vec![Script::Hold(sse_response(&[
            "retry: 7000L",
            "retry: 7000",
            "data: sync",
            "",
        ]))],
        FAST,
    );
    assert_eq!(source.reconnect_delay(), FAST);

    source.connect().unwrap();
    assert_eq!(next(&mut rx).await, Observed::Connect);
    assert!(matches!(next(&mut rx).await, Observed::Message { .. }));
    assert_eq!(source.reconnect_delay(), Duration::from_millis(7000));

    source.close();
}

#[tokio::test]
async fn test_retry_governs_the_next_reconnect() {
    let (source, transport, mut rx) = scripted(
        vec![
            Script::Lines(sse_response(&["retry: 300"])),
            Script::Hold(sse_response(&[])),
        ],
        FAST,
    );
    let started = Instant::now();

    source.connect().unwrap();
    assert_eq!(next(&mut rx).await, Observed::Connect);
    assert_eq!(next(&mut rx).await, Observed::Closed(true));
    assert_eq!(source.reconnect_delay(), Duration::from_millis(300));

    // The configured 10ms would have fired long ago
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(transport.connects(), 1);

    assert_eq!(next(&mut rx).await, Observed::Connect);
    assert_eq!(transport.connects(), 2);
    assert!(started.elapsed() >= Duration::from_millis(300));

    source.close();
}

async fn assert_rejected_then_reconnects(first: Vec<String>, expected_error: &str) {
    let (source, transport, mut rx) = scripted(
        vec![Script::Lines(first), Script::Hold(sse_response(&[]))],
        FAST,
    );

    source.connect().unwrap();
    assert_eq!(next(&mut rx).await, Observed::Error(expected_error.to_string()));
    // No on_closed: the first connection never opened
    assert_eq!(next(&mut rx).await, Observed::Connect);
    assert_eq!(transport.connects(), 2);

    source.close();
}

#[tokio::test]
async fn test_bad_status_reports_once_and_reconnects() {
    assert_rejected_then_reconnects(
        raw(&["HTTP/1.1 404 Not Found", "Content-Type: text/event-stream", ""]),
        "Bad status from http://localhost:8080/es: 404",
    )
    .await;
}

#[tokio::test]
async fn test_non_http_response_reports_once_and_reconnects() {
    assert_rejected_then_reconnects(
        raw(&["SSH-2.0-OpenSSH_9.0"]),
        "Not HTTP? http://localhost:8080/es: SSH-2.0-OpenSSH_9.0",
    )
    .await;
}

#[tokio::test]
async fn test_missing_content_type_reports_once_and_reconnects() {
    assert_rejected_then_reconnects(
        raw(&["HTTP/1.1 200 OK", "Content-Type: text/html", ""]),
        "Not event stream: http://localhost:8080/es (expected Content-Type: text/event-stream)",
    )
    .await;
}

#[tokio::test]
async fn test_eof_before_preamble_reports_connection_lost() {
    assert_rejected_then_reconnects(
        raw(&["HTTP/1.1 200 OK"]),
        "Connection lost: stream ended before the response preamble",
    )
    .await;
}

/// Closes right after the first connect and returns every callback delivered.
async fn close_early(scripts: Vec<Script>, settle: Duration) -> Vec<Observed> {
    let (source, _transport, mut rx) = scripted(scripts, FAST);
    source.connect().unwrap().established().await.unwrap();
    tokio::time::sleep(settle).await;
    source.close();
    assert!(source.shutdown(Duration::from_secs(5)).await);

    let mut seen = Vec::new();
    while let Ok(observed) = rx.try_recv() {
        seen.push(observed);
    }
    seen
}

#[tokio::test]
async fn test_close_never_reports_closed_without_connect() {
    for _ in 0..50 {
        let seen = close_early(vec![Script::Hold(sse_response(&[]))], Duration::ZERO).await;
        assert!(
            seen.is_empty() || seen == vec![Observed::Connect, Observed::Closed(false)],
            "unexpected callbacks {seen:?}"
        );
    }
}

#[tokio::test]
async fn test_close_while_connection_drops_reports_one_closed() {
    for _ in 0..50 {
        let seen = close_early(
            vec![Script::Lines(sse_response(&["data: a", ""]))],
            Duration::from_micros(100),
        )
        .await;
        let closed: Vec<_> = seen
            .iter()
            .filter(|observed| matches!(observed, Observed::Closed(_)))
            .collect();
        if seen.is_empty() {
            continue;
        }
        assert_eq!(closed.len(), 1, "unexpected callbacks {seen:?}");
        assert_eq!(seen[0], Observed::Connect);
        assert!(matches!(seen.last(), Some(Observed::Closed(_))));
    }
}

#[tokio::test]
async fn test_handler_error_is_reported_and_stream_continues() {
    let (source, _transport, mut rx) = scripted(
        vec![Script::Hold(sse_response(&["data: fail", "", "data: after", ""]))],
        FAST,
    );

    source.connect().unwrap();
    assert_eq!(next(&mut rx).await, Observed::Connect);
    assert_eq!(
        next(&mut rx).await,
        Observed::Error("Handler error: rejected".to_string())
    );
    assert_eq!(next(&mut rx).await, Observed::message("message", "after", None, URI));
    assert!(source.is_connected());

    source.close();
}

#[tokio::test]
async fn test_connect_misuse_errors() {
    let (source, _transport, _rx) = scripted(vec![Script::Hold(sse_response(&[]))], FAST);

    assert_ok!(source.connect());
    let err = assert_err!(source.connect());
    assert!(matches!(err, EventSourceError::AlreadyConnected));

    source.close();
    source.close();
    let err = assert_err!(source.connect());
    assert!(matches!(err, EventSourceError::Closed));
}

#[tokio::test]
async fn test_close_before_connect() {
    let (source, transport, mut rx) = scripted(vec![], FAST);
    source.close();
    assert_eq!(source.state(), ConnectionState::Closed);
    assert!(matches!(source.connect(), Err(EventSourceError::Closed)));
    source.join().await;
    assert_eq!(transport.connects(), 0);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_shutdown_drains_accepted_callbacks() {
    let body: Vec<String> = (0..50).flat_map(|i| [format!("data: {i}"), String::new()]).collect();
    let body: Vec<&str> = body.iter().map(String::as_str).collect();
    let (source, _transport, mut rx) = scripted(vec![Script::Hold(sse_response(&body))], FAST);

    source.connect().unwrap();
    assert_eq!(next(&mut rx).await, Observed::Connect);
    for i in 0..50 {
        assert_eq!(
            next(&mut rx).await,
            Observed::message("message", &i.to_string(), None, URI)
        );
    }

    assert!(source.shutdown(Duration::from_secs(5)).await);
    assert_eq!(next(&mut rx).await, Observed::Closed(false));
    // Handler dropped once the queue is drained
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_drop_closes_the_source() {
    let (source, transport, mut rx) = scripted(vec![Script::Hold(sse_response(&[]))], FAST);
    source.connect().unwrap();
    assert_eq!(next(&mut rx).await, Observed::Connect);

    drop(source);
    assert_eq!(next(&mut rx).await, Observed::Closed(false));
    assert!(rx.recv().await.is_none());
    assert_eq!(transport.connects(), 1);
}

#[tokio::test]
async fn test_invalid_uri_is_rejected_at_build() {
    let (handler, _rx) = ChannelHandler::new();
    let err = EventSource::new("localhost:8080/es", handler).unwrap_err();
    assert!(matches!(err, EventSourceError::InvalidUri { .. }));

    let (handler, _rx) = ChannelHandler::new();
    let err = EventSource::builder(URI)
        .header("Bad Header", "x")
        .build(handler)
        .unwrap_err();
    assert!(matches!(err, EventSourceError::Configuration(_)));
}

/// Minimal SSE server: answers the first request with two events built from
/// the `echoThis` query parameter and then keeps the connection open.
async fn echo_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);

        let mut request = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let line = line.trim_end().to_string();
            if line.is_empty() {
                break;
            }
            request.push(line);
        }

        let echo = request[0]
            .split_once("echoThis=")
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .unwrap_or("")
            .to_string();

        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream; charset=utf-8\r\n\r\n\
             data: a {echo}\n\ndata: b {echo}\n\n"
        );
        write.write_all(response.as_bytes()).await.unwrap();
        write.flush().await.unwrap();

        // Hold the stream open until the client goes away
        let mut rest = String::new();
        let _ = reader.read_line(&mut rest).await;
        request
    });

    (addr, server)
}

#[tokio::test]
async fn test_streams_from_tcp_server() {
    init_tracing();
    let (addr, server) = echo_server().await;
    let uri = format!("http://localhost:{}/es/?echoThis=yo", addr.port());

    let (handler, mut rx) = ChannelHandler::new();
    let source = EventSource::builder(uri.clone())
        .reconnect_delay(Duration::from_secs(10))
        .build(handler)
        .unwrap();

    source.connect().unwrap().established().await.unwrap();
    assert_eq!(next(&mut rx).await, Observed::Connect);
    assert_eq!(next(&mut rx).await, Observed::message("message", "a yo", None, &uri));
    assert_eq!(next(&mut rx).await, Observed::message("message", "b yo", None, &uri));

    let metrics = source.transport_metrics();
    assert_eq!(metrics.connections, 1);
    assert!(metrics.lines_received >= 7);

    source.close();
    source.join().await;

    let request = server.await.unwrap();
    assert_eq!(request[0], "GET /es/?echoThis=yo HTTP/1.1");
    assert!(request.contains(&"Accept: text/event-stream".to_string()));
    assert!(request.contains(&format!("Host: localhost:{}", addr.port())));
}
