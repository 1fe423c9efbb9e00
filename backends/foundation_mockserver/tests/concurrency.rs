#![cfg(test)]

use core::time::Duration;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use foundation_mockserver::logging::init_test_tracing;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use foundation_mockserver::{MockServer, MockServerConfig, ResponseSpec};

/// WHY: Each exchange runs on its own; one response's delay must not hold up another.
/// WHAT: Responses delayed 40ms "A", 70ms "B", 20ms "C", requested concurrently, complete
/// as C, A, B.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delayed_responses_complete_in_delay_order() {
    init_test_tracing();

    let mut server = MockServer::started(MockServerConfig::new()).await.unwrap();
    for (body, delay) in [("A", 40), ("B", 70), ("C", 20)] {
        server.enqueue(
            body,
            200,
            None::<[(&str, &str); 0]>,
            Some(Duration::from_millis(delay)),
        );
    }

    let client = reqwest::Client::new();
    let completed = Arc::new(Mutex::new(Vec::new()));
    let started_at = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let client = client.clone();
        let url = server.url("/slow").unwrap();
        let completed = Arc::clone(&completed);
        handles.push(tokio::spawn(async move {
            let body = client.get(url).send().await.unwrap().text().await.unwrap();
            completed.lock().unwrap().push(body);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*completed.lock().unwrap(), vec!["C", "A", "B"]);
    assert!(started_at.elapsed() >= Duration::from_millis(70));
    assert_eq!(server.request_count(), 3);

    server.shutdown().await.unwrap();
}

/// WHY: The queue is shared by every exchange; a response must never be served twice.
/// WHAT: 32 concurrent requests against 32 distinct responses each get a different one.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_consume_each_response_exactly_once() {
    init_test_tracing();

    let mut server = MockServer::started(MockServerConfig::new()).await.unwrap();
    for i in 0..32 {
        server.enqueue_response(ResponseSpec::ok(format!("response-{i}")));
    }

    let client = reqwest::Client::new();
    let mut handles = Vec::new();
    for _ in 0..32 {
        let client = client.clone();
        let url = server.url("/").unwrap();
        handles.push(tokio::spawn(async move {
            client.get(url).send().await.unwrap().text().await.unwrap()
        }));
    }

    let mut bodies = HashSet::new();
    for handle in handles {
        assert!(bodies.insert(handle.await.unwrap()));
    }

    assert_eq!(bodies.len(), 32);
    assert_eq!(server.pending_responses(), 0);
    assert_eq!(server.request_count(), 32);

    let mut sequences = HashSet::new();
    while let Ok(record) = server.take_request() {
        sequences.insert(record.sequence);
    }
    assert_eq!(sequences, (0..32).collect::<HashSet<usize>>());

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn independent_servers_do_not_share_state() {
    init_test_tracing();

    let mut first = MockServer::started(MockServerConfig::new()).await.unwrap();
    let mut second = MockServer::started(MockServerConfig::new()).await.unwrap();
    first.enqueue_response(ResponseSpec::ok("first"));
    second.enqueue_response(ResponseSpec::ok("second"));

    let from_second = reqwest::get(second.url("/").unwrap()).await.unwrap();
    assert_eq!(from_second.text().await.unwrap(), "second");

    assert_eq!(first.pending_responses(), 1);
    assert_eq!(first.request_count(), 0);
    assert_eq!(second.request_count(), 1);

    first.shutdown().await.unwrap();
    second.shutdown().await.unwrap();
}

/// WHY: A request is logged once its body is fully read, so a slow upload accepted first
/// can land in the log after a quick one accepted later.
/// WHAT: With A accepted first but its body finished last, `take_request` yields B then A.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn log_order_follows_body_completion_not_acceptance() {
    init_test_tracing();

    let mut server = MockServer::started(MockServerConfig::new()).await.unwrap();
    server.set_default_response(ResponseSpec::ok("done"));

    let mut slow = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
    slow.write_all(
        b"POST /slow HTTP/1.1\r\nHost: mock\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhe",
    )
    .await
    .unwrap();

    // Wait until the slow request has been accepted.
    for _ in 0..200 {
        if server.request_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(server.request_count(), 1);

    let quick = reqwest::Client::new()
        .post(server.url("/quick").unwrap())
        .body("b")
        .send()
        .await
        .unwrap();
    assert_eq!(quick.text().await.unwrap(), "done");

    slow.write_all(b"llo").await.unwrap();
    let mut raw = Vec::new();
    slow.read_to_end(&mut raw).await.unwrap();
    assert!(String::from_utf8(raw).unwrap().ends_with("done"));

    let first = server.take_request().unwrap();
    let second = server.take_request().unwrap();
    assert_eq!(first.path(), "/quick");
    assert_eq!(first.body, "b");
    assert_eq!(second.path(), "/slow");
    assert_eq!(second.body, "hello");
    assert!(second.sequence < first.sequence);

    server.shutdown().await.unwrap();
}
