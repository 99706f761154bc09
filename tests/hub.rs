use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use logvine::hub::Hub;

mod common;
use common::{spawn_server, wait_for};

/// A live SSE subscription that collects delivered payloads in the
/// background until disconnected.
struct SseTail {
    lines: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl SseTail {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    fn disconnect(&self) {
        self.task.abort();
    }
}

async fn tail_events(client: &Client, base: &str) -> SseTail {
    let response = client
        .get(format!("{base}/logs"))
        .send()
        .await
        .expect("subscribe");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let task = tokio::spawn(async move {
        let mut body = response.bytes_stream();
        let mut buf = String::new();
        while let Some(Ok(chunk)) = body.next().await {
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find('\n') {
                let frame: String = buf.drain(..=pos).collect();
                let frame = frame.trim_end();
                if let Some(data) = frame.strip_prefix("data:") {
                    sink.lock().unwrap().push(data.trim_start().to_owned());
                }
            }
        }
    });
    SseTail { lines, task }
}

#[tokio::test]
async fn fans_lines_out_to_every_subscriber() {
    let hub = Hub::new();
    let (base, server) = spawn_server(hub.router()).await;
    let client = Client::new();

    let first = tail_events(&client, &base).await;
    let second = tail_events(&client, &base).await;
    let third = tail_events(&client, &base).await;
    wait_for("all subscribers registered", || hub.registry().len() == 3).await;

    let response = client
        .post(format!("{base}/logs"))
        .body("alpha\nbeta\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    // a trailing unterminated line still counts
    let response = client
        .post(format!("{base}/logs"))
        .body("gamma")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    for tail in [&first, &second, &third] {
        wait_for("all lines delivered", || tail.lines().len() == 3).await;
        assert_eq!(tail.lines(), ["alpha", "beta", "gamma"]);
    }

    // one subscriber leaves; the others keep receiving and posts still work
    second.disconnect();
    wait_for("departed subscriber removed", || hub.registry().len() == 2).await;

    let response = client
        .post(format!("{base}/logs"))
        .body("delta\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    for tail in [&first, &third] {
        wait_for("line after departure delivered", || tail.lines().len() == 4).await;
        assert_eq!(tail.lines(), ["alpha", "beta", "gamma", "delta"]);
    }
    assert_eq!(second.lines(), ["alpha", "beta", "gamma"]);

    first.disconnect();
    third.disconnect();
    server.abort();
}

#[tokio::test]
async fn disconnected_subscriber_is_removed() {
    let hub = Hub::new();
    let (base, server) = spawn_server(hub.router()).await;
    let client = Client::new();

    let tail = tail_events(&client, &base).await;
    wait_for("subscriber registered", || hub.registry().len() == 1).await;

    tail.disconnect();
    wait_for("subscriber deregistered", || hub.registry().is_empty()).await;

    // posting to a hub with nobody listening is fine
    let response = client
        .post(format!("{base}/logs"))
        .body("nobody\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    server.abort();
}

#[tokio::test]
async fn dead_receiver_fails_the_post_but_others_still_receive() {
    let hub = Hub::new();
    let (base, server) = spawn_server(hub.router()).await;
    let client = Client::new();

    let healthy = tail_events(&client, &base).await;
    let (_dead_id, dead_rx) = hub.registry().subscribe();
    drop(dead_rx);
    assert_eq!(hub.registry().len(), 2);

    let response = client
        .post(format!("{base}/logs"))
        .body("poison\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.text().await.unwrap(), "failed to broadcast message");

    // the healthy subscriber still got the line, and the dead one is gone
    wait_for("healthy delivery", || healthy.lines() == ["poison"]).await;
    wait_for("dead subscriber pruned", || hub.registry().len() == 1).await;

    let response = client
        .post(format!("{base}/logs"))
        .body("after\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    wait_for("subsequent delivery", || {
        healthy.lines() == ["poison", "after"]
    })
    .await;

    healthy.disconnect();
    server.abort();
}

#[tokio::test]
async fn failed_broadcast_stops_the_rest_of_the_body() {
    let hub = Hub::new();
    let (base, server) = spawn_server(hub.router()).await;
    let client = Client::new();

    let healthy = tail_events(&client, &base).await;
    let (_dead_id, dead_rx) = hub.registry().subscribe();
    drop(dead_rx);
    assert_eq!(hub.registry().len(), 2);

    let response = client
        .post(format!("{base}/logs"))
        .body("a\nb\nc\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.text().await.unwrap(), "failed to broadcast message");

    // the failing line reached the healthy subscriber, but later lines
    // in the rejected body were never broadcast
    wait_for("first line delivered", || healthy.lines() == ["a"]).await;
    sleep(Duration::from_millis(200)).await;
    assert_eq!(healthy.lines(), ["a"]);
    wait_for("dead subscriber pruned", || hub.registry().len() == 1).await;

    healthy.disconnect();
    server.abort();
}

#[tokio::test]
async fn lines_survive_chunked_uploads() {
    let hub = Hub::new();
    let (base, server) = spawn_server(hub.router()).await;
    let client = Client::new();

    let tail = tail_events(&client, &base).await;
    wait_for("subscriber registered", || hub.registry().len() == 1).await;

    // chunks arrive as separate reads so reassembly is genuinely incremental
    let body = stream! {
        yield Ok::<_, std::io::Error>(Bytes::from("par"));
        sleep(Duration::from_millis(20)).await;
        yield Ok(Bytes::from("tial\nre"));
        sleep(Duration::from_millis(20)).await;
        yield Ok(Bytes::from("st\n"));
    };
    let response = client
        .post(format!("{base}/logs"))
        .body(reqwest::Body::wrap_stream(body))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    wait_for("reassembled lines", || tail.lines() == ["partial", "rest"]).await;

    tail.disconnect();
    server.abort();
}

#[tokio::test]
async fn serve_shuts_down_when_signalled() {
    let hub = Hub::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        hub.serve(listener, async {
            let _ = stop_rx.await;
        })
        .await
    });

    let client = Client::new();
    let response = client
        .post(format!("http://{addr}/logs"))
        .body("while running\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    stop_tx.send(()).unwrap();
    let result = timeout(Duration::from_secs(2), server)
        .await
        .expect("serve should exit after the shutdown future resolves")
        .unwrap();
    result.unwrap();
}
