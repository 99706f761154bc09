#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Serve `app` on an ephemeral port and return its base URL plus the
/// server task, which the caller aborts when done.
pub async fn spawn_server(app: Router) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app.into_make_service()).await {
            tracing::error!("test server error: {err:?}");
        }
    });
    (format!("http://{addr}"), handle)
}

/// Poll `cond` until it holds, panicking after a couple of seconds.
pub async fn wait_for(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}
