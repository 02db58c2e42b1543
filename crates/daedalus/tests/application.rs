//! Application-level scenarios: several servers under one lifecycle, and
//! live config reload through the facade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use daedalus::prelude::*;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Serialize, Deserialize)]
struct Order {
    id: u64,
}

const CONFIG: &str = r#"
[http]
addr = "127.0.0.1:0"

[http.middlewares]
timeoutSeconds = 5

[queue]
queueName = "orders"
poolSize = 4
emptySleepInterval = "5ms"
"#;

async fn raw_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_http_and_queue_run_until_stopped() {
    let app = Application::new(Config::from_toml(CONFIG).unwrap());

    let mut router = app.http_router().unwrap();
    router.get(
        "/ping",
        handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "pong") })),
    );
    let http = Arc::new(app.http_server(router).unwrap());

    let queue = Arc::new(MemoryQueue::new());
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&handled);
    let consumer = app
        .queue_server(Arc::clone(&queue), JsonCodec::<Order>::new(), move |_ctx: RequestContext, order: Order| {
            let counter = Arc::clone(&counter);
            async move {
                assert_eq!(order.id, 7);
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        })
        .unwrap();

    app.add_server(http.clone()).unwrap();
    app.add_server(Arc::new(consumer)).unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(app.run_until(async move {
        let _ = stop_rx.await;
    }));

    let addr = tokio::time::timeout(Duration::from_secs(5), http.ready())
        .await
        .unwrap()
        .unwrap();
    let response = raw_get(addr, "/ping").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("pong"), "{response}");

    queue
        .push(&RequestContext::new(), serde_json::to_vec(&Order { id: 7 }).unwrap())
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while handled.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(handled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_registry_stops_running_application() {
    let app = Application::new(Config::from_toml(CONFIG).unwrap());
    let registry = app.stop_registry().clone();

    let router = app.http_router().unwrap();
    let http = Arc::new(app.http_server(router).unwrap());
    app.add_server(http.clone()).unwrap();

    let running = tokio::spawn(app.run_until(std::future::pending()));
    tokio::time::timeout(Duration::from_secs(5), http.ready())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(registry.stop_all().await, 1);
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_missing_sections_are_reported() {
    let app = Application::new(Config::default());

    let err = app.http_router().unwrap_err();
    assert!(err.to_string().contains("http"), "{err}");
    assert!(app.grpc_layer().is_err());
    assert!(app
        .queue_server(MemoryQueue::new(), JsonCodec::<Order>::new(), |_ctx: RequestContext, _order: Order| async {
            anyhow::Ok(())
        })
        .is_err());
}

#[tokio::test]
async fn test_grpc_layer_from_config() {
    let config = Config::from_toml("[grpc]\naddr = \":50051\"\ntimeout = 2\n").unwrap();
    let app = Application::new(config);
    assert!(app.grpc_layer().is_ok());
}

#[tokio::test]
async fn test_config_reload_reaches_application() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[http]\naddr = \":8080\"\n").unwrap();

    let mut app = Application::load(&path).unwrap();
    assert_eq!(app.config().http.as_ref().unwrap().server.addr, ":8080");

    let (tx, mut rx) = mpsc::unbounded_channel();
    app.on_config_change(move |result| {
        if let Ok(config) = result {
            let _ = tx.send(config.http.as_ref().map(|h| h.server.addr.clone()));
        }
    });
    app.watch_config(WatchOptions {
        debounce: Duration::from_millis(20),
        poll_interval: Some(Duration::from_millis(25)),
    })
    .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(&path, "[http]\naddr = \":9090\"\n").unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(addr) = rx.recv().await {
            if addr.as_deref() == Some(":9090") {
                return;
            }
        }
        panic!("callback channel closed");
    })
    .await
    .unwrap();

    assert_eq!(app.config().http.as_ref().unwrap().server.addr, ":9090");
}
