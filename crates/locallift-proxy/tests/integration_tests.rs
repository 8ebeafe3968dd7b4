//! Integration tests for the locallift-proxy binary.
//!
//! These tests start the real binary in front of a local origin and talk to
//! it over HTTP.

use axum::{routing::get, Router};
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Start a small origin server and return its base URL.
async fn start_origin() -> String {
    let app = Router::new()
        .route("/", get(|| async { "home" }))
        .route("/offline.html", get(|| async { "<h1>offline</h1>" }))
        .route("/style.css", get(|| async { "body{}" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

struct ProxyHandle {
    child: tokio::process::Child,
    port: u16,
    stdout_drain: Option<tokio::task::JoinHandle<()>>,
}

impl ProxyHandle {
    async fn stop(mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        let _ = self.child.start_kill();
    }
}

/// Start the proxy binary and read the port it prints.
async fn start_proxy(upstream: &str, extra: &[&str]) -> Result<ProxyHandle, String> {
    let binary = std::env::var("CARGO_BIN_EXE_locallift-proxy")
        .map(PathBuf::from)
        .map_err(|_| "CARGO_BIN_EXE_locallift-proxy not set".to_string())?;

    let mut child = tokio::process::Command::new(&binary)
        .arg("--upstream")
        .arg(upstream)
        .arg("--port")
        .arg("0")
        .args(extra)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to spawn {}: {}", binary.display(), e))?;

    let stdout = child.stdout.take().ok_or("no stdout")?;
    let mut lines = BufReader::new(stdout).lines();

    let port = tokio::time::timeout(Duration::from_secs(30), async {
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(port) = line.strip_prefix("PROXY_PORT=") {
                return port.trim().parse::<u16>().ok();
            }
        }
        None
    })
    .await
    .map_err(|_| "timed out waiting for PROXY_PORT".to_string())?
    .ok_or("proxy exited without printing PROXY_PORT")?;

    // Keep reading so log output never blocks on a full pipe
    let stdout_drain = tokio::spawn(async move {
        while let Ok(Some(_)) = lines.next_line().await {}
    });

    Ok(ProxyHandle {
        child,
        port,
        stdout_drain: Some(stdout_drain),
    })
}

#[tokio::test]
async fn test_health_reports_active_worker() {
    let upstream = start_origin().await;
    let proxy = start_proxy(&upstream, &["--memory"]).await.unwrap();

    let json: Value = reqwest::get(format!("http://127.0.0.1:{}/__locallift/health", proxy.port))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["worker"]["state"], "active");

    proxy.stop().await;
}

#[tokio::test]
async fn test_requests_proxied_to_origin() {
    let upstream = start_origin().await;
    let proxy = start_proxy(&upstream, &["--memory"]).await.unwrap();

    let response = reqwest::get(format!("http://127.0.0.1:{}/style.css", proxy.port))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "body{}");

    proxy.stop().await;
}

#[tokio::test]
async fn test_sqlite_cache_file_created() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("cache").join("offline-cache.sqlite");
    let upstream = start_origin().await;

    let proxy = start_proxy(&upstream, &["--cache-db", db_path.to_str().unwrap()])
        .await
        .unwrap();
    assert!(db_path.exists());

    proxy.stop().await;
}
