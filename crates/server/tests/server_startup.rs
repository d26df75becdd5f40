//! Starts the real `listgrab` binary against a config file.

use std::io::Write;
use std::net::TcpListener;
use std::process::ExitStatus;
use std::time::Duration;

use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};

struct RunningServer {
    child: Child,
    base_url: String,
    // Deleted when the server is dropped
    _config: NamedTempFile,
}

impl RunningServer {
    async fn start(extra_toml: &str) -> Self {
        let port = TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .map(|addr| addr.port())
            .unwrap();
        let config = config_file(&format!(
            "[server]\nhost = \"127.0.0.1\"\nport = {}\n\n{}",
            port, extra_toml
        ));

        let child = listgrab(&config).kill_on_drop(true).spawn().unwrap();
        let server = Self {
            child,
            base_url: format!("http://127.0.0.1:{}/api/v1", port),
            _config: config,
        };
        server.wait_until_listening().await;
        server
    }

    async fn wait_until_listening(&self) {
        let client = reqwest::Client::new();
        for _ in 0..100 {
            if client.get(self.url("/health")).send().await.is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("server never answered on {}", self.base_url);
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str) -> Value {
        let response = reqwest::get(self.url(path)).await.unwrap();
        assert!(response.status().is_success(), "GET {} failed", path);
        response.json().await.unwrap()
    }

    async fn stop(mut self) {
        let _ = self.child.kill().await;
    }
}

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn listgrab(config: &NamedTempFile) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_listgrab"));
    command
        .env("LISTGRAB_CONFIG", config.path())
        .env("RUST_LOG", "error");
    command
}

async fn exit_status_for(contents: &str) -> ExitStatus {
    let config = config_file(contents);
    tokio::time::timeout(Duration::from_secs(5), listgrab(&config).status())
        .await
        .expect("listgrab kept running with a bad config")
        .unwrap()
}

#[tokio::test]
async fn test_binary_serves_health() {
    let server = RunningServer::start("").await;
    assert_eq!(server.get_json("/health").await["status"], "ok");
    server.stop().await;
}

#[tokio::test]
async fn test_config_endpoint_reflects_file() {
    let server = RunningServer::start("[jobs]\nterminate_grace_ms = 500\n").await;

    let config = server.get_json("/config").await;
    assert_eq!(config["jobs"]["terminate_grace_ms"], 500);
    assert_eq!(config["server"]["host"], "127.0.0.1");

    server.stop().await;
}

#[tokio::test]
async fn test_port_zero_is_rejected() {
    let status = exit_status_for("[server]\nport = 0\n").await;
    assert!(!status.success());
}

#[tokio::test]
async fn test_unparsable_config_is_rejected() {
    let status = exit_status_for("[server\nport = ").await;
    assert!(!status.success());
}
