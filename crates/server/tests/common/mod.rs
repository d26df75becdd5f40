//! In-process server wired to scripted extractor and converter doubles.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use listgrab_core::testing::{MockConverter, MockExtractor};
use listgrab_core::{Config, JobController};
use listgrab_server::api::{create_router, WsBroadcaster};
use listgrab_server::state::AppState;

pub use listgrab_core::testing::fixtures;

/// Router plus handles on everything behind it.
pub struct TestFixture {
    pub router: Router,
    pub controller: Arc<JobController>,
    pub extractor: Arc<MockExtractor>,
    pub converter: Arc<MockConverter>,
    pub ws_broadcaster: WsBroadcaster,
    /// Jobs write here
    pub temp_dir: TempDir,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(fixtures::test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().unwrap();

        let extractor = Arc::new(MockExtractor::new());
        let converter = Arc::new(MockConverter::new());
        let controller = Arc::new(JobController::new(
            &config,
            extractor.clone(),
            converter.clone(),
        ));

        let ws_broadcaster = WsBroadcaster::new(config.jobs.event_buffer);
        ws_broadcaster.forward(controller.events());

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&controller),
            ws_broadcaster.clone(),
        ));
        let router = create_router(state);

        Self {
            router,
            controller,
            extractor,
            converter,
            ws_broadcaster,
            temp_dir,
        }
    }

    pub fn output_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.post_raw(path, &body.to_string()).await
    }

    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.send(Request::post(path).body(Body::empty()).unwrap())
            .await
    }

    /// POST with a JSON content type and an arbitrary, possibly broken, body.
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::post(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap();
        self.send(request).await
    }

    /// Poll the job until it reaches a terminal status.
    pub async fn wait_for_end(&self, job_id: &str) -> Value {
        let poll = async {
            loop {
                let response = self.get(&format!("/api/v1/jobs/{}", job_id)).await;
                let status = response.body["status"].as_str().unwrap_or_default();
                if matches!(status, "completed" | "failed" | "cancelled") {
                    return response.body;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), poll)
            .await
            .expect("job did not end in time")
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();

        // Non-JSON bodies (metrics, axum rejections) come back as a string
        let body = match serde_json::from_slice(&bytes) {
            Ok(json) => json,
            Err(_) if bytes.is_empty() => Value::Null,
            Err(_) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        };

        TestResponse { status, body }
    }
}

/// Compares the status and prints the body when it differs.
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!($response.status, $status, "body: {}", $response.body)
    };
}
