//! API integration tests.
//!
//! Drives the HTTP API of a [`TestHarness`] server on a random port, with
//! the worker stepped by hand between requests.

mod common;

use common::TestHarness;
use reqwest::multipart::{Form, Part};
use sf_av::testing::{CallKind, RenderFault, ScriptedRunner};

async fn upload(client: &reqwest::Client, base: &str) -> String {
    let part = Part::bytes(b"\x89PNG fake image".to_vec())
        .file_name("cat.png")
        .mime_str("image/png")
        .unwrap();
    let resp = client
        .post(format!("{base}/api/uploads"))
        .multipart(Form::new().part("file", part))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let json: serde_json::Value = resp.json().await.unwrap();
    json["job_id"].as_str().unwrap().to_string()
}

async fn create_job(client: &reqwest::Client, base: &str, upload_id: &str, secs: u32) -> String {
    let resp = client
        .post(format!("{base}/api/jobs"))
        .json(&serde_json::json!({
            "upload_job_id": upload_id,
            "duration_seconds": secs,
            "style": "cinematic",
            "seed": 42,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "queued");
    json["job_id"].as_str().unwrap().to_string()
}

async fn status(client: &reqwest::Client, base: &str, job_id: &str) -> serde_json::Value {
    let resp = client
        .get(format!("{base}/api/jobs/{job_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_200() {
    let (_harness, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
}

// ---------------------------------------------------------------------------
// Job lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_render_and_download() {
    let (harness, addr) = TestHarness::with_server().await;
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    let upload_id = upload(&client, &base).await;
    let upload_status = status(&client, &base, &upload_id).await;
    assert_eq!(upload_status["status"], "uploaded");
    assert_eq!(upload_status["progress"], 100);

    let job_id = create_job(&client, &base, &upload_id, 130).await;
    let resp = client
        .get(format!("{base}/api/jobs/{job_id}/result"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    assert!(harness.work_once().await);

    let done = status(&client, &base, &job_id).await;
    assert_eq!(done["status"], "succeeded");
    assert_eq!(done["progress"], 100);
    assert!(done.get("error_code").is_none());
    assert_eq!(harness.runner.rendered_durations(), ["44", "43", "43"]);
    assert_eq!(harness.runner.count(CallKind::Concat), 1);

    let result: serde_json::Value = client
        .get(format!("{base}/api/jobs/{job_id}/result"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result["result_object"], format!("results/{job_id}.mp4"));
    assert_eq!(
        result["result_url"],
        format!("http://localhost:9000/videos/results/{job_id}.mp4")
    );

    let resp = client
        .get(format!("{base}/api/jobs/{job_id}/download"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "video/mp4");
    assert!(!resp.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn segment_timeout_fails_retryable_then_recovers() {
    let harness =
        TestHarness::with_runner(ScriptedRunner::new().fault_render(0, RenderFault::Timeout), |_| {});
    let (harness, addr) = harness.serve().await;
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    let upload_id = upload(&client, &base).await;
    let job_id = create_job(&client, &base, &upload_id, 10).await;

    assert!(harness.work_once().await);
    let failed = status(&client, &base, &job_id).await;
    assert_eq!(failed["status"], "failed");
    assert_eq!(failed["error_code"], "SEGMENT_TIMEOUT");
    assert_eq!(failed["retryable"], true);
    assert_eq!(failed["progress"], 100);

    assert!(harness.work_once().await);
    let recovered = status(&client, &base, &job_id).await;
    assert_eq!(recovered["status"], "succeeded");
}

#[tokio::test]
async fn codec_failure_is_terminal() {
    let runner = ScriptedRunner::new().fault_render(0, RenderFault::Exit("Invalid data found".into()));
    let (harness, addr) = TestHarness::with_runner(runner, |_| {}).serve().await;
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    let upload_id = upload(&client, &base).await;
    let job_id = create_job(&client, &base, &upload_id, 10).await;

    assert!(harness.work_once().await);
    let failed = status(&client, &base, &job_id).await;
    assert_eq!(failed["error_code"], "VIDEO_GENERATION_FAILED");
    assert_eq!(failed["retryable"], false);

    assert!(!harness.work_once().await);
}

// ---------------------------------------------------------------------------
// Error responses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn job_for_missing_upload_is_404_with_request_id() {
    let (_harness, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/jobs"))
        .header("x-request-id", "it-works")
        .json(&serde_json::json!({
            "upload_job_id": "00000000-0000-4000-8000-000000000000",
            "duration_seconds": 10,
            "style": "cinematic",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.headers()["x-request-id"], "it-works");

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["code"], "not_found");
    assert_eq!(json["request_id"], "it-works");
}

#[tokio::test]
async fn admin_tools_lists_ffmpeg_and_ffprobe() {
    let (_harness, addr) = TestHarness::with_server().await;
    let json: serde_json::Value = reqwest::get(format!("http://{addr}/api/admin/tools"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"ffmpeg"));
    assert!(names.contains(&"ffprobe"));
}
