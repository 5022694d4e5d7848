//! Render lifecycle through the API: admission, background execution,
//! settlement, and publication of the final video.

mod common;

use axum::http::StatusCode;
use common::{scene, TestHarness};
use serde_json::json;
use sr_core::events::EventPayload;

async fn submit(h: &TestHarness, story: &sr_core::Story) -> String {
    let (status, body) = h
        .post_json(&format!("/api/stories/{}/render", story.id), json!({}))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED, "unexpected body: {body}");
    assert_eq!(body["status"], "processing");
    body["job_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn render_completes_charges_and_publishes() {
    let h = TestHarness::new();
    let story = h.seed_narrated_story(25);
    let mut rx = h.ctx.event_bus.subscribe();

    let job_id = submit(&h, &story).await;
    h.drain().await;

    let (status, job) = h.get(&format!("/api/jobs/{job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "completed");
    assert_eq!(job["progress"], 100.0);
    assert_eq!(job["duration"], 15.0);
    assert_eq!(job["credits_charged"], 10);
    assert!(job["completed_at"].is_string());
    assert!(job["video_url"].as_str().unwrap().starts_with("memory://"));

    let (status, video) = h.get(&format!("/api/stories/{}/video", story.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(video["job_id"], job_id.as_str());
    assert_eq!(video["duration"], 15.0);
    assert_eq!(video["is_valid"], true);

    assert_eq!(h.balance(&story), 15);
    assert_eq!(h.artifacts.keys().len(), 1);
    assert_eq!(h.engine.count("clip"), 3);

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(match event.payload {
            EventPayload::JobAdmitted { .. } => "admitted",
            EventPayload::JobProgress { .. } => "progress",
            EventPayload::JobCompleted { .. } => "completed",
            EventPayload::JobFailed { .. } => "failed",
            EventPayload::JobReclaimed { .. } => "reclaimed",
        });
    }
    assert_eq!(kinds.first(), Some(&"admitted"));
    assert_eq!(kinds.last(), Some(&"completed"));
    assert!(kinds.contains(&"progress"));
}

#[tokio::test]
async fn failed_render_is_reported_and_not_charged() {
    let h = TestHarness::new();
    let story = h.seed_narrated_story(25);
    h.engine.fail_on("compose");

    let job_id = submit(&h, &story).await;
    h.drain().await;

    let (_, job) = h.get(&format!("/api/jobs/{job_id}")).await;
    assert_eq!(job["status"], "failed");
    assert!(job["error"].as_str().unwrap().contains("compose"));
    assert_eq!(job["credits_charged"], 0);
    assert_eq!(h.balance(&story), 25);

    let (status, _) = h.get(&format!("/api/stories/{}/video", story.id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rerender_supersedes_previous_video() {
    let h = TestHarness::new();
    let story = h.seed_narrated_story(50);

    let first = submit(&h, &story).await;
    h.drain().await;
    let second = submit(&h, &story).await;
    h.drain().await;
    assert_ne!(first, second);

    let (_, video) = h.get(&format!("/api/stories/{}/video", story.id)).await;
    assert_eq!(video["job_id"], second.as_str());
    assert_eq!(h.artifacts.keys().len(), 1);
    assert_eq!(h.artifacts.deleted().len(), 1);
    assert_eq!(h.balance(&story), 30);

    let (status, jobs) = h.get(&format!("/api/stories/{}/jobs", story.id)).await;
    assert_eq!(status, StatusCode::OK);
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["id"], second.as_str());

    let (_, jobs) = h
        .get(&format!("/api/stories/{}/jobs?limit=1", story.id))
        .await;
    assert_eq!(jobs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn free_rendering_skips_the_ledger() {
    let h = TestHarness::with_config(|c| c.credits.enabled = false);
    let story = h.seed_story(vec![scene(0, "no narration here")], 0);

    let job_id = submit(&h, &story).await;
    h.drain().await;

    let (_, job) = h.get(&format!("/api/jobs/{job_id}")).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["credits_charged"], 0);
    assert_eq!(h.balance(&story), 0);
}

#[tokio::test]
async fn capacity_limit_surfaces_as_429() {
    let h = TestHarness::with_config(|c| c.render.max_concurrent_jobs = 0);
    let story = h.seed_narrated_story(25);

    let (status, body) = h
        .post_json(&format!("/api/stories/{}/render", story.id), json!({}))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "busy");
}
