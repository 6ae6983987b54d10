//! Tests for API-facing models

use chrono::{TimeZone, Utc};

use scheduled_publisher::core::{Post, PostStatus, SweepReport};
use scheduled_publisher::runtime::{PostStatusResponse, ScheduleRequest, SchedulerStatus};

#[test]
fn test_schedule_request_optional_fields() {
    let req: ScheduleRequest = serde_json::from_str(
        r#"{ "post_id": 7, "content": "hi", "scheduled_for": "2024-06-01T10:00:00Z" }"#,
    )
    .unwrap();
    assert_eq!(req.post_id, 7);
    assert!(req.title.is_none());
    assert!(req.media_ref.is_none());
    assert_eq!(
        req.scheduled_for,
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    );
}

#[test]
fn test_status_response_mirrors_post() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    let mut post = Post::new(3, "body", now);
    post.status = PostStatus::Failed;
    post.error_message = Some("authentication failed: token expired".into());

    let response = PostStatusResponse::from(&post);
    assert_eq!(response.post_id, 3);
    assert_eq!(response.status, PostStatus::Failed);
    assert_eq!(
        response.error_message.as_deref(),
        Some("authentication failed: token expired")
    );

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "failed");
    assert!(json["external_post_id"].is_null());
}

#[test]
fn test_scheduler_status_serializes() {
    let status = SchedulerStatus {
        running: true,
        armed_timers: 2,
        next_timer_due: None,
        sweep_interval_secs: 30,
        sweeps_completed: 4,
        last_sweep_at: None,
        last_sweep: Some(SweepReport {
            due_found: 1,
            published: 1,
            ..SweepReport::default()
        }),
        posts_in_flight: 0,
    };
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["armed_timers"], 2);
    assert_eq!(json["last_sweep"]["published"], 1);

    let back: SchedulerStatus = serde_json::from_value(json).unwrap();
    assert_eq!(back, status);
}
