//! Tests for activity log sinks

use chrono::{Duration, TimeZone, Utc};

use scheduled_publisher::core::{
    ActivityAction, ActivityEvent, ActivityLog, InMemoryActivityLog, TracingActivityLog, Trigger,
};

fn at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

#[test]
fn test_in_memory_activity_log() {
    let log = InMemoryActivityLog::new(10);
    let event = ActivityEvent::new(1, ActivityAction::Claimed, at()).with_trigger(Trigger::Sweep);

    log.record(event.clone()).unwrap();
    let events = log.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0], event);
    assert_eq!(log.count(1, ActivityAction::Claimed), 1);
    assert_eq!(log.count(1, ActivityAction::Published), 0);
}

#[test]
fn test_activity_log_overflow() {
    let log = InMemoryActivityLog::new(2);
    for id in 1..=3 {
        log.record(ActivityEvent::new(id, ActivityAction::Scheduled, at()))
            .unwrap();
    }

    let events = log.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].post_id, 2); // oldest dropped
    assert_eq!(events[1].post_id, 3);
}

#[test]
fn test_event_builders() {
    let due = at();
    let event = ActivityEvent::new(5, ActivityAction::Failed, due - Duration::seconds(4))
        .with_trigger(Trigger::PreciseTimer)
        .with_delay_from(Some(due))
        .with_detail("network error: reset");

    assert_eq!(event.trigger, Some(Trigger::PreciseTimer));
    assert_eq!(event.delay_secs, Some(-4));
    assert_eq!(event.detail.as_deref(), Some("network error: reset"));

    let undated = ActivityEvent::new(5, ActivityAction::Cancelled, due).with_delay_from(None);
    assert!(undated.delay_secs.is_none());
}

#[test]
fn test_action_and_trigger_names() {
    assert_eq!(ActivityAction::RacePrevented.as_str(), "race_prevented");
    assert_eq!(ActivityAction::OrphanReclaimed.to_string(), "orphan_reclaimed");
    assert_eq!(Trigger::PreciseTimer.to_string(), "precise_timer");

    let json = serde_json::to_value(
        ActivityEvent::new(1, ActivityAction::RacePrevented, at()).with_trigger(Trigger::Manual),
    )
    .unwrap();
    assert_eq!(json["action"], "race_prevented");
    assert_eq!(json["trigger"], "manual");
}

#[test]
fn test_tracing_log_never_fails() {
    let log = TracingActivityLog;
    assert!(log
        .record(ActivityEvent::new(1, ActivityAction::Published, at()))
        .is_ok());
}
