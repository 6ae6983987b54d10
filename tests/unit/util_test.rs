//! Tests for utility functions

use chrono::{Duration, TimeZone, Utc};

use scheduled_publisher::util::{init_tracing, to_std_duration, Clock, ManualClock, PostId};

#[test]
fn test_manual_clock() {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);

    clock.advance(Duration::seconds(90));
    assert_eq!(clock.now(), start + Duration::seconds(90));

    clock.set(start - Duration::hours(1));
    assert_eq!(clock.now(), start - Duration::hours(1));
}

#[test]
fn test_negative_durations_clamp_to_zero() {
    assert_eq!(to_std_duration(Duration::seconds(-5)), std::time::Duration::ZERO);
    assert_eq!(
        to_std_duration(Duration::milliseconds(1500)),
        std::time::Duration::from_millis(1500)
    );
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}

#[test]
fn test_post_id() {
    let id: PostId = 12345;
    assert_eq!(id, 12345);
}
