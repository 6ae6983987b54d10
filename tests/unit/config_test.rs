//! Tests for configuration parsing and validation

use std::collections::HashMap;
use std::time::Duration;

use scheduled_publisher::config::{
    GraphApiConfig, PublisherConfig, SchedulerConfig, UploadConfig, DEFAULT_CHUNK_SIZE_BYTES,
};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn test_defaults_are_valid() {
    let cfg = PublisherConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.scheduler.sweep_interval_secs, 30);
    assert_eq!(cfg.scheduler.stuck_threshold_secs, 2400);
    assert!(cfg.scheduler.stuck_threshold_secs > cfg.scheduler.attempt_timeout_secs);
    assert!(cfg.scheduler.attempt_timeout_secs >= cfg.upload.session_timeout_secs);
    assert_eq!(cfg.upload.chunk_size_bytes, DEFAULT_CHUNK_SIZE_BYTES);
    assert!(cfg.graph.is_none());
    assert!(!cfg.scheduler.interval_is_unusual());
}

#[test]
fn test_scheduler_validation() {
    let base = SchedulerConfig::default();

    let zero_interval = SchedulerConfig {
        sweep_interval_secs: 0,
        ..base.clone()
    };
    assert!(zero_interval.validate().is_err());

    let threshold_too_small = SchedulerConfig {
        sweep_interval_secs: 60,
        stuck_threshold_secs: 60,
        ..base.clone()
    };
    assert!(threshold_too_small.validate().is_err());

    let no_workers = SchedulerConfig {
        sweep_concurrency: 0,
        ..base.clone()
    };
    assert!(no_workers.validate().is_err());

    let zero_timeout = SchedulerConfig {
        attempt_timeout_secs: 0,
        ..base.clone()
    };
    assert!(zero_timeout.validate().is_err());
}

#[test]
fn test_stuck_threshold_must_outlast_attempts() {
    // an attempt may still be running when its claim reaches this age
    let reclaims_live_attempts = SchedulerConfig {
        stuck_threshold_secs: 600,
        attempt_timeout_secs: 3600,
        ..SchedulerConfig::default()
    };
    let err = reclaims_live_attempts.validate().unwrap_err();
    assert!(err.contains("stuck_threshold_secs must exceed attempt_timeout_secs"));

    let equal = SchedulerConfig {
        stuck_threshold_secs: 600,
        attempt_timeout_secs: 600,
        ..SchedulerConfig::default()
    };
    assert!(equal.validate().is_err());

    let ok = SchedulerConfig {
        stuck_threshold_secs: 601,
        attempt_timeout_secs: 600,
        ..SchedulerConfig::default()
    };
    assert!(ok.validate().is_ok());
}

#[test]
fn test_attempt_timeout_must_cover_upload_session() {
    let cfg = PublisherConfig {
        scheduler: SchedulerConfig {
            stuck_threshold_secs: 900,
            attempt_timeout_secs: 600,
            ..SchedulerConfig::default()
        },
        upload: UploadConfig {
            session_timeout_secs: 1200,
            ..UploadConfig::default()
        },
        graph: None,
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.starts_with("scheduler invalid"));
    assert!(err.contains("upload.session_timeout_secs"));
}

#[test]
fn test_unusual_interval_is_still_valid() {
    let cfg = SchedulerConfig {
        sweep_interval_secs: 5,
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_ok());
    assert!(cfg.interval_is_unusual());
    assert_eq!(cfg.sweep_interval(), Duration::from_secs(5));
}

#[test]
fn test_upload_validation() {
    let zero_chunk = UploadConfig {
        chunk_size_bytes: 0,
        ..UploadConfig::default()
    };
    assert!(zero_chunk.validate().is_err());

    let session_shorter_than_chunk = UploadConfig {
        chunk_timeout_secs: 120,
        session_timeout_secs: 60,
        ..UploadConfig::default()
    };
    assert!(session_shorter_than_chunk.validate().is_err());
}

#[test]
fn test_graph_validation() {
    assert!(GraphApiConfig::new("123", "token").validate().is_ok());
    assert!(GraphApiConfig::new("", "token").validate().is_err());
    assert!(GraphApiConfig::new("123", " ").validate().is_err());

    let mut bad_url = GraphApiConfig::new("123", "token");
    bad_url.video_base_url = "graph-video.facebook.com".into();
    assert!(bad_url.validate().is_err());
}

#[test]
fn test_from_json_str_fills_defaults() {
    let cfg = PublisherConfig::from_json_str(
        r#"{
            "scheduler": { "sweep_interval_secs": 20 },
            "graph": { "page_id": "42", "access_token": "t0k" }
        }"#,
    )
    .unwrap();

    assert_eq!(cfg.scheduler.sweep_interval_secs, 20);
    assert_eq!(cfg.scheduler.stuck_threshold_secs, 2400);
    assert_eq!(cfg.upload, UploadConfig::default());
    let graph = cfg.graph.unwrap();
    assert_eq!(graph.page_id, "42");
    assert_eq!(graph.video_base_url, "https://graph-video.facebook.com");
}

#[test]
fn test_from_json_str_rejects_invalid() {
    let err = PublisherConfig::from_json_str(r#"{ "scheduler": { "sweep_concurrency": 0 } }"#)
        .unwrap_err();
    assert!(err.starts_with("scheduler invalid"));

    let err = PublisherConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_from_lookup_overrides() {
    let cfg = PublisherConfig::from_lookup(lookup(&[
        ("PUBLISHER_SWEEP_INTERVAL_SECS", "45"),
        ("PUBLISHER_SWEEP_CONCURRENCY", " 3 "),
        ("PUBLISHER_ATTEMPT_TIMEOUT_SECS", "1900"),
        ("PUBLISHER_CHUNK_SIZE_BYTES", "4194304"),
        ("PUBLISHER_MAX_TRANSFER_CALLS", "50"),
    ]))
    .unwrap();

    assert_eq!(cfg.scheduler.sweep_interval_secs, 45);
    assert_eq!(cfg.scheduler.sweep_concurrency, 3);
    assert_eq!(cfg.scheduler.attempt_timeout(), Duration::from_secs(1900));
    assert_eq!(cfg.upload.chunk_size_bytes, 4 * 1024 * 1024);
    assert_eq!(cfg.upload.max_transfer_calls, Some(50));
    assert!(cfg.graph.is_none());
}

#[test]
fn test_from_lookup_graph_needs_page_and_token() {
    let partial = PublisherConfig::from_lookup(lookup(&[("GRAPH_PAGE_ID", "42")])).unwrap();
    assert!(partial.graph.is_none());

    let full = PublisherConfig::from_lookup(lookup(&[
        ("GRAPH_PAGE_ID", "42"),
        ("GRAPH_ACCESS_TOKEN", "secret"),
        ("GRAPH_API_VERSION", "v20.0"),
    ]))
    .unwrap();
    let graph = full.graph.unwrap();
    assert_eq!(graph.api_version, "v20.0");
    assert_eq!(graph.access_token, "secret");
}

#[test]
fn test_from_lookup_reports_bad_values() {
    let err = PublisherConfig::from_lookup(lookup(&[("PUBLISHER_SWEEP_INTERVAL_SECS", "soon")]))
        .unwrap_err();
    assert!(err.to_string().contains("PUBLISHER_SWEEP_INTERVAL_SECS"));

    let err = PublisherConfig::from_lookup(lookup(&[("PUBLISHER_SWEEP_BATCH_LIMIT", "0")]))
        .unwrap_err();
    assert!(err.to_string().contains("sweep_batch_limit"));

    let err = PublisherConfig::from_lookup(lookup(&[("PUBLISHER_ATTEMPT_TIMEOUT_SECS", "0")]))
        .unwrap_err();
    assert!(err.to_string().contains("attempt_timeout_secs"));
}

#[test]
fn test_stuck_threshold_is_clamped() {
    let cfg = SchedulerConfig {
        stuck_threshold_secs: u64::MAX,
        ..SchedulerConfig::default()
    };
    assert_eq!(
        cfg.stuck_threshold(),
        chrono::Duration::seconds(i64::from(u32::MAX))
    );
}
