//! Tests for error types

use std::time::Duration;

use scheduled_publisher::core::{
    PostStatus, PublishError, RepositoryError, ServiceError, ORPHANED_CLAIM_MESSAGE,
};

#[test]
fn test_publish_error_messages() {
    assert_eq!(
        PublishError::Rejected("bad codec".into()).to_string(),
        "platform rejected the request: bad codec"
    );
    assert_eq!(
        PublishError::TransferStalled { calls: 12 }.to_string(),
        "upload did not complete after 12 transfer calls"
    );
    assert_eq!(
        PublishError::AttemptTimeout(Duration::from_secs(5)).to_string(),
        "publish attempt timed out after 5s"
    );
}

#[test]
fn test_only_network_errors_are_retryable() {
    assert!(PublishError::Network("reset".into()).is_retryable());
    assert!(!PublishError::Auth("expired".into()).is_retryable());
    assert!(!PublishError::Rejected("no".into()).is_retryable());
    assert!(!PublishError::TransferTimeout("chunk".into()).is_retryable());
}

#[test]
fn test_transfer_timeouts_are_distinguishable() {
    assert!(PublishError::TransferTimeout("chunk".into()).is_transfer_timeout());
    assert!(PublishError::TransferStalled { calls: 3 }.is_transfer_timeout());
    assert!(!PublishError::Rejected("policy".into()).is_transfer_timeout());
    assert!(!PublishError::Network("reset".into()).is_transfer_timeout());
}

#[test]
fn test_repository_error_messages() {
    let err = RepositoryError::InvalidTransition {
        id: 3,
        from: PostStatus::Published,
        to: PostStatus::Scheduled,
    };
    assert_eq!(err.to_string(), "post 3: cannot move from published to scheduled");
    assert_eq!(RepositoryError::Duplicate(4).to_string(), "post 4 already exists");
}

#[test]
fn test_service_error_is_transparent_over_repository() {
    let err: ServiceError = RepositoryError::NotFound(9).into();
    assert_eq!(err.to_string(), "post 9 not found");
    assert_eq!(
        ServiceError::MissingScheduleTime(2).to_string(),
        "post 2 has no scheduled_for time"
    );
}

#[test]
fn test_orphan_message() {
    assert_eq!(ORPHANED_CLAIM_MESSAGE, "orphaned publishing claim");
}
