//! Tests for builder modules

use std::sync::Arc;

use async_trait::async_trait;

use scheduled_publisher::builders::PublisherBuilder;
use scheduled_publisher::config::{GraphApiConfig, PublisherConfig};
use scheduled_publisher::core::{
    OffsetRange, PublishEndpoint, PublishError, PublishMetadata, SessionHandle, StartRequest,
    StartResponse,
};

struct NullEndpoint;

#[async_trait]
impl PublishEndpoint for NullEndpoint {
    fn platform(&self) -> &str {
        "null"
    }

    async fn start_session(&self, _request: StartRequest) -> Result<StartResponse, PublishError> {
        Err(PublishError::Unsupported("null endpoint".into()))
    }

    async fn transfer_chunk(
        &self,
        _session: &SessionHandle,
        range: OffsetRange,
        _bytes: &[u8],
    ) -> Result<OffsetRange, PublishError> {
        Ok(range)
    }

    async fn finish_session(
        &self,
        session: &SessionHandle,
        _metadata: &PublishMetadata,
    ) -> Result<String, PublishError> {
        Ok(session.object_id.clone())
    }
}

#[test]
fn test_builder_with_endpoint() {
    let service = PublisherBuilder::new(PublisherConfig::default())
        .endpoint(Arc::new(NullEndpoint))
        .media_root("/srv/media")
        .build()
        .unwrap();
    assert_eq!(service.coordinator().adapter().platform(), "null");
    assert!(!service.get_status().running);
}

#[test]
fn test_builder_with_graph_config() {
    let config = PublisherConfig {
        graph: Some(GraphApiConfig::new("1234", "page-token")),
        ..PublisherConfig::default()
    };
    let service = PublisherBuilder::new(config).build().unwrap();
    assert_eq!(service.coordinator().adapter().platform(), "facebook");
}

#[test]
fn test_builder_endpoint_wins_over_graph_config() {
    let config = PublisherConfig {
        graph: Some(GraphApiConfig::new("1234", "page-token")),
        ..PublisherConfig::default()
    };
    let service = PublisherBuilder::new(config)
        .endpoint(Arc::new(NullEndpoint))
        .build()
        .unwrap();
    assert_eq!(service.coordinator().adapter().platform(), "null");
}

#[test]
fn test_builder_rejects_invalid_graph_config() {
    let config = PublisherConfig {
        graph: Some(GraphApiConfig::new("1234", "")),
        ..PublisherConfig::default()
    };
    let err = PublisherBuilder::new(config).build().err().unwrap();
    assert!(err.to_string().contains("graph invalid"));
}

#[tokio::test]
async fn test_text_post_needs_endpoint_support() {
    use chrono::Utc;
    use scheduled_publisher::core::{AttemptOutcome, Post, PostStatus};

    let service = PublisherBuilder::new(PublisherConfig::default())
        .endpoint(Arc::new(NullEndpoint))
        .build()
        .unwrap();
    let now = Utc::now();
    service
        .schedule(Post::new(1, "plain text", now).due_at(now))
        .await
        .unwrap();

    let outcome = service.publish_now(1).await.unwrap();
    assert_eq!(
        outcome,
        AttemptOutcome::Failed {
            error: "unsupported: null does not support text-only posts".into()
        }
    );
    assert_eq!(
        service.post_status(1).await.unwrap().status,
        PostStatus::Failed
    );
}
