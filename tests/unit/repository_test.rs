//! Tests for post repository backends

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use scheduled_publisher::core::{Post, PostRepository, PostStatus, RepositoryError, Resolution};
use scheduled_publisher::infra::{FilePostRepository, InMemoryPostRepository};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

fn scheduled(id: u64, minutes: i64) -> Post {
    let mut post = Post::new(id, format!("post {id}"), t0());
    post.apply_schedule(t0() + Duration::minutes(minutes), t0());
    post
}

/// Conditional-update contract every backend must honour.
async fn exercise_contract(repo: &dyn PostRepository) {
    repo.insert(scheduled(1, -5)).await.unwrap();
    repo.insert(scheduled(2, -10)).await.unwrap();
    repo.insert(scheduled(3, 10)).await.unwrap();
    repo.insert(Post::new(4, "draft", t0())).await.unwrap();

    assert!(matches!(
        repo.insert(Post::new(1, "again", t0())).await,
        Err(RepositoryError::Duplicate(1))
    ));

    let due = repo.due_posts(t0(), 10).await.unwrap();
    assert_eq!(due.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 1]);

    let token = Uuid::new_v4();
    let claimed = repo.claim(1, token, t0()).await.unwrap().unwrap();
    assert_eq!(claimed.status, PostStatus::Publishing);
    assert!(repo.claim(1, Uuid::new_v4(), t0()).await.unwrap().is_none());
    assert!(repo.claim(4, Uuid::new_v4(), t0()).await.unwrap().is_none());
    assert!(repo.claim(99, Uuid::new_v4(), t0()).await.unwrap().is_none());

    assert!(!repo.cancel(1, t0()).await.unwrap());
    assert!(!repo.delete(1).await.unwrap());

    let published = Resolution::Published {
        external_id: "ext-1".into(),
        published_at: t0(),
    };
    assert!(!repo
        .resolve(1, Uuid::new_v4(), published.clone(), t0())
        .await
        .unwrap());
    assert!(repo.resolve(1, token, published, t0()).await.unwrap());
    let post = repo.get(1).await.unwrap().unwrap();
    assert_eq!(post.status, PostStatus::Published);
    assert_eq!(post.external_post_id.as_deref(), Some("ext-1"));

    assert!(repo.cancel(3, t0()).await.unwrap());
    assert_eq!(
        repo.list_by_status(PostStatus::Draft)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect::<Vec<_>>(),
        vec![3, 4]
    );
    assert!(matches!(
        repo.schedule(1, t0(), t0()).await,
        Err(RepositoryError::InvalidTransition { id: 1, .. })
    ));
}

#[tokio::test]
async fn test_memory_repository_contract() {
    let repo = InMemoryPostRepository::new();
    exercise_contract(&repo).await;
    assert_eq!(repo.len(), 4);
}

#[tokio::test]
async fn test_file_repository_contract() {
    let dir = tempfile::tempdir().unwrap();
    let repo = FilePostRepository::open(dir.path()).unwrap();
    exercise_contract(&repo).await;
}

#[tokio::test]
async fn test_publishing_posts_cannot_be_inserted() {
    let repo = InMemoryPostRepository::new();
    let mut post = scheduled(1, 0);
    post.apply_claim(Uuid::new_v4(), t0());
    assert!(matches!(
        repo.insert(post).await,
        Err(RepositoryError::InvalidTransition { .. })
    ));

    let mut no_time = Post::new(2, "x", t0());
    no_time.status = PostStatus::Scheduled;
    assert!(repo.insert(no_time).await.is_err());
    assert!(repo.is_empty());
}

#[tokio::test]
async fn test_drafts_with_a_due_time_are_rejected() {
    let repo = InMemoryPostRepository::new();
    let draft = Post::new(3, "x", t0()).due_at(t0() + Duration::minutes(5));
    assert_eq!(draft.status, PostStatus::Draft);

    let err = repo.insert(draft).await.unwrap_err();
    assert!(matches!(err, RepositoryError::DraftWithDueTime(3)));
    assert_eq!(err.to_string(), "post 3 is a draft but has a scheduled_for time");
    assert!(repo.is_empty());

    repo.insert(Post::new(3, "x", t0())).await.unwrap();
    assert!(repo.get(3).await.unwrap().unwrap().scheduled_for.is_none());
}

#[tokio::test]
async fn test_orphans_older_than_cutoff_are_reclaimed() {
    let repo = InMemoryPostRepository::new();
    repo.insert(scheduled(1, -30)).await.unwrap();
    repo.insert(scheduled(2, -30)).await.unwrap();
    repo.claim(1, Uuid::new_v4(), t0() - Duration::minutes(20))
        .await
        .unwrap();
    repo.claim(2, Uuid::new_v4(), t0() - Duration::minutes(2))
        .await
        .unwrap();

    let reclaimed = repo
        .reclaim_orphans(
            t0() - Duration::minutes(10),
            &[],
            "orphaned publishing claim",
            t0(),
        )
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, 1);
    assert_eq!(reclaimed[0].status, PostStatus::Failed);
    assert_eq!(
        repo.get(2).await.unwrap().unwrap().status,
        PostStatus::Publishing
    );
}

#[tokio::test]
async fn test_live_claims_are_not_reclaimed() {
    let repo = InMemoryPostRepository::new();
    for id in 1..=3 {
        repo.insert(scheduled(id, -30)).await.unwrap();
        repo.claim(id, Uuid::new_v4(), t0() - Duration::minutes(20))
            .await
            .unwrap();
    }

    let reclaimed = repo
        .reclaim_orphans(t0() - Duration::minutes(10), &[1, 3], "orphaned", t0())
        .await
        .unwrap();
    assert_eq!(reclaimed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2]);
    assert_eq!(
        repo.get(1).await.unwrap().unwrap().status,
        PostStatus::Publishing
    );
    assert_eq!(
        repo.get(3).await.unwrap().unwrap().status,
        PostStatus::Publishing
    );
}

#[tokio::test]
async fn test_file_repository_is_single_owner() {
    let dir = tempfile::tempdir().unwrap();
    let first = FilePostRepository::open(dir.path()).unwrap();
    first.insert(scheduled(1, -1)).await.unwrap();

    // a second handle would claim from its own stale copy of the table
    let err = FilePostRepository::open(dir.path()).err().unwrap();
    assert!(matches!(err, RepositoryError::Backend(ref msg) if msg.contains("posts.lock")));

    drop(first);
    let reopened = FilePostRepository::open(dir.path()).unwrap();
    assert!(reopened
        .claim(1, Uuid::new_v4(), t0())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_file_repository_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let token = Uuid::new_v4();
    {
        let repo = FilePostRepository::open(dir.path()).unwrap();
        repo.insert(scheduled(1, 5)).await.unwrap();
        repo.insert(scheduled(2, -1)).await.unwrap();
        repo.claim(2, token, t0()).await.unwrap().unwrap();
    }

    let reopened = FilePostRepository::open(dir.path()).unwrap();
    let post = reopened.get(1).await.unwrap().unwrap();
    assert_eq!(post.status, PostStatus::Scheduled);
    assert_eq!(post.scheduled_for, Some(t0() + Duration::minutes(5)));

    // a crash mid-publish leaves the claim on disk for the sweep to reclaim
    let stuck = reopened.get(2).await.unwrap().unwrap();
    assert_eq!(stuck.status, PostStatus::Publishing);
    assert_eq!(stuck.claim_token, Some(token));

    assert!(reopened.snapshot_path().exists());
    assert!(!reopened.snapshot_path().with_extension("jsonl.tmp").exists());
}

#[tokio::test]
async fn test_file_repository_rejects_corrupt_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("posts.jsonl"), "{ not a post }\n").unwrap();

    let err = FilePostRepository::open(dir.path()).err().unwrap();
    assert!(matches!(err, RepositoryError::Backend(ref msg) if msg.contains("posts.jsonl:1")));
}
