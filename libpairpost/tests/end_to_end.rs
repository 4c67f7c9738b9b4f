//! End-to-end runs across multiple users
//!
//! These tests drive the coordinator with mock clients and verify:
//! - One result per user, in order
//! - Failure isolation between users
//! - Pacing between users
//! - Content picked from a real directory tree

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use libpairpost::content::FilesystemContent;
use libpairpost::coordinator::{Coordinator, Pacing, RunSummary};
use libpairpost::mock::{MockConnector, MockMediaStore, StaticContent};
use libpairpost::pipeline::ReadinessDelays;
use libpairpost::threads::ApiConnector;
use libpairpost::types::{ContentItem, MediaType, PostStatus, ReplyContent, User};
use libpairpost::users::UserStore;
use tempfile::TempDir;
use tokio::time::Instant;

fn pair(folder: &str) -> ContentItem {
    ContentItem::new(
        folder,
        format!("{} caption", folder),
        vec![
            PathBuf::from(format!("/pairs/{}/image1.jpg", folder)),
            PathBuf::from(format!("/pairs/{}/image2.jpg", folder)),
        ],
    )
    .unwrap()
}

fn users(names: &[&str]) -> Vec<User> {
    names.iter().map(|name| User::new(*name, "token")).collect()
}

fn coordinator(
    connector: Arc<MockConnector>,
    media: Arc<MockMediaStore>,
    content: StaticContent,
    pacing: Pacing,
) -> Coordinator {
    let connector: Arc<dyn ApiConnector> = connector;
    Coordinator::new(
        connector,
        media,
        Arc::new(content),
        ReadinessDelays::default(),
        pacing,
    )
}

fn no_pacing() -> Pacing {
    Pacing::new(Duration::ZERO, Duration::ZERO).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_three_users_middle_upload_fails() -> Result<()> {
    let connector = Arc::new(MockConnector::new());
    let media = Arc::new(MockMediaStore::new().failing_for("bob"));
    let content = StaticContent::new()
        .with_item("alice", pair("a1"))
        .with_item("bob", pair("b1"))
        .with_item("carol", pair("c1"));
    let coordinator = coordinator(connector.clone(), media.clone(), content, no_pacing());

    let results = coordinator.run(&users(&["alice", "bob", "carol"])).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].username, "alice");
    assert_eq!(results[1].username, "bob");
    assert_eq!(results[2].username, "carol");

    assert_eq!(results[0].status, PostStatus::Success);
    assert!(results[0].thread_id.is_some());
    assert_eq!(results[1].status, PostStatus::Error);
    assert!(results[1].message.as_deref().unwrap().contains("uploading failed"));
    assert_eq!(results[2].status, PostStatus::Success);
    assert!(results[2].thread_id.is_some());

    // Bob never reached the API
    assert!(connector.log().for_user("bob").is_empty());
    assert_eq!(connector.log().for_user("carol").len(), 4);

    let summary = RunSummary::from_results(&results);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_users_processed_sequentially_in_order() -> Result<()> {
    let connector = Arc::new(MockConnector::new());
    let content = StaticContent::new()
        .with_item("alice", pair("a1"))
        .with_item("bob", pair("b1"));
    let coordinator = coordinator(
        connector.clone(),
        Arc::new(MockMediaStore::new()),
        content,
        no_pacing(),
    );

    coordinator.run(&users(&["alice", "bob"])).await;

    let order: Vec<String> = connector
        .log()
        .calls()
        .into_iter()
        .map(|c| c.username)
        .collect();
    assert_eq!(order, vec!["alice", "alice", "alice", "alice", "bob", "bob", "bob", "bob"]);

    let parents: Vec<_> = connector
        .log()
        .creates()
        .into_iter()
        .filter(|c| c.media_type == MediaType::Carousel)
        .collect();
    assert_eq!(parents.len(), 2);
    assert_eq!(parents[0].text.as_deref(), Some("a1 caption"));
    assert_eq!(parents[1].text.as_deref(), Some("b1 caption"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pacing_between_users_but_not_after_last() -> Result<()> {
    let connector = Arc::new(MockConnector::new());
    let content = StaticContent::new()
        .with_item("alice", ContentItem::new("a", "hi", Vec::new())?)
        .with_item("bob", ContentItem::new("b", "hi", Vec::new())?);
    let pacing = Pacing::new(Duration::from_secs(60), Duration::from_secs(120))?;
    let coordinator = coordinator(
        connector.clone(),
        Arc::new(MockMediaStore::new()),
        content,
        pacing,
    );

    let start = Instant::now();
    coordinator.run(&users(&["alice", "bob"])).await;
    let elapsed = start.elapsed();

    let calls = connector.log().calls();
    let alice_publish = calls[1].at;
    let bob_create = calls[2].at;
    assert_eq!(calls[2].username, "bob");
    assert!(bob_create - alice_publish >= Duration::from_secs(60));
    assert!(bob_create - alice_publish <= Duration::from_secs(120));

    // Two 30s readiness waits plus one pause, nothing trailing
    assert!(elapsed >= Duration::from_secs(120));
    assert!(elapsed <= Duration::from_secs(180));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_connector_failure_is_isolated() -> Result<()> {
    let connector = Arc::new(MockConnector::new().refusing("alice"));
    let content = StaticContent::new()
        .with_item("alice", pair("a1"))
        .with_item("bob", pair("b1"));
    let coordinator = coordinator(
        connector.clone(),
        Arc::new(MockMediaStore::new()),
        content,
        no_pacing(),
    );

    let results = coordinator.run(&users(&["alice", "bob"])).await;

    assert!(!results[0].is_success());
    assert!(results[0].message.as_deref().unwrap().contains("client setup failed"));
    assert!(results[1].is_success());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_content_is_per_user_error() -> Result<()> {
    let connector = Arc::new(MockConnector::new());
    let content = StaticContent::new().with_item("bob", pair("b1"));
    let coordinator = coordinator(
        connector.clone(),
        Arc::new(MockMediaStore::new()),
        content,
        no_pacing(),
    );

    let results = coordinator.run(&users(&["alice", "bob"])).await;

    assert!(results[0].message.as_deref().unwrap().contains("No eligible content"));
    assert!(results[1].is_success());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reply_only_for_users_with_reply_capability() -> Result<()> {
    let connector = Arc::new(MockConnector::new());
    let reply = ReplyContent {
        text: "Thanks for looking".to_string(),
        image_path: None,
    };
    let content = StaticContent::new()
        .with_item("alice", pair("a1"))
        .with_item("bob", pair("b1"))
        .with_reply("bob", reply);
    let coordinator = coordinator(
        connector.clone(),
        Arc::new(MockMediaStore::new()),
        content,
        no_pacing(),
    );

    let run_users = vec![
        User::new("alice", "a"),
        User::new("bob", "b").with_reply_capability(true),
    ];
    let results = coordinator.run(&run_users).await;

    assert_eq!(results[0].reply_id, None);
    assert!(results[1].reply_id.is_some());

    let reply_creates: Vec<_> = connector
        .log()
        .creates()
        .into_iter()
        .filter(|c| c.reply_to_id.is_some())
        .collect();
    assert_eq!(reply_creates.len(), 1);
    assert_eq!(reply_creates[0].reply_to_id, results[1].thread_id);
    Ok(())
}

fn write_files(dir: &Path, files: &[(&str, &str)]) {
    std::fs::create_dir_all(dir).unwrap();
    for (name, body) in files {
        std::fs::write(dir.join(name), body).unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_from_filesystem_content_and_user_store() -> Result<()> {
    let temp = TempDir::new()?;
    let pairs = temp.path().join("pairs");
    let replies = temp.path().join("replies");

    write_files(
        &pairs.join("alice").join("morning"),
        &[("image1.jpg", "a"), ("image2.jpg", "b")],
    );
    write_files(
        &pairs.join("bob").join("words"),
        &[("caption.txt", "Text only today")],
    );
    write_files(
        &replies.join("bob"),
        &[("reply.txt", "Link in bio"), ("reply_image.webp", "r")],
    );

    let users_path = temp.path().join("users.json");
    let mut store = UserStore::load(&users_path)?;
    store.add("alice", "token-a")?;
    store.add("bob", "token-b")?;
    store.save()?;

    let content = Arc::new(FilesystemContent::new(&pairs, &replies));
    let run_users = UserStore::open(&users_path)?.users(content.as_ref());
    assert!(!run_users[0].has_reply_capability);
    assert!(run_users[1].has_reply_capability);

    let connector = Arc::new(MockConnector::new());
    let media = Arc::new(MockMediaStore::new());
    let connector_dyn: Arc<dyn ApiConnector> = connector.clone();
    let coordinator = Coordinator::new(
        connector_dyn,
        media.clone(),
        content,
        ReadinessDelays::default(),
        no_pacing(),
    );

    let results = coordinator.run(&run_users).await;
    assert!(results.iter().all(|r| r.is_success()));

    let alice_creates: Vec<_> = connector
        .log()
        .for_user("alice")
        .into_iter()
        .filter_map(|c| match c.call {
            libpairpost::mock::ApiCall::Create(request) => Some(request),
            _ => None,
        })
        .collect();
    assert_eq!(alice_creates.last().unwrap().media_type, MediaType::Carousel);
    assert_eq!(
        alice_creates.last().unwrap().text.as_deref(),
        Some("This is a default caption for morning")
    );

    let bob_creates: Vec<_> = connector
        .log()
        .creates()
        .into_iter()
        .filter(|c| c.text.as_deref() == Some("Text only today") || c.reply_to_id.is_some())
        .collect();
    assert_eq!(bob_creates[0].media_type, MediaType::Text);
    assert_eq!(bob_creates[1].media_type, MediaType::Image);
    assert!(results[1].reply_id.is_some());

    let uploaded: Vec<String> = media
        .uploads()
        .into_iter()
        .map(|u| u.path.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(uploaded, vec!["image1.jpg", "image2.jpg", "reply_image.webp"]);
    Ok(())
}
