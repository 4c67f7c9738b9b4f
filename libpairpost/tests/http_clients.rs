//! HTTP client tests against local mock servers

use std::path::PathBuf;
use std::time::Duration;

use libpairpost::config::{MediaConfig, WatermarkConfig};
use libpairpost::error::{PairpostError, UploadError};
use libpairpost::media::{CloudinaryStore, MediaStore};
use libpairpost::threads::{ApiConnector, HttpConnector, PostingApi, ThreadsClient};
use libpairpost::types::{MediaType, User};
use serial_test::serial;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn query_of(request: &wiremock::Request) -> Vec<(String, String)> {
    request
        .url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_create_and_publish_image_container() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/me/threads"))
        .and(header("authorization", "Bearer token-123"))
        .and(query_param("media_type", "IMAGE"))
        .and(query_param("image_url", "https://cdn.example/a.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "c-1"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/me/threads_publish"))
        .and(query_param("creation_id", "c-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "t-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ThreadsClient::new(server.uri(), "token-123").unwrap();
    let container = client
        .create_media_container(
            MediaType::Image,
            Some("caption"),
            Some("https://cdn.example/a.jpg"),
            None,
            false,
        )
        .await
        .unwrap();
    let thread_id = client.publish(&container).await.unwrap();

    assert_eq!(container, "c-1");
    assert_eq!(thread_id, "t-1");
}

#[tokio::test]
async fn test_carousel_parent_sends_ordered_children() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/me/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "parent"})))
        .mount(&server)
        .await;

    let client = ThreadsClient::new(server.uri(), "token").unwrap();
    let children = vec!["child-b".to_string(), "child-a".to_string()];
    client
        .create_carousel_container(&children, Some("two pictures"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let query = query_of(&requests[0]);
    assert!(query.contains(&("media_type".to_string(), "CAROUSEL".to_string())));
    assert!(query.contains(&("children".to_string(), "child-b,child-a".to_string())));
    assert!(query.contains(&("text".to_string(), "two pictures".to_string())));
}

#[tokio::test]
async fn test_invalid_carousel_makes_no_request() {
    let server = MockServer::start().await;
    let client = ThreadsClient::new(server.uri(), "token").unwrap();

    for count in [0usize, 1, 11] {
        let children: Vec<String> = (0..count).map(|i| format!("c{}", i)).collect();
        let err = client
            .create_carousel_container(&children, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PairpostError::InvalidArgument(_)));
    }

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reply_container_query() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/me/threads"))
        .and(query_param("reply_to_id", "t-9"))
        .and(query_param("media_type", "TEXT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "r-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ThreadsClient::new(server.uri(), "token").unwrap();
    let id = client
        .create_media_container(MediaType::Text, Some("reply"), None, Some("t-9"), false)
        .await
        .unwrap();
    assert_eq!(id, "r-1");
}

#[tokio::test]
async fn test_remote_error_carries_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/me/threads_publish"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"not ready"}"#))
        .mount(&server)
        .await;

    let client = ThreadsClient::new(server.uri(), "token").unwrap();
    let err = client.publish("c-1").await.unwrap_err();

    match err {
        PairpostError::Remote(remote) => {
            assert_eq!(remote.status, Some(400));
            assert_eq!(remote.body.as_deref(), Some(r#"{"error":"not ready"}"#));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_response_without_id_is_remote_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/me/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&server)
        .await;

    let client = ThreadsClient::new(server.uri(), "token").unwrap();
    let err = client
        .create_media_container(MediaType::Text, Some("hi"), None, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, PairpostError::Remote(_)));
}

#[tokio::test]
async fn test_connector_uses_each_users_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/me/threads_publish"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "t"})))
        .mount(&server)
        .await;

    let connector = HttpConnector::new(server.uri(), Duration::from_secs(5)).unwrap();
    for user in [User::new("alice", "token-a"), User::new("bob", "token-b")] {
        connector.connect(&user).unwrap().publish("c").await.unwrap();
    }

    let auth: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| {
            r.headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        })
        .collect();
    assert_eq!(auth, vec!["Bearer token-a", "Bearer token-b"]);
}

fn clear_cloudinary_env() {
    std::env::remove_var("CLOUDINARY_CLOUD_NAME");
    std::env::remove_var("CLOUDINARY_API_KEY");
    std::env::remove_var("CLOUDINARY_API_SECRET");
}

fn media_config(base_url: String, watermark: bool) -> MediaConfig {
    MediaConfig {
        base_url,
        cloud_name: Some("demo".to_string()),
        api_key: Some("key-1".to_string()),
        api_secret: Some("secret-1".to_string()),
        folder: Some("pairpost".to_string()),
        watermark: WatermarkConfig {
            enabled: watermark,
            ..Default::default()
        },
    }
}

fn image_file(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("image1.jpg");
    std::fs::write(&path, "fake jpeg bytes").unwrap();
    path
}

#[tokio::test]
#[serial]
async fn test_cloudinary_upload_returns_secure_url() {
    clear_cloudinary_env();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/demo/image/upload"))
        .and(body_string_contains("name=\"api_key\""))
        .and(body_string_contains("key-1"))
        .and(body_string_contains("name=\"signature\""))
        .and(body_string_contains("name=\"folder\""))
        .and(body_string_contains("%40alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "secure_url": "https://res.cloudinary.com/demo/image/upload/v1/pairpost/image1.jpg"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store =
        CloudinaryStore::from_config(&media_config(server.uri(), true), Duration::from_secs(5))
            .unwrap();
    let url = store.upload(&image_file(&dir), "alice").await.unwrap();

    assert_eq!(
        url,
        "https://res.cloudinary.com/demo/image/upload/v1/pairpost/image1.jpg"
    );
}

#[tokio::test]
#[serial]
async fn test_cloudinary_rejection_is_upload_error() {
    clear_cloudinary_env();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/demo/image/upload"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid Signature"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store =
        CloudinaryStore::from_config(&media_config(server.uri(), false), Duration::from_secs(5))
            .unwrap();
    let err = store.upload(&image_file(&dir), "alice").await.unwrap_err();

    match err {
        PairpostError::Upload(UploadError::Rejected { status, body }) => {
            assert_eq!(status, 401);
            assert_eq!(body, "Invalid Signature");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
#[serial]
async fn test_cloudinary_missing_file_fails_before_request() {
    clear_cloudinary_env();
    let server = MockServer::start().await;

    let store =
        CloudinaryStore::from_config(&media_config(server.uri(), false), Duration::from_secs(5))
            .unwrap();
    let err = store
        .upload(&PathBuf::from("/nonexistent/image1.jpg"), "alice")
        .await
        .unwrap_err();

    assert!(matches!(err, PairpostError::Upload(UploadError::File { .. })));
    assert!(server.received_requests().await.unwrap().is_empty());
}
