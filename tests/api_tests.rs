//! End-to-end API tests against the in-memory media host, with either
//! metadata store behind the router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use gallery::auth::{Claims, TokenService};
use gallery::config::Config;
use gallery::media::memory::MemoryMediaBackend;
use gallery::metadata::memory::MemoryMetadataStore;
use gallery::metadata::mode::{
    seed_admin, seed_user, StorageMode, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD,
    DEFAULT_USER_EMAIL, DEFAULT_USER_PASSWORD,
};
use gallery::metadata::sqlite::SqliteMetadataStore;
use gallery::metadata::store::MetadataStore;
use gallery::upload::UploadStaging;
use gallery::AppState;

const BOUNDARY: &str = "gallery-test-boundary";
const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake image data";
const TEST_SECRET: &[u8] = b"test-secret";

struct TestApp {
    router: Router,
    media: Arc<MemoryMediaBackend>,
    metadata: Arc<dyn MetadataStore>,
    staging_dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_max_file_size(5 * 1024 * 1024).await
    }

    async fn with_max_file_size(max_file_size: u64) -> Self {
        Self::with_store(
            Arc::new(MemoryMetadataStore::new()),
            StorageMode::InMemory,
            max_file_size,
        )
        .await
    }

    async fn sqlite() -> Self {
        let store = SqliteMetadataStore::new(":memory:").unwrap();
        Self::with_store(Arc::new(store), StorageMode::Persistent, 5 * 1024 * 1024).await
    }

    async fn with_store(
        metadata: Arc<dyn MetadataStore>,
        mode: StorageMode,
        max_file_size: u64,
    ) -> Self {
        let staging_dir = tempfile::tempdir().unwrap();
        seed_admin(metadata.as_ref()).await.unwrap();
        seed_user(metadata.as_ref()).await.unwrap();
        let media = Arc::new(MemoryMediaBackend::new("http://media.test", "gallery"));

        let mut config = Config::default();
        config.observability.metrics = false;

        let state = Arc::new(AppState {
            config,
            mode,
            metadata: metadata.clone(),
            media: media.clone(),
            tokens: TokenService::new(TEST_SECRET, 24),
            staging: UploadStaging::new(staging_dir.path(), max_file_size).unwrap(),
        });

        Self {
            router: gallery::server::app(state),
            media,
            metadata,
            staging_dir,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"email": email, "password": password}).to_string(),
            ))
            .unwrap();
        let (status, _, body) = self.send(req).await;
        (status, body)
    }

    async fn admin_token(&self) -> String {
        let (status, body) = self.login(DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    async fn user_token(&self) -> String {
        let (status, body) = self.login(DEFAULT_USER_EMAIL, DEFAULT_USER_PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    async fn upload(&self, token: Option<&str>, body: Vec<u8>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/images/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let (status, _, body) = self.send(builder.body(Body::from(body)).unwrap()).await;
        (status, body)
    }

    async fn list(&self) -> Vec<Value> {
        let req = Request::builder()
            .uri("/api/images")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = self.send(req).await;
        assert_eq!(status, StatusCode::OK);
        body.as_array().unwrap().clone()
    }

    async fn image_count(&self) -> usize {
        self.metadata.list_images().await.unwrap().len()
    }

    fn staged_file_count(&self) -> usize {
        std::fs::read_dir(self.staging_dir.path()).unwrap().count()
    }
}

fn multipart_body(file: Option<(&str, &str, &[u8])>, title: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(title) = title {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{title}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn json_request(method: Method, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_storage_mode() {
    let app = TestApp::new().await;
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = app.send(req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "storage": "memory"}));
    let request_id = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(request_id.len(), 16);
}

#[tokio::test]
async fn test_login_returns_token_and_admin_flag() {
    let app = TestApp::new().await;

    let (status, body) = app.login(DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isAdmin"], json!(true));
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    // Only the token and the admin flag come back.
    assert_eq!(body.as_object().unwrap().len(), 2);

    let (status, body) = app.login(DEFAULT_USER_EMAIL, DEFAULT_USER_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isAdmin"], json!(false));
}

#[tokio::test]
async fn test_invalid_logins_are_indistinguishable() {
    let app = TestApp::new().await;

    let (wrong_password_status, wrong_password) =
        app.login(DEFAULT_ADMIN_EMAIL, "not-the-password").await;
    let (unknown_email_status, unknown_email) = app.login("nobody@gmail.com", "admin123").await;

    assert_eq!(wrong_password_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_email);
    assert_eq!(wrong_password["message"], json!("Invalid credentials"));
}

#[tokio::test]
async fn test_login_malformed_body() {
    let app = TestApp::new().await;
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = app.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("ValidationError"));
}

#[tokio::test]
async fn test_auth_gate_outcomes() {
    let app = TestApp::new().await;
    let body = || multipart_body(Some(("a.png", "image/png", PNG_BYTES)), Some("A"));

    let (status, resp) = app.upload(None, body()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp["code"], json!("MissingToken"));

    let (status, resp) = app.upload(Some("not.a.jwt"), body()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(resp["code"], json!("InvalidToken"));

    let user = app.user_token().await;
    let (status, resp) = app.upload(Some(&user), body()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(resp["code"], json!("AdminRequired"));

    // Nothing got past the gate.
    assert!(app.media.is_empty().await);
    assert_eq!(app.image_count().await, 0);
    assert_eq!(app.staged_file_count(), 0);
}

#[tokio::test]
async fn test_expired_and_foreign_tokens_rejected() {
    let app = TestApp::new().await;
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: "admin-id".to_string(),
        email: DEFAULT_ADMIN_EMAIL.to_string(),
        is_admin: true,
        iat: now - 7200,
        exp: now - 3600,
    };
    let expired = TokenService::new(TEST_SECRET, 24).sign(&claims).unwrap();
    let req = json_request(Method::PUT, "/api/images/x", &expired, json!({"title": "t"}));
    let (status, _, body) = app.send(req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], json!("InvalidToken"));

    let fresh = Claims {
        iat: now,
        exp: now + 3600,
        ..claims
    };
    let foreign = TokenService::new(b"another-secret", 24).sign(&fresh).unwrap();
    let req = delete_request("/api/images/x", &foreign);
    let (status, _, body) = app.send(req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], json!("InvalidToken"));
}

#[tokio::test]
async fn test_gallery_lifecycle_in_memory() {
    let app = TestApp::new().await;
    check_gallery_lifecycle(&app).await;
}

#[tokio::test]
async fn test_gallery_lifecycle_sqlite() {
    let app = TestApp::sqlite().await;
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (_, _, health) = app.send(req).await;
    assert_eq!(health["storage"], json!("persistent"));

    check_gallery_lifecycle(&app).await;
}

async fn check_gallery_lifecycle(app: &TestApp) {
    let token = app.admin_token().await;

    // Listing is public and starts empty.
    assert!(app.list().await.is_empty());

    let sunset: Vec<u8> = PNG_BYTES
        .iter()
        .copied()
        .cycle()
        .take(2 * 1024 * 1024)
        .collect();
    let (status, image) = app
        .upload(
            Some(&token),
            multipart_body(Some(("sunset.png", "image/png", &sunset)), Some("Sunset")),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(image["title"], json!("Sunset"));
    let id = image["id"].as_str().unwrap().to_string();
    let remote_id = image["remoteObjectId"].as_str().unwrap().to_string();
    assert!(image["url"].as_str().unwrap().starts_with("http://media.test/"));
    assert!(image["createdAt"].is_string());

    // Published remotely, staged copy removed.
    let hosted = app.media.get(&remote_id).await.unwrap();
    assert_eq!(hosted.data.len(), sunset.len());
    assert_eq!(app.staged_file_count(), 0);

    let listed = app.list().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], image);

    let req = json_request(
        Method::PUT,
        &format!("/api/images/{id}"),
        &token,
        json!({"title": "Dusk"}),
    );
    let (status, _, updated) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], json!("Dusk"));
    assert_eq!(updated["id"], image["id"]);
    assert_eq!(updated["createdAt"], image["createdAt"]);

    let (status, _, body) = app
        .send(delete_request(&format!("/api/images/{id}"), &token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Image deleted successfully"}));

    assert!(app.list().await.is_empty());
    assert!(app.media.is_empty().await);
}

#[tokio::test]
async fn test_list_newest_first() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    for title in ["first", "second", "third"] {
        let (status, _) = app
            .upload(
                Some(&token),
                multipart_body(Some(("a.jpg", "image/jpeg", PNG_BYTES)), Some(title)),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let titles: Vec<_> = app
        .list()
        .await
        .iter()
        .map(|i| i["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, ["third", "second", "first"]);
}

#[tokio::test]
async fn test_upload_without_title_is_untitled() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;
    let (status, image) = app
        .upload(
            Some(&token),
            multipart_body(Some(("cat.gif", "image/gif", PNG_BYTES)), None),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(image["title"], json!("Untitled"));
}

#[tokio::test]
async fn test_upload_missing_file() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;
    let (status, body) = app
        .upload(Some(&token), multipart_body(None, Some("Nothing")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("No file uploaded"));
    assert!(app.media.is_empty().await);
}

#[tokio::test]
async fn test_upload_wrong_type_never_reaches_media() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    for (name, content_type) in [
        ("doc.pdf", "application/pdf"),
        ("image.png", "text/plain"),
        ("vector.svg", "image/png"),
    ] {
        let (status, body) = app
            .upload(
                Some(&token),
                multipart_body(Some((name, content_type, PNG_BYTES)), Some("x")),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{name} {content_type}");
        assert_eq!(body["code"], json!("ValidationError"));
    }

    assert!(app.media.is_empty().await);
    assert_eq!(app.image_count().await, 0);
    assert_eq!(app.staged_file_count(), 0);
}

#[tokio::test]
async fn test_upload_too_large_never_reaches_media() {
    let app = TestApp::with_max_file_size(16).await;
    let token = app.admin_token().await;

    let (status, body) = app
        .upload(
            Some(&token),
            multipart_body(Some(("big.png", "image/png", &[7u8; 64][..])), Some("big")),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("too large"));

    assert!(app.media.is_empty().await);
    assert_eq!(app.image_count().await, 0);
    assert_eq!(app.staged_file_count(), 0);

    // Exactly at the cap is accepted.
    let (status, _) = app
        .upload(
            Some(&token),
            multipart_body(Some(("ok.png", "image/png", &[7u8; 16][..])), None),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_media_outage_on_upload_leaves_staged_file() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;
    app.media.set_unavailable(true);

    let (status, body) = app
        .upload(
            Some(&token),
            multipart_body(Some(("a.png", "image/png", PNG_BYTES)), Some("x")),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], json!("Server error"));
    assert!(body["error"].as_str().is_some());

    assert_eq!(app.image_count().await, 0);
    assert_eq!(app.staged_file_count(), 1);
}

#[tokio::test]
async fn test_media_outage_on_delete_keeps_record() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;
    let (_, image) = app
        .upload(
            Some(&token),
            multipart_body(Some(("a.png", "image/png", PNG_BYTES)), Some("keep")),
        )
        .await;
    let id = image["id"].as_str().unwrap();

    app.media.set_unavailable(true);
    let (status, _, _) = app
        .send(delete_request(&format!("/api/images/{id}"), &token))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.metadata.find_image(id).await.unwrap().is_some());

    // Retry once the host is back.
    app.media.set_unavailable(false);
    let (status, _, _) = app
        .send(delete_request(&format!("/api/images/{id}"), &token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.image_count().await, 0);
}

#[tokio::test]
async fn test_unknown_image_is_not_found() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let req = json_request(
        Method::PUT,
        "/api/images/does-not-exist",
        &token,
        json!({"title": "x"}),
    );
    let (status, _, body) = app.send(req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], json!("Image not found"));

    let (status, _, body) = app
        .send(delete_request("/api/images/does-not-exist", &token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("NotFound"));
}

#[tokio::test]
async fn test_update_requires_title() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;
    let (_, image) = app
        .upload(
            Some(&token),
            multipart_body(Some(("a.png", "image/png", PNG_BYTES)), Some("Original")),
        )
        .await;
    let uri = format!("/api/images/{}", image["id"].as_str().unwrap());

    for body in [json!({}), json!({"title": ""}), json!({"title": "   "})] {
        let (status, _, resp) = app
            .send(json_request(Method::PUT, &uri, &token, body))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["code"], json!("ValidationError"));
    }

    assert_eq!(app.list().await[0]["title"], json!("Original"));

    // Surrounding whitespace is not stored.
    let (status, _, updated) = app
        .send(json_request(
            Method::PUT,
            &uri,
            &token,
            json!({"title": "  Dusk  "}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], json!("Dusk"));
    assert_eq!(app.list().await[0]["title"], json!("Dusk"));
}

#[tokio::test]
async fn test_unbounded_size_cap_builds_router() {
    let app = TestApp::with_max_file_size(u64::MAX).await;
    let token = app.admin_token().await;
    let (status, image) = app
        .upload(
            Some(&token),
            multipart_body(Some(("a.png", "image/png", PNG_BYTES)), Some("ok")),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(image["title"], json!("ok"));
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = TestApp::new().await;
    let req = Request::builder()
        .uri("/openapi.json")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/images/upload"]["post"].is_object());
}
