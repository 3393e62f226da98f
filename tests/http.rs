use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use portfolio_content::{
    app,
    services::{
        blob_store::DiskBlobStore,
        content_store::Fields,
        memory::{MemoryBlobStore, MemoryContentStore},
        pipeline::PipelinePolicy,
    },
    state::AppState,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "portfolio-test-boundary";

struct TestApp {
    router: Router,
    content: MemoryContentStore,
    blobs: MemoryBlobStore,
}

fn build() -> TestApp {
    build_with_token(None)
}

fn build_with_token(token: Option<&str>) -> TestApp {
    let content = MemoryContentStore::new();
    let blobs = MemoryBlobStore::new();
    let state = AppState::new(
        Arc::new(content.clone()),
        Arc::new(blobs.clone()),
        PipelinePolicy::default(),
    )
    .with_admin_token(token.map(str::to_string));
    TestApp {
        router: app(state),
        content,
        blobs,
    }
}

/// Hand-built multipart/form-data body.
struct Form {
    body: Vec<u8>,
}

impl Form {
    fn new() -> Self {
        Self { body: Vec::new() }
    }

    fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn request(mut self, method: &str, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = router.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn video_form(title: &str) -> Form {
    Form::new()
        .text("title", title)
        .file("src", "intro.mp4", "video/mp4", b"fake mp4 bytes")
}

#[tokio::test]
async fn health_ok() {
    let ax = build();
    let (status, body) = send(&ax.router, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&ax.router, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["content_store"]["ok"], true);
    assert_eq!(body["checks"]["blob_store"]["ok"], true);
}

#[tokio::test]
async fn project_without_image_keeps_softwares() {
    let ax = build();
    let req = Form::new()
        .text("title", "Solar Tracker")
        .text("description", "desc")
        .text("softwares", r#"["Matlab","AutoCAD"]"#)
        .request("POST", "/content/projects");

    let (status, body) = send(&ax.router, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert!(body["data"].get("image").is_none());
    assert_eq!(body["data"]["softwares"], json!(["Matlab", "AutoCAD"]));
    assert!(ax.blobs.calls().is_empty());

    let (status, body) = send(&ax.router, get("/content/projects")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["title"], "Solar Tracker");
}

#[tokio::test]
async fn unknown_software_is_a_validation_error() {
    let ax = build();
    let req = Form::new()
        .text("title", "Solar Tracker")
        .text("description", "desc")
        .text("softwares", r#"["Photoshop"]"#)
        .request("POST", "/content/projects");

    let (status, body) = send(&ax.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn duplicate_media_title_is_rejected_and_its_blob_removed() {
    let ax = build();

    let (status, first) = send(&ax.router, video_form("Intro").request("POST", "/content/media")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["data"]["category"], "general");
    assert_eq!(first["data"]["views"], 0);

    let (status, body) = send(&ax.router, video_form("Intro").request("POST", "/content/media")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "conflict");
    assert!(body["error"].as_str().unwrap().contains("already exists"));

    let uploads = ax.blobs.uploads();
    assert_eq!(uploads.len(), 2);
    assert_eq!(ax.blobs.deletes(), vec![uploads[1].clone()]);
    assert!(!ax.blobs.contains(&uploads[1]));
    assert_eq!(ax.content.documents("media").len(), 1);
}

#[tokio::test]
async fn created_media_points_at_an_existing_blob() {
    let ax = build();
    let (status, body) = send(&ax.router, video_form("Tour").request("POST", "/content/media")).await;
    assert_eq!(status, StatusCode::CREATED);

    let src = body["data"]["src"].as_str().unwrap();
    assert!(ax.blobs.contains_url(src));
    assert_eq!(body["data"]["fileSize"], 14);
}

#[tokio::test]
async fn oversized_pdf_never_reaches_the_blob_store() {
    let ax = build();
    let pdf = vec![b'%'; 15 * 1024 * 1024];
    let req = Form::new()
        .text("name", "Resume")
        .file("file", "cv.pdf", "application/pdf", &pdf)
        .request("POST", "/content/vitae");

    let (status, body) = send(&ax.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
    assert!(ax.blobs.uploads().is_empty());
    assert!(ax.content.calls().is_empty());
}

#[tokio::test]
async fn wrong_video_type_never_reaches_the_blob_store() {
    let ax = build();
    let req = Form::new()
        .text("title", "Clip")
        .file("src", "clip.mkv", "video/x-matroska", b"mkv")
        .request("POST", "/content/media");

    let (status, _) = send(&ax.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(ax.blobs.calls().is_empty());
}

#[tokio::test]
async fn verifying_an_experience_keeps_its_image() {
    let ax = build();
    let req = Form::new()
        .text("name", "Solar Lab")
        .text("subject", "Research")
        .text("verified", "false")
        .file("image", "logo.png", "image/png", b"png bytes")
        .request("POST", "/content/experiences");
    let (status, created) = send(&ax.router, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["verified"], false);
    let id = created["data"]["id"].as_str().unwrap().to_string();

    // An untouched file input arrives as an empty part without a filename.
    let req = Form::new()
        .text("id", &id)
        .text("verified", "true")
        .file("image", "", "application/octet-stream", b"")
        .request("PUT", "/content/experiences");
    let (status, updated) = send(&ax.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["verified"], true);
    assert_eq!(updated["data"]["image"], created["data"]["image"]);
    assert_eq!(updated["data"]["name"], "Solar Lab");
    assert!(ax.blobs.deletes().is_empty());
    assert_eq!(ax.blobs.uploads().len(), 1);
}

#[tokio::test]
async fn update_of_unknown_record_is_404() {
    let ax = build();
    let req = Form::new()
        .text("id", "missing")
        .text("title", "New")
        .request("PUT", "/content/projects");
    let (status, body) = send(&ax.router, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn update_without_id_is_a_validation_error() {
    let ax = build();
    let req = Form::new().text("title", "New").request("PUT", "/content/projects");
    let (status, body) = send(&ax.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "id is required");
}

#[tokio::test]
async fn delete_of_unknown_record_is_404_without_blob_calls() {
    let ax = build();
    let (status, body) = send(
        &ax.router,
        json_request("DELETE", "/content/media", json!({ "id": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(ax.blobs.calls().is_empty());
}

#[tokio::test]
async fn delete_removes_record_and_blob() {
    let ax = build();
    let (_, created) = send(&ax.router, video_form("Intro").request("POST", "/content/media")).await;
    let id = created["data"]["id"].as_str().unwrap();
    let public_id = created["data"]["publicId"].as_str().unwrap().to_string();

    let (status, body) = send(
        &ax.router,
        json_request("DELETE", "/content/media", json!({ "id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    assert!(ax.content.documents("media").is_empty());
    assert!(!ax.blobs.contains(&public_id));
}

#[tokio::test]
async fn listing_normalizes_stored_timestamps() {
    let ax = build();
    let mut fields = Fields::new();
    fields.insert("title".into(), json!("Legacy"));
    fields.insert("src".into(), json!("https://cdn.example.com/media/abc.mp4"));
    fields.insert(
        "createdAt".into(),
        json!({ "seconds": 1_700_000_000, "nanoseconds": 0 }),
    );
    fields.insert("updatedAt".into(), json!(1_700_000_000_123i64));
    ax.content.seed("media", fields);

    let (status, body) = send(&ax.router, get("/content/media")).await;
    assert_eq!(status, StatusCode::OK);
    let item = &body["data"][0];
    assert_eq!(item["createdAt"], "2023-11-14T22:13:20.000Z");
    assert_eq!(item["updatedAt"], "2023-11-14T22:13:20.123Z");
    assert_eq!(item["category"], "general");
    assert_eq!(item["views"], 0);
}

#[tokio::test]
async fn admin_routes_require_the_configured_token() {
    let ax = build_with_token(Some("s3cret"));

    let (status, body) = send(&ax.router, video_form("Intro").request("POST", "/content/media")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
    assert!(ax.blobs.calls().is_empty());

    let mut req = video_form("Intro").request("POST", "/content/media");
    req.headers_mut()
        .insert(header::AUTHORIZATION, "Bearer s3creT".parse().unwrap());
    let (status, _) = send(&ax.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(ax.blobs.calls().is_empty());

    let mut req = video_form("Intro").request("POST", "/content/media");
    req.headers_mut()
        .insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
    let (status, _) = send(&ax.router, req).await;
    assert_eq!(status, StatusCode::CREATED);

    // Public listing stays open.
    let (status, _) = send(&ax.router, get("/content/media")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&ax.router, get("/messages")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn contact_messages_are_validated_and_listed() {
    let ax = build();
    let message = json!({
        "name": "Ada",
        "email": "ada@example.com",
        "phone": "+229 000",
        "interest": "Solar audit",
        "budget": "5k",
        "country": "Benin",
        "message": "Hello"
    });

    let (status, body) = send(&ax.router, json_request("POST", "/messages", message.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], "Ada");
    assert!(body["data"]["createdAt"].is_string());

    let mut incomplete = message.clone();
    incomplete["phone"] = json!("   ");
    let (status, body) = send(&ax.router, json_request("POST", "/messages", incomplete)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "phone is required");

    let mut bad_email = message;
    bad_email["email"] = json!("ada-at-example");
    let (status, _) = send(&ax.router, json_request("POST", "/messages", bad_email)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&ax.router, get("/messages")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn subscribers_are_unique_by_email() {
    let ax = build();
    let (status, first) = send(
        &ax.router,
        json_request("POST", "/subscribers", json!({ "email": "a@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = first["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &ax.router,
        json_request("POST", "/subscribers", json!({ "email": "a@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "conflict");

    send(
        &ax.router,
        json_request("POST", "/subscribers", json!({ "email": "b@example.com" })),
    )
    .await;

    // Keeping one's own address is fine; taking another's is not.
    let uri = format!("/subscribers/{id}");
    let (status, body) = send(
        &ax.router,
        json_request("PUT", &uri, json!({ "email": "a@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "a@example.com");

    let (status, _) = send(
        &ax.router,
        json_request("PUT", &uri, json!({ "email": "b@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &ax.router,
        json_request("PUT", "/subscribers/missing", json!({ "email": "c@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let del = Request::builder()
        .method("DELETE")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&ax.router, del).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&ax.router, get("/subscribers")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["email"], "b@example.com");
}

#[tokio::test]
async fn newsletter_sign_up_dedupes() {
    let ax = build();
    let req = || json_request("POST", "/newsletter", json!({ "email": "n@example.com" }));

    let (status, body) = send(&ax.router, req()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["data"]["subscribedAt"].is_string());

    let (status, _) = send(&ax.router, req()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &ax.router,
        json_request("POST", "/newsletter", json!({ "email": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn disk_blobs_are_served_back() {
    let dir = tempfile::tempdir().unwrap();
    let content = MemoryContentStore::new();
    let disk = DiskBlobStore::new(dir.path(), "http://localhost:3000");
    let router = app(AppState::with_disk_blobs(
        Arc::new(content),
        disk,
        PipelinePolicy::default(),
    ));

    let req = Form::new()
        .text("name", "Resume")
        .file("file", "cv.pdf", "application/pdf", b"%PDF-1.7 tiny")
        .request("POST", "/content/vitae");
    let (status, body) = send(&router, req).await;
    assert_eq!(status, StatusCode::CREATED);

    let url = body["data"]["file"].as_str().unwrap();
    let path = url.strip_prefix("http://localhost:3000").unwrap();
    let res = router.clone().oneshot(get(path)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/pdf");
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"%PDF-1.7 tiny");

    let (status, _) = send(&router, get("/blobs/vitae/missing.pdf")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
