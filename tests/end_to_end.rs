//! Upload through the intake, then download through the gateway

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use grammers_session::{PackedChat, PackedType};
use std::sync::Arc;
use tgrelay::bot::Intake;
use tgrelay::crypto::LinkSecret;
use tgrelay::link::LinkBuilder;
use tgrelay::server::{router, AppState};
use tgrelay::storage::{MemoryStore, StorageChannel, Upload};
use tower::ServiceExt;

const BASE_URL: &str = "https://files.example.org";

fn report_upload() -> Upload {
    Upload {
        chat: PackedChat {
            ty: PackedType::User,
            id: 1001,
            access_hash: Some(42),
        },
        message_id: 5,
        file_name: "report.pdf".to_string(),
        size: 14,
    }
}

/// Pull the gateway path out of the reply text
fn link_path(reply: &str) -> String {
    let start = reply.find(BASE_URL).expect("reply carries a link") + BASE_URL.len();
    reply[start..]
        .split_whitespace()
        .next()
        .expect("link is followed by whitespace or ends the reply")
        .to_string()
}

async fn get(app: axum::Router, uri: &str) -> axum::response::Response {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(req).await.unwrap()
}

#[tokio::test]
async fn upload_then_download() {
    let store = Arc::new(MemoryStore::new(100));
    let upload = report_upload();
    store.stage(&upload, "%PDF-1.7 bytes");

    let storage: Arc<dyn StorageChannel> = store.clone();
    let intake = Intake::new(
        storage.clone(),
        LinkBuilder::new(BASE_URL, LinkSecret::from("integration-secret")),
        3000,
    );
    let app = router(AppState::new(storage, LinkSecret::from("integration-secret")));

    let reply = intake.handle_upload(&upload).await;
    let path = link_path(reply.text());
    assert!(path.starts_with("/stream/"));
    assert!(path.ends_with("/100/report.pdf"));
    assert_eq!(store.len(), 1);

    let resp = get(app.clone(), &path).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"report.pdf\""
    );
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body.as_ref(), b"%PDF-1.7 bytes");

    // Same token, neighbouring message
    let forged = path.replace("/100/", "/101/");
    let resp = get(app, &forged).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn link_from_another_deployment_is_rejected() {
    let store = Arc::new(MemoryStore::new(100));
    let upload = report_upload();
    store.stage(&upload, "content");

    let storage: Arc<dyn StorageChannel> = store.clone();
    let intake = Intake::new(
        storage.clone(),
        LinkBuilder::new(BASE_URL, LinkSecret::from("old-secret")),
        3000,
    );
    let app = router(AppState::new(storage, LinkSecret::from("rotated-secret")));

    let reply = intake.handle_upload(&upload).await;
    let resp = get(app, &link_path(reply.text())).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unstaged_upload_reports_error_to_user() {
    let storage: Arc<dyn StorageChannel> = Arc::new(MemoryStore::new(100));
    let intake = Intake::new(
        storage,
        LinkBuilder::new(BASE_URL, LinkSecret::from("k")),
        3000,
    );

    let reply = intake.handle_upload(&report_upload()).await;
    assert!(reply.text().starts_with("Error processing your file:"));
    assert!(!reply.text().contains(BASE_URL));
}
