//! Integration tests for the HTTP front.
//!
//! Exercises the axum router end-to-end via `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use objattr_core::config::ObjattrConfig;
use objattr_core::server::{AppState, router};
use objattr_core::{
    AttributeError, ConlluTagger, ObjectAttribution, ObjectAttributor, Tagger, create_attributor,
};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const CONLLU: &str = "# text = Furry white rabbit\n\
    1\tFurry\tfurry\tADJ\t_\t_\t3\tamod\t_\t_\n\
    2\twhite\twhite\tADJ\t_\t_\t3\tamod\t_\t_\n\
    3\trabbit\trabbit\tNOUN\t_\t_\t0\troot\t_\t_\n";

/// Records the text it was given and echoes its length as a single object.
struct Recording {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectAttributor for Recording {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn attribute(&self, text: &str) -> objattr_core::Result<ObjectAttribution> {
        self.seen.lock().unwrap().push(text.to_string());
        if text.is_empty() {
            return Err(AttributeError::tagger("empty text"));
        }
        let mut result = ObjectAttribution::new();
        result.ensure_object(format!("len{}", text.chars().count()));
        Ok(result)
    }
}

async fn post_extract(app: axum::Router, body: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("POST")
        .uri("/extract")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = ServiceExt::<Request<Body>>::oneshot(app, req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let recording = Arc::new(Recording {
        seen: Mutex::new(Vec::new()),
    });
    let app = router(AppState::new(recording, 1024));
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = ServiceExt::<Request<Body>>::oneshot(app, req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!({"status": "ok"}));
}

#[tokio::test]
async fn test_extract_with_syntactic_attributor() {
    let tagger: Arc<dyn Tagger> = Arc::new(ConlluTagger::from_conllu(CONLLU).unwrap());
    let attributor = create_attributor(&ObjattrConfig::default(), Some(tagger), None).unwrap();
    let app = router(AppState::new(attributor, 1024));

    let (status, json) = post_extract(app, "\"Furry white rabbit\"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        serde_json::json!({
            "result": {"objects": {"rabbit": ["furry", "white"]}},
            "input_text_truncated": false
        })
    );
}

#[tokio::test]
async fn test_extract_truncates_long_input() {
    let recording = Arc::new(Recording {
        seen: Mutex::new(Vec::new()),
    });
    let app = router(AppState::new(recording.clone(), 10));

    let long = "a".repeat(25);
    let (status, json) = post_extract(app, &format!("\"{}\"", long)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["input_text_truncated"], true);
    assert_eq!(json["result"]["objects"]["len10"], serde_json::json!([]));
    assert_eq!(recording.seen.lock().unwrap()[0], "a".repeat(10));
}

#[tokio::test]
async fn test_extract_error_is_unprocessable() {
    let recording = Arc::new(Recording {
        seen: Mutex::new(Vec::new()),
    });
    let app = router(AppState::new(recording, 1024));

    let (status, json) = post_extract(app, "\"\"").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().unwrap().contains("empty text"));
}

#[tokio::test]
async fn test_extract_unknown_text_for_tagger() {
    let tagger: Arc<dyn Tagger> = Arc::new(ConlluTagger::from_conllu(CONLLU).unwrap());
    let attributor = create_attributor(&ObjattrConfig::default(), Some(tagger), None).unwrap();
    let app = router(AppState::new(attributor, 1024));

    let (status, _) = post_extract(app, "\"never tagged\"").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
