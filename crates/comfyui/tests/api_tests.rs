//! REST client and artifact fetcher against a mocked ComfyUI server.

use assert_matches::assert_matches;
use comfygen_comfyui::{fetch_artifact, ComfyUIApi, ComfyUIApiError};
use comfygen_core::manifest::{ArtifactRef, StorageClass};
use comfygen_core::MediaKind;
use serde_json::{json, Map};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn artifact(filename: &str, storage_class: StorageClass) -> ArtifactRef {
    ArtifactRef {
        filename: filename.to_string(),
        subfolder: String::new(),
        storage_class,
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_returns_job_handle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .and(body_partial_json(json!({"client_id": "client-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "prompt_id": "prompt-1", "number": 4, "node_errors": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = ComfyUIApi::new(server.uri());
    let mut graph = Map::new();
    graph.insert("1".into(), json!({"class_type": "SaveImage", "inputs": {}}));

    let handle = api.submit_workflow(&graph, "client-1").await.unwrap();
    assert_eq!(handle.prompt_id, "prompt-1");
    assert_eq!(handle.client_id, "client-1");
    assert_eq!(handle.number, Some(4));
}

#[tokio::test]
async fn submit_without_prompt_id_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "no"})))
        .mount(&server)
        .await;

    let result = ComfyUIApi::new(server.uri()).submit_workflow(&Map::new(), "c").await;
    assert_matches!(result, Err(ComfyUIApiError::Protocol(_)));
}

#[tokio::test]
async fn submit_rejected_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid prompt"))
        .expect(1)
        .mount(&server)
        .await;

    let result = ComfyUIApi::new(server.uri()).submit_workflow(&Map::new(), "c").await;
    assert_matches!(result, Err(ComfyUIApiError::ApiError { status: 400, .. }));
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_direct_hit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .and(query_param("filename", "ComfyUI_00001_.png"))
        .and(query_param("type", "output"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let api = ComfyUIApi::new(server.uri());
    let fetched = fetch_artifact(&api, &artifact("ComfyUI_00001_.png", StorageClass::Output))
        .await
        .unwrap();
    assert_eq!(fetched.bytes, b"png-bytes");
    assert_eq!(fetched.filename, "ComfyUI_00001_.png");
    assert_eq!(fetched.media_kind, MediaKind::Image);
}

#[tokio::test]
async fn fetch_falls_back_to_temp_storage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .and(query_param("type", "output"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .and(query_param("type", "temp"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"temp-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let api = ComfyUIApi::new(server.uri());
    let fetched = fetch_artifact(&api, &artifact("clip.mp4", StorageClass::Output))
        .await
        .unwrap();
    assert_eq!(fetched.bytes, b"temp-bytes");
    assert_eq!(fetched.media_kind, MediaKind::Video);
}

#[tokio::test]
async fn fetch_falls_back_to_history_search() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .and(query_param("filename", "ComfyUI_00009_.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "p-old": {"outputs": {"9": {"images": [{"filename": "ComfyUI_00001_.png", "subfolder": "", "type": "output"}]}}},
            "p-new": {"outputs": {"9": {"images": [{"filename": "ComfyUI_00008_.png", "subfolder": "run", "type": "output"}]}}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .and(query_param("filename", "ComfyUI_00008_.png"))
        .and(query_param("subfolder", "run"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"found".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let api = ComfyUIApi::new(server.uri());
    let fetched = fetch_artifact(&api, &artifact("ComfyUI_00009_.png", StorageClass::Output))
        .await
        .unwrap();
    assert_eq!(fetched.filename, "ComfyUI_00008_.png");
    assert_eq!(fetched.bytes, b"found");
}

#[tokio::test]
async fn exhausted_chain_returns_original_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .and(query_param("type", "temp"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .and(query_param("type", "output"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .expect(1)
        .mount(&server)
        .await;

    let api = ComfyUIApi::new(server.uri());
    let result = fetch_artifact(&api, &artifact("custom_name.png", StorageClass::Output)).await;
    assert_matches!(result, Err(ComfyUIApiError::ApiError { status: 404, .. }));
}
