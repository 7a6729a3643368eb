//! HTTP surface of the builder: per-attempt callback routes and the queue
//! RPC mount.
//!
//! Callback URLs carry the attempt id directly in the path with no
//! signature; the live registry is the only gate. An unknown id gets a 404
//! and mutates nothing.

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use gantry_core::ResourceId;
use gantry_rpc::wire::LeasedWork;
use serde_json::{Value, json};
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::queue::TaskQueue;
use crate::registry::ActiveRegistry;

#[derive(Clone)]
struct WorkerState {
    registry: ActiveRegistry,
}

/// Build the builder router.
pub fn router(registry: ActiveRegistry, queue: TaskQueue) -> Router {
    Router::new()
        .route("/test/{id}/binary", get(fetch_binary))
        .route("/test/{id}/response", post(report_response))
        .route("/test/{id}/error", post(report_error))
        .route("/health", get(health))
        .with_state(WorkerState { registry })
        .nest("/rpc/queue", queue_rpc(queue).into_service())
}

fn queue_rpc(queue: TaskQueue) -> gantry_rpc::Router {
    gantry_rpc::Router::new()
        .register("Queue.Push", {
            let queue = queue.clone();
            move |work: LeasedWork| {
                let queue = queue.clone();
                async move {
                    queue.push(work);
                    Ok::<_, String>(())
                }
            }
        })
        .register("Queue.Items", {
            let queue = queue.clone();
            move |_args: ()| {
                let queue = queue.clone();
                async move { Ok::<_, String>(queue.items().await) }
            }
        })
}

/// The runner fetches its binary here, streamed straight from disk; a
/// successful fetch marks the attempt Running.
async fn fetch_binary(
    State(state): State<WorkerState>,
    Path(id): Path<ResourceId>,
) -> Result<Response, StatusCode> {
    let Some(path) = state.registry.binary_path(id) else {
        warn!(attempt = %id, "binary requested for unknown attempt");
        return Err(StatusCode::NOT_FOUND);
    };
    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        warn!(attempt = %id, path = %path.display(), error = %e, "couldn't open binary");
        StatusCode::NOT_FOUND
    })?;
    state.registry.start(id);

    let body = Body::from_stream(ReaderStream::new(file));
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response())
}

async fn report_response(
    State(state): State<WorkerState>,
    Path(id): Path<ResourceId>,
    body: String,
) -> StatusCode {
    if state.registry.finish(id, body) {
        StatusCode::OK
    } else {
        warn!(attempt = %id, "response for unknown attempt");
        StatusCode::NOT_FOUND
    }
}

async fn report_error(
    State(state): State<WorkerState>,
    Path(id): Path<ResourceId>,
    body: String,
) -> StatusCode {
    if state.registry.fail(id, body, false) {
        StatusCode::OK
    } else {
        warn!(attempt = %id, "error report for unknown attempt");
        StatusCode::NOT_FOUND
    }
}

async fn health() -> axum::Json<Value> {
    axum::Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ActiveTest, AttemptState};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use gantry_core::{TriggerConfig, Vcs, WorkSpec};
    use gantry_rpc::codec::{Codec, JsonCodec};
    use tower::ServiceExt;

    fn make_work() -> LeasedWork {
        LeasedWork {
            work_id: ResourceId::new(),
            attempt_id: ResourceId::new(),
            work_rev: 1,
            spec: WorkSpec {
                import_path: "github.com/acme/widget".to_string(),
                revision: "deadbeef".to_string(),
                revision_date: Utc::now(),
                subpackages: false,
                vcs: Vcs::Git,
            },
        }
    }

    #[tokio::test]
    async fn test_unknown_attempt_is_not_found() {
        let (registry, _done) = ActiveRegistry::new();
        let app = router(registry, TaskQueue::new());

        for (method, uri) in [
            ("GET", format!("/test/{}/binary", ResourceId::new())),
            ("POST", format!("/test/{}/response", ResourceId::new())),
            ("POST", format!("/test/{}/error", ResourceId::new())),
        ] {
            let resp = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .body(Body::from("x"))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_response_completes_attempt() {
        let (registry, mut done) = ActiveRegistry::new();
        let app = router(registry.clone(), TaskQueue::new());

        let work = make_work();
        let id = work.attempt_id;
        registry.insert(ActiveTest::new(
            work,
            "/tmp/widget.test".into(),
            TriggerConfig::default(),
        ));

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/test/{id}/response"))
                    .body(Body::from("ok\nPASS\n"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let completed = done.recv().await.unwrap();
        assert_eq!(completed.state, AttemptState::Finished);
        assert_eq!(completed.output, "ok\nPASS\n");
        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn test_binary_fetch_streams_file() {
        let (registry, _done) = ActiveRegistry::new();
        let app = router(registry.clone(), TaskQueue::new());

        let work = make_work();
        let id = work.attempt_id;
        let path = std::env::temp_dir().join(format!("gantry-binary-{id}"));
        tokio::fs::write(&path, b"fake test binary").await.unwrap();
        registry.insert(ActiveTest::new(work, path.clone(), TriggerConfig::default()));

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/test/{id}/binary"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"fake test binary");
        // The fetch marks the attempt Running, not complete.
        assert!(registry.contains(id));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_queue_rpc_push_and_items() {
        let (registry, _done) = ActiveRegistry::new();
        let queue = TaskQueue::new();
        let app = router(registry, queue.clone());

        let work = make_work();
        let codec = JsonCodec;
        let body = codec
            .encode_request("Queue.Push", &serde_json::to_value(&work).unwrap())
            .unwrap();
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/rpc/queue")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = codec.encode_request("Queue.Items", &Value::Null).unwrap();
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/rpc/queue")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let items: Vec<LeasedWork> =
            serde_json::from_value(codec.decode_response(&bytes).unwrap()).unwrap();
        assert_eq!(items, vec![work]);
    }
}
