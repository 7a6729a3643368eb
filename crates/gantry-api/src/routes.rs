//! HTTP surface of the hub: RPC mounts plus the plain routes.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use gantry_core::{WorkItem, WorkSpec};
use gantry_rpc::wire::{Announce, AnnounceReply, BuilderResponse, DispatchResponse, RunnerResponse, WorkerKey};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::services::{ResponseService, TrackerService, queue_work};
use crate::{AppState, notifications};

/// Build the hub router.
pub fn router(state: AppState) -> Router {
    let response = ResponseService::new(state.clone());
    let tracker = TrackerService::new(state.clone());

    Router::new()
        .route("/work", post(add_work))
        .route("/notifications/dispatch", get(dispatch_notifications))
        .route("/health", get(health))
        .with_state(state)
        .nest("/rpc/response", response_rpc(response).into_service())
        .nest("/rpc/tracker", tracker_rpc(tracker).into_service())
}

fn response_rpc(svc: ResponseService) -> gantry_rpc::Router {
    gantry_rpc::Router::new()
        .register("Response.Post", {
            let svc = svc.clone();
            move |args: RunnerResponse| {
                let svc = svc.clone();
                async move { svc.post(args).await.map_err(|e| e.to_string()) }
            }
        })
        .register("Response.Error", {
            let svc = svc.clone();
            move |args: BuilderResponse| {
                let svc = svc.clone();
                async move { svc.error(args).await.map_err(|e| e.to_string()) }
            }
        })
        .register("Response.DispatchError", {
            let svc = svc.clone();
            move |args: DispatchResponse| {
                let svc = svc.clone();
                async move { svc.dispatch_error(args).await.map_err(|e| e.to_string()) }
            }
        })
}

fn tracker_rpc(svc: TrackerService) -> gantry_rpc::Router {
    gantry_rpc::Router::new()
        .register("Tracker.Announce", {
            let svc = svc.clone();
            move |args: Announce| {
                let svc = svc.clone();
                async move {
                    svc.announce(args.kind, args.url)
                        .await
                        .map(|key| AnnounceReply { key })
                        .map_err(|e| e.to_string())
                }
            }
        })
        .register("Tracker.Remove", {
            let svc = svc.clone();
            move |args: WorkerKey| {
                let svc = svc.clone();
                async move { svc.remove(args.key).await.map_err(|e| e.to_string()) }
            }
        })
        .register("Tracker.Ping", {
            let svc = svc.clone();
            move |args: WorkerKey| {
                let svc = svc.clone();
                async move { svc.ping(args.key).await.map_err(|e| e.to_string()) }
            }
        })
        .register("Tracker.LeasePair", {
            let svc = svc.clone();
            move |_args: ()| {
                let svc = svc.clone();
                async move { svc.lease_pair().await.map_err(|e| e.to_string()) }
            }
        })
}

async fn add_work(
    State(state): State<AppState>,
    Json(spec): Json<WorkSpec>,
) -> Result<Json<WorkItem>, ApiError> {
    let item = queue_work(&state, spec).await?;
    Ok(Json(item))
}

async fn dispatch_notifications(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sent = notifications::dispatch_waiting(&state).await?;
    Ok(Json(json!({ "sent": sent })))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
