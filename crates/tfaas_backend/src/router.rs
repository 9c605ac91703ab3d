use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::Arc,
};

use axum::{
    extract::{
        Path,
        Query,
        State,
    },
    response::{
        IntoResponse,
        Response,
    },
    routing::{
        get,
        post,
    },
    Json,
    Router,
};
use bytes::Bytes;
use common::http::HttpResponseError;
use http::{
    HeaderMap,
    StatusCode,
};
use manager::{
    ManagementService,
    Mount,
};
use rproxy::{
    CallStatus,
    RProxy,
    TFAAS_ID_HEADER,
    TFAAS_SYNC_HEADER,
};
use serde::Deserialize;

#[derive(Clone)]
pub struct IngressState {
    pub rproxy: Arc<RProxy>,
}

#[derive(Clone)]
pub struct ManagementState {
    pub manager: Arc<ManagementService>,
}

/// Function traffic: `POST /{name}` with an opaque payload. Synchronous when
/// the sync header is present, deferred otherwise.
pub fn ingress_router(st: IngressState) -> Router {
    Router::new().route("/{name}", post(invoke)).with_state(st)
}

async fn invoke(
    State(st): State<IngressState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let is_async = !headers.contains_key(TFAAS_SYNC_HEADER);
    let id = headers
        .get(TFAAS_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    tracing::info!("have request for path: {name} (async: {is_async}, id: {id})");

    let (status, body) = st.rproxy.call(&name, body, id, is_async).await;
    match status {
        CallStatus::Ok => (StatusCode::OK, body.unwrap_or_default()).into_response(),
        CallStatus::Accepted => StatusCode::ACCEPTED.into_response(),
        CallStatus::NotFound => StatusCode::NOT_FOUND.into_response(),
        CallStatus::Error => {
            (StatusCode::INTERNAL_SERVER_ERROR, body.unwrap_or_default()).into_response()
        },
    }
}

pub fn management_router(st: ManagementState) -> Router {
    Router::new()
        .route("/upload", post(upload))
        .route("/delete", post(delete))
        .route("/list", get(list))
        .route("/wipe", post(wipe))
        .route("/logs", get(logs))
        .with_state(st)
}

#[derive(Deserialize)]
pub struct UploadRequest {
    name: String,
    env: String,
    threads: usize,
    zip: String,
    #[serde(default)]
    envs: Vec<String>,
    #[serde(default)]
    mounts: Vec<MountRequest>,
}

#[derive(Deserialize)]
struct MountRequest {
    mount_dir: PathBuf,
    mount_target: String,
    #[serde(default)]
    mount_rw: bool,
}

async fn upload(
    State(st): State<ManagementState>,
    Json(req): Json<UploadRequest>,
) -> Result<String, HttpResponseError> {
    tracing::info!(
        "got request to upload function: name {} env {} threads {} bytes {}",
        req.name,
        req.env,
        req.threads,
        req.zip.len()
    );

    let mut envs = BTreeMap::new();
    for e in &req.envs {
        let Some((k, v)) = e.split_once('=') else {
            tracing::warn!("invalid env: {e}");
            continue;
        };
        envs.insert(k.to_owned(), v.to_owned());
    }

    let mounts = req
        .mounts
        .into_iter()
        .map(|m| Mount {
            dir: m.mount_dir,
            target: m.mount_target,
            rw: m.mount_rw,
        })
        .collect();

    let url = st
        .manager
        .upload(&req.name, &req.env, req.threads, &req.zip, envs, mounts)
        .await?;
    Ok(url)
}

#[derive(Deserialize)]
pub struct DeleteRequest {
    name: String,
}

async fn delete(
    State(st): State<ManagementState>,
    Json(req): Json<DeleteRequest>,
) -> Result<StatusCode, HttpResponseError> {
    tracing::info!("got request to delete function: {}", req.name);
    st.manager.delete(&req.name).await?;
    Ok(StatusCode::OK)
}

async fn list(State(st): State<ManagementState>) -> String {
    st.manager
        .list()
        .await
        .into_iter()
        .map(|name| format!("{name}\n"))
        .collect()
}

async fn wipe(State(st): State<ManagementState>) -> Result<StatusCode, HttpResponseError> {
    st.manager.wipe().await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
pub struct LogsQuery {
    name: Option<String>,
}

async fn logs(
    State(st): State<ManagementState>,
    Query(query): Query<LogsQuery>,
) -> Result<String, HttpResponseError> {
    match query.name {
        Some(name) => Ok(st.manager.logs_function(&name).await?),
        None => Ok(st.manager.logs().await?),
    }
}
