//! HTTP request handlers for the admin API.
//!
//! This module implements the handlers for each API endpoint. The handlers coordinate with the
//! [`ServerPool`] and the mount tables of its servers to perform the requested operations.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::{
    state::AdminState,
    types::{ApiError, CreateMountRequest, CreateServerRequest, MountData, ServerData},
};
use crate::{
    config::BindAddr,
    mount::{mount_id, MountEntry},
    pool::{ServerInstance, ServerPool},
    KrakenError,
};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// An admin API failure, turned into a response.
#[derive(Debug)]
pub enum AdminError {
    /// The request is malformed or was refused; answered 400 with a plain-text body
    BadRequest(String),

    /// The server or mount does not exist; answered 404 with a plain-text body
    NotFound(String),

    /// The operation failed; answered 500 with an [`ApiError`] body
    Internal(ApiError),
}

type AdminResult<T> = Result<T, AdminError>;

//-------------------------------------------------------------------------------------------------
// Functions: Handlers
//-------------------------------------------------------------------------------------------------

/// Handler for GET /api/servers
pub async fn list_servers(State(state): State<AdminState>) -> Json<Vec<ServerData>> {
    Json(snapshot_all(&state.get_pool().list().await).await)
}

/// Handler for POST /api/servers
///
/// Creates a server on a port picked by the operating system.
pub async fn create_server_with_random_port(
    State(state): State<AdminState>,
    body: Result<Json<CreateServerRequest>, JsonRejection>,
) -> AdminResult<Response> {
    let Json(req) = body?;
    let server = start_new_server(&state, BindAddr::new(req.bind_address, 0)).await?;
    let data = ServerData::from_instance(&server).await;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, server_location(data.port))],
        Json(data),
    )
        .into_response())
}

/// Handler for DELETE /api/servers
///
/// Removes every server and returns them.
pub async fn remove_servers(State(state): State<AdminState>) -> AdminResult<Json<Vec<ServerData>>> {
    match state.get_pool().remove_all().await {
        Ok(removed) => Ok(Json(snapshot_all(&removed).await)),
        Err(e) => {
            tracing::error!("failed to remove servers: {}", e);
            Err(AdminError::Internal(ApiError::internal(e.to_string())))
        }
    }
}

/// Handler for GET /api/servers/{port}
pub async fn get_server(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
) -> AdminResult<Json<ServerData>> {
    let server = find_server(state.get_pool(), port).await?;
    Ok(Json(ServerData::from_instance(&server).await))
}

/// Handler for PUT /api/servers/{port}
///
/// Creates a server on the given port.
pub async fn create_server(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
    body: Result<Json<CreateServerRequest>, JsonRejection>,
) -> AdminResult<Json<ServerData>> {
    let Json(req) = body?;
    if port == 0 {
        return Err(AdminError::BadRequest("port must not be 0".to_string()));
    }

    let server = start_new_server(&state, BindAddr::new(req.bind_address, port)).await?;
    Ok(Json(ServerData::from_instance(&server).await))
}

/// Handler for DELETE /api/servers/{port}
pub async fn remove_server(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
) -> AdminResult<Json<ServerData>> {
    let server = find_server(state.get_pool(), port).await?;
    let data = ServerData::from_instance(&server).await;

    if !state
        .get_pool()
        .remove_instance(&server)
        .await
        .map_err(AdminError::internal)?
    {
        tracing::warn!("server on port {} was removed concurrently", port);
    }

    Ok(Json(data))
}

/// Handler for GET /api/servers/{port}/mounts
pub async fn list_mounts(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
) -> AdminResult<Json<Vec<MountData>>> {
    let server = find_server(state.get_pool(), port).await?;
    let entries = server.get_mounts().entries().await;
    Ok(Json(entries.into_iter().map(MountData::from).collect()))
}

/// Handler for POST /api/servers/{port}/mounts
///
/// Mounts a directory, replacing any mount of the same target.
pub async fn create_mount(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
    body: Result<Json<CreateMountRequest>, JsonRejection>,
) -> AdminResult<Response> {
    let Json(req) = body?;
    let server = find_server(state.get_pool(), port).await?;

    server
        .get_mounts()
        .put(&req.target, &req.source, &req.fs_type, &req.fs_params)
        .await?;

    let data = MountData::from(MountEntry {
        target: req.target,
        source: req.source,
    });

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, mount_location(port, &data.id))],
        Json(data),
    )
        .into_response())
}

/// Handler for DELETE /api/servers/{port}/mounts
///
/// Removes every mount of a server and returns them.
pub async fn remove_mounts(
    State(state): State<AdminState>,
    Path(port): Path<u16>,
) -> AdminResult<Json<Vec<MountData>>> {
    let server = find_server(state.get_pool(), port).await?;
    let removed = server.get_mounts().clear().await;
    Ok(Json(removed.into_iter().map(MountData::from).collect()))
}

/// Handler for GET /api/servers/{port}/mounts/{id}
pub async fn get_mount(
    State(state): State<AdminState>,
    Path((port, id)): Path<(u16, String)>,
) -> AdminResult<Json<MountData>> {
    let server = find_server(state.get_pool(), port).await?;
    let entry = find_mount(&server, &id).await?;
    Ok(Json(entry.into()))
}

/// Handler for DELETE /api/servers/{port}/mounts/{id}
pub async fn remove_mount(
    State(state): State<AdminState>,
    Path((port, id)): Path<(u16, String)>,
) -> AdminResult<Json<MountData>> {
    let server = find_server(state.get_pool(), port).await?;
    let entry = find_mount(&server, &id).await?;

    if !server.get_mounts().delete(&entry.target).await {
        return Err(mount_not_found(port, &id));
    }

    Ok(Json(entry.into()))
}

/// Handler for GET /api/fileservers
///
/// Lists the file server backend types mounts can use.
pub async fn list_fileservers(State(state): State<AdminState>) -> Json<Vec<String>> {
    Json(state.get_pool().factory().types())
}

//-------------------------------------------------------------------------------------------------
// Functions: Helpers
//-------------------------------------------------------------------------------------------------

/// Registers a server for `addr`, starts it and waits until it is bound.
///
/// A server that does not start is unregistered again.
async fn start_new_server(
    state: &AdminState,
    addr: BindAddr,
) -> AdminResult<Arc<ServerInstance>> {
    let pool = state.get_pool();
    let server = pool.add(&addr.to_string()).await?;

    let started = if pool.start_server(&server).await {
        server
            .wait_started(*state.get_start_timeout())
            .await
            .map(|_| ())
    } else {
        Err(KrakenError::NotStarted(addr.to_string()))
    };

    if let Err(e) = started {
        tracing::error!("server for {} did not start: {}", addr, e);
        if let Err(remove_err) = pool.remove_instance(&server).await {
            tracing::error!("failed to remove server for {}: {}", addr, remove_err);
        }
        return Err(e.into());
    }

    Ok(server)
}

async fn find_server(pool: &ServerPool, port: u16) -> AdminResult<Arc<ServerInstance>> {
    pool.get(port)
        .await
        .ok_or_else(|| AdminError::NotFound(format!("server {port} not found")))
}

async fn find_mount(server: &ServerInstance, id: &str) -> AdminResult<MountEntry> {
    server
        .get_mounts()
        .entries()
        .await
        .into_iter()
        .find(|entry| mount_id(&entry.target) == id)
        .ok_or_else(|| mount_not_found(server.port(), id))
}

async fn snapshot_all(servers: &[Arc<ServerInstance>]) -> Vec<ServerData> {
    let mut data = Vec::with_capacity(servers.len());
    for server in servers {
        data.push(ServerData::from_instance(server).await);
    }
    data
}

fn mount_not_found(port: u16, id: &str) -> AdminError {
    AdminError::NotFound(format!("mount {id} not found on server {port}"))
}

fn server_location(port: u16) -> String {
    format!("/api/servers/{port}")
}

fn mount_location(port: u16, id: &str) -> String {
    format!("/api/servers/{port}/mounts/{id}")
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl AdminError {
    fn internal(error: KrakenError) -> Self {
        AdminError::Internal(ApiError::internal(error.to_string()))
    }
}

//-------------------------------------------------------------------------------------------------
// Trait Implementations
//-------------------------------------------------------------------------------------------------

impl From<KrakenError> for AdminError {
    fn from(error: KrakenError) -> Self {
        if error.is_client_error() {
            AdminError::BadRequest(error.to_string())
        } else {
            AdminError::internal(error)
        }
    }
}

impl From<JsonRejection> for AdminError {
    fn from(rejection: JsonRejection) -> Self {
        AdminError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        match self {
            AdminError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AdminError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            AdminError::Internal(error) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
            }
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------
