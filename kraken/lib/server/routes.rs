//! Route definitions for the admin API.
//!
//! This module sets up the routing for the REST API endpoints.

use axum::{routing::get, Router};

use super::{handlers, state::AdminState};

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Creates a new router with all API endpoints configured
///
/// ## Arguments
/// * `state` - The shared admin state
pub fn create_router(state: AdminState) -> Router {
    Router::new()
        .route(
            "/api/servers",
            get(handlers::list_servers)
                .post(handlers::create_server_with_random_port)
                .delete(handlers::remove_servers),
        )
        .route(
            "/api/servers/{port}",
            get(handlers::get_server)
                .put(handlers::create_server)
                .delete(handlers::remove_server),
        )
        .route(
            "/api/servers/{port}/mounts",
            get(handlers::list_mounts)
                .post(handlers::create_mount)
                .delete(handlers::remove_mounts),
        )
        .route(
            "/api/servers/{port}/mounts/{id}",
            get(handlers::get_mount).delete(handlers::remove_mount),
        )
        .route("/api/fileservers", get(handlers::list_fileservers))
        .with_state(state)
}
