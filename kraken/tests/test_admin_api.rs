use std::{sync::Arc, time::Duration};

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::json;
use tempfile::tempdir;
use tower::ServiceExt;

use kraken::{
    fileserver::LocalFileServerFactory,
    mount::mount_id,
    pool::ServerPool,
    server::{create_router, AdminState, ApiError, MountData, ServerData, API_INTERNAL_ERROR},
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const START_TIMEOUT: Duration = Duration::from_secs(5);

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_admin_api_server_lifecycle() -> anyhow::Result<()> {
    let (pool, app) = new_app();
    let runner = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.run().await }
    });

    let (status, headers, body) = send(
        &app,
        Method::POST,
        "/api/servers",
        Some(json!({ "bind_address": "127.0.0.1" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let created: ServerData = serde_json::from_slice(&body)?;
    assert_ne!(created.port, 0);
    assert_eq!(created.bind_address, "127.0.0.1");
    assert!(created.mounts.is_empty());
    assert_eq!(
        headers.get(header::LOCATION).map(|v| v.as_bytes()),
        Some(format!("/api/servers/{}", created.port).as_bytes())
    );

    let (status, _, body) = send(&app, Method::GET, "/api/servers", None).await?;
    assert_eq!(status, StatusCode::OK);
    let servers: Vec<ServerData> = serde_json::from_slice(&body)?;
    assert_eq!(servers, vec![created.clone()]);

    let uri = format!("/api/servers/{}", created.port);
    let (status, _, body) = send(&app, Method::GET, &uri, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<ServerData>(&body)?, created);

    // The port is taken by the server just created.
    let (status, _, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(json!({ "bind_address": "127.0.0.1" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = send(&app, Method::DELETE, &uri, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<ServerData>(&body)?.port, created.port);

    let (status, _, body) = send(&app, Method::GET, &uri, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, format!("server {} not found", created.port));

    let (status, _, body) = send(&app, Method::DELETE, "/api/servers", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Vec<ServerData>>(&body)?, vec![]);

    pool.shutdown();
    runner.await??;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_admin_api_create_server_on_explicit_port() -> anyhow::Result<()> {
    let (pool, app) = new_app();
    let runner = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.run().await }
    });

    // Find a free port, then release it for the server.
    let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();

    let (status, _, body) = send(
        &app,
        Method::PUT,
        &format!("/api/servers/{port}"),
        Some(json!({ "bind_address": "127.0.0.1" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<ServerData>(&body)?.port, port);

    let (status, _, body) = send(&app, Method::DELETE, "/api/servers", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Vec<ServerData>>(&body)?.len(), 1);
    assert!(pool.list().await.is_empty());

    pool.shutdown();
    runner.await??;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_admin_api_mounts() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (pool, app) = new_app();
    let runner = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.run().await }
    });

    let (_, _, body) = send(
        &app,
        Method::POST,
        "/api/servers",
        Some(json!({ "bind_address": "127.0.0.1" })),
    )
    .await?;
    let port = serde_json::from_slice::<ServerData>(&body)?.port;
    let mounts_uri = format!("/api/servers/{port}/mounts");

    let (status, headers, body) = send(
        &app,
        Method::POST,
        &mounts_uri,
        Some(json!({ "target": "/docs", "source": dir.path() })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let mount: MountData = serde_json::from_slice(&body)?;
    assert_eq!(mount.id, mount_id("/docs"));
    assert_eq!(mount.target, "/docs");
    assert_eq!(mount.source, dir.path());
    let mount_uri = format!("{mounts_uri}/{}", mount.id);
    assert_eq!(
        headers.get(header::LOCATION).map(|v| v.as_bytes()),
        Some(mount_uri.as_bytes())
    );

    let (status, _, body) = send(&app, Method::GET, &mounts_uri, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_slice::<Vec<MountData>>(&body)?,
        vec![mount.clone()]
    );

    let (status, _, body) = send(&app, Method::GET, &mount_uri, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<MountData>(&body)?, mount);

    let (status, _, body) =
        send(&app, Method::GET, &format!("/api/servers/{port}"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_slice::<ServerData>(&body)?.mounts,
        vec![mount.clone()]
    );

    let (status, _, body) = send(&app, Method::DELETE, &mount_uri, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<MountData>(&body)?, mount);

    let (status, _, _) = send(&app, Method::GET, &mount_uri, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(
        &app,
        Method::POST,
        &mounts_uri,
        Some(json!({ "target": "/a", "source": dir.path() })),
    )
    .await?;
    send(
        &app,
        Method::POST,
        &mounts_uri,
        Some(json!({ "target": "/b", "source": dir.path(), "fs_type": "raw" })),
    )
    .await?;
    let (status, _, body) = send(&app, Method::DELETE, &mounts_uri, None).await?;
    assert_eq!(status, StatusCode::OK);
    let removed: Vec<MountData> = serde_json::from_slice(&body)?;
    let targets: Vec<_> = removed.iter().map(|m| m.target.as_str()).collect();
    assert_eq!(targets, vec!["/a", "/b"]);

    pool.shutdown();
    runner.await??;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_admin_api_rejects_bad_requests() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (pool, app) = new_app();
    let runner = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.run().await }
    });

    let (_, _, body) = send(
        &app,
        Method::POST,
        "/api/servers",
        Some(json!({ "bind_address": "127.0.0.1" })),
    )
    .await?;
    let port = serde_json::from_slice::<ServerData>(&body)?.port;
    let mounts_uri = format!("/api/servers/{port}/mounts");

    for mount in [
        json!({ "target": "docs", "source": dir.path() }),
        json!({ "target": "/docs/", "source": dir.path() }),
        json!({ "target": "/docs", "source": "relative/path" }),
        json!({ "target": "/docs", "source": dir.path().join("missing") }),
        json!({ "target": "/docs", "source": dir.path(), "fs_type": "ftp" }),
        json!({ "target": "/docs", "source": dir.path(), "fs_params": { "bogus": "1" } }),
        json!({ "source": dir.path() }),
    ] {
        let (status, _, body) = send(&app, Method::POST, &mounts_uri, Some(mount.clone())).await?;
        assert_eq!(
            status,
            StatusCode::BAD_REQUEST,
            "{mount}: {}",
            String::from_utf8_lossy(&body)
        );
    }

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/servers")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{"))?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app, Method::GET, "/api/servers/not-a-port", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/api/servers",
        Some(json!({ "bind_address": "[::1" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app, Method::GET, "/api/servers/1/mounts", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(
        &app,
        Method::GET,
        &format!("/api/servers/{port}/mounts/0000000"),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    pool.shutdown();
    runner.await??;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_admin_api_create_server_without_running_pool() -> anyhow::Result<()> {
    let (pool, app) = new_app();

    // Nothing starts the server, so waiting for it times out.
    let state = AdminState::new(Arc::clone(&pool), Duration::from_millis(100));
    let impatient = create_router(state);
    let (status, _, body) = send(
        &impatient,
        Method::POST,
        "/api/servers",
        Some(json!({ "bind_address": "127.0.0.1" })),
    )
    .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error: ApiError = serde_json::from_slice(&body)?;
    assert_eq!(error.kind, API_INTERNAL_ERROR);
    assert!(pool.list().await.is_empty());

    let (status, _, body) = send(&app, Method::GET, "/api/fileservers", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_slice::<Vec<String>>(&body)?,
        vec!["default", "raw"]
    );

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn new_app() -> (Arc<ServerPool>, Router) {
    let pool = Arc::new(ServerPool::new(Arc::new(LocalFileServerFactory)));
    let app = create_router(AdminState::new(Arc::clone(&pool), START_TIMEOUT));
    (pool, app)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> anyhow::Result<(StatusCode, HeaderMap, Bytes)> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await?.to_bytes();

    Ok((status, headers, body))
}
