use std::{collections::BTreeMap, net::SocketAddr, sync::Arc, time::Duration};

use tempfile::tempdir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    task::JoinHandle,
};

use kraken::{
    fileserver::LocalFileServerFactory,
    pool::{ServerInstance, ServerPool},
    KrakenResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const TIMEOUT: Duration = Duration::from_secs(5);

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_server_pool_serves_mounted_files() -> anyhow::Result<()> {
    let dir = tempdir()?;
    std::fs::write(dir.path().join("hello.txt"), "hello kraken")?;

    let (pool, runner) = start_pool();
    let server = pool.add("127.0.0.1:0").await?;
    assert!(pool.start_server(&server).await);
    let addr = server.wait_started(TIMEOUT).await?;
    assert_ne!(addr.port(), 0);

    server
        .get_mounts()
        .put("/files", dir.path(), "default", &BTreeMap::new())
        .await?;

    let (status, head, body) = http_get(addr, "/files/hello.txt").await?;
    assert_eq!(status, 200, "{head}");
    assert_eq!(body, "hello kraken");

    let (status, head, _) = http_get(addr, "/files?x=1").await?;
    assert_eq!(status, 301);
    assert!(head.to_ascii_lowercase().contains("location: /files/"), "{head}");

    let (status, _, body) = http_get(addr, "/elsewhere/hello.txt").await?;
    assert_eq!(status, 404);
    assert!(body.contains("mount target or file not found"), "{body}");

    // Unmounting takes effect for the next request.
    assert!(server.get_mounts().delete("/files").await);
    let (status, _, _) = http_get(addr, "/files/hello.txt").await?;
    assert_eq!(status, 404);

    stop_pool(&pool, runner).await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_server_pool_servers_have_independent_mounts() -> anyhow::Result<()> {
    let first_dir = tempdir()?;
    let second_dir = tempdir()?;
    std::fs::write(first_dir.path().join("index.html"), "first")?;
    std::fs::write(second_dir.path().join("index.html"), "second")?;

    let (pool, runner) = start_pool();
    let first = pool.add("127.0.0.1:0").await?;
    let second = pool.add("127.0.0.1:0").await?;
    assert!(pool.start_server(&first).await);
    assert!(pool.start_server(&second).await);
    let first_addr = first.wait_started(TIMEOUT).await?;
    let second_addr = second.wait_started(TIMEOUT).await?;
    assert_ne!(first_addr.port(), second_addr.port());

    first
        .get_mounts()
        .put("/", first_dir.path(), "default", &BTreeMap::new())
        .await?;
    second
        .get_mounts()
        .put("/", second_dir.path(), "default", &BTreeMap::new())
        .await?;

    let (status, _, body) = http_get(first_addr, "/").await?;
    assert_eq!((status, body.as_str()), (200, "first"));
    let (status, _, body) = http_get(second_addr, "/").await?;
    assert_eq!((status, body.as_str()), (200, "second"));

    stop_pool(&pool, runner).await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_server_pool_remove_closes_open_connections() -> anyhow::Result<()> {
    let (pool, runner) = start_pool();
    let server = pool.add("127.0.0.1:0").await?;
    assert!(pool.start_server(&server).await);
    let addr = server.wait_started(TIMEOUT).await?;

    let mut idle = TcpStream::connect(addr).await?;
    wait_for_connections(&server, 1).await?;

    assert!(pool.remove(addr.port()).await?);
    assert_eq!(server.connection_count().await, 0);

    // The server side of the connection is gone: the read ends or fails.
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(TIMEOUT, idle.read(&mut buf)).await?;
    assert!(matches!(read, Ok(0) | Err(_)));

    assert!(TcpStream::connect(addr).await.is_err());
    assert!(pool.get(addr.port()).await.is_none());

    stop_pool(&pool, runner).await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_server_pool_shutdown_removes_every_server() -> anyhow::Result<()> {
    let pool = Arc::new(ServerPool::new(Arc::new(LocalFileServerFactory)));
    let first = pool.add("127.0.0.1:0").await?;
    let second = pool.add("127.0.0.1:0").await?;

    let runner = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.run().await }
    });

    let first_addr = first.wait_started(TIMEOUT).await?;
    let second_addr = second.wait_started(TIMEOUT).await?;

    stop_pool(&pool, runner).await?;

    assert!(pool.list().await.is_empty());
    assert!(!first.is_running());
    assert!(!second.is_running());
    assert!(TcpStream::connect(first_addr).await.is_err());
    assert!(TcpStream::connect(second_addr).await.is_err());

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn start_pool() -> (Arc<ServerPool>, JoinHandle<KrakenResult<()>>) {
    let pool = Arc::new(ServerPool::new(Arc::new(LocalFileServerFactory)));
    let runner = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.run().await }
    });
    (pool, runner)
}

async fn stop_pool(
    pool: &ServerPool,
    runner: JoinHandle<KrakenResult<()>>,
) -> anyhow::Result<()> {
    pool.shutdown();
    tokio::time::timeout(TIMEOUT, runner).await???;
    Ok(())
}

async fn wait_for_connections(server: &ServerInstance, count: usize) -> anyhow::Result<()> {
    tokio::time::timeout(TIMEOUT, async {
        while server.connection_count().await != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

/// Sends a one-shot GET request and returns the status, the response head and the body.
async fn http_get(addr: SocketAddr, path: &str) -> anyhow::Result<(u16, String, String)> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    tokio::time::timeout(TIMEOUT, stream.read_to_end(&mut response)).await??;
    let response = String::from_utf8(response)?;

    let (head, body) = response
        .split_once("\r\n\r\n")
        .ok_or_else(|| anyhow::anyhow!("malformed response: {response:?}"))?;
    let status = head
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("missing status: {head:?}"))?
        .parse()?;

    Ok((status, head.to_string(), body.to_string()))
}
