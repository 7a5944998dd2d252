//! `krakend` runs a pool of file servers managed through a REST API.
//!
//! ## Usage
//!
//! ```bash
//! krakend --admin-addr localhost:4214 :8080 localhost:0
//! ```
//!
//! Every positional address registers a server that starts with the daemon. More servers and
//! their mounts are managed through the admin API, e.g.:
//!
//! ```bash
//! curl -X POST localhost:4214/api/servers/8080/mounts \
//!     -H 'content-type: application/json' \
//!     -d '{"target": "/docs", "source": "/usr/share/doc"}'
//! ```

use std::sync::Arc;

use clap::Parser;
use kraken::{
    cli::KrakendArgs,
    fileserver::LocalFileServerFactory,
    pool::ServerPool,
    server::{create_router, AdminState},
    KrakenError, KrakenResult,
};
use tokio::net::TcpListener;

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> KrakenResult<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = KrakendArgs::parse();
    kraken::init_tracing(args.verbose);

    let pool = Arc::new(ServerPool::new(Arc::new(LocalFileServerFactory)));
    for addr in &args.servers {
        pool.add(addr).await?;
    }

    let runner = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.run().await }
    });

    let listener = TcpListener::bind(&args.admin_addr)
        .await
        .map_err(|e| KrakenError::bind(&args.admin_addr, e))?;
    tracing::info!("admin API listening on {}", listener.local_addr()?);

    let app = create_router(AdminState::new(Arc::clone(&pool), args.start_timeout()));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    pool.shutdown();
    let stopped = runner.await?;

    served?;
    stopped
}

//--------------------------------------------------------------------------------------------------
// Functions: *
//--------------------------------------------------------------------------------------------------

/// Completes on SIGINT, or on SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}
