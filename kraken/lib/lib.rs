//! `kraken` serves directories of the local file system over HTTP, on as many ports as needed.
//!
//! # Overview
//!
//! kraken runs a pool of independent HTTP servers inside one process. Each server binds its own
//! address and owns a mount table that maps URL path prefixes, the mount targets, to directories,
//! the mount sources. Servers and mounts are added and removed at runtime while requests are
//! being served.
//!
//! # Architecture
//!
//! - **Mount**: Mount tables and longest-prefix request dispatch
//! - **Fileserver**: The file server backends that serve a mounted directory
//! - **Pool**: Server instances, their connections and the pool that starts and stops them
//! - **Server**: REST API for remote management of the pool
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::{collections::BTreeMap, sync::Arc, time::Duration};
//!
//! use kraken::{fileserver::LocalFileServerFactory, pool::ServerPool};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = Arc::new(ServerPool::new(Arc::new(LocalFileServerFactory)));
//!
//!     // Register a server on a port picked by the operating system
//!     let server = pool.add("localhost:0").await?;
//!     server
//!         .get_mounts()
//!         .put("/docs", "/usr/share/doc", "default", &BTreeMap::new())
//!         .await?;
//!
//!     // Start the registered servers
//!     let runner = tokio::spawn({
//!         let pool = Arc::clone(&pool);
//!         async move { pool.run().await }
//!     });
//!
//!     let addr = server.wait_started(Duration::from_secs(5)).await?;
//!     println!("serving /usr/share/doc on http://{addr}/docs/");
//!
//!     tokio::signal::ctrl_c().await?;
//!     pool.shutdown();
//!     runner.await??;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

mod error;
mod log;

pub mod cli;
pub mod config;
pub mod fileserver;
pub mod mount;
pub mod pool;
pub mod server;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use error::*;
pub use log::*;
