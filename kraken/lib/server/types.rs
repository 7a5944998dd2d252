//! Type definitions for the server module.
//!
//! This module contains request and response types used by the admin API endpoints.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    fileserver::{Params, DEFAULT_FILE_SERVER},
    mount::{mount_id, MountEntry},
    pool::ServerInstance,
};

//-------------------------------------------------------------------------------------------------
// Constants
//-------------------------------------------------------------------------------------------------

/// Error type reported when the admin API itself fails.
pub const API_INTERNAL_ERROR: &str = "api_internal_error";

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// A server as reported by the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerData {
    /// The host the server is bound to
    pub bind_address: String,

    /// The port the server is bound to
    pub port: u16,

    /// The mounts of the server, ordered by target
    pub mounts: Vec<MountData>,
}

/// A mount as reported by the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountData {
    /// Identifier of the mount, derived from its target
    pub id: String,

    /// The URL path prefix
    pub target: String,

    /// The directory served under the target
    pub source: PathBuf,
}

/// Request body for creating a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServerRequest {
    /// The host to bind to; empty for all interfaces
    #[serde(default)]
    pub bind_address: String,
}

/// Request body for creating a mount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMountRequest {
    /// The URL path prefix
    pub target: String,

    /// The absolute path of the directory to serve
    pub source: PathBuf,

    /// The file server backend type
    #[serde(default = "default_fs_type")]
    pub fs_type: String,

    /// Backend-specific parameters
    #[serde(default)]
    pub fs_params: Params,
}

/// Error body returned when an operation fails internally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// The error type
    #[serde(rename = "type")]
    pub kind: String,

    /// Error message describing what went wrong
    pub msg: String,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl ServerData {
    /// Snapshots a server and its mounts.
    pub async fn from_instance(server: &ServerInstance) -> Self {
        let mounts = server
            .get_mounts()
            .entries()
            .await
            .into_iter()
            .map(MountData::from)
            .collect();

        Self {
            bind_address: server.bind_host(),
            port: server.port(),
            mounts,
        }
    }
}

impl ApiError {
    /// Creates an internal error body.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            kind: API_INTERNAL_ERROR.to_string(),
            msg: msg.into(),
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Trait Implementations
//-------------------------------------------------------------------------------------------------

impl From<MountEntry> for MountData {
    fn from(entry: MountEntry) -> Self {
        Self {
            id: mount_id(&entry.target),
            target: entry.target,
            source: entry.source,
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

fn default_fs_type() -> String {
    DEFAULT_FILE_SERVER.to_string()
}
