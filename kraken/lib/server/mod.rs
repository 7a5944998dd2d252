//! The admin REST API.
//!
//! This module implements the HTTP API through which servers of a [`ServerPool`](crate::pool::ServerPool)
//! are created, inspected and removed, and through which their mounts are managed.

mod handlers;
mod routes;
mod state;
mod types;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use handlers::AdminError;
pub use routes::*;
pub use state::*;
pub use types::*;
