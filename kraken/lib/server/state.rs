//! Admin API state.
//!
//! This module provides the AdminState type shared by every admin API handler.

use std::{sync::Arc, time::Duration};

use getset::Getters;

use crate::pool::ServerPool;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Shared admin API state
///
/// Cloning is cheap: the pool is shared by every clone.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct AdminState {
    /// The pool managed through the API
    pool: Arc<ServerPool>,

    /// How long server creation waits for the new server to bind
    start_timeout: Duration,
}

impl AdminState {
    /// Creates a new AdminState
    pub fn new(pool: Arc<ServerPool>, start_timeout: Duration) -> Self {
        Self {
            pool,
            start_timeout,
        }
    }
}
