//! The HTTP servers of the process and the pool that owns them.
//!
//! Each [`ServerInstance`] binds its own address and serves the mounts of its own
//! [`MountTable`](crate::mount::MountTable). The [`ServerPool`] registers instances, starts them
//! on their own tasks and removes them, closing their connections.

mod connections;
mod instance;
mod pool;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub(crate) use connections::*;
pub use instance::*;
pub use pool::*;
