//! File server backends.
//!
//! A mount on a server is backed by a [`FileServer`] created by a [`FileServerFactory`] from a
//! source directory, a backend type and a set of backend-specific parameters. The factory is
//! shared by every server of a pool and is not mutated after construction.
//!
//! The built-in [`LocalFileServerFactory`] serves files from the local file system.

mod local;
mod traits;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use local::*;
pub use traits::*;
