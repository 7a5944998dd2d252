//! Mount tables.
//!
//! Every server owns a [`MountTable`] mapping URL path prefixes, the mount targets, to
//! [`FileServer`](crate::fileserver::FileServer)s rooted at mount sources. Requests are routed to
//! the longest registered target that prefixes their path.

mod table;
mod target;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use table::*;
pub use target::*;
