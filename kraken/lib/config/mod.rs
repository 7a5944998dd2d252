//! Configuration types and defaults.

mod bind_addr;
mod defaults;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use bind_addr::*;
pub use defaults::*;
