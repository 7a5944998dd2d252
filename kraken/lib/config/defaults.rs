use std::time::Duration;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Default bind address of the admin API.
pub const DEFAULT_ADMIN_ADDR: &str = "localhost:4214";

/// Environment variable overriding the admin API bind address.
pub const ADMIN_ADDR_ENV_VAR: &str = "KRAKEN_ADMIN_ADDR";

/// Default number of seconds the admin API waits for a new server to bind.
pub const DEFAULT_START_TIMEOUT_SECS: u64 = 5;

/// How long closing a server waits for its accept loop to release the listener.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP keep-alive period of accepted connections.
pub const TCP_KEEPALIVE: Duration = Duration::from_secs(3 * 60);

/// Pause after a failed `accept`, so a persistent error such as running out of file
/// descriptors does not spin the accept loop.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);
