use std::time::Duration;

use clap::Parser;

use super::styles;
use crate::config::{ADMIN_ADDR_ENV_VAR, DEFAULT_ADMIN_ADDR, DEFAULT_START_TIMEOUT_SECS};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// krakend - serves local directories over HTTP, on as many ports as needed, managed through a
/// REST API
#[derive(Debug, Parser)]
#[command(name = "krakend", author, about, version, styles=styles::styles())]
pub struct KrakendArgs {
    /// Address the admin API listens on
    #[arg(long, env = ADMIN_ADDR_ENV_VAR, default_value = DEFAULT_ADMIN_ADDR)]
    pub admin_addr: String,

    /// Seconds the admin API waits for a new server to bind
    #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_START_TIMEOUT_SECS)]
    pub start_timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Servers to start at launch, as `host:port`
    #[arg(value_name = "SERVER_ADDR")]
    pub servers: Vec<String>,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl KrakendArgs {
    /// Returns how long the admin API waits for a new server to bind.
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout)
    }
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------
