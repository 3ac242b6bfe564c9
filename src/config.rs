//! Server configuration from flags and environment

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "siteops", about = "Entitlement and approval-workflow server")]
pub struct Config {
    /// SQLite connection string
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:siteops.db")]
    pub database_url: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub db_max_connections: u32,

    /// Address the HTTP server listens on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind_addr: String,

    /// How long a resolved entitlement set may be served from cache
    #[arg(long, env = "ENTITLEMENT_TTL_MS", default_value_t = 5000)]
    pub entitlement_ttl_ms: u64,

    /// Endpoint receiving workflow transition events
    #[arg(long, env = "NOTIFY_WEBHOOK_URL")]
    pub notify_webhook_url: Option<String>,
}

impl Config {
    pub fn entitlement_ttl(&self) -> Duration {
        Duration::from_millis(self.entitlement_ttl_ms)
    }
}
