use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::config::{self, CacheConfig, RetryPolicy};

/// Run one region's cache node with an interactive prompt.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to accept replication traffic on. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:5001")]
    pub listen: SocketAddr,

    /// Peer addresses to replicate writes to (repeatable or comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub peer: Vec<SocketAddr>,

    /// Region name stamped on outgoing writes
    #[arg(long)]
    pub region: String,

    /// Maximum number of entries kept locally
    #[arg(long, default_value_t = 1024)]
    pub capacity: usize,

    /// Seconds an entry lives after its last write; omit or pass 0 to disable expiry
    #[arg(long)]
    pub ttl_secs: Option<f64>,

    /// Delivery attempts per peer before a write is dropped
    #[arg(long, default_value_t = config::DEFAULT_RETRY_ATTEMPTS)]
    pub retry_attempts: u32,

    /// Pause between delivery attempts, in milliseconds
    #[arg(long, default_value_t = config::DEFAULT_RETRY_DELAY.as_millis() as u64)]
    pub retry_delay_ms: u64,
}

impl Cli {
    pub fn cache_config(&self) -> anyhow::Result<CacheConfig> {
        let mut config = CacheConfig::new(self.capacity, self.listen, self.region.clone())
            .with_peers(self.peer.iter().copied())
            .with_retry(RetryPolicy {
                max_attempts: self.retry_attempts,
                delay: Duration::from_millis(self.retry_delay_ms),
            });
        if let Some(secs) = self.ttl_secs {
            let ttl = Duration::try_from_secs_f64(secs)
                .map_err(|err| anyhow::anyhow!("invalid --ttl-secs {secs}: {err}"))?;
            config = config.with_ttl(ttl);
        }
        config.validate()?;
        Ok(config)
    }
}
