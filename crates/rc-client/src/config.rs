use std::env;
use std::time::Duration;

use anyhow::Context;

/// Environment-driven client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the pipeline API.
    pub api_base_url: String,
    /// Public endpoint assets are served from, prefix of all canonical URLs.
    pub public_endpoint: String,
    /// Bucket user uploads land in.
    pub upload_bucket: String,
    /// Cadence of the status poll.
    pub poll_interval: Duration,
    /// Wall-clock bound on a whole batch, measured from `start()`.
    pub poll_deadline: Duration,
}

impl ClientConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let api_base_url =
            env::var("RECAST_API_URL").context("RECAST_API_URL is not set")?;
        let public_endpoint = env::var("RECAST_PUBLIC_ENDPOINT")
            .context("RECAST_PUBLIC_ENDPOINT is not set")?;
        let upload_bucket =
            env::var("RECAST_UPLOAD_BUCKET").unwrap_or_else(|_| "media".to_string());

        let poll_interval_ms: u64 = env::var("RECAST_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .context("RECAST_POLL_INTERVAL_MS must be a number")?;
        let poll_deadline_ms: u64 = env::var("RECAST_POLL_TIMEOUT_MS")
            .unwrap_or_else(|_| "90000".to_string())
            .parse()
            .context("RECAST_POLL_TIMEOUT_MS must be a number")?;

        Ok(Self {
            api_base_url,
            public_endpoint,
            upload_bucket,
            poll_interval: Duration::from_millis(poll_interval_ms),
            poll_deadline: Duration::from_millis(poll_deadline_ms),
        })
    }
}
