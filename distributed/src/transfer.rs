use std::path::Path;

use anyhow::Context;
use tracing::debug;

use crate::naming::StoreName;

/// Pulls named store files from a remote `/data/` endpoint.
#[derive(Debug, Clone, Default)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Downloads `name` from `addr` into `dest`, replacing it. Returns the
    /// number of bytes written.
    pub async fn fetch(&self, addr: &str, name: &StoreName, dest: &Path) -> anyhow::Result<u64> {
        let url = name.url(addr);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        let body = response
            .bytes()
            .await
            .with_context(|| format!("reading body of {url}"))?;
        tokio::fs::write(dest, &body)
            .await
            .with_context(|| format!("writing {}", dest.display()))?;
        debug!(%url, dest = %dest.display(), bytes = body.len(), "fetched");
        Ok(body.len() as u64)
    }
}
