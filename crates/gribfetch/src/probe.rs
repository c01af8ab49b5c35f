//! HTTP existence probes.
//!
//! A probe is a single HEAD request: a URL exists when the status is
//! 2xx and any advertised Content-Length clears a small floor. Some
//! mirrors answer 200 with a tiny HTML placeholder for missing files;
//! the floor screens those out. No retries.

use std::time::Duration;

use reqwest::{header, Client};
use serde::Deserialize;
use tracing::debug;

use crate::error::Result;

/// Minimum advertised Content-Length for a URL to count as existing.
/// Effectively disabled (NOMADS reports unreliable lengths), but still
/// guards against empty placeholder objects.
pub const MIN_CONTENT_LENGTH: u64 = 10;

const AZURE_SIGNER: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/sign?href=";
const PANDO_GATEWAY: &str = "https://pando-rgw01.chpc.utah.edu/";

#[derive(Debug, Deserialize)]
struct SignedHref {
    href: String,
}

/// Existence prober over a shared HTTP client.
#[derive(Debug, Clone)]
pub struct Prober {
    client: Client,
    timeout: Duration,
}

impl Prober {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Prober { client, timeout }
    }

    /// HEAD the URL. Transport errors count as "does not exist".
    pub async fn exists(&self, url: &str) -> bool {
        let response = match self
            .client
            .head(url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %url, error = %e, "HEAD probe failed");
                return false;
            }
        };

        if !response.status().is_success() {
            return false;
        }

        match content_length(&response) {
            Some(len) => len > MIN_CONTENT_LENGTH,
            None => true,
        }
    }

    /// HEAD the URL and report the advertised total length, if any.
    pub async fn content_length(&self, url: &str) -> Option<u64> {
        let response = self
            .client
            .head(url)
            .timeout(self.timeout)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        content_length(&response)
    }

    /// Resolve the URL actually used for a named source. Azure blob
    /// URLs are routed through the Planetary Computer SAS signer; all
    /// other sources pass through unchanged.
    pub async fn resolve_source_url(&self, url: &str) -> Result<String> {
        if !url.contains("blob.core.windows.net") {
            return Ok(url.to_string());
        }
        let signer_url = format!("{AZURE_SIGNER}{url}");
        let signed: SignedHref = self
            .client
            .get(&signer_url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(url = %url, "Resolved signed Azure URL");
        Ok(signed.href)
    }

    /// Ping the Pando gateway before probing it; the first handshake to
    /// a cold gateway sometimes fails and a throwaway HEAD avoids that.
    pub async fn ping_pando(&self) {
        if let Err(e) = self
            .client
            .head(PANDO_GATEWAY)
            .timeout(self.timeout)
            .send()
            .await
        {
            debug!(error = %e, "Pando gateway ping failed");
        }
    }
}

fn content_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}
