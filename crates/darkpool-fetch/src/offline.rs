//! Offline `ads.txt` source: one `{domain}.txt` file per site in a directory.

use std::path::Path;

use darkpool_core::types::{FetchOutcome, SiteDescriptor};
use tracing::debug;

use crate::client::{truncate_error, FetchError};
use crate::fetcher::body_lines;

/// Read every site's `ads.txt` from `dir`. A missing file is a failed site.
pub async fn load_from_dir(
    dir: &Path,
    sites: &[SiteDescriptor],
) -> Result<Vec<FetchOutcome>, FetchError> {
    if !dir.is_dir() {
        return Err(FetchError::MissingDirectory(dir.display().to_string()));
    }

    let mut outcomes = Vec::with_capacity(sites.len());
    for site in sites {
        let path = dir.join(format!("{}.txt", site.domain));
        let outcome = match tokio::fs::read_to_string(&path).await {
            Ok(body) => FetchOutcome::ok(&site.domain, body_lines(&body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                FetchOutcome::failed(&site.domain, "HTTP 404")
            }
            Err(e) => FetchOutcome::failed(&site.domain, truncate_error(&e.to_string())),
        };
        debug!("{}: loaded from {}", site.domain, path.display());
        outcomes.push(outcome);
    }
    Ok(outcomes)
}
