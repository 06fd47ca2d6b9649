//! Concurrent HTTPS retrieval of `ads.txt` files.

use darkpool_core::config::FetchConfig;
use darkpool_core::types::{FetchOutcome, SiteDescriptor};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::client::{create_client, truncate_error, FetchError};

pub fn ads_txt_url(domain: &str) -> String {
    format!("https://{domain}/ads.txt")
}

/// Split a response body into lines, trimming surrounding whitespace first.
pub fn body_lines(body: &str) -> Vec<String> {
    body.trim().split('\n').map(str::to_string).collect()
}

/// Fetch one site's `ads.txt`. Never fails: problems become a failed outcome.
pub async fn fetch_ads_txt(client: &Client, domain: &str) -> FetchOutcome {
    let url = ads_txt_url(domain);
    debug!("Fetching: {}", url);

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => return FetchOutcome::failed(domain, "Timeout"),
        Err(e) => return FetchOutcome::failed(domain, truncate_error(&e.to_string())),
    };

    let status = response.status();
    if status.as_u16() != 200 {
        return FetchOutcome::failed(domain, format!("HTTP {}", status.as_u16()));
    }

    match response.text().await {
        Ok(body) => FetchOutcome::ok(domain, body_lines(&body)),
        Err(e) if e.is_timeout() => FetchOutcome::failed(domain, "Timeout"),
        Err(e) => FetchOutcome::failed(domain, truncate_error(&e.to_string())),
    }
}

/// Fetch every site with at most `max_concurrent` requests in flight.
///
/// Outcomes are returned in the order of `sites`.
pub async fn fetch_all(
    sites: &[SiteDescriptor],
    config: &FetchConfig,
) -> Result<Vec<FetchOutcome>, FetchError> {
    let client = create_client(config)?;
    let max_concurrent = config.max_concurrent.max(1);
    info!("Fetching {} ads.txt files ({} at a time)", sites.len(), max_concurrent);

    let mut outcomes: Vec<(usize, FetchOutcome)> = stream::iter(sites.iter().enumerate())
        .map(|(i, site)| {
            let client = client.clone();
            let domain = site.domain.clone();
            async move { (i, fetch_ads_txt(&client, &domain).await) }
        })
        .buffer_unordered(max_concurrent)
        .inspect(|(_, outcome)| {
            if !outcome.success {
                warn!("{}: {}", outcome.domain, outcome.error);
            }
        })
        .collect()
        .await;

    outcomes.sort_by_key(|(i, _)| *i);
    Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
}
