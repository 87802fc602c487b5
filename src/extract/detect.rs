//! Backend endpoint discovery and extractor selection
//!
//! The API extractor is preferred whenever a working endpoint can be
//! found: from the live view's DataTables configuration, from the static
//! page source (forced mode, no browser), or from configuration. An
//! endpoint is only trusted after page 1 comes back with rows.

use crate::config::Config;
use crate::extract::{
    build_http_client, ApiExtractor, DomExtractor, Extractor, ExtractError, TableSelectors,
};
use crate::session::{cookie_header, Session, SessionResult, SessionSupervisor};
use crate::HarvestError;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// DataTables `ajax: "..."`, `ajax: { url: "..." }` and legacy `sAjaxSource`
const AJAX_PATTERN: &str = r#"(?:["']?\bajax["']?\s*:\s*(?:\{[^}]*?["']?url["']?\s*:\s*)?|["']?\bsAjaxSource["']?\s*:\s*)["']([^"']+)["']"#;

/// Finds the first DataTables ajax URL in page source
pub fn find_ajax_url(html: &str) -> Option<String> {
    let pattern = Regex::new(AJAX_PATTERN).ok()?;
    let found = pattern
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|candidate| !candidate.is_empty() && !candidate.starts_with("javascript:"))
        .map(str::to_string);
    found
}

/// Resolves a possibly relative endpoint against the site URL
pub fn resolve_endpoint(site_url: &Url, raw: &str) -> Option<Url> {
    match site_url.join(raw.trim()) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Some(url),
        Ok(url) => {
            tracing::debug!("Ignoring non-HTTP endpoint {}", url);
            None
        }
        Err(e) => {
            tracing::debug!("Ignoring unparseable endpoint {:?}: {}", raw, e);
            None
        }
    }
}

/// Asks the rendered table which endpoint it loads its rows from
pub async fn discover_live(session: &mut dyn Session, site_url: &Url) -> SessionResult<Option<Url>> {
    let raw = session.ajax_endpoint().await?;
    Ok(raw.and_then(|raw| resolve_endpoint(site_url, &raw)))
}

/// Fetches the start page over plain HTTP and scans it for the endpoint
///
/// The client's cookie store keeps whatever session cookies the page sets.
pub async fn discover_static(client: &Client, site_url: &Url) -> Result<Option<Url>, ExtractError> {
    let response = client.get(site_url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ExtractError::Status(status.as_u16()));
    }
    let html = response.text().await?;
    Ok(find_ajax_url(&html).and_then(|raw| resolve_endpoint(site_url, &raw)))
}

/// Returns true if page 1 yields at least one record
pub async fn probe(extractor: &mut dyn Extractor, sessions: &mut SessionSupervisor) -> bool {
    match extractor.extract_page(sessions, 1).await {
        Ok(page) if !page.is_empty() => {
            tracing::debug!("Probe returned {} records", page.records.len());
            true
        }
        Ok(_) => {
            tracing::warn!("Endpoint probe returned no records");
            false
        }
        Err(e) => {
            tracing::warn!("Endpoint probe failed: {}", e);
            false
        }
    }
}

fn dom_extractor(config: &Config) -> Result<Box<dyn Extractor>, HarvestError> {
    let selectors = TableSelectors::from_config(&config.site)?;
    Ok(Box::new(DomExtractor::new(
        selectors,
        config.crawler.wait_timeout(),
    )))
}

/// Picks the extractor for this run
///
/// Forced mode never touches the browser while looking for the endpoint.
/// Otherwise a session is acquired (launch failure is fatal) and the live
/// table is asked for its endpoint. Any failure along the API path falls
/// back to reading the rendered table.
pub async fn select_extractor(
    config: &Config,
    sessions: &mut SessionSupervisor,
) -> Result<Box<dyn Extractor>, HarvestError> {
    if !config.api.enabled {
        tracing::info!("API mode disabled, reading the rendered table");
        return dom_extractor(config);
    }

    let site_url = Url::parse(&config.site.url)?;
    let client = build_http_client(Duration::from_secs(config.api.request_timeout_secs))?;
    let configured = config
        .api
        .endpoint
        .as_deref()
        .and_then(|raw| resolve_endpoint(&site_url, raw));

    let candidate = if config.api.force {
        let endpoint = match configured {
            Some(endpoint) => Some(endpoint),
            None => match discover_static(&client, &site_url).await {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    tracing::warn!("Static endpoint discovery failed: {}", e);
                    None
                }
            },
        };
        endpoint.map(|endpoint| {
            ApiExtractor::new(
                client,
                endpoint,
                site_url.clone(),
                config.api.method,
                config.crawler.page_size,
            )
        })
    } else {
        let session = sessions.acquire().await?;
        let endpoint = match configured {
            Some(endpoint) => Some(endpoint),
            None => match discover_live(session, &site_url).await {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    tracing::warn!("Live endpoint discovery failed: {}", e);
                    None
                }
            },
        };
        match endpoint {
            Some(endpoint) => {
                let cookies = session.cookies().await.unwrap_or_default();
                let user_agent = session.user_agent().await.unwrap_or_default();
                Some(
                    ApiExtractor::new(
                        client,
                        endpoint,
                        site_url.clone(),
                        config.api.method,
                        config.crawler.page_size,
                    )
                    .with_credentials(cookie_header(&cookies), user_agent),
                )
            }
            None => None,
        }
    };

    match candidate {
        Some(extractor) => {
            let mut extractor = extractor.with_columns(config.api.columns.clone());
            tracing::info!("Probing backend endpoint {}", extractor.endpoint());
            if probe(&mut extractor, sessions).await {
                tracing::info!("Using direct API mode via {}", extractor.endpoint());
                Ok(Box::new(extractor))
            } else {
                tracing::warn!("Endpoint unusable, falling back to the rendered table");
                dom_extractor(config)
            }
        }
        None => {
            tracing::info!("No backend endpoint detected, reading the rendered table");
            dom_extractor(config)
        }
    }
}
