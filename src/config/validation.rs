use crate::config::types::{ApiConfig, Config, CrawlerConfig, OutputConfig, SiteConfig};
use crate::state::FIELD_COUNT;
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_crawler_config(&config.crawler)?;
    validate_api_config(&config.api)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the site URL and the CSS selectors
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid site url '{}': {}", config.url, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "Site url '{}' must use http or https",
            config.url
        )));
    }

    for (name, selector) in [
        ("table-selector", &config.table_selector),
        ("row-selector", &config.row_selector),
        ("cell-selector", &config.cell_selector),
        ("active-selector", &config.active_selector),
        ("next-selector", &config.next_selector),
        ("page-link-selector", &config.page_link_selector),
    ] {
        Selector::parse(selector).map_err(|e| {
            ConfigError::InvalidSelector(format!("{} '{}': {:?}", name, selector, e))
        })?;
    }

    Ok(())
}

/// Validates crawler limits
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "page_size must be >= 1, got {}",
            config.page_size
        )));
    }

    if config.end_page < 1 {
        return Err(ConfigError::Validation(format!(
            "end_page must be >= 1, got {}",
            config.end_page
        )));
    }

    if config.wait_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "wait_timeout_secs must be > 0".to_string(),
        ));
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "poll_interval_ms must be > 0".to_string(),
        ));
    }

    for (name, value) in [
        ("max_page_failures", config.max_page_failures),
        ("empty_page_limit", config.empty_page_limit),
        ("resume_probe_limit", config.resume_probe_limit),
        ("snapshot_every", config.snapshot_every),
        ("strategy_attempts", config.strategy_attempts),
        ("stuck_threshold", config.stuck_threshold),
    ] {
        if value < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1, got {}",
                name, value
            )));
        }
    }

    Ok(())
}

/// Validates backend query settings
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    if let Some(endpoint) = &config.endpoint {
        // Relative endpoints are resolved against the site url later
        if endpoint.trim().is_empty() {
            return Err(ConfigError::Validation(
                "api endpoint cannot be empty".to_string(),
            ));
        }
    }

    if let Some(columns) = &config.columns {
        if columns.len() != FIELD_COUNT {
            return Err(ConfigError::Validation(format!(
                "api columns must list exactly {} keys, got {}",
                FIELD_COUNT,
                columns.len()
            )));
        }
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates output paths
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.checkpoint_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint_path cannot be empty".to_string(),
        ));
    }

    if config.skip_log_path() == config.checkpoint_path
        || config.snapshot_path() == config.checkpoint_path
    {
        return Err(ConfigError::Validation(
            "skip log and snapshot must not share the checkpoint path".to_string(),
        ));
    }

    Ok(())
}
