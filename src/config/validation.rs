use crate::config::types::{Config, Pagination, ScraperSettings, SiteConfig};
use crate::ConfigError;
use url::Url;

/// Upper bound for any configured duration (one day)
pub const MAX_SECONDS: u64 = 86_400;

/// Validates the entire configuration
///
/// Missing `list_container`/`product_card` selectors are deliberately not
/// checked here: such a site simply yields no cards.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_settings(&config.scraper)?;

    if config.sites.is_empty() {
        return Err(ConfigError::Validation(
            "at least one site must be configured".to_string(),
        ));
    }

    for (name, site) in &config.sites {
        validate_site(name, site)?;
    }

    Ok(())
}

/// Validates process-wide settings
fn validate_settings(settings: &ScraperSettings) -> Result<(), ConfigError> {
    validate_seconds("site_delay", settings.site_delay)?;

    if settings.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output_dir cannot be empty".to_string(),
        ));
    }

    if let Some(endpoint) = &settings.remote_debugging_url {
        validate_http_url(endpoint)
            .map_err(|e| ConfigError::InvalidUrl(format!("remote_debugging_url: {}", e)))?;
    }

    Ok(())
}

/// Validates one site entry
fn validate_site(name: &str, site: &SiteConfig) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "site name cannot be empty".to_string(),
        ));
    }

    validate_http_url(&site.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("{}: base_url: {}", name, e)))?;

    if site.search_url.contains("://") {
        validate_http_url(&site.search_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: search_url: {}", name, e)))?;
    }

    if site.timeout == 0 || site.timeout > MAX_SECONDS {
        return Err(ConfigError::Validation(format!(
            "{}: timeout must be between 1 and {} seconds, got {}",
            name, MAX_SECONDS, site.timeout
        )));
    }

    validate_seconds(&format!("{}: delay", name), site.delay)?;

    if let Pagination::NumberedPageLinks {
        max_pages,
        link_selector,
    } = &site.pagination
    {
        if *max_pages < 1 {
            return Err(ConfigError::Validation(format!(
                "{}: max_pages must be >= 1, got {}",
                name, max_pages
            )));
        }

        if !link_selector.contains("{page}") {
            return Err(ConfigError::Validation(format!(
                "{}: link_selector must contain a {{page}} placeholder, got '{}'",
                name, link_selector
            )));
        }
    }

    Ok(())
}

/// A duration in seconds must be finite, non-negative and at most a day
fn validate_seconds(field: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 || value > MAX_SECONDS as f64 {
        return Err(ConfigError::Validation(format!(
            "{} must be between 0 and {} seconds, got {}",
            field, MAX_SECONDS, value
        )));
    }
    Ok(())
}

fn validate_http_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| format!("'{}': {}", raw, e))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("'{}' must use http or https", raw));
    }

    Ok(())
}
