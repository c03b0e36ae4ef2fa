use crate::config::types::{Config, ScraperSettings, SiteConfig};
use crate::config::validation::validate;
use crate::ConfigError;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// Files ending in `.json` are read as JSON (see [`parse_json`] for the
/// accepted layouts); everything else is read as TOML.
/// After parsing, each site's selector map inherits the site's `base_url`
/// when it does not carry its own, and the whole configuration is validated.
///
/// # Arguments
///
/// * `path` - Path to the configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use homescrape::config::load_config;
///
/// let config = load_config(Path::new("sites.toml")).unwrap();
/// println!("Sites: {:?}", config.site_names());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config = if is_json {
        parse_json(&content)?
    } else {
        parse_toml(&content)?
    };

    Ok(config)
}

/// Parses and validates TOML configuration text
pub fn parse_toml(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    finish(config)
}

/// Parses and validates JSON configuration text
///
/// Two layouts are accepted. The `sites.json` layout keys each site object
/// by its name at the top level, with an optional `scraper` object beside
/// them. A top-level `sites` key selects the same layout as the TOML file.
pub fn parse_json(content: &str) -> Result<Config, ConfigError> {
    let mut root: serde_json::Map<String, Value> = serde_json::from_str(content)?;

    if root.contains_key("sites") {
        let config: Config = serde_json::from_value(Value::Object(root))?;
        return finish(config);
    }

    let scraper: ScraperSettings = match root.remove("scraper") {
        Some(settings) => serde_json::from_value(settings)?,
        None => ScraperSettings::default(),
    };
    let sites: BTreeMap<String, SiteConfig> = serde_json::from_value(Value::Object(root))?;

    finish(Config { scraper, sites })
}

fn finish(mut config: Config) -> Result<Config, ConfigError> {
    for site in config.sites.values_mut() {
        if site.selectors.base_url.is_none() {
            site.selectors.base_url = Some(site.base_url.clone());
        }
    }

    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is recorded with every run so outputs can be traced back to the
/// selector tables that produced them.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
