//! Listing record types
//!
//! A [`ListingRecord`] is created from one search-result card, enriched by
//! its detail page, tagged with the site name and handed to the exporter.
//! Every key is always present so downstream flattening can read any field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder title when the card has none
pub const NO_TITLE: &str = "No title";

/// Placeholder price when the card has none
pub const NO_PRICE: &str = "Price not available";

/// Placeholder location when the card has none
pub const NO_LOCATION: &str = "Location not available";

/// One normalized property listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub title: String,

    /// Formatted currency string, the raw price text, or a placeholder
    pub price: String,

    pub location: String,

    /// Absolute listing URL, or empty when the card had no usable link
    pub url: String,

    pub image_url: Option<String>,

    pub details: ListingDetails,

    pub agent: AgentInfo,

    /// Site name, attached at export time
    pub site: String,

    pub scraped_at: Option<DateTime<Utc>>,
}

impl Default for ListingRecord {
    fn default() -> Self {
        Self {
            title: NO_TITLE.to_string(),
            price: NO_PRICE.to_string(),
            location: NO_LOCATION.to_string(),
            url: String::new(),
            image_url: None,
            details: ListingDetails::default(),
            agent: AgentInfo::default(),
            site: String::new(),
            scraped_at: None,
        }
    }
}

impl ListingRecord {
    /// True when the card yielded a link to a detail page
    pub fn has_url(&self) -> bool {
        !self.url.is_empty()
    }

    /// Merges detail-page data into this record
    pub fn apply_detail(&mut self, detail: DetailInfo) {
        self.details = detail.details;
        self.agent = detail.agent;
    }

    /// Attaches the site name and scrape timestamp
    pub fn tag(&mut self, site: &str, scraped_at: DateTime<Utc>) {
        self.site = site.to_string();
        self.scraped_at = Some(scraped_at);
    }

    /// ISO-8601 rendering of `scraped_at`, empty when unset
    pub fn scraped_at_iso(&self) -> String {
        self.scraped_at
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_default()
    }
}

/// Property attributes from the detail page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingDetails {
    pub beds: Option<f64>,
    pub baths: Option<f64>,
    pub sqft: Option<f64>,
    pub acres: Option<f64>,
    pub parking: Option<String>,
    pub garage: Option<String>,
    pub property_type: Option<String>,
}

impl ListingDetails {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Listing agent contact from the detail page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: Option<String>,
    pub license: Option<String>,
    pub office: Option<String>,
    pub phone: Option<String>,
}

impl AgentInfo {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Result of parsing one detail page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailInfo {
    pub details: ListingDetails,
    pub agent: AgentInfo,
}

/// Column order used by the flat (CSV / SQLite) outputs
pub const FLAT_COLUMNS: [&str; 17] = [
    "site",
    "title",
    "price",
    "location",
    "beds",
    "baths",
    "sqft",
    "acres",
    "property_type",
    "parking",
    "garage",
    "agent_name",
    "agent_license",
    "agent_office",
    "agent_phone",
    "url",
    "scraped_at",
];

impl ListingRecord {
    /// Flattens the record into [`FLAT_COLUMNS`] order; missing values are empty
    pub fn flat_row(&self) -> Vec<String> {
        fn num(value: Option<f64>) -> String {
            value.map(|v| v.to_string()).unwrap_or_default()
        }
        fn text(value: &Option<String>) -> String {
            value.clone().unwrap_or_default()
        }

        vec![
            self.site.clone(),
            self.title.clone(),
            self.price.clone(),
            self.location.clone(),
            num(self.details.beds),
            num(self.details.baths),
            num(self.details.sqft),
            num(self.details.acres),
            text(&self.details.property_type),
            text(&self.details.parking),
            text(&self.details.garage),
            text(&self.agent.name),
            text(&self.agent.license),
            text(&self.agent.office),
            text(&self.agent.phone),
            self.url.clone(),
            self.scraped_at_iso(),
        ]
    }
}
