//! Listing card and detail page parser
//!
//! This module maps site markup onto [`ListingRecord`]s using a site's
//! [`SelectorMap`]:
//! - Finding the repeated listing cards on a search-results page
//! - Parsing one card into a partial record
//! - Parsing a detail page into property details and agent info
//!
//! Parsing never fails. Missing or changed selectors produce placeholders
//! and empty fields, and problems are logged.

use crate::config::SelectorMap;
use crate::extract::{
    extract_number, extract_price, extract_text, non_empty, select_first, SelectorSpec,
};
use crate::listing::{AgentInfo, DetailInfo, ListingDetails, ListingRecord};
use scraper::{ElementRef, Html};
use url::Url;

/// Attributes checked for an image source, in priority order
const IMAGE_ATTRS: [&str; 3] = ["src", "data-src", "data-original"];

/// Returns the outer HTML of every listing card on a search-results page
///
/// Cards are the elements matching `product_card` inside the first element
/// matching `list_container`. The result is empty when either selector is
/// missing, invalid or unmatched.
///
/// # Example
///
/// ```
/// use homescrape::config::SelectorMap;
/// use homescrape::parser::extract_listing_cards;
///
/// let selectors = SelectorMap {
///     list_container: Some("ul.results".to_string()),
///     product_card: Some("li".to_string()),
///     ..Default::default()
/// };
/// let html = "<ul class='results'><li>A</li><li>B</li></ul>";
/// assert_eq!(extract_listing_cards(html, &selectors).len(), 2);
/// ```
pub fn extract_listing_cards(html: &str, selectors: &SelectorMap) -> Vec<String> {
    let (Some(container_sel), Some(card_sel)) = (
        selectors.list_container.as_deref(),
        selectors.product_card.as_deref(),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);

    let Some(container) = select_first(document.root_element(), Some(container_sel)) else {
        tracing::warn!("List container '{}' not found", container_sel);
        return Vec::new();
    };

    let Some(card_selector) = SelectorSpec::parse(card_sel).compile() else {
        return Vec::new();
    };

    container
        .select(&card_selector)
        .map(|card| card.html())
        .collect()
}

/// Parses one listing card into a partial record
///
/// `title`, `price` and `location` fall back to placeholders. The listing
/// link is made absolute against the selector map's `base_url`; an image URL
/// is read from the requested attribute (if any), then `src`, `data-src` and
/// `data-original`.
pub fn parse_listing_card(card_html: &str, selectors: &SelectorMap) -> ListingRecord {
    let fragment = Html::parse_fragment(card_html);
    let root = fragment.root_element();

    let mut listing = ListingRecord::default();
    let mut missing = Vec::new();

    let title = extract_text(root, selectors.product_title.as_deref());
    if title.is_empty() {
        missing.push("title");
    } else {
        listing.title = title;
    }

    let price = extract_price(&extract_text(root, selectors.price.as_deref()));
    if price.is_empty() {
        missing.push("price");
    } else {
        listing.price = price;
    }

    let location = extract_text(root, selectors.location.as_deref());
    if location.is_empty() {
        missing.push("location");
    } else {
        listing.location = location;
    }

    if !missing.is_empty() {
        tracing::warn!("Listing card missing {}", missing.join(", "));
    }

    if let Some(link) = select_first(root, selectors.product_link.as_deref()) {
        if let Some(href) = link.value().attr("href") {
            match resolve_listing_url(href, selectors.base_url.as_deref()) {
                Some(url) => listing.url = url,
                None => tracing::warn!("Could not resolve listing link '{}'", href),
            }
        }
    }

    listing.image_url = extract_image_url(root, selectors.image_url.as_deref());

    listing
}

/// Parses a detail page into property details and agent contact
///
/// Every field is extracted on its own; one missing field never affects
/// the others.
pub fn parse_listing_detail(html: &str, selectors: &SelectorMap) -> DetailInfo {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let number = |selector: &Option<String>| extract_number(&extract_text(root, selector.as_deref()));
    let text = |selector: &Option<String>| non_empty(extract_text(root, selector.as_deref()));

    let details = ListingDetails {
        beds: number(&selectors.beds),
        baths: number(&selectors.baths),
        sqft: number(&selectors.sqft),
        acres: number(&selectors.acres),
        parking: text(&selectors.parking),
        garage: text(&selectors.garage),
        property_type: text(&selectors.property_type),
    };

    let agent = AgentInfo {
        name: text(&selectors.agent_name),
        license: text(&selectors.agent_license),
        office: text(&selectors.agent_office),
        phone: text(&selectors.agent_phone),
    };

    DetailInfo { details, agent }
}

/// Resolves a listing `href` to an absolute http(s) URL
///
/// Absolute hrefs are returned unchanged. Relative hrefs (site-relative
/// `/path` included) are joined onto `base_url`. Script, mail, phone, data
/// and fragment-only links yield `None`, as does a relative href without a
/// usable base.
pub fn resolve_listing_url(href: &str, base_url: Option<&str>) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    if let Ok(absolute) = Url::parse(href) {
        return match absolute.scheme() {
            "http" | "https" => Some(href.to_string()),
            _ => None,
        };
    }

    let base = Url::parse(base_url?.trim()).ok()?;
    base.join(href).ok().map(|url| url.to_string())
}

fn extract_image_url(root: ElementRef<'_>, selector: Option<&str>) -> Option<String> {
    let raw = selector?;
    let spec = SelectorSpec::parse(raw);
    let image = select_first(root, Some(raw))?;

    spec.attr
        .into_iter()
        .chain(IMAGE_ATTRS)
        .filter_map(|attr| image.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}
