//! Turns a fetched listing into candidate product records.
//!
//! Feed sites are read from the store's `products.json`; every other site is
//! scraped with its configured CSS selector, falling back to brand-matching
//! links when the selector no longer matches anything.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{SiteConfig, Strategy};
use crate::error::{Error, Result};
use crate::fetch::{FEED_TIMEOUT, Fetcher, PAGE_TIMEOUT, fetch_with_retry};
use crate::stock::{StockSignals, is_sold_out};
use crate::text::{clean_product_name, normalize, percent_decode};

const FEED_PATH: &str = "products.json";
const PRODUCT_PATH: &str = "products";

static LINKS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        ".product-name, .product-title, .title, .name, .woocommerce-loop-product__title, .item_name",
    )
    .unwrap()
});

/// A product mention pulled out of a listing, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    /// Feed item id, or the absolute product URL for scraped pages.
    pub identifier: String,
    pub title: String,
    pub url: String,
    /// Text as scraped, before badges and prices were stripped.
    pub raw_status_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub record: CandidateRecord,
    /// Markup around a scraped item; feed items carry none.
    pub stock: Option<StockSignals>,
}

impl ListingItem {
    /// Feed items are always treated as in stock.
    pub fn is_sold_out(&self) -> bool {
        self.stock
            .as_ref()
            .is_some_and(|signals| is_sold_out(&self.record.raw_status_text, signals))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SkipReason {
    MissingLink,
    EmptyHref,
    PseudoLink(String),
    UnresolvableHref(String),
    Duplicate(String),
    Untitled(String),
    MalformedEntry(String),
}

impl SkipReason {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingLink => "missing link",
            Self::EmptyHref => "empty href",
            Self::PseudoLink(_) => "pseudo link",
            Self::UnresolvableHref(_) => "unresolvable href",
            Self::Duplicate(_) => "duplicate",
            Self::Untitled(_) => "untitled",
            Self::MalformedEntry(_) => "malformed entry",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLink | Self::EmptyHref => f.write_str(self.kind()),
            Self::PseudoLink(detail)
            | Self::UnresolvableHref(detail)
            | Self::Duplicate(detail)
            | Self::Untitled(detail)
            | Self::MalformedEntry(detail) => write!(f, "{}: {}", self.kind(), detail),
        }
    }
}

pub type Extracted = std::result::Result<ListingItem, SkipReason>;

#[derive(Debug, Default)]
pub struct Listing {
    pub items: Vec<Extracted>,
    pub used_fallback: bool,
}

/// Fetches and extracts one site's listing with the site's strategy.
pub async fn extract(
    fetcher: &dyn Fetcher,
    site: &SiteConfig,
    brand_keywords: &[String],
    retry_pause: Duration,
) -> Result<Listing> {
    match &site.strategy {
        Strategy::Feed => {
            info!("Checking feed: {}...", site.name);
            let body = fetcher.fetch(&feed_url(&site.url), FEED_TIMEOUT).await?;
            Ok(Listing {
                items: parse_feed(&site.url, &body)?,
                used_fallback: false,
            })
        }
        Strategy::Selector { selector } => {
            info!("Checking page: {}...", site.name);
            let html = fetch_with_retry(fetcher, &site.url, PAGE_TIMEOUT, retry_pause).await?;
            parse_listing_page(&site.url, &html, selector, brand_keywords)
        }
    }
}

/// `products.json` beside the listing path, without query or fragment.
pub fn feed_url(listing: &Url) -> Url {
    let mut url = listing.clone();
    let path = format!("{}/{FEED_PATH}", listing.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    url
}

fn product_url(listing: &Url, handle: &str) -> Option<Url> {
    let mut root = listing.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root.join(&format!("{PRODUCT_PATH}/{handle}")).ok()
}

#[derive(Deserialize)]
struct Feed {
    #[serde(default)]
    products: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct FeedProduct {
    id: u64,
    title: String,
    handle: String,
}

pub fn parse_feed(listing: &Url, body: &str) -> Result<Vec<Extracted>> {
    let feed: Feed = serde_json::from_str(body).map_err(Error::Feed)?;
    Ok(feed
        .products
        .into_iter()
        .map(|entry| {
            let product: FeedProduct = serde_json::from_value(entry)
                .map_err(|e| SkipReason::MalformedEntry(e.to_string()))?;
            let url = product_url(listing, &product.handle)
                .ok_or_else(|| SkipReason::MalformedEntry(format!("handle {:?}", product.handle)))?;
            Ok(ListingItem {
                record: CandidateRecord {
                    identifier: product.id.to_string(),
                    title: product.title,
                    url: url.to_string(),
                    raw_status_text: String::new(),
                },
                stock: None,
            })
        })
        .collect())
}

pub fn parse_listing_page(
    base: &Url,
    html: &str,
    selector: &str,
    brand_keywords: &[String],
) -> Result<Listing> {
    let primary = Selector::parse(selector).map_err(|e| Error::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{e:?}"),
    })?;
    let document = Html::parse_document(html);

    let mut elements: Vec<ElementRef> = document.select(&primary).collect();
    let used_fallback = elements.is_empty();
    if used_fallback {
        warn!("No items found for selector: {}", selector);
        elements = document
            .select(&LINKS)
            .filter(|link| mentions_brand(*link, brand_keywords))
            .collect();
        info!("Fallback matches: {}", elements.len());
    }
    info!(
        "Parsed items: {}{}",
        elements.len(),
        if used_fallback { " (fallback)" } else { "" }
    );

    let mut seen_urls = HashSet::new();
    let items = elements
        .into_iter()
        .map(|element| listing_item(element, base, &mut seen_urls))
        .collect();
    Ok(Listing {
        items,
        used_fallback,
    })
}

fn element_text(element: ElementRef) -> String {
    normalize(&element.text().collect::<Vec<_>>().join(" "))
}

fn mentions_brand(link: ElementRef, brand_keywords: &[String]) -> bool {
    let href = link.value().attr("href").unwrap_or_default();
    let haystack = format!(
        "{} {}",
        percent_decode(href).to_lowercase(),
        element_text(link).to_lowercase()
    );
    brand_keywords
        .iter()
        .any(|keyword| haystack.contains(&keyword.to_lowercase()))
}

fn is_pseudo_link(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    lower.starts_with('#') || lower.starts_with("javascript:") || lower.starts_with("mailto:")
}

fn listing_item(element: ElementRef, base: &Url, seen_urls: &mut HashSet<String>) -> Extracted {
    let (link, text) = if element.value().name() == "a" {
        (Some(element), element_text(element))
    } else {
        let text = element
            .select(&TITLE)
            .next()
            .map_or_else(|| element_text(element), element_text);
        (element.select(&ANCHOR).next(), text)
    };
    let link = link.ok_or(SkipReason::MissingLink)?;

    let href = link.value().attr("href").map(str::trim).unwrap_or_default();
    if href.is_empty() {
        return Err(SkipReason::EmptyHref);
    }
    if is_pseudo_link(href) {
        return Err(SkipReason::PseudoLink(href.to_string()));
    }
    let url = base
        .join(href)
        .map_err(|_| SkipReason::UnresolvableHref(href.to_string()))?
        .to_string();
    if !seen_urls.insert(url.clone()) {
        return Err(SkipReason::Duplicate(url));
    }

    let raw_text = if text.chars().count() <= 2 {
        link.value()
            .attr("title")
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
            .or_else(|| Some(element_text(link)).filter(|text| !text.is_empty()))
            .unwrap_or_else(|| url.clone())
    } else {
        text
    };

    let title = clean_product_name(&raw_text, &url);
    if title.chars().count() <= 2 {
        return Err(SkipReason::Untitled(url));
    }

    Ok(ListingItem {
        stock: Some(StockSignals::collect([element, link])),
        record: CandidateRecord {
            identifier: url.clone(),
            title,
            url,
            raw_status_text: raw_text,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BRAND_KEYWORDS;
    use crate::testing::FakeFetcher;

    fn keywords() -> Vec<String> {
        BRAND_KEYWORDS.iter().map(|k| k.to_string()).collect()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn records(listing: &Listing) -> Vec<&CandidateRecord> {
        listing
            .items
            .iter()
            .filter_map(|item| item.as_ref().ok())
            .map(|item| &item.record)
            .collect()
    }

    #[test]
    fn feed_url_sits_beside_listing_path() {
        assert_eq!(
            feed_url(&url("https://vujade-studio.com/collections/all/?page=2")).as_str(),
            "https://vujade-studio.com/collections/all/products.json"
        );
        assert_eq!(
            feed_url(&url("https://www.refnet.tv")).as_str(),
            "https://www.refnet.tv/products.json"
        );
    }

    #[test]
    fn feed_entries_become_records() {
        let listing = url("https://www.refnet.tv/collections/vuja-de");
        let items = parse_feed(
            &listing,
            r#"{"products": [
                {"id": 8123456789, "title": "Vuja Dé Layered Tee", "handle": "vuja-de-layered-tee"},
                {"id": "oops", "title": "Broken"},
                {"id": 42, "title": "Cap", "handle": "cap", "variants": []}
            ]}"#,
        )
        .unwrap();

        assert_eq!(items.len(), 3);
        let first = items[0].as_ref().unwrap();
        assert_eq!(
            first.record,
            CandidateRecord {
                identifier: "8123456789".into(),
                title: "Vuja Dé Layered Tee".into(),
                url: "https://www.refnet.tv/products/vuja-de-layered-tee".into(),
                raw_status_text: String::new(),
            }
        );
        assert!(first.stock.is_none());
        assert!(!first.is_sold_out());
        assert!(matches!(items[1], Err(SkipReason::MalformedEntry(_))));
        assert_eq!(items[2].as_ref().unwrap().record.identifier, "42");
    }

    #[test]
    fn feed_without_products_is_empty() {
        let listing = url("https://www.refnet.tv/collections/vuja-de");
        assert!(parse_feed(&listing, "{}").unwrap().is_empty());
        assert!(matches!(
            parse_feed(&listing, "<html>blocked</html>"),
            Err(Error::Feed(_))
        ));
    }

    #[test]
    fn selector_extracts_cards() {
        let html = r#"
            <ul>
              <li class="beams-list-image-item">
                <a href="/item/vujade/tops/11140001/"><img src="x.jpg"></a>
                <p class="item_name">Vuja De Layered Tee $120</p>
              </li>
              <li class="beams-list-image-item">
                <a href="https://www.beams.co.jp/item/vujade/pants/11240002/">Wide Pants</a>
              </li>
            </ul>"#;
        let base = url("https://www.beams.co.jp/brand/005416/");
        let listing =
            parse_listing_page(&base, html, "li.beams-list-image-item", &keywords()).unwrap();

        assert!(!listing.used_fallback);
        let records = records(&listing);
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].identifier,
            "https://www.beams.co.jp/item/vujade/tops/11140001/"
        );
        assert_eq!(records[0].title, "Vuja De Layered Tee");
        assert_eq!(records[0].raw_status_text, "Vuja De Layered Tee $120");
        assert_eq!(records[1].title, "Wide Pants");
    }

    #[test]
    fn fallback_only_when_selector_misses() {
        let html = r#"
            <a href="/shop/vuja-de-hoodie">Hoodie</a>
            <a href="/shop/other-brand-tee">Other Tee</a>
            <a href="/shop/cap">VUJA DÉ Cap</a>
            <a href="/about">About</a>"#;
        let base = url("https://komune.space/shop/vuja-d%C3%A9");

        let listing = parse_listing_page(&base, html, "li.gone", &keywords()).unwrap();
        assert!(listing.used_fallback);
        let urls: Vec<_> = records(&listing).iter().map(|r| r.url.clone()).collect();
        assert_eq!(
            urls,
            [
                "https://komune.space/shop/vuja-de-hoodie",
                "https://komune.space/shop/cap"
            ]
        );

        let listing =
            parse_listing_page(&base, html, r#"a[href*="/shop/other"]"#, &keywords()).unwrap();
        assert!(!listing.used_fallback);
        assert_eq!(records(&listing).len(), 1);
    }

    #[test]
    fn same_url_yields_one_candidate() {
        let html = r#"
            <a class="p" href="/shop/vuja-de-tee">Vuja De Tee</a>
            <a class="p" href="https://komune.space/shop/vuja-de-tee">Vuja De Tee again</a>"#;
        let base = url("https://komune.space/shop/");
        let listing = parse_listing_page(&base, html, "a.p", &keywords()).unwrap();

        assert_eq!(records(&listing).len(), 1);
        assert_eq!(records(&listing)[0].title, "Vuja De Tee");
        assert!(matches!(listing.items[1], Err(SkipReason::Duplicate(_))));
    }

    #[test]
    fn rejects_unusable_links() {
        let html = r##"
            <div class="card"><span>No link here</span></div>
            <div class="card"><a>Missing href</a></div>
            <div class="card"><a href="#top">Back to top</a></div>
            <div class="card"><a href="javascript:void(0)">Quick view</a></div>
            <div class="card"><a href="mailto:shop@example.com">Mail</a></div>"##;
        let base = url("https://onlinestore.barneys.co.jp/items?bc=05918");
        let listing = parse_listing_page(&base, html, "div.card", &keywords()).unwrap();

        let reasons: Vec<_> = listing
            .items
            .iter()
            .map(|item| item.as_ref().unwrap_err().kind())
            .collect();
        assert_eq!(
            reasons,
            ["missing link", "empty href", "pseudo link", "pseudo link", "pseudo link"]
        );
    }

    #[test]
    fn short_text_falls_back_to_link_title() {
        let html = r#"
            <li class="item"><span class="name">-</span><a href="/items/1" title="Vuja De Coat">+</a></li>
            <li class="item"><a href="/items/vuja-de-knit-cardigan"></a></li>"#;
        let base = url("https://onlinestore.barneys.co.jp/items?bc=05918");
        let listing = parse_listing_page(&base, html, "li.item", &keywords()).unwrap();

        let records = records(&listing);
        assert_eq!(records[0].title, "Vuja De Coat");
        assert_eq!(records[0].raw_status_text, "Vuja De Coat");
        assert_eq!(
            records[1].raw_status_text,
            "https://onlinestore.barneys.co.jp/items/vuja-de-knit-cardigan"
        );
        assert_eq!(records[1].title, records[1].url);
    }

    #[test]
    fn sold_out_markup_is_kept_for_filtering() {
        let html = r#"
            <li class="product out-of-stock"><a href="/p/1"><span class="title">Vuja De Tee</span></a></li>
            <li class="product"><a href="/p/2"><span class="title">SOLD OUT Vuja De Cap</span></a></li>
            <li class="product"><a href="/p/3" data-stock-status="instock"><span class="title">Vuja De Bag</span></a></li>"#;
        let base = url("https://shop.example.com/");
        let listing = parse_listing_page(&base, html, "li.product", &keywords()).unwrap();

        let sold_out: Vec<_> = listing
            .items
            .iter()
            .map(|item| item.as_ref().unwrap().is_sold_out())
            .collect();
        assert_eq!(sold_out, [true, true, false]);
        assert_eq!(listing.items[1].as_ref().unwrap().record.title, "Vuja De Cap");
    }

    #[test]
    fn badge_only_text_is_untitled() {
        let html = r#"
            <li class="p"><a href="/p/ab">SOLD OUT</a></li>
            <li class="p"><a href="/p/x">Vuja De Tee</a></li>"#;
        let base = url("https://shop.example.com/");
        let listing = parse_listing_page(&base, html, "li.p", &[]).unwrap();

        assert_eq!(
            listing.items[0],
            Err(SkipReason::Untitled("https://shop.example.com/p/ab".into()))
        );
        assert_eq!(listing.items[1].as_ref().unwrap().record.title, "Vuja De Tee");
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let base = url("https://shop.example.com/");
        assert!(matches!(
            parse_listing_page(&base, "<p></p>", "li[", &keywords()),
            Err(Error::InvalidSelector { .. })
        ));
    }

    #[tokio::test]
    async fn extract_dispatches_by_strategy() {
        let feed_site = SiteConfig::new(
            "Refnet",
            "https://www.refnet.tv/collections/vuja-de",
            Strategy::Feed,
        )
        .unwrap();
        let page_site = SiteConfig::new(
            "Komune",
            "https://komune.space/shop/vuja-d%C3%A9",
            Strategy::Selector {
                selector: "a.product".into(),
            },
        )
        .unwrap();
        let fetcher = FakeFetcher::default()
            .page(
                "https://www.refnet.tv/collections/vuja-de/products.json",
                r#"{"products": [{"id": 1, "title": "Tee", "handle": "tee"}]}"#,
            )
            .fail_once("https://komune.space/shop/vuja-d%C3%A9")
            .page(
                "https://komune.space/shop/vuja-d%C3%A9",
                r#"<a class="product" href="/shop/vuja-de-tee">Vuja De Tee</a>"#,
            );

        let feed = extract(&fetcher, &feed_site, &keywords(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(records(&feed)[0].url, "https://www.refnet.tv/products/tee");

        let page = extract(&fetcher, &page_site, &keywords(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(
            records(&page)[0].identifier,
            "https://komune.space/shop/vuja-de-tee"
        );
        assert_eq!(fetcher.calls("https://komune.space/shop/vuja-d%C3%A9"), 2);
    }

    #[tokio::test]
    async fn feed_fetch_is_not_retried() {
        let site = SiteConfig::new("Refnet", "https://www.refnet.tv/collections/vuja-de", Strategy::Feed)
            .unwrap();
        let fetcher = FakeFetcher::default();
        assert!(extract(&fetcher, &site, &keywords(), Duration::ZERO).await.is_err());
        assert_eq!(
            fetcher.calls("https://www.refnet.tv/collections/vuja-de/products.json"),
            1
        );
    }
}
