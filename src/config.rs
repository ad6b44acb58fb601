use std::collections::HashSet;
use std::env::var;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_DATABASE: &str = "seen_products.json";
const DEFAULT_NOTIFY_DELAY: Duration = Duration::from_secs(1);

/// Spellings of the brand that mark a link as a product when a site's
/// own selector stops matching.
pub const BRAND_KEYWORDS: &[&str] = &[
    "vuja",
    "vuja-de",
    "vuja de",
    "vuja_d",
    "vuja-d",
    "vuja%20de",
    "vuja%2dde",
    "vuja-d%c3%a9",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// The store exposes `products.json` next to the listing page.
    Feed,
    /// Product cards are scraped out of the listing HTML.
    Selector { selector: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "SiteRecord")]
pub struct SiteConfig {
    pub name: String,
    pub url: Url,
    pub strategy: Strategy,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum StrategyKind {
    #[serde(alias = "shopify")]
    Feed,
    #[serde(alias = "custom")]
    Selector,
}

#[derive(Deserialize)]
struct SiteRecord {
    name: String,
    url: String,
    #[serde(rename = "type")]
    kind: StrategyKind,
    #[serde(default, alias = "css_selector")]
    selector: Option<String>,
}

impl TryFrom<SiteRecord> for SiteConfig {
    type Error = Error;

    fn try_from(record: SiteRecord) -> Result<Self> {
        let strategy = match record.kind {
            StrategyKind::Feed => Strategy::Feed,
            StrategyKind::Selector => match record.selector {
                Some(selector) if !selector.trim().is_empty() => Strategy::Selector { selector },
                _ => {
                    return Err(Error::Config(format!(
                        "site {:?} uses the selector strategy without a selector",
                        record.name
                    )));
                }
            },
        };
        SiteConfig::new(record.name, &record.url, strategy)
    }
}

impl SiteConfig {
    pub fn new(name: impl Into<String>, url: &str, strategy: Strategy) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl {
                url: url.to_string(),
                reason: "only http and https listings are supported".into(),
            });
        }
        Ok(Self {
            name: name.into(),
            url,
            strategy,
        })
    }

    fn feed(name: &str, url: &str) -> Result<Self> {
        Self::new(name, url, Strategy::Feed)
    }

    fn selector(name: &str, url: &str, selector: &str) -> Result<Self> {
        Self::new(
            name,
            url,
            Strategy::Selector {
                selector: selector.to_string(),
            },
        )
    }
}

pub fn default_sites() -> Result<Vec<SiteConfig>> {
    Ok(vec![
        SiteConfig::feed("Vuja De Official", "https://vujade-studio.com/collections/all")?,
        SiteConfig::feed(
            "Adelaide Addition",
            "https://adelaide-addition.com/collections/vujade",
        )?,
        SiteConfig::feed(
            "Why are you here?",
            "https://whyareyouhere.jp/collections/vujade",
        )?,
        SiteConfig::feed("Refnet", "https://www.refnet.tv/collections/vuja-de")?,
        SiteConfig::selector(
            "Komune",
            "https://komune.space/shop/vuja-d%C3%A9",
            r#"a[href*="/shop/vuja-de"]"#,
        )?,
        SiteConfig::selector(
            "BEAMS (Japan)",
            "https://www.beams.co.jp/brand/005416/",
            "li.beams-list-image-item",
        )?,
        SiteConfig::selector(
            "Barneys Japan",
            "https://onlinestore.barneys.co.jp/items?bc=05918",
            ".item_list li, .product-list-item, .js-product-list-item",
        )?,
    ])
}

/// Parses a JSON array of `{name, url, type, selector?}` records.
pub fn parse_sites(json: &str) -> Result<Vec<SiteConfig>> {
    let sites: Vec<SiteConfig> = serde_json::from_str(json).map_err(Error::SiteList)?;
    ensure_unique_names(&sites)?;
    Ok(sites)
}

fn ensure_unique_names(sites: &[SiteConfig]) -> Result<()> {
    let mut names = HashSet::new();
    for site in sites {
        if !names.insert(site.name.as_str()) {
            return Err(Error::Config(format!("duplicate site name {:?}", site.name)));
        }
    }
    Ok(())
}

/// When a product counts as notified.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Record after any delivery attempt, failed or disabled ones included.
    #[default]
    RecordAfterAttempt,
    /// Record only once the webhook accepted the alert.
    RecordOnSuccess,
}

impl std::str::FromStr for DeliveryPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "record-after-attempt" => Ok(Self::RecordAfterAttempt),
            "record-on-success" => Ok(Self::RecordOnSuccess),
            other => Err(Error::Config(format!("unknown delivery policy {other:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub webhook_url: Option<String>,
    pub database_path: PathBuf,
    pub sites: Vec<SiteConfig>,
    pub brand_keywords: Vec<String>,
    pub notify_delay: Duration,
    pub delivery_policy: DeliveryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| var(key).ok())
    }

    /// Builds the configuration from `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let webhook_url = lookup("DISCORD_WEBHOOK_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        let database_path = lookup("SEEN_DATABASE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));
        let sites = match lookup("SITES_FILE") {
            Some(path) => parse_sites(&std::fs::read_to_string(path)?)?,
            None => default_sites()?,
        };
        let notify_delay = match lookup("NOTIFY_DELAY_MS") {
            Some(ms) => Duration::from_millis(ms.trim().parse().map_err(|e| {
                Error::Config(format!("NOTIFY_DELAY_MS must be milliseconds: {e}"))
            })?),
            None => DEFAULT_NOTIFY_DELAY,
        };
        let delivery_policy = match lookup("DELIVERY_POLICY") {
            Some(policy) => policy.parse()?,
            None => DeliveryPolicy::default(),
        };

        Ok(Self {
            webhook_url,
            database_path,
            sites,
            brand_keywords: BRAND_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            notify_delay,
            delivery_policy,
        })
    }
}
