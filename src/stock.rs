use scraper::ElementRef;

use crate::text::normalize;

const SOLD_OUT_MARKERS: &[&str] = &[
    "sold out",
    "soldout",
    "out of stock",
    "out-of-stock",
    "no stock",
    "not available",
    "在庫なし",
    "完売",
    "欠品",
];

const STATUS_ATTRIBUTES: &[&str] = &["aria-label", "data-stock-status", "title"];

/// Class names and status-bearing attribute values gathered from the
/// elements that make up one listing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StockSignals {
    pub class_names: Vec<String>,
    pub attributes: Vec<String>,
}

impl StockSignals {
    pub fn collect<'a>(elements: impl IntoIterator<Item = ElementRef<'a>>) -> Self {
        let mut signals = Self::default();
        for element in elements {
            let value = element.value();
            signals.class_names.extend(value.classes().map(str::to_string));
            signals.attributes.extend(
                STATUS_ATTRIBUTES
                    .iter()
                    .filter_map(|name| value.attr(name))
                    .map(str::to_string),
            );
        }
        signals
    }
}

pub fn is_sold_out(raw_text: &str, signals: &StockSignals) -> bool {
    let blob = std::iter::once(raw_text)
        .chain(signals.class_names.iter().map(String::as_str))
        .chain(signals.attributes.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");
    let blob = normalize(&blob).to_lowercase();
    SOLD_OUT_MARKERS.iter().any(|marker| blob.contains(marker))
}
