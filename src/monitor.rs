use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::{Config, DeliveryPolicy, SiteConfig};
use crate::error::Error;
use crate::extract::{Listing, extract};
use crate::fetch::{Fetcher, RETRY_PAUSE};
use crate::notify::{Delivery, NotificationPayload, Notifier};
use crate::seen::SeenDatabase;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SiteSummary {
    pub candidates: usize,
    pub skipped: BTreeMap<&'static str, usize>,
    pub sold_out: usize,
    pub already_seen: usize,
    pub new_products: usize,
    pub failed_deliveries: usize,
    pub used_fallback: bool,
}

#[derive(Debug)]
pub enum SiteOutcome {
    Checked(SiteSummary),
    Failed(Error),
}

#[derive(Debug)]
pub struct SiteReport {
    pub site: String,
    pub outcome: SiteOutcome,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub sites: Vec<SiteReport>,
}

impl RunReport {
    pub fn new_products(&self) -> usize {
        self.summaries().map(|s| s.new_products).sum()
    }

    pub fn failed_deliveries(&self) -> usize {
        self.summaries().map(|s| s.failed_deliveries).sum()
    }

    pub fn failed_sites(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.sites.iter().filter_map(|report| match &report.outcome {
            SiteOutcome::Failed(e) => Some((report.site.as_str(), e)),
            SiteOutcome::Checked(_) => None,
        })
    }

    fn summaries(&self) -> impl Iterator<Item = &SiteSummary> {
        self.sites.iter().filter_map(|report| match &report.outcome {
            SiteOutcome::Checked(summary) => Some(summary),
            SiteOutcome::Failed(_) => None,
        })
    }
}

/// Walks the configured sites in order and alerts on products not seen before.
pub struct Monitor {
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn Notifier>,
    brand_keywords: Vec<String>,
    policy: DeliveryPolicy,
    retry_pause: Duration,
}

impl Monitor {
    pub fn new(fetcher: Arc<dyn Fetcher>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        Self {
            fetcher,
            notifier,
            brand_keywords: config.brand_keywords.clone(),
            policy: config.delivery_policy,
            retry_pause: RETRY_PAUSE,
        }
    }

    #[cfg(test)]
    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// Checks every site; a failing site never stops the others.
    pub async fn run(&self, sites: &[SiteConfig], db: &mut SeenDatabase) -> RunReport {
        let mut reports = Vec::with_capacity(sites.len());
        for site in sites {
            let listing = extract(
                self.fetcher.as_ref(),
                site,
                &self.brand_keywords,
                self.retry_pause,
            )
            .await;
            let outcome = match listing {
                Ok(listing) => SiteOutcome::Checked(self.reconcile(site, listing, db).await),
                Err(e) => {
                    error!("Error checking {}: {}", site.name, e);
                    SiteOutcome::Failed(e)
                }
            };
            reports.push(SiteReport {
                site: site.name.clone(),
                outcome,
            });
        }
        RunReport { sites: reports }
    }

    async fn reconcile(
        &self,
        site: &SiteConfig,
        listing: Listing,
        db: &mut SeenDatabase,
    ) -> SiteSummary {
        let mut summary = SiteSummary {
            used_fallback: listing.used_fallback,
            ..Default::default()
        };

        for item in listing.items {
            let item = match item {
                Ok(item) => item,
                Err(reason) => {
                    debug!("Skipping item on {}: {}", site.name, reason);
                    *summary.skipped.entry(reason.kind()).or_default() += 1;
                    continue;
                }
            };
            summary.candidates += 1;

            if item.is_sold_out() {
                debug!("Sold out on {}: {}", site.name, item.record.url);
                summary.sold_out += 1;
                continue;
            }
            let record = item.record;
            if !db.is_novel(&site.name, &record.identifier) {
                summary.already_seen += 1;
                continue;
            }

            info!("Found new: {}", record.title);
            summary.new_products += 1;
            let delivery = self
                .notifier
                .notify(&NotificationPayload::new(&record, &site.name))
                .await;
            if let Delivery::Failed(_) = delivery {
                summary.failed_deliveries += 1;
            }
            if self.should_record(&delivery) {
                db.record_seen(&site.name, &record.identifier);
            }
        }

        info!(
            "{}: {} candidates{}, {} new, {} already seen, {} sold out, {} skipped",
            site.name,
            summary.candidates,
            if summary.used_fallback { " (fallback)" } else { "" },
            summary.new_products,
            summary.already_seen,
            summary.sold_out,
            summary.skipped.values().sum::<usize>()
        );
        summary
    }

    fn should_record(&self, delivery: &Delivery) -> bool {
        match self.policy {
            DeliveryPolicy::RecordAfterAttempt => true,
            DeliveryPolicy::RecordOnSuccess => *delivery == Delivery::Sent,
        }
    }
}
