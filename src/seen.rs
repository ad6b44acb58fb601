use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use tracing::{debug, warn};

use crate::error::Result;

/// Identifiers already notified for one site, kept in the order they were recorded.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
struct SiteSeen {
    order: Vec<String>,
    index: HashSet<String>,
}

impl SiteSeen {
    fn insert(&mut self, identifier: &str) -> bool {
        if !self.index.insert(identifier.to_string()) {
            return false;
        }
        self.order.push(identifier.to_string());
        true
    }
}

impl From<Vec<String>> for SiteSeen {
    fn from(identifiers: Vec<String>) -> Self {
        let mut seen = Self::default();
        for identifier in &identifiers {
            seen.insert(identifier);
        }
        seen
    }
}

impl From<SiteSeen> for Vec<String> {
    fn from(seen: SiteSeen) -> Self {
        seen.order
    }
}

/// Site name to identifiers that have already triggered a notification.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeenDatabase {
    sites: BTreeMap<String, SiteSeen>,
}

impl SeenDatabase {
    /// Reads the database, treating a missing or unreadable file as empty.
    pub async fn load(path: &Path) -> Self {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("No seen database at {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(db) => db,
            Err(e) => {
                warn!("Ignoring malformed seen database {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Overwrites `path` with the whole database.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        self.serialize(&mut serializer).map_err(std::io::Error::from)?;
        tokio::fs::write(path, buf).await?;
        Ok(())
    }

    pub fn is_novel(&self, site: &str, identifier: &str) -> bool {
        self.sites
            .get(site)
            .is_none_or(|seen| !seen.index.contains(identifier))
    }

    /// Returns false when the identifier was already recorded for `site`.
    pub fn record_seen(&mut self, site: &str, identifier: &str) -> bool {
        self.sites.entry(site.to_string()).or_default().insert(identifier)
    }

    #[cfg(test)]
    pub fn identifiers(&self, site: &str) -> &[String] {
        self.sites
            .get(site)
            .map(|seen| seen.order.as_slice())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sites.values().map(|seen| seen.order.len()).sum()
    }
}
