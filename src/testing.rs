use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::notify::{Delivery, NotificationPayload, Notifier};

/// Serves canned bodies by URL; unknown URLs fail.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, String>,
    fail_once: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeFetcher {
    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn fail_once(self, url: &str) -> Self {
        self.fail_once.lock().unwrap().insert(url.to_string());
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or_default()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<String> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let failure = |reason: &str| Error::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        if self.fail_once.lock().unwrap().remove(url.as_str()) {
            return Err(failure("connection reset"));
        }
        self.pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| failure("404 Not Found"))
    }
}

/// Records every payload and answers with a fixed delivery outcome.
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationPayload>>,
    outcome: Delivery,
}

impl RecordingNotifier {
    pub fn new(outcome: Delivery) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            outcome,
        }
    }

    pub fn sent(&self) -> Vec<NotificationPayload> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, payload: &NotificationPayload) -> Delivery {
        self.sent.lock().unwrap().push(payload.clone());
        self.outcome.clone()
    }
}
