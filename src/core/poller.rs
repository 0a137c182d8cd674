use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::core::dedupe::DedupeTracker;
use crate::error::PlatformError;
use crate::models::{Item, SearchMode};
use crate::providers::AccountHandle;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub query: String,
    pub window: usize,
    pub timeout: Duration,
    pub mode: SearchMode,
}

impl PollerConfig {
    /// Mentions of `handle`, newest 20, 15s budget.
    pub fn mentions_of(handle: &str) -> Self {
        PollerConfig {
            query: format!("@{}", handle.trim_start_matches('@')),
            window: 20,
            timeout: Duration::from_secs(15),
            mode: SearchMode::Latest,
        }
    }
}

/// Fetches candidate items and lets through only the ones nobody has handled yet.
pub struct TimelinePoller {
    account: Arc<AccountHandle>,
    dedupe: Arc<DedupeTracker>,
    own_handle: String,
    config: PollerConfig,
}

impl TimelinePoller {
    pub fn new(
        account: Arc<AccountHandle>,
        dedupe: Arc<DedupeTracker>,
        own_handle: &str,
        config: PollerConfig,
    ) -> Self {
        TimelinePoller {
            account,
            dedupe,
            own_handle: own_handle.trim_start_matches('@').to_string(),
            config,
        }
    }

    /// One fetch through the account queue. Errors and timeouts yield an empty
    /// batch; the next cycle is the retry.
    pub async fn poll(&self) -> Vec<Item> {
        let client = Arc::clone(&self.account.client);
        let query = self.config.query.clone();
        let limit = self.config.window;
        let mode = self.config.mode;

        let fetch = self
            .account
            .queue
            .submit(move || async move { client.search_recent(&query, limit, mode).await });

        let fetched = match tokio::time::timeout(self.config.timeout, fetch).await {
            Ok(Ok(Ok(items))) => items,
            Ok(Ok(Err(e))) if e.is_transient() => {
                warn!(account = %self.account.account, error = %e, "Transient fetch failure, retrying next cycle");
                return Vec::new();
            }
            Ok(Ok(Err(e))) => {
                error!(account = %self.account.account, error = %e, "Fetching candidate items failed");
                return Vec::new();
            }
            Ok(Err(e)) => {
                error!(account = %self.account.account, error = %e, "Fetch never ran");
                return Vec::new();
            }
            Err(_) => {
                let e = PlatformError::Timeout(self.config.timeout);
                warn!(account = %self.account.account, error = %e, "Returning empty batch");
                return Vec::new();
            }
        };

        let fetched_count = fetched.len();
        let mut accepted = Vec::with_capacity(fetched_count);
        for item in fetched {
            if item.author_handle.eq_ignore_ascii_case(&self.own_handle) {
                debug!(item_id = %item.id, "Skipping own post");
                continue;
            }
            if self.dedupe.should_process(&item).await {
                accepted.push(item);
            }
        }

        if !accepted.is_empty() {
            info!(fetched = fetched_count, accepted = accepted.len(), "Found new items");
        }
        accepted
    }
}
