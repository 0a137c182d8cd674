use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::memory::{CacheKeys, DurableCache, SetOptions};
use crate::models::{OutboundPost, PostedRecord, SentPost};
use crate::providers::AccountHandle;

/// Submits replies through the account queue, keeping a minimum gap between
/// consecutive submissions. No retries here; a failed post is the item's failure.
pub struct Poster {
    account: Arc<AccountHandle>,
    cache: Arc<dyn DurableCache>,
    keys: CacheKeys,
    min_spacing: Duration,
    last_post: Mutex<Option<Instant>>,
    dry_run: bool,
}

impl Poster {
    pub fn new(
        account: Arc<AccountHandle>,
        cache: Arc<dyn DurableCache>,
        keys: CacheKeys,
        min_spacing: Duration,
    ) -> Self {
        Poster {
            account,
            cache,
            keys,
            min_spacing,
            last_post: Mutex::new(None),
            dry_run: false,
        }
    }

    /// Log replies instead of sending them.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub async fn post(&self, outbound: &OutboundPost) -> Result<PostedRecord, PipelineError> {
        if outbound.text.trim().is_empty() {
            return Err(PipelineError::ContractViolation(format!(
                "refusing to post empty text (reply to {:?})",
                outbound.reply_to_id
            )));
        }

        let submitted = {
            let mut last_post = self.last_post.lock().await;
            if let Some(previous) = *last_post {
                let ready_at = previous + self.min_spacing;
                if Instant::now() < ready_at {
                    debug!(wait = ?(ready_at - Instant::now()), "Delaying post for spacing");
                    tokio::time::sleep_until(ready_at).await;
                }
            }
            *last_post = Some(Instant::now());
            self.submit(outbound)
        };
        let sent = submitted.await?;

        let record = PostedRecord {
            id: sent.id,
            permalink: sent.permalink,
            created_at: Utc::now(),
        };
        self.remember(&record).await;

        info!(
            account = %self.account.account,
            reply_to = ?outbound.reply_to_id,
            post_id = %record.id,
            with_image = outbound.image.is_some(),
            "Posted reply"
        );
        Ok(record)
    }

    // Enqueues synchronously so queue order follows spacing order
    fn submit(
        &self,
        outbound: &OutboundPost,
    ) -> impl std::future::Future<Output = Result<SentPost, PipelineError>> {
        let dry_run = self.dry_run;
        let client = Arc::clone(&self.account.client);
        let text = outbound.text.clone();
        let reply_to = outbound.reply_to_id.clone();
        let media = outbound.image.clone();

        let queued = (!dry_run).then(|| {
            self.account.queue.submit(move || async move {
                client
                    .send_reply(&text, reply_to.as_deref(), media.as_ref())
                    .await
            })
        });
        let preview = outbound.text.clone();

        async move {
            match queued {
                Some(queued) => match queued.await {
                    Ok(result) => result.map_err(PipelineError::from),
                    Err(e) => Err(PipelineError::from(e)),
                },
                None => {
                    info!(text = %preview, "Dry run, not sending reply");
                    Ok(SentPost {
                        id: format!("dry-run-{}", Utc::now().timestamp_millis()),
                        permalink: String::new(),
                    })
                }
            }
        }
    }

    async fn remember(&self, record: &PostedRecord) {
        let value = match serde_json::to_string(record) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Could not serialize posted record");
                return;
            }
        };
        if let Err(e) = self
            .cache
            .set(&self.keys.last_post(), &value, SetOptions::default())
            .await
        {
            warn!(error = %e, "Failed to cache last post");
        }
    }
}
