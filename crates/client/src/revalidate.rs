//! Background refresh queue.
//!
//! Strategies that serve a stale entry hand the refetch to this queue
//! instead of blocking the response on it. A single worker drains the queue
//! in order; the process shuts the queue down explicitly and waits for the
//! worker, so a refresh accepted before shutdown always finishes its store
//! write instead of being killed between the entry and its timestamp.

use std::sync::Arc;

use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shulboard_core::{StoreDb, Tier};

use crate::fetch::Upstream;
use crate::strategy::fetch_and_cache;

enum RefreshJob {
    Refresh { tier: Tier, url: Url },
    Shutdown,
}

/// Cheap handle for enqueueing refresh work.
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::UnboundedSender<RefreshJob>,
}

impl RefreshHandle {
    /// Queue a background refetch of `url` into `tier`.
    ///
    /// Fire-and-forget: the caller never learns whether the refresh
    /// succeeded. A queue that is already shut down drops the job.
    pub fn enqueue(&self, tier: &Tier, url: &Url) {
        let job = RefreshJob::Refresh { tier: tier.clone(), url: url.clone() };
        if self.tx.send(job).is_err() {
            tracing::debug!(%tier, %url, "refresh queue closed, dropping job");
        }
    }
}

/// Owns the refresh worker task.
pub struct Revalidator {
    tx: mpsc::UnboundedSender<RefreshJob>,
    worker: JoinHandle<()>,
}

impl Revalidator {
    /// Spawn the worker on the current runtime.
    pub fn spawn(store: StoreDb, upstream: Arc<dyn Upstream>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    RefreshJob::Refresh { tier, url } => {
                        match fetch_and_cache(&store, upstream.as_ref(), &tier, &url).await {
                            Ok(_) => tracing::debug!(%tier, %url, "background refresh done"),
                            Err(err) => {
                                tracing::debug!(%tier, %url, error = %err, "background refresh failed")
                            }
                        }
                    }
                    RefreshJob::Shutdown => break,
                }
            }
            tracing::debug!("refresh worker stopped");
        });

        Self { tx, worker }
    }

    /// A handle strategies can clone freely.
    pub fn handle(&self) -> RefreshHandle {
        RefreshHandle { tx: self.tx.clone() }
    }

    /// Drain everything queued so far, then stop the worker.
    ///
    /// Jobs enqueued before this call are still executed; jobs enqueued
    /// after it race the close marker and may be dropped.
    pub async fn shutdown(self) {
        if self.tx.send(RefreshJob::Shutdown).is_err() {
            tracing::debug!("refresh worker already gone");
        }
        if let Err(err) = self.worker.await {
            tracing::warn!(error = %err, "refresh worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::UpstreamResponse;
    use async_trait::async_trait;
    use bytes::Bytes;
    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;
    use shulboard_core::{Error, TierKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingUpstream {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Upstream for CountingUpstream {
        async fn fetch(&self, url: &Url) -> Result<UpstreamResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(UpstreamResponse {
                url: url.clone(),
                final_url: url.clone(),
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::from_static(b"refreshed"),
                cross_origin: false,
                fetch_ms: 1,
            })
        }
    }

    #[tokio::test]
    async fn test_queued_jobs_run_before_shutdown_returns() {
        let store = StoreDb::open_in_memory().await.unwrap();
        let upstream = Arc::new(CountingUpstream { calls: AtomicUsize::new(0) });
        let revalidator = Revalidator::spawn(store.clone(), upstream.clone());
        let handle = revalidator.handle();
        let tier = Tier::new(TierKind::Runtime, "v1");

        handle.enqueue(&tier, &Url::parse("http://127.0.0.1:9090/a").unwrap());
        handle.enqueue(&tier, &Url::parse("http://127.0.0.1:9090/b").unwrap());
        revalidator.shutdown().await;

        assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
        let a = store
            .match_entry(&tier, "http://127.0.0.1:9090/a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.body, b"refreshed".to_vec());
    }

    #[tokio::test]
    async fn test_shutdown_with_empty_queue() {
        let store = StoreDb::open_in_memory().await.unwrap();
        let upstream = Arc::new(CountingUpstream { calls: AtomicUsize::new(0) });
        let revalidator = Revalidator::spawn(store, upstream.clone());

        revalidator.shutdown().await;
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_dropped() {
        let store = StoreDb::open_in_memory().await.unwrap();
        let upstream = Arc::new(CountingUpstream { calls: AtomicUsize::new(0) });
        let revalidator = Revalidator::spawn(store, upstream.clone());
        let handle = revalidator.handle();
        revalidator.shutdown().await;

        let tier = Tier::new(TierKind::Runtime, "v1");
        handle.enqueue(&tier, &Url::parse("http://127.0.0.1:9090/late").unwrap());

        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }
}
