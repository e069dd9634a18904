use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::store::StatusStore;
use crate::transfer::{TransferKey, TransferSnapshot};

/// what an observer receives
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Snapshot(TransferSnapshot),
    /// the transfer never appeared within the grace window, or was retired
    NotFound,
}

#[derive(Debug, Clone, Copy)]
pub struct SubscribeOptions {
    pub poll_interval: Duration,
    /// how long an unknown key may take to show up before giving up
    pub appear_grace: Duration,
}

impl From<&Config> for SubscribeOptions {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            appear_grace: config.subscribe_grace,
        }
    }
}

struct Poller {
    store: Arc<StatusStore>,
    key: TransferKey,
    options: SubscribeOptions,
    cancel: CancellationToken,
    started: Instant,
    polled: bool,
    seen: bool,
    last: Option<TransferSnapshot>,
}

impl Drop for Poller {
    fn drop(&mut self) {
        tracing::debug!("Subscription for {} closed", self.key);
    }
}

/// watch the snapshots of `key` until it ends
///
/// the store is polled every `poll_interval`; unchanged snapshots are skipped.
/// the stream ends after the first terminal snapshot, after a single
/// [`SubscriptionEvent::NotFound`], or silently once `cancel` fires. dropping
/// the stream stops polling immediately.
pub fn subscribe(
    store: Arc<StatusStore>,
    key: TransferKey,
    options: SubscribeOptions,
    cancel: CancellationToken,
) -> BoxStream<'static, SubscriptionEvent> {
    tracing::debug!("Subscription opened for {}", key);

    let poller = Poller {
        store,
        key,
        options,
        cancel,
        started: Instant::now(),
        polled: false,
        seen: false,
        last: None,
    };

    stream::unfold(Some(poller), |state| async move {
        let mut poller = state?;
        loop {
            if poller.polled {
                tokio::select! {
                    _ = poller.cancel.cancelled() => return None,
                    _ = tokio::time::sleep(poller.options.poll_interval) => {}
                }
            }
            poller.polled = true;
            if poller.cancel.is_cancelled() {
                return None;
            }

            match poller.store.get(&poller.key) {
                Some(snapshot) => {
                    poller.seen = true;
                    if poller.last.as_ref() == Some(&snapshot) {
                        continue;
                    }
                    poller.last = Some(snapshot.clone());
                    let next = if snapshot.is_terminal() { None } else { Some(poller) };
                    return Some((SubscriptionEvent::Snapshot(snapshot), next));
                }
                None if poller.seen || poller.started.elapsed() >= poller.options.appear_grace => {
                    tracing::debug!("No transfer found for {}", poller.key);
                    return Some((SubscriptionEvent::NotFound, None));
                }
                None => continue,
            }
        }
    })
    .boxed()
}
