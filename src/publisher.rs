use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};

use crate::error::RelayError;
use crate::relay::ChunkStream;
use crate::store::StatusStore;
use crate::transfer::{TransferKey, TransferSnapshot};

/// publishes live progress of relays into the shared status store
#[derive(Clone)]
pub struct ProgressPublisher {
    store: Arc<StatusStore>,
    retire_after: Duration,
}

impl ProgressPublisher {
    pub fn new(store: Arc<StatusStore>, retire_after: Duration) -> Self {
        Self { store, retire_after }
    }

    /// register a transfer for `key`; call this before the upstream is opened
    /// so speed is measured from the moment the relay was requested
    pub fn begin(&self, key: TransferKey) -> TransferTracker {
        let generation = self.store.begin(&key, TransferSnapshot::started());
        tracing::info!("▶️  Transfer started: {}", key);

        TransferTracker {
            store: self.store.clone(),
            key,
            generation,
            started: Instant::now(),
            retire_after: self.retire_after,
            last: TransferSnapshot::started(),
            terminal: false,
        }
    }
}

/// single writer for one transfer's snapshot
///
/// dropping the tracker always schedules retirement of the entry. if it is
/// dropped before a terminal snapshot was written (the client went away and
/// the body stream was discarded) the transfer is marked as failed first, so
/// observers never wait on a transfer nobody is driving.
pub struct TransferTracker {
    store: Arc<StatusStore>,
    key: TransferKey,
    generation: u64,
    started: Instant,
    retire_after: Duration,
    last: TransferSnapshot,
    terminal: bool,
}

impl TransferTracker {
    /// recompute and store the snapshot after `bytes_downloaded` bytes
    pub fn record(&mut self, bytes_downloaded: u64, total_bytes: Option<u64>) {
        if self.terminal {
            return;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let snapshot = TransferSnapshot::streaming(bytes_downloaded, total_bytes, elapsed);
        self.write(snapshot);
    }

    /// mark the transfer finished, numbers stay as last recorded
    pub fn finish(mut self) {
        self.complete();
    }

    /// mark the transfer failed with `err` as the message
    pub fn fail(mut self, err: &RelayError) {
        let snapshot = self.last.clone().failed(err.to_string());
        if self.terminate(snapshot) {
            tracing::warn!("❌ Transfer failed: {} ({})", self.key, err);
        }
    }

    /// wrap `chunks` so every chunk updates the snapshot before it is yielded
    pub fn track(self, chunks: ChunkStream, total_bytes: Option<u64>) -> ChunkStream {
        let mut tracker = self;
        tracker.record(0, total_bytes);
        if total_bytes == Some(0) {
            tracker.complete();
        }

        stream::unfold(Some((tracker, chunks, 0u64)), move |state| async move {
            let (mut tracker, mut chunks, downloaded) = state?;
            match chunks.next().await {
                Some(Ok(chunk)) => {
                    let downloaded = downloaded + chunk.len() as u64;
                    tracker.record(downloaded, total_bytes);
                    // a server stops polling once the declared length is written
                    if total_bytes.is_some_and(|total| downloaded >= total) {
                        tracker.complete();
                    }
                    tracing::trace!("Relayed {} bytes of {}", downloaded, tracker.key);
                    Some((Ok(chunk), Some((tracker, chunks, downloaded))))
                }
                Some(Err(err)) => {
                    tracker.fail(&err);
                    Some((Err(err), None))
                }
                None => {
                    tracker.finish();
                    None
                }
            }
        })
        .boxed()
    }

    fn complete(&mut self) {
        let snapshot = self.last.clone().finished();
        if self.terminate(snapshot) {
            tracing::info!(
                "✅ Transfer finished: {} ({} bytes)",
                self.key,
                self.last.bytes_downloaded
            );
        }
    }

    /// every declared byte went through, nothing is left to wait for
    fn delivered_all(&self) -> bool {
        self.last
            .total_bytes
            .is_some_and(|total| self.last.bytes_downloaded >= total)
    }

    fn write(&mut self, snapshot: TransferSnapshot) {
        if !self.store.put(&self.key, self.generation, snapshot.clone()) {
            tracing::debug!("Status entry for {} was superseded", self.key);
        }
        self.last = snapshot;
    }

    /// write the terminal snapshot, only the first call has any effect
    fn terminate(&mut self, snapshot: TransferSnapshot) -> bool {
        if self.terminal {
            return false;
        }
        self.write(snapshot);
        self.terminal = true;
        true
    }

    fn schedule_retirement(&self) {
        let store = self.store.clone();
        let key = self.key.clone();
        let generation = self.generation;
        let delay = self.retire_after;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if store.retire(&key, generation) {
                        tracing::info!("🧹 Cleaned up status for {}", key);
                    }
                });
            }
            Err(_) => {
                // no runtime to wait on, retire right away
                store.retire(&key, generation);
            }
        }
    }
}

impl Drop for TransferTracker {
    fn drop(&mut self) {
        if !self.terminal && self.delivered_all() {
            self.complete();
        }
        if !self.terminal {
            let snapshot = self
                .last
                .clone()
                .failed(RelayError::ClientDisconnected.to_string());
            self.terminate(snapshot);
            tracing::warn!(
                "🔌 Client disconnected from {} after {} bytes, upstream closed",
                self.key,
                self.last.bytes_downloaded
            );
        }
        self.schedule_retirement();
    }
}
