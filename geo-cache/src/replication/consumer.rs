use std::{
    future::Future,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex},
    time::Instant,
};

use tokio::{select, sync::mpsc};
use tracing::{debug, error, info};

use crate::cache::{CacheKey, CacheValue};
use crate::message::Message;
use crate::state::{self, ApplyOutcome, CacheState};

/// The single worker that applies remote writes.
///
/// Messages arrive from every listener connection through one unbounded
/// queue and are applied in queue order, each under the cache lock. A
/// failure while applying one message is logged and the loop moves on: this
/// is the only path by which peer writes reach the local store.
pub struct UpdateConsumer<K, V> {
    state: Arc<Mutex<CacheState<K, V>>>,
    inbound: mpsc::UnboundedReceiver<Message<K, V>>,
}

impl<K, V> UpdateConsumer<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    pub fn new(
        state: Arc<Mutex<CacheState<K, V>>>,
        inbound: mpsc::UnboundedReceiver<Message<K, V>>,
    ) -> Self {
        Self { state, inbound }
    }

    /// Applies messages until `shutdown` resolves, then drains whatever is
    /// already queued.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => break,
                message = self.inbound.recv() => match message {
                    Some(message) => self.apply(message),
                    None => break,
                },
            }
        }

        self.inbound.close();
        let mut drained = 0usize;
        while let Ok(message) = self.inbound.try_recv() {
            self.apply(message);
            drained += 1;
        }
        info!(drained, "update consumer stopped");
    }

    fn apply(&self, message: Message<K, V>) {
        let key = message.key.clone();
        let version = message.version;
        let region = message.region.clone();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            state::lock(&self.state).apply_remote(message, Instant::now())
        }));

        match outcome {
            Ok(ApplyOutcome::Applied { evicted }) => {
                debug!(key = ?key, version, region = %region, evicted = ?evicted, "applied remote write");
            }
            Ok(ApplyOutcome::Stale { current }) => {
                debug!(key = ?key, version, current, region = %region, "ignored stale remote write");
            }
            Err(_) => {
                error!(key = ?key, version, region = %region, "panicked while applying remote write");
            }
        }
    }
}
