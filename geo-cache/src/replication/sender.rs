use std::{io, net::SocketAddr, sync::Arc};

use anyhow::{Result, bail};
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    select,
    sync::{
        mpsc::{self, error::TrySendError},
        watch,
    },
    task::{JoinHandle, JoinSet},
    time::sleep,
};
use tracing::{debug, error, warn};

use super::stopped;
use crate::config::{CacheConfig, RetryPolicy};

/// An encoded write, shared by every peer it is sent to.
type Payload = Arc<[u8]>;

struct PeerQueue {
    addr: SocketAddr,
    queue: mpsc::Sender<Payload>,
}

/// Fans local writes out to every peer without blocking the writer.
///
/// Each peer gets a bounded queue and a dispatcher task. The dispatcher runs
/// at most `max_in_flight` deliveries for its peer at a time; each delivery
/// retries on its own schedule. When a peer is down long enough for its
/// queue to fill, further writes for that peer are dropped with a warning
/// rather than piling up tasks.
///
/// Delivery is best effort. There is no acknowledgement and no backfill: a
/// peer that stays unreachable past the retry budget misses the write.
pub struct ReplicationSender {
    peers: Vec<PeerQueue>,
}

impl ReplicationSender {
    /// Spawns one dispatcher per configured peer.
    pub fn spawn(
        config: &CacheConfig,
        shutdown: &watch::Receiver<bool>,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let mut peers = Vec::with_capacity(config.peers.len());
        let mut dispatchers = Vec::with_capacity(config.peers.len());

        for &addr in &config.peers {
            let (queue, pending) = mpsc::channel(config.peer_queue_depth);
            dispatchers.push(tokio::spawn(dispatch(
                addr,
                pending,
                config.retry,
                config.max_in_flight,
                shutdown.clone(),
            )));
            peers.push(PeerQueue { addr, queue });
        }

        (Self { peers }, dispatchers)
    }

    /// Queues `payload` for every peer. Never waits.
    pub fn replicate(&self, payload: Vec<u8>) {
        let payload: Payload = payload.into();
        for peer in &self.peers {
            match peer.queue.try_send(Arc::clone(&payload)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(peer = %peer.addr, "outbound queue full, dropping write for peer");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(peer = %peer.addr, "peer dispatcher stopped, dropping write");
                }
            }
        }
    }

    pub fn peers(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.peers.iter().map(|peer| peer.addr)
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

async fn dispatch(
    addr: SocketAddr,
    mut pending: mpsc::Receiver<Payload>,
    retry: RetryPolicy,
    max_in_flight: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut deliveries = JoinSet::new();

    loop {
        select! {
            _ = stopped(&mut shutdown) => break,
            Some(joined) = deliveries.join_next(), if !deliveries.is_empty() => {
                if let Err(err) = joined {
                    error!(peer = %addr, error = ?err, "delivery task failed");
                }
            }
            payload = pending.recv(), if deliveries.len() < max_in_flight => match payload {
                Some(payload) => {
                    deliveries.spawn(deliver_logged(addr, payload, retry));
                }
                None => break,
            },
        }
    }

    if !deliveries.is_empty() {
        debug!(peer = %addr, abandoned = deliveries.len(), "abandoning in-flight deliveries");
    }
    deliveries.shutdown().await;
}

async fn deliver_logged(addr: SocketAddr, payload: Payload, retry: RetryPolicy) {
    match deliver(addr, &payload, retry).await {
        Ok(attempts) => debug!(peer = %addr, attempts, "delivered write"),
        Err(err) => error!(peer = %addr, error = %err, "dropping write for unreachable peer"),
    }
}

/// Sends `payload` to the peer at `addr`, retrying on `retry`'s schedule.
///
/// Each attempt opens a fresh connection, writes the payload and closes it.
/// Returns the number of attempts used.
pub async fn deliver(addr: SocketAddr, payload: &[u8], retry: RetryPolicy) -> Result<u32> {
    for attempt in 1..=retry.max_attempts {
        match send_once(addr, payload).await {
            Ok(()) => return Ok(attempt),
            Err(err) => warn!(
                peer = %addr,
                attempt,
                max_attempts = retry.max_attempts,
                error = %err,
                "failed to deliver write to peer"
            ),
        }
        if attempt < retry.max_attempts {
            sleep(retry.delay).await;
        }
    }
    bail!(
        "failed to deliver write to {addr} after {} attempts",
        retry.max_attempts
    )
}

async fn send_once(addr: SocketAddr, payload: &[u8]) -> io::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(payload).await?;
    stream.shutdown().await
}
