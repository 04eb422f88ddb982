use std::{future::Future, io, net::SocketAddr, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheValue};
use crate::message::{MAX_MESSAGE_BYTES, Message};

/// Accepts replication connections from peers.
///
/// Each connection carries exactly one message: the peer writes a JSON
/// object and closes its side. A short-lived task per connection reads and
/// decodes it, then hands it to the update consumer through `inbound`. A bad
/// payload only costs its own connection.
pub struct ReplicationListener<K, V> {
    listener: TcpListener,
    inbound: mpsc::UnboundedSender<Message<K, V>>,
    read_timeout: Duration,
}

impl<K, V> ReplicationListener<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    pub async fn bind(
        addr: SocketAddr,
        inbound: mpsc::UnboundedSender<Message<K, V>>,
        read_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind replication listener on {addr}"))?;
        Ok(Self {
            listener,
            inbound,
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` resolves, then closes the socket.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let ReplicationListener {
            listener,
            inbound,
            read_timeout,
        } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("replication listener shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &inbound, read_timeout);
                }
            }
        }
    }
}

fn handle_accept_result<K, V>(
    result: io::Result<(TcpStream, SocketAddr)>,
    inbound: &mpsc::UnboundedSender<Message<K, V>>,
    read_timeout: Duration,
) where
    K: CacheKey,
    V: CacheValue,
{
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, inbound, read_timeout),
        Err(err) => warn!(error = ?err, "failed to accept replication connection"),
    }
}

fn spawn_connection_handler<K, V>(
    stream: TcpStream,
    peer: SocketAddr,
    inbound: &mpsc::UnboundedSender<Message<K, V>>,
    read_timeout: Duration,
) where
    K: CacheKey,
    V: CacheValue,
{
    let inbound = inbound.clone();
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, inbound, read_timeout).await {
            warn!(peer = %peer, error = ?err, "dropped replication connection");
        }
    });
}

async fn handle_connection<K, V>(
    stream: TcpStream,
    inbound: mpsc::UnboundedSender<Message<K, V>>,
    read_timeout: Duration,
) -> Result<()>
where
    K: CacheKey,
    V: CacheValue,
{
    let payload = timeout(read_timeout, read_payload(stream))
        .await
        .context("timed out waiting for replication payload")??;
    if payload.is_empty() {
        debug!("peer closed connection without a payload");
        return Ok(());
    }

    let message = Message::<K, V>::decode(&payload)?;
    debug!(
        key = ?message.key,
        version = message.version,
        region = %message.region,
        "received replication message"
    );
    inbound
        .send(message)
        .map_err(|_| anyhow!("update consumer has stopped"))?;
    Ok(())
}

/// Reads until the peer closes, keeping at most [`MAX_MESSAGE_BYTES`].
async fn read_payload(stream: TcpStream) -> io::Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(MAX_MESSAGE_BYTES);
    stream
        .take(MAX_MESSAGE_BYTES as u64)
        .read_to_end(&mut payload)
        .await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn start_listener() -> (
        SocketAddr,
        mpsc::UnboundedReceiver<Message<String, String>>,
        tokio::sync::oneshot::Sender<()>,
        tokio::task::JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = ReplicationListener::bind(
            "127.0.0.1:0".parse().expect("socket address"),
            tx,
            Duration::from_secs(1),
        )
        .await
        .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(listener.run_until(async move {
            let _ = shutdown_rx.await;
        }));
        (addr, rx, shutdown_tx, server)
    }

    async fn send_raw(addr: SocketAddr, payload: &[u8]) {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        // The listener may reset an oversized connection before we finish.
        let _ = stream.write_all(payload).await;
        let _ = stream.shutdown().await;
    }

    #[tokio::test]
    async fn queues_one_message_per_connection() {
        let (addr, mut rx, shutdown_tx, server) = start_listener().await;

        send_raw(
            addr,
            br#"{"action": "set", "key": "a", "value": "1", "version": 1, "region": "us-east"}"#,
        )
        .await;

        let message = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("message within deadline")
            .expect("channel open");
        assert_eq!(message, Message::set("a".to_string(), "1".to_string(), 1, "us-east"));

        let _ = shutdown_tx.send(());
        server.await.expect("listener task");
    }

    #[tokio::test]
    async fn survives_malformed_payloads() {
        let (addr, mut rx, shutdown_tx, server) = start_listener().await;

        send_raw(addr, b"{not json").await;
        send_raw(addr, &vec![b'x'; MAX_MESSAGE_BYTES * 2]).await;
        send_raw(addr, b"").await;
        send_raw(
            addr,
            br#"{"action": "set", "key": "b", "value": "2", "version": 5, "region": "eu"}"#,
        )
        .await;

        let message = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("valid message still delivered")
            .expect("channel open");
        assert_eq!(message.key, "b");
        assert_eq!(message.version, 5);
        assert!(rx.try_recv().is_err());

        let _ = shutdown_tx.send(());
        server.await.expect("listener task");
    }
}
