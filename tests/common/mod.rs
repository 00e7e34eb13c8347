#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::{anyhow, Result};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::Mutex;

use iroh_snr::framing::{read_message, write_frame, write_message};
use iroh_snr::{
    PeerId, PeerRanker, Record, RelayPeer, RelayTransport, RoutingMessage, MAX_MESSAGE_SIZE,
};

/// How a fake relay misbehaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// `connect` fails.
    Connect,
    /// `open_stream` fails.
    OpenStream,
    /// Writes on the stream fail.
    Write,
    /// The relay answers with a frame that is not a message.
    Malformed,
    /// The relay answers with a zero-length frame.
    Empty,
    /// The relay reads the request and closes without answering.
    Silent,
    /// The relay reads the request and then keeps the stream open without
    /// ever answering.
    Stall,
    /// The relay answers with a message that has every field at its default.
    Bare,
    /// `connect` never completes.
    Hang,
}

#[derive(Debug, Default)]
pub struct StreamStats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub bytes_read: AtomicUsize,
    pub bytes_written: AtomicUsize,
}

impl StreamStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read.load(Ordering::SeqCst)
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written.load(Ordering::SeqCst)
    }
}

/// One end of an in-memory pipe that records how it was used.
///
/// Dropping the stream counts as closing it.
pub struct TestStream {
    inner: DuplexStream,
    fail_writes: bool,
    stats: Arc<StreamStats>,
}

impl TestStream {
    fn new(inner: DuplexStream, fail_writes: bool, stats: Arc<StreamStats>) -> Self {
        stats.opened.fetch_add(1, Ordering::SeqCst);
        Self {
            inner,
            fail_writes,
            stats,
        }
    }

    /// A stream not owned by any transport, plus the remote end of its pipe.
    pub fn standalone() -> (Self, DuplexStream, Arc<StreamStats>) {
        let stats = Arc::new(StreamStats::default());
        let (local, remote) = tokio::io::duplex(64 * 1024);
        (Self::new(local, false, stats.clone()), remote, stats)
    }
}

impl Drop for TestStream {
    fn drop(&mut self) {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl AsyncRead for TestStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            this.stats
                .bytes_read
                .fetch_add(buf.filled().len() - before, Ordering::SeqCst);
        }
        poll
    }
}

impl AsyncWrite for TestStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.fail_writes {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "injected write failure",
            )));
        }
        let poll = Pin::new(&mut this.inner).poll_write(cx, data);
        if let Poll::Ready(Ok(n)) = &poll {
            this.stats.bytes_written.fetch_add(*n, Ordering::SeqCst);
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

/// In-memory relay transport with per-relay fault injection.
///
/// Every relay without a fault answers requests with [`reply_from`].
#[derive(Clone, Default)]
pub struct TestTransport {
    faults: Arc<Mutex<HashMap<PeerId, Fault>>>,
    connects: Arc<Mutex<Vec<PeerId>>>,
    opens: Arc<Mutex<Vec<(PeerId, Vec<u8>)>>>,
    served: Arc<Mutex<Vec<(PeerId, RoutingMessage)>>>,
    stats: Arc<StreamStats>,
}

impl TestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fault(&self, peer: PeerId, fault: Fault) {
        self.faults.lock().await.insert(peer, fault);
    }

    pub async fn clear_fault(&self, peer: &PeerId) {
        self.faults.lock().await.remove(peer);
    }

    /// Peers `connect` was called for, in call order.
    pub async fn connect_calls(&self) -> Vec<PeerId> {
        self.connects.lock().await.clone()
    }

    /// Peers a stream was opened to, in call order.
    pub async fn open_calls(&self) -> Vec<PeerId> {
        self.opens.lock().await.iter().map(|(id, _)| *id).collect()
    }

    pub async fn open_protocols(&self) -> Vec<Vec<u8>> {
        self.opens.lock().await.iter().map(|(_, p)| p.clone()).collect()
    }

    /// Requests that reached a relay's responder.
    pub async fn served(&self) -> Vec<(PeerId, RoutingMessage)> {
        self.served.lock().await.clone()
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    async fn fault(&self, peer: &PeerId) -> Option<Fault> {
        self.faults.lock().await.get(peer).copied()
    }
}

#[async_trait::async_trait]
impl RelayTransport for TestTransport {
    type Stream = TestStream;

    async fn connect(&self, relay: &RelayPeer) -> Result<()> {
        self.connects.lock().await.push(relay.id);
        match self.fault(&relay.id).await {
            Some(Fault::Connect) => Err(anyhow!("injected connect failure")),
            Some(Fault::Hang) => {
                std::future::pending::<()>().await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn open_stream(&self, peer: &PeerId, protocol: &[u8]) -> Result<TestStream> {
        let fault = self.fault(peer).await;
        if fault == Some(Fault::OpenStream) {
            return Err(anyhow!("injected stream failure"));
        }
        self.opens.lock().await.push((*peer, protocol.to_vec()));

        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let id = *peer;
        let served = self.served.clone();
        tokio::spawn(async move {
            let Ok(Some(request)) = read_message(&mut remote, MAX_MESSAGE_SIZE).await else {
                return;
            };
            served.lock().await.push((id, request.clone()));
            let _ = match fault {
                Some(Fault::Malformed) => write_frame(&mut remote, b"not a message", MAX_MESSAGE_SIZE).await,
                Some(Fault::Empty) => write_frame(&mut remote, &[], MAX_MESSAGE_SIZE).await,
                Some(Fault::Silent) => Ok(()),
                Some(Fault::Stall) => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
                Some(Fault::Bare) => {
                    write_message(&mut remote, &RoutingMessage::default(), MAX_MESSAGE_SIZE).await
                }
                _ => write_message(&mut remote, &reply_from(&id, &request), MAX_MESSAGE_SIZE).await,
            };
        });

        Ok(TestStream::new(
            local,
            fault == Some(Fault::Write),
            self.stats.clone(),
        ))
    }
}

/// The answer a healthy fake relay gives: the request echoed back with a
/// record whose value is the relay's id.
pub fn reply_from(peer: &PeerId, request: &RoutingMessage) -> RoutingMessage {
    RoutingMessage::new(request.kind, request.key.clone()).with_record(Record {
        key: request.key.clone(),
        value: peer.to_vec(),
        ..Default::default()
    })
}

/// Ranks peers in the order they were configured.
pub struct ListedOrder;

impl PeerRanker for ListedOrder {
    fn rank(&self, peers: &[PeerId], _key: &[u8]) -> Vec<PeerId> {
        peers.to_vec()
    }
}

pub fn make_peer_id(index: u32) -> PeerId {
    let mut id = [0u8; 32];
    id[..4].copy_from_slice(&index.to_be_bytes());
    id
}

pub fn make_relay(index: u32) -> RelayPeer {
    RelayPeer::new(make_peer_id(index), format!("relay-{index}"))
}

pub fn make_relays(count: u32) -> Vec<RelayPeer> {
    (1..=count).map(make_relay).collect()
}
