use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, trace, warn};
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};

use crate::error::{LifxError, Result};
use crate::protocol::{Message, Packet};

const RECEIVE_BUFFER: usize = 2048;

/// A decoded datagram and the address it came from.
#[derive(Debug, Clone)]
pub struct Reply {
    pub from: SocketAddr,
    pub packet: Packet,
}

/// Anything that can put an encoded packet on the wire without waiting.
///
/// The effects engine sends through this so it can be driven by a recorder
/// in tests.
pub trait PacketSink: Send + Sync + 'static {
    fn send_packet(&self, packet: &Packet, addr: SocketAddr) -> Result<()>;
}

type Routes = Mutex<HashMap<u32, mpsc::UnboundedSender<Reply>>>;

struct Shared {
    socket: Arc<UdpSocket>,
    routes: Arc<Routes>,
    sequence: AtomicU8,
    reader: JoinHandle<()>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// One UDP endpoint shared by discovery, commands and effect sessions.
///
/// A background task reads every datagram, drops anything that is not a valid
/// packet and hands the rest to the [`Subscription`] that owns the packet's
/// source id. Replies for unknown source ids are discarded.
#[derive(Clone)]
pub struct Transport {
    shared: Arc<Shared>,
}

impl Transport {
    /// Binds to `addr` (normally `0.0.0.0:0`) with broadcast enabled.
    pub async fn bind(addr: SocketAddr) -> Result<Transport> {
        let socket = UdpSocket::bind(addr).await?;
        socket.set_broadcast(true)?;
        debug!("Transport bound to {}", socket.local_addr()?);

        let socket = Arc::new(socket);
        let routes: Arc<Routes> = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_loop(socket.clone(), routes.clone()));

        Ok(Transport {
            shared: Arc::new(Shared {
                socket,
                routes,
                sequence: AtomicU8::new(0),
                reader,
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.shared.socket.local_addr()?)
    }

    pub fn next_sequence(&self) -> u8 {
        self.shared.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Opens a subscription with one freshly allocated source id.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscription = Subscription {
            transport: self.clone(),
            sources: Vec::new(),
            tx,
            rx,
        };
        subscription.new_source();
        subscription
    }

    /// Picks a random id that is not 0, not 1 and not currently routed, and
    /// routes it to `tx`.
    fn register_source(&self, tx: mpsc::UnboundedSender<Reply>) -> u32 {
        let mut routes = self
            .shared
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut rng = rand::thread_rng();
        loop {
            let source = rng.gen_range(2..=u32::MAX);
            if let std::collections::hash_map::Entry::Vacant(entry) = routes.entry(source) {
                entry.insert(tx);
                return source;
            }
        }
    }

    fn release_sources(&self, sources: &[u32]) {
        let mut routes = self
            .shared
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for source in sources {
            routes.remove(source);
        }
    }

    /// Number of source ids currently routed.
    pub fn in_flight(&self) -> usize {
        self.shared
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub async fn send(&self, packet: &Packet, addr: SocketAddr) -> Result<()> {
        let bytes = packet.encode()?;
        trace!("-> {} {} ({} bytes)", addr, packet.message.name(), bytes.len());
        self.shared
            .socket
            .send_to(&bytes, addr)
            .await
            .map_err(|source| LifxError::Send { addr, source })?;
        Ok(())
    }

    /// Sends `packet` under a fresh source id and returns the first reply that
    /// `pick` accepts, or `None` once `window` has passed.
    pub async fn request<T, F>(
        &self,
        mut packet: Packet,
        addr: SocketAddr,
        window: Duration,
        pick: F,
    ) -> Result<Option<T>>
    where
        F: Fn(&Message) -> Option<T>,
    {
        let mut subscription = self.subscribe();
        packet.header.source = subscription.source();
        packet.header.sequence = self.next_sequence();
        self.send(&packet, addr).await?;

        let deadline = Instant::now() + window;
        while let Some(reply) = subscription.recv_until(deadline).await {
            if let Some(value) = pick(&reply.packet.message) {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Sends `packet` and gathers every reply until `window` passes or `done`
    /// says the collection is complete.
    pub async fn request_many<F>(
        &self,
        mut packet: Packet,
        addr: SocketAddr,
        window: Duration,
        mut done: F,
    ) -> Result<Vec<Message>>
    where
        F: FnMut(&[Message]) -> bool,
    {
        let mut subscription = self.subscribe();
        packet.header.source = subscription.source();
        packet.header.sequence = self.next_sequence();
        self.send(&packet, addr).await?;

        let deadline = Instant::now() + window;
        let mut messages = Vec::new();
        while let Some(reply) = subscription.recv_until(deadline).await {
            messages.push(reply.packet.message);
            if done(&messages) {
                break;
            }
        }
        Ok(messages)
    }
}

impl PacketSink for Transport {
    fn send_packet(&self, packet: &Packet, addr: SocketAddr) -> Result<()> {
        let bytes = packet.encode()?;
        self.shared
            .socket
            .try_send_to(&bytes, addr)
            .map_err(|source| LifxError::Send { addr, source })?;
        Ok(())
    }
}

async fn read_loop(socket: Arc<UdpSocket>, routes: Arc<Routes>) {
    let mut buffer = [0u8; RECEIVE_BUFFER];
    loop {
        let (len, from) = match socket.recv_from(&mut buffer).await {
            Ok(received) => received,
            Err(e) => {
                // ICMP errors from earlier sends surface here on some platforms
                warn!("Failed to receive datagram: {}", e);
                sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        let packet = match Packet::decode(&buffer[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Dropping {} bytes from {}: {}", len, from, e);
                continue;
            }
        };

        let source = packet.header.source;
        let name = packet.message.name();
        let mut routes = routes.lock().unwrap_or_else(PoisonError::into_inner);
        let delivered = routes
            .get(&source)
            .map(|tx| tx.send(Reply { from, packet }).is_ok());
        match delivered {
            Some(true) => trace!("<- {} {}", from, name),
            Some(false) => {
                routes.remove(&source);
            }
            None => trace!("Ignoring {} for unknown source {}", name, source),
        }
    }
}

/// Receives replies addressed to one or more source ids. Dropping it stops
/// routing for all of them.
pub struct Subscription {
    transport: Transport,
    sources: Vec<u32>,
    tx: mpsc::UnboundedSender<Reply>,
    rx: mpsc::UnboundedReceiver<Reply>,
}

impl Subscription {
    /// The most recently allocated source id.
    pub fn source(&self) -> u32 {
        self.sources.last().copied().unwrap_or_default()
    }

    /// Allocates another source id feeding this subscription. Earlier ids stay
    /// routed until the subscription is dropped.
    pub fn new_source(&mut self) -> u32 {
        let source = self.transport.register_source(self.tx.clone());
        self.sources.push(source);
        source
    }

    pub fn sources(&self) -> &[u32] {
        &self.sources
    }

    /// Next reply, or `None` once `deadline` passes.
    pub async fn recv_until(&mut self, deadline: Instant) -> Option<Reply> {
        match timeout_at(deadline, self.rx.recv()).await {
            Ok(reply) => reply,
            Err(_) => None,
        }
    }

    /// Everything that arrives within `window`.
    pub async fn collect(&mut self, window: Duration) -> Vec<Reply> {
        let deadline = Instant::now() + window;
        let mut replies = Vec::new();
        while let Some(reply) = self.recv_until(deadline).await {
            replies.push(reply);
        }
        replies
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.transport.release_sources(&self.sources);
    }
}
