//! UDP plumbing: the shared socket with reply routing, and subnet discovery.

pub mod discovery;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use discovery::{broadcast_address, Discovery, DiscoveryOptions};
pub use transport::{PacketSink, Reply, Subscription, Transport};
