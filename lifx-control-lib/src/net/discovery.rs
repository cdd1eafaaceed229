use std::cmp::max;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};

use crate::config::LifxConfig;
use crate::device::{DeviceRegistry, LifxDevice, Serial, Upsert};
use crate::error::{LifxError, Result};
use crate::net::transport::{Reply, Transport};
use crate::protocol::message::SERVICE_UDP;
use crate::protocol::{Message, Packet};

const SEND_ATTEMPTS: u32 = 3;
const SEND_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Broadcast address of an IPv4 subnet in CIDR form. A bare address is
/// treated as a /32.
pub fn broadcast_address(subnet: &str) -> Result<Ipv4Addr> {
    let invalid = || LifxError::InvalidSubnet(subnet.to_string());
    let (ip, prefix) = match subnet.trim().split_once('/') {
        Some((ip, prefix)) => (ip, prefix.parse::<u32>().map_err(|_| invalid())?),
        None => (subnet.trim(), 32),
    };
    if prefix > 32 {
        return Err(invalid());
    }
    let ip: Ipv4Addr = ip.parse().map_err(|_| invalid())?;
    let host_mask = u32::MAX.checked_shr(prefix).unwrap_or(0);
    Ok(Ipv4Addr::from(u32::from(ip) | host_mask))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    pub subnet: String,
    pub port: u16,
    /// Collection window per attempt.
    pub timeout: Duration,
    /// Broadcast attempts; at least one is always made.
    pub retries: u32,
    /// Query label, color and product of each new device afterwards.
    pub refresh: bool,
}

impl From<&LifxConfig> for DiscoveryOptions {
    fn from(config: &LifxConfig) -> Self {
        DiscoveryOptions {
            subnet: config.subnet.clone(),
            port: config.port,
            timeout: config.timeout(),
            retries: config.retries,
            refresh: config.refresh_on_discover,
        }
    }
}

pub struct Discovery;

impl Discovery {
    /// Extracts (serial, endpoint, service) from a UDP StateService reply.
    pub fn decode_service_reply(reply: &Reply) -> Option<(Serial, SocketAddr, u8)> {
        match &reply.packet.message {
            Message::StateService(service) if service.service == SERVICE_UDP => {
                let port = u16::try_from(service.port)
                    .ok()
                    .filter(|port| *port != 0)
                    .unwrap_or_else(|| reply.from.port());
                Some((
                    reply.packet.header.serial(),
                    SocketAddr::new(reply.from.ip(), port),
                    service.service,
                ))
            }
            _ => None,
        }
    }

    /// Broadcasts GetService `retries` times, each under a new source id, and
    /// records every UDP service reply in `registry`.
    ///
    /// Returns the registry snapshot. Finding nothing is not an error.
    pub async fn find_devices(
        transport: &Transport,
        registry: &DeviceRegistry,
        options: &DiscoveryOptions,
    ) -> Result<Vec<LifxDevice>> {
        let broadcast = SocketAddr::new(
            IpAddr::V4(broadcast_address(&options.subnet)?),
            options.port,
        );
        let mut subscription = transport.subscribe();
        let mut new_devices = Vec::new();

        for attempt in 0..max(options.retries, 1) {
            let source = if attempt == 0 {
                subscription.source()
            } else {
                subscription.new_source()
            };
            let packet = Packet::new(source, None, Message::GetService).with_sequence(attempt as u8);
            if let Err(e) = Self::send_with_retries(transport, &packet, broadcast).await {
                warn!("Skipping discovery attempt {}: {}", attempt + 1, e);
                continue;
            }
            debug!(
                "Discovery attempt {} sent to {} with source {}",
                attempt + 1,
                broadcast,
                source
            );

            let deadline = Instant::now() + options.timeout;
            while let Some(reply) = subscription.recv_until(deadline).await {
                let Some((serial, addr, service)) = Self::decode_service_reply(&reply) else {
                    continue;
                };
                match registry.upsert(serial, addr, service) {
                    Upsert::Added => {
                        info!("Found device {} at {}", serial, addr);
                        new_devices.push(serial);
                    }
                    Upsert::Moved | Upsert::Unchanged => {}
                }
            }
        }
        drop(subscription);

        if new_devices.is_empty() {
            info!("Discovery complete, no new devices. If devices are missing, try increasing the timeout.");
        } else if options.refresh {
            Self::refresh_all(transport, registry, &new_devices, options.timeout).await;
        }

        Ok(registry.all())
    }

    async fn send_with_retries(
        transport: &Transport,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<()> {
        let mut attempt = 1;
        loop {
            match transport.send(packet, addr).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < SEND_ATTEMPTS => {
                    debug!("Broadcast to {} failed ({}), retrying", addr, e);
                    attempt += 1;
                    sleep(SEND_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn refresh_all(
        transport: &Transport,
        registry: &DeviceRegistry,
        serials: &[Serial],
        timeout: Duration,
    ) {
        let mut tasks = JoinSet::new();
        for serial in serials {
            let Some(device) = registry.get(serial) else {
                continue;
            };
            let transport = transport.clone();
            let registry = registry.clone();
            tasks.spawn(async move {
                if let Err(e) = Self::refresh(&transport, &registry, &device, timeout).await {
                    debug!("Could not refresh {}: {}", device.serial, e);
                }
            });
        }
        while tasks.join_next().await.is_some() {}
    }

    /// Queries LightState and StateVersion concurrently and records whatever
    /// comes back. Succeeds if either reply arrives.
    pub async fn refresh(
        transport: &Transport,
        registry: &DeviceRegistry,
        device: &LifxDevice,
        timeout: Duration,
    ) -> Result<()> {
        let serial = device.serial;
        let state = transport.request(
            Packet::new(0, Some(serial), Message::GetColor).with_res_required(true),
            device.addr,
            timeout,
            |m| match m {
                Message::LightState(state) => Some(state.clone()),
                _ => None,
            },
        );
        let version = transport.request(
            Packet::new(0, Some(serial), Message::GetVersion).with_res_required(true),
            device.addr,
            timeout,
            |m| match m {
                Message::StateVersion(version) => Some(*version),
                _ => None,
            },
        );
        let (state, version) = tokio::join!(state, version);
        let (state, version) = (state?, version?);

        if let Some(state) = &state {
            registry.apply_light_state(&serial, state);
        }
        if let Some(version) = &version {
            registry.apply_version(&serial, version);
        }
        if state.is_none() && version.is_none() {
            return Err(LifxError::timeout(serial, "GetColor"));
        }
        Ok(())
    }

    /// Column aligned table of devices, one line each under a header.
    pub fn format_devices(devices: &[LifxDevice]) -> String {
        let label_width = devices
            .iter()
            .map(|d| max(d.label.len(), 5))
            .max()
            .unwrap_or(5);
        let serial_width = 17;
        let addr_width = devices
            .iter()
            .map(|d| d.addr.ip().to_string().len())
            .max()
            .unwrap_or(0)
            .max(10);
        let product_width = devices
            .iter()
            .map(|d| d.product_name().len())
            .max()
            .unwrap_or(0)
            .max(7);

        let row = |label: &str, serial: &str, addr: &str, product: &str, power: &str| {
            format!(
                "{:<label_width$}  {:<serial_width$}  {:<addr_width$}  {:<product_width$}  {}\n",
                label,
                serial,
                addr,
                product,
                power,
                label_width = label_width,
                serial_width = serial_width,
                addr_width = addr_width,
                product_width = product_width,
            )
        };

        let mut table = row("Label", "Serial", "IP Address", "Product", "Power");
        table.push_str(&row(
            &"-".repeat(label_width),
            &"-".repeat(serial_width),
            &"-".repeat(addr_width),
            &"-".repeat(product_width),
            "-----",
        ));
        for device in devices {
            let power = match device.is_on() {
                Some(true) => "on",
                Some(false) => "off",
                None => "?",
            };
            table.push_str(&row(
                &device.label,
                &device.serial.to_string(),
                &device.addr.ip().to_string(),
                &device.product_name(),
                power,
            ));
        }
        table
    }
}
