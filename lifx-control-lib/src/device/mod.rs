use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use derivative::Derivative;
use serde::{Serialize, Serializer};

use crate::color::Hsbk;
use crate::error::LifxError;

pub mod product;
pub mod registry;

pub use product::{Features, Product};
pub use registry::{DeviceRegistry, Upsert};

/// The 6-byte hardware address a bulb reports in every reply header.
/// Displayed as lowercase colon separated hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Serial([u8; 6]);

impl Serial {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Serial(bytes)
    }

    /// Takes the first six bytes of a header target field.
    pub fn from_target(target: &[u8; 8]) -> Self {
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(&target[..6]);
        Serial(bytes)
    }

    pub fn target(&self) -> [u8; 8] {
        let mut target = [0u8; 8];
        target[..6].copy_from_slice(&self.0);
        target
    }

    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| format!("{:02x}", b)).collect();
        write!(f, "{}", parts.join(":"))
    }
}

impl fmt::Debug for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Serial({})", self)
    }
}

impl FromStr for Serial {
    type Err = LifxError;

    /// Accepts `d0:73:d5:01:02:03`, `d0-73-d5-01-02-03` or `d073d5010203` in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();
        if digits.len() != 12 {
            return Err(LifxError::InvalidSerial(s.to_string()));
        }
        let decoded = hex::decode(&digits).map_err(|_| LifxError::InvalidSerial(s.to_string()))?;
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(&decoded);
        Ok(Serial(bytes))
    }
}

impl Serialize for Serial {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Last known state of one bulb.
///
/// Only the serial identifies a device; the remaining fields are refreshed
/// opportunistically and may be stale.
#[derive(Derivative)]
#[derivative(Hash, PartialEq, Eq)]
#[derive(Debug, Clone, Serialize)]
pub struct LifxDevice {
    pub serial: Serial,

    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub addr: SocketAddr,

    /// Service type advertised in StateService, 1 for UDP.
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub service: u8,

    /// Empty until a LightState or StateLabel reply is seen.
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub label: String,

    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub power: Option<u16>,

    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub color: Option<Hsbk>,

    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub product_id: Option<u32>,

    /// Pixel grid reported by the device's tile chain, preferred over the
    /// product table.
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub chain_size: Option<(usize, usize)>,

    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub last_seen: DateTime<Utc>,
}

impl LifxDevice {
    pub fn new(serial: Serial, addr: SocketAddr, service: u8) -> Self {
        LifxDevice {
            serial,
            addr,
            service,
            label: String::new(),
            power: None,
            color: None,
            product_id: None,
            chain_size: None,
            last_seen: Utc::now(),
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_product(mut self, product_id: u32) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn product(&self) -> Option<Product> {
        self.product_id.map(product::lookup)
    }

    pub fn product_name(&self) -> String {
        self.product()
            .map(|p| p.name)
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Pixel grid of a matrix device, `None` for everything else.
    pub fn matrix_size(&self) -> Option<(usize, usize)> {
        self.chain_size
            .or_else(|| self.product().and_then(|p| p.matrix_size()))
    }

    pub fn is_on(&self) -> Option<bool> {
        self.power.map(|level| level > 0)
    }

    /// Label when known, serial otherwise.
    pub fn display_name(&self) -> String {
        if self.label.is_empty() {
            self.serial.to_string()
        } else {
            self.label.clone()
        }
    }
}

impl fmt::Display for LifxDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.display_name(), self.serial, self.addr.ip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_serial_parse_and_display() {
        let serial: Serial = "D0:73:D5:0A:0B:0C".parse().unwrap();
        assert_eq!(serial.to_string(), "d0:73:d5:0a:0b:0c");
        assert_eq!("d073d50a0b0c".parse::<Serial>().unwrap(), serial);
        assert_eq!(
            serial.target(),
            [0xd0, 0x73, 0xd5, 0x0a, 0x0b, 0x0c, 0, 0]
        );
        assert_eq!(Serial::from_target(&serial.target()), serial);
        assert!("d0:73:d5".parse::<Serial>().is_err());
        assert!("zz:73:d5:0a:0b:0c".parse::<Serial>().is_err());
    }

    #[test]
    fn test_device_identity_is_serial() {
        let serial = Serial::new([1, 2, 3, 4, 5, 6]);
        let a = LifxDevice::new(serial, "10.0.0.2:56700".parse().unwrap(), 1).with_label("A");
        let b = LifxDevice::new(serial, "10.0.0.3:56700".parse().unwrap(), 1).with_label("B");
        assert_eq!(a, b);
        let set: HashSet<LifxDevice> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_matrix_size_from_product() {
        let serial = Serial::new([1, 2, 3, 4, 5, 6]);
        let addr = "10.0.0.2:56700".parse().unwrap();
        assert_eq!(LifxDevice::new(serial, addr, 1).matrix_size(), None);
        assert_eq!(
            LifxDevice::new(serial, addr, 1).with_product(55).matrix_size(),
            Some((8, 8))
        );
        assert_eq!(
            LifxDevice::new(serial, addr, 1).with_product(27).matrix_size(),
            None
        );

        let mut chained = LifxDevice::new(serial, addr, 1).with_product(55);
        chained.chain_size = Some((16, 8));
        assert_eq!(chained.matrix_size(), Some((16, 8)));
    }

    #[test]
    fn test_serial_serializes_as_string() {
        let serial = Serial::new([0xd0, 0x73, 0xd5, 0, 0, 1]);
        assert_eq!(
            serde_json::to_string(&serial).unwrap(),
            "\"d0:73:d5:00:00:01\""
        );
    }
}
