use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use log::{debug, info};

use crate::device::{LifxDevice, Serial};
use crate::error::{LifxError, Result};
use crate::protocol::{LightState, Version};

/// Outcome of recording a StateService reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Added,
    /// Known serial that now answers from a different address.
    Moved,
    Unchanged,
}

/// Process wide table of discovered devices keyed by serial.
///
/// Cloning is cheap and every clone sees the same table. Entries are only
/// added or updated field by field, never removed.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<HashMap<Serial, LifxDevice>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a device seen at `addr`. A known serial keeps its other fields
    /// and only has its endpoint refreshed.
    pub fn upsert(&self, serial: Serial, addr: SocketAddr, service: u8) -> Upsert {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        match devices.get_mut(&serial) {
            Some(device) => {
                device.last_seen = Utc::now();
                if device.addr != addr {
                    info!("Device {} moved from {} to {}", serial, device.addr, addr);
                    device.addr = addr;
                    Upsert::Moved
                } else {
                    Upsert::Unchanged
                }
            }
            None => {
                debug!("Found device {} at {}", serial, addr);
                devices.insert(serial, LifxDevice::new(serial, addr, service));
                Upsert::Added
            }
        }
    }

    /// Inserts or replaces a whole record.
    pub fn insert(&self, device: LifxDevice) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        devices.insert(device.serial, device);
    }

    /// Applies `update` to the record for `serial`. Returns false when unknown.
    pub fn update<F>(&self, serial: &Serial, update: F) -> bool
    where
        F: FnOnce(&mut LifxDevice),
    {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        match devices.get_mut(serial) {
            Some(device) => {
                update(device);
                device.last_seen = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn apply_light_state(&self, serial: &Serial, state: &LightState) -> bool {
        self.update(serial, |device| {
            device.label = state.label.clone();
            device.power = Some(state.power);
            device.color = Some(state.color);
        })
    }

    pub fn apply_version(&self, serial: &Serial, version: &Version) -> bool {
        self.update(serial, |device| device.product_id = Some(version.product))
    }

    pub fn get(&self, serial: &Serial) -> Option<LifxDevice> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.get(serial).cloned()
    }

    /// Snapshot of every device ordered by label then serial.
    pub fn all(&self) -> Vec<LifxDevice> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<LifxDevice> = devices.values().cloned().collect();
        all.sort_by(|a, b| {
            a.label
                .to_lowercase()
                .cmp(&b.label.to_lowercase())
                .then(a.serial.cmp(&b.serial))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves a user token to devices.
    ///
    /// `all` selects everything. Otherwise the first level with a match wins:
    /// exact serial, exact IP, exact label ignoring case, then label substring
    /// ignoring case. More than one match at that level is an ambiguity error.
    pub fn resolve(&self, token: &str) -> Result<Vec<LifxDevice>> {
        let token = token.trim();
        let all = self.all();
        if token.eq_ignore_ascii_case("all") {
            return Ok(all);
        }

        let wanted = token.to_lowercase();
        let serial = token.parse::<Serial>().ok();
        let ip = token.parse::<IpAddr>().ok();

        let levels: [Box<dyn Fn(&LifxDevice) -> bool + '_>; 4] = [
            Box::new(|d: &LifxDevice| Some(d.serial) == serial),
            Box::new(|d: &LifxDevice| Some(d.addr.ip()) == ip),
            Box::new(|d: &LifxDevice| !d.label.is_empty() && d.label.to_lowercase() == wanted),
            Box::new(|d: &LifxDevice| !wanted.is_empty() && d.label.to_lowercase().contains(&wanted)),
        ];

        for matches in levels.iter() {
            let found: Vec<LifxDevice> = all.iter().filter(|d| matches(*d)).cloned().collect();
            match found.len() {
                0 => continue,
                1 => return Ok(found),
                _ => {
                    return Err(LifxError::AmbiguousIdentifier {
                        token: token.to_string(),
                        candidates: found.iter().map(|d| d.to_string()).collect(),
                    })
                }
            }
        }
        Err(LifxError::UnknownIdentifier(token.to_string()))
    }

    /// Like [`resolve`](Self::resolve) but requires exactly one device.
    pub fn resolve_one(&self, token: &str) -> Result<LifxDevice> {
        let mut found = self.resolve(token)?;
        match found.len() {
            0 => Err(LifxError::UnknownIdentifier(token.to_string())),
            1 => Ok(found.remove(0)),
            _ => Err(LifxError::AmbiguousIdentifier {
                token: token.to_string(),
                candidates: found.iter().map(|d| d.to_string()).collect(),
            }),
        }
    }
}
