use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use rand::Rng;
use serde::Serialize;

use crate::color::Hsbk;
use crate::config::LifxConfig;
use crate::device::{product, DeviceRegistry, LifxDevice, Product, Serial};
use crate::effects::{EffectEngine, EffectKind, EffectParams, SessionHandle};
use crate::error::{LifxError, Result};
use crate::net::{broadcast_address, Discovery, DiscoveryOptions, Transport};
use crate::protocol::{
    duration_ms, set64_rows, Message, MultiZoneEffect, Packet, TileEffect, Waveform,
};

const POWER_ON: u16 = 65535;
const POWER_OFF: u16 = 0;

/// Everything `query_info` could learn about a device. Fields whose query
/// went unanswered are `None`.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub serial: Serial,
    pub address: SocketAddr,
    pub label: String,
    pub power: Option<bool>,
    pub color: Option<Hsbk>,
    pub product: Product,
    pub firmware: Option<String>,
    pub wifi_signal_dbm: Option<f64>,
    pub location: Option<String>,
    pub group: Option<String>,
    pub uptime_secs: Option<u64>,
    pub infrared: Option<u16>,
    pub zones: Option<Vec<Hsbk>>,
    /// Firmware zone animation of a multizone device.
    pub multizone_effect: Option<MultiZoneEffect>,
    pub matrix_size: Option<(usize, usize)>,
}

/// High level handle: one socket, the device registry and the effects engine.
///
/// Commands are fire and forget unless `require_ack` is set in the config, in
/// which case each waits for an Acknowledgement and a missing one is a
/// timeout error.
#[derive(Clone)]
pub struct LifxClient {
    transport: Transport,
    registry: DeviceRegistry,
    effects: EffectEngine<Transport>,
    config: LifxConfig,
    source: u32,
}

impl LifxClient {
    pub async fn new(config: LifxConfig) -> Result<Self> {
        let transport = Transport::bind(config.bind_address).await?;
        let effects = EffectEngine::new(Arc::new(transport.clone()));
        Ok(LifxClient {
            transport,
            registry: DeviceRegistry::new(),
            effects,
            config,
            source: rand::thread_rng().gen_range(2..=u32::MAX),
        })
    }

    pub fn config(&self) -> &LifxConfig {
        &self.config
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Discovers with the configured subnet, timeout and retries.
    pub async fn discover_configured(&self) -> Result<Vec<LifxDevice>> {
        Discovery::find_devices(
            &self.transport,
            &self.registry,
            &DiscoveryOptions::from(&self.config),
        )
        .await
    }

    pub async fn discover(
        &self,
        subnet: &str,
        timeout: Duration,
        retries: u32,
    ) -> Result<Vec<LifxDevice>> {
        let options = DiscoveryOptions {
            subnet: subnet.to_string(),
            timeout,
            retries,
            ..DiscoveryOptions::from(&self.config)
        };
        Discovery::find_devices(&self.transport, &self.registry, &options).await
    }

    pub fn resolve(&self, token: &str) -> Result<Vec<LifxDevice>> {
        self.registry.resolve(token)
    }

    pub fn resolve_one(&self, token: &str) -> Result<LifxDevice> {
        self.registry.resolve_one(token)
    }

    /// Re-reads label, power, color and product, and returns the fresh record.
    pub async fn refresh(&self, device: &LifxDevice) -> Result<LifxDevice> {
        Discovery::refresh(&self.transport, &self.registry, device, self.config.timeout())
            .await?;
        Ok(self
            .registry
            .get(&device.serial)
            .unwrap_or_else(|| device.clone()))
    }

    async fn command(&self, device: &LifxDevice, message: Message) -> Result<()> {
        let name = message.name();
        let packet = Packet::new(self.source, Some(device.serial), message);
        if !self.config.require_ack {
            return self.transport.send(&packet, device.addr).await;
        }
        self.transport
            .request(
                packet.with_ack_required(true),
                device.addr,
                self.config.timeout(),
                |m| matches!(m, Message::Acknowledgement).then_some(()),
            )
            .await?
            .ok_or_else(|| LifxError::timeout(device.serial, name))
    }

    async fn query<T, F>(&self, device: &LifxDevice, message: Message, pick: F) -> Result<T>
    where
        F: Fn(&Message) -> Option<T>,
    {
        let name = message.name();
        let packet = Packet::new(0, Some(device.serial), message).with_res_required(true);
        self.transport
            .request(packet, device.addr, self.config.timeout(), pick)
            .await?
            .ok_or_else(|| LifxError::timeout(device.serial, name))
    }

    fn fade_or_default(&self, fade: Option<Duration>) -> Duration {
        fade.unwrap_or_else(|| self.config.fade())
    }

    fn power_message(level: u16, fade: Duration) -> Message {
        if fade.is_zero() {
            Message::SetPower { level }
        } else {
            Message::SetLightPower {
                level,
                duration: duration_ms(fade),
            }
        }
    }

    pub async fn set_power(
        &self,
        device: &LifxDevice,
        on: bool,
        fade: Option<Duration>,
    ) -> Result<()> {
        let level = if on { POWER_ON } else { POWER_OFF };
        let fade = self.fade_or_default(fade);
        self.command(device, Self::power_message(level, fade)).await?;
        self.registry
            .update(&device.serial, |d| d.power = Some(level));
        Ok(())
    }

    pub async fn set_color(
        &self,
        device: &LifxDevice,
        color: Hsbk,
        fade: Option<Duration>,
    ) -> Result<()> {
        let duration = duration_ms(self.fade_or_default(fade));
        self.command(device, Message::SetColor { color, duration })
            .await?;
        self.registry
            .update(&device.serial, |d| d.color = Some(color));
        Ok(())
    }

    pub async fn set_waveform(&self, device: &LifxDevice, waveform: Waveform) -> Result<()> {
        self.command(device, Message::SetWaveform(waveform)).await
    }

    pub async fn set_label(&self, device: &LifxDevice, label: &str) -> Result<()> {
        self.command(
            device,
            Message::SetLabel {
                label: label.to_string(),
            },
        )
        .await?;
        self.registry
            .update(&device.serial, |d| d.label = label.to_string());
        Ok(())
    }

    pub async fn set_infrared(&self, device: &LifxDevice, brightness: u16) -> Result<()> {
        let supported = device.product().is_some_and(|p| p.features.infrared);
        if !supported {
            return Err(LifxError::UnsupportedCapability {
                serial: device.serial,
                capability: "infrared",
            });
        }
        self.command(device, Message::SetInfrared { brightness })
            .await
    }

    /// Pixel grid of a matrix device. Looks the product up first when it is
    /// not known yet. Products missing from the table are asked for their
    /// tile chain before giving up.
    pub async fn get_matrix_size(&self, device: &LifxDevice) -> Result<(usize, usize)> {
        let device = if device.product_id.is_none() {
            self.refresh(device).await?
        } else {
            device.clone()
        };
        if device.chain_size.is_none() && !device.product_id.is_some_and(product::is_known) {
            if let Some(size) = self.query_chain_size(&device).await {
                self.registry
                    .update(&device.serial, |d| d.chain_size = Some(size));
                return Ok(size);
            }
        }
        device
            .matrix_size()
            .ok_or(LifxError::UnsupportedCapability {
                serial: device.serial,
                capability: "matrix",
            })
    }

    /// Width and height of the first tile in the device chain.
    async fn query_chain_size(&self, device: &LifxDevice) -> Option<(usize, usize)> {
        let chain = self
            .query(device, Message::GetDeviceChain, |m| match m {
                Message::StateDeviceChain(chain) => Some(chain.clone()),
                _ => None,
            })
            .await;
        match chain {
            Ok(chain) => chain
                .tiles
                .first()
                .filter(|tile| tile.width > 0 && tile.height > 0)
                .map(|tile| (tile.width as usize, tile.height as usize)),
            Err(e) => {
                debug!("No tile chain from {}: {}", device.serial, e);
                None
            }
        }
    }

    /// Paints a whole matrix. `colors` is row major and must hold exactly
    /// width × height entries; nothing is sent otherwise.
    pub async fn set_pixels(
        &self,
        device: &LifxDevice,
        colors: &[Hsbk],
        fade: Option<Duration>,
    ) -> Result<()> {
        let (width, height) = self.get_matrix_size(device).await?;
        if colors.len() != width * height {
            return Err(LifxError::InvalidPixelCount {
                expected: width * height,
                actual: colors.len(),
            });
        }
        let duration = duration_ms(self.fade_or_default(fade));
        for message in set64_rows(colors, width, duration) {
            self.command(device, message).await?;
        }
        Ok(())
    }

    /// Gathers everything the device will tell about itself. Only the
    /// LightState query is required; the rest are best effort.
    pub async fn query_info(&self, device: &LifxDevice) -> Result<DeviceInfo> {
        let state = self.query(device, Message::GetColor, |m| match m {
            Message::LightState(state) => Some(state.clone()),
            _ => None,
        });
        let version = self.query(device, Message::GetVersion, |m| match m {
            Message::StateVersion(version) => Some(*version),
            _ => None,
        });
        let firmware = self.query(device, Message::GetHostFirmware, |m| match m {
            Message::StateHostFirmware(firmware) => {
                Some(format!("{}.{}", firmware.version_major, firmware.version_minor))
            }
            _ => None,
        });
        let wifi = self.query(device, Message::GetWifiInfo, |m| match m {
            Message::StateWifiInfo(wifi) => Some(wifi.signal_dbm()),
            _ => None,
        });
        let location = self.query(device, Message::GetLocation, |m| match m {
            Message::StateLocation(location) => Some(location.label.clone()),
            _ => None,
        });
        let group = self.query(device, Message::GetGroup, |m| match m {
            Message::StateGroup(group) => Some(group.label.clone()),
            _ => None,
        });
        let runtime = self.query(device, Message::GetInfo, |m| match m {
            Message::StateInfo(info) => Some(info.uptime / 1_000_000_000),
            _ => None,
        });
        let (state, version, firmware, wifi, location, group, uptime) =
            tokio::join!(state, version, firmware, wifi, location, group, runtime);

        let state = state?;
        self.registry.apply_light_state(&device.serial, &state);
        if let Ok(version) = &version {
            self.registry.apply_version(&device.serial, version);
        }
        let product_id = version.ok().map(|v| v.product).or(device.product_id);
        let product = product_id
            .map(product::lookup)
            .unwrap_or_else(|| Product::unknown(0));
        let matrix_size = match device.chain_size {
            Some(size) => Some(size),
            None if product::is_known(product.id) => product.matrix_size(),
            None => self.query_chain_size(device).await,
        };

        let infrared = if product.features.infrared {
            self.query(device, Message::GetInfrared, |m| match m {
                Message::StateInfrared { brightness } => Some(*brightness),
                _ => None,
            })
            .await
            .ok()
        } else {
            None
        };
        let (zones, multizone_effect) = if product.features.multizone {
            let effect = self.query(device, Message::GetMultiZoneEffect, |m| match m {
                Message::StateMultiZoneEffect(effect) => Some(*effect),
                _ => None,
            });
            let (zones, effect) = tokio::join!(
                self.query_zones(device, product.features.extended_multizone),
                effect
            );
            (zones, effect.ok())
        } else {
            (None, None)
        };

        Ok(DeviceInfo {
            serial: device.serial,
            address: device.addr,
            label: state.label,
            power: Some(state.power > 0),
            color: Some(state.color),
            matrix_size,
            product,
            firmware: firmware.ok(),
            wifi_signal_dbm: wifi.ok().filter(|dbm| dbm.is_finite()),
            location: location.ok(),
            group: group.ok(),
            uptime_secs: uptime.ok(),
            infrared,
            zones,
            multizone_effect,
        })
    }

    async fn query_zones(&self, device: &LifxDevice, extended: bool) -> Option<Vec<Hsbk>> {
        let message = if extended {
            Message::GetExtendedColorZones
        } else {
            Message::GetColorZones {
                start_index: 0,
                end_index: 255,
            }
        };
        let packet = Packet::new(0, Some(device.serial), message).with_res_required(true);
        let replies = self
            .transport
            .request_many(packet, device.addr, self.config.timeout(), |messages| {
                assemble_zones(messages).is_some()
            })
            .await;
        match replies {
            Ok(replies) => assemble_zones(&replies),
            Err(e) => {
                debug!("Zone query to {} failed: {}", device.serial, e);
                None
            }
        }
    }

    /// Starts an effect. The device's current color is read first when it is
    /// unknown, so the session can put it back afterwards.
    pub async fn run_effect(
        &self,
        device: &LifxDevice,
        kind: EffectKind,
        params: EffectParams,
    ) -> Result<SessionHandle> {
        let mut device = if device.color.is_none() || device.product_id.is_none() {
            match self.refresh(device).await {
                Ok(device) => device,
                Err(e) => {
                    debug!("Starting {} without fresh state: {}", kind, e);
                    device.clone()
                }
            }
        } else {
            device.clone()
        };
        if kind.is_matrix() && device.matrix_size().is_none() {
            device.chain_size = self.get_matrix_size(&device).await.ok();
        }
        self.effects.start(&device, kind, params).await
    }

    pub async fn stop_effect(&self, serial: &Serial) -> bool {
        self.effects.stop(serial).await
    }

    /// Ends whatever animates `device`: a session of this client, or else a
    /// firmware tile effect or bulb side waveform started elsewhere.
    pub async fn halt_effects(&self, device: &LifxDevice) -> Result<()> {
        if self.effects.stop(&device.serial).await {
            return Ok(());
        }
        let device = self.refresh(device).await?;
        if device.matrix_size().is_some() {
            self.command(&device, Message::SetTileEffect(TileEffect::off(0)))
                .await?;
        }
        // any new color replaces a running waveform
        if let Some(color) = device.color {
            self.command(&device, Message::SetColor { color, duration: 0 })
                .await?;
        }
        Ok(())
    }

    pub async fn stop_all_effects(&self) {
        self.effects.stop_all().await
    }

    pub fn is_effect_running(&self, serial: &Serial) -> bool {
        self.effects.is_running(serial)
    }

    pub fn list_effects(&self, matrix_only: bool) -> Vec<EffectKind> {
        self.effects.list(matrix_only)
    }

    fn broadcast_target(&self) -> Result<SocketAddr> {
        let ip = broadcast_address(&self.config.subnet)?;
        Ok(SocketAddr::new(IpAddr::V4(ip), self.config.port))
    }

    /// Tagged power packet to every bulb on the subnet.
    pub async fn broadcast_power(&self, on: bool, fade: Option<Duration>) -> Result<()> {
        let level = if on { POWER_ON } else { POWER_OFF };
        let message = Self::power_message(level, self.fade_or_default(fade));
        let target = self.broadcast_target()?;
        info!("Broadcasting power {} to {}", if on { "on" } else { "off" }, target);
        self.transport
            .send(&Packet::new(self.source, None, message), target)
            .await
    }

    /// Tagged SetColor to every bulb on the subnet.
    pub async fn broadcast_color(&self, color: Hsbk, fade: Option<Duration>) -> Result<()> {
        let duration = duration_ms(self.fade_or_default(fade));
        let target = self.broadcast_target()?;
        info!("Broadcasting {} to {}", color, target);
        self.transport
            .send(
                &Packet::new(self.source, None, Message::SetColor { color, duration }),
                target,
            )
            .await
    }
}

/// Builds the zone list from State(Extended)MultiZone and StateZone replies.
/// `None` until every zone has been seen.
fn assemble_zones(messages: &[Message]) -> Option<Vec<Hsbk>> {
    let mut zones: Vec<Option<Hsbk>> = Vec::new();
    for message in messages {
        let (count, index, colors) = match message {
            Message::StateExtendedColorZones(z) => {
                (z.count as usize, z.index as usize, z.colors.as_slice())
            }
            Message::StateMultiZone(z) => (z.count as usize, z.index as usize, z.colors.as_slice()),
            Message::StateZone(z) => (
                z.count as usize,
                z.index as usize,
                std::slice::from_ref(&z.color),
            ),
            _ => continue,
        };
        if zones.len() < count {
            zones.resize(count, None);
        }
        for (offset, color) in colors.iter().enumerate() {
            if let Some(slot) = zones.get_mut(index + offset) {
                *slot = Some(*color);
            }
        }
    }
    if zones.is_empty() {
        return None;
    }
    zones.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::testing::FakeBulb;
    use crate::protocol::{ChainTile, DeviceChain, ExtendedColorZones, StateMultiZone};

    async fn client(require_ack: bool) -> LifxClient {
        LifxClient::new(LifxConfig {
            subnet: "127.0.0.1/32".to_string(),
            bind_address: "127.0.0.1:0".parse().unwrap(),
            timeout_ms: 300,
            require_ack,
            ..LifxConfig::default()
        })
        .await
        .unwrap()
    }

    async fn bulb_and_device(
        client: &LifxClient,
        last: u8,
        product: u32,
    ) -> (FakeBulb, LifxDevice) {
        let bulb = FakeBulb::spawn(Serial::new([0xd0, 0x73, 0xd5, 0, 1, last]), product, "Desk").await;
        let device = LifxDevice::new(bulb.serial, bulb.addr, 1).with_product(product);
        client.registry().insert(device.clone());
        (bulb, device)
    }

    #[tokio::test]
    async fn test_acknowledged_commands_change_the_bulb() {
        let client = client(true).await;
        let (bulb, device) = bulb_and_device(&client, 1, 27).await;

        client.set_power(&device, false, None).await.unwrap();
        assert_eq!(bulb.power(), 0);
        assert_eq!(client.registry().get(&device.serial).unwrap().is_on(), Some(false));

        client
            .set_power(&device, true, Some(Duration::from_millis(500)))
            .await
            .unwrap();
        assert_eq!(bulb.power(), 65535);
        assert_eq!(
            bulb.count_received(|m| matches!(m, Message::SetLightPower { duration: 500, .. })),
            1
        );

        let red = Hsbk::from_name("red").unwrap();
        client.set_color(&device, red, None).await.unwrap();
        assert_eq!(bulb.color(), red);

        client.set_label(&device, "Reading").await.unwrap();
        assert_eq!(bulb.label(), "Reading");
        assert_eq!(client.resolve_one("reading").unwrap().serial, device.serial);
    }

    #[tokio::test]
    async fn test_missing_acknowledgement_is_a_timeout() {
        let client = client(true).await;
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let device = LifxDevice::new(
            Serial::new([0xd0, 0x73, 0xd5, 0, 1, 9]),
            silent.local_addr().unwrap(),
            1,
        );
        let err = client.set_power(&device, true, None).await.unwrap_err();
        assert!(err.is_timeout(), "{}", err);
    }

    #[tokio::test]
    async fn test_query_info() {
        let client = client(false).await;
        let (_bulb, device) = bulb_and_device(&client, 2, 29).await;
        let info = client.query_info(&device).await.unwrap();
        assert_eq!(info.label, "Desk");
        assert_eq!(info.power, Some(true));
        assert_eq!(info.product.name, "LIFX A19 Night Vision");
        assert_eq!(info.firmware.as_deref(), Some("3.70"));
        assert!((info.wifi_signal_dbm.unwrap() + 50.0).abs() < 0.01);
        assert_eq!(info.location.as_deref(), Some("Home"));
        assert_eq!(info.group.as_deref(), Some("Living Room"));
        assert_eq!(info.uptime_secs, Some(90));
        assert_eq!(info.infrared, Some(0));
        assert_eq!(info.zones, None);
        assert_eq!(info.matrix_size, None);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["serial"], "d0:73:d5:00:01:02");
    }

    #[tokio::test]
    async fn test_set_pixels_checks_count_before_sending() {
        let client = client(true).await;
        let (bulb, device) = bulb_and_device(&client, 3, 55).await;
        assert_eq!(client.get_matrix_size(&device).await.unwrap(), (8, 8));

        for wrong in [63, 65] {
            let result = client
                .set_pixels(&device, &vec![Hsbk::BLACK; wrong], None)
                .await;
            assert!(matches!(
                result,
                Err(LifxError::InvalidPixelCount { expected: 64, actual }) if actual == wrong
            ));
        }
        assert_eq!(bulb.count_received(|m| matches!(m, Message::Set64 { .. })), 0);

        client
            .set_pixels(&device, &vec![Hsbk::BLACK; 64], None)
            .await
            .unwrap();
        assert_eq!(bulb.count_received(|m| matches!(m, Message::Set64 { .. })), 1);
    }

    #[tokio::test]
    async fn test_matrix_calls_rejected_on_plain_bulb() {
        let client = client(false).await;
        let (bulb, device) = bulb_and_device(&client, 4, 27).await;
        assert!(matches!(
            client.get_matrix_size(&device).await,
            Err(LifxError::UnsupportedCapability { .. })
        ));
        assert!(matches!(
            client.set_pixels(&device, &[Hsbk::BLACK; 64], None).await,
            Err(LifxError::UnsupportedCapability { .. })
        ));
        assert!(matches!(
            client.set_infrared(&device, 100).await,
            Err(LifxError::UnsupportedCapability { .. })
        ));
        assert!(bulb.received().is_empty());
    }

    #[tokio::test]
    async fn test_run_effect_reads_color_first() {
        let client = client(false).await;
        let bulb = FakeBulb::spawn(Serial::new([0xd0, 0x73, 0xd5, 0, 1, 5]), 27, "Lamp").await;
        let device = LifxDevice::new(bulb.serial, bulb.addr, 1);
        client.registry().insert(device.clone());

        let mut handle = client
            .run_effect(
                &device,
                EffectKind::Pulse,
                EffectParams {
                    period: Duration::from_millis(100),
                    cycles: 1.0,
                    ..EffectParams::default()
                },
            )
            .await
            .unwrap();
        handle.finished().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let waveforms: Vec<Waveform> = bulb
            .received()
            .into_iter()
            .filter_map(|p| match p.message {
                Message::SetWaveform(waveform) => Some(waveform),
                _ => None,
            })
            .collect();
        assert_eq!(waveforms.len(), 1);
        assert_eq!(waveforms[0].color.hue, bulb.color().hue);
        assert_eq!(waveforms[0].color.brightness, 0);
        assert!(!client.is_effect_running(&device.serial));
    }

    #[tokio::test]
    async fn test_halt_effects_without_session() {
        let client = client(true).await;
        let (bulb, device) = bulb_and_device(&client, 6, 55).await;
        client.halt_effects(&device).await.unwrap();
        let messages: Vec<Message> = bulb.received().into_iter().map(|p| p.message).collect();
        assert!(messages.iter().any(|m| matches!(
            m,
            Message::SetTileEffect(effect) if effect.effect_type == crate::protocol::TileEffectType::Off
        )));
        assert!(matches!(messages.last(), Some(Message::SetColor { duration: 0, .. })));
    }

    #[tokio::test]
    async fn test_query_info_reports_zones_and_zone_effect() {
        let client = client(false).await;
        let (bulb, device) = bulb_and_device(&client, 7, 32).await;
        let red = Hsbk::new(0, 65535, 65535, 3500);
        bulb.set_zones(vec![red; 10]);
        bulb.set_multizone_effect(MultiZoneEffect {
            instance_id: 7,
            effect_type: 1,
            speed: 5000,
            duration: 0,
        });

        let info = client.query_info(&device).await.unwrap();
        assert_eq!(info.zones, Some(vec![red; 10]));
        let effect = info.multizone_effect.unwrap();
        assert_eq!(effect.type_name(), "Move");
        assert!(effect.is_running());
        assert_eq!(effect.speed, 5000);
        assert_eq!(info.infrared, None);
        assert_eq!(
            bulb.count_received(|m| matches!(m, Message::GetMultiZoneEffect)),
            1
        );
    }

    #[tokio::test]
    async fn test_query_info_skips_zone_effect_on_plain_bulb() {
        let client = client(false).await;
        let (bulb, device) = bulb_and_device(&client, 8, 27).await;
        let info = client.query_info(&device).await.unwrap();
        assert_eq!(info.multizone_effect, None);
        assert_eq!(
            bulb.count_received(|m| matches!(m, Message::GetMultiZoneEffect)),
            0
        );
    }

    #[tokio::test]
    async fn test_matrix_size_from_tile_chain() {
        let client = client(true).await;
        let (bulb, device) = bulb_and_device(&client, 9, 9999).await;
        bulb.set_chain(DeviceChain {
            start_index: 0,
            tiles: vec![ChainTile {
                width: 16,
                height: 8,
                ..ChainTile::default()
            }],
        });

        assert_eq!(client.get_matrix_size(&device).await.unwrap(), (16, 8));
        let known = client.registry().get(&device.serial).unwrap();
        assert_eq!(known.chain_size, Some((16, 8)));

        client
            .set_pixels(&known, &vec![Hsbk::BLACK; 128], None)
            .await
            .unwrap();
        assert_eq!(bulb.count_received(|m| matches!(m, Message::Set64 { .. })), 2);
        assert_eq!(
            bulb.count_received(|m| matches!(m, Message::GetDeviceChain)),
            1
        );
    }

    #[tokio::test]
    async fn test_known_product_never_asks_for_chain() {
        let client = client(false).await;
        let (bulb, device) = bulb_and_device(&client, 10, 55).await;
        bulb.set_chain(DeviceChain {
            start_index: 0,
            tiles: vec![ChainTile {
                width: 16,
                height: 8,
                ..ChainTile::default()
            }],
        });
        assert_eq!(client.get_matrix_size(&device).await.unwrap(), (8, 8));
        assert_eq!(
            bulb.count_received(|m| matches!(m, Message::GetDeviceChain)),
            0
        );
    }

    #[test]
    fn test_assemble_zones() {
        let red = Hsbk::new(0, 65535, 65535, 3500);
        let blue = Hsbk::new(43690, 65535, 65535, 3500);
        let legacy = vec![
            Message::StateMultiZone(StateMultiZone {
                count: 10,
                index: 8,
                colors: vec![blue; 8],
            }),
            Message::StateMultiZone(StateMultiZone {
                count: 10,
                index: 0,
                colors: vec![red; 8],
            }),
        ];
        let zones = assemble_zones(&legacy).unwrap();
        assert_eq!(zones.len(), 10);
        assert_eq!(zones[7], red);
        assert_eq!(zones[9], blue);
        assert!(assemble_zones(&legacy[..1]).is_none());

        let extended = vec![Message::StateExtendedColorZones(ExtendedColorZones {
            count: 3,
            index: 0,
            colors: vec![red; 3],
        })];
        assert_eq!(assemble_zones(&extended).unwrap().len(), 3);
        assert!(assemble_zones(&[]).is_none());
    }
}
