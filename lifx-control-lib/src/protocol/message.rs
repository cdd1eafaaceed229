use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::color::Hsbk;
use crate::error::CodecError;
use crate::protocol::{
    EXTENDED_ZONES_PER_MESSAGE, LABEL_SIZE, PIXELS_PER_TILE_MESSAGE, TILE_PALETTE_SIZE,
};

const HSBK_SIZE: usize = 8;
const MULTIZONE_COLORS: usize = 8;
const TILE_EFFECT_PARAMETERS: usize = 32;
const CHAIN_TILES: usize = 16;
const CHAIN_TILE_SIZE: usize = 55;

/// StateService.service value for the UDP control service.
pub const SERVICE_UDP: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Service {
    pub service: u8,
    pub port: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostFirmware {
    pub build: u64,
    pub version_minor: u16,
    pub version_major: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WifiInfo {
    /// Received power in milliwatts.
    pub signal: f32,
    pub tx: u32,
    pub rx: u32,
}

impl WifiInfo {
    pub fn signal_dbm(&self) -> f64 {
        if self.signal <= 0.0 {
            return f64::NEG_INFINITY;
        }
        10.0 * (self.signal as f64).log10()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Version {
    pub vendor: u32,
    pub product: u32,
    pub version: u32,
}

/// Times are nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuntimeInfo {
    pub time: u64,
    pub uptime: u64,
    pub downtime: u64,
}

/// A location or group membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collection {
    #[serde(serialize_with = "serialize_hex")]
    pub id: [u8; 16],
    pub label: String,
    pub updated_at: u64,
}

fn serialize_hex<S: serde::Serializer>(id: &[u8; 16], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WaveformKind {
    Saw,
    Sine,
    HalfSine,
    Triangle,
    Pulse,
}

impl WaveformKind {
    fn to_u8(self) -> u8 {
        match self {
            WaveformKind::Saw => 0,
            WaveformKind::Sine => 1,
            WaveformKind::HalfSine => 2,
            WaveformKind::Triangle => 3,
            WaveformKind::Pulse => 4,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(WaveformKind::Saw),
            1 => Some(WaveformKind::Sine),
            2 => Some(WaveformKind::HalfSine),
            3 => Some(WaveformKind::Triangle),
            4 => Some(WaveformKind::Pulse),
            _ => None,
        }
    }
}

/// SetWaveform payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waveform {
    /// Return to the original color once the cycles finish.
    pub transient: bool,
    pub color: Hsbk,
    /// Milliseconds per cycle.
    pub period: u32,
    pub cycles: f32,
    /// Duty cycle as a fraction of 32767.
    pub skew_ratio: i16,
    pub waveform: WaveformKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LightState {
    pub color: Hsbk,
    pub power: u16,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateZone {
    pub count: u8,
    pub index: u8,
    pub color: Hsbk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateMultiZone {
    pub count: u8,
    pub index: u8,
    pub colors: Vec<Hsbk>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendedColorZones {
    pub count: u16,
    pub index: u16,
    pub colors: Vec<Hsbk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MultiZoneEffect {
    pub instance_id: u32,
    pub effect_type: u8,
    pub speed: u32,
    pub duration: u64,
}

impl MultiZoneEffect {
    pub fn type_name(&self) -> String {
        match self.effect_type {
            0 => "Off".to_string(),
            1 => "Move".to_string(),
            other => format!("Unknown ({})", other),
        }
    }

    pub fn is_running(&self) -> bool {
        self.effect_type != 0
    }
}

/// Rectangle addressed by Get64 and Set64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileRect {
    pub tile_index: u8,
    pub length: u8,
    pub x: u8,
    pub y: u8,
    pub width: u8,
}

/// State64 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile64 {
    pub tile_index: u8,
    pub x: u8,
    pub y: u8,
    pub width: u8,
    pub colors: Vec<Hsbk>,
}

/// One entry of the tile chain: orientation, placement, size and identity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ChainTile {
    pub accel_x: i16,
    pub accel_y: i16,
    pub accel_z: i16,
    pub user_x: f32,
    pub user_y: f32,
    pub width: u8,
    pub height: u8,
    pub vendor: u32,
    pub product: u32,
    pub version: u32,
    pub firmware_build: u64,
    pub firmware_minor: u16,
    pub firmware_major: u16,
}

/// StateDeviceChain payload. Only the tiles in use are kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceChain {
    pub start_index: u8,
    pub tiles: Vec<ChainTile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TileEffectType {
    Off,
    Morph,
    Flame,
    Sky,
    Other(u8),
}

impl From<u8> for TileEffectType {
    fn from(value: u8) -> Self {
        match value {
            0 => TileEffectType::Off,
            2 => TileEffectType::Morph,
            3 => TileEffectType::Flame,
            5 => TileEffectType::Sky,
            other => TileEffectType::Other(other),
        }
    }
}

impl From<TileEffectType> for u8 {
    fn from(value: TileEffectType) -> Self {
        match value {
            TileEffectType::Off => 0,
            TileEffectType::Morph => 2,
            TileEffectType::Flame => 3,
            TileEffectType::Sky => 5,
            TileEffectType::Other(other) => other,
        }
    }
}

/// Firmware tile animation, shared by SetTileEffect and StateTileEffect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileEffect {
    pub instance_id: u32,
    pub effect_type: TileEffectType,
    /// Milliseconds per animation step.
    pub speed: u32,
    /// Nanoseconds, 0 runs until replaced.
    pub duration: u64,
    pub sky_type: u8,
    pub cloud_saturation_min: u8,
    pub cloud_saturation_max: u16,
    pub palette: Vec<Hsbk>,
}

impl TileEffect {
    pub fn off(instance_id: u32) -> Self {
        TileEffect {
            instance_id,
            effect_type: TileEffectType::Off,
            speed: 0,
            duration: 0,
            sky_type: 0,
            cloud_saturation_min: 0,
            cloud_saturation_max: 0,
            palette: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    GetService,
    StateService(Service),
    GetHostFirmware,
    StateHostFirmware(HostFirmware),
    GetWifiInfo,
    StateWifiInfo(WifiInfo),
    GetPower,
    SetPower { level: u16 },
    StatePower { level: u16 },
    GetLabel,
    SetLabel { label: String },
    StateLabel { label: String },
    GetVersion,
    StateVersion(Version),
    GetInfo,
    StateInfo(RuntimeInfo),
    Acknowledgement,
    GetLocation,
    StateLocation(Collection),
    GetGroup,
    StateGroup(Collection),
    GetColor,
    SetColor { color: Hsbk, duration: u32 },
    SetWaveform(Waveform),
    LightState(LightState),
    GetLightPower,
    SetLightPower { level: u16, duration: u32 },
    StateLightPower { level: u16 },
    GetInfrared,
    StateInfrared { brightness: u16 },
    SetInfrared { brightness: u16 },
    GetColorZones { start_index: u8, end_index: u8 },
    StateZone(StateZone),
    StateMultiZone(StateMultiZone),
    GetMultiZoneEffect,
    StateMultiZoneEffect(MultiZoneEffect),
    GetExtendedColorZones,
    StateExtendedColorZones(ExtendedColorZones),
    GetDeviceChain,
    StateDeviceChain(DeviceChain),
    Get64(TileRect),
    State64(Tile64),
    Set64 {
        rect: TileRect,
        duration: u32,
        colors: Vec<Hsbk>,
    },
    GetTileEffect,
    SetTileEffect(TileEffect),
    StateTileEffect(TileEffect),
    /// Any type this library does not model, kept as raw payload.
    Unknown { kind: u16, payload: Bytes },
}

fn need(kind: &'static str, payload: &[u8], expected: usize) -> Result<(), CodecError> {
    if payload.len() < expected {
        return Err(CodecError::Truncated {
            kind,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn put_hsbk(buf: &mut BytesMut, color: &Hsbk) {
    buf.put_u16_le(color.hue);
    buf.put_u16_le(color.saturation);
    buf.put_u16_le(color.brightness);
    buf.put_u16_le(color.kelvin);
}

fn get_hsbk(buf: &mut &[u8]) -> Hsbk {
    Hsbk::new(
        buf.get_u16_le(),
        buf.get_u16_le(),
        buf.get_u16_le(),
        buf.get_u16_le(),
    )
}

fn get_colors(buf: &mut &[u8], count: usize) -> Vec<Hsbk> {
    (0..count).map(|_| get_hsbk(buf)).collect()
}

/// Writes `colors` padded with `filler` up to `slots` records.
fn put_colors(
    buf: &mut BytesMut,
    kind: &'static str,
    colors: &[Hsbk],
    slots: usize,
    filler: Hsbk,
) -> Result<(), CodecError> {
    if colors.len() > slots {
        return Err(CodecError::TooManyColors {
            kind,
            max: slots,
            actual: colors.len(),
        });
    }
    for color in colors {
        put_hsbk(buf, color);
    }
    for _ in colors.len()..slots {
        put_hsbk(buf, &filler);
    }
    Ok(())
}

/// Truncates to 32 bytes on a char boundary and pads with NULs.
fn put_label(buf: &mut BytesMut, label: &str) {
    let mut end = label.len().min(LABEL_SIZE);
    while !label.is_char_boundary(end) {
        end -= 1;
    }
    buf.put_slice(&label.as_bytes()[..end]);
    buf.put_bytes(0, LABEL_SIZE - end);
}

fn get_label(buf: &mut &[u8]) -> String {
    let raw = &buf[..LABEL_SIZE];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(LABEL_SIZE);
    let label = String::from_utf8_lossy(&raw[..end]).into_owned();
    buf.advance(LABEL_SIZE);
    label
}

fn put_collection(buf: &mut BytesMut, collection: &Collection) {
    buf.put_slice(&collection.id);
    put_label(buf, &collection.label);
    buf.put_u64_le(collection.updated_at);
}

fn get_collection(kind: &'static str, payload: &[u8]) -> Result<Collection, CodecError> {
    need(kind, payload, 16 + LABEL_SIZE + 8)?;
    let mut buf = payload;
    let mut id = [0u8; 16];
    buf.copy_to_slice(&mut id);
    let label = get_label(&mut buf);
    Ok(Collection {
        id,
        label,
        updated_at: buf.get_u64_le(),
    })
}

fn put_tile_effect(buf: &mut BytesMut, effect: &TileEffect) -> Result<(), CodecError> {
    buf.put_u32_le(effect.instance_id);
    buf.put_u8(effect.effect_type.into());
    buf.put_u32_le(effect.speed);
    buf.put_u64_le(effect.duration);
    buf.put_bytes(0, 8);
    buf.put_u8(effect.sky_type);
    buf.put_u8(0);
    buf.put_u8(effect.cloud_saturation_min);
    buf.put_u16_le(effect.cloud_saturation_max);
    buf.put_bytes(0, TILE_EFFECT_PARAMETERS - 5);
    buf.put_u8(effect.palette.len().min(TILE_PALETTE_SIZE) as u8);
    put_colors(
        buf,
        "tile effect palette",
        &effect.palette,
        TILE_PALETTE_SIZE,
        Hsbk::new(0, 0, 0, 0),
    )
}

fn get_tile_effect(buf: &mut &[u8]) -> TileEffect {
    let instance_id = buf.get_u32_le();
    let effect_type = TileEffectType::from(buf.get_u8());
    let speed = buf.get_u32_le();
    let duration = buf.get_u64_le();
    buf.advance(8);
    let mut parameters = &buf[..TILE_EFFECT_PARAMETERS];
    let sky_type = parameters.get_u8();
    parameters.advance(1);
    let cloud_saturation_min = parameters.get_u8();
    let cloud_saturation_max = parameters.get_u16_le();
    buf.advance(TILE_EFFECT_PARAMETERS);
    let count = (buf.get_u8() as usize).min(TILE_PALETTE_SIZE);
    let palette = get_colors(buf, TILE_PALETTE_SIZE);
    TileEffect {
        instance_id,
        effect_type,
        speed,
        duration,
        sky_type,
        cloud_saturation_min,
        cloud_saturation_max,
        palette: palette.into_iter().take(count).collect(),
    }
}

// instance, type, speed, duration, reserved, parameters, count, palette
const TILE_EFFECT_BODY: usize = 4 + 1 + 4 + 8 + 8 + TILE_EFFECT_PARAMETERS + 1 + 16 * HSBK_SIZE;

fn put_chain_tile(buf: &mut BytesMut, tile: &ChainTile) {
    buf.put_i16_le(tile.accel_x);
    buf.put_i16_le(tile.accel_y);
    buf.put_i16_le(tile.accel_z);
    buf.put_u16_le(0);
    buf.put_f32_le(tile.user_x);
    buf.put_f32_le(tile.user_y);
    buf.put_u8(tile.width);
    buf.put_u8(tile.height);
    buf.put_u8(0);
    buf.put_u32_le(tile.vendor);
    buf.put_u32_le(tile.product);
    buf.put_u32_le(tile.version);
    buf.put_u64_le(tile.firmware_build);
    buf.put_u64_le(0);
    buf.put_u16_le(tile.firmware_minor);
    buf.put_u16_le(tile.firmware_major);
    buf.put_u32_le(0);
}

fn get_chain_tile(buf: &mut &[u8]) -> ChainTile {
    let accel_x = buf.get_i16_le();
    let accel_y = buf.get_i16_le();
    let accel_z = buf.get_i16_le();
    buf.advance(2);
    let user_x = buf.get_f32_le();
    let user_y = buf.get_f32_le();
    let width = buf.get_u8();
    let height = buf.get_u8();
    buf.advance(1);
    let vendor = buf.get_u32_le();
    let product = buf.get_u32_le();
    let version = buf.get_u32_le();
    let firmware_build = buf.get_u64_le();
    buf.advance(8);
    let firmware_minor = buf.get_u16_le();
    let firmware_major = buf.get_u16_le();
    buf.advance(4);
    ChainTile {
        accel_x,
        accel_y,
        accel_z,
        user_x,
        user_y,
        width,
        height,
        vendor,
        product,
        version,
        firmware_build,
        firmware_minor,
        firmware_major,
    }
}

impl Message {
    pub fn message_type(&self) -> u16 {
        match self {
            Message::GetService => 2,
            Message::StateService(_) => 3,
            Message::GetHostFirmware => 14,
            Message::StateHostFirmware(_) => 15,
            Message::GetWifiInfo => 16,
            Message::StateWifiInfo(_) => 17,
            Message::GetPower => 20,
            Message::SetPower { .. } => 21,
            Message::StatePower { .. } => 22,
            Message::GetLabel => 23,
            Message::SetLabel { .. } => 24,
            Message::StateLabel { .. } => 25,
            Message::GetVersion => 32,
            Message::StateVersion(_) => 33,
            Message::GetInfo => 34,
            Message::StateInfo(_) => 35,
            Message::Acknowledgement => 45,
            Message::GetLocation => 48,
            Message::StateLocation(_) => 50,
            Message::GetGroup => 51,
            Message::StateGroup(_) => 53,
            Message::GetColor => 101,
            Message::SetColor { .. } => 102,
            Message::SetWaveform(_) => 103,
            Message::LightState(_) => 107,
            Message::GetLightPower => 116,
            Message::SetLightPower { .. } => 117,
            Message::StateLightPower { .. } => 118,
            Message::GetInfrared => 120,
            Message::StateInfrared { .. } => 121,
            Message::SetInfrared { .. } => 122,
            Message::GetColorZones { .. } => 502,
            Message::StateZone(_) => 503,
            Message::StateMultiZone(_) => 506,
            Message::GetMultiZoneEffect => 507,
            Message::StateMultiZoneEffect(_) => 509,
            Message::GetExtendedColorZones => 511,
            Message::StateExtendedColorZones(_) => 512,
            Message::GetDeviceChain => 701,
            Message::StateDeviceChain(_) => 702,
            Message::Get64(_) => 707,
            Message::State64(_) => 711,
            Message::Set64 { .. } => 715,
            Message::GetTileEffect => 718,
            Message::SetTileEffect(_) => 719,
            Message::StateTileEffect(_) => 720,
            Message::Unknown { kind, .. } => *kind,
        }
    }

    /// Short name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Message::GetService => "GetService",
            Message::StateService(_) => "StateService",
            Message::GetHostFirmware => "GetHostFirmware",
            Message::StateHostFirmware(_) => "StateHostFirmware",
            Message::GetWifiInfo => "GetWifiInfo",
            Message::StateWifiInfo(_) => "StateWifiInfo",
            Message::GetPower => "GetPower",
            Message::SetPower { .. } => "SetPower",
            Message::StatePower { .. } => "StatePower",
            Message::GetLabel => "GetLabel",
            Message::SetLabel { .. } => "SetLabel",
            Message::StateLabel { .. } => "StateLabel",
            Message::GetVersion => "GetVersion",
            Message::StateVersion(_) => "StateVersion",
            Message::GetInfo => "GetInfo",
            Message::StateInfo(_) => "StateInfo",
            Message::Acknowledgement => "Acknowledgement",
            Message::GetLocation => "GetLocation",
            Message::StateLocation(_) => "StateLocation",
            Message::GetGroup => "GetGroup",
            Message::StateGroup(_) => "StateGroup",
            Message::GetColor => "GetColor",
            Message::SetColor { .. } => "SetColor",
            Message::SetWaveform(_) => "SetWaveform",
            Message::LightState(_) => "LightState",
            Message::GetLightPower => "GetLightPower",
            Message::SetLightPower { .. } => "SetLightPower",
            Message::StateLightPower { .. } => "StateLightPower",
            Message::GetInfrared => "GetInfrared",
            Message::StateInfrared { .. } => "StateInfrared",
            Message::SetInfrared { .. } => "SetInfrared",
            Message::GetColorZones { .. } => "GetColorZones",
            Message::StateZone(_) => "StateZone",
            Message::StateMultiZone(_) => "StateMultiZone",
            Message::GetMultiZoneEffect => "GetMultiZoneEffect",
            Message::StateMultiZoneEffect(_) => "StateMultiZoneEffect",
            Message::GetExtendedColorZones => "GetExtendedColorZones",
            Message::StateExtendedColorZones(_) => "StateExtendedColorZones",
            Message::GetDeviceChain => "GetDeviceChain",
            Message::StateDeviceChain(_) => "StateDeviceChain",
            Message::Get64(_) => "Get64",
            Message::State64(_) => "State64",
            Message::Set64 { .. } => "Set64",
            Message::GetTileEffect => "GetTileEffect",
            Message::SetTileEffect(_) => "SetTileEffect",
            Message::StateTileEffect(_) => "StateTileEffect",
            Message::Unknown { .. } => "Unknown",
        }
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        match self {
            Message::GetService
            | Message::GetHostFirmware
            | Message::GetWifiInfo
            | Message::GetPower
            | Message::GetLabel
            | Message::GetVersion
            | Message::GetInfo
            | Message::Acknowledgement
            | Message::GetLocation
            | Message::GetGroup
            | Message::GetColor
            | Message::GetLightPower
            | Message::GetInfrared
            | Message::GetMultiZoneEffect
            | Message::GetExtendedColorZones
            | Message::GetDeviceChain
            | Message::GetTileEffect => {}
            Message::StateService(service) => {
                buf.put_u8(service.service);
                buf.put_u32_le(service.port);
            }
            Message::StateHostFirmware(firmware) => {
                buf.put_u64_le(firmware.build);
                buf.put_u64_le(0);
                buf.put_u16_le(firmware.version_minor);
                buf.put_u16_le(firmware.version_major);
            }
            Message::StateWifiInfo(wifi) => {
                buf.put_f32_le(wifi.signal);
                buf.put_u32_le(wifi.tx);
                buf.put_u32_le(wifi.rx);
                buf.put_u16_le(0);
            }
            Message::SetPower { level }
            | Message::StatePower { level }
            | Message::StateLightPower { level } => buf.put_u16_le(*level),
            Message::SetLabel { label } | Message::StateLabel { label } => put_label(buf, label),
            Message::StateVersion(version) => {
                buf.put_u32_le(version.vendor);
                buf.put_u32_le(version.product);
                buf.put_u32_le(version.version);
            }
            Message::StateInfo(info) => {
                buf.put_u64_le(info.time);
                buf.put_u64_le(info.uptime);
                buf.put_u64_le(info.downtime);
            }
            Message::StateLocation(collection) | Message::StateGroup(collection) => {
                put_collection(buf, collection)
            }
            Message::SetColor { color, duration } => {
                buf.put_u8(0);
                put_hsbk(buf, color);
                buf.put_u32_le(*duration);
            }
            Message::SetWaveform(waveform) => {
                buf.put_u8(0);
                buf.put_u8(waveform.transient as u8);
                put_hsbk(buf, &waveform.color);
                buf.put_u32_le(waveform.period);
                buf.put_f32_le(waveform.cycles);
                buf.put_i16_le(waveform.skew_ratio);
                buf.put_u8(waveform.waveform.to_u8());
            }
            Message::LightState(state) => {
                put_hsbk(buf, &state.color);
                buf.put_u16_le(0);
                buf.put_u16_le(state.power);
                put_label(buf, &state.label);
                buf.put_u64_le(0);
            }
            Message::SetLightPower { level, duration } => {
                buf.put_u16_le(*level);
                buf.put_u32_le(*duration);
            }
            Message::StateInfrared { brightness } | Message::SetInfrared { brightness } => {
                buf.put_u16_le(*brightness)
            }
            Message::GetColorZones {
                start_index,
                end_index,
            } => {
                buf.put_u8(*start_index);
                buf.put_u8(*end_index);
            }
            Message::StateZone(zone) => {
                buf.put_u8(zone.count);
                buf.put_u8(zone.index);
                put_hsbk(buf, &zone.color);
            }
            Message::StateMultiZone(zones) => {
                buf.put_u8(zones.count);
                buf.put_u8(zones.index);
                put_colors(
                    buf,
                    "StateMultiZone",
                    &zones.colors,
                    MULTIZONE_COLORS,
                    Hsbk::BLACK,
                )?;
            }
            Message::StateMultiZoneEffect(effect) => {
                buf.put_u32_le(effect.instance_id);
                buf.put_u8(effect.effect_type);
                buf.put_u16_le(0);
                buf.put_u32_le(effect.speed);
                buf.put_u64_le(effect.duration);
                buf.put_bytes(0, 8 + 32);
            }
            Message::StateExtendedColorZones(zones) => {
                buf.put_u16_le(zones.count);
                buf.put_u16_le(zones.index);
                buf.put_u8(zones.colors.len().min(EXTENDED_ZONES_PER_MESSAGE) as u8);
                put_colors(
                    buf,
                    "StateExtendedColorZones",
                    &zones.colors,
                    EXTENDED_ZONES_PER_MESSAGE,
                    Hsbk::new(0, 0, 0, 0),
                )?;
            }
            Message::StateDeviceChain(chain) => {
                if chain.tiles.len() > CHAIN_TILES {
                    return Err(CodecError::InvalidField {
                        kind: "StateDeviceChain",
                        field: "tile count",
                        value: chain.tiles.len() as u64,
                    });
                }
                buf.put_u8(chain.start_index);
                for tile in &chain.tiles {
                    put_chain_tile(buf, tile);
                }
                for _ in chain.tiles.len()..CHAIN_TILES {
                    put_chain_tile(buf, &ChainTile::default());
                }
                buf.put_u8(chain.tiles.len() as u8);
            }
            Message::Get64(rect) => {
                buf.put_u8(rect.tile_index);
                buf.put_u8(rect.length);
                buf.put_u8(0);
                buf.put_u8(rect.x);
                buf.put_u8(rect.y);
                buf.put_u8(rect.width);
            }
            Message::State64(tile) => {
                buf.put_u8(tile.tile_index);
                buf.put_u8(0);
                buf.put_u8(tile.x);
                buf.put_u8(tile.y);
                buf.put_u8(tile.width);
                put_colors(
                    buf,
                    "State64",
                    &tile.colors,
                    PIXELS_PER_TILE_MESSAGE,
                    Hsbk::BLACK,
                )?;
            }
            Message::Set64 {
                rect,
                duration,
                colors,
            } => {
                buf.put_u8(rect.tile_index);
                buf.put_u8(rect.length);
                buf.put_u8(0);
                buf.put_u8(rect.x);
                buf.put_u8(rect.y);
                buf.put_u8(rect.width);
                buf.put_u32_le(*duration);
                put_colors(
                    buf,
                    "Set64",
                    colors,
                    PIXELS_PER_TILE_MESSAGE,
                    Hsbk::BLACK,
                )?;
            }
            Message::SetTileEffect(effect) => {
                buf.put_u8(0);
                buf.put_u8(0);
                put_tile_effect(buf, effect)?;
            }
            Message::StateTileEffect(effect) => {
                buf.put_u8(0);
                put_tile_effect(buf, effect)?;
            }
            Message::Unknown { payload, .. } => buf.extend_from_slice(payload),
        }
        Ok(())
    }

    /// Decodes a payload of the given type. Unrecognised types become
    /// [`Message::Unknown`]; known types reject payloads shorter than their layout.
    pub fn decode(kind: u16, payload: &[u8]) -> Result<Message, CodecError> {
        let mut buf = payload;
        let message = match kind {
            2 => Message::GetService,
            3 => {
                need("StateService", payload, 5)?;
                Message::StateService(Service {
                    service: buf.get_u8(),
                    port: buf.get_u32_le(),
                })
            }
            14 => Message::GetHostFirmware,
            15 => {
                need("StateHostFirmware", payload, 20)?;
                let build = buf.get_u64_le();
                buf.advance(8);
                Message::StateHostFirmware(HostFirmware {
                    build,
                    version_minor: buf.get_u16_le(),
                    version_major: buf.get_u16_le(),
                })
            }
            16 => Message::GetWifiInfo,
            17 => {
                need("StateWifiInfo", payload, 14)?;
                Message::StateWifiInfo(WifiInfo {
                    signal: buf.get_f32_le(),
                    tx: buf.get_u32_le(),
                    rx: buf.get_u32_le(),
                })
            }
            20 => Message::GetPower,
            21 | 22 | 118 => {
                need("power", payload, 2)?;
                let level = buf.get_u16_le();
                match kind {
                    21 => Message::SetPower { level },
                    22 => Message::StatePower { level },
                    _ => Message::StateLightPower { level },
                }
            }
            23 => Message::GetLabel,
            24 | 25 => {
                need("label", payload, LABEL_SIZE)?;
                let label = get_label(&mut buf);
                if kind == 24 {
                    Message::SetLabel { label }
                } else {
                    Message::StateLabel { label }
                }
            }
            32 => Message::GetVersion,
            33 => {
                need("StateVersion", payload, 12)?;
                Message::StateVersion(Version {
                    vendor: buf.get_u32_le(),
                    product: buf.get_u32_le(),
                    version: buf.get_u32_le(),
                })
            }
            34 => Message::GetInfo,
            35 => {
                need("StateInfo", payload, 24)?;
                Message::StateInfo(RuntimeInfo {
                    time: buf.get_u64_le(),
                    uptime: buf.get_u64_le(),
                    downtime: buf.get_u64_le(),
                })
            }
            45 => Message::Acknowledgement,
            48 => Message::GetLocation,
            50 => Message::StateLocation(get_collection("StateLocation", payload)?),
            51 => Message::GetGroup,
            53 => Message::StateGroup(get_collection("StateGroup", payload)?),
            101 => Message::GetColor,
            102 => {
                need("SetColor", payload, 13)?;
                buf.advance(1);
                Message::SetColor {
                    color: get_hsbk(&mut buf),
                    duration: buf.get_u32_le(),
                }
            }
            103 => {
                need("SetWaveform", payload, 21)?;
                buf.advance(1);
                let transient = buf.get_u8() != 0;
                let color = get_hsbk(&mut buf);
                let period = buf.get_u32_le();
                let cycles = buf.get_f32_le();
                let skew_ratio = buf.get_i16_le();
                let raw = buf.get_u8();
                let waveform = WaveformKind::from_u8(raw).ok_or(CodecError::InvalidField {
                    kind: "SetWaveform",
                    field: "waveform",
                    value: raw as u64,
                })?;
                Message::SetWaveform(Waveform {
                    transient,
                    color,
                    period,
                    cycles,
                    skew_ratio,
                    waveform,
                })
            }
            107 => {
                need("LightState", payload, 52)?;
                let color = get_hsbk(&mut buf);
                buf.advance(2);
                let power = buf.get_u16_le();
                let label = get_label(&mut buf);
                Message::LightState(LightState {
                    color,
                    power,
                    label,
                })
            }
            116 => Message::GetLightPower,
            117 => {
                need("SetLightPower", payload, 6)?;
                Message::SetLightPower {
                    level: buf.get_u16_le(),
                    duration: buf.get_u32_le(),
                }
            }
            120 => Message::GetInfrared,
            121 | 122 => {
                need("infrared", payload, 2)?;
                let brightness = buf.get_u16_le();
                if kind == 121 {
                    Message::StateInfrared { brightness }
                } else {
                    Message::SetInfrared { brightness }
                }
            }
            502 => {
                need("GetColorZones", payload, 2)?;
                Message::GetColorZones {
                    start_index: buf.get_u8(),
                    end_index: buf.get_u8(),
                }
            }
            503 => {
                need("StateZone", payload, 2 + HSBK_SIZE)?;
                Message::StateZone(StateZone {
                    count: buf.get_u8(),
                    index: buf.get_u8(),
                    color: get_hsbk(&mut buf),
                })
            }
            506 => {
                need("StateMultiZone", payload, 2 + MULTIZONE_COLORS * HSBK_SIZE)?;
                Message::StateMultiZone(StateMultiZone {
                    count: buf.get_u8(),
                    index: buf.get_u8(),
                    colors: get_colors(&mut buf, MULTIZONE_COLORS),
                })
            }
            507 => Message::GetMultiZoneEffect,
            509 => {
                need("StateMultiZoneEffect", payload, 59)?;
                let instance_id = buf.get_u32_le();
                let effect_type = buf.get_u8();
                buf.advance(2);
                Message::StateMultiZoneEffect(MultiZoneEffect {
                    instance_id,
                    effect_type,
                    speed: buf.get_u32_le(),
                    duration: buf.get_u64_le(),
                })
            }
            511 => Message::GetExtendedColorZones,
            512 => {
                need(
                    "StateExtendedColorZones",
                    payload,
                    5 + EXTENDED_ZONES_PER_MESSAGE * HSBK_SIZE,
                )?;
                let count = buf.get_u16_le();
                let index = buf.get_u16_le();
                let colors_count = (buf.get_u8() as usize).min(EXTENDED_ZONES_PER_MESSAGE);
                Message::StateExtendedColorZones(ExtendedColorZones {
                    count,
                    index,
                    colors: get_colors(&mut buf, colors_count),
                })
            }
            701 => Message::GetDeviceChain,
            702 => {
                need("StateDeviceChain", payload, 2 + CHAIN_TILES * CHAIN_TILE_SIZE)?;
                let start_index = buf.get_u8();
                let mut tiles: Vec<ChainTile> =
                    (0..CHAIN_TILES).map(|_| get_chain_tile(&mut buf)).collect();
                tiles.truncate(buf.get_u8() as usize);
                Message::StateDeviceChain(DeviceChain { start_index, tiles })
            }
            707 => {
                need("Get64", payload, 6)?;
                let tile_index = buf.get_u8();
                let length = buf.get_u8();
                buf.advance(1);
                Message::Get64(TileRect {
                    tile_index,
                    length,
                    x: buf.get_u8(),
                    y: buf.get_u8(),
                    width: buf.get_u8(),
                })
            }
            711 => {
                need("State64", payload, 5 + PIXELS_PER_TILE_MESSAGE * HSBK_SIZE)?;
                let tile_index = buf.get_u8();
                buf.advance(1);
                Message::State64(Tile64 {
                    tile_index,
                    x: buf.get_u8(),
                    y: buf.get_u8(),
                    width: buf.get_u8(),
                    colors: get_colors(&mut buf, PIXELS_PER_TILE_MESSAGE),
                })
            }
            715 => {
                need("Set64", payload, 10 + PIXELS_PER_TILE_MESSAGE * HSBK_SIZE)?;
                let tile_index = buf.get_u8();
                let length = buf.get_u8();
                buf.advance(1);
                let rect = TileRect {
                    tile_index,
                    length,
                    x: buf.get_u8(),
                    y: buf.get_u8(),
                    width: buf.get_u8(),
                };
                Message::Set64 {
                    rect,
                    duration: buf.get_u32_le(),
                    colors: get_colors(&mut buf, PIXELS_PER_TILE_MESSAGE),
                }
            }
            718 => Message::GetTileEffect,
            719 => {
                need("SetTileEffect", payload, 2 + TILE_EFFECT_BODY)?;
                buf.advance(2);
                Message::SetTileEffect(get_tile_effect(&mut buf))
            }
            720 => {
                need("StateTileEffect", payload, 1 + TILE_EFFECT_BODY)?;
                buf.advance(1);
                Message::StateTileEffect(get_tile_effect(&mut buf))
            }
            other => Message::Unknown {
                kind: other,
                payload: Bytes::copy_from_slice(payload),
            },
        };
        Ok(message)
    }
}
