//! The LIFX LAN wire format.
//!
//! Every datagram is a 36-byte little-endian header followed by a payload
//! whose layout depends on the message type. [`Packet`] ties the two together;
//! [`Message`] holds one variant per supported type.

use std::time::Duration;

use crate::color::Hsbk;

pub mod header;
pub mod message;

pub use header::{Header, Packet};
pub use message::{
    ChainTile, Collection, DeviceChain, ExtendedColorZones, HostFirmware, LightState, Message,
    MultiZoneEffect, RuntimeInfo, Service, StateMultiZone, StateZone, Tile64, TileEffect,
    TileEffectType, TileRect, Version, Waveform, WaveformKind, WifiInfo,
};

/// The only protocol number this library speaks.
pub const PROTOCOL_NUMBER: u16 = 1024;
pub const HEADER_SIZE: usize = 36;
pub const DEFAULT_PORT: u16 = 56700;
/// Label fields are fixed 32-byte NUL padded strings.
pub const LABEL_SIZE: usize = 32;
pub const PIXELS_PER_TILE_MESSAGE: usize = 64;
pub const EXTENDED_ZONES_PER_MESSAGE: usize = 82;
pub const TILE_PALETTE_SIZE: usize = 16;

/// Transition times travel as u32 milliseconds; longer values saturate.
pub fn duration_ms(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

/// Splits a row major frame of `width` columns into Set64 messages of whole
/// rows, at most 64 pixels each.
pub fn set64_rows(colors: &[Hsbk], width: usize, duration: u32) -> Vec<Message> {
    let width = width.clamp(1, PIXELS_PER_TILE_MESSAGE);
    let rows_per_message = PIXELS_PER_TILE_MESSAGE / width;
    colors
        .chunks(rows_per_message * width)
        .enumerate()
        .map(|(index, chunk)| Message::Set64 {
            rect: TileRect {
                tile_index: 0,
                length: 1,
                x: 0,
                y: u8::try_from(index * rows_per_message).unwrap_or(u8::MAX),
                width: width as u8,
            },
            duration,
            colors: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::from_secs(u64::MAX)), u32::MAX);
    }

    #[test]
    fn test_set64_rows() {
        let frame = vec![Hsbk::BLACK; 64];
        let messages = set64_rows(&frame, 8, 100);
        assert_eq!(messages.len(), 1);

        // a 16x8 grid needs two messages of four rows
        let frame = vec![Hsbk::BLACK; 128];
        let messages = set64_rows(&frame, 16, 0);
        assert_eq!(messages.len(), 2);
        match &messages[1] {
            Message::Set64 { rect, colors, .. } => {
                assert_eq!((rect.y, rect.width), (4, 16));
                assert_eq!(colors.len(), 64);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
