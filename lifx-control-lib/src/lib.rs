//! # LIFX Control Library
//!
//! `lifx-control-lib` is a Rust library for controlling LIFX smart bulbs over
//! the LAN protocol. It speaks the binary UDP protocol directly: no cloud
//! account or bridge is needed.
//!
//! ## Features
//!
//! - Packet codec for the 36-byte header and the common light, multizone and
//!   matrix payloads
//! - Subnet discovery with a shared device registry and label/serial/IP lookup
//! - Power, color, label, infrared and per-pixel commands
//! - An effects engine for bulb side waveforms, host streamed animations and
//!   firmware tile effects
//!
//! ## Example
//!
//! Discover bulbs and turn the one labelled "Desk" red:
//!
//! ```no_run
//! use lifx_control_lib::{Hsbk, LifxClient, LifxConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LifxClient::new(LifxConfig::default()).await?;
//!     for device in client.discover_configured().await? {
//!         println!("Found device: {}", device);
//!     }
//!
//!     let desk = client.resolve_one("Desk")?;
//!     client.set_color(&desk, Hsbk::from_name("red")?, None).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Disclaimer
//!
//! This project is not affiliated with, authorized by, endorsed by, or in any way officially connected
//! with LIFX or its affiliates.
//!
//! ## License
//!
//! This project is dual-licensed under the MIT License and the Apache License, Version 2.0.
//! You may choose to use either license, depending on your project needs.

// The `client` module is the high level entry point. `LifxClient` owns the UDP
// socket, the device registry and the effects engine.
//
// Example usage:
//
// ```
// let client = LifxClient::new(LifxConfig::default()).await?;
// let devices = client.discover_configured().await?;
// client.set_power(&devices[0], true, None).await?;
// ```
pub mod client;

// The `color` module holds the HSBK color type, conversions from RGB, hex and
// named colors, and the `ColorSpec` parser used by the command line.
//
// Example usage:
//
// ```
// use lifx_control_lib::color::ColorSpec;
//
// let spec: ColorSpec = "hsb(120, 100, 50)".parse().unwrap();
// let color = spec.to_hsbk().unwrap();
// ```
pub mod color;

pub mod config;

// The `device` module describes bulbs: serial numbers, the product table with
// capabilities, and the registry discovery fills in.
pub mod device;

// The `effects` module runs lighting effects. Waveform effects are a single
// packet; software effects stream frames from a tokio task per device.
//
// Example usage:
//
// ```
// use lifx_control_lib::effects::{EffectKind, EffectParams};
//
// let kind: EffectKind = "rainbow".parse().unwrap();
// let handle = client.run_effect(&device, kind, EffectParams::default()).await?;
// ```
pub mod effects;

pub mod error;

// The `net` module provides the shared UDP transport with reply routing by
// source id, and subnet discovery.
pub mod net;

// The `protocol` module is the wire format: header, packet and every message
// payload the library understands.
pub mod protocol;

pub use client::{DeviceInfo, LifxClient};
pub use color::{ColorSpec, Hsbk};
pub use config::LifxConfig;
pub use device::{DeviceRegistry, LifxDevice, Product, Serial};
pub use effects::{EffectKind, EffectParams, SessionHandle};
pub use error::{CodecError, LifxError, Result};
