//! A loopback bulb that answers the queries the library sends.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::color::Hsbk;
use crate::device::Serial;
use crate::protocol::{
    Collection, DeviceChain, ExtendedColorZones, HostFirmware, LightState, Message,
    MultiZoneEffect, Packet, RuntimeInfo, Service, StateMultiZone, Version, WifiInfo,
    EXTENDED_ZONES_PER_MESSAGE,
};

struct BulbState {
    label: String,
    power: u16,
    color: Hsbk,
    infrared: u16,
    product: u32,
    zones: Vec<Hsbk>,
    multizone_effect: MultiZoneEffect,
    chain: Option<DeviceChain>,
    service_ports: VecDeque<u16>,
    received: Vec<Packet>,
}

pub(crate) struct FakeBulb {
    pub addr: SocketAddr,
    pub serial: Serial,
    state: Arc<Mutex<BulbState>>,
    task: JoinHandle<()>,
}

impl Drop for FakeBulb {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl FakeBulb {
    pub async fn spawn(serial: Serial, product: u32, label: &str) -> FakeBulb {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let state = Arc::new(Mutex::new(BulbState {
            label: label.to_string(),
            power: 65535,
            color: Hsbk::new(21845, 65535, 32768, 3500),
            infrared: 0,
            product,
            zones: Vec::new(),
            multizone_effect: MultiZoneEffect {
                instance_id: 0,
                effect_type: 0,
                speed: 0,
                duration: 0,
            },
            chain: None,
            service_ports: VecDeque::from(vec![addr.port()]),
            received: Vec::new(),
        }));
        let task = tokio::spawn(serve(socket, serial, state.clone()));
        FakeBulb {
            addr,
            serial,
            state,
            task,
        }
    }

    /// Ports to advertise in successive StateService replies. The last one
    /// repeats.
    pub fn advertise_ports(&self, ports: &[u16]) {
        self.state.lock().unwrap().service_ports = ports.iter().copied().collect();
    }

    /// Answers zone queries with these colors.
    pub fn set_zones(&self, zones: Vec<Hsbk>) {
        self.state.lock().unwrap().zones = zones;
    }

    pub fn set_multizone_effect(&self, effect: MultiZoneEffect) {
        self.state.lock().unwrap().multizone_effect = effect;
    }

    /// Answers GetDeviceChain; without a chain the query goes unanswered.
    pub fn set_chain(&self, chain: DeviceChain) {
        self.state.lock().unwrap().chain = Some(chain);
    }

    pub fn received(&self) -> Vec<Packet> {
        self.state.lock().unwrap().received.clone()
    }

    pub fn count_received(&self, pred: impl Fn(&Message) -> bool) -> usize {
        self.received().iter().filter(|p| pred(&p.message)).count()
    }

    pub fn color(&self) -> Hsbk {
        self.state.lock().unwrap().color
    }

    pub fn power(&self) -> u16 {
        self.state.lock().unwrap().power
    }

    pub fn label(&self) -> String {
        self.state.lock().unwrap().label.clone()
    }
}

async fn serve(socket: UdpSocket, serial: Serial, state: Arc<Mutex<BulbState>>) {
    let mut buffer = [0u8; 2048];
    loop {
        let Ok((len, from)) = socket.recv_from(&mut buffer).await else {
            continue;
        };
        let Ok(request) = Packet::decode(&buffer[..len]) else {
            continue;
        };
        let replies = respond(&request, &state);
        for message in replies {
            let reply = Packet::new(request.header.source, Some(serial), message)
                .with_sequence(request.header.sequence);
            let _ = socket.send_to(&reply.encode().unwrap(), from).await;
        }
    }
}

fn respond(request: &Packet, state: &Mutex<BulbState>) -> Vec<Message> {
    let mut state = state.lock().unwrap();
    state.received.push(request.clone());
    let mut replies = Vec::new();
    if request.header.ack_required {
        replies.push(Message::Acknowledgement);
    }
    let light_state = |state: &BulbState| {
        Message::LightState(LightState {
            color: state.color,
            power: state.power,
            label: state.label.clone(),
        })
    };
    match &request.message {
        Message::GetService => {
            let port = if state.service_ports.len() > 1 {
                state.service_ports.pop_front().unwrap_or_default()
            } else {
                state.service_ports.front().copied().unwrap_or_default()
            };
            replies.push(Message::StateService(Service {
                service: 1,
                port: port as u32,
            }));
        }
        Message::GetColor => replies.push(light_state(&state)),
        Message::GetVersion => replies.push(Message::StateVersion(Version {
            vendor: 1,
            product: state.product,
            version: 0,
        })),
        Message::GetLabel => replies.push(Message::StateLabel {
            label: state.label.clone(),
        }),
        Message::SetLabel { label } => state.label = label.clone(),
        Message::GetPower => replies.push(Message::StatePower { level: state.power }),
        Message::SetPower { level } | Message::SetLightPower { level, .. } => state.power = *level,
        Message::SetColor { color, .. } => state.color = *color,
        Message::SetInfrared { brightness } => state.infrared = *brightness,
        Message::GetInfrared => replies.push(Message::StateInfrared {
            brightness: state.infrared,
        }),
        Message::GetHostFirmware => replies.push(Message::StateHostFirmware(HostFirmware {
            build: 1_700_000_000_000_000_000,
            version_minor: 70,
            version_major: 3,
        })),
        Message::GetWifiInfo => replies.push(Message::StateWifiInfo(WifiInfo {
            signal: 1e-5,
            tx: 0,
            rx: 0,
        })),
        Message::GetInfo => replies.push(Message::StateInfo(RuntimeInfo {
            time: 0,
            uptime: 90_000_000_000,
            downtime: 0,
        })),
        Message::GetLocation => replies.push(Message::StateLocation(Collection {
            id: [1; 16],
            label: "Home".into(),
            updated_at: 0,
        })),
        Message::GetGroup => replies.push(Message::StateGroup(Collection {
            id: [2; 16],
            label: "Living Room".into(),
            updated_at: 0,
        })),
        Message::GetColorZones { .. } => {
            let count = state.zones.len() as u8;
            for (chunk, colors) in state.zones.chunks(8).enumerate() {
                replies.push(Message::StateMultiZone(StateMultiZone {
                    count,
                    index: (chunk * 8) as u8,
                    colors: colors.to_vec(),
                }));
            }
        }
        Message::GetExtendedColorZones => {
            let count = state.zones.len() as u16;
            for (chunk, colors) in state.zones.chunks(EXTENDED_ZONES_PER_MESSAGE).enumerate() {
                replies.push(Message::StateExtendedColorZones(ExtendedColorZones {
                    count,
                    index: (chunk * EXTENDED_ZONES_PER_MESSAGE) as u16,
                    colors: colors.to_vec(),
                }));
            }
        }
        Message::GetMultiZoneEffect => {
            replies.push(Message::StateMultiZoneEffect(state.multizone_effect))
        }
        Message::GetDeviceChain => {
            if let Some(chain) = &state.chain {
                replies.push(Message::StateDeviceChain(chain.clone()));
            }
        }
        _ => {}
    }
    replies
}
