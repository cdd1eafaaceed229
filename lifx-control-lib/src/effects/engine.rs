use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use uuid::Uuid;

use crate::color::Hsbk;
use crate::device::{LifxDevice, Serial};
use crate::effects::{Canvas, Effect, EffectFamily, EffectKind, EffectParams, Frame};
use crate::error::{LifxError, Result};
use crate::net::PacketSink;
use crate::protocol::{
    duration_ms, set64_rows, Message, Packet, TileEffect, TileEffectType, Waveform, WaveformKind,
};

/// Sessions give up after this many failed sends in a row.
const MAX_SEND_FAILURES: u32 = 3;
/// How long `stop` waits for a session to send its final packets.
const STOP_GRACE: Duration = Duration::from_secs(1);
const STROBE_MAX_PERIOD: Duration = Duration::from_millis(100);
/// Sent as the waveform cycle count when the effect should run until stopped.
const UNBOUNDED_CYCLES: f32 = 1_000_000.0;
const MORPH_HUES: [f64; 6] = [0.0, 60.0, 120.0, 180.0, 240.0, 300.0];

struct Session {
    id: Uuid,
    kind: EffectKind,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

type Sessions = Arc<Mutex<HashMap<Serial, Session>>>;

/// A started effect. Lets the caller wait for it to end on its own.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub serial: Serial,
    pub kind: EffectKind,
    done: watch::Receiver<bool>,
}

impl SessionHandle {
    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// Resolves once the session has sent its last packet, whether it ran
    /// out, failed or was stopped.
    pub async fn finished(&mut self) {
        loop {
            if *self.done.borrow() {
                return;
            }
            if self.done.changed().await.is_err() {
                return;
            }
        }
    }
}

enum Program {
    Waveform(Waveform),
    Software(Box<dyn Effect>),
    Firmware(TileEffect),
}

/// Sends packets for one device under the engine's source id.
struct Outlet<S> {
    sink: Arc<S>,
    source: u32,
    sequence: Arc<AtomicU8>,
    serial: Serial,
    addr: SocketAddr,
}

impl<S: PacketSink> Outlet<S> {
    fn send(&self, message: Message) -> Result<()> {
        let packet = Packet::new(self.source, Some(self.serial), message)
            .with_sequence(self.sequence.fetch_add(1, Ordering::Relaxed));
        self.sink.send_packet(&packet, self.addr)
    }

    fn send_frame(&self, frame: &Frame, canvas: Canvas) -> Result<()> {
        match frame {
            Frame::Color { color, fade } => self.send(Message::SetColor {
                color: *color,
                duration: duration_ms(*fade),
            }),
            Frame::Pixels { colors, fade } => {
                for message in set64_rows(colors, canvas.width, duration_ms(*fade)) {
                    self.send(message)?;
                }
                Ok(())
            }
        }
    }
}

/// Everything a session task owns.
struct Run<S> {
    id: Uuid,
    kind: EffectKind,
    params: EffectParams,
    canvas: Canvas,
    /// Device color when the session started.
    restore: Option<Hsbk>,
    duration: Option<Duration>,
    outlet: Outlet<S>,
    sessions: Sessions,
    stop_rx: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
}

/// A session that has not been spawned yet.
struct Pending<S> {
    run: Run<S>,
    program: Program,
    stop_tx: watch::Sender<bool>,
}

/// Runs effects on devices, at most one per device.
///
/// Every session is a tokio task that is told to stop through a `watch`
/// channel. `stop` waits for the task so the closing packets are on the wire
/// when it returns.
pub struct EffectEngine<S: PacketSink> {
    sink: Arc<S>,
    source: u32,
    sequence: Arc<AtomicU8>,
    sessions: Sessions,
}

impl<S: PacketSink> Clone for EffectEngine<S> {
    fn clone(&self) -> Self {
        EffectEngine {
            sink: self.sink.clone(),
            source: self.source,
            sequence: self.sequence.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

impl<S: PacketSink> EffectEngine<S> {
    pub fn new(sink: Arc<S>) -> Self {
        EffectEngine {
            sink,
            source: rand::thread_rng().gen_range(2..=u32::MAX),
            sequence: Arc::new(AtomicU8::new(0)),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Source id stamped on every effect packet.
    pub fn source(&self) -> u32 {
        self.source
    }

    pub fn list(&self, matrix_only: bool) -> Vec<EffectKind> {
        EffectKind::list(matrix_only)
    }

    pub fn is_running(&self, serial: &Serial) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(serial)
    }

    /// Devices with an active session and what they are running.
    pub fn running(&self) -> Vec<(Serial, EffectKind)> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(serial, session)| (*serial, session.kind))
            .collect()
    }

    /// Starts `kind` on `device`, stopping whatever ran there before.
    ///
    /// Matrix effects on a device without a pixel grid fail before anything
    /// is sent. The device's recorded color is used as the waveform base and
    /// as the color to restore afterwards.
    pub async fn start(
        &self,
        device: &LifxDevice,
        kind: EffectKind,
        params: EffectParams,
    ) -> Result<SessionHandle> {
        let matrix_size = device.matrix_size();
        if kind.is_matrix() && matrix_size.is_none() {
            return Err(LifxError::UnsupportedCapability {
                serial: device.serial,
                capability: "matrix effects",
            });
        }
        self.stop(&device.serial).await;

        let canvas = matrix_size
            .map(|(width, height)| Canvas::new(width, height))
            .unwrap_or(Canvas::SINGLE);
        let (program, duration) = match kind.family() {
            EffectFamily::Waveform => {
                let waveform = waveform_for(kind, &params, device.color);
                let duration = (params.cycles > 0.0).then(|| {
                    Duration::from_millis(waveform.period as u64).mul_f64(params.cycles as f64)
                });
                (Program::Waveform(waveform), duration)
            }
            EffectFamily::Firmware => (
                Program::Firmware(tile_effect_for(kind, &params)),
                params.total_duration(),
            ),
            EffectFamily::Software => {
                let effect = kind
                    .software_effect(rand::random())
                    .ok_or_else(|| LifxError::UnknownEffect(kind.to_string()))?;
                let duration = effect.duration(&params);
                (Program::Software(effect), duration)
            }
        };

        let id = Uuid::new_v4();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let run = Run {
            id,
            kind,
            params,
            canvas,
            restore: device.color,
            duration,
            outlet: Outlet {
                sink: self.sink.clone(),
                source: self.source,
                sequence: self.sequence.clone(),
                serial: device.serial,
                addr: device.addr,
            },
            sessions: self.sessions.clone(),
            stop_rx,
            done_tx,
        };

        info!("Starting {} on {}", kind, device);
        let mut pending = Pending {
            run,
            program,
            stop_tx,
        };
        // a concurrent start may claim the device while we wait on the old session
        while let Some(back) = self.install(pending) {
            pending = back;
            self.stop(&device.serial).await;
        }

        Ok(SessionHandle {
            id,
            serial: device.serial,
            kind,
            done: done_rx,
        })
    }

    /// Spawns the session if the device is free, otherwise hands it back.
    fn install(&self, pending: Pending<S>) -> Option<Pending<S>> {
        let serial = pending.run.outlet.serial;
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&serial) {
            return Some(pending);
        }
        let Pending {
            run,
            program,
            stop_tx,
        } = pending;
        let (id, kind) = (run.id, run.kind);
        let task = tokio::spawn(run_session(run, program));
        sessions.insert(
            serial,
            Session {
                id,
                kind,
                stop_tx,
                task,
            },
        );
        None
    }

    /// Stops the session on `serial` and waits (up to a second) for its final
    /// packets. Returns false, sending nothing, when no session is running.
    pub async fn stop(&self, serial: &Serial) -> bool {
        let session = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(serial);
        let Some(mut session) = session else {
            return false;
        };

        debug!("Stopping {} on {}", session.kind, serial);
        let _ = session.stop_tx.send(true);
        if timeout(STOP_GRACE, &mut session.task).await.is_err() {
            warn!("Effect {} on {} did not stop in time", session.kind, serial);
            session.task.abort();
        }
        true
    }

    pub async fn stop_all(&self) {
        let serials: Vec<Serial> = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        for serial in serials {
            self.stop(&serial).await;
        }
    }
}

fn waveform_for(kind: EffectKind, params: &EffectParams, current: Option<Hsbk>) -> Waveform {
    let base = current
        .unwrap_or_else(|| Hsbk::from_degrees(0.0, 0.0, params.brightness, params.kelvin));
    let (waveform, target) = match kind {
        EffectKind::Pulse | EffectKind::Strobe => (WaveformKind::Pulse, base.with_brightness(0.0)),
        EffectKind::Breathe => (WaveformKind::Sine, base.dimmed(0.2)),
        EffectKind::Saw => (WaveformKind::Saw, base.dimmed(0.2)),
        _ => (WaveformKind::Triangle, base.dimmed(0.2)),
    };
    let period = if kind == EffectKind::Strobe {
        params.period.min(STROBE_MAX_PERIOD)
    } else {
        params.period
    };
    Waveform {
        transient: params.transient,
        color: params.color.unwrap_or(target),
        period: duration_ms(period),
        cycles: if params.cycles > 0.0 {
            params.cycles
        } else {
            UNBOUNDED_CYCLES
        },
        skew_ratio: params.skew_ratio(),
        waveform,
    }
}

fn tile_effect_for(kind: EffectKind, params: &EffectParams) -> TileEffect {
    let mut effect = TileEffect::off(rand::thread_rng().gen_range(1..=u32::MAX));
    effect.speed = duration_ms(params.period);
    if kind == EffectKind::MatrixMorph {
        effect.effect_type = TileEffectType::Morph;
        effect.palette = MORPH_HUES
            .iter()
            .map(|&hue| Hsbk::from_degrees(hue, 1.0, params.brightness, params.kelvin))
            .collect();
    } else {
        effect.effect_type = TileEffectType::Sky;
    }
    effect
}

/// True when stopped, false when `deadline` passed first.
async fn wait_until(deadline: Option<Instant>, stop_rx: &mut watch::Receiver<bool>) -> bool {
    if *stop_rx.borrow() {
        return true;
    }
    match deadline {
        Some(deadline) => tokio::select! {
            _ = sleep_until(deadline) => false,
            _ = stop_rx.changed() => true,
        },
        None => {
            let _ = stop_rx.changed().await;
            true
        }
    }
}

async fn run_session<S: PacketSink>(mut run: Run<S>, program: Program) {
    let serial = run.outlet.serial;
    let started = Instant::now();
    let deadline = run.duration.map(|duration| started + duration);

    let stopped = match program {
        Program::Waveform(waveform) => {
            if let Err(e) = run.outlet.send(Message::SetWaveform(waveform)) {
                warn!("Could not start {} on {}: {}", run.kind, serial, e);
            }
            let stopped = wait_until(deadline, &mut run.stop_rx).await;
            // the bulb restores transient waveforms by itself
            if stopped && !run.params.transient {
                restore(&run);
            }
            stopped
        }
        Program::Firmware(effect) => {
            let instance_id = effect.instance_id;
            if let Err(e) = run.outlet.send(Message::SetTileEffect(effect)) {
                warn!("Could not start {} on {}: {}", run.kind, serial, e);
            }
            let stopped = wait_until(deadline, &mut run.stop_rx).await;
            if let Err(e) = run
                .outlet
                .send(Message::SetTileEffect(TileEffect::off(instance_id)))
            {
                warn!("Could not end {} on {}: {}", run.kind, serial, e);
            }
            if run.params.transient {
                restore(&run);
            }
            stopped
        }
        Program::Software(mut effect) => {
            let stopped = stream(&mut run, effect.as_mut(), started, deadline).await;
            if run.params.transient {
                restore(&run);
            }
            stopped
        }
    };

    debug!(
        "{} on {} {} after {:?}",
        run.kind,
        serial,
        if stopped { "stopped" } else { "finished" },
        started.elapsed()
    );
    {
        let mut sessions = run.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.get(&serial).is_some_and(|session| session.id == run.id) {
            sessions.remove(&serial);
        }
    }
    let _ = run.done_tx.send(true);
}

/// Renders and sends frames until the deadline, a stop, or too many failed
/// sends. Returns true when stopped.
async fn stream<S: PacketSink>(
    run: &mut Run<S>,
    effect: &mut dyn Effect,
    started: Instant,
    deadline: Option<Instant>,
) -> bool {
    let mut next = started;
    let mut failures = 0;
    loop {
        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            return false;
        }

        let frame = effect.render(now - started, &run.params, run.canvas);
        match run.outlet.send_frame(&frame, run.canvas) {
            Ok(()) => failures = 0,
            Err(e) => {
                failures += 1;
                if failures > MAX_SEND_FAILURES {
                    warn!(
                        "Giving up {} on {} after {} failed sends: {}",
                        run.kind, run.outlet.serial, failures, e
                    );
                    return false;
                }
                debug!("Frame for {} not sent: {}", run.outlet.serial, e);
            }
        }

        next = (next + effect.tick_interval(&run.params)).max(now);
        let wake = deadline.map_or(next, |deadline| next.min(deadline));
        if wait_until(Some(wake), &mut run.stop_rx).await {
            return true;
        }
    }
}

fn restore<S: PacketSink>(run: &Run<S>) {
    match run.restore {
        Some(color) => {
            if let Err(e) = run.outlet.send(Message::SetColor { color, duration: 0 }) {
                warn!("Could not restore {}: {}", run.outlet.serial, e);
            }
        }
        None => debug!("No recorded color to restore on {}", run.outlet.serial),
    }
}
