//! # Handset Link Engine
//!
//! Talks CRSF to an EdgeTX/OpenTX handset over a serial line that may be a
//! single half-duplex wire. The engine is polled from one context
//! ([`CrsfHandset::handle_input`]) while the RF scheduler works through a
//! cloneable [`HandsetHandle`] from another.
//!
//! ```text
//! port ─▶ AssemblyBuffer ─▶ process_packet ─▶ ChannelData / HandsetEvents
//!                                  │
//!                                  ▼
//!   HandsetHandle ─▶ OutputFifo ─▶ OutputScheduler ─▶ port
//!        │
//!        └─▶ MixerSync (notify_transmitted)
//! ```

pub mod assembler;
pub mod autobaud;
pub mod channels;
pub mod duplex;
pub mod events;
pub mod fifo;
pub mod mixer_sync;
pub mod scheduler;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::crsf::decoder::{decode_extended_address, decode_header, unpack_channels};
use crate::crsf::encoder::{encode_device_info_frame, encode_extended_frame, version_str_to_u32};
use crate::crsf::protocol::*;
use crate::error::{FrameError, Result};
use crate::serial::HandsetPort;

use assembler::{Assembled, AssemblyBuffer};
use autobaud::{Autobaud, NoPulseMeter, PulseMeter};
use channels::ChannelData;
use duplex::{DuplexController, FixedLine, LinePins};
use events::{HandsetEvents, NoEvents};
use fifo::OutputFifo;
use mixer_sync::{MixerSync, MAX_PACKET_INTERVAL_US};
use scheduler::{OutputScheduler, WindowBudget};

/// RC packet interval until the RF side sets one (50Hz)
pub const DEFAULT_PACKET_INTERVAL_US: u32 = 20_000;

/// Watchdog period
pub const UART_WDT_INTERVAL_MS: u64 = 1_000;

/// RC data older than this is not sent over the air
pub const RC_DATA_STALE_US: u64 = 1_000_000;

/// Engine settings, normally built from [`Config`](crate::config::Config)
#[derive(Debug, Clone)]
pub struct HandsetSettings {
    /// Initial line speed
    pub baud_rate: u32,
    /// TX and RX share one wire
    pub half_duplex: bool,
    /// Initial polarity guess
    pub inverted: bool,
    /// Measure the line rate on recovery instead of re-applying `baud_rate`
    pub autobaud: bool,
    pub packet_interval_us: u32,
    pub channel_count: usize,
    pub device_name: String,
    pub firmware_version: String,
    pub watchdog_interval_ms: u64,
    /// Dispatch bind commands to [`HandsetEvents::on_bind_command`]
    pub bind_command_enabled: bool,
}

impl Default for HandsetSettings {
    fn default() -> Self {
        Self {
            baud_rate: 5_250_000,
            half_duplex: false,
            inverted: false,
            autobaud: true,
            packet_interval_us: DEFAULT_PACKET_INTERVAL_US,
            channel_count: CRSF_NUM_CHANNELS,
            device_name: "CRSF Handset".to_string(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
            watchdog_interval_ms: UART_WDT_INTERVAL_MS,
            bind_command_enabled: false,
        }
    }
}

/// State shared with the RF scheduler context
struct Shared {
    clock: Arc<dyn Clock>,
    fifo: OutputFifo,
    sync: Mutex<MixerSync>,
    channels: ChannelData,
    connected: AtomicBool,
    data_last_recv_us: AtomicU64,
    rc_data_last_recv_us: AtomicU64,
}

impl Shared {
    fn sync(&self) -> MutexGuard<'_, MixerSync> {
        self.sync.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// Handle given to the RF scheduler
///
/// Cheap to clone. Every method is safe to call while the engine is being
/// polled from another thread.
#[derive(Clone)]
pub struct HandsetHandle {
    shared: Arc<Shared>,
}

impl HandsetHandle {
    /// An RF packet just went out; refines the mixer sync offset
    pub fn notify_transmitted(&self) {
        // Read the receive time before the clock so the delta never goes negative
        let last = self.shared.data_last_recv_us.load(Ordering::Acquire);
        let now = self.shared.clock.micros();
        self.shared.sync().on_transmit(now.saturating_sub(last));
    }

    /// When the last RC channels frame arrived, 0 if never
    pub fn rc_data_last_recv_us(&self) -> u64 {
        self.shared.rc_data_last_recv_us.load(Ordering::Acquire)
    }

    /// RC data has arrived before but not within the last second
    pub fn rc_data_is_stale(&self, now_us: u64) -> bool {
        let last = self.rc_data_last_recv_us();
        last != 0 && now_us.saturating_sub(last) > RC_DATA_STALE_US
    }

    /// Queue a complete frame for the handset
    ///
    /// Only while connected. The address byte is rewritten to the radio
    /// transmitter; oversized frames and frames that do not fit in the queue
    /// are dropped.
    pub fn send_telemetry(&self, frame: &[u8]) {
        if !self.shared.is_connected() {
            return;
        }
        let Some(&size_field) = frame.get(CRSF_TELEMETRY_LENGTH_INDEX) else {
            return;
        };
        let size = size_field as usize + CRSF_FRAME_NOT_COUNTED_BYTES;
        if size > CRSF_MAX_PACKET_LEN || size > frame.len() {
            debug!("dropping telemetry frame of {} bytes", size);
            return;
        }

        let mut out = [0u8; CRSF_MAX_PACKET_LEN];
        out[..size].copy_from_slice(&frame[..size]);
        out[0] = CRSF_ADDRESS_RADIO_TRANSMITTER;
        if let Err(e) = self.shared.fifo.push_frame(&out[..size]) {
            debug!("telemetry dropped: {}", e);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Latest channel values
    pub fn channels(&self) -> Vec<u16> {
        self.shared.channels.snapshot()
    }

    pub fn channel(&self, index: usize) -> Option<u16> {
        self.shared.channels.get(index)
    }

    /// Current time on the engine's clock
    pub fn now_us(&self) -> u64 {
        self.shared.clock.micros()
    }

    /// Bytes waiting in the output queue
    pub fn queued_bytes(&self) -> usize {
        self.shared.fifo.len()
    }
}

/// Point-in-time view of the link for logging
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkSnapshot {
    pub connected: bool,
    pub baud: u32,
    pub inverted: bool,
    pub half_duplex: bool,
    pub packet_interval_us: u32,
    /// Valid frames in the last watchdog period
    pub good_frames: u32,
    /// Corrupt frames in the last watchdog period
    pub bad_frames: u32,
    pub model_id: u8,
    pub sync_offset_100ns: i32,
    pub channels: Vec<u16>,
}

/// CRSF handset protocol engine
pub struct CrsfHandset<P, L = FixedLine, M = NoPulseMeter> {
    port: P,
    duplex: DuplexController<L>,
    autobaud: Autobaud<M>,
    events: Box<dyn HandsetEvents>,
    shared: Arc<Shared>,
    assembler: AssemblyBuffer,
    scheduler: OutputScheduler,
    device_info: DeviceInfo,
    half_duplex: bool,
    bind_command_enabled: bool,
    baud: u32,
    packet_interval_us: u32,
    watchdog_interval_ms: u64,
    watchdog_last_checked_ms: u64,
    good_frames: u32,
    bad_frames: u32,
    last_good_frames: u32,
    last_bad_frames: u32,
    model_id: u8,
}

impl<P, L, M> CrsfHandset<P, L, M>
where
    P: HandsetPort,
    L: LinePins,
    M: PulseMeter,
{
    pub fn new(port: P, pins: L, meter: M, settings: &HandsetSettings, clock: Arc<dyn Clock>) -> Self {
        let packet_interval_us = settings.packet_interval_us.clamp(1, MAX_PACKET_INTERVAL_US);
        let shared = Arc::new(Shared {
            clock,
            fifo: OutputFifo::default(),
            sync: Mutex::new(MixerSync::new(packet_interval_us)),
            channels: ChannelData::new(settings.channel_count),
            connected: AtomicBool::new(false),
            data_last_recv_us: AtomicU64::new(0),
            rc_data_last_recv_us: AtomicU64::new(0),
        });

        Self {
            port,
            duplex: DuplexController::new(pins),
            autobaud: Autobaud::new(meter, settings.baud_rate, settings.inverted, settings.autobaud),
            events: Box::new(NoEvents),
            shared,
            assembler: AssemblyBuffer::new(),
            scheduler: OutputScheduler::new(settings.half_duplex),
            device_info: DeviceInfo::new(&settings.device_name, version_str_to_u32(&settings.firmware_version)),
            half_duplex: settings.half_duplex,
            bind_command_enabled: settings.bind_command_enabled,
            baud: settings.baud_rate,
            packet_interval_us,
            watchdog_interval_ms: settings.watchdog_interval_ms,
            watchdog_last_checked_ms: 0,
            good_frames: 0,
            bad_frames: 0,
            last_good_frames: 0,
            last_bad_frames: 0,
            model_id: 0,
        }
    }

    /// Install the binding/model-selection callbacks
    pub fn with_events(mut self, events: impl HandsetEvents + 'static) -> Self {
        self.events = Box::new(events);
        self
    }

    pub fn handle(&self) -> HandsetHandle {
        HandsetHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Configure the line and start listening
    ///
    /// The first watchdog check happens one interval from now.
    pub fn begin(&mut self) -> Result<()> {
        self.watchdog_last_checked_ms = self.shared.clock.millis();
        self.adjust_max_packet_size();
        self.port.set_baud_rate(self.baud)?;
        if self.half_duplex {
            self.duplex.set_receive_mode(self.autobaud.inverted());
        }
        self.port.discard_input()?;

        info!(
            "Handset link started at {} baud ({}, {})",
            self.baud,
            if self.half_duplex { "half-duplex" } else { "full-duplex" },
            if self.autobaud.inverted() { "inverted" } else { "normal" },
        );
        Ok(())
    }

    /// Poll the line: watchdog, turnaround, then at most one frame
    pub fn handle_input(&mut self) {
        if self.watchdog() {
            return;
        }

        if self.scheduler.is_transmitting() {
            match self.port.is_tx_idle() {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    warn!("Failed to query transmitter state: {}", e);
                    return;
                }
            }
            self.scheduler.end_transmit();
            self.duplex.set_receive_mode(self.autobaud.inverted());
            self.discard_input();
        }

        if let Err(e) = self.assembler.fill_from(&mut self.port) {
            warn!("Failed to read from handset: {}", e);
            return;
        }

        match self.assembler.extract() {
            Assembled::Incomplete => {}
            Assembled::Rejected(err) => trace!("resync: {}", err),
            Assembled::Frame { len, check } => {
                match check {
                    Ok(()) => {
                        self.good_frames = self.good_frames.wrapping_add(1);
                        let mut frame = [0u8; CRSF_MAX_PACKET_LEN];
                        frame[..len].copy_from_slice(&self.assembler.as_slice()[..len]);
                        if self.process_packet(&frame[..len]) {
                            self.handle_output(len);
                        }
                    }
                    Err(err) => {
                        self.bad_frames = self.bad_frames.wrapping_add(1);
                        debug!("dropping frame: {}", err);
                    }
                }
                self.assembler.consume(len);
            }
        }
    }

    /// Dispatch one valid frame; returns `true` if it was meant for us
    ///
    /// Frames shorter than [`CRSF_MIN_PACKET_LEN`] are ignored.
    pub fn process_packet(&mut self, frame: &[u8]) -> bool {
        if frame.len() < CRSF_MIN_PACKET_LEN {
            return false;
        }
        let now = self.shared.clock.micros().max(1);
        self.shared.data_last_recv_us.store(now, Ordering::Release);

        if !self.shared.connected.swap(true, Ordering::AcqRel) {
            info!("Handset connected at {} baud", self.baud);
            self.events.on_connected();
        }

        let Some(header) = decode_header(frame) else {
            return false;
        };

        if header.frame_type == CRSF_FRAMETYPE_RC_CHANNELS_PACKED {
            self.shared.rc_data_last_recv_us.store(now, Ordering::Release);
            let payload = &frame[CRSF_HEADER_LEN..frame.len() - 1];
            let mut values = [0u16; CRSF_MAX_CHANNELS];
            let count = self.shared.channels.len();
            let unpacked = unpack_channels(payload, &mut values[..count]);
            self.shared.channels.store(&values[..unpacked]);
            self.events.on_rc_data();
            return true;
        }

        let Some(address) = Self::extended_address(header.frame_type, frame) else {
            return false;
        };

        let to_bus = matches!(
            address.dest,
            CRSF_ADDRESS_FLIGHT_CONTROLLER | CRSF_ADDRESS_BROADCAST | CRSF_ADDRESS_CRSF_RECEIVER
        );
        let to_us = matches!(address.dest, CRSF_ADDRESS_CRSF_TRANSMITTER | CRSF_ADDRESS_BROADCAST)
            && address.origin == CRSF_ADDRESS_RADIO_TRANSMITTER;

        if (to_bus || to_us) && header.frame_type == CRSF_FRAMETYPE_DEVICE_PING {
            self.queue_device_info();
        }
        if to_us && header.frame_type == CRSF_FRAMETYPE_COMMAND {
            self.process_command(&frame[CRSF_EXT_HEADER_LEN..frame.len() - 1]);
        }

        to_bus || to_us
    }

    fn extended_address(frame_type: u8, frame: &[u8]) -> Option<ExtendedAddress> {
        if is_extended_type(frame_type) && frame.len() > CRSF_EXT_HEADER_LEN {
            decode_extended_address(frame)
        } else {
            None
        }
    }

    fn process_command(&mut self, payload: &[u8]) {
        match payload {
            [CRSF_COMMAND_SUBCMD_RX, CRSF_COMMAND_MODEL_SELECT_ID, model_id, ..] => {
                self.model_id = *model_id;
                info!("Handset selected model {}", model_id);
                self.events.on_model_selected(*model_id);
            }
            [CRSF_COMMAND_SUBCMD_RX, CRSF_COMMAND_SUBCMD_RX_BIND, ..] => {
                if self.bind_command_enabled {
                    info!("Bind command received");
                    self.events.on_bind_command();
                } else {
                    debug!("ignoring bind command");
                }
            }
            _ => {}
        }
    }

    fn queue_device_info(&self) {
        let frame = encode_device_info_frame(&self.device_info);
        match self.shared.fifo.push_frame(&frame) {
            Ok(()) => debug!("answering device ping as '{}'", self.device_info.name),
            Err(e) => debug!("device info dropped: {}", e),
        }
    }

    fn queue_sync_frame(&self) {
        let now_ms = self.shared.clock.millis();
        let payload = self.shared.sync().take_sync_payload(now_ms, self.shared.is_connected());
        if let Some(payload) = payload {
            let frame = encode_extended_frame(
                CRSF_FRAMETYPE_HANDSET,
                CRSF_ADDRESS_RADIO_TRANSMITTER,
                CRSF_ADDRESS_CRSF_TRANSMITTER,
                &payload,
            );
            if let Err(e) = self.shared.fifo.push_frame(&frame) {
                debug!("mixer sync dropped: {}", e);
            }
        }
    }

    /// Use the gap after a handset frame of `received_bytes` to send output
    pub fn handle_output(&mut self, received_bytes: usize) {
        if !self.shared.is_connected() {
            self.shared.fifo.flush();
            return;
        }

        if self.scheduler.is_idle() && self.shared.fifo.is_empty() {
            self.queue_sync_frame();
        }

        let inverted = self.autobaud.inverted();
        self.scheduler.service(
            received_bytes,
            &self.shared.fifo,
            &mut self.port,
            &mut self.duplex,
            inverted,
        );
    }

    /// Periodic link health check; returns `true` if the line was reset
    pub fn watchdog(&mut self) -> bool {
        let now = self.shared.clock.millis();
        if now.saturating_sub(self.watchdog_last_checked_ms) <= self.watchdog_interval_ms {
            return false;
        }

        let connected = self.shared.is_connected();
        let triggered = self.bad_frames >= self.good_frames || !connected;
        if triggered {
            if connected {
                self.shared.connected.store(false, Ordering::Release);
                warn!(
                    good = self.good_frames,
                    bad = self.bad_frames,
                    "{}",
                    FrameError::LinkLost
                );
                self.events.on_disconnected();
            }

            let baud = self.autobaud.next_baud();
            if baud != 0 {
                self.reconfigure(baud);
            }
        }

        self.watchdog_last_checked_ms = now;
        if triggered {
            // Cycle faster while searching
            self.watchdog_last_checked_ms = now.saturating_sub(3 * (self.watchdog_interval_ms / 4));
        }

        self.last_good_frames = self.good_frames;
        self.last_bad_frames = self.bad_frames;
        self.good_frames = 0;
        self.bad_frames = 0;
        triggered
    }

    fn reconfigure(&mut self, baud: u32) {
        self.baud = baud;
        self.adjust_max_packet_size();

        self.shared.fifo.flush();
        self.scheduler.reset();
        self.scheduler.end_transmit();
        if let Err(e) = self.port.flush() {
            warn!("Failed to drain transmitter: {}", e);
        }
        if let Err(e) = self.port.set_baud_rate(baud) {
            warn!("Failed to set baud rate {}: {}", baud, e);
        }
        if self.half_duplex {
            self.duplex.set_receive_mode(self.autobaud.inverted());
        }
        self.assembler.clear();
        self.discard_input();

        debug!(baud, inverted = self.autobaud.inverted(), "line reconfigured");
    }

    fn discard_input(&mut self) {
        if let Err(e) = self.port.discard_input() {
            warn!("Failed to discard handset input: {}", e);
        }
    }

    fn adjust_max_packet_size(&mut self) {
        let budget = WindowBudget::compute(self.baud, self.packet_interval_us);
        trace!(?budget, "window budget");
        self.scheduler.set_budget(budget);
    }

    /// Change the RC packet interval, restarting mixer sync
    ///
    /// Values outside `1..=MAX_PACKET_INTERVAL_US` are clamped.
    pub fn set_packet_interval_us(&mut self, packet_interval_us: u32) {
        self.packet_interval_us = packet_interval_us.clamp(1, MAX_PACKET_INTERVAL_US);
        self.shared.sync().set_packet_interval_us(self.packet_interval_us);
        self.adjust_max_packet_size();
        debug!("packet interval set to {}us", self.packet_interval_us);
    }

    pub fn packet_interval_us(&self) -> u32 {
        self.packet_interval_us
    }

    /// Fastest RC interval the current line can keep up with
    pub fn min_packet_interval_us(&self) -> u32 {
        match (self.half_duplex, self.baud) {
            (true, 115_200) => 5_000,
            (false, 115_200) => 4_000,
            (_, 400_000) => 2_000,
            _ => 1,
        }
    }

    /// Current line speed
    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// Current polarity
    pub fn inverted(&self) -> bool {
        self.autobaud.inverted()
    }

    pub fn is_half_duplex(&self) -> bool {
        self.half_duplex
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Last model index selected by the handset
    pub fn model_id(&self) -> u8 {
        self.model_id
    }

    /// Good and bad frames since the last watchdog check
    pub fn frame_counts(&self) -> (u32, u32) {
        (self.good_frames, self.bad_frames)
    }

    /// Queue a frame for the handset; see [`HandsetHandle::send_telemetry`]
    pub fn send_telemetry(&self, frame: &[u8]) {
        self.handle().send_telemetry(frame);
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            connected: self.is_connected(),
            baud: self.baud,
            inverted: self.autobaud.inverted(),
            half_duplex: self.half_duplex,
            packet_interval_us: self.packet_interval_us,
            good_frames: self.last_good_frames,
            bad_frames: self.last_bad_frames,
            model_id: self.model_id,
            sync_offset_100ns: self.shared.sync().offset_100ns(),
            channels: self.shared.channels.snapshot(),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}
