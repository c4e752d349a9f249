// src/link/radio.rs
// Radio transport: outer frame dispatcher, liveness, half-duplex tx slot.
use super::Link;
use crate::clock::SharedClock;
use crate::config::{Datarate, RadioConfig};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};
use link_protocol::{Frame, FrameType, P2PPacket, Packet};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

pub const TX_SLOT_DEPTH: usize = 1;
pub const DELIVERY_QUEUE_DEPTH: usize = 5;
pub const ACTIVITY_TIMEOUT_MS: u64 = 1000;
pub const SEND_TIMEOUT: Duration = Duration::from_millis(100);

const NEVER: u64 = u64::MAX;
const DELIVERY_RETRY: Duration = Duration::from_millis(100);

/// Byte-level boundary to the radio chip.
#[cfg_attr(test, mockall::automock)]
pub trait Syslink: Send + Sync {
    fn send_frame(&self, frame: &Frame) -> bool;
}

pub type P2PCallback = Box<dyn Fn(&P2PPacket) + Send + Sync>;

pub struct RadioLink {
    syslink: Arc<dyn Syslink>,
    clock: SharedClock,
    tx_slot: (Sender<Frame>, Receiver<Frame>),
    delivery: (Sender<Packet>, Receiver<Packet>),
    last_packet_ms: AtomicU64,
    rssi: AtomicU8,
    enabled: AtomicBool,
    p2p_callback: RwLock<Option<P2PCallback>>,
}

impl RadioLink {
    pub fn new(syslink: Arc<dyn Syslink>, clock: SharedClock) -> Self {
        Self {
            syslink,
            clock,
            tx_slot: bounded(TX_SLOT_DEPTH),
            delivery: bounded(DELIVERY_QUEUE_DEPTH),
            last_packet_ms: AtomicU64::new(NEVER),
            rssi: AtomicU8::new(0),
            enabled: AtomicBool::new(false),
            p2p_callback: RwLock::new(None),
        }
    }

    /// Entry point for every frame the physical layer decodes.
    pub fn dispatch(&self, frame: Frame) {
        match frame.frame_type {
            FrameType::RadioRaw => {
                self.mark_alive();
                if let Some(packet) = self.unwrap_packet(&frame) {
                    if self.enabled.load(Ordering::Acquire) {
                        self.deliver(packet);
                    }
                }
                // Half duplex: the radio can only answer right after it heard something.
                if let Ok(pending) = self.tx_slot.1.try_recv() {
                    if !self.syslink.send_frame(&pending) {
                        debug!(event = "radio_tx_failed", "physical layer rejected pending frame");
                    }
                }
            }
            FrameType::RadioRawBroadcast => {
                self.mark_alive();
                let Some(packet) = self.unwrap_packet(&frame) else { return };
                if self.enabled.load(Ordering::Acquire) {
                    let _ = self.delivery.0.try_send(packet);
                }
            }
            FrameType::RadioRssi => {
                if let Some(&sample) = frame.data.first() {
                    self.rssi.store(sample, Ordering::Relaxed);
                }
            }
            FrameType::RadioP2PBroadcast => match P2PPacket::from_frame(&frame) {
                Ok(p2p) => {
                    if let Some(cb) = self.p2p_callback.read().as_ref() {
                        cb(&p2p);
                    }
                }
                Err(e) => warn!(?e, "malformed p2p frame"),
            },
            other => trace!(frame_type = ?other, len = frame.len(), "ignored radio frame"),
        }
    }

    fn mark_alive(&self) {
        self.last_packet_ms.store(self.clock.now_ms(), Ordering::Release);
    }

    fn unwrap_packet(&self, frame: &Frame) -> Option<Packet> {
        match frame.packet() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(?e, "dropping malformed radio packet");
                None
            }
        }
    }

    // Backpressure onto the radio while the router is behind. Gives up only
    // once the link is disabled.
    fn deliver(&self, mut packet: Packet) {
        loop {
            match self.delivery.0.send_timeout(packet, DELIVERY_RETRY) {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(p)) => {
                    if !self.enabled.load(Ordering::Acquire) {
                        return;
                    }
                    packet = p;
                }
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }

    pub fn rssi(&self) -> u8 {
        self.rssi.load(Ordering::Relaxed)
    }

    pub fn register_p2p_callback<F>(&self, cb: F)
    where
        F: Fn(&P2PPacket) + Send + Sync + 'static,
    {
        *self.p2p_callback.write() = Some(Box::new(cb));
    }

    /// Best effort, straight to the physical layer.
    pub fn send_p2p_broadcast(&self, p2p: &P2PPacket) {
        let _ = self.syslink.send_frame(&p2p.to_frame());
    }

    pub fn set_channel(&self, channel: u8) -> bool {
        self.syslink.send_frame(&Frame::radio_channel(channel))
    }

    pub fn set_datarate(&self, datarate: Datarate) -> bool {
        self.syslink.send_frame(&Frame::radio_datarate(datarate as u8))
    }

    pub fn set_address(&self, address: u64) -> bool {
        self.syslink.send_frame(&Frame::radio_address(address))
    }

    pub fn set_power_dbm(&self, power_dbm: i8) -> bool {
        self.syslink.send_frame(&Frame::radio_power(power_dbm))
    }

    /// Push the boot radio settings to the chip.
    pub fn configure(&self, cfg: &RadioConfig) -> bool {
        let ok = self.set_channel(cfg.channel)
            & self.set_datarate(cfg.datarate)
            & self.set_address(cfg.address)
            & self.set_power_dbm(cfg.power_dbm);
        if ok {
            info!(channel = cfg.channel, datarate = ?cfg.datarate, address = cfg.address, power_dbm = cfg.power_dbm, "radio configured");
        } else {
            warn!(?cfg, "radio configuration partially rejected");
        }
        ok
    }
}

impl Link for RadioLink {
    fn set_enable(&self, enable: bool) {
        self.enabled.store(enable, Ordering::Release);
    }

    fn send(&self, packet: &Packet) -> bool {
        self.tx_slot.0.send_timeout(Frame::raw(packet), SEND_TIMEOUT).is_ok()
    }

    fn receive(&self, timeout: Duration) -> Option<Packet> {
        self.delivery.1.recv_timeout(timeout).ok()
    }

    fn is_connected(&self) -> bool {
        let last = self.last_packet_ms.load(Ordering::Acquire);
        last != NEVER && self.clock.now_ms().saturating_sub(last) < ACTIVITY_TIMEOUT_MS
    }

    fn reset(&self) {
        while self.tx_slot.1.try_recv().is_ok() {}
    }
}
