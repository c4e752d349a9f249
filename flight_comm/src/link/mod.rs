// src/link/mod.rs
// One transport active at a time behind a uniform interface.
pub mod noop;
pub mod radio;
pub mod usb;

use link_protocol::Packet;
use std::sync::Arc;
use std::time::Duration;

pub use noop::NoOpLink;
pub use radio::{RadioLink, Syslink};
pub use usb::{UsbDevice, UsbLink};

pub trait Link: Send + Sync {
    /// Disabled links deliver nothing inbound.
    fn set_enable(&self, enable: bool);

    /// Hand one packet to the transport. `false` means try again later.
    fn send(&self, packet: &Packet) -> bool;

    /// Wait up to `timeout` for an inbound packet.
    fn receive(&self, timeout: Duration) -> Option<Packet>;

    fn is_connected(&self) -> bool;

    fn reset(&self) {}
}

/// The closed set of transports the router can drive.
#[derive(Clone)]
pub enum ActiveLink {
    NoOp(NoOpLink),
    Radio(Arc<RadioLink>),
    Usb(Arc<UsbLink>),
}

impl ActiveLink {
    pub fn name(&self) -> &'static str {
        match self {
            ActiveLink::NoOp(_) => "noop",
            ActiveLink::Radio(_) => "radio",
            ActiveLink::Usb(_) => "usb",
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, ActiveLink::NoOp(_))
    }
}

impl Default for ActiveLink {
    fn default() -> Self {
        ActiveLink::NoOp(NoOpLink)
    }
}

impl std::fmt::Debug for ActiveLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ActiveLink").field(&self.name()).finish()
    }
}

impl Link for ActiveLink {
    fn set_enable(&self, enable: bool) {
        match self {
            ActiveLink::NoOp(l) => l.set_enable(enable),
            ActiveLink::Radio(l) => l.set_enable(enable),
            ActiveLink::Usb(l) => l.set_enable(enable),
        }
    }

    fn send(&self, packet: &Packet) -> bool {
        match self {
            ActiveLink::NoOp(l) => l.send(packet),
            ActiveLink::Radio(l) => l.send(packet),
            ActiveLink::Usb(l) => l.send(packet),
        }
    }

    fn receive(&self, timeout: Duration) -> Option<Packet> {
        match self {
            ActiveLink::NoOp(l) => l.receive(timeout),
            ActiveLink::Radio(l) => l.receive(timeout),
            ActiveLink::Usb(l) => l.receive(timeout),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            ActiveLink::NoOp(l) => l.is_connected(),
            ActiveLink::Radio(l) => l.is_connected(),
            ActiveLink::Usb(l) => l.is_connected(),
        }
    }

    fn reset(&self) {
        match self {
            ActiveLink::NoOp(l) => l.reset(),
            ActiveLink::Radio(l) => l.reset(),
            ActiveLink::Usb(l) => l.reset(),
        }
    }
}
