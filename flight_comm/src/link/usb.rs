use super::Link;
use crate::errors::CommError;
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};
use link_protocol::Packet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const USB_RX_QUEUE_DEPTH: usize = 16;

const DELIVERY_RETRY: Duration = Duration::from_millis(100);

#[cfg_attr(test, mockall::automock)]
pub trait UsbDevice: Send + Sync {
    /// Write one `[header, payload...]` packet to the host.
    fn write_packet(&self, bytes: &[u8]) -> bool;
    fn is_attached(&self) -> bool;
}

pub struct UsbLink {
    device: Arc<dyn UsbDevice>,
    rx: (Sender<Packet>, Receiver<Packet>),
    enabled: AtomicBool,
}

impl UsbLink {
    pub fn new(device: Arc<dyn UsbDevice>) -> Self {
        Self {
            device,
            rx: bounded(USB_RX_QUEUE_DEPTH),
            enabled: AtomicBool::new(false),
        }
    }

    /// Called by the USB driver with one packet's bytes. Blocks while the
    /// queue is full; dropped while the link is disabled.
    pub fn deliver(&self, bytes: &[u8]) -> Result<(), CommError> {
        let mut packet = Packet::from_bytes(bytes)?;
        loop {
            if !self.enabled.load(Ordering::Acquire) {
                debug!(port = packet.port().raw(), "usb link disabled, dropping inbound packet");
                return Ok(());
            }
            match self.rx.0.send_timeout(packet, DELIVERY_RETRY) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(p)) => packet = p,
                Err(SendTimeoutError::Disconnected(_)) => return Ok(()),
            }
        }
    }
}

impl Link for UsbLink {
    fn set_enable(&self, enable: bool) {
        self.enabled.store(enable, Ordering::Release);
    }

    fn send(&self, packet: &Packet) -> bool {
        self.device.write_packet(&packet.to_bytes())
    }

    fn receive(&self, timeout: Duration) -> Option<Packet> {
        self.rx.1.recv_timeout(timeout).ok()
    }

    fn is_connected(&self) -> bool {
        self.enabled.load(Ordering::Acquire) && self.device.is_attached()
    }

    fn reset(&self) {
        while self.rx.1.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use link_protocol::{Port, ProtocolError};

    #[test]
    fn deliver_then_receive() {
        let mut dev = MockUsbDevice::new();
        dev.expect_is_attached().return_const(true);
        let link = UsbLink::new(Arc::new(dev));
        link.set_enable(true);
        assert!(link.is_connected());

        link.deliver(&[0x31, 7, 8]).unwrap();
        let p = link.receive(Duration::from_millis(1)).unwrap();
        assert_eq!(p.port(), Port::COMMANDER);
        assert_eq!(p.channel(), 1);
        assert_eq!(p.payload(), &[7, 8]);
    }

    #[test]
    fn disabled_link_drops_and_reports_disconnected() {
        let mut dev = MockUsbDevice::new();
        dev.expect_is_attached().return_const(true);
        let link = UsbLink::new(Arc::new(dev));
        link.deliver(&[0x00, 1]).unwrap();
        assert!(!link.is_connected());
        assert!(link.receive(Duration::from_millis(1)).is_none());
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        let link = UsbLink::new(Arc::new(MockUsbDevice::new()));
        link.set_enable(true);
        assert!(matches!(
            link.deliver(&[0u8; 32]),
            Err(CommError::Protocol(ProtocolError::PayloadTooLarge { .. }))
        ));
        assert!(link.deliver(&[]).is_err());
    }

    #[test]
    fn send_writes_header_and_payload() {
        let mut dev = MockUsbDevice::new();
        dev.expect_write_packet()
            .withf(|b| b == [0xF0, 0xFF])
            .times(1)
            .return_const(true);
        let link = UsbLink::new(Arc::new(dev));
        assert!(link.send(&Packet::new(Port::LINK, 0, &[0xFF]).unwrap()));
    }
}
