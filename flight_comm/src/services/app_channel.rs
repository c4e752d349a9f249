// services/app_channel.rs
// Free-form application data over platform port channel 2.
use crate::errors::CommError;
use crate::router::Router;
use crossbeam_channel::{Receiver, Sender, bounded};
use link_protocol::{MAX_DATA_SIZE, Packet, Port};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

pub const APP_CHANNEL: u8 = 2;
pub const APP_CHANNEL_RX_DEPTH: usize = 10;
pub const APP_CHANNEL_MTU: usize = MAX_DATA_SIZE;

pub struct AppChannel {
    router: Arc<Router>,
    rx: (Sender<Packet>, Receiver<Packet>),
    overflow: AtomicBool,
    send_lock: Mutex<()>,
}

impl AppChannel {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            rx: bounded(APP_CHANNEL_RX_DEPTH),
            overflow: AtomicBool::new(false),
            send_lock: Mutex::new(()),
        }
    }

    /// Fed by the platform service; never blocks.
    pub fn incoming(&self, packet: Packet) {
        if self.rx.0.try_send(packet).is_err() {
            self.overflow.store(true, Ordering::Release);
            debug!(event = "app_channel_overflow", len = packet.len());
        }
    }

    /// Read and clear.
    pub fn has_overflow_occurred(&self) -> bool {
        self.overflow.swap(false, Ordering::AcqRel)
    }

    /// Copies up to `buf.len()` bytes of the next packet; 0 on timeout.
    /// `None` waits forever.
    pub fn receive_data_packet(&self, buf: &mut [u8], timeout: Option<Duration>) -> usize {
        let packet = match timeout {
            Some(t) => self.rx.1.recv_timeout(t).ok(),
            None => self.rx.1.recv().ok(),
        };
        match packet {
            Some(p) => {
                let n = buf.len().min(p.len());
                buf[..n].copy_from_slice(&p.payload()[..n]);
                n
            }
            None => 0,
        }
    }

    pub fn send_data_packet(&self, data: &[u8]) -> Result<(), CommError> {
        let _g = self.send_lock.lock();
        self.router.send(Self::wrap(data))
    }

    pub fn send_data_packet_blocking(&self, data: &[u8]) {
        let _g = self.send_lock.lock();
        self.router.send_blocking(Self::wrap(data));
    }

    // Oversized data is truncated to the MTU.
    fn wrap(data: &[u8]) -> Packet {
        let n = data.len().min(APP_CHANNEL_MTU);
        let mut p = Packet::empty(Port::PLATFORM, APP_CHANNEL);
        for &b in &data[..n] {
            let _ = p.push(b);
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn channel() -> (AppChannel, Arc<Router>) {
        let router = Arc::new(Router::new(ManualClock::new(0)));
        (AppChannel::new(router.clone()), router)
    }

    #[test]
    fn overflow_flag_is_read_and_clear() {
        let (app, _) = channel();
        for i in 0..APP_CHANNEL_RX_DEPTH as u8 {
            app.incoming(Packet::new(Port::PLATFORM, APP_CHANNEL, &[i]).unwrap());
        }
        assert!(!app.has_overflow_occurred());
        app.incoming(Packet::new(Port::PLATFORM, APP_CHANNEL, &[99]).unwrap());
        assert!(app.has_overflow_occurred());
        assert!(!app.has_overflow_occurred());

        let mut buf = [0u8; 4];
        assert_eq!(app.receive_data_packet(&mut buf, Some(Duration::ZERO)), 1);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn receive_copies_at_most_buffer_len() {
        let (app, _) = channel();
        app.incoming(Packet::new(Port::PLATFORM, APP_CHANNEL, b"abcdef").unwrap());
        let mut buf = [0u8; 3];
        assert_eq!(app.receive_data_packet(&mut buf, None), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(app.receive_data_packet(&mut buf, Some(Duration::from_millis(5))), 0);
    }

    #[test]
    fn send_truncates_to_mtu() {
        let (app, router) = channel();
        app.send_data_packet(&[7u8; 40]).unwrap();
        let p = router.next_outbound().unwrap();
        assert_eq!((p.port(), p.channel()), (Port::PLATFORM, APP_CHANNEL));
        assert_eq!(p.payload(), &[7u8; APP_CHANNEL_MTU]);

        app.send_data_packet_blocking(b"hi");
        assert_eq!(router.next_outbound().unwrap().payload(), b"hi");
    }
}
