use super::Link;
use link_protocol::Packet;
use std::time::Duration;

const IDLE: Duration = Duration::from_millis(10);

/// Installed whenever no real transport is. Never connected, never sends.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLink;

impl Link for NoOpLink {
    fn set_enable(&self, _enable: bool) {}

    fn send(&self, _packet: &Packet) -> bool {
        false
    }

    fn receive(&self, timeout: Duration) -> Option<Packet> {
        std::thread::sleep(timeout.min(IDLE));
        None
    }

    fn is_connected(&self) -> bool {
        false
    }
}
