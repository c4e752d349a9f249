// Link test service: echo, source, sink.
use super::{ServiceHandle, spawn_port_worker};
use crate::config::CoreConfig;
use crate::errors::CommError;
use crate::router::Router;
use link_protocol::{MAX_DATA_SIZE, Packet, Port};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

pub const ECHO_CHANNEL: u8 = 0;
pub const SOURCE_CHANNEL: u8 = 1;
pub const SINK_CHANNEL: u8 = 2;

#[derive(Debug, Clone)]
pub struct LinkService {
    echo_delay: Duration,
    identity: [u8; MAX_DATA_SIZE],
}

impl LinkService {
    pub fn new(cfg: &CoreConfig) -> Self {
        let mut identity = [0u8; MAX_DATA_SIZE];
        let name = cfg.firmware_name.as_bytes();
        let n = name.len().min(MAX_DATA_SIZE);
        identity[..n].copy_from_slice(&name[..n]);
        Self {
            echo_delay: Duration::from_millis(cfg.echo_delay_ms),
            identity,
        }
    }

    pub fn handle(&self, router: &Router, packet: Packet) {
        match packet.channel() {
            ECHO_CHANNEL => {
                if !self.echo_delay.is_zero() {
                    std::thread::sleep(self.echo_delay);
                }
                router.send_blocking(packet);
            }
            SOURCE_CHANNEL => {
                let mut reply = packet;
                if reply.resize(MAX_DATA_SIZE).is_ok() {
                    reply.payload_mut().copy_from_slice(&self.identity);
                    router.send_blocking(reply);
                }
            }
            SINK_CHANNEL => trace!(len = packet.len(), "sink"),
            _ => {}
        }
    }

    pub fn spawn(self, router: Arc<Router>) -> Result<ServiceHandle, CommError> {
        spawn_port_worker("link-service", router, Port::LINK_SERVICE, move |r, p| self.handle(r, p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn service(delay_ms: u64) -> (LinkService, Router) {
        let cfg = CoreConfig {
            firmware_name: "Test Vehicle".into(),
            echo_delay_ms: delay_ms,
            ..CoreConfig::default()
        };
        (LinkService::new(&cfg), Router::new(ManualClock::new(0)))
    }

    #[test]
    fn echo_returns_packet_unchanged() {
        let (svc, router) = service(0);
        let p = Packet::new(Port::LINK_SERVICE, ECHO_CHANNEL, b"ping").unwrap();
        svc.handle(&router, p);
        assert_eq!(router.next_outbound(), Some(p));
        assert_eq!(router.next_outbound(), None);
    }

    #[test]
    fn echo_waits_configured_delay() {
        let (svc, router) = service(30);
        let start = std::time::Instant::now();
        svc.handle(&router, Packet::new(Port::LINK_SERVICE, ECHO_CHANNEL, &[]).unwrap());
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(router.next_outbound().is_some());
    }

    #[test]
    fn source_replies_with_padded_identity() {
        let (svc, router) = service(0);
        svc.handle(&router, Packet::new(Port::LINK_SERVICE, SOURCE_CHANNEL, &[1, 2]).unwrap());
        let reply = router.next_outbound().unwrap();
        assert_eq!(reply.port(), Port::LINK_SERVICE);
        assert_eq!(reply.channel(), SOURCE_CHANNEL);
        assert_eq!(reply.len(), MAX_DATA_SIZE);
        assert_eq!(&reply.payload()[..12], b"Test Vehicle");
        assert!(reply.payload()[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn sink_swallows_everything() {
        let (svc, router) = service(0);
        svc.handle(&router, Packet::new(Port::LINK_SERVICE, SINK_CHANNEL, b"data").unwrap());
        svc.handle(&router, Packet::new(Port::LINK_SERVICE, 3, b"data").unwrap());
        assert_eq!(router.next_outbound(), None);
    }
}
