// Platform port: version queries and the app channel.
use super::{AppChannel, ServiceHandle, spawn_port_worker};
use crate::errors::CommError;
use crate::router::Router;
use link_protocol::{MAX_DATA_SIZE, PROTOCOL_VERSION, Packet, Port};
use std::sync::Arc;
use tracing::{debug, warn};

pub const PLATFORM_COMMAND_CHANNEL: u8 = 0;
pub const VERSION_CHANNEL: u8 = 1;

pub const VERSION_GET_PROTOCOL: u8 = 0;
pub const VERSION_GET_FIRMWARE: u8 = 1;

pub struct PlatformService {
    app: Arc<AppChannel>,
    firmware_version: String,
}

impl PlatformService {
    pub fn new(app: Arc<AppChannel>, firmware_version: impl Into<String>) -> Self {
        Self {
            app,
            firmware_version: firmware_version.into(),
        }
    }

    pub fn handle(&self, router: &Router, packet: Packet) {
        match packet.channel() {
            VERSION_CHANNEL => self.answer_version(router, packet),
            super::app_channel::APP_CHANNEL => self.app.incoming(packet),
            ch => debug!(channel = ch, "unhandled platform request"),
        }
    }

    fn answer_version(&self, router: &Router, request: Packet) {
        let Some(&what) = request.payload().first() else { return };
        let mut reply = Packet::empty(Port::PLATFORM, VERSION_CHANNEL);
        let _ = reply.push(what);
        match what {
            VERSION_GET_PROTOCOL => {
                let _ = reply.push(PROTOCOL_VERSION);
            }
            VERSION_GET_FIRMWARE => {
                for &b in self.firmware_version.as_bytes().iter().take(MAX_DATA_SIZE - 1) {
                    let _ = reply.push(b);
                }
            }
            other => {
                debug!(command = other, "unknown version command");
                return;
            }
        }
        if router.send(reply).is_err() {
            warn!(event = "version_reply_dropped", "outbound queue full");
        }
    }

    pub fn spawn(self, router: Arc<Router>) -> Result<ServiceHandle, CommError> {
        spawn_port_worker("platform", router, Port::PLATFORM, move |r, p| self.handle(r, p))
    }
}
