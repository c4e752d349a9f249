// src/services/mod.rs
// Onboard port consumers: link service, console, platform + app channel.
pub mod app_channel;
pub mod console;
pub mod link_service;
pub mod platform;

use crate::errors::CommError;
use crate::router::Router;
use link_protocol::{Packet, Port};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

pub use app_channel::AppChannel;
pub use console::Console;
pub use link_service::LinkService;
pub use platform::PlatformService;

/// Longest a service waits on its port before rechecking the router.
const POLL: Duration = Duration::from_millis(100);

pub struct ServiceHandle {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl ServiceHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) {
        if self.handle.join().is_err() {
            warn!(service = self.name, "service thread panicked");
        }
    }
}

/// Own `port`'s queue on a dedicated thread until the router stops.
pub(crate) fn spawn_port_worker<F>(
    name: &'static str,
    router: Arc<Router>,
    port: Port,
    mut handler: F,
) -> Result<ServiceHandle, CommError>
where
    F: FnMut(&Router, Packet) + Send + 'static,
{
    router.init_port_queue(port);
    let handle = thread::Builder::new().name(name.into()).spawn(move || {
        info!(service = name, %port, "service started");
        while router.is_running() {
            if let Some(p) = router.receive_with_timeout(port, POLL) {
                handler(&router, p);
            }
        }
        debug!(service = name, "service stopped");
    })?;
    Ok(ServiceHandle { name, handle })
}
