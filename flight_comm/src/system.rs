// src/system.rs
// Boot wiring: one context object owning the router, arbiter and services.
use crate::clock::SharedClock;
use crate::commander::{Commander, HighLevelPlanner, SetpointDecoder};
use crate::config::CoreConfig;
use crate::errors::CommError;
use crate::router::{Router, RouterTasks};
use crate::services::{AppChannel, Console, LinkService, PlatformService, ServiceHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

pub struct FlightCore {
    router: Arc<Router>,
    commander: Arc<Commander>,
    decoder: Arc<SetpointDecoder>,
    console: Arc<Console>,
    app_channel: Arc<AppChannel>,
    tasks: Mutex<Option<RouterTasks>>,
    services: Mutex<Vec<ServiceHandle>>,
}

impl FlightCore {
    /// Router pumps first, then the port consumers. The no-op link stays
    /// installed until the caller picks a transport.
    pub fn start(
        cfg: &CoreConfig,
        clock: SharedClock,
        planner: Arc<dyn HighLevelPlanner>,
    ) -> Result<Arc<Self>, CommError> {
        let router = Arc::new(Router::new(clock.clone()));
        let commander = Arc::new(Commander::new(planner, clock));
        let decoder = SetpointDecoder::new(commander.clone());
        decoder.attach(&router);

        let tasks = router.start()?;

        let app_channel = Arc::new(AppChannel::new(router.clone()));
        let console = Arc::new(Console::new(router.clone()));
        let services = vec![
            LinkService::new(cfg).spawn(router.clone())?,
            PlatformService::new(app_channel.clone(), cfg.firmware_version.clone())
                .spawn(router.clone())?,
        ];

        info!(
            event = "core_started",
            firmware = %cfg.firmware_name,
            version = %cfg.firmware_version,
            services = services.len()
        );
        Ok(Arc::new(Self {
            router,
            commander,
            decoder,
            console,
            app_channel,
            tasks: Mutex::new(Some(tasks)),
            services: Mutex::new(services),
        }))
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn commander(&self) -> &Arc<Commander> {
        &self.commander
    }

    pub fn decoder(&self) -> &Arc<SetpointDecoder> {
        &self.decoder
    }

    pub fn console(&self) -> &Arc<Console> {
        &self.console
    }

    pub fn app_channel(&self) -> &Arc<AppChannel> {
        &self.app_channel
    }

    /// True iff the pumps run and every service thread is alive.
    pub fn self_test(&self) -> bool {
        let services = self.services.lock();
        let dead: Vec<&str> = services.iter().filter(|s| s.is_finished()).map(|s| s.name()).collect();
        if !dead.is_empty() {
            warn!(?dead, "self test: services not running");
        }
        self.router.is_running() && !services.is_empty() && dead.is_empty()
    }

    pub fn shutdown(&self) {
        if let Some(tasks) = self.tasks.lock().take() {
            tasks.stop();
        }
        for s in self.services.lock().drain(..) {
            s.join();
        }
        self.console.flush();
        info!(event = "core_stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::commander::{NoPlanner, Priority};
    use crate::link::{ActiveLink, UsbDevice, UsbLink};
    use link_protocol::{Packet, Port};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Host {
        written: Mutex<Vec<Vec<u8>>>,
    }

    impl UsbDevice for Host {
        fn write_packet(&self, bytes: &[u8]) -> bool {
            self.written.lock().push(bytes.to_vec());
            true
        }

        fn is_attached(&self) -> bool {
            true
        }
    }

    /// Attached but never accepts a write, so the outbound queue only fills.
    struct StalledHost;

    impl UsbDevice for StalledHost {
        fn write_packet(&self, _bytes: &[u8]) -> bool {
            false
        }

        fn is_attached(&self) -> bool {
            true
        }
    }

    fn hover_setpoint() -> Packet {
        let mut hover = vec![5u8];
        for v in [0.0f32, 0.0, 0.0, 0.4] {
            hover.extend_from_slice(&v.to_le_bytes());
        }
        Packet::new(Port::SETPOINT_GENERIC, 0, &hover).unwrap()
    }

    fn wait_until(mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn self_test_tracks_lifecycle() {
        let core = FlightCore::start(&CoreConfig::default(), ManualClock::new(0), Arc::new(NoPlanner)).unwrap();
        assert!(core.self_test());
        core.shutdown();
        assert!(!core.self_test());
    }

    #[test]
    fn echo_and_setpoint_over_usb() {
        let core = FlightCore::start(&CoreConfig::default(), ManualClock::new(0), Arc::new(NoPlanner)).unwrap();
        let host = Arc::new(Host::default());
        let usb = Arc::new(UsbLink::new(host.clone()));
        core.router().set_link(ActiveLink::Usb(usb.clone()));

        usb.deliver(&[0xA0, b'p', b'i', b'n', b'g']).unwrap();
        assert!(wait_until(|| host.written.lock().iter().any(|w| w == &[0xA0, b'p', b'i', b'n', b'g'])));

        usb.deliver(&hover_setpoint().to_bytes()).unwrap();
        assert!(wait_until(|| core.commander().active_priority() == Priority::CRTP));

        core.shutdown();
    }

    #[test]
    fn setpoints_arrive_while_echo_port_floods() {
        let core = FlightCore::start(&CoreConfig::default(), ManualClock::new(0), Arc::new(NoPlanner)).unwrap();
        let usb = Arc::new(UsbLink::new(Arc::new(StalledHost)));
        core.router().set_link(ActiveLink::Usb(usb.clone()));

        let flood = {
            let usb = usb.clone();
            std::thread::spawn(move || {
                for i in 0..200u8 {
                    usb.deliver(&[0xA0, i]).unwrap();
                }
                usb.deliver(&hover_setpoint().to_bytes()).unwrap();
            })
        };

        assert!(wait_until(|| core.commander().active_priority() == Priority::CRTP));
        flood.join().unwrap();
        // more echoes than the outbound queue, the service and its port can hold
        let echo = core
            .router()
            .queue_monitor()
            .snapshot()
            .into_iter()
            .find(|q| q.name == "port.link_service")
            .unwrap();
        assert!(echo.full_count > 0);

        core.shutdown();
        assert!(!core.self_test());
    }
}
