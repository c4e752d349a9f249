// src/router/mod.rs
// 16-port packet router: per-port inbound queues, one outbound queue, tx/rx pumps.
pub mod queue_monitor;
pub mod stats;

use crate::clock::SharedClock;
use crate::errors::CommError;
use crate::link::{ActiveLink, Link};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};
use link_protocol::{PORT_COUNT, Packet, Port};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

pub use queue_monitor::{QueueId, QueueMonitor, QueueStats};
pub use stats::{LinkRates, RateCounter, STATS_INTERVAL_MS};

pub const PORT_QUEUE_DEPTH: usize = 16;
pub const TX_QUEUE_DEPTH: usize = 120;

const NOOP_IDLE: Duration = Duration::from_millis(10);
const LINK_WAIT: Duration = Duration::from_millis(100);
const SEND_RETRY: Duration = Duration::from_millis(10);

/// What the receive pump does when a port queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Discard the incoming packet and count it.
    #[default]
    DropNewest,
    /// Block the pump until the consumer makes room. Every other port waits
    /// behind a stalled consumer, so reserve this for dedicated consumers.
    NeverDrop,
}

pub type PacketCallback = Arc<dyn Fn(&Packet) + Send + Sync>;

struct PortQueue {
    tx: Sender<Packet>,
    rx: Receiver<Packet>,
    policy: DeliveryPolicy,
    monitor_id: QueueId,
}

pub struct Router {
    ports: [OnceLock<PortQueue>; PORT_COUNT],
    callbacks: [RwLock<Option<PacketCallback>>; PORT_COUNT],
    outbound: (Sender<Packet>, Receiver<Packet>),
    outbound_id: QueueId,
    link: RwLock<ActiveLink>,
    stats: Mutex<RateCounter>,
    monitor: QueueMonitor,
    running: AtomicBool,
    clock: SharedClock,
}

impl Router {
    /// Starts with the no-op link installed and no port queues.
    pub fn new(clock: SharedClock) -> Self {
        let monitor = QueueMonitor::new();
        let outbound_id = monitor.register("tx");
        Self {
            ports: std::array::from_fn(|_| OnceLock::new()),
            callbacks: std::array::from_fn(|_| RwLock::new(None)),
            outbound: bounded(TX_QUEUE_DEPTH),
            outbound_id,
            link: RwLock::new(ActiveLink::default()),
            stats: Mutex::new(RateCounter::new(clock.now_ms())),
            monitor,
            running: AtomicBool::new(false),
            clock,
        }
    }

    // ===== Ports =====

    pub fn init_port_queue(&self, port: Port) {
        self.init_port_queue_with_policy(port, DeliveryPolicy::default());
    }

    /// Idempotent: a second call keeps the first queue and policy.
    pub fn init_port_queue_with_policy(&self, port: Port, policy: DeliveryPolicy) {
        self.ports[port.index()].get_or_init(|| {
            let (tx, rx) = bounded(PORT_QUEUE_DEPTH);
            let monitor_id = self.monitor.register(format!("port.{}", port.name()));
            debug!(%port, ?policy, "port queue created");
            PortQueue { tx, rx, policy, monitor_id }
        });
    }

    pub fn register_callback<F>(&self, port: Port, cb: F)
    where
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        *self.callbacks[port.index()].write() = Some(Arc::new(cb));
    }

    fn queue(&self, port: Port) -> &PortQueue {
        match self.ports[port.index()].get() {
            Some(q) => q,
            None => panic!("receive on {port} before init_port_queue"),
        }
    }

    pub fn receive(&self, port: Port) -> Option<Packet> {
        self.queue(port).rx.try_recv().ok()
    }

    pub fn receive_blocking(&self, port: Port) -> Packet {
        let q = self.queue(port);
        loop {
            // The router owns the sender, so the channel never disconnects.
            if let Ok(p) = q.rx.recv() {
                return p;
            }
        }
    }

    pub fn receive_with_timeout(&self, port: Port, timeout: Duration) -> Option<Packet> {
        self.queue(port).rx.recv_timeout(timeout).ok()
    }

    // ===== Outbound =====

    pub fn send(&self, packet: Packet) -> Result<(), CommError> {
        match self.outbound.0.try_send(packet) {
            Ok(()) => {
                self.monitor.record_send(self.outbound_id, self.outbound.0.len());
                Ok(())
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.monitor.record_full(self.outbound_id);
                Err(CommError::QueueFull)
            }
        }
    }

    /// Waits for room as long as the pumps run. Once the router is stopped
    /// and the queue is still full, the packet is dropped.
    pub fn send_blocking(&self, mut packet: Packet) {
        if self.outbound.0.is_full() {
            self.monitor.record_full(self.outbound_id);
        }
        loop {
            match self.outbound.0.send_timeout(packet, LINK_WAIT) {
                Ok(()) => {
                    self.monitor.record_send(self.outbound_id, self.outbound.0.len());
                    return;
                }
                Err(SendTimeoutError::Timeout(p)) => {
                    if !self.is_running() {
                        debug!(port = %p.port(), "router stopped, outbound packet dropped");
                        return;
                    }
                    packet = p;
                }
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }

    pub fn free_outbound_slots(&self) -> usize {
        TX_QUEUE_DEPTH.saturating_sub(self.outbound.0.len())
    }

    #[cfg(test)]
    pub(crate) fn next_outbound(&self) -> Option<Packet> {
        self.outbound.1.try_recv().ok()
    }

    // ===== Link =====

    /// Disable the old link, install and enable the new one.
    pub fn set_link(&self, new_link: ActiveLink) {
        let mut g = self.link.write();
        g.set_enable(false);
        let old = std::mem::replace(&mut *g, new_link);
        g.set_enable(true);
        info!(event = "link_switched", from = old.name(), to = g.name());
    }

    pub fn active_link(&self) -> ActiveLink {
        self.link.read().clone()
    }

    /// Purge everything waiting to go out and reset the active link.
    pub fn reset(&self) {
        let mut purged = 0usize;
        while self.outbound.1.try_recv().is_ok() {
            purged += 1;
        }
        self.link.read().reset();
        info!(event = "router_reset", purged = purged);
    }

    pub fn is_connected(&self) -> bool {
        self.link.read().is_connected()
    }

    // ===== Diagnostics =====

    pub fn rates(&self) -> LinkRates {
        self.stats.lock().rates()
    }

    pub fn queue_monitor(&self) -> &QueueMonitor {
        &self.monitor
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // ===== Pumps =====

    pub fn start(self: &Arc<Self>) -> Result<RouterTasks, CommError> {
        self.running.store(true, Ordering::Release);
        let mut tasks = RouterTasks {
            router: self.clone(),
            handles: Vec::with_capacity(2),
        };

        let r = self.clone();
        tasks
            .handles
            .push(thread::Builder::new().name("comm-tx".into()).spawn(move || r.tx_loop())?);
        let r = self.clone();
        tasks
            .handles
            .push(thread::Builder::new().name("comm-rx".into()).spawn(move || r.rx_loop())?);

        info!(event = "router_started", link = self.link.read().name());
        Ok(tasks)
    }

    fn tx_loop(&self) {
        while self.is_running() {
            if self.link.read().is_noop() {
                thread::sleep(NOOP_IDLE);
                continue;
            }
            let Ok(packet) = self.outbound.1.recv_timeout(LINK_WAIT) else {
                continue;
            };
            // Re-read the link every attempt so a swap lets the packet through.
            loop {
                if self.link.read().send(&packet) {
                    self.stats.lock().record_tx(self.clock.now_ms());
                    break;
                }
                if !self.is_running() {
                    debug!(port = %packet.port(), "tx pump stopping with packet in hand");
                    return;
                }
                thread::sleep(SEND_RETRY);
            }
        }
    }

    fn rx_loop(&self) {
        while self.is_running() {
            let received = self.link.read().receive(LINK_WAIT);
            match received {
                Some(packet) => {
                    self.route(&packet);
                    self.stats.lock().record_rx(self.clock.now_ms());
                }
                None => self.stats.lock().update(self.clock.now_ms()),
            }
        }
    }

    fn route(&self, packet: &Packet) {
        let port = packet.port();
        if let Some(q) = self.ports[port.index()].get() {
            match q.policy {
                DeliveryPolicy::NeverDrop => self.deliver_blocking(q, *packet),
                DeliveryPolicy::DropNewest => match q.tx.try_send(*packet) {
                    Ok(()) => self.monitor.record_send(q.monitor_id, q.tx.len()),
                    Err(_) => {
                        self.monitor.record_full(q.monitor_id);
                        debug!(event = "port_drop", %port, "port queue full, packet dropped");
                    }
                },
            }
        }

        let cb = self.callbacks[port.index()].read().clone();
        if let Some(cb) = cb {
            cb(packet);
        }
    }

    fn deliver_blocking(&self, q: &PortQueue, mut packet: Packet) {
        let mut stalled = false;
        loop {
            match q.tx.send_timeout(packet, LINK_WAIT) {
                Ok(()) => {
                    self.monitor.record_send(q.monitor_id, q.tx.len());
                    return;
                }
                Err(SendTimeoutError::Timeout(p)) => {
                    if !stalled {
                        stalled = true;
                        self.monitor.record_full(q.monitor_id);
                        warn!(event = "port_stalled", port = %p.port(), "consumer not draining, rx pump blocked");
                    }
                    if !self.is_running() {
                        return;
                    }
                    packet = p;
                }
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }
}

/// Handles of the running pumps. Dropping signals them to stop.
pub struct RouterTasks {
    router: Arc<Router>,
    handles: Vec<JoinHandle<()>>,
}

impl RouterTasks {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.router.running.store(false, Ordering::Release);
        for h in self.handles.drain(..) {
            if h.join().is_err() {
                warn!("router pump panicked");
            }
        }
    }
}

impl Drop for RouterTasks {
    fn drop(&mut self) {
        self.shutdown();
    }
}
