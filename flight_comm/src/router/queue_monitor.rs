// router/queue_monitor.rs
// Per-queue counters: sends, peak depth, rejected inserts.
use parking_lot::Mutex;
use tracing::{info, warn};

pub const REPORT_INTERVAL_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub name: String,
    pub send_count: u64,
    pub max_waiting: usize,
    pub full_count: u64,
}

impl QueueStats {
    fn new(name: String) -> Self {
        Self { name, send_count: 0, max_waiting: 0, full_count: 0 }
    }

    fn clear(&mut self) {
        self.send_count = 0;
        self.max_waiting = 0;
        self.full_count = 0;
    }
}

#[derive(Debug, Default)]
pub struct QueueMonitor {
    queues: Mutex<Vec<QueueStats>>,
}

impl QueueMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>) -> QueueId {
        let mut g = self.queues.lock();
        g.push(QueueStats::new(name.into()));
        QueueId(g.len() - 1)
    }

    /// `waiting` is the queue depth right after the insert.
    pub fn record_send(&self, id: QueueId, waiting: usize) {
        if let Some(q) = self.queues.lock().get_mut(id.0) {
            q.send_count += 1;
            q.max_waiting = q.max_waiting.max(waiting);
        }
    }

    pub fn record_full(&self, id: QueueId) {
        if let Some(q) = self.queues.lock().get_mut(id.0) {
            q.full_count += 1;
        }
    }

    pub fn snapshot(&self) -> Vec<QueueStats> {
        self.queues.lock().clone()
    }

    /// Log every queue that rejected an insert since the last report, then
    /// start a new window. Returns the overflowed queues.
    pub fn report(&self) -> Vec<QueueStats> {
        let mut g = self.queues.lock();
        let overflowed: Vec<QueueStats> = g.iter().filter(|q| q.full_count > 0).cloned().collect();
        for q in &overflowed {
            warn!(
                event = "queue_overflow",
                queue = %q.name,
                full = q.full_count,
                sent = q.send_count,
                max_waiting = q.max_waiting
            );
        }
        if overflowed.is_empty() {
            info!(queues = g.len(), "queue monitor: no overflows");
        }
        g.iter_mut().for_each(QueueStats::clear);
        overflowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_peak_and_overflow() {
        let m = QueueMonitor::new();
        let a = m.register("a");
        let b = m.register("b");
        m.record_send(a, 1);
        m.record_send(a, 3);
        m.record_send(a, 2);
        m.record_full(a);
        m.record_send(b, 1);

        let snap = m.snapshot();
        assert_eq!(snap[0], QueueStats { name: "a".into(), send_count: 3, max_waiting: 3, full_count: 1 });
        assert_eq!(snap[1].full_count, 0);
    }

    #[test]
    fn report_lists_overflowed_queues_and_resets() {
        let m = QueueMonitor::new();
        m.register("a");
        let b = m.register("b");
        m.record_send(b, 4);
        m.record_full(b);
        m.record_full(b);

        let report = m.report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].name, "b");
        assert_eq!(report[0].full_count, 2);

        assert!(m.report().is_empty());
        assert!(m.snapshot().iter().all(|q| q.send_count == 0 && q.max_waiting == 0));
    }
}
