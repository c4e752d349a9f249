// Link throughput, recomputed once per window. Diagnostic only.

pub const STATS_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkRates {
    /// Packets per second.
    pub rx_rate: u32,
    pub tx_rate: u32,
}

#[derive(Debug)]
pub struct RateCounter {
    rx_count: u32,
    tx_count: u32,
    window_start_ms: u64,
    rates: LinkRates,
}

impl RateCounter {
    pub fn new(now_ms: u64) -> Self {
        Self {
            rx_count: 0,
            tx_count: 0,
            window_start_ms: now_ms,
            rates: LinkRates::default(),
        }
    }

    pub fn record_rx(&mut self, now_ms: u64) {
        self.rx_count += 1;
        self.update(now_ms);
    }

    pub fn record_tx(&mut self, now_ms: u64) {
        self.tx_count += 1;
        self.update(now_ms);
    }

    /// Close the window once it is at least `STATS_INTERVAL_MS` long.
    pub fn update(&mut self, now_ms: u64) {
        let elapsed = now_ms.saturating_sub(self.window_start_ms);
        if elapsed < STATS_INTERVAL_MS {
            return;
        }
        self.rates = LinkRates {
            rx_rate: (1000 * self.rx_count as u64 / elapsed) as u32,
            tx_rate: (1000 * self.tx_count as u64 / elapsed) as u32,
        };
        self.rx_count = 0;
        self.tx_count = 0;
        self.window_start_ms = now_ms;
    }

    pub fn rates(&self) -> LinkRates {
        self.rates
    }
}
