// src/commander/mod.rs
// Setpoint arbitration between control sources, with time-based failsafe.
pub mod decoder;
pub mod setpoint;

use crate::clock::SharedClock;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

pub use decoder::SetpointDecoder;
pub use setpoint::{Attitude, AxisMode, AxisModes, Priority, Setpoint, Vec3, VehicleState};

/// No update for this long: hold altitude and thrust, level out.
pub const STABILIZE_TIMEOUT_MS: u64 = 500;
/// No update for this long: cut power.
pub const SHUTDOWN_TIMEOUT_MS: u64 = 2000;

/// Derived from time since the last accepted setpoint; never stored as truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailsafeState {
    Active,
    Degrading,
    Shutdown,
}

impl FailsafeState {
    pub fn from_elapsed(elapsed_ms: u64) -> Self {
        if elapsed_ms >= SHUTDOWN_TIMEOUT_MS {
            FailsafeState::Shutdown
        } else if elapsed_ms >= STABILIZE_TIMEOUT_MS {
            FailsafeState::Degrading
        } else {
            FailsafeState::Active
        }
    }
}

/// The autonomous trajectory planner, as far as the arbiter needs it.
#[cfg_attr(test, mockall::automock)]
pub trait HighLevelPlanner: Send + Sync {
    /// A higher tier took over; stop producing setpoints.
    fn disable(&self);
    /// Continue from here when control is handed back.
    fn tell_state(&self, state: &VehicleState);
}

/// Used when no planner is wired in.
#[derive(Debug, Default)]
pub struct NoPlanner;

impl HighLevelPlanner for NoPlanner {
    fn disable(&self) {}
    fn tell_state(&self, _state: &VehicleState) {}
}

#[derive(Debug)]
struct Held {
    setpoint: Setpoint,
    priority: Priority,
    last_update_ms: u64,
    reported: FailsafeState,
}

pub struct Commander {
    held: Mutex<Held>,
    last_state: Mutex<VehicleState>,
    planner: Arc<dyn HighLevelPlanner>,
    clock: SharedClock,
}

impl Commander {
    pub fn new(planner: Arc<dyn HighLevelPlanner>, clock: SharedClock) -> Self {
        let now = clock.now_ms();
        Self {
            held: Mutex::new(Held {
                setpoint: Setpoint::null(),
                priority: Priority::DISABLE,
                last_update_ms: now,
                reported: FailsafeState::Active,
            }),
            last_state: Mutex::new(VehicleState::default()),
            planner,
            clock,
        }
    }

    /// Offer a setpoint. Accepted iff `priority` is at least the held one; the
    /// stored copy is stamped with the current time.
    pub fn set_setpoint(&self, setpoint: &Setpoint, priority: Priority) -> bool {
        let preempts_planner = {
            let mut g = self.held.lock();
            if priority < g.priority {
                return false;
            }
            let was = g.priority;
            let now = self.clock.now_ms();
            g.setpoint = Setpoint { timestamp_ms: now, ..*setpoint };
            g.priority = priority;
            g.last_update_ms = now;
            priority > Priority::HIGH_LEVEL && was <= Priority::HIGH_LEVEL
        };
        if preempts_planner {
            info!(event = "planner_preempted", priority = priority.level());
            self.planner.disable();
        }
        true
    }

    /// Hand control back: the planner resumes from the last known state and
    /// any source may claim again.
    pub fn relax_priority(&self) {
        let state = *self.last_state.lock();
        self.planner.tell_state(&state);
        self.held.lock().priority = Priority::LOWEST;
        info!(event = "priority_relaxed");
    }

    /// Called once per control tick by the stabilizer.
    pub fn get_setpoint(&self, state: &VehicleState) -> Setpoint {
        *self.last_state.lock() = *state;

        let mut g = self.held.lock();
        let elapsed = self.clock.now_ms().saturating_sub(g.last_update_ms);
        let failsafe = FailsafeState::from_elapsed(elapsed);
        let out = match failsafe {
            FailsafeState::Active => g.setpoint,
            FailsafeState::Degrading => {
                g.priority = Priority::DISABLE;
                g.setpoint.leveled()
            }
            FailsafeState::Shutdown => {
                g.priority = Priority::DISABLE;
                Setpoint::null()
            }
        };

        if failsafe != g.reported {
            match failsafe {
                FailsafeState::Active => info!(event = "failsafe", state = ?failsafe, "setpoints resumed"),
                FailsafeState::Degrading => warn!(event = "failsafe", state = ?failsafe, elapsed_ms = elapsed, "setpoint stale, leveling"),
                FailsafeState::Shutdown => warn!(event = "failsafe", state = ?failsafe, elapsed_ms = elapsed, "setpoint lost, cutting thrust"),
            }
            g.reported = failsafe;
        }
        out
    }

    pub fn active_priority(&self) -> Priority {
        self.held.lock().priority
    }

    pub fn inactivity_time(&self) -> u64 {
        self.clock.now_ms().saturating_sub(self.held.lock().last_update_ms)
    }

    pub fn failsafe_state(&self) -> FailsafeState {
        FailsafeState::from_elapsed(self.inactivity_time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    fn commander() -> (Commander, Arc<ManualClock>) {
        let clock = ManualClock::new(1_000);
        (Commander::new(Arc::new(NoPlanner), clock.clone()), clock)
    }

    fn thrust(t: f32) -> Setpoint {
        Setpoint {
            thrust: t,
            mode: AxisModes { z: AxisMode::Abs, roll: AxisMode::Abs, pitch: AxisMode::Abs, ..Default::default() },
            position: Vec3::new(0.0, 0.0, 1.0),
            ..Setpoint::null()
        }
    }

    #[test]
    fn boots_disabled_with_null_setpoint() {
        let (c, _) = commander();
        assert_eq!(c.active_priority(), Priority::DISABLE);
        assert!(c.get_setpoint(&VehicleState::default()).is_null());
        assert_eq!(c.failsafe_state(), FailsafeState::Active);
    }

    #[test]
    fn caller_timestamp_is_replaced() {
        let (c, clock) = commander();
        clock.advance(250);
        let sp = Setpoint { timestamp_ms: 7, ..thrust(1.0) };
        assert!(c.set_setpoint(&sp, Priority::CRTP));
        assert_eq!(c.get_setpoint(&VehicleState::default()).timestamp_ms, 1_250);
    }

    #[test]
    fn lower_priority_is_refused_and_does_not_refresh() {
        let (c, clock) = commander();
        assert!(c.set_setpoint(&thrust(1.0), Priority::EXTERNAL_RX));
        clock.advance(300);
        assert!(!c.set_setpoint(&thrust(2.0), Priority::CRTP));
        assert_eq!(c.inactivity_time(), 300);
        assert_eq!(c.get_setpoint(&VehicleState::default()).thrust, 1.0);
    }

    #[test]
    fn same_priority_takes_over() {
        let (c, _) = commander();
        assert!(c.set_setpoint(&thrust(1.0), Priority::CRTP));
        assert!(c.set_setpoint(&thrust(2.0), Priority::CRTP));
        assert_eq!(c.get_setpoint(&VehicleState::default()).thrust, 2.0);
    }

    #[test]
    fn failsafe_thresholds() {
        let (c, clock) = commander();
        let sp = thrust(40_000.0);
        c.set_setpoint(&sp, Priority::CRTP);
        let st = VehicleState::default();

        clock.advance(499);
        assert_eq!(c.get_setpoint(&st).thrust, 40_000.0);
        assert_eq!(c.active_priority(), Priority::CRTP);

        clock.advance(1);
        let lv = c.get_setpoint(&st);
        assert_eq!(lv, Setpoint { timestamp_ms: 1_000, ..sp.leveled() });
        assert_eq!(lv.mode.z, AxisMode::Abs);
        assert_eq!(c.active_priority(), Priority::DISABLE);
        assert_eq!(c.failsafe_state(), FailsafeState::Degrading);

        clock.advance(1_499);
        assert_eq!(c.get_setpoint(&st).mode.yaw, AxisMode::Velocity);

        clock.advance(1);
        assert!(c.get_setpoint(&st).is_null());
        assert_eq!(c.failsafe_state(), FailsafeState::Shutdown);
        assert_eq!(c.active_priority(), Priority::DISABLE);
    }

    #[test]
    fn any_source_may_claim_after_degradation() {
        let (c, clock) = commander();
        c.set_setpoint(&thrust(1.0), Priority::EXTERNAL_RX);
        clock.advance(STABILIZE_TIMEOUT_MS);
        c.get_setpoint(&VehicleState::default());
        assert!(c.set_setpoint(&thrust(2.0), Priority::HIGH_LEVEL));
        assert_eq!(c.failsafe_state(), FailsafeState::Active);
    }

    #[test]
    fn relax_hands_last_state_to_planner() {
        let state = VehicleState { position: Vec3::new(1.0, 2.0, 3.0), ..Default::default() };
        let mut planner = MockHighLevelPlanner::new();
        planner.expect_disable().times(1).return_const(());
        planner
            .expect_tell_state()
            .withf(move |s| *s == state)
            .times(1)
            .return_const(());

        let clock = ManualClock::new(0);
        let c = Commander::new(Arc::new(planner), clock.clone());
        c.set_setpoint(&thrust(1.0), Priority::CRTP);
        c.get_setpoint(&state);
        c.relax_priority();
        assert_eq!(c.active_priority(), Priority::LOWEST);
        assert!(c.set_setpoint(&thrust(2.0), Priority::HIGH_LEVEL));
    }

    #[test]
    fn planner_disabled_once_per_takeover() {
        let mut planner = MockHighLevelPlanner::new();
        planner.expect_disable().times(2).return_const(());
        planner.expect_tell_state().return_const(());
        let c = Commander::new(Arc::new(planner), ManualClock::new(0));

        c.set_setpoint(&thrust(1.0), Priority::HIGH_LEVEL);
        c.set_setpoint(&thrust(1.0), Priority::CRTP);
        c.set_setpoint(&thrust(1.0), Priority::CRTP);
        c.set_setpoint(&thrust(1.0), Priority::EXTERNAL_RX);

        c.relax_priority();
        c.set_setpoint(&thrust(1.0), Priority::HIGH_LEVEL);
        c.set_setpoint(&thrust(1.0), Priority::CRTP);
    }

    #[test]
    fn radio_loss_then_planner_recovers() {
        let mut planner = MockHighLevelPlanner::new();
        planner.expect_disable().times(1).return_const(());
        let clock = ManualClock::new(0);
        let c = Commander::new(Arc::new(planner), clock.clone());
        let st = VehicleState::default();

        // planner flying
        assert!(c.set_setpoint(&thrust(30_000.0), Priority::HIGH_LEVEL));
        // pilot grabs the sticks at 100 Hz for a second
        for _ in 0..100 {
            clock.advance(10);
            assert!(c.set_setpoint(&thrust(45_000.0), Priority::CRTP));
            assert_eq!(c.get_setpoint(&st).thrust, 45_000.0);
        }
        // planner is locked out while the pilot is live
        assert!(!c.set_setpoint(&thrust(30_000.0), Priority::HIGH_LEVEL));

        // radio goes quiet
        clock.advance(600);
        let sp = c.get_setpoint(&st);
        assert_eq!((sp.attitude.roll, sp.attitude.pitch, sp.thrust), (0.0, 0.0, 45_000.0));
        clock.advance(1_400);
        assert!(c.get_setpoint(&st).is_null());

        // planner may fly again
        assert!(c.set_setpoint(&thrust(30_000.0), Priority::HIGH_LEVEL));
        assert_eq!(c.get_setpoint(&st).thrust, 30_000.0);
    }

    #[test]
    fn higher_claim_holds_until_it_goes_stale() {
        let clock = ManualClock::new(0);
        let c = Commander::new(Arc::new(NoPlanner), clock.clone());
        let st = VehicleState::default();
        let s1 = thrust(42_000.0);
        let s2 = Setpoint { thrust: 10_000.0, ..Setpoint::null() };

        assert!(c.set_setpoint(&s1, Priority::CRTP));
        clock.set(100);
        assert!(!c.set_setpoint(&s2, Priority::HIGH_LEVEL));
        assert_eq!(c.get_setpoint(&st).thrust, 42_000.0);

        clock.set(600);
        let lv = c.get_setpoint(&st);
        assert_eq!(lv.position.z, s1.position.z);
        assert_eq!(lv.mode.z, s1.mode.z);
        assert_eq!(lv.thrust, s1.thrust);
        assert_eq!((lv.mode.x, lv.mode.y), (AxisMode::Disable, AxisMode::Disable));

        clock.set(2_100);
        assert!(c.get_setpoint(&st).is_null());
        assert_eq!(c.active_priority(), Priority::DISABLE);
        assert!(c.set_setpoint(&s2, Priority::HIGH_LEVEL));
        assert_eq!(c.get_setpoint(&st).thrust, 10_000.0);
    }

    proptest! {
        #[test]
        fn accepted_priorities_never_decrease(claims in proptest::collection::vec(0u8..4, 1..40)) {
            let (c, _) = commander();
            let mut held = Priority::DISABLE;
            for level in claims {
                let p = Priority::new(level);
                let accepted = c.set_setpoint(&thrust(level as f32), p);
                prop_assert_eq!(accepted, p >= held);
                if accepted {
                    held = p;
                }
                prop_assert_eq!(c.active_priority(), held);
            }
        }
    }
}
