// src/lib.rs
// Command & telemetry core: link layer, packet router, setpoint arbiter.
pub mod clock;
pub mod commander;
pub mod config;
pub mod errors;
pub mod link;
pub mod router;
pub mod services;
pub mod system;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use commander::{Commander, FailsafeState, HighLevelPlanner, NoPlanner, Priority, Setpoint, VehicleState};
pub use errors::CommError;
pub use link::{ActiveLink, Link, NoOpLink, RadioLink, Syslink, UsbDevice, UsbLink};
pub use router::{DeliveryPolicy, Router, RouterTasks};
pub use system::FlightCore;
