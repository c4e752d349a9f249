// commander/setpoint.rs
// Control input types exchanged with the stabilizer.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisMode {
    #[default]
    Disable,
    /// Position target on linear axes, angle target on rotational ones.
    Abs,
    Velocity,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Degrees, or degrees per second when used as a rate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attitude {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisModes {
    pub x: AxisMode,
    pub y: AxisMode,
    pub z: AxisMode,
    pub roll: AxisMode,
    pub pitch: AxisMode,
    pub yaw: AxisMode,
}

/// Desired vehicle state. `Setpoint::default()` is the null setpoint: zero
/// thrust and every axis disabled.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Setpoint {
    pub timestamp_ms: u64,
    pub attitude: Attitude,
    pub attitude_rate: Attitude,
    pub thrust: f32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    /// Velocity is expressed in the body frame rather than the world frame.
    pub velocity_body: bool,
    pub mode: AxisModes,
}

impl Setpoint {
    pub fn null() -> Self {
        Self::default()
    }

    /// Null apart from the timestamp.
    pub fn is_null(&self) -> bool {
        Setpoint { timestamp_ms: 0, ..*self } == Setpoint::null()
    }

    /// Self-leveling copy: hold the z axis and thrust, zero roll and pitch,
    /// stop yawing, release x and y.
    pub fn leveled(&self) -> Self {
        let mut s = *self;
        s.mode.x = AxisMode::Disable;
        s.mode.y = AxisMode::Disable;
        s.mode.roll = AxisMode::Abs;
        s.mode.pitch = AxisMode::Abs;
        s.mode.yaw = AxisMode::Velocity;
        s.attitude.roll = 0.0;
        s.attitude.pitch = 0.0;
        s.attitude_rate.yaw = 0.0;
        s
    }
}

/// Snapshot of the estimator handed to the arbiter each control tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VehicleState {
    pub timestamp_ms: u64,
    pub attitude: Attitude,
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
}

/// Control source rank. A claim wins when it is at least the held rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(u8);

impl Priority {
    pub const DISABLE: Priority = Priority(0);
    pub const LOWEST: Priority = Priority(1);
    pub const HIGH_LEVEL: Priority = Priority(1);
    pub const CRTP: Priority = Priority(2);
    pub const EXTERNAL_RX: Priority = Priority(3);

    pub const fn new(level: u8) -> Self {
        Priority(level)
    }

    pub const fn level(self) -> u8 {
        self.0
    }
}
