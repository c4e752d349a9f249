// commander/decoder.rs
// Radio setpoint packets (legacy RPYT on port 3, generic on port 7) -> Commander.
use super::{AxisMode, Commander, Priority, Setpoint};
use crate::router::Router;
use link_protocol::{Packet, Port};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

pub const RPYT_CHANNEL: u8 = 0;
pub const GENERIC_SETPOINT_CHANNEL: u8 = 0;
pub const GENERIC_META_CHANNEL: u8 = 1;

const RPYT_LEN: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GenericType {
    Stop = 0,
    VelocityWorld = 1,
    ZDistance = 2,
    Hover = 5,
}

impl TryFrom<u8> for GenericType {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, u8> {
        match v {
            0 => Ok(GenericType::Stop),
            1 => Ok(GenericType::VelocityWorld),
            2 => Ok(GenericType::ZDistance),
            5 => Ok(GenericType::Hover),
            other => Err(other),
        }
    }
}

pub const META_NOTIFY_SETPOINT_STOP: u8 = 0;

pub struct SetpointDecoder {
    commander: Arc<Commander>,
    /// Legacy thrust stays at zero until one zero-thrust packet is seen.
    thrust_locked: AtomicBool,
}

impl SetpointDecoder {
    pub fn new(commander: Arc<Commander>) -> Arc<Self> {
        Arc::new(Self {
            commander,
            thrust_locked: AtomicBool::new(true),
        })
    }

    /// Install as push callbacks on the two setpoint ports.
    pub fn attach(self: &Arc<Self>, router: &Router) {
        let d = self.clone();
        router.register_callback(Port::COMMANDER, move |p| d.handle_legacy(p));
        let d = self.clone();
        router.register_callback(Port::SETPOINT_GENERIC, move |p| d.handle_generic(p));
    }

    pub fn is_thrust_locked(&self) -> bool {
        self.thrust_locked.load(Ordering::Acquire)
    }

    /// roll f32, pitch f32, yaw rate f32, thrust u16; little endian.
    pub fn handle_legacy(&self, packet: &Packet) {
        if packet.channel() != RPYT_CHANNEL {
            return;
        }
        let data = packet.payload();
        let (Some(roll), Some(pitch), Some(yaw_rate), Some(raw_thrust)) =
            (f32_at(data, 0), f32_at(data, 4), f32_at(data, 8), u16_at(data, 12))
        else {
            warn!(len = data.len(), want = RPYT_LEN, "short rpyt setpoint");
            return;
        };

        if raw_thrust == 0 && self.thrust_locked.swap(false, Ordering::AcqRel) {
            info!(event = "thrust_unlocked");
        }
        let thrust = if self.is_thrust_locked() { 0.0 } else { raw_thrust as f32 };

        let mut sp = Setpoint::null();
        sp.mode.roll = AxisMode::Abs;
        sp.mode.pitch = AxisMode::Abs;
        sp.mode.yaw = AxisMode::Velocity;
        sp.attitude.roll = roll;
        sp.attitude.pitch = pitch;
        sp.attitude_rate.yaw = yaw_rate;
        sp.thrust = thrust;
        self.commander.set_setpoint(&sp, Priority::CRTP);
    }

    pub fn handle_generic(&self, packet: &Packet) {
        let data = packet.payload();
        match packet.channel() {
            GENERIC_SETPOINT_CHANNEL => {
                let Some((&ty, body)) = data.split_first() else { return };
                match GenericType::try_from(ty) {
                    Ok(ty) => match decode_generic(ty, body) {
                        Some(sp) => {
                            self.commander.set_setpoint(&sp, Priority::CRTP);
                        }
                        None => warn!(?ty, len = body.len(), "short generic setpoint"),
                    },
                    Err(unknown) => debug!(setpoint_type = unknown, "unsupported generic setpoint"),
                }
            }
            GENERIC_META_CHANNEL => match data.first() {
                Some(&META_NOTIFY_SETPOINT_STOP) => self.commander.relax_priority(),
                Some(&other) => debug!(meta = other, "unsupported meta command"),
                None => {}
            },
            _ => {}
        }
    }
}

fn decode_generic(ty: GenericType, body: &[u8]) -> Option<Setpoint> {
    let mut sp = Setpoint::null();
    match ty {
        GenericType::Stop => {}
        GenericType::VelocityWorld => {
            sp.mode.x = AxisMode::Velocity;
            sp.mode.y = AxisMode::Velocity;
            sp.mode.z = AxisMode::Velocity;
            sp.mode.yaw = AxisMode::Velocity;
            sp.velocity.x = f32_at(body, 0)?;
            sp.velocity.y = f32_at(body, 4)?;
            sp.velocity.z = f32_at(body, 8)?;
            sp.attitude_rate.yaw = f32_at(body, 12)?;
        }
        GenericType::ZDistance => {
            sp.mode.roll = AxisMode::Abs;
            sp.mode.pitch = AxisMode::Abs;
            sp.mode.yaw = AxisMode::Velocity;
            sp.mode.z = AxisMode::Abs;
            sp.attitude.roll = f32_at(body, 0)?;
            sp.attitude.pitch = f32_at(body, 4)?;
            sp.attitude_rate.yaw = f32_at(body, 8)?;
            sp.position.z = f32_at(body, 12)?;
        }
        GenericType::Hover => {
            sp.mode.x = AxisMode::Velocity;
            sp.mode.y = AxisMode::Velocity;
            sp.mode.z = AxisMode::Abs;
            sp.mode.yaw = AxisMode::Velocity;
            sp.velocity_body = true;
            sp.velocity.x = f32_at(body, 0)?;
            sp.velocity.y = f32_at(body, 4)?;
            sp.attitude_rate.yaw = f32_at(body, 8)?;
            sp.position.z = f32_at(body, 12)?;
        }
    }
    Some(sp)
}

fn f32_at(data: &[u8], at: usize) -> Option<f32> {
    let bytes = data.get(at..at + 4)?;
    Some(f32::from_le_bytes(bytes.try_into().ok()?))
}

fn u16_at(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_le_bytes(bytes.try_into().ok()?))
}
