// lib.rs: shared wire types (logical packets, ports, outer radio frames)

use std::fmt;
use thiserror::Error;

// =============================== Common =====================================

pub const PROTOCOL_VERSION: u8 = 1;

/// Number of addressable logical ports (4-bit field in the header).
pub const PORT_COUNT: usize = 16;
/// Number of channels inside a port (2-bit field in the header).
pub const CHANNEL_COUNT: u8 = 4;
/// Largest payload a packet can carry.
pub const MAX_DATA_SIZE: usize = 30;
/// Header byte plus payload; the physical link's MTU for one packet.
pub const MAX_PACKET_SIZE: usize = MAX_DATA_SIZE + 1;

/// Largest data section of an outer frame.
pub const FRAME_MTU: usize = 64;
/// Encoded outer frame: type byte, length byte, data.
pub const FRAME_WIRE_SIZE: usize = FRAME_MTU + 2;

pub const P2P_MAX_DATA_SIZE: usize = 60;

// ================================ Errors ====================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("port {0} out of range")]
    InvalidPort(u8),
    #[error("channel {0} out of range")]
    InvalidChannel(u8),
    #[error("unknown frame type 0x{0:02x}")]
    UnknownFrameType(u8),
    #[error("truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("length byte says {declared}, frame holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("{0:?} frames do not carry a packet")]
    NotAPacket(FrameType),
}

// ================================= Ports ====================================

/// A logical port. Named constants form the fixed enumeration shared with the
/// ground station; changing a value breaks wire compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Port(u8);

impl Port {
    pub const CONSOLE: Port = Port(0);
    pub const PARAM: Port = Port(2);
    /// Legacy roll/pitch/yaw/thrust setpoints.
    pub const COMMANDER: Port = Port(3);
    pub const MEMORY: Port = Port(4);
    pub const LOG: Port = Port(5);
    pub const LOCALIZATION: Port = Port(6);
    pub const SETPOINT_GENERIC: Port = Port(7);
    pub const PLATFORM: Port = Port(9);
    pub const LINK_SERVICE: Port = Port(10);
    pub const SETPOINT_HIGH_LEVEL: Port = Port(13);
    pub const LINK: Port = Port(15);

    /// Panics when `n` does not fit the 4-bit port field.
    pub const fn new(n: u8) -> Self {
        assert!((n as usize) < PORT_COUNT, "port index out of range");
        Port(n)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "console",
            2 => "param",
            3 => "commander",
            4 => "memory",
            5 => "log",
            6 => "localization",
            7 => "setpoint_generic",
            9 => "platform",
            10 => "link_service",
            13 => "setpoint_high_level",
            15 => "link",
            _ => "unassigned",
        }
    }
}

impl TryFrom<u8> for Port {
    type Error = ProtocolError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        if (n as usize) < PORT_COUNT {
            Ok(Port(n))
        } else {
            Err(ProtocolError::InvalidPort(n))
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

// ================================ Packets ===================================

/// One logical packet. Plain value: copied into and out of queues.
///
/// Header layout: port in bits 7..4, reserved bits 3..2, channel in bits 1..0.
#[derive(Clone, Copy)]
pub struct Packet {
    header: u8,
    size: u8,
    data: [u8; MAX_DATA_SIZE],
}

impl Packet {
    pub fn new(port: Port, channel: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        if channel >= CHANNEL_COUNT {
            return Err(ProtocolError::InvalidChannel(channel));
        }
        Self::with_header(encode_header(port, channel), payload)
    }

    /// Header only, no payload. Panics on a channel outside 0..4.
    pub fn empty(port: Port, channel: u8) -> Self {
        assert!(channel < CHANNEL_COUNT, "channel out of range");
        Self {
            header: encode_header(port, channel),
            size: 0,
            data: [0u8; MAX_DATA_SIZE],
        }
    }

    /// Build from a raw header byte; reserved bits are kept as given.
    pub fn with_header(header: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_DATA_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_DATA_SIZE,
            });
        }
        let mut data = [0u8; MAX_DATA_SIZE];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            header,
            size: payload.len() as u8,
            data,
        })
    }

    /// Decode `[header, payload...]` as carried by the link.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        match bytes.split_first() {
            Some((&header, payload)) => Self::with_header(header, payload),
            None => Err(ProtocolError::Truncated { needed: 1, got: 0 }),
        }
    }

    pub fn to_bytes(&self) -> heapless::Vec<u8, MAX_PACKET_SIZE> {
        let mut out = heapless::Vec::new();
        // Capacity is header + MAX_DATA_SIZE, both pushes always fit.
        let _ = out.push(self.header);
        let _ = out.extend_from_slice(self.payload());
        out
    }

    pub fn header(&self) -> u8 {
        self.header
    }

    pub fn port(&self) -> Port {
        Port(self.header >> 4)
    }

    pub fn channel(&self) -> u8 {
        self.header & 0x03
    }

    pub fn set_channel(&mut self, channel: u8) -> Result<(), ProtocolError> {
        if channel >= CHANNEL_COUNT {
            return Err(ProtocolError::InvalidChannel(channel));
        }
        self.header = (self.header & !0x03) | channel;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == MAX_DATA_SIZE
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.data[..len]
    }

    pub fn push(&mut self, byte: u8) -> Result<(), ProtocolError> {
        if self.is_full() {
            return Err(ProtocolError::PayloadTooLarge {
                size: MAX_DATA_SIZE + 1,
                max: MAX_DATA_SIZE,
            });
        }
        self.data[self.len()] = byte;
        self.size += 1;
        Ok(())
    }

    /// Grow (zero filled) or shrink the payload.
    pub fn resize(&mut self, len: usize) -> Result<(), ProtocolError> {
        if len > MAX_DATA_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: len,
                max: MAX_DATA_SIZE,
            });
        }
        if len < self.len() {
            self.data[len..].fill(0);
        }
        self.size = len as u8;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
        self.size = 0;
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.payload() == other.payload()
    }
}

impl Eq for Packet {}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("port", &self.port().raw())
            .field("channel", &self.channel())
            .field("size", &self.size)
            .field("payload", &self.payload())
            .finish()
    }
}

fn encode_header(port: Port, channel: u8) -> u8 {
    (port.raw() << 4) | (channel & 0x03)
}

// ============================== Outer frames ================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    RadioRaw = 0x00,
    RadioChannel = 0x01,
    RadioDatarate = 0x02,
    RadioContWave = 0x03,
    RadioRssi = 0x04,
    RadioAddress = 0x05,
    RadioRawBroadcast = 0x06,
    RadioPower = 0x07,
    RadioP2P = 0x08,
    RadioP2PAck = 0x09,
    RadioP2PBroadcast = 0x0A,
    PmSource = 0x10,
    PmOnOffSwitchOff = 0x11,
    PmShutdownRequest = 0x15,
    PmShutdownAck = 0x16,
}

impl TryFrom<u8> for FrameType {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0x00 => FrameType::RadioRaw,
            0x01 => FrameType::RadioChannel,
            0x02 => FrameType::RadioDatarate,
            0x03 => FrameType::RadioContWave,
            0x04 => FrameType::RadioRssi,
            0x05 => FrameType::RadioAddress,
            0x06 => FrameType::RadioRawBroadcast,
            0x07 => FrameType::RadioPower,
            0x08 => FrameType::RadioP2P,
            0x09 => FrameType::RadioP2PAck,
            0x0A => FrameType::RadioP2PBroadcast,
            0x10 => FrameType::PmSource,
            0x11 => FrameType::PmOnOffSwitchOff,
            0x15 => FrameType::PmShutdownRequest,
            0x16 => FrameType::PmShutdownAck,
            other => return Err(ProtocolError::UnknownFrameType(other)),
        })
    }
}

/// Envelope exchanged with the radio chip. Only `RadioRaw` and
/// `RadioRawBroadcast` wrap a [`Packet`]; every other type is sideband.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub data: heapless::Vec<u8, FRAME_MTU>,
}

impl Frame {
    pub fn new(frame_type: FrameType, data: &[u8]) -> Result<Self, ProtocolError> {
        let data = heapless::Vec::from_slice(data).map_err(|_| ProtocolError::PayloadTooLarge {
            size: data.len(),
            max: FRAME_MTU,
        })?;
        Ok(Self { frame_type, data })
    }

    /// Wrap a packet for unicast; frame length is payload size + 1.
    pub fn raw(packet: &Packet) -> Self {
        Self::wrap(FrameType::RadioRaw, packet)
    }

    pub fn raw_broadcast(packet: &Packet) -> Self {
        Self::wrap(FrameType::RadioRawBroadcast, packet)
    }

    fn wrap(frame_type: FrameType, packet: &Packet) -> Self {
        let mut data = heapless::Vec::new();
        // MAX_PACKET_SIZE < FRAME_MTU
        let _ = data.extend_from_slice(&packet.to_bytes());
        Self { frame_type, data }
    }

    pub fn radio_channel(channel: u8) -> Self {
        Self::single(FrameType::RadioChannel, channel)
    }

    pub fn radio_datarate(datarate: u8) -> Self {
        Self::single(FrameType::RadioDatarate, datarate)
    }

    pub fn radio_power(power_dbm: i8) -> Self {
        Self::single(FrameType::RadioPower, power_dbm as u8)
    }

    /// Radio addresses are 40 bits, sent little endian.
    pub fn radio_address(address: u64) -> Self {
        let mut data = heapless::Vec::new();
        let _ = data.extend_from_slice(&address.to_le_bytes()[..5]);
        Self {
            frame_type: FrameType::RadioAddress,
            data,
        }
    }

    fn single(frame_type: FrameType, byte: u8) -> Self {
        let mut data = heapless::Vec::new();
        let _ = data.push(byte);
        Self { frame_type, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn carries_packet(&self) -> bool {
        matches!(
            self.frame_type,
            FrameType::RadioRaw | FrameType::RadioRawBroadcast
        )
    }

    /// Recover the inner packet: the first data byte is the header, the rest
    /// (length - 1 bytes) the payload.
    pub fn packet(&self) -> Result<Packet, ProtocolError> {
        if !self.carries_packet() {
            return Err(ProtocolError::NotAPacket(self.frame_type));
        }
        Packet::from_bytes(&self.data)
    }

    pub fn encode(&self) -> heapless::Vec<u8, FRAME_WIRE_SIZE> {
        let mut out = heapless::Vec::new();
        let _ = out.push(self.frame_type as u8);
        let _ = out.push(self.data.len() as u8);
        let _ = out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < 2 {
            return Err(ProtocolError::Truncated {
                needed: 2,
                got: bytes.len(),
            });
        }
        let frame_type = FrameType::try_from(bytes[0])?;
        let declared = bytes[1] as usize;
        let body = &bytes[2..];
        if body.len() != declared {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: body.len(),
            });
        }
        Self::new(frame_type, body)
    }
}

// ============================== Peer to peer ================================

/// Application data exchanged directly between vehicles, outside the port
/// space of the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2PPacket {
    pub port: u8,
    /// Signal strength measured by the receiver; 0 on outbound packets.
    pub rssi: u8,
    pub data: heapless::Vec<u8, P2P_MAX_DATA_SIZE>,
}

impl P2PPacket {
    pub fn new(port: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        let data =
            heapless::Vec::from_slice(payload).map_err(|_| ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: P2P_MAX_DATA_SIZE,
            })?;
        Ok(Self { port, rssi: 0, data })
    }

    /// Inbound layout: `[port, rssi, payload...]`.
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        if frame.len() < 2 {
            return Err(ProtocolError::Truncated {
                needed: 2,
                got: frame.len(),
            });
        }
        let mut p = Self::new(frame.data[0], &frame.data[2..])?;
        p.rssi = frame.data[1];
        Ok(p)
    }

    /// Outbound layout: `[port, payload...]`, length = size + 1.
    pub fn to_frame(&self) -> Frame {
        let mut data = heapless::Vec::new();
        let _ = data.push(self.port);
        let _ = data.extend_from_slice(&self.data);
        Frame {
            frame_type: FrameType::RadioP2PBroadcast,
            data,
        }
    }
}

// ================================ Tests =====================================
