// Host stand-ins for the physical layer: one UDP datagram per outer frame
// (radio) or per packet (usb).
use flight_comm::config::Config;
use anyhow::Result;
use flight_comm::link::{RadioLink, Syslink, UsbDevice, UsbLink};
use link_protocol::{FRAME_WIRE_SIZE, Frame};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Blocking socket for sends from the pump threads, async twin for receive.
pub fn connect(cfg: &Config) -> Result<(std::net::UdpSocket, UdpSocket)> {
    let tx = std::net::UdpSocket::bind(&cfg.bind_addr)?;
    tx.connect(&cfg.peer_addr)?;
    let rx = tx.try_clone()?;
    rx.set_nonblocking(true)?;
    Ok((tx, UdpSocket::from_std(rx)?))
}

pub struct UdpSyslink {
    sock: std::net::UdpSocket,
}

impl UdpSyslink {
    pub fn new(sock: std::net::UdpSocket) -> Self {
        Self { sock }
    }
}

impl Syslink for UdpSyslink {
    fn send_frame(&self, frame: &Frame) -> bool {
        match self.sock.send(&frame.encode()) {
            Ok(_) => true,
            Err(e) => {
                debug!(?e, "frame send error");
                false
            }
        }
    }
}

pub fn spawn_radio_rx(sock: UdpSocket, radio: Arc<RadioLink>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; FRAME_WIRE_SIZE];
        loop {
            let n = match sock.recv(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(?e, "radio socket recv error");
                    continue;
                }
            };
            match Frame::decode(&buf[..n]) {
                // dispatch may block on delivery backpressure
                Ok(frame) => tokio::task::block_in_place(|| radio.dispatch(frame)),
                Err(e) => warn!(%e, len = n, "bad frame"),
            }
        }
    })
}

pub struct UdpUsbDevice {
    sock: std::net::UdpSocket,
}

impl UdpUsbDevice {
    pub fn new(sock: std::net::UdpSocket) -> Self {
        Self { sock }
    }
}

impl UsbDevice for UdpUsbDevice {
    fn write_packet(&self, bytes: &[u8]) -> bool {
        self.sock.send(bytes).is_ok()
    }

    fn is_attached(&self) -> bool {
        true
    }
}

pub fn spawn_usb_rx(sock: UdpSocket, usb: Arc<UsbLink>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; FRAME_WIRE_SIZE];
        loop {
            let n = match sock.recv(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(?e, "usb socket recv error");
                    continue;
                }
            };
            if let Err(e) = tokio::task::block_in_place(|| usb.deliver(&buf[..n])) {
                warn!(%e, len = n, "bad usb packet");
            }
        }
    })
}
