// services/console.rs
// Text console on port 0. Lines are batched into packets; when the outbound
// queue is about to fill, the tail of the message is replaced by a marker so
// the ground station can tell output was lost.
use crate::router::Router;
use link_protocol::{MAX_DATA_SIZE, Packet, Port};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

pub const CONSOLE_CHANNEL: u8 = 0;
pub const BUFFER_FULL_MARKER: &[u8] = b"<F>\n";

struct Pending {
    message: Packet,
    /// A full message is waiting for room in the outbound queue.
    sending: bool,
}

pub struct Console {
    router: Arc<Router>,
    buf: Mutex<Pending>,
}

impl Console {
    pub fn new(router: Arc<Router>) -> Self {
        let message = Packet::empty(Port::CONSOLE, CONSOLE_CHANNEL);
        Self {
            router,
            buf: Mutex::new(Pending { message, sending: false }),
        }
    }

    /// Characters offered while a previous message is still waiting to be
    /// queued are dropped.
    pub fn putchar(&self, ch: u8) -> u8 {
        let mut g = self.buf.lock();
        if g.sending {
            self.try_send(&mut g);
        }
        if !g.sending {
            let _ = g.message.push(ch);
            if ch == b'\n' || g.message.is_full() {
                if self.router.free_outbound_slots() == 1 {
                    add_buffer_full_marker(&mut g.message);
                }
                g.sending = true;
                self.try_send(&mut g);
            }
        }
        ch
    }

    /// Append only; never sends and gives up if the buffer is busy. Safe to
    /// call from contexts that must not block. A message it fills is left
    /// pending for the next `putchar` or `flush`.
    pub fn try_putchar(&self, ch: u8) -> u8 {
        if let Some(mut g) = self.buf.try_lock() {
            if !g.sending && g.message.push(ch).is_ok() && g.message.is_full() {
                g.sending = true;
            }
        }
        ch
    }

    pub fn puts(&self, s: &str) {
        for b in s.bytes() {
            self.putchar(b);
        }
    }

    pub fn print(&self, args: fmt::Arguments<'_>) {
        match args.as_str() {
            Some(s) => self.puts(s),
            None => self.puts(&args.to_string()),
        }
    }

    /// Push out whatever is buffered, newline or not.
    pub fn flush(&self) {
        let mut g = self.buf.lock();
        if !g.message.is_empty() {
            self.try_send(&mut g);
        }
    }

    fn try_send(&self, p: &mut Pending) {
        if self.router.send(p.message).is_ok() {
            p.message.clear();
            p.sending = false;
        }
    }
}

/// Place the marker right after the text when it fits (swallowing a trailing
/// newline), otherwise overwrite the end of the message.
fn add_buffer_full_marker(message: &mut Packet) {
    let mut start = message.len();
    if start > 0 && message.payload()[start - 1] == b'\n' {
        start -= 1;
    }
    let end = (start + BUFFER_FULL_MARKER.len()).min(MAX_DATA_SIZE);
    let marker_at = end - BUFFER_FULL_MARKER.len();
    if message.resize(end).is_ok() {
        message.payload_mut()[marker_at..end].copy_from_slice(BUFFER_FULL_MARKER);
    }
}
