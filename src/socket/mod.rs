//! Socket-side types: the connection state reported by `AT+CIPSTATUS`, the
//! inbound `+IPD` reassembly handler and the ring buffer it fills.

pub mod ring_buffer;

use crate::modem::UrcHandler;
use ring_buffer::RingBuffer;

/// Capacity of the socket receive ring.
pub const GPRS_BUFFER_SIZE: usize = 64;

/// Reference into the driver's single socket slot, handed out through
/// `TcpClientStack::socket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SocketHandle(pub u8);

/// Connection state of the modem's IP stack, as reported by the
/// `STATE: <token>` line of `AT+CIPSTATUS`.
///
/// The state is queried fresh before every transition of the attach
/// sequence; it is never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// `IP INITIAL`: task not started
    Initial,
    /// `IP START`: task started, bearer not up
    Start,
    /// `IP CONFIG`: modem is allocating an address
    Config,
    /// `IP GPRSACT`: context activated, local IP not yet queried
    Activated,
    /// `IP STATUS`: ready to open a connection
    Ready,
    /// `TCP CONNECTING` / `UDP CONNECTING`
    Connecting,
    /// `CONNECT OK`
    Connected,
    /// `IP CLOSE`: previous connection closed, stack still up
    Closed,
    /// `PDP DEACT`: context lost, needs a shutdown
    Deactivated,
    Unknown,
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

impl ConnectionState {
    pub fn from_status(status: &[u8]) -> Self {
        match status {
            b"IP INITIAL" => Self::Initial,
            b"IP START" => Self::Start,
            b"IP CONFIG" => Self::Config,
            b"IP GPRSACT" => Self::Activated,
            b"IP STATUS" => Self::Ready,
            b"IP CLOSE" => Self::Closed,
            b"PDP DEACT" => Self::Deactivated,
            s if contains(s, b"CONNECTING") => Self::Connecting,
            // Catches "CONNECT OK" and friends
            s if contains(s, b"CONNECT") => Self::Connected,
            _ => Self::Unknown,
        }
    }
}

/// Reassembles `+IPD<len>:` notifications into the receive ring.
///
/// The modem announces inbound socket data as `+IPD` followed by a decimal
/// byte count, a colon, and that many raw payload bytes. The payload
/// routinely spans several receive cycles, so this handler keeps the count
/// of bytes still owed and reports its consumption as
/// `consumed + outstanding`, which is what arms the engine's overflow
/// cursor and gets the continuation routed back here.
#[derive(Debug, Default)]
pub struct SocketIngress<const N: usize = GPRS_BUFFER_SIZE> {
    ring: RingBuffer<N>,
    size_left: usize,
}

impl<const N: usize> SocketIngress<N> {
    pub const fn new() -> Self {
        Self {
            ring: RingBuffer::new(),
            size_left: 0,
        }
    }

    /// Drop buffered payload and any half-read notification.
    pub fn reset(&mut self) {
        self.ring.clear();
        self.size_left = 0;
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn dequeue(&mut self) -> Option<u8> {
        self.ring.dequeue()
    }

    pub fn peek(&self) -> Option<u8> {
        self.ring.peek()
    }
}

impl<const N: usize> UrcHandler for SocketIngress<N> {
    fn handle(&mut self, chunk: &[u8]) -> usize {
        let mut used = 0;

        if self.size_left == 0 {
            // Fresh notification: the whole "+IPD<len>:" header has to be
            // inside this chunk for the match to count
            let Some(marker) = chunk.windows(4).position(|w| w == b"+IPD") else {
                return 0;
            };
            let digits_at = marker + 4;
            let Some(colon) = chunk[digits_at..].iter().position(|&b| b == b':') else {
                return 0;
            };
            let digits = &chunk[digits_at..digits_at + colon];
            if digits.is_empty() || !digits.iter().all(|b| b.is_ascii_digit()) {
                return 0;
            }
            self.size_left = digits
                .iter()
                .fold(0usize, |n, &d| n * 10 + usize::from(d - b'0'));
            used = digits_at + colon + 1;
        }

        while self.size_left > 0 && used < chunk.len() {
            let byte = chunk[used];
            used += 1;
            self.size_left -= 1;
            // A full ring drops the byte; the count still goes down so the
            // payload boundary is not lost
            let _ = self.ring.enqueue(byte);
        }

        used + self.size_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_tokens() {
        assert_eq!(
            ConnectionState::from_status(b"IP INITIAL"),
            ConnectionState::Initial
        );
        assert_eq!(
            ConnectionState::from_status(b"IP GPRSACT"),
            ConnectionState::Activated
        );
        assert_eq!(
            ConnectionState::from_status(b"IP STATUS"),
            ConnectionState::Ready
        );
        assert_eq!(
            ConnectionState::from_status(b"PDP DEACT"),
            ConnectionState::Deactivated
        );
        assert_eq!(
            ConnectionState::from_status(b"TCP CONNECTING"),
            ConnectionState::Connecting
        );
        assert_eq!(
            ConnectionState::from_status(b"CONNECT OK"),
            ConnectionState::Connected
        );
        assert_eq!(
            ConnectionState::from_status(b"SOMETHING ELSE"),
            ConnectionState::Unknown
        );
    }

    #[test]
    fn ingress_consumes_complete_notification() {
        let mut ingress: SocketIngress<16> = SocketIngress::new();
        assert_eq!(ingress.handle(b"+IPD5:HELLO"), 11);
        assert_eq!(ingress.len(), 5);
        let mut out = std::vec::Vec::new();
        while let Some(b) = ingress.dequeue() {
            out.push(b);
        }
        assert_eq!(out, b"HELLO");
    }

    #[test]
    fn ingress_reports_outstanding_bytes_past_chunk_end() {
        let mut ingress: SocketIngress<16> = SocketIngress::new();
        // Header plus two of five payload bytes: 8 consumed, 3 owed
        assert_eq!(ingress.handle(b"+IPD5:HE"), 11);
        assert_eq!(ingress.len(), 2);
        // Continuation consumes exactly the owed bytes
        assert_eq!(ingress.handle(b"LLO"), 3);
        assert_eq!(ingress.len(), 5);
    }

    #[test]
    fn ingress_rejects_incomplete_header() {
        let mut ingress: SocketIngress<16> = SocketIngress::new();
        assert_eq!(ingress.handle(b"+IPD12"), 0);
        assert_eq!(ingress.handle(b"+IPDx:"), 0);
        assert_eq!(ingress.len(), 0);
    }

    #[test]
    fn ingress_drops_payload_when_ring_is_full() {
        let mut ingress: SocketIngress<4> = SocketIngress::new();
        assert_eq!(ingress.handle(b"+IPD8:ABCDEFGH"), 14);
        assert_eq!(ingress.len(), 4);
        assert_eq!(ingress.dequeue(), Some(b'A'));
        assert_eq!(ingress.dequeue(), Some(b'B'));
        assert_eq!(ingress.dequeue(), Some(b'C'));
        assert_eq!(ingress.dequeue(), Some(b'D'));
        assert_eq!(ingress.dequeue(), None);
    }
}
