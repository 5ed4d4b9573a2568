//! AT command engine.
//!
//! [`Modem`] owns the byte transport and implements the half-duplex
//! request/response protocol the SIM900 family speaks: commands are plain
//! text terminated by `\r`, responses are whatever bytes show up before the
//! line goes quiet, and unsolicited result codes can land interleaved with
//! anything. Received bytes are collected into a small scratch buffer and
//! every freshly filled buffer is scanned once against the registered
//! [`UrcHandler`]s before token matching sees it.

use core::cell::RefCell;

use embedded_io::{Read, ReadReady, Write};
use fugit::{ExtU32, MillisDurationU32, TimerDurationU32};
use heapless::{String, Vec};

use crate::error::Error;
use crate::traits::{Clock, SerialMode, SerialMux};

/// Scratch receive buffer size. One receive cycle never captures more than
/// this; longer responses span multiple cycles.
pub const GSM_BUFFER_SIZE: usize = 64;

/// Number of slots in the unsolicited-data callback table. Slot 0 is by
/// convention the socket ingress handler.
pub const MAX_CALLBACKS: usize = 3;

const IMEI_LENGTH: usize = 14;

/// Consumer of unsolicited data found in the receive buffer.
///
/// `handle` is called with the chunk starting at the matched pattern and
/// returns how many input bytes it consumed. Returning *more* than
/// `chunk.len()` signals that the handler knows (from a length prefix) that
/// the remainder of its data has not arrived yet; the engine will then call
/// it again, first thing, with the next cycle's buffer. Returning 0 rejects
/// the match and scanning moves on by a single byte.
///
/// atat solves the same problem with its `UrcMatcher`; here the handler also
/// owns the cross-chunk bookkeeping so a payload larger than the scratch
/// buffer can be reassembled without copying it anywhere intermediate.
pub trait UrcHandler {
    fn handle(&mut self, chunk: &[u8]) -> usize;
}

struct Callback<'a> {
    pattern: &'a [u8],
    handler: &'a RefCell<dyn UrcHandler + 'a>,
}

/// The AT command engine. Generic over the byte transport and the injected
/// monotonic clock.
pub struct Modem<'a, T, CLK, const TIMER_HZ: u32> {
    transport: T,
    clock: CLK,
    buf: Vec<u8, GSM_BUFFER_SIZE>,
    first_timeout: TimerDurationU32<TIMER_HZ>,
    intra_timeout: TimerDurationU32<TIMER_HZ>,
    callbacks: [Option<Callback<'a>>; MAX_CALLBACKS],
    overflow_len: usize,
    overflow_slot: usize,
}

impl<'a, T, CLK, const TIMER_HZ: u32> Modem<'a, T, CLK, TIMER_HZ>
where
    T: Read + Write + ReadReady,
    CLK: Clock<TIMER_HZ>,
{
    pub fn new(transport: T, clock: CLK) -> Self {
        Self {
            transport,
            clock,
            buf: Vec::new(),
            first_timeout: 1_000.millis::<1, 1_000>().convert(),
            intra_timeout: 50.millis::<1, 1_000>().convert(),
            callbacks: [None, None, None],
            overflow_len: 0,
            overflow_slot: 0,
        }
    }

    /// Tear the engine down, handing back the transport and the clock.
    pub fn release(self) -> (T, CLK) {
        (self.transport, self.clock)
    }

    /// Direct access to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Set the receive windows: `first` bounds the wait for the first byte
    /// of a response, `intra` the gap between consecutive bytes. An `intra`
    /// of zero disables the inter-byte extension.
    pub fn set_timeouts(&mut self, first: MillisDurationU32, intra: MillisDurationU32) {
        self.first_timeout = first.convert();
        self.intra_timeout = intra.convert();
    }

    /// The scratch buffer as filled by the last receive cycle.
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Send a command, without waiting for any response.
    ///
    /// Stale bytes sitting in the transport are drained through full receive
    /// cycles first, so that callbacks still see them and the next response
    /// is not glued to leftovers of the previous one.
    pub fn send(&mut self, cmd: &str) -> Result<(), Error> {
        while self.transport.read_ready().map_err(|_| Error::Transport)? {
            self.recv();
        }

        debug!("-> {:?}", cmd);
        self.transport
            .write_all(cmd.as_bytes())
            .map_err(|_| Error::Transport)?;
        self.transport
            .write_all(b"\r")
            .map_err(|_| Error::Transport)?;
        Ok(())
    }

    /// Write raw bytes to the transport, bypassing command framing. Used for
    /// socket payload after a `AT+CIPSEND` prompt.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<(), Error> {
        self.transport.write_all(data).map_err(|_| Error::Transport)
    }

    /// One receive cycle: fill the scratch buffer until it is full or the
    /// line goes quiet, then run the callback scan over it once.
    ///
    /// Returns the number of bytes captured, 0 on a total timeout. Transport
    /// read errors are treated as silence; they cannot make this fail.
    pub fn recv(&mut self) -> usize {
        self.buf.clear();
        let mut deadline = self.clock.now() + self.first_timeout;

        while self.clock.now() < deadline {
            if !self.transport.read_ready().unwrap_or(false) {
                continue;
            }
            let mut byte = 0u8;
            match self.transport.read(core::slice::from_mut(&mut byte)) {
                Ok(n) if n > 0 => {
                    if self.buf.push(byte).is_ok() && self.intra_timeout.ticks() > 0 {
                        deadline = self.clock.now() + self.intra_timeout;
                    }
                    if self.buf.is_full() {
                        break;
                    }
                }
                _ => continue,
            }
        }

        if !self.buf.is_empty() {
            trace!("<- {:?}", &self.buf[..]);
        }
        self.dispatch();
        self.buf.len()
    }

    /// Find `needle` in the scratch buffer.
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() {
            return Some(0);
        }
        self.buf.windows(needle.len()).position(|w| w == needle)
    }

    /// One receive cycle, then report which of `tokens` appeared in the
    /// buffer (first match in `tokens` order wins).
    pub fn recv_until(&mut self, tokens: &[&[u8]]) -> Option<usize> {
        self.recv();
        tokens.iter().position(|t| self.find(t).is_some())
    }

    /// Like [`recv_until`](Self::recv_until), but repeats the cycle up to
    /// `tries` times, short-circuiting on the first match. Used when a
    /// response is delayed by a variable number of intermediate lines.
    pub fn recv_until_tries(&mut self, tries: usize, tokens: &[&[u8]]) -> Option<usize> {
        for _ in 0..tries {
            if let Some(i) = self.recv_until(tokens) {
                return Some(i);
            }
        }
        None
    }

    pub fn send_recv(&mut self, cmd: &str) -> Result<usize, Error> {
        self.send(cmd)?;
        Ok(self.recv())
    }

    pub fn send_recv_until(&mut self, cmd: &str, tokens: &[&[u8]]) -> Result<Option<usize>, Error> {
        self.send(cmd)?;
        Ok(self.recv_until(tokens))
    }

    pub fn send_recv_until_tries(
        &mut self,
        cmd: &str,
        tries: usize,
        tokens: &[&[u8]],
    ) -> Result<Option<usize>, Error> {
        self.send(cmd)?;
        Ok(self.recv_until_tries(tries, tokens))
    }

    /// Install a handler for unsolicited data starting with `pattern`.
    pub fn set_callback(
        &mut self,
        slot: usize,
        pattern: &'a [u8],
        handler: &'a RefCell<dyn UrcHandler + 'a>,
    ) {
        if let Some(entry) = self.callbacks.get_mut(slot) {
            *entry = Some(Callback { pattern, handler });
        }
    }

    pub fn clear_callback(&mut self, slot: usize) {
        if let Some(entry) = self.callbacks.get_mut(slot) {
            *entry = None;
        }
        if self.overflow_slot == slot {
            self.overflow_len = 0;
        }
    }

    /// Non-blocking pump: run one receive cycle if the transport has bytes,
    /// otherwise return immediately. Call this frequently while idle so
    /// unsolicited data keeps flowing into its handlers.
    pub fn spin(&mut self) {
        if self.transport.read_ready().unwrap_or(false) {
            self.recv();
        }
    }

    /// Busy-wait for `duration` on the injected clock.
    pub fn wait(&mut self, duration: MillisDurationU32) {
        let deadline = self.clock.now() + duration.convert();
        while self.clock.now() < deadline {
            core::hint::spin_loop();
        }
    }

    /// Scan the just-filled scratch buffer against the callback table.
    ///
    /// A handler that consumed past the end of the previous buffer gets the
    /// whole new buffer first. After that, handlers are tried in slot order
    /// at each position; unmatched input advances a single byte so a marker
    /// can never be stepped over in bulk.
    fn dispatch(&mut self) {
        let len = self.buf.len();
        let mut pos = 0;
        let mut slot = self.overflow_slot;

        if self.overflow_len > 0 {
            if let Some(cb) = self.callbacks[slot].as_ref() {
                pos += cb.handler.borrow_mut().handle(&self.buf);
            }
        }

        while pos < len {
            let mut used = 0;
            for (i, cb) in self.callbacks.iter().enumerate() {
                let Some(cb) = cb.as_ref() else {
                    continue;
                };
                if self.buf[pos..].starts_with(cb.pattern) {
                    used = cb.handler.borrow_mut().handle(&self.buf[pos..]);
                    if used > 0 {
                        slot = i;
                        break;
                    }
                }
            }
            pos += if used == 0 { 1 } else { used };
        }

        if pos > len {
            // Handler claimed more than it was given; revisit it first next
            // cycle with the outstanding count carried over
            self.overflow_slot = slot;
            self.overflow_len = pos - len;
        } else {
            self.overflow_len = 0;
        }
    }

    /// Poke the modem with a bare `AT` (twice, it may still be autobauding)
    /// and switch command echo off once it answers.
    pub fn is_modem_ready(&mut self) -> bool {
        let mut ready = false;
        for _ in 0..2 {
            if matches!(self.send_recv_until("AT", &[b"OK"]), Ok(Some(_))) {
                ready = true;
                break;
            }
        }
        if ready {
            // Echo would end up glued to every response
            let _ = self.send_recv("ATE0");
        }
        ready
    }

    /// Registered on the home network?
    pub fn is_registered(&mut self) -> bool {
        matches!(
            self.send_recv_until("AT+CREG?", &[b"+CREG: 0,1"]),
            Ok(Some(_))
        )
    }

    /// GPRS attached?
    pub fn is_attached(&mut self) -> bool {
        matches!(
            self.send_recv_until("AT+CGATT?", &[b"+CGATT: 1"]),
            Ok(Some(_))
        )
    }

    /// Query the IMEI and return the first run of digits from the response.
    pub fn imei(&mut self) -> Result<String<16>, Error> {
        if self.send_recv_until("AT+GSN", &[b"OK"])?.is_none() {
            return Err(Error::Timeout);
        }

        let mut imei: String<16> = String::new();
        for &b in self.buf.iter() {
            if b.is_ascii_digit() {
                let _ = imei.push(b as char);
                if imei.len() == IMEI_LENGTH {
                    break;
                }
            } else if !imei.is_empty() {
                break;
            }
        }

        if imei.is_empty() {
            return Err(Error::InvalidResponse);
        }
        Ok(imei)
    }

    /// Route the shared serial line. Pending transport bytes are flushed
    /// through receive cycles first; whatever arrives after the switch
    /// belongs to the other peripheral.
    pub fn serial_select<M: SerialMux>(
        &mut self,
        mux: &mut M,
        mode: SerialMode,
    ) -> Result<(), Error> {
        while self.transport.read_ready().unwrap_or(false) {
            self.recv();
        }
        mux.select(mode).map_err(|_| Error::IoPin)
    }
}
