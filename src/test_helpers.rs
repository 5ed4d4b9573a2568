//! Test doubles: a scripted serial port and a self-advancing timer.

use std::collections::VecDeque;
use std::string::String;
use std::vec::Vec;

use embedded_io::{ErrorType, Read, ReadReady, Write};
use fugit::TimerInstantU32;

use crate::traits::Clock;

/// Fake clock, 1 kHz tick. Every `now()` call advances time by `step_ms`,
/// so a busy-wait against a deadline terminates deterministically without
/// any real time passing.
#[derive(Debug)]
pub struct MockTimer {
    now_ms: u32,
    step_ms: u32,
}

impl MockTimer {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            step_ms: 1,
        }
    }
}

impl Clock<1000> for MockTimer {
    fn now(&mut self) -> TimerInstantU32<1000> {
        self.now_ms = self.now_ms.wrapping_add(self.step_ms);
        TimerInstantU32::from_ticks(self.now_ms)
    }
}

enum Step {
    /// Expect a `\r` terminated command line, then make `reply` readable.
    /// `delayed` optionally arms a second reply that surfaces only after a
    /// number of idle `read_ready` polls (modem-side latency).
    Cmd {
        cmd: String,
        reply: Vec<u8>,
        delayed: Option<(usize, Vec<u8>)>,
    },
    /// Expect raw bytes (socket payload), then make `reply` readable.
    Raw { data: Vec<u8>, reply: Vec<u8> },
}

/// Scripted serial port.
///
/// Write traffic is checked against an ordered list of expectations; each
/// satisfied expectation queues its canned reply into the read side.
/// Unsolicited data can be injected directly with `push_rx`.
pub struct MockSerial {
    steps: VecDeque<Step>,
    rx: VecDeque<u8>,
    delayed: VecDeque<(usize, Vec<u8>)>,
    line: Vec<u8>,
    raw: Vec<u8>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            rx: VecDeque::new(),
            delayed: VecDeque::new(),
            line: Vec::new(),
            raw: Vec::new(),
        }
    }

    pub fn expect_cmd(&mut self, cmd: &str, reply: &[u8]) {
        self.steps.push_back(Step::Cmd {
            cmd: cmd.into(),
            reply: reply.to_vec(),
            delayed: None,
        });
    }

    /// Like [`expect_cmd`](Self::expect_cmd), with a second reply that only
    /// becomes readable `polls` idle `read_ready` calls after the command.
    pub fn expect_cmd_delayed(&mut self, cmd: &str, reply: &[u8], polls: usize, late: &[u8]) {
        self.steps.push_back(Step::Cmd {
            cmd: cmd.into(),
            reply: reply.to_vec(),
            delayed: Some((polls, late.to_vec())),
        });
    }

    pub fn expect_raw(&mut self, data: &[u8], reply: &[u8]) {
        self.steps.push_back(Step::Raw {
            data: data.to_vec(),
            reply: reply.to_vec(),
        });
    }

    pub fn push_rx(&mut self, data: &[u8]) {
        self.rx.extend(data);
    }

    /// Assert the whole script was consumed.
    pub fn done(&self) {
        assert!(
            self.steps.is_empty(),
            "unsatisfied expectations remain: {} step(s)",
            self.steps.len()
        );
    }

    fn feed(&mut self, byte: u8) {
        match self.steps.front_mut() {
            Some(Step::Cmd { cmd, .. }) => {
                if byte == b'\r' {
                    let line = core::mem::take(&mut self.line);
                    let got = String::from_utf8(line).expect("command was not utf-8");
                    assert_eq!(&got, cmd, "unexpected command");
                    if let Some(Step::Cmd { reply, delayed, .. }) = self.steps.pop_front() {
                        self.rx.extend(reply);
                        if let Some(late) = delayed {
                            self.delayed.push_back(late);
                        }
                    }
                } else {
                    self.line.push(byte);
                }
            }
            Some(Step::Raw { data, .. }) => {
                self.raw.push(byte);
                assert!(
                    data.starts_with(&self.raw),
                    "unexpected raw payload {:?}",
                    self.raw
                );
                if data.len() == self.raw.len() {
                    self.raw.clear();
                    if let Some(Step::Raw { reply, .. }) = self.steps.pop_front() {
                        self.rx.extend(reply);
                    }
                }
            }
            None => {
                if byte == b'\r' {
                    let line = core::mem::take(&mut self.line);
                    panic!("unexpected command: {:?}", String::from_utf8_lossy(&line));
                }
                self.line.push(byte);
            }
        }
    }
}

impl ErrorType for MockSerial {
    type Error = embedded_io::ErrorKind;
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &b in buf {
            self.feed(b);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if self.rx.is_empty() {
            if let Some((polls, _)) = self.delayed.front_mut() {
                if *polls == 0 {
                    if let Some((_, data)) = self.delayed.pop_front() {
                        self.rx.extend(data);
                    }
                } else {
                    *polls -= 1;
                }
            }
        }
        Ok(!self.rx.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_timer_advances_per_query() {
        let mut timer = MockTimer::new();
        let a = timer.now();
        let b = timer.now();
        assert!(b > a);
    }

    #[test]
    fn mock_serial_replies_after_full_command() {
        let mut serial = MockSerial::new();
        serial.expect_cmd("AT", b"OK");
        serial.write_all(b"AT\r").unwrap();
        let mut buf = [0u8; 2];
        assert!(serial.read_ready().unwrap());
        assert_eq!(serial.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"OK");
        serial.done();
    }
}
