//! GPRS attach and the single TCP-like socket.
//!
//! [`GprsClient`] owns the [`Modem`] engine and drives it through the
//! `AT+CIPSTATUS` state walk until the IP stack is up, then opens one TCP
//! connection with `AT+CIPSTART`. Inbound payload arrives asynchronously as
//! `+IPD` notifications and is delivered through the engine's callback
//! table into the client's receive ring; see [`SocketIngress`].

use core::cell::RefCell;
use core::fmt::Write as _;

use embedded_io::{Read, ReadReady, Write};
use embedded_nal::{Ipv4Addr, SocketAddr, TcpClientStack};
use fugit::ExtU32;
use heapless::String;

use crate::config::ApnInfo;
use crate::error::Error;
use crate::modem::Modem;
use crate::socket::{ConnectionState, SocketHandle, SocketIngress, GPRS_BUFFER_SIZE};
use crate::traits::Clock;

// Bounded waits for the slow transitions, in receive cycles. With the
// default 1 s first-byte window these come out near the module's documented
// worst cases.
const CIICR_TRIES: usize = 10;
const CONNECT_TRIES: usize = 20;
const SEND_TRIES: usize = 30;
const CLOSE_TRIES: usize = 5;

/// A TCP-like socket over the modem's GPRS stack.
///
/// The receive ring lives in a caller-owned [`SocketIngress`] cell so the
/// engine's callback table and the client can share it:
///
/// ```ignore
/// let ingress = RefCell::new(SocketIngress::new());
/// let modem = Modem::new(serial, timer);
/// let mut client = GprsClient::new(modem, &ingress, ApnInfo::new("internet"));
/// ```
pub struct GprsClient<'a, T, CLK, const TIMER_HZ: u32, const N: usize = GPRS_BUFFER_SIZE> {
    gsm: Modem<'a, T, CLK, TIMER_HZ>,
    ingress: &'a RefCell<SocketIngress<N>>,
    apn: ApnInfo<'a>,
    connected: bool,
    in_loop: bool,
    socket_taken: bool,
}

impl<'a, T, CLK, const TIMER_HZ: u32, const N: usize> GprsClient<'a, T, CLK, TIMER_HZ, N>
where
    T: Read + Write + ReadReady,
    CLK: Clock<TIMER_HZ>,
{
    pub fn new(
        gsm: Modem<'a, T, CLK, TIMER_HZ>,
        ingress: &'a RefCell<SocketIngress<N>>,
        apn: ApnInfo<'a>,
    ) -> Self {
        Self {
            gsm,
            ingress,
            apn,
            connected: false,
            in_loop: false,
            socket_taken: false,
        }
    }

    /// The underlying engine, for readiness probes and IMEI queries.
    pub fn modem(&mut self) -> &mut Modem<'a, T, CLK, TIMER_HZ> {
        &mut self.gsm
    }

    /// Define the PDP context and switch on `+IPD` headers for inbound
    /// data. Call once after the modem reports ready.
    pub fn configure(&mut self) -> Result<(), Error> {
        let mut cmd: String<64> = String::new();
        write!(cmd, "AT+CGDCONT=1,\"IP\",\"{}\"", self.apn.apn).map_err(|_| Error::Overflow)?;
        self.gsm.send_recv(&cmd)?;
        self.gsm.send_recv("AT+CIPHEAD=1")?;
        Ok(())
    }

    /// Query `AT+CIPSTATUS` and parse the `STATE:` line.
    fn status(&mut self) -> Result<ConnectionState, Error> {
        self.gsm.send_recv("AT+CIPSTATUS")?;
        let Some(at) = self.gsm.find(b"STATE: ") else {
            return Ok(ConnectionState::Unknown);
        };
        let tail = &self.gsm.buffer()[at + 7..];
        let end = tail.iter().position(|&b| b == b'\r').unwrap_or(tail.len());
        Ok(ConnectionState::from_status(&tail[..end]))
    }

    /// Walk the IP stack up to a state a connection can be opened from.
    ///
    /// Each step re-queries the status and issues only the command that
    /// state calls for, so an already-attached modem passes straight
    /// through with no transition commands at all.
    pub fn attach(&mut self) -> Result<(), Error> {
        if !self.gsm.is_registered() {
            return Err(Error::NotRegistered);
        }
        if !self.gsm.is_attached() {
            return Err(Error::NotAttached);
        }

        let mut state = self.status()?;

        if matches!(
            state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            // A live connection right after startup means the MCU was hot
            // reset under an open socket; close it and start over
            warn!("stale connection found, closing");
            self.connected = true;
            self.stop()?;
            state = self.status()?;
        }

        if state == ConnectionState::Closed {
            return Ok(());
        }

        if state == ConnectionState::Deactivated {
            self.gsm
                .send_recv_until_tries("AT+CIPSHUT", CLOSE_TRIES, &[b"SHUT OK", b"ERROR"])?;
            state = self.status()?;
        }

        if state == ConnectionState::Initial {
            let mut cmd: String<96> = String::new();
            write!(
                cmd,
                "AT+CSTT=\"{}\",\"{}\",\"{}\"",
                self.apn.apn, self.apn.user_name, self.apn.password
            )
            .map_err(|_| Error::Overflow)?;
            if self.gsm.send_recv_until(&cmd, &[b"OK"])?.is_none() {
                return Err(Error::AttachFailed);
            }
            state = self.status()?;
        }

        if state == ConnectionState::Start {
            if self
                .gsm
                .send_recv_until_tries("AT+CIICR", CIICR_TRIES, &[b"OK", b"ERROR"])?
                != Some(0)
            {
                return Err(Error::AttachFailed);
            }
            state = self.status()?;
        }

        while state == ConnectionState::Config {
            // Address allocation in progress; poll once a second
            self.gsm.wait(1_000.millis());
            state = self.status()?;
        }

        if state == ConnectionState::Activated {
            // Querying the local address is what moves the stack on; any
            // dotted quad in the reply will do
            if self.gsm.send_recv_until("AT+CIFSR", &[b"."])?.is_none() {
                return Err(Error::AttachFailed);
            }
            state = self.status()?;
        }

        if state == ConnectionState::Ready {
            Ok(())
        } else {
            Err(Error::AttachFailed)
        }
    }

    /// Attach and open a TCP connection to `ip:port`.
    pub fn connect(&mut self, ip: Ipv4Addr, port: u16) -> Result<(), Error> {
        if self.attach().is_err() {
            // One recovery pass: tear the IP stack down and redo the attach
            self.gsm
                .send_recv_until_tries("AT+CIPSHUT", CLOSE_TRIES, &[b"SHUT OK", b"ERROR"])?;
            self.attach()?;
        }

        let mut cmd: String<64> = String::new();
        let [a, b, c, d] = ip.octets();
        write!(cmd, "AT+CIPSTART=\"TCP\",\"{a}.{b}.{c}.{d}\",\"{port}\"")
            .map_err(|_| Error::Overflow)?;
        if self.gsm.send_recv_until(&cmd, &[b"OK"])?.is_none() {
            return Err(Error::ConnectFailed);
        }

        match self
            .gsm
            .recv_until_tries(CONNECT_TRIES, &[b"CONNECT OK", b"CONNECT FAIL"])
        {
            Some(0) => {
                self.ingress.borrow_mut().reset();
                self.gsm.set_callback(0, b"+IPD", self.ingress);
                self.connected = true;
                info!("connected to {:?}:{:?}", ip.octets(), port);
                Ok(())
            }
            _ => Err(Error::ConnectFailed),
        }
    }

    /// Send `data` over the open connection.
    ///
    /// Any failure along the way (no send prompt, SEND FAIL, ERROR) closes
    /// the connection, so a later [`connected`](Self::connected) reflects
    /// reality without a separate health check.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        if !self.connected {
            return Err(Error::SocketClosed);
        }

        let mut cmd: String<20> = String::new();
        write!(cmd, "AT+CIPSEND={}", data.len()).map_err(|_| Error::Overflow)?;
        self.gsm.send(&cmd)?;
        if self.gsm.recv_until(&[b"> "]).is_none() {
            // Modem never opened the payload window
            self.stop()?;
            return Err(Error::Timeout);
        }
        self.gsm.write_raw(data)?;

        if self
            .gsm
            .recv_until_tries(SEND_TRIES, &[b"SEND OK", b"SEND FAIL", b"ERROR"])
            == Some(0)
        {
            Ok(data.len())
        } else {
            warn!("send failed, closing");
            self.stop()?;
            Err(Error::SendFailed)
        }
    }

    /// Bytes buffered for reading. Pumps the engine once (non-reentrantly)
    /// so freshly arrived notifications are counted.
    pub fn available(&mut self) -> usize {
        if !self.in_loop {
            self.in_loop = true;
            self.gsm.spin();
            self.in_loop = false;
        }
        self.ingress.borrow().len()
    }

    /// Read one byte, or `None` when the ring is empty.
    pub fn read(&mut self) -> Option<u8> {
        if self.available() == 0 {
            return None;
        }
        self.ingress.borrow_mut().dequeue()
    }

    /// Read up to `buf.len()` bytes; returns how many were read.
    pub fn read_slice(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            match self.read() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    pub fn peek(&mut self) -> Option<u8> {
        if self.available() == 0 {
            return None;
        }
        self.ingress.borrow().peek()
    }

    /// Close the connection. The socket is marked disconnected whatever the
    /// close command comes back with.
    pub fn stop(&mut self) -> Result<(), Error> {
        if self.connected {
            self.connected = false;
            self.gsm.clear_callback(0);
            self.gsm
                .send_recv_until_tries("AT+CIPCLOSE", CLOSE_TRIES, &[b"CLOSE OK", b"ERROR"])?;
        }
        Ok(())
    }

    pub fn connected(&self) -> bool {
        self.connected
    }
}

impl<'a, T, CLK, const TIMER_HZ: u32, const N: usize> TcpClientStack
    for GprsClient<'a, T, CLK, TIMER_HZ, N>
where
    T: Read + Write + ReadReady,
    CLK: Clock<TIMER_HZ>,
{
    type TcpSocket = SocketHandle;
    type Error = Error;

    // The module runs a single connection in non-multiplexed mode, so there
    // is exactly one socket to hand out.
    fn socket(&mut self) -> Result<Self::TcpSocket, Self::Error> {
        if self.socket_taken {
            return Err(Error::SocketSetFull);
        }
        self.socket_taken = true;
        Ok(SocketHandle(0))
    }

    fn connect(
        &mut self,
        _socket: &mut Self::TcpSocket,
        remote: SocketAddr,
    ) -> nb::Result<(), Self::Error> {
        match remote {
            SocketAddr::V4(addr) => {
                GprsClient::connect(self, *addr.ip(), addr.port()).map_err(nb::Error::Other)
            }
            SocketAddr::V6(_) => Err(nb::Error::Other(Error::Unaddressable)),
        }
    }

    fn send(
        &mut self,
        _socket: &mut Self::TcpSocket,
        buffer: &[u8],
    ) -> nb::Result<usize, Self::Error> {
        self.write(buffer).map_err(nb::Error::Other)
    }

    fn receive(
        &mut self,
        _socket: &mut Self::TcpSocket,
        buffer: &mut [u8],
    ) -> nb::Result<usize, Self::Error> {
        if !self.connected && self.available() == 0 {
            return Err(nb::Error::Other(Error::SocketClosed));
        }
        let n = self.read_slice(buffer);
        if n == 0 {
            return Err(nb::Error::WouldBlock);
        }
        Ok(n)
    }

    fn close(&mut self, _socket: Self::TcpSocket) -> Result<(), Self::Error> {
        self.socket_taken = false;
        self.stop()
    }
}
