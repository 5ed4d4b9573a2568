#![cfg_attr(not(test), no_std)]

//! # SIM900 GPRS
//!
//! Driver for SIMCom SIM900-family GSM/GPRS modems (SIM900, SIM908 and the
//! SIM548C found on the DFRobot GPS/GPRS shield) speaking the raw AT command
//! set over a byte serial line.
//!
//! The crate is split in two layers:
//!
//! * [`Modem`] turns a blocking byte transport ([`embedded_io::Read`] +
//!   [`embedded_io::Write`] + [`embedded_io::ReadReady`]) into a
//!   request/response AT command channel with timeout bounded receive,
//!   token matching and a small table of unsolicited-result-code handlers.
//! * [`GprsClient`] drives the modem through the multi-state GPRS attach
//!   sequence and exposes a single TCP-like socket, both through inherent
//!   methods and through [`embedded_nal::TcpClientStack`].
//!
//! Time is injected through the [`traits::Clock`] trait so that every
//! timeout is a plain deadline check against a monotonic counter; no timer
//! interrupt or async executor is required (or used).

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod client;
pub mod config;
pub mod error;
pub mod modem;
pub mod power;
pub mod socket;
pub mod traits;

#[cfg(test)]
mod test_helpers;

pub use client::GprsClient;
pub use config::{ApnInfo, NoPin};
pub use error::Error;
pub use modem::{Modem, UrcHandler};
pub use socket::{ConnectionState, SocketHandle, SocketIngress};
pub use traits::{Clock, SerialMode, SerialMux};

// Re-export the time types used in the public API
pub use fugit;

/// Prelude - Include traits
pub mod prelude {
    pub use crate::traits::{Clock, SerialMux};
    pub use embedded_nal::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpClientStack};
}
