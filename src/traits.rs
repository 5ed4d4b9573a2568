use fugit::TimerInstantU32;

/// Monotonic time source used for every timeout computation.
///
/// The driver never sleeps; it busy-polls this clock against a deadline.
/// Injecting the clock keeps the timeout paths testable, since a fake clock
/// can expire a window instantly.
///
/// An implementation for a `std` platform:
///
/// ```ignore
/// pub struct SysTimer {
///     start: std::time::Instant,
/// }
///
/// impl sim900_gprs::Clock<1000> for SysTimer {
///     fn now(&mut self) -> fugit::TimerInstantU32<1000> {
///         fugit::TimerInstantU32::from_ticks(self.start.elapsed().as_millis() as u32)
///     }
/// }
/// ```
pub trait Clock<const TIMER_HZ: u32> {
    fn now(&mut self) -> TimerInstantU32<TIMER_HZ>;
}

/// Which peripheral the shared serial line is routed to.
///
/// On the SIM548C shield the GSM and GPS halves share one UART through
/// tri-state buffers, so only one of them can be active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerialMode {
    External,
    Gsm,
    Gps,
}

/// Host-supplied control of the tri-state buffers multiplexing the serial
/// line. The driver only decides *when* to switch (after flushing pending
/// bytes); the pin wiggling itself belongs to the board support code.
pub trait SerialMux {
    type Error;

    fn select(&mut self, mode: SerialMode) -> Result<(), Self::Error>;
}
