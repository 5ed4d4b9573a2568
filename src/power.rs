use embedded_hal::{delay::DelayNs, digital::OutputPin};

/// Pulse the modem power key.
///
/// The SIM900 family toggles between powered-down and powered-up on a
/// roughly two second high pulse of the PWRKEY line. The same pulse turns
/// the module off again, so callers should probe with
/// [`Modem::is_modem_ready`](crate::Modem::is_modem_ready) afterwards
/// instead of assuming a power state.
pub fn power_toggle<P, D>(pwr: &mut P, delay: &mut D) -> Result<(), P::Error>
where
    P: OutputPin,
    D: DelayNs,
{
    pwr.set_high()?;
    delay.delay_ms(2000);
    pwr.set_low()
}
