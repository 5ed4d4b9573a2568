use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

/// APN, user name and password used to start the GPRS task (`AT+CSTT`).
///
/// Most public APNs take empty credentials.
#[derive(Debug, Clone, Default)]
pub struct ApnInfo<'a> {
    pub apn: &'a str,
    pub user_name: &'a str,
    pub password: &'a str,
}

impl<'a> ApnInfo<'a> {
    #[must_use]
    pub fn new(apn: &'a str) -> Self {
        Self {
            apn,
            user_name: "",
            password: "",
        }
    }
}

/// Placeholder for an unconnected pin slot.
pub struct NoPin;

impl ErrorType for NoPin {
    type Error = core::convert::Infallible;
}

impl InputPin for NoPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
