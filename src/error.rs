#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// No matching token arrived within the allotted window
    Timeout,
    /// The byte transport failed a read or write
    Transport,
    /// A formatted command did not fit its buffer
    Overflow,
    /// The modem answered, but not with anything we can use
    InvalidResponse,

    // Network errors
    NotRegistered,
    NotAttached,
    AttachFailed,
    ConnectFailed,
    SendFailed,

    // Socket errors
    SocketClosed,
    SocketSetFull,
    Unaddressable,

    IoPin,
}

impl embedded_nal::TcpError for Error {
    fn kind(&self) -> embedded_nal::TcpErrorKind {
        match self {
            Self::SocketClosed => embedded_nal::TcpErrorKind::PipeClosed,
            _ => embedded_nal::TcpErrorKind::Other,
        }
    }
}
