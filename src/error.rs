
/// Failures raised while decoding packets or driving the multicast routing socket.
#[derive(Debug)]
pub enum Error {
    /// the buffer ended before the named structure was complete
    BufferTooShort(&'static str),

    /// text is not a valid address of the requested family
    InvalidAddressFormat,

    /// raw address bytes could not be rendered as text
    AddressConversionError,

    /// a kernel call failed
    Os(std::io::Error),
}

impl Error {
    pub fn is_buffer_too_short(&self) -> bool {
        matches!(self, Error::BufferTooShort(_))
    }

    pub fn last_os_error() -> Self {
        Error::Os(std::io::Error::last_os_error())
    }
}

pub(crate) fn invalid_data(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BufferTooShort(what) => write!(f, "buffer too short: {}", what),
            Error::InvalidAddressFormat => write!(f, "invalid address format"),
            Error::AddressConversionError => write!(f, "address conversion error"),
            Error::Os(e) => write!(f, "os error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Os(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Os(e)
    }
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Os(e) => e,
            e => std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_data_keeps_the_message() {
        let e = invalid_data("phyint eth9 not defined".to_string());
        assert_eq!(e.kind(), std::io::ErrorKind::InvalidData);
        assert_eq!(e.to_string(), "phyint eth9 not defined");
    }

    #[test]
    fn display_names_the_structure() {
        let e = Error::BufferTooShort("IGMPv3 query sources");
        assert_eq!(e.to_string(), "buffer too short: IGMPv3 query sources");
        assert!(e.is_buffer_too_short());
    }

    #[test]
    fn os_error_round_trips_into_io_error() {
        let e = Error::from(std::io::Error::from_raw_os_error(libc::EADDRINUSE));
        let io: std::io::Error = e.into();
        assert_eq!(io.raw_os_error(), Some(libc::EADDRINUSE));

        let io: std::io::Error = Error::InvalidAddressFormat.into();
        assert_eq!(io.kind(), std::io::ErrorKind::InvalidData);
    }
}
