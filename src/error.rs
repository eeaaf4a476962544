//! Crate-root error type unifying the per-module errors.
use snafu::Snafu;

/// The umbrella error type for this crate's facade-level APIs.
///
/// Module-level operations (PDU reading/writing, association negotiation,
/// DIMSE messaging) return their own `snafu`-derived error types; this type
/// exists for callers that want a single error to propagate across module
/// boundaries (for instance, via the `?` operator in application code).
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum DicomUlError {
    #[snafu(display("Could not read PDU"))]
    Read {
        #[snafu(backtrace)]
        source: crate::pdu::reader::Error,
    },
    #[snafu(display("Could not write PDU"))]
    Write {
        #[snafu(backtrace)]
        source: crate::pdu::writer::Error,
    },
    #[snafu(display("Could not negotiate or maintain association"))]
    Association {
        #[snafu(backtrace)]
        source: crate::association::Error,
    },
    #[snafu(display("DIMSE provider error"))]
    Dimse { source: crate::dimse::Error },
    #[snafu(display("Could not accept an incoming association"))]
    Listener { source: crate::listener::Error },
}

/// Type alias for a result from this crate's facade-level APIs.
pub type Result<T, E = DicomUlError> = std::result::Result<T, E>;

impl From<crate::pdu::reader::Error> for DicomUlError {
    fn from(source: crate::pdu::reader::Error) -> Self {
        DicomUlError::Read { source }
    }
}

impl From<crate::pdu::writer::Error> for DicomUlError {
    fn from(source: crate::pdu::writer::Error) -> Self {
        DicomUlError::Write { source }
    }
}

impl From<crate::association::Error> for DicomUlError {
    fn from(source: crate::association::Error) -> Self {
        DicomUlError::Association { source }
    }
}

impl From<crate::dimse::Error> for DicomUlError {
    fn from(source: crate::dimse::Error) -> Self {
        DicomUlError::Dimse { source }
    }
}

impl From<crate::listener::Error> for DicomUlError {
    fn from(source: crate::listener::Error) -> Self {
        DicomUlError::Listener { source }
    }
}
