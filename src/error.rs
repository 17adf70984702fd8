//! Crate-level error type, unifying the errors of [`crate::pdu`],
//! [`crate::primitives`] and [`crate::association`].

use snafu::Snafu;

/// Type alias for a result from this crate.
pub type Result<T, E = Error> = ::std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("could not decode PDU"))]
    DecodePdu {
        #[snafu(backtrace)]
        source: crate::pdu::reader::Error,
    },

    #[snafu(display("could not encode PDU"))]
    EncodePdu {
        #[snafu(backtrace)]
        source: crate::pdu::writer::Error,
    },

    #[snafu(display("invalid service parameter"))]
    InvalidArgument {
        source: crate::primitives::InvalidArgument,
    },

    #[snafu(display("association rejected by peer: {}", detail))]
    Rejected { detail: String },

    #[snafu(display("association aborted: {}", detail))]
    Aborted { detail: String },

    #[snafu(display("connection closed by peer"))]
    ConnectionClosed,

    #[snafu(display("no presentation context was accepted by the association acceptor"))]
    NoAcceptedPresentationContexts,

    #[snafu(display("protocol error: unexpected PDU in the current state"))]
    UnexpectedPdu,

    #[snafu(display("network I/O error"))]
    Io {
        source: std::io::Error,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("{}", source))]
    ClientAssociation {
        source: crate::association::client::Error,
    },

    #[snafu(display("{}", source))]
    ServerAssociation {
        source: crate::association::server::Error,
    },
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io {
            source,
            backtrace: snafu::Backtrace::new(),
        }
    }
}

/// Lets a caller use `?` against [`Result`] from requestor-side code that
/// returns [`crate::association::client::Error`], for callers that don't
/// care which layer of the association failed.
impl From<crate::association::client::Error> for Error {
    fn from(source: crate::association::client::Error) -> Self {
        Error::ClientAssociation { source }
    }
}

/// Same as the requestor-side conversion, for acceptor-side code.
impl From<crate::association::server::Error> for Error {
    fn from(source: crate::association::server::Error) -> Self {
        Error::ServerAssociation { source }
    }
}
