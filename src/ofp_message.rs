use bytes::BytesMut;
use std::io;

use ofp_header::{OfpHeader, Xid};
use openflow::MsgCode;

#[derive(Debug, Fail)]
pub enum OfpSerializationError {
    #[fail(display = "IO Error: {}", error)]
    IoError { error: io::Error },
    #[fail(display = "Unexpected value '{}' at field '{}' of '{}'", value, field, message)]
    UnexpectedValueError {
        value: String,
        field: String,
        message: String,
    },
    #[fail(display = "Unsupported OpenFlow message code {} for version: {}", code, version)]
    UnsupportedMessageCode { version: u8, code: MsgCode },
}

impl From<io::Error> for OfpSerializationError {
    fn from(error: io::Error) -> OfpSerializationError {
        OfpSerializationError::IoError { error }
    }
}

#[derive(Debug, Fail)]
pub enum OfpParsingError {
    #[fail(display = "IO Error: {}", error)]
    IoError { error: io::Error },
    #[fail(display = "Parsing error: {}", message)]
    ParsingError { message: String },
    #[fail(display = "Unsupported OpenFlow version: {}", version)]
    UnsupportedVersion { version: u8 },
}

impl From<io::Error> for OfpParsingError {
    fn from(error: io::Error) -> OfpParsingError {
        OfpParsingError::IoError { error }
    }
}

/// OpenFlow Message
///
/// Version-agnostic API for handling OpenFlow messages at the byte-buffer level.
pub trait OfpMessage: Sized {
    /// Return the byte-size of an `OfpMessage`.
    fn size_of(msg: &Self) -> usize;
    /// Create an `OfpHeader` for the given transaction id and OpenFlow message.
    fn header_of(xid: Xid, msg: &Self) -> OfpHeader;
    /// Return a marshaled buffer containing an OpenFlow header and the message `msg`.
    fn marshal(xid: Xid, msg: &Self) -> Result<Vec<u8>, OfpSerializationError>;
    /// Returns a pair `(Xid, OfpMessage)` of the transaction id and OpenFlow message parsed from
    /// the given OpenFlow header `header`, and buffer `buf`.
    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(Xid, Self), OfpParsingError>;
}

/// The codec boundary between the connection engine and the wire format.
///
/// A codec turns newly arrived bytes into discrete messages, leaving any
/// partial trailing message in the buffer for the next call, and turns a
/// message into its wire bytes. Streams hold a codec by `Arc` so one codec
/// instance serves every connection.
pub trait MessageCodec: Send + Sync {
    /// Decode all complete messages at the front of `buf`, consuming them.
    /// Incomplete trailing bytes are left in place. An error means framing
    /// is broken and the connection cannot be resynchronized.
    fn parse(&self, buf: &mut BytesMut) -> Result<Vec<(Xid, ::message::Message)>, OfpParsingError>;

    /// Produce the wire bytes of `msg` under transaction id `xid`.
    fn marshal(&self, xid: Xid, msg: &::message::Message) -> Result<Vec<u8>, OfpSerializationError>;
}
