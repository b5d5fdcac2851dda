use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use rust_ofc::openflow::MsgCode;

pub const OFP_HEADER_LENGTH: usize = 8;

pub type Xid = u32;

pub const OPENFLOW_0_01_VERSION: u8 = 1; // 1.0

/// OpenFlow Header
///
/// The first fields of every OpenFlow message, no matter the protocol version.
/// This is parsed to determine version and length of the remaining message, so that
/// it can be properly handled.
#[derive(Debug, Clone)]
pub struct OfpHeader {
    version: u8,
    typ: u8,
    length: u16,
    xid: u32,
}

impl OfpHeader {
    /// Create an `OfpHeader` out of the arguments.
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> OfpHeader {
        OfpHeader {
            version,
            typ,
            length,
            xid,
        }
    }

    /// Return the byte-size of an `OfpHeader`.
    pub fn size() -> usize {
        OFP_HEADER_LENGTH
    }

    /// Fills a message buffer with the header fields of an `OfpHeader`.
    pub fn marshal(bytes: &mut Vec<u8>, header: &OfpHeader) {
        bytes.push(header.version());
        bytes.push(header.typ);
        bytes.write_u16::<BigEndian>(header.length() as u16).unwrap();
        bytes.write_u32::<BigEndian>(header.xid()).unwrap();
    }

    /// Takes a message buffer (sized for an `OfpHeader`) and returns an `OfpHeader`.
    pub fn parse(buf: &[u8]) -> Self {
        let mut bytes = Cursor::new(buf);
        OfpHeader::parse_from_cursor(&mut bytes)
    }

    pub fn parse_from_cursor(bytes: &mut Cursor<&[u8]>) -> Self {
        OfpHeader {
            version: bytes.read_u8().unwrap(),
            typ: bytes.read_u8().unwrap(),
            length: bytes.read_u16::<BigEndian>().unwrap(),
            xid: bytes.read_u32::<BigEndian>().unwrap(),
        }
    }

    /// Return the `version` field of a header.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Return the OpenFlow message type code of a header, or `None` for a
    /// code this controller does not know.
    pub fn type_code(&self) -> Option<MsgCode> {
        MsgCode::from_u8(self.typ)
    }

    /// Return the raw `type` byte of a header.
    pub fn type_byte(&self) -> u8 {
        self.typ
    }

    /// Return the `length` field of a header. Includes the length of the header itself.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Return the `xid` field of a header, the transaction id associated with this packet.
    ///  Replies use the same id to facilitate pairing.
    pub fn xid(&self) -> u32 {
        self.xid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marshal_parse_round_trip() {
        let header = OfpHeader::new(OPENFLOW_0_01_VERSION, MsgCode::Hello as u8, 8, 0x12345678);
        let mut bytes = Vec::new();
        OfpHeader::marshal(&mut bytes, &header);
        assert_eq!(bytes, vec![1, 0, 0, 8, 0x12, 0x34, 0x56, 0x78]);

        let parsed = OfpHeader::parse(&bytes);
        assert_eq!(parsed.version(), OPENFLOW_0_01_VERSION);
        assert_eq!(parsed.type_code(), Some(MsgCode::Hello));
        assert_eq!(parsed.length(), 8);
        assert_eq!(parsed.xid(), 0x12345678);
    }

    #[test]
    fn test_unknown_type_code() {
        let header = OfpHeader::new(OPENFLOW_0_01_VERSION, 0x77, 8, 1);
        assert_eq!(header.type_code(), None);
        assert_eq!(header.type_byte(), 0x77);
    }
}
