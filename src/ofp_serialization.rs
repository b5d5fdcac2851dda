use bytes::BytesMut;

use message::Message;
use ofp_header::{OfpHeader, Xid, OFP_HEADER_LENGTH, OPENFLOW_0_01_VERSION};
use ofp_message::{MessageCodec, OfpMessage, OfpParsingError, OfpSerializationError};

/// Codec for the 0x01 wire protocol.
///
/// Frames on the standard 8-byte header. A hello from a peer speaking a
/// different version is still accepted so version negotiation can happen
/// above; any other foreign-version message, or a message with an unknown
/// type code, is skipped and logged. Only broken framing is unrecoverable.
pub struct Codec0x01;

impl MessageCodec for Codec0x01 {
    fn parse(&self, buf: &mut BytesMut) -> Result<Vec<(Xid, Message)>, OfpParsingError> {
        let mut messages = Vec::new();
        while buf.len() >= OFP_HEADER_LENGTH {
            let header = OfpHeader::parse(&buf[..OFP_HEADER_LENGTH]);
            if header.length() < OFP_HEADER_LENGTH {
                return Err(OfpParsingError::ParsingError {
                    message: format!("impossible message length {}", header.length()),
                });
            }
            if buf.len() < header.length() {
                break;
            }
            let frame = buf.split_to(header.length());
            let body = &frame[OFP_HEADER_LENGTH..];

            if header.version() != OPENFLOW_0_01_VERSION
                && header.type_code() != Some(::openflow::MsgCode::Hello)
            {
                warn!(
                    "Skipping message with unsupported version {} (type byte {})",
                    header.version(),
                    header.type_byte()
                );
                continue;
            }

            match Message::parse(&header, body) {
                Ok(parsed) => messages.push(parsed),
                Err(e) => {
                    warn!("Skipping undecodable message (xid {}): {}", header.xid(), e);
                }
            }
        }
        Ok(messages)
    }

    fn marshal(&self, xid: Xid, msg: &Message) -> Result<Vec<u8>, OfpSerializationError> {
        Message::marshal(xid, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use message::SwitchFeatures;

    fn feed(buf: &mut BytesMut, bytes: &[u8]) {
        buf.extend_from_slice(bytes);
    }

    #[test]
    fn test_parse_accumulates_partial_frames() {
        let codec = Codec0x01;
        let mut buf = BytesMut::new();
        let wire = Message::marshal(7, &Message::Hello).unwrap();

        feed(&mut buf, &wire[..3]);
        assert!(codec.parse(&mut buf).unwrap().is_empty());
        assert_eq!(buf.len(), 3);

        feed(&mut buf, &wire[3..]);
        let messages = codec.parse(&mut buf).unwrap();
        assert_eq!(messages, vec![(7, Message::Hello)]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_multiple_frames_in_order() {
        let codec = Codec0x01;
        let mut buf = BytesMut::new();
        feed(&mut buf, &Message::marshal(1, &Message::Hello).unwrap());
        feed(
            &mut buf,
            &Message::marshal(2, &Message::EchoRequest(vec![9])).unwrap(),
        );

        let messages = codec.parse(&mut buf).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, 1);
        assert_eq!(messages[1], (2, Message::EchoRequest(vec![9])));
    }

    #[test]
    fn test_parse_skips_unknown_type_code() {
        let codec = Codec0x01;
        let mut buf = BytesMut::new();
        // Valid frame with a type byte nothing understands.
        feed(&mut buf, &[1, 0x63, 0, 8, 0, 0, 0, 5]);
        feed(&mut buf, &Message::marshal(6, &Message::Hello).unwrap());

        let messages = codec.parse(&mut buf).unwrap();
        assert_eq!(messages, vec![(6, Message::Hello)]);
    }

    #[test]
    fn test_parse_rejects_broken_framing() {
        let codec = Codec0x01;
        let mut buf = BytesMut::new();
        feed(&mut buf, &[1, 0, 0, 2, 0, 0, 0, 1]);
        assert!(codec.parse(&mut buf).is_err());
    }

    #[test]
    fn test_foreign_version_hello_accepted() {
        let codec = Codec0x01;
        let mut buf = BytesMut::new();
        feed(&mut buf, &[4, 0, 0, 8, 0, 0, 0, 9]);
        let messages = codec.parse(&mut buf).unwrap();
        assert_eq!(messages, vec![(9, Message::Hello)]);
    }

    #[test]
    fn test_marshal_features_reply() {
        let codec = Codec0x01;
        let feats = SwitchFeatures {
            datapath_id: 42,
            num_buffers: 0,
            num_tables: 1,
            capabilities: 0,
            actions: 0,
        };
        let wire = codec
            .marshal(3, &Message::FeaturesReply(feats.clone()))
            .unwrap();
        assert_eq!(wire.len(), 32);

        let mut buf = BytesMut::new();
        feed(&mut buf, &wire);
        let messages = codec.parse(&mut buf).unwrap();
        assert_eq!(messages, vec![(3, Message::FeaturesReply(feats))]);
    }
}
