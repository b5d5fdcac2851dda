use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

use ofp_header::{OfpHeader, Xid, OFP_HEADER_LENGTH, OPENFLOW_0_01_VERSION};
use ofp_message::{OfpMessage, OfpParsingError, OfpSerializationError};
use openflow::MsgCode;

/// Wildcard table id used when a request addresses every table.
pub const ALL_TABLES: u8 = 0xff;

/// Sentinel for "no buffer id" / "no output port" fields on the wire.
const NO_BUFFER: u32 = 0xffff_ffff;
const NO_PORT: u16 = 0xffff;

/// Flag set on a statistics reply when more reply fragments follow.
pub const REPLY_MORE: u16 = 0x0001;

/// Miss-send length the controller asserts so packet-ins carry full packets.
pub const FULL_PACKET_MISS_LENGTH: u16 = 0xffff;

/// Switch features, learned from the features (identity) reply.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub num_buffers: u32,
    pub num_tables: u8,
    pub capabilities: u32,
    pub actions: u32,
}

/// Switch configuration, asserted by the controller and echoed in config replies.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

/// A protocol error reported by the remote switch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ErrorMsg {
    pub err_type: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

/// A packet forwarded to the controller by a switch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PacketIn {
    pub buffer_id: Option<u32>,
    pub total_len: u16,
    pub port: u16,
    pub reason: u8,
    pub payload: Vec<u8>,
}

/// Type of modification to perform on a flow table.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FlowModCmd {
    AddFlow,
    ModFlow,
    ModStrictFlow,
    DeleteFlow,
    DeleteStrictFlow,
}

impl FlowModCmd {
    fn from_u16(value: u16) -> Option<FlowModCmd> {
        match value {
            0 => Some(FlowModCmd::AddFlow),
            1 => Some(FlowModCmd::ModFlow),
            2 => Some(FlowModCmd::ModStrictFlow),
            3 => Some(FlowModCmd::DeleteFlow),
            4 => Some(FlowModCmd::DeleteStrictFlow),
            _ => None,
        }
    }
}

/// Represents modifications to a flow table from the controller.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowMod {
    pub command: FlowModCmd,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub cookie: u64,
    pub out_port: Option<u16>,
}

impl FlowMod {
    /// The wildcard delete that clears all flow state a switch may still
    /// carry from a previous controller session.
    pub fn delete_all() -> FlowMod {
        FlowMod {
            command: FlowModCmd::DeleteFlow,
            priority: 0,
            idle_timeout: 0,
            hard_timeout: 0,
            cookie: 0,
            out_port: None,
        }
    }
}

/// Subject of a statistics request/reply.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StatsReqType {
    Desc,
    Flow,
    Aggregate,
    Table,
    Port,
    Queue,
    Vendor,
}

impl StatsReqType {
    fn to_u16(self) -> u16 {
        match self {
            StatsReqType::Desc => 0,
            StatsReqType::Flow => 1,
            StatsReqType::Aggregate => 2,
            StatsReqType::Table => 3,
            StatsReqType::Port => 4,
            StatsReqType::Queue => 5,
            StatsReqType::Vendor => 0xffff,
        }
    }

    fn from_u16(value: u16) -> Option<StatsReqType> {
        match value {
            0 => Some(StatsReqType::Desc),
            1 => Some(StatsReqType::Flow),
            2 => Some(StatsReqType::Aggregate),
            3 => Some(StatsReqType::Table),
            4 => Some(StatsReqType::Port),
            5 => Some(StatsReqType::Queue),
            0xffff => Some(StatsReqType::Vendor),
            _ => None,
        }
    }
}

/// Request-specific parameters of a statistics request.
#[derive(Clone, Debug, PartialEq)]
pub enum StatsReqBody {
    None,
    FlowStatsBody { table_id: u8, out_port: u16 },
    PortBody { port_no: u16 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct StatsReq {
    pub req_type: StatsReqType,
    pub flags: u16,
    pub body: StatsReqBody,
}

impl StatsReq {
    pub fn all_flows() -> StatsReq {
        StatsReq {
            req_type: StatsReqType::Flow,
            flags: 0,
            body: StatsReqBody::FlowStatsBody {
                table_id: ALL_TABLES,
                out_port: NO_PORT,
            },
        }
    }

    pub fn all_ports() -> StatsReq {
        StatsReq {
            req_type: StatsReqType::Port,
            flags: 0,
            body: StatsReqBody::PortBody { port_no: NO_PORT },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlowStats {
    pub table_id: u8,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub duration_sec: u32,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PortStats {
    pub port_no: u16,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
}

/// One statistics entry of a reply fragment.
#[derive(Clone, Debug, PartialEq)]
pub enum Statistic {
    Flow(FlowStats),
    Port(PortStats),
}

#[derive(Clone, Debug, PartialEq)]
pub struct StatsResp {
    pub req_type: StatsReqType,
    pub flags: u16,
    pub stats: Vec<Statistic>,
}

impl StatsResp {
    /// True when further reply fragments for the same transaction follow.
    pub fn more_replies(&self) -> bool {
        self.flags & REPLY_MORE != 0
    }
}

const FLOW_STATS_LENGTH: usize = 36;
const PORT_STATS_LENGTH: usize = 56;

/// Abstractions of OpenFlow messages mediating between the controller and
/// the wire. The variants the connection engine itself acts on are spelled
/// out; anything else a switch may send travels as `Other` and is routed to
/// listeners by its type code.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Hello,
    Error(ErrorMsg),
    EchoRequest(Vec<u8>),
    EchoReply(Vec<u8>),
    FeaturesReq,
    FeaturesReply(SwitchFeatures),
    GetConfigReq,
    ConfigReply(SwitchConfig),
    SetConfig(SwitchConfig),
    PacketIn(PacketIn),
    FlowMod(FlowMod),
    StatsRequest(StatsReq),
    StatsReply(StatsResp),
    Other { code: MsgCode, body: Vec<u8> },
}

impl Message {
    /// Map a `Message` to its OpenFlow message type code.
    pub fn msg_code(&self) -> MsgCode {
        match *self {
            Message::Hello => MsgCode::Hello,
            Message::Error(_) => MsgCode::Error,
            Message::EchoRequest(_) => MsgCode::EchoReq,
            Message::EchoReply(_) => MsgCode::EchoResp,
            Message::FeaturesReq => MsgCode::FeaturesReq,
            Message::FeaturesReply(_) => MsgCode::FeaturesResp,
            Message::GetConfigReq => MsgCode::GetConfigReq,
            Message::ConfigReply(_) => MsgCode::GetConfigResp,
            Message::SetConfig(_) => MsgCode::SetConfig,
            Message::PacketIn(_) => MsgCode::PacketIn,
            Message::FlowMod(_) => MsgCode::FlowMod,
            Message::StatsRequest(_) => MsgCode::StatsReq,
            Message::StatsReply(_) => MsgCode::StatsResp,
            Message::Other { code, .. } => code,
        }
    }

    fn body_size(msg: &Message) -> usize {
        match *msg {
            Message::Hello | Message::FeaturesReq | Message::GetConfigReq => 0,
            Message::Error(ref err) => 4 + err.data.len(),
            Message::EchoRequest(ref data) | Message::EchoReply(ref data) => data.len(),
            Message::FeaturesReply(_) => 24,
            Message::ConfigReply(_) | Message::SetConfig(_) => 4,
            Message::PacketIn(ref pkt) => 10 + pkt.payload.len(),
            Message::FlowMod(_) => 20,
            Message::StatsRequest(ref req) => {
                4 + match req.body {
                    StatsReqBody::None => 0,
                    StatsReqBody::FlowStatsBody { .. } => 4,
                    StatsReqBody::PortBody { .. } => 4,
                }
            }
            Message::StatsReply(ref resp) => {
                4 + resp
                    .stats
                    .iter()
                    .map(|s| match *s {
                        Statistic::Flow(_) => FLOW_STATS_LENGTH,
                        Statistic::Port(_) => PORT_STATS_LENGTH,
                    })
                    .sum::<usize>()
            }
            Message::Other { ref body, .. } => body.len(),
        }
    }

    fn marshal_body(msg: &Message, bytes: &mut Vec<u8>) -> Result<(), OfpSerializationError> {
        match *msg {
            Message::Hello | Message::FeaturesReq | Message::GetConfigReq => {}
            Message::Error(ref err) => {
                bytes.write_u16::<BigEndian>(err.err_type)?;
                bytes.write_u16::<BigEndian>(err.code)?;
                bytes.extend_from_slice(&err.data);
            }
            Message::EchoRequest(ref data) | Message::EchoReply(ref data) => {
                bytes.extend_from_slice(data);
            }
            Message::FeaturesReply(ref feats) => {
                bytes.write_u64::<BigEndian>(feats.datapath_id)?;
                bytes.write_u32::<BigEndian>(feats.num_buffers)?;
                bytes.write_u8(feats.num_tables)?;
                write_padding_bytes(bytes, 3);
                bytes.write_u32::<BigEndian>(feats.capabilities)?;
                bytes.write_u32::<BigEndian>(feats.actions)?;
            }
            Message::ConfigReply(ref config) | Message::SetConfig(ref config) => {
                bytes.write_u16::<BigEndian>(config.flags)?;
                bytes.write_u16::<BigEndian>(config.miss_send_len)?;
            }
            Message::PacketIn(ref pkt) => {
                bytes.write_u32::<BigEndian>(pkt.buffer_id.unwrap_or(NO_BUFFER))?;
                bytes.write_u16::<BigEndian>(pkt.total_len)?;
                bytes.write_u16::<BigEndian>(pkt.port)?;
                bytes.write_u8(pkt.reason)?;
                write_padding_bytes(bytes, 1);
                bytes.extend_from_slice(&pkt.payload);
            }
            Message::FlowMod(ref fm) => {
                bytes.write_u16::<BigEndian>(fm.command as u16)?;
                bytes.write_u16::<BigEndian>(fm.priority)?;
                bytes.write_u16::<BigEndian>(fm.idle_timeout)?;
                bytes.write_u16::<BigEndian>(fm.hard_timeout)?;
                bytes.write_u64::<BigEndian>(fm.cookie)?;
                bytes.write_u16::<BigEndian>(fm.out_port.unwrap_or(NO_PORT))?;
                write_padding_bytes(bytes, 2);
            }
            Message::StatsRequest(ref req) => {
                bytes.write_u16::<BigEndian>(req.req_type.to_u16())?;
                bytes.write_u16::<BigEndian>(req.flags)?;
                match req.body {
                    StatsReqBody::None => {}
                    StatsReqBody::FlowStatsBody { table_id, out_port } => {
                        bytes.write_u8(table_id)?;
                        write_padding_bytes(bytes, 1);
                        bytes.write_u16::<BigEndian>(out_port)?;
                    }
                    StatsReqBody::PortBody { port_no } => {
                        bytes.write_u16::<BigEndian>(port_no)?;
                        write_padding_bytes(bytes, 2);
                    }
                }
            }
            Message::StatsReply(ref resp) => {
                bytes.write_u16::<BigEndian>(resp.req_type.to_u16())?;
                bytes.write_u16::<BigEndian>(resp.flags)?;
                for stat in &resp.stats {
                    match *stat {
                        Statistic::Flow(ref flow) => {
                            bytes.write_u8(flow.table_id)?;
                            write_padding_bytes(bytes, 1);
                            bytes.write_u16::<BigEndian>(flow.priority)?;
                            bytes.write_u16::<BigEndian>(flow.idle_timeout)?;
                            bytes.write_u16::<BigEndian>(flow.hard_timeout)?;
                            bytes.write_u32::<BigEndian>(flow.duration_sec)?;
                            bytes.write_u64::<BigEndian>(flow.cookie)?;
                            bytes.write_u64::<BigEndian>(flow.packet_count)?;
                            bytes.write_u64::<BigEndian>(flow.byte_count)?;
                        }
                        Statistic::Port(ref port) => {
                            bytes.write_u16::<BigEndian>(port.port_no)?;
                            write_padding_bytes(bytes, 6);
                            bytes.write_u64::<BigEndian>(port.rx_packets)?;
                            bytes.write_u64::<BigEndian>(port.tx_packets)?;
                            bytes.write_u64::<BigEndian>(port.rx_bytes)?;
                            bytes.write_u64::<BigEndian>(port.tx_bytes)?;
                            bytes.write_u64::<BigEndian>(port.rx_errors)?;
                            bytes.write_u64::<BigEndian>(port.tx_errors)?;
                        }
                    }
                }
            }
            Message::Other { ref body, .. } => {
                bytes.extend_from_slice(body);
            }
        }
        Ok(())
    }

    fn parse_body(code: MsgCode, buf: &[u8]) -> Result<Message, OfpParsingError> {
        let mut bytes = Cursor::new(buf);
        let message = match code {
            MsgCode::Hello => Message::Hello,
            MsgCode::Error => {
                let err_type = bytes.read_u16::<BigEndian>()?;
                let err_code = bytes.read_u16::<BigEndian>()?;
                Message::Error(ErrorMsg {
                    err_type,
                    code: err_code,
                    data: remaining_bytes(&mut bytes),
                })
            }
            MsgCode::EchoReq => Message::EchoRequest(buf.to_vec()),
            MsgCode::EchoResp => Message::EchoReply(buf.to_vec()),
            MsgCode::FeaturesReq => Message::FeaturesReq,
            MsgCode::FeaturesResp => {
                let datapath_id = bytes.read_u64::<BigEndian>()?;
                let num_buffers = bytes.read_u32::<BigEndian>()?;
                let num_tables = bytes.read_u8()?;
                skip_bytes(&mut bytes, 3)?;
                let capabilities = bytes.read_u32::<BigEndian>()?;
                let actions = bytes.read_u32::<BigEndian>()?;
                Message::FeaturesReply(SwitchFeatures {
                    datapath_id,
                    num_buffers,
                    num_tables,
                    capabilities,
                    actions,
                })
            }
            MsgCode::GetConfigReq => Message::GetConfigReq,
            MsgCode::GetConfigResp => {
                let flags = bytes.read_u16::<BigEndian>()?;
                let miss_send_len = bytes.read_u16::<BigEndian>()?;
                Message::ConfigReply(SwitchConfig {
                    flags,
                    miss_send_len,
                })
            }
            MsgCode::SetConfig => {
                let flags = bytes.read_u16::<BigEndian>()?;
                let miss_send_len = bytes.read_u16::<BigEndian>()?;
                Message::SetConfig(SwitchConfig {
                    flags,
                    miss_send_len,
                })
            }
            MsgCode::PacketIn => {
                let buffer_id = bytes.read_u32::<BigEndian>()?;
                let total_len = bytes.read_u16::<BigEndian>()?;
                let port = bytes.read_u16::<BigEndian>()?;
                let reason = bytes.read_u8()?;
                skip_bytes(&mut bytes, 1)?;
                Message::PacketIn(PacketIn {
                    buffer_id: if buffer_id == NO_BUFFER {
                        None
                    } else {
                        Some(buffer_id)
                    },
                    total_len,
                    port,
                    reason,
                    payload: remaining_bytes(&mut bytes),
                })
            }
            MsgCode::FlowMod => {
                let command_raw = bytes.read_u16::<BigEndian>()?;
                let command = FlowModCmd::from_u16(command_raw).ok_or_else(|| {
                    OfpParsingError::ParsingError {
                        message: format!("unknown flow mod command {}", command_raw),
                    }
                })?;
                let priority = bytes.read_u16::<BigEndian>()?;
                let idle_timeout = bytes.read_u16::<BigEndian>()?;
                let hard_timeout = bytes.read_u16::<BigEndian>()?;
                let cookie = bytes.read_u64::<BigEndian>()?;
                let out_port = bytes.read_u16::<BigEndian>()?;
                skip_bytes(&mut bytes, 2)?;
                Message::FlowMod(FlowMod {
                    command,
                    priority,
                    idle_timeout,
                    hard_timeout,
                    cookie,
                    out_port: if out_port == NO_PORT {
                        None
                    } else {
                        Some(out_port)
                    },
                })
            }
            MsgCode::StatsReq => {
                let type_raw = bytes.read_u16::<BigEndian>()?;
                let req_type = StatsReqType::from_u16(type_raw).ok_or_else(|| {
                    OfpParsingError::ParsingError {
                        message: format!("unknown statistics request type {}", type_raw),
                    }
                })?;
                let flags = bytes.read_u16::<BigEndian>()?;
                let body = match req_type {
                    StatsReqType::Flow => {
                        let table_id = bytes.read_u8()?;
                        skip_bytes(&mut bytes, 1)?;
                        let out_port = bytes.read_u16::<BigEndian>()?;
                        StatsReqBody::FlowStatsBody { table_id, out_port }
                    }
                    StatsReqType::Port => {
                        let port_no = bytes.read_u16::<BigEndian>()?;
                        skip_bytes(&mut bytes, 2)?;
                        StatsReqBody::PortBody { port_no }
                    }
                    _ => StatsReqBody::None,
                };
                Message::StatsRequest(StatsReq {
                    req_type,
                    flags,
                    body,
                })
            }
            MsgCode::StatsResp => {
                let type_raw = bytes.read_u16::<BigEndian>()?;
                let req_type = StatsReqType::from_u16(type_raw).ok_or_else(|| {
                    OfpParsingError::ParsingError {
                        message: format!("unknown statistics reply type {}", type_raw),
                    }
                })?;
                let flags = bytes.read_u16::<BigEndian>()?;
                let mut stats = Vec::new();
                match req_type {
                    StatsReqType::Flow => {
                        while (bytes.position() as usize) + FLOW_STATS_LENGTH <= buf.len() {
                            let table_id = bytes.read_u8()?;
                            skip_bytes(&mut bytes, 1)?;
                            let priority = bytes.read_u16::<BigEndian>()?;
                            let idle_timeout = bytes.read_u16::<BigEndian>()?;
                            let hard_timeout = bytes.read_u16::<BigEndian>()?;
                            let duration_sec = bytes.read_u32::<BigEndian>()?;
                            let cookie = bytes.read_u64::<BigEndian>()?;
                            let packet_count = bytes.read_u64::<BigEndian>()?;
                            let byte_count = bytes.read_u64::<BigEndian>()?;
                            stats.push(Statistic::Flow(FlowStats {
                                table_id,
                                priority,
                                idle_timeout,
                                hard_timeout,
                                duration_sec,
                                cookie,
                                packet_count,
                                byte_count,
                            }));
                        }
                    }
                    StatsReqType::Port => {
                        while (bytes.position() as usize) + PORT_STATS_LENGTH <= buf.len() {
                            let port_no = bytes.read_u16::<BigEndian>()?;
                            skip_bytes(&mut bytes, 6)?;
                            let rx_packets = bytes.read_u64::<BigEndian>()?;
                            let tx_packets = bytes.read_u64::<BigEndian>()?;
                            let rx_bytes = bytes.read_u64::<BigEndian>()?;
                            let tx_bytes = bytes.read_u64::<BigEndian>()?;
                            let rx_errors = bytes.read_u64::<BigEndian>()?;
                            let tx_errors = bytes.read_u64::<BigEndian>()?;
                            stats.push(Statistic::Port(PortStats {
                                port_no,
                                rx_packets,
                                tx_packets,
                                rx_bytes,
                                tx_bytes,
                                rx_errors,
                                tx_errors,
                            }));
                        }
                    }
                    _ => {}
                }
                Message::StatsReply(StatsResp {
                    req_type,
                    flags,
                    stats,
                })
            }
            code => Message::Other {
                code,
                body: buf.to_vec(),
            },
        };
        Ok(message)
    }
}

impl OfpMessage for Message {
    fn size_of(msg: &Message) -> usize {
        OFP_HEADER_LENGTH + Message::body_size(msg)
    }

    fn header_of(xid: Xid, msg: &Message) -> OfpHeader {
        OfpHeader::new(
            OPENFLOW_0_01_VERSION,
            msg.msg_code() as u8,
            Message::size_of(msg) as u16,
            xid,
        )
    }

    fn marshal(xid: Xid, msg: &Message) -> Result<Vec<u8>, OfpSerializationError> {
        let header = Message::header_of(xid, msg);
        let mut bytes = Vec::with_capacity(header.length());
        OfpHeader::marshal(&mut bytes, &header);
        Message::marshal_body(msg, &mut bytes)?;
        Ok(bytes)
    }

    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(Xid, Message), OfpParsingError> {
        let code = match header.type_code() {
            Some(code) => code,
            None => {
                return Err(OfpParsingError::ParsingError {
                    message: format!("unknown message type code {}", header.type_byte()),
                })
            }
        };
        let message = Message::parse_body(code, buf)?;
        Ok((header.xid(), message))
    }
}

fn write_padding_bytes(bytes: &mut Vec<u8>, count: usize) {
    for _ in 0..count {
        bytes.push(0);
    }
}

fn skip_bytes(bytes: &mut Cursor<&[u8]>, count: usize) -> Result<(), OfpParsingError> {
    let target = bytes.position() + count as u64;
    if target > bytes.get_ref().len() as u64 {
        return Err(OfpParsingError::ParsingError {
            message: "message body truncated".to_string(),
        });
    }
    bytes.set_position(target);
    Ok(())
}

fn remaining_bytes(bytes: &mut Cursor<&[u8]>) -> Vec<u8> {
    let mut rest = Vec::new();
    // Reading a cursor to its end cannot fail.
    bytes.read_to_end(&mut rest).unwrap();
    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_XID: u32 = 0x12345678;
    const TEST_DPID: u64 = 0x0011223344556677;

    fn echo_vector() -> Vec<u8> {
        vec![0xAB; 5]
    }

    fn round_trip(msg: Message) -> (Xid, Message) {
        let data = Message::marshal(TEST_XID, &msg).unwrap();
        assert_eq!(data.len(), Message::size_of(&msg));
        let header = OfpHeader::parse(&data[..OFP_HEADER_LENGTH]);
        assert_eq!(header.length(), data.len());
        Message::parse(&header, &data[OFP_HEADER_LENGTH..]).unwrap()
    }

    #[test]
    fn test_marshal_hello() {
        let data = Message::marshal(TEST_XID, &Message::Hello).unwrap();
        assert_eq!(data, vec![1, 0, 0, 8, 0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_marshal_echo_request() {
        let data = Message::marshal(TEST_XID, &Message::EchoRequest(echo_vector())).unwrap();
        let mut reference = vec![1, 2, 0, 13, 0x12, 0x34, 0x56, 0x78];
        reference.extend_from_slice(&echo_vector());
        assert_eq!(data, reference);
    }

    #[test]
    fn test_parse_echo_reply() {
        let (xid, message) = round_trip(Message::EchoReply(echo_vector()));
        assert_eq!(xid, TEST_XID);
        match message {
            Message::EchoReply(data) => assert_eq!(data, echo_vector()),
            other => panic!("should be an EchoReply message, got {:?}", other),
        }
    }

    #[test]
    fn test_features_reply_round_trip() {
        let feats = SwitchFeatures {
            datapath_id: TEST_DPID,
            num_buffers: 256,
            num_tables: 2,
            capabilities: 0xc7,
            actions: 0xfff,
        };
        let (xid, message) = round_trip(Message::FeaturesReply(feats.clone()));
        assert_eq!(xid, TEST_XID);
        assert_eq!(message, Message::FeaturesReply(feats));
    }

    #[test]
    fn test_flow_mod_delete_all() {
        let (_, message) = round_trip(Message::FlowMod(FlowMod::delete_all()));
        match message {
            Message::FlowMod(fm) => {
                assert_eq!(fm.command, FlowModCmd::DeleteFlow);
                assert_eq!(fm.out_port, None);
            }
            other => panic!("should be a FlowMod message, got {:?}", other),
        }
    }

    #[test]
    fn test_stats_reply_round_trip() {
        let resp = StatsResp {
            req_type: StatsReqType::Flow,
            flags: REPLY_MORE,
            stats: vec![
                Statistic::Flow(FlowStats {
                    table_id: 1,
                    priority: 10,
                    idle_timeout: 30,
                    hard_timeout: 0,
                    duration_sec: 12,
                    cookie: 7,
                    packet_count: 100,
                    byte_count: 6400,
                }),
                Statistic::Flow(FlowStats {
                    table_id: 1,
                    priority: 20,
                    idle_timeout: 0,
                    hard_timeout: 60,
                    duration_sec: 2,
                    cookie: 8,
                    packet_count: 1,
                    byte_count: 64,
                }),
            ],
        };
        let (_, message) = round_trip(Message::StatsReply(resp.clone()));
        match message {
            Message::StatsReply(parsed) => {
                assert!(parsed.more_replies());
                assert_eq!(parsed, resp);
            }
            other => panic!("should be a StatsReply message, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_code_is_other() {
        let msg = Message::Other {
            code: MsgCode::PortStatus,
            body: vec![1, 2, 3],
        };
        let (_, parsed) = round_trip(msg.clone());
        assert_eq!(parsed, msg);
        assert_eq!(parsed.msg_code(), MsgCode::PortStatus);
    }

    #[test]
    fn test_config_reply_miss_send_len() {
        let config = SwitchConfig {
            flags: 0,
            miss_send_len: FULL_PACKET_MISS_LENGTH,
        };
        let (_, message) = round_trip(Message::ConfigReply(config));
        assert_eq!(message, Message::ConfigReply(config));
    }
}
