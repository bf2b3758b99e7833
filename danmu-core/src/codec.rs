//! Push server wire format
//!
//! Every packet starts with a 16-byte big-endian header:
//!
//! | offset | size | field           |
//! |--------|------|-----------------|
//! | 0      | 4    | packet length   |
//! | 4      | 2    | header length   |
//! | 6      | 2    | protocol        |
//! | 8      | 4    | operation       |
//! | 12     | 4    | sequence        |
//!
//! One WebSocket frame carries one or more packets back to back. A packet with
//! protocol [`PROTOCOL_ZLIB`] wraps a further batch of packets in a zlib stream.

use std::io::Read;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use tracing::warn;

use crate::error::CodecError;
use crate::packet::{Operation, Packet};
use crate::session::Session;

pub const HEADER_LEN: usize = 16;

/// Plain JSON body
pub const PROTOCOL_JSON: u16 = 0;
/// Heartbeat / integer body
pub const PROTOCOL_INT: u16 = 1;
/// zlib-compressed batch
pub const PROTOCOL_ZLIB: u16 = 2;
/// brotli-compressed batch
pub const PROTOCOL_BROTLI: u16 = 3;

/// Batch compression requested in the enter frame
const ENTER_PROTOVER: u16 = PROTOCOL_ZLIB;

/// Upper bound on an inflated batch
const MAX_INFLATED_LEN: u64 = 16 * 1024 * 1024;

/// Compressed batches never nest deeper than this
const MAX_NESTING: u8 = 2;

const HEARTBEAT_BODY: &[u8] = b"[object Object]";

/// Parsed packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub packet_len: u32,
    pub header_len: u16,
    pub protocol: u16,
    pub operation: Operation,
    pub sequence: u32,
}

impl Header {
    fn read(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: HEADER_LEN,
                available: buf.len(),
            });
        }
        let mut cursor = &buf[..HEADER_LEN];
        let header = Self {
            packet_len: cursor.get_u32(),
            header_len: cursor.get_u16(),
            protocol: cursor.get_u16(),
            operation: Operation::from_u32(cursor.get_u32()),
            sequence: cursor.get_u32(),
        };

        if (header.header_len as usize) < HEADER_LEN {
            return Err(CodecError::InvalidHeader(format!(
                "header length {} shorter than {HEADER_LEN}",
                header.header_len
            )));
        }
        if (header.packet_len as usize) < header.header_len as usize {
            return Err(CodecError::InvalidHeader(format!(
                "packet length {} shorter than header length {}",
                header.packet_len, header.header_len
            )));
        }
        Ok(header)
    }
}

/// Encode a single packet
#[must_use]
pub fn encode(protocol: u16, operation: Operation, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    buf.put_u32((HEADER_LEN + body.len()) as u32);
    buf.put_u16(HEADER_LEN as u16);
    buf.put_u16(protocol);
    buf.put_u32(operation.as_u32());
    buf.put_u32(1);
    buf.put_slice(body);
    buf.freeze()
}

/// Build the enter frame that authenticates a viewer into a room
#[must_use]
pub fn encode_enter(session: &Session) -> Bytes {
    let body = serde_json::json!({
        "uid": session.viewer_id,
        "roomid": session.room_id,
        "protover": ENTER_PROTOVER,
        "buvid": session.device_id,
        "platform": "web",
        "type": 2,
        "key": session.token,
    });
    encode(PROTOCOL_INT, Operation::Enter, body.to_string().as_bytes())
}

/// Build the keep-alive frame
#[must_use]
pub fn encode_heartbeat() -> Bytes {
    encode(PROTOCOL_INT, Operation::Heartbeat, HEARTBEAT_BODY)
}

/// Split one binary frame into its packets, in wire order.
///
/// Malformed input stops decoding of the remainder with a warning; packets
/// decoded before the fault are still returned.
#[must_use]
pub fn decode(frame: &[u8]) -> Vec<Packet> {
    let mut packets = Vec::new();
    if let Err(e) = decode_into(frame, &mut packets, 0) {
        warn!(error = %e, decoded = packets.len(), "Discarding malformed frame tail");
    }
    packets
}

fn decode_into(mut buf: &[u8], out: &mut Vec<Packet>, depth: u8) -> Result<(), CodecError> {
    while !buf.is_empty() {
        let header = Header::read(buf)?;
        let packet_len = header.packet_len as usize;
        if buf.len() < packet_len {
            return Err(CodecError::Truncated {
                needed: packet_len,
                available: buf.len(),
            });
        }
        let body = &buf[header.header_len as usize..packet_len];

        match header.protocol {
            PROTOCOL_ZLIB => {
                if depth >= MAX_NESTING {
                    return Err(CodecError::InvalidHeader("compressed batch nested too deeply".to_string()));
                }
                let inflated = inflate(body)?;
                decode_into(&inflated, out, depth + 1)?;
            }
            PROTOCOL_BROTLI => {
                warn!(len = body.len(), "Skipping brotli batch (not negotiated)");
            }
            protocol => out.push(Packet::new(
                protocol,
                header.operation,
                header.sequence,
                Bytes::copy_from_slice(body),
            )),
        }

        buf = &buf[packet_len..];
    }
    Ok(())
}

fn inflate(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(body.len() * 4);
    ZlibDecoder::new(body)
        .take(MAX_INFLATED_LEN)
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Decompress(e.to_string()))?;
    Ok(out)
}
