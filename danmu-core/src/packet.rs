//! Decoded application packets

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Operation code carried in every packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Heartbeat,
    HeartbeatReply,
    Notification,
    Enter,
    EnterReply,
    Unknown(u32),
}

impl Operation {
    #[must_use]
    pub const fn from_u32(op: u32) -> Self {
        match op {
            2 => Self::Heartbeat,
            3 => Self::HeartbeatReply,
            5 => Self::Notification,
            7 => Self::Enter,
            8 => Self::EnterReply,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Heartbeat => 2,
            Self::HeartbeatReply => 3,
            Self::Notification => 5,
            Self::Enter => 7,
            Self::EnterReply => 8,
            Self::Unknown(other) => other,
        }
    }
}

/// Key under which handlers are registered
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Notification packet, keyed by its `cmd` (suffixes after `:` stripped)
    Command(String),
    HeartbeatReply,
    EnterReply,
    /// Any other operation, or a notification without a readable `cmd`
    Other(u32),
}

impl PacketKind {
    pub fn command(cmd: impl Into<String>) -> Self {
        Self::Command(cmd.into())
    }
}

impl std::fmt::Display for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(cmd) => f.write_str(cmd),
            Self::HeartbeatReply => f.write_str("HEARTBEAT_REPLY"),
            Self::EnterReply => f.write_str("ENTER_REPLY"),
            Self::Other(op) => write!(f, "OP_{op}"),
        }
    }
}

#[derive(Deserialize)]
struct CommandPeek {
    cmd: Option<String>,
}

/// One application-level message extracted from a transport frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    protocol: u16,
    operation: Operation,
    sequence: u32,
    kind: PacketKind,
    body: Bytes,
}

impl Packet {
    #[must_use]
    pub fn new(protocol: u16, operation: Operation, sequence: u32, body: Bytes) -> Self {
        let kind = match operation {
            Operation::Notification => serde_json::from_slice::<CommandPeek>(&body)
                .ok()
                .and_then(|p| p.cmd)
                .map(|cmd| match cmd.split_once(':') {
                    Some((head, _)) => head.to_string(),
                    None => cmd,
                })
                .filter(|cmd| !cmd.is_empty())
                .map_or(PacketKind::Other(operation.as_u32()), PacketKind::Command),
            Operation::HeartbeatReply => PacketKind::HeartbeatReply,
            Operation::EnterReply => PacketKind::EnterReply,
            other => PacketKind::Other(other.as_u32()),
        };
        Self {
            protocol,
            operation,
            sequence,
            kind,
            body,
        }
    }

    #[must_use]
    pub const fn protocol(&self) -> u16 {
        self.protocol
    }

    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    #[must_use]
    pub const fn sequence(&self) -> u32 {
        self.sequence
    }

    #[must_use]
    pub const fn kind(&self) -> &PacketKind {
        &self.kind
    }

    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserialize the body as JSON into any caller type
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Online count carried by heartbeat replies (first four body bytes, big-endian)
    #[must_use]
    pub fn popularity(&self) -> Option<u32> {
        if self.operation != Operation::HeartbeatReply {
            return None;
        }
        let raw: [u8; 4] = self.body.get(..4)?.try_into().ok()?;
        Some(u32::from_be_bytes(raw))
    }
}
