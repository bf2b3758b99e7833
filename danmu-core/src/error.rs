use thiserror::Error;

use danmu_providers::ProviderClientError;

/// The room reference could not be mapped to a session. Fatal to `start`.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Invalid room reference: {0}")]
    InvalidReference(String),

    #[error("Room not found: {0}")]
    NotFound(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderClientError),
}

/// Dial, write and read failures on the push connection.
///
/// These never escape the connect loop; they are logged and retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Dial failed: {0}")]
    Dial(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Close code 1006: the peer dropped the socket without a close handshake.
    /// Right after the enter frame this is how a busy edge node rejects a session.
    #[error("Abnormal closure (1006): {0}")]
    AbnormalClosure(String),
}

impl TransportError {
    #[must_use]
    pub const fn is_abnormal_closure(&self) -> bool {
        matches!(self, Self::AbnormalClosure(_))
    }
}

/// Why `ConnectionManager::connect` gave up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Connect cancelled")]
    Cancelled,

    #[error("Retry budget exhausted after {attempts} attempt(s)")]
    RetryExhausted { attempts: u64 },
}

/// Malformed transport frame. Logged by the decoder, never surfaced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Truncated packet: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Decompression failed: {0}")]
    Decompress(String),
}

/// Errors returned by the public client API.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("Endpoint pool is empty")]
    EmptyEndpointPool,

    #[error("Client already started")]
    AlreadyStarted,

    #[error("Connect failed: {0}")]
    Connect(#[from] ConnectError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
