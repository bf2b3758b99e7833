//! Session identity and the candidate endpoint pool

use crate::error::ClientError;

/// Push server used when endpoint discovery fails
pub const DEFAULT_HOST: &str = "broadcastlv.chat.bilibili.com";

/// Identity of one viewing session. Resolved once at start, immutable after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Reference as given by the caller (short id, long id or room URL)
    pub room_reference: String,
    /// Canonical room id
    pub room_id: u64,
    /// Viewer uid, 0 for anonymous
    pub viewer_id: u64,
    /// Device id (`buvid`)
    pub device_id: String,
    /// One-time auth token from endpoint discovery, empty when unavailable
    pub token: String,
}

/// Ordered push server candidates plus the round-robin cursor.
///
/// Never empty. Only the connect routine advances the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPool {
    hosts: Vec<String>,
    index: usize,
}

impl EndpointPool {
    /// Build a pool from discovered hosts. Blank entries are dropped; an
    /// empty result is an error.
    pub fn new<I, S>(hosts: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let hosts: Vec<String> = hosts
            .into_iter()
            .map(Into::into)
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();
        if hosts.is_empty() {
            return Err(ClientError::EmptyEndpointPool);
        }
        Ok(Self { hosts, index: 0 })
    }

    /// Single-entry pool
    pub fn single(host: impl Into<String>) -> Result<Self, ClientError> {
        Self::new([host.into()])
    }

    /// Pool holding only [`DEFAULT_HOST`]
    #[must_use]
    pub fn default_host() -> Self {
        Self {
            hosts: vec![DEFAULT_HOST.to_string()],
            index: 0,
        }
    }

    /// Select `hosts[index % len]` and advance the cursor by one.
    pub(crate) fn next_host(&mut self) -> &str {
        let slot = self.index % self.hosts.len();
        self.index = self.index.wrapping_add(1);
        &self.hosts[slot]
    }

    #[must_use]
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
