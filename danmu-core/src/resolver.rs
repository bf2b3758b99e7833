//! Room and endpoint lookup

use std::collections::HashMap;

use async_trait::async_trait;
use danmu_providers::BilibiliLiveClient;
use tracing::debug;

use crate::error::LookupError;

/// Room ids at or below this value are short aliases
pub const SHORT_ID_MAX: u64 = 1000;

/// Push endpoints and the auth token for one room
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointInfo {
    pub hosts: Vec<String>,
    pub token: String,
}

/// Maps a caller-supplied room reference onto a session.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Canonical room id for a reference. Failure is fatal to `start`.
    async fn resolve_room(&self, reference: &str) -> Result<u64, LookupError>;

    /// Push hosts and token for a canonical room
    async fn resolve_endpoints(&self, room_id: u64) -> Result<EndpointInfo, LookupError>;
}

/// Resolver backed by the Bilibili live HTTP API
#[derive(Clone, Default)]
pub struct BilibiliResolver {
    client: BilibiliLiveClient,
}

impl BilibiliResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_client(client: BilibiliLiveClient) -> Self {
        Self { client }
    }

    /// Resolver whose lookups carry login cookies
    #[must_use]
    pub fn with_cookies(cookies: HashMap<String, String>) -> Self {
        Self::with_client(BilibiliLiveClient::new().with_cookies(cookies))
    }
}

#[async_trait]
impl SessionResolver for BilibiliResolver {
    async fn resolve_room(&self, reference: &str) -> Result<u64, LookupError> {
        let id = BilibiliLiveClient::parse_room_reference(reference)
            .filter(|id| *id > 0)
            .ok_or_else(|| LookupError::InvalidReference(reference.to_string()))?;

        if id > SHORT_ID_MAX {
            return Ok(id);
        }

        let room = self.client.room_init(id).await?;
        if room.room_id == 0 {
            return Err(LookupError::NotFound(reference.to_string()));
        }
        debug!(short_id = id, room_id = room.room_id, "Resolved short room id");
        Ok(room.room_id)
    }

    async fn resolve_endpoints(&self, room_id: u64) -> Result<EndpointInfo, LookupError> {
        let info = self.client.get_live_danmu_info(room_id).await?;
        Ok(EndpointInfo {
            hosts: info.hosts(),
            token: info.token,
        })
    }
}
