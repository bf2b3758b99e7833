//! Bilibili live HTTP client

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use url::Url;

use super::types::{self as types, DanmuHost, LiveDanmuInfo, RoomInfo};
use crate::error::{check_response, json_with_limit, ProviderClientError};

// These patterns are compile-time constants; Regex::new cannot fail on them.
static RE_LIVE_ROOM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"live\.bilibili\.com/(?:h5/)?(\d+)").expect("invalid live room regex"));

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REFERER: &str = "https://live.bilibili.com";

/// Production API origin
pub const LIVE_API_BASE: &str = "https://api.live.bilibili.com";

/// Shared HTTP client for all Bilibili requests (connection pooling)
/// Redirects are disabled to prevent SSRF via redirect to private IPs.
static SHARED_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(15))
        .pool_max_idle_per_host(4)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build Bilibili shared HTTP client")
});

/// Bilibili live room HTTP client
#[derive(Clone)]
pub struct BilibiliLiveClient {
    client: Client,
    base_url: String,
    cookies: Option<HashMap<String, String>>,
}

impl BilibiliLiveClient {
    /// Create a new client against the production API (reuses shared connection pool)
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: SHARED_CLIENT.clone(),
            base_url: LIVE_API_BASE.to_string(),
            cookies: None,
        }
    }

    /// Attach login cookies (`SESSDATA`, `buvid3`, ...) to every request
    #[must_use]
    pub fn with_cookies(mut self, cookies: HashMap<String, String>) -> Self {
        self.cookies = if cookies.is_empty() { None } else { Some(cookies) };
        self
    }

    /// Point the client at a different API origin
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ProviderClientError> {
        let url = Url::parse(base_url)
            .map_err(|e| ProviderClientError::InvalidConfig(format!("invalid base url {base_url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProviderClientError::InvalidConfig(format!(
                "unsupported scheme in base url: {}",
                url.scheme()
            )));
        }
        self.base_url = url.as_str().trim_end_matches('/').to_string();
        Ok(self)
    }

    fn add_cookies(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(cookies) = &self.cookies {
            let mut pairs: Vec<_> = cookies.iter().map(|(k, v)| format!("{k}={v}")).collect();
            pairs.sort();
            req.header("Cookie", pairs.join("; "))
        } else {
            req
        }
    }

    /// Extract a numeric room id from a bare id or a live room URL.
    #[must_use]
    pub fn parse_room_reference(reference: &str) -> Option<u64> {
        let trimmed = reference.trim();
        if let Ok(id) = trimmed.parse::<u64>() {
            return Some(id);
        }
        RE_LIVE_ROOM
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Resolve a (possibly short) room id to the canonical room.
    pub async fn room_init(&self, room_id: u64) -> Result<RoomInfo, ProviderClientError> {
        let url = format!("{}/room/v1/Room/room_init", self.base_url);

        let req = self.add_cookies(
            self.client
                .get(&url)
                .query(&[("id", room_id)])
                .header("Referer", REFERER),
        );
        let resp = check_response(req.send().await?)?;
        let json: types::RoomInitResp = json_with_limit(resp).await?;

        if json.code != 0 {
            let message = if json.message.is_empty() { json.msg } else { json.message };
            return Err(ProviderClientError::Api { code: json.code, message });
        }

        let data = json
            .data
            .ok_or_else(|| ProviderClientError::Parse("Missing room_init data".to_string()))?;

        tracing::debug!(requested = room_id, room_id = data.room_id, "Resolved live room");

        Ok(RoomInfo {
            room_id: data.room_id,
            short_id: data.short_id,
            uid: data.uid,
            live: data.live_status == 1,
        })
    }

    /// Get live danmaku server info
    pub async fn get_live_danmu_info(&self, room_id: u64) -> Result<LiveDanmuInfo, ProviderClientError> {
        let url = format!("{}/xlive/web-room/v1/index/getDanmuInfo", self.base_url);

        let req = self.add_cookies(
            self.client
                .get(&url)
                .query(&[("id", room_id), ("type", 0)])
                .header("Referer", REFERER),
        );
        let resp = check_response(req.send().await?)?;
        let json: types::GetDanmuInfoResp = json_with_limit(resp).await?;

        if json.code != 0 {
            return Err(ProviderClientError::Api { code: json.code, message: json.message });
        }

        let data = json
            .data
            .ok_or_else(|| ProviderClientError::Parse("Missing danmu info data".to_string()))?;
        let host_list: Vec<DanmuHost> = data
            .host_list
            .into_iter()
            .map(|h| DanmuHost {
                host: h.host,
                port: h.port,
                wss_port: h.wss_port,
                ws_port: h.ws_port,
            })
            .collect();

        Ok(LiveDanmuInfo {
            token: data.token,
            host_list,
        })
    }
}

impl Default for BilibiliLiveClient {
    fn default() -> Self {
        Self::new()
    }
}
