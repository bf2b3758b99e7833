//! Bilibili live API data structures

use serde::Deserialize;

/// `room/v1/Room/room_init` response
#[derive(Debug, Clone, Deserialize)]
pub struct RoomInitResp {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub msg: String,
    pub data: Option<RoomInitData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomInitData {
    pub room_id: u64,
    #[serde(default)]
    pub short_id: u64,
    #[serde(default)]
    pub uid: u64,
    #[serde(default)]
    pub live_status: u64,
}

/// `xlive/web-room/v1/index/getDanmuInfo` response
#[derive(Debug, Clone, Deserialize)]
pub struct GetDanmuInfoResp {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<DanmuInfoData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DanmuInfoData {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub host_list: Vec<DanmuInfoHost>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DanmuInfoHost {
    pub host: String,
    #[serde(default)]
    pub port: u32,
    #[serde(default)]
    pub wss_port: u32,
    #[serde(default)]
    pub ws_port: u32,
}

/// Canonical room information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: u64,
    pub short_id: u64,
    pub uid: u64,
    pub live: bool,
}

/// Live danmaku server information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDanmuInfo {
    pub token: String,
    pub host_list: Vec<DanmuHost>,
}

/// Danmaku server host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanmuHost {
    pub host: String,
    pub port: u32,
    pub wss_port: u32,
    pub ws_port: u32,
}

impl LiveDanmuInfo {
    /// Host names in the order the API returned them.
    #[must_use]
    pub fn hosts(&self) -> Vec<String> {
        self.host_list.iter().map(|h| h.host.clone()).collect()
    }
}
