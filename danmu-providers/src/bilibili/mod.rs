//! Bilibili live vendor client
//!
//! Pure HTTP client for the live room APIs used to bootstrap a danmu session:
//! short room id resolution and push server discovery.

pub mod client;
pub mod types;

pub use client::{BilibiliLiveClient, LIVE_API_BASE};
pub use types::*;
