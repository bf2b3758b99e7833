// Danmu provider clients
//
// Pure HTTP client implementations for live platforms. These clients know
// nothing about the push connection; danmu-core adapts them into its
// session resolver.

// Shared error types
pub mod error;

// HTTP clients
pub mod bilibili;

// Re-export client types for convenience
pub use bilibili::BilibiliLiveClient;
pub use error::ProviderClientError;
