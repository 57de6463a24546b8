/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public livefeed adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod http;
pub mod types;
pub mod ws;

// Re-export commonly used types from http
pub use http::{ClientConfig, DEFAULT_API_BASE_URL, FeedError, Result, SnapshotClient};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    DEFAULT_STREAM_URL, ListenerHandle, MarketStream, RouteOutcome, RouterStats, SendOutcome,
    SessionEvent, SessionState, SubscriptionRegistry,
};
