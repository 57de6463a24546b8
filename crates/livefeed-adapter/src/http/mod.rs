/*
[INPUT]:  HTTP client configuration and API endpoints
[OUTPUT]: HTTP responses and typed API results
[POS]:    HTTP layer - snapshot API communication
[UPDATE]: When adding new endpoints or changing client behavior
*/

pub mod client;
pub mod error;
pub mod public;

pub use error::{FeedError, Result};

pub use client::{ClientConfig, DEFAULT_API_BASE_URL, SnapshotClient};
