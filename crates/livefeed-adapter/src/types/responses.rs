/*
[INPUT]:  Snapshot API response envelopes
[OUTPUT]: Typed Rust response structs with serialization support
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When API schema changes or new types added
*/

use serde::{Deserialize, Serialize};

use super::models::DepthBook;

/// `{ success, data, error }` wrapper used by the klines and trades endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Depth endpoint body, either bare or wrapped in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DepthResponse {
    Wrapped { payload: DepthBook },
    Bare(DepthBook),
}

impl DepthResponse {
    pub fn into_book(self) -> DepthBook {
        match self {
            DepthResponse::Wrapped { payload } => payload,
            DepthResponse::Bare(book) => book,
        }
    }
}
