//! Facts emitted by the ledger.

use serde::{Deserialize, Serialize};

use crate::request::RequestId;

/// An event appended to the ledger's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum LedgerEvent {
    /// A consumer paid for and submitted a new request.
    #[serde(rename = "new_request")]
    NewRequest {
        index: usize,
        request_id: RequestId,
        lat: i64,
        lon: i64,
    },

    /// The relayer completed a request.
    #[serde(rename = "request_completed")]
    RequestCompleted {
        index: usize,
        request_id: RequestId,
        result: String,
    },
}

impl LedgerEvent {
    pub fn request_id(&self) -> &RequestId {
        match self {
            LedgerEvent::NewRequest { request_id, .. } => request_id,
            LedgerEvent::RequestCompleted { request_id, .. } => request_id,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            LedgerEvent::NewRequest { index, .. } => *index,
            LedgerEvent::RequestCompleted { index, .. } => *index,
        }
    }
}
