//! Request records and identifiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::address::Address;
use crate::error::{LedgerError, Result};

/// Opaque 256-bit request identifier, stored big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId([u8; 32]);

impl RequestId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive an id from the submission timestamp, the caller and the
    /// ledger nonce.
    ///
    /// The preimage is the packed encoding `uint256(timestamp) ++
    /// address(caller) ++ uint256(nonce)`, hashed with Keccak-256.
    pub fn derive(timestamp: u64, caller: &Address, nonce: u64) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(u256_be(timestamp));
        hasher.update(caller.as_bytes());
        hasher.update(u256_be(nonce));
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }
}

fn u256_be(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Errors from parsing a request id string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestIdError {
    #[error("invalid request id hex: {0}")]
    Hex(String),
    #[error("request id must be 32 bytes, got {0}")]
    Length(usize),
}

impl FromStr for RequestId {
    type Err = RequestIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let raw = hex::decode(digits).map_err(|e| RequestIdError::Hex(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| RequestIdError::Length(raw.len()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Lifecycle state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Completed,
}

/// A weather request as recorded on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub request_id: RequestId,
    pub lat: i64,
    pub lon: i64,
    pub status: RequestStatus,
    /// Empty until the relayer completes the request.
    pub result: String,
}

impl Request {
    pub fn pending(request_id: RequestId, lat: i64, lon: i64) -> Self {
        Self {
            request_id,
            lat,
            lon,
            status: RequestStatus::Pending,
            result: String::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

/// Append-only request storage with an id index.
#[derive(Debug, Default, Clone)]
pub struct RequestStore {
    records: Vec<Request>,
    index: HashMap<RequestId, usize>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its insertion position.
    pub(crate) fn push(&mut self, request: Request) -> usize {
        let position = self.records.len();
        self.index.insert(request.request_id, position);
        self.records.push(request);
        position
    }

    pub fn get(&self, position: usize) -> Option<&Request> {
        self.records.get(position)
    }

    pub fn position_of(&self, id: &RequestId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.records.iter()
    }

    /// Move a Pending record to Completed and store its result.
    ///
    /// Fails with `UnknownOrAlreadyCompletedRequest` when the id is absent or
    /// the record is already Completed. Returns the record's position.
    pub(crate) fn fulfill(&mut self, id: &RequestId, result: &str) -> Result<usize> {
        let position = self
            .position_of(id)
            .ok_or(LedgerError::UnknownOrAlreadyCompletedRequest(*id))?;
        let record = &mut self.records[position];
        if !record.is_pending() {
            return Err(LedgerError::UnknownOrAlreadyCompletedRequest(*id));
        }
        record.status = RequestStatus::Completed;
        record.result = result.to_string();
        Ok(position)
    }
}
