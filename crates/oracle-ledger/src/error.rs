//! Error types for ledger calls.

use thiserror::Error;

use crate::address::Address;
use crate::request::RequestId;

/// Reasons a ledger call is rejected.
///
/// A rejected call leaves the ledger exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Coordinates outside lat [-90, 90] / lon [-180, 180]
    #[error("Invalid location: lat={lat}, lon={lon}")]
    InvalidLocation { lat: i64, lon: i64 },

    /// Attached payment below the configured fee
    #[error("Insufficient fee: required {required}, supplied {supplied}")]
    InsufficientFee { required: u128, supplied: u128 },

    /// Moving the payment to the relayer failed
    #[error("Fee transfer failed: {0}")]
    FeeTransferFailed(String),

    /// Completion attempted by someone other than the relayer
    #[error("Unauthorized caller: {0}")]
    Unauthorized(Address),

    /// Completion for an id that is absent or already Completed
    #[error("Unknown or already completed request: {0}")]
    UnknownOrAlreadyCompletedRequest(RequestId),

    /// The completion hook refused the relayer's value
    #[error("Completion rejected: {0}")]
    CompletionRejected(String),

    /// `view` past the end of the request list
    #[error("No request at index {0}")]
    IndexOutOfRange(usize),

    /// Faucet credit would overflow the account balance
    #[error("Balance overflow for {0}")]
    BalanceOverflow(Address),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
