//! Request ledger for the weather oracle.
//!
//! Models the on-chain contract pair:
//! - the oracle side collects fees, derives request ids and emits
//!   `NewRequest` events
//! - the consumer side stores request records and applies the relayer's
//!   result through a pluggable [`CompletionHandler`]
//!
//! Only the configured relayer may complete a request, and each request is
//! completed at most once.

mod address;
mod error;
mod event;
mod handler;
mod ledger;
mod request;

pub use address::{Address, AddressError, ADDRESS_LEN};
pub use error::{LedgerError, Result};
pub use event::LedgerEvent;
pub use handler::{CompletionHandler, RoundedResult, StoreResult};
pub use ledger::{CallContext, Ledger, LedgerConfig, Receipt, LAT_RANGE, LON_RANGE};
pub use request::{Request, RequestId, RequestIdError, RequestStatus, RequestStore};
