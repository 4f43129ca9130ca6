//! Boundary between the relay and the ledger.
//!
//! The relay talks to [`LedgerClient`] instead of a ledger directly, which
//! keeps it testable with mock implementations. [`LocalChain`] hosts an
//! in-process ledger, stamps calls with the wall clock and fans events out
//! to subscribers; [`SignedClient`] is the relayer's view of it.

use oracle_ledger::{
    Address, CallContext, CompletionHandler, Ledger, LedgerConfig, LedgerError, LedgerEvent,
    Receipt, Request, RequestId, StoreResult,
};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Capacity of the event fan-out; slower subscribers see `Lagged`.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors from chain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The ledger rejected the call; nothing changed
    #[error("Rejected: {0}")]
    Rejected(#[from] LedgerError),
    /// The chain could not process the call at all
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

/// What the relay needs from a ledger.
pub trait LedgerClient: Send + Sync + 'static {
    /// Subscribe to events emitted after this call.
    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent>;

    /// Every request still Pending, with its position, oldest first.
    fn pending_requests(
        &self,
    ) -> impl Future<Output = ChainResult<Vec<(usize, Request)>>> + Send;

    /// Submit a completion signed by this client's identity.
    fn complete(
        &self,
        request_id: RequestId,
        result: String,
    ) -> impl Future<Output = ChainResult<usize>> + Send;
}

/// Point-in-time summary of the ledger.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LedgerInfo {
    pub address: Address,
    pub relayer: Address,
    pub fee: u128,
    pub nonce: u64,
    pub requests: usize,
}

struct ChainState<H> {
    ledger: Ledger<H>,
    /// Log position of the first event not yet broadcast
    published: usize,
}

/// An in-process chain hosting one ledger instance.
pub struct LocalChain<H = StoreResult> {
    state: Mutex<ChainState<H>>,
    events: broadcast::Sender<LedgerEvent>,
}

impl LocalChain<StoreResult> {
    pub fn new(config: LedgerConfig) -> Self {
        Self::with_ledger(Ledger::new(config))
    }
}

impl<H: CompletionHandler> LocalChain<H> {
    pub fn with_ledger(ledger: Ledger<H>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let published = ledger.events().len();
        Self {
            state: Mutex::new(ChainState { ledger, published }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Consumer entry point: pay `value` and request weather for `(lat, lon)`.
    pub fn submit(&self, caller: Address, value: u128, lat: i64, lon: i64) -> ChainResult<Receipt> {
        let ctx = CallContext::new(caller, value, now_secs());
        self.transact(|ledger| ledger.submit(&ctx, lat, lon))
    }

    /// Complete a request as `caller`. The ledger checks the identity.
    pub fn complete_as(
        &self,
        caller: Address,
        request_id: &RequestId,
        result: &str,
    ) -> ChainResult<usize> {
        let ctx = CallContext::new(caller, 0, now_secs());
        self.transact(|ledger| ledger.complete(&ctx, request_id, result))
    }

    pub fn fund(&self, account: Address, amount: u128) -> ChainResult<u128> {
        self.transact(|ledger| ledger.fund(account, amount))
    }

    pub fn balance_of(&self, account: &Address) -> ChainResult<u128> {
        Ok(self.lock()?.ledger.balance_of(account))
    }

    pub fn view(&self, index: usize) -> ChainResult<Request> {
        Ok(self.lock()?.ledger.view(index)?.clone())
    }

    pub fn requests(&self) -> ChainResult<Vec<Request>> {
        Ok(self.lock()?.ledger.requests().cloned().collect())
    }

    pub fn pending(&self) -> ChainResult<Vec<(usize, Request)>> {
        Ok(self.lock()?.ledger.pending())
    }

    pub fn info(&self) -> ChainResult<LedgerInfo> {
        let state = self.lock()?;
        let ledger = &state.ledger;
        Ok(LedgerInfo {
            address: ledger.address(),
            relayer: ledger.relayer(),
            fee: ledger.fee(),
            nonce: ledger.nonce(),
            requests: ledger.len(),
        })
    }

    /// Run a ledger call and broadcast whatever events it appended.
    ///
    /// Events go out while the lock is held so subscribers see them in log
    /// order.
    fn transact<T>(
        &self,
        call: impl FnOnce(&mut Ledger<H>) -> Result<T, LedgerError>,
    ) -> ChainResult<T> {
        let mut state = self.lock()?;
        let outcome = call(&mut state.ledger)?;

        let fresh: Vec<LedgerEvent> = state.ledger.events_since(state.published).to_vec();
        state.published += fresh.len();
        for event in fresh {
            // No subscribers is fine; the event stays in the ledger log.
            let _ = self.events.send(event);
        }
        Ok(outcome)
    }

    fn lock(&self) -> ChainResult<MutexGuard<'_, ChainState<H>>> {
        self.state
            .lock()
            .map_err(|e| ChainError::Unavailable(format!("ledger lock poisoned: {}", e)))
    }
}

/// The relayer's handle on a [`LocalChain`], signing with a fixed identity.
pub struct SignedClient<H = StoreResult> {
    chain: Arc<LocalChain<H>>,
    signer: Address,
}

impl<H: CompletionHandler> SignedClient<H> {
    /// Sign as the address derived from `key`.
    pub fn from_key(chain: Arc<LocalChain<H>>, key: &str) -> Self {
        Self::new(chain, Address::from_key(key))
    }

    pub fn new(chain: Arc<LocalChain<H>>, signer: Address) -> Self {
        Self { chain, signer }
    }

    pub fn signer(&self) -> Address {
        self.signer
    }
}

impl<H: CompletionHandler> LedgerClient for SignedClient<H> {
    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.chain.subscribe()
    }

    async fn pending_requests(&self) -> ChainResult<Vec<(usize, Request)>> {
        self.chain.pending()
    }

    async fn complete(&self, request_id: RequestId, result: String) -> ChainResult<usize> {
        self.chain.complete_as(self.signer, &request_id, &result)
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── MockLedger for testing ───────────────────────────────────────────────


// ── Tests ────────────────────────────────────────────────────────────────
