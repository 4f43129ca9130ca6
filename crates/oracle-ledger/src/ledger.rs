//! The request ledger: fee collection, request intake and relayer completion.

use std::collections::HashMap;

use crate::address::Address;
use crate::error::{LedgerError, Result};
use crate::event::LedgerEvent;
use crate::handler::{CompletionHandler, StoreResult};
use crate::request::{Request, RequestId, RequestStore};

/// Legal latitude envelope, inclusive.
pub const LAT_RANGE: std::ops::RangeInclusive<i64> = -90..=90;
/// Legal longitude envelope, inclusive.
pub const LON_RANGE: std::ops::RangeInclusive<i64> = -180..=180;

/// Deployment parameters of a ledger instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Address the contract is deployed at
    pub address: Address,
    /// The only identity allowed to complete requests
    pub relayer: Address,
    /// Minimum payment attached to `submit`
    pub fee: u128,
}

/// Who is calling, what they attached, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub value: u128,
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(caller: Address, value: u128, timestamp: u64) -> Self {
        Self {
            caller,
            value,
            timestamp,
        }
    }
}

/// Outcome of an accepted `submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub index: usize,
    pub request_id: RequestId,
}

/// Request ledger parameterised over the consumer's completion logic.
pub struct Ledger<H = StoreResult> {
    config: LedgerConfig,
    nonce: u64,
    requests: RequestStore,
    balances: HashMap<Address, u128>,
    events: Vec<LedgerEvent>,
    handler: H,
}

impl Ledger<StoreResult> {
    pub fn new(config: LedgerConfig) -> Self {
        Self::with_handler(config, StoreResult)
    }
}

impl<H: CompletionHandler> Ledger<H> {
    pub fn with_handler(config: LedgerConfig, handler: H) -> Self {
        Self {
            config,
            nonce: 0,
            requests: RequestStore::new(),
            balances: HashMap::new(),
            events: Vec::new(),
            handler,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn address(&self) -> Address {
        self.config.address
    }

    pub fn relayer(&self) -> Address {
        self.config.relayer
    }

    pub fn fee(&self) -> u128 {
        self.config.fee
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Credit an account out of thin air. Returns the new balance.
    pub fn fund(&mut self, account: Address, amount: u128) -> Result<u128> {
        let balance = self
            .balance_of(&account)
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(account))?;
        self.balances.insert(account, balance);
        Ok(balance)
    }

    /// Accept a paid weather request for `(lat, lon)`.
    ///
    /// Order of effects: fee and location checks, payment transfer to the
    /// relayer, id derivation, Pending record, `NewRequest` event, nonce
    /// increment. Any failure happens before the first mutation.
    pub fn submit(&mut self, ctx: &CallContext, lat: i64, lon: i64) -> Result<Receipt> {
        if ctx.value < self.config.fee {
            return Err(LedgerError::InsufficientFee {
                required: self.config.fee,
                supplied: ctx.value,
            });
        }
        if !LAT_RANGE.contains(&lat) || !LON_RANGE.contains(&lon) {
            return Err(LedgerError::InvalidLocation { lat, lon });
        }

        self.transfer(ctx.caller, self.config.relayer, ctx.value)?;

        let request_id = RequestId::derive(ctx.timestamp, &ctx.caller, self.nonce);
        let index = self.requests.push(Request::pending(request_id, lat, lon));
        self.events.push(LedgerEvent::NewRequest {
            index,
            request_id,
            lat,
            lon,
        });
        self.nonce += 1;

        log::debug!(
            "ledger {}: request #{} {} at ({}, {})",
            self.config.address,
            index,
            request_id,
            lat,
            lon
        );

        Ok(Receipt { index, request_id })
    }

    /// Record the relayer's result for a Pending request.
    ///
    /// The completion hook only shapes the stored value; the ledger checks the
    /// record is Pending and applies the transition. Returns the completed
    /// record's position.
    pub fn complete(
        &mut self,
        ctx: &CallContext,
        request_id: &RequestId,
        result: &str,
    ) -> Result<usize> {
        if ctx.caller != self.config.relayer {
            return Err(LedgerError::Unauthorized(ctx.caller));
        }

        let unknown = || LedgerError::UnknownOrAlreadyCompletedRequest(*request_id);
        let request = self
            .requests
            .position_of(request_id)
            .and_then(|index| self.requests.get(index))
            .filter(|request| request.is_pending())
            .ok_or_else(unknown)?;

        let stored = self.handler.complete(request, result)?;
        let index = self.requests.fulfill(request_id, &stored)?;
        self.events.push(LedgerEvent::RequestCompleted {
            index,
            request_id: *request_id,
            result: stored,
        });

        log::debug!(
            "ledger {}: request #{} {} completed",
            self.config.address,
            index,
            request_id
        );

        Ok(index)
    }

    /// Look up a request by insertion order.
    pub fn view(&self, index: usize) -> Result<&Request> {
        self.requests
            .get(index)
            .ok_or(LedgerError::IndexOutOfRange(index))
    }

    pub fn find(&self, request_id: &RequestId) -> Option<(usize, &Request)> {
        let index = self.requests.position_of(request_id)?;
        self.requests.get(index).map(|r| (index, r))
    }

    pub fn requests(&self) -> impl Iterator<Item = &Request> {
        self.requests.iter()
    }

    /// Every Pending request with its position, oldest first.
    pub fn pending(&self) -> Vec<(usize, Request)> {
        self.requests
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_pending())
            .map(|(i, r)| (i, r.clone()))
            .collect()
    }

    /// Full event log in emission order.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Events emitted at or after log position `offset`.
    pub fn events_since(&self, offset: usize) -> &[LedgerEvent] {
        self.events.get(offset..).unwrap_or(&[])
    }

    fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<()> {
        let from_balance = self.balance_of(&from);
        let remaining = from_balance.checked_sub(amount).ok_or_else(|| {
            LedgerError::FeeTransferFailed(format!(
                "{} holds {}, needs {}",
                from, from_balance, amount
            ))
        })?;
        if from == to {
            return Ok(());
        }
        let credited = self.balance_of(&to).checked_add(amount).ok_or_else(|| {
            LedgerError::FeeTransferFailed(format!("balance overflow for {}", to))
        })?;

        self.balances.insert(from, remaining);
        self.balances.insert(to, credited);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RoundedResult;
    use crate::request::RequestStatus;

    const FEE: u128 = 100;

    fn contract() -> Address {
        Address::new([0xc0; 20])
    }

    fn relayer() -> Address {
        Address::from_key("relayer-key")
    }

    fn alice() -> Address {
        Address::new([0xa1; 20])
    }

    fn config() -> LedgerConfig {
        LedgerConfig {
            address: contract(),
            relayer: relayer(),
            fee: FEE,
        }
    }

    fn funded_ledger() -> Ledger {
        let mut ledger = Ledger::new(config());
        ledger.fund(alice(), 1_000).unwrap();
        ledger
    }

    fn paid(timestamp: u64) -> CallContext {
        CallContext::new(alice(), FEE, timestamp)
    }

    fn as_relayer() -> CallContext {
        CallContext::new(relayer(), 0, 1)
    }

    #[test]
    fn submit_records_pending_and_emits_event() {
        let mut ledger = funded_ledger();
        let receipt = ledger.submit(&paid(10), 40, -74).unwrap();

        assert_eq!(receipt.index, 0);
        assert_eq!(ledger.nonce(), 1);
        let record = ledger.view(0).unwrap();
        assert_eq!(record.request_id, receipt.request_id);
        assert_eq!(record.status, RequestStatus::Pending);
        assert_eq!((record.lat, record.lon), (40, -74));
        assert_eq!(
            ledger.events(),
            &[LedgerEvent::NewRequest {
                index: 0,
                request_id: receipt.request_id,
                lat: 40,
                lon: -74,
            }]
        );
    }

    #[test]
    fn submit_forwards_payment_to_relayer() {
        let mut ledger = funded_ledger();
        ledger
            .submit(&CallContext::new(alice(), 150, 1), 0, 0)
            .unwrap();
        assert_eq!(ledger.balance_of(&alice()), 850);
        assert_eq!(ledger.balance_of(&relayer()), 150);
    }

    #[test]
    fn submit_rejects_out_of_range_coordinates() {
        let mut ledger = funded_ledger();
        for (lat, lon) in [(91, 0), (0, 181), (-91, 0), (0, -181)] {
            let err = ledger.submit(&paid(1), lat, lon).unwrap_err();
            assert_eq!(err, LedgerError::InvalidLocation { lat, lon });
        }
        assert!(ledger.events().is_empty());
        assert!(ledger.is_empty());
        assert_eq!(ledger.nonce(), 0);
        assert_eq!(ledger.balance_of(&alice()), 1_000);
    }

    #[test]
    fn submit_accepts_envelope_edges() {
        let mut ledger = funded_ledger();
        ledger.submit(&paid(1), 90, 180).unwrap();
        ledger.submit(&paid(1), -90, -180).unwrap();
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn submit_rejects_underpayment() {
        let mut ledger = funded_ledger();
        let err = ledger
            .submit(&CallContext::new(alice(), FEE - 1, 1), 0, 0)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFee {
                required: FEE,
                supplied: FEE - 1
            }
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn submit_aborts_when_transfer_fails() {
        let mut ledger = Ledger::new(config());
        let err = ledger.submit(&paid(1), 10, 10).unwrap_err();
        assert!(matches!(err, LedgerError::FeeTransferFailed(_)));
        assert!(ledger.is_empty());
        assert!(ledger.events().is_empty());
        assert_eq!(ledger.nonce(), 0);
        assert_eq!(ledger.balance_of(&relayer()), 0);
    }

    #[test]
    fn same_block_submissions_get_distinct_ids() {
        let mut ledger = funded_ledger();
        let first = ledger.submit(&paid(77), 1, 1).unwrap();
        let second = ledger.submit(&paid(77), 1, 1).unwrap();
        assert_ne!(first.request_id, second.request_id);
        assert_eq!(ledger.nonce(), 2);
    }

    #[test]
    fn complete_transitions_exactly_once() {
        let mut ledger = funded_ledger();
        let receipt = ledger.submit(&paid(1), 40, -74).unwrap();

        let index = ledger
            .complete(&as_relayer(), &receipt.request_id, "21.5")
            .unwrap();
        assert_eq!(index, 0);
        let record = ledger.view(0).unwrap();
        assert_eq!(record.status, RequestStatus::Completed);
        assert_eq!(record.result, "21.5");

        let err = ledger
            .complete(&as_relayer(), &receipt.request_id, "30")
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::UnknownOrAlreadyCompletedRequest(receipt.request_id)
        );
        assert_eq!(ledger.view(0).unwrap().result, "21.5");
        assert_eq!(ledger.events().len(), 2);
    }

    #[test]
    fn complete_by_stranger_is_unauthorized() {
        let mut ledger = funded_ledger();
        let receipt = ledger.submit(&paid(1), 40, -74).unwrap();

        let err = ledger
            .complete(&CallContext::new(alice(), 0, 2), &receipt.request_id, "1")
            .unwrap_err();
        assert_eq!(err, LedgerError::Unauthorized(alice()));
        assert!(ledger.view(0).unwrap().is_pending());
        assert_eq!(ledger.events().len(), 1);
    }

    #[test]
    fn complete_unknown_request_fails() {
        let mut ledger = funded_ledger();
        let bogus = RequestId::derive(0, &Address::ZERO, 99);
        let err = ledger.complete(&as_relayer(), &bogus, "1").unwrap_err();
        assert_eq!(err, LedgerError::UnknownOrAlreadyCompletedRequest(bogus));
    }

    #[test]
    fn view_out_of_range() {
        let ledger = funded_ledger();
        assert_eq!(ledger.view(3).unwrap_err(), LedgerError::IndexOutOfRange(3));
    }

    #[test]
    fn pending_lists_only_open_requests() {
        let mut ledger = funded_ledger();
        let a = ledger.submit(&paid(1), 1, 1).unwrap();
        let b = ledger.submit(&paid(1), 2, 2).unwrap();
        ledger.complete(&as_relayer(), &a.request_id, "5").unwrap();

        let pending = ledger.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, 1);
        assert_eq!(pending[0].1.request_id, b.request_id);
        assert_eq!(ledger.find(&b.request_id).map(|(i, _)| i), Some(1));
    }

    #[test]
    fn events_since_offsets() {
        let mut ledger = funded_ledger();
        ledger.submit(&paid(1), 1, 1).unwrap();
        ledger.submit(&paid(1), 2, 2).unwrap();
        assert_eq!(ledger.events_since(0).len(), 2);
        assert_eq!(ledger.events_since(1).len(), 1);
        assert!(ledger.events_since(5).is_empty());
    }

    #[test]
    fn custom_handler_shapes_stored_result() {
        let mut ledger = Ledger::with_handler(config(), RoundedResult { precision: 0 });
        ledger.fund(alice(), 1_000).unwrap();
        let receipt = ledger.submit(&paid(1), 40, -74).unwrap();

        ledger
            .complete(&as_relayer(), &receipt.request_id, "21.7")
            .unwrap();
        assert_eq!(ledger.view(0).unwrap().result, "22");
        match ledger.events().last() {
            Some(LedgerEvent::RequestCompleted { result, .. }) => assert_eq!(result, "22"),
            other => panic!("expected RequestCompleted, got {:?}", other),
        }
    }

    /// Hook that rejects non-numeric results and otherwise leaves the value alone.
    struct NumericOnly;

    impl CompletionHandler for NumericOnly {
        fn complete(&mut self, _request: &Request, result: &str) -> Result<String> {
            result
                .parse::<f64>()
                .map(|_| result.to_string())
                .map_err(|_| LedgerError::CompletionRejected(format!("not numeric: {}", result)))
        }
    }

    /// Hook that ignores the relayer's value entirely.
    struct Constant;

    impl CompletionHandler for Constant {
        fn complete(&mut self, _request: &Request, _result: &str) -> Result<String> {
            Ok("42".to_string())
        }
    }

    #[test]
    fn ledger_applies_transition_for_any_hook() {
        let mut ledger = Ledger::with_handler(config(), Constant);
        ledger.fund(alice(), 1_000).unwrap();
        let receipt = ledger.submit(&paid(1), 1, 1).unwrap();

        ledger
            .complete(&as_relayer(), &receipt.request_id, "7")
            .unwrap();
        let record = ledger.view(0).unwrap();
        assert_eq!(record.status, RequestStatus::Completed);
        assert_eq!(record.result, "42");

        let err = ledger
            .complete(&as_relayer(), &receipt.request_id, "8")
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::UnknownOrAlreadyCompletedRequest(receipt.request_id)
        );
        assert_eq!(ledger.events().len(), 2);
    }

    #[test]
    fn rejecting_hook_leaves_request_pending() {
        let mut ledger = Ledger::with_handler(config(), NumericOnly);
        ledger.fund(alice(), 1_000).unwrap();
        let receipt = ledger.submit(&paid(1), 1, 1).unwrap();

        assert!(ledger
            .complete(&as_relayer(), &receipt.request_id, "warm")
            .is_err());
        assert!(ledger.view(0).unwrap().is_pending());
        assert_eq!(ledger.events().len(), 1);

        ledger
            .complete(&as_relayer(), &receipt.request_id, "19")
            .unwrap();
        assert_eq!(ledger.view(0).unwrap().result, "19");
    }

    #[test]
    fn relayer_can_submit_to_itself() {
        let mut ledger = Ledger::new(config());
        ledger.fund(relayer(), FEE).unwrap();
        ledger
            .submit(&CallContext::new(relayer(), FEE, 1), 0, 0)
            .unwrap();
        assert_eq!(ledger.balance_of(&relayer()), FEE);
    }

    #[test]
    fn fund_overflow_is_rejected() {
        let mut ledger = Ledger::new(config());
        ledger.fund(alice(), u128::MAX).unwrap();
        assert_eq!(
            ledger.fund(alice(), 1).unwrap_err(),
            LedgerError::BalanceOverflow(alice())
        );
    }
}
